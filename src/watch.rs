//! Supervision of the per-channel consumers.
//!
//! [`Watcher::spawn`] starts one tokio task per channel. The tasks share
//! nothing but the alert sink and a stop flag; each one owns its monitor and
//! its source.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::consumer::{ChannelConsumer, ChannelStats};
use crate::data::duration::format_duration;
use crate::data::WindowMonitor;
use crate::error::SourceError;
use crate::sink::AlertSink;
use crate::source::ReadingSource;

/// Resolve once the stop flag is raised or its sender is gone.
pub(crate) async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            return;
        }
    }
}

/// Handle for stopping every consumer of a [`Watcher`].
///
/// Cloneable, so it can be moved into a signal handler.
#[derive(Debug, Clone)]
pub struct StopHandle {
    stop_tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    /// Ask every consumer to finish.
    pub fn stop(&self) {
        // Stored even when no receiver is listening yet
        self.stop_tx.send_replace(true);
    }

    /// A receiver other tasks (e.g. a replay feed) can wait on.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.stop_tx.subscribe()
    }
}

/// Outcome of one consumer task.
#[derive(Debug)]
pub struct ChannelReport {
    pub channel: String,
    pub result: Result<ChannelStats, SourceError>,
}

/// Outcome of all consumer tasks.
#[derive(Debug, Default)]
pub struct WatchReport {
    pub channels: Vec<ChannelReport>,
}

impl WatchReport {
    /// Whether any consumer ended with a transport error.
    pub fn has_failures(&self) -> bool {
        self.channels.iter().any(|c| c.result.is_err())
    }

    /// Total alerts across all channels that completed.
    pub fn total_alerts(&self) -> u64 {
        self.channels
            .iter()
            .filter_map(|c| c.result.as_ref().ok())
            .map(|s| s.alerts)
            .sum()
    }

    /// Per-channel statistics as JSON, for `--json` summaries.
    pub fn to_json(&self) -> serde_json::Value {
        #[derive(Serialize)]
        struct Entry<'a> {
            channel: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            stats: Option<&'a ChannelStats>,
            #[serde(skip_serializing_if = "Option::is_none")]
            error: Option<String>,
        }

        let entries: Vec<Entry<'_>> = self
            .channels
            .iter()
            .map(|c| Entry {
                channel: &c.channel,
                stats: c.result.as_ref().ok(),
                error: c.result.as_ref().err().map(|e| e.to_string()),
            })
            .collect();
        serde_json::json!({ "channels": entries })
    }
}

/// Runs one consumer task per channel.
#[derive(Debug)]
pub struct Watcher {
    stop: StopHandle,
    tasks: Vec<(String, JoinHandle<Result<ChannelStats, SourceError>>)>,
}

impl Watcher {
    /// Spawn a consumer for every (monitor, source) pair.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        bindings: Vec<(WindowMonitor, Box<dyn ReadingSource>)>,
        sink: Arc<dyn AlertSink>,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        let stop = StopHandle {
            stop_tx: Arc::new(stop_tx),
        };

        let tasks = bindings
            .into_iter()
            .map(|(monitor, source)| {
                let channel = monitor.channel().to_string();
                let consumer = ChannelConsumer::new(monitor, source, sink.clone());
                let handle = tokio::spawn(consumer.run(stop.subscribe()));
                (channel, handle)
            })
            .collect();

        Self { stop, tasks }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Channels being watched, in spawn order.
    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|(channel, _)| channel.as_str())
    }

    /// Wait for every consumer to finish and collect their outcomes.
    pub async fn join(self) -> WatchReport {
        let mut report = WatchReport::default();

        for (channel, handle) in self.tasks {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(SourceError::Io(std::io::Error::other(format!(
                    "consumer task failed: {}",
                    e
                )))),
            };

            match &result {
                Ok(stats) => info!(
                    "Channel '{}' finished: {} received, {} absent, {} malformed, {} alerts",
                    channel, stats.received, stats.absent, stats.malformed, stats.alerts
                ),
                Err(e) => error!("Channel '{}' failed: {}", channel, e),
            }

            report.channels.push(ChannelReport { channel, result });
        }

        report
    }
}

/// Log how long each monitor stays silent before its first evaluation.
pub fn log_warm_up(monitors: &[WindowMonitor], cadence: Duration) {
    for monitor in monitors {
        let capacity = monitor.window().capacity();
        info!(
            "Channel '{}': {} readings per window, first evaluation after {}",
            monitor.channel(),
            capacity,
            format_duration(warm_up(cadence, capacity))
        );
    }
}

/// Time until a window of `capacity` readings first fills at `cadence`.
pub fn warm_up(cadence: Duration, capacity: usize) -> Duration {
    cadence.saturating_mul(u32::try_from(capacity).unwrap_or(u32::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::data::ChannelConfig;
    use crate::sink::ChannelSink;
    use crate::source::ChannelSource;

    #[tokio::test]
    async fn test_stop_requested_resolves_on_signal() {
        let (tx, mut rx) = watch::channel(false);
        let waiter = tokio::spawn(async move { stop_requested(&mut rx).await });
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_warm_up() {
        let cadence = Duration::from_secs(30);
        assert_eq!(warm_up(cadence, 5), Duration::from_secs(150));
        assert_eq!(warm_up(cadence, 20), Duration::from_secs(600));
        assert_eq!(warm_up(Duration::ZERO, 20), Duration::ZERO);
        // Capacities beyond u32 are clamped, not truncated
        assert_eq!(
            warm_up(cadence, usize::MAX),
            Duration::from_secs(30 * u32::MAX as u64)
        );
        assert_eq!(warm_up(Duration::MAX, 2), Duration::MAX);
    }

    #[tokio::test]
    async fn test_stop_requested_resolves_when_sender_dropped() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        stop_requested(&mut rx).await;
    }

    #[tokio::test]
    async fn test_watcher_runs_channels_independently() {
        let monitors = WindowMonitor::from_channels(&ChannelConfig::defaults()).unwrap();
        let (sink, mut alerts) = ChannelSink::create();

        let mut senders = Vec::new();
        let mut bindings: Vec<(WindowMonitor, Box<dyn ReadingSource>)> = Vec::new();
        for monitor in monitors {
            let (tx, source) = ChannelSource::create(monitor.channel(), 32);
            senders.push(tx);
            bindings.push((monitor, Box::new(source)));
        }

        let watcher = Watcher::spawn(bindings, Arc::new(sink));
        assert_eq!(
            watcher.channels().collect::<Vec<_>>(),
            vec!["smoker", "food1", "food2"]
        );

        // Only food2 sees a decrease; smoker and food1 stay flat
        for i in 0..20 {
            let ts = format!("03/07/23 14:{:02}:{:02}", i / 2, (i % 2) * 30);
            let food2 = if i == 19 { "149.9" } else { "150" };
            senders[0].send(format!("[{}, 225]", ts)).await.unwrap();
            senders[1].send(format!("[{}, 150]", ts)).await.unwrap();
            senders[2].send(format!("[{}, {}]", ts, food2)).await.unwrap();
        }
        drop(senders);

        let report = watcher.join().await;
        assert!(!report.has_failures());
        assert_eq!(report.total_alerts(), 1);

        let alert = alerts.recv().await.unwrap();
        assert_eq!(alert.channel, "food2");
        assert_eq!(alert.timestamp, "03/07/23 14:09:30");

        let json = report.to_json();
        assert_eq!(json["channels"][0]["channel"], "smoker");
        assert_eq!(json["channels"][0]["stats"]["received"], 20);
    }

    #[tokio::test]
    async fn test_watcher_stop_handle() {
        let monitor = WindowMonitor::new(&ChannelConfig::smoker()).unwrap();
        let (_tx, source) = ChannelSource::create("smoker", 4);
        let (sink, _alerts) = ChannelSink::create();

        let bindings = vec![(monitor, Box::new(source) as Box<dyn ReadingSource>)];
        let watcher = Watcher::spawn(bindings, Arc::new(sink));
        let stop = watcher.stop_handle();
        let mut subscriber = stop.subscribe();
        stop.stop();

        let report = tokio::time::timeout(Duration::from_secs(5), watcher.join())
            .await
            .unwrap();
        assert_eq!(report.channels.len(), 1);
        assert!(report.channels[0].result.is_ok());
        stop_requested(&mut subscriber).await;
    }
}
