//! Per-channel consumer loop.
//!
//! A [`ChannelConsumer`] pulls messages from one [`ReadingSource`], feeds them
//! to its [`WindowMonitor`], hands alerts to the sink and acknowledges each
//! delivery once it has been processed.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::data::WindowMonitor;
use crate::error::SourceError;
use crate::reading::Reading;
use crate::sink::AlertSink;
use crate::source::ReadingSource;
use crate::watch::stop_requested;

/// Counters for one consumer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    /// Messages taken from the source.
    pub received: u64,
    /// Readings with no probe value.
    pub absent: u64,
    /// Messages rejected as malformed.
    pub malformed: u64,
    /// Alerts raised.
    pub alerts: u64,
    /// Deliveries acknowledged to the source.
    pub acknowledged: u64,
}

/// Drives one monitor from one source.
#[derive(Debug)]
pub struct ChannelConsumer {
    monitor: WindowMonitor,
    source: Box<dyn ReadingSource>,
    sink: Arc<dyn AlertSink>,
    stats: ChannelStats,
}

impl ChannelConsumer {
    pub fn new(
        monitor: WindowMonitor,
        source: Box<dyn ReadingSource>,
        sink: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            monitor,
            source,
            sink,
            stats: ChannelStats::default(),
        }
    }

    pub fn channel(&self) -> &str {
        self.monitor.channel()
    }

    /// Consume until the source is exhausted or `stop` is raised.
    ///
    /// Window state is dropped on return. Transport errors end the loop and
    /// are returned after the source has been closed.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> Result<ChannelStats, SourceError> {
        info!(
            "Consuming '{}' from {}",
            self.monitor.channel(),
            self.source.description()
        );

        let outcome = 'consume: loop {
            if *stop.borrow() {
                break 'consume Ok(());
            }

            let next = tokio::select! {
                _ = stop_requested(&mut stop) => break 'consume Ok(()),
                next = self.source.recv() => next,
            };

            match next {
                Ok(Some(delivery)) => {
                    self.process(&delivery.payload);
                    // Only acknowledge once the reading is reflected in the window
                    if let Err(e) = self.source.ack(delivery.tag).await {
                        break Err(e);
                    }
                    self.stats.acknowledged += 1;
                }
                Ok(None) => {
                    info!("Source for '{}' is exhausted", self.monitor.channel());
                    break Ok(());
                }
                Err(e) => break Err(e),
            }
        };

        let closed = self.source.close().await;
        outcome?;
        closed?;
        Ok(self.stats)
    }

    /// Parse one message and feed it to the monitor.
    fn process(&mut self, payload: &str) {
        self.stats.received += 1;

        let reading = match Reading::parse(payload) {
            Ok(reading) => reading,
            Err(e) => {
                self.stats.malformed += 1;
                warn!("Rejected reading on '{}': {}", self.monitor.channel(), e);
                return;
            }
        };

        if reading.is_absent() {
            self.stats.absent += 1;
            debug!(
                "No reading on '{}' at {}",
                self.monitor.channel(),
                reading.timestamp
            );
            return;
        }

        if let Some(alert) = self.monitor.observe(&reading) {
            self.stats.alerts += 1;
            info!(
                "{} on '{}' at {}: {} -> {} ({:+.1})",
                alert.condition,
                alert.channel,
                alert.timestamp,
                alert.reference,
                alert.current,
                alert.change()
            );
            self.sink.deliver(&alert);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::data::{Alert, ChannelConfig};
    use crate::sink::ChannelSink;
    use crate::source::{ChannelSource, Delivery};

    fn message(second: u32, value: &str) -> String {
        format!("[03/07/23 14:{:02}:{:02}, {}]", second / 60, second % 60, value)
    }

    /// Source that records acknowledgements into a shared event log.
    #[derive(Debug)]
    struct RecordingSource {
        pending: Vec<String>,
        log: Arc<Mutex<Vec<String>>>,
        fail_after: Option<usize>,
    }

    #[async_trait]
    impl ReadingSource for RecordingSource {
        async fn recv(&mut self) -> Result<Option<Delivery>, SourceError> {
            if self.fail_after == Some(0) {
                return Err(SourceError::Io(std::io::Error::other("connection reset")));
            }
            if let Some(n) = self.fail_after.as_mut() {
                *n -= 1;
            }
            if self.pending.is_empty() {
                return Ok(None);
            }
            let payload = self.pending.remove(0);
            let tag = self.log.lock().unwrap().len() as u64;
            Ok(Some(Delivery { tag, payload }))
        }

        async fn ack(&mut self, tag: u64) -> Result<(), SourceError> {
            self.log.lock().unwrap().push(format!("ack {}", tag));
            Ok(())
        }

        async fn close(&mut self) -> Result<(), SourceError> {
            self.log.lock().unwrap().push("close".to_string());
            Ok(())
        }

        fn description(&self) -> &str {
            "recording"
        }
    }

    /// Sink writing into the same log as [`RecordingSource`].
    #[derive(Debug)]
    struct LogSink(Arc<Mutex<Vec<String>>>);

    impl AlertSink for LogSink {
        fn deliver(&self, alert: &Alert) {
            self.0.lock().unwrap().push(format!("alert {}", alert.timestamp));
        }
    }

    fn smoker() -> WindowMonitor {
        WindowMonitor::new(&ChannelConfig::smoker()).unwrap()
    }

    #[tokio::test]
    async fn test_consumer_counts_and_alerts() {
        let (tx, source) = ChannelSource::create("test", 16);
        let acked = source.ack_counter();
        let (sink, mut alerts) = ChannelSink::create();
        let (_stop_tx, stop_rx) = watch::channel(false);

        for (i, value) in ["200", "200", "", "200", "oops", "200", "180", "150"]
            .iter()
            .enumerate()
        {
            tx.send(message(i as u32 * 30, value)).await.unwrap();
        }
        drop(tx);

        let consumer = ChannelConsumer::new(smoker(), Box::new(source), Arc::new(sink));
        assert_eq!(consumer.channel(), "smoker");
        let stats = consumer.run(stop_rx).await.unwrap();

        assert_eq!(
            stats,
            ChannelStats {
                received: 8,
                absent: 1,
                malformed: 1,
                alerts: 1,
                acknowledged: 8,
            }
        );
        assert_eq!(acked.get(), 8);

        let alert = alerts.recv().await.unwrap();
        assert_eq!(alert.raw, "[03/07/23 14:03:00, 180]");
        assert!(alerts.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_consumer_acks_after_alert() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let source = RecordingSource {
            pending: (0..5)
                .map(|i| message(i * 30, if i == 4 { "180" } else { "200" }))
                .collect(),
            log: log.clone(),
            fail_after: None,
        };
        let (_stop_tx, stop_rx) = watch::channel(false);

        let consumer =
            ChannelConsumer::new(smoker(), Box::new(source), Arc::new(LogSink(log.clone())));
        consumer.run(stop_rx).await.unwrap();

        let log = log.lock().unwrap().clone();
        assert_eq!(
            log,
            vec![
                "ack 0",
                "ack 1",
                "ack 2",
                "ack 3",
                "alert 03/07/23 14:02:00",
                "ack 4",
                "close",
            ]
        );
    }

    #[tokio::test]
    async fn test_consumer_stops_on_signal() {
        let (tx, source) = ChannelSource::create("test", 16);
        let (sink, _alerts) = ChannelSink::create();
        let (stop_tx, stop_rx) = watch::channel(false);

        let consumer = ChannelConsumer::new(smoker(), Box::new(source), Arc::new(sink));
        let handle = tokio::spawn(consumer.run(stop_rx));

        tx.send(message(0, "200")).await.unwrap();
        stop_tx.send(true).unwrap();

        let stats = handle.await.unwrap().unwrap();
        assert!(stats.received <= 1);
        // The source was closed on the way out
        assert!(tx.send(message(30, "200")).await.is_err());
    }

    #[tokio::test]
    async fn test_consumer_stops_when_already_signalled() {
        let (tx, source) = ChannelSource::create("test", 16);
        tx.send(message(0, "200")).await.unwrap();
        let (sink, _alerts) = ChannelSink::create();
        let (_stop_tx, stop_rx) = watch::channel(true);

        let stats = ChannelConsumer::new(smoker(), Box::new(source), Arc::new(sink))
            .run(stop_rx)
            .await
            .unwrap();
        assert_eq!(stats, ChannelStats::default());
    }

    #[tokio::test]
    async fn test_consumer_returns_transport_error() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let source = RecordingSource {
            pending: vec![message(0, "200"), message(30, "200")],
            log: log.clone(),
            fail_after: Some(1),
        };
        let (_stop_tx, stop_rx) = watch::channel(false);

        let result = ChannelConsumer::new(smoker(), Box::new(source), Arc::new(LogSink(log.clone())))
            .run(stop_rx)
            .await;
        assert!(matches!(result, Err(SourceError::Io(_))));
        assert_eq!(log.lock().unwrap().clone(), vec!["ack 0", "close"]);
    }
}
