//! Alert presentation.
//!
//! The monitors only produce [`Alert`] values; an [`AlertSink`] decides what
//! happens to them. The binary prints to stdout, tests and library callers
//! collect them through a channel.

use std::fmt::Debug;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::data::Alert;

/// Receives alerts from every channel consumer.
///
/// Called from consumer tasks, so implementations must not block for long.
pub trait AlertSink: Send + Sync + Debug {
    fn deliver(&self, alert: &Alert);
}

/// Output format for [`ConsoleSink`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AlertFormat {
    /// `[smoker] Smoker Alert: ...  Timestamp: [03/07/23 14:06:00, 35.5]`
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Prints alerts to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink {
    format: AlertFormat,
}

impl ConsoleSink {
    pub fn new(format: AlertFormat) -> Self {
        Self { format }
    }

    /// Render one alert as a single output line.
    pub fn render(&self, alert: &Alert) -> String {
        match self.format {
            AlertFormat::Text => alert.to_string(),
            AlertFormat::Json => match serde_json::to_string(alert) {
                Ok(line) => line,
                Err(e) => {
                    warn!("Failed to serialize alert as JSON: {}", e);
                    alert.to_string()
                }
            },
        }
    }
}

impl AlertSink for ConsoleSink {
    fn deliver(&self, alert: &Alert) {
        println!("{}", self.render(alert));
    }
}

/// Forwards alerts into an unbounded mpsc channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<Alert>,
}

impl ChannelSink {
    /// Create a sink and the receiver its alerts arrive on.
    pub fn create() -> (Self, mpsc::UnboundedReceiver<Alert>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl AlertSink for ChannelSink {
    fn deliver(&self, alert: &Alert) {
        if self.sender.send(alert.clone()).is_err() {
            debug!("Alert receiver dropped, discarding alert for '{}'", alert.channel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Condition;

    fn alert() -> Alert {
        Alert {
            channel: "smoker".to_string(),
            condition: Condition::RapidDrop,
            message: "Smoker Alert: The smoker has decreased by more than 15 degrees in the last 2.5 minutes".to_string(),
            timestamp: "03/07/23 14:06:00".to_string(),
            raw: "[03/07/23 14:06:00, 35.5]".to_string(),
            reference: 51.0,
            current: 35.5,
        }
    }

    #[test]
    fn test_console_sink_text() {
        let line = ConsoleSink::default().render(&alert());
        assert!(line.starts_with("[smoker] Smoker Alert:"));
        assert!(line.ends_with("Timestamp: [03/07/23 14:06:00, 35.5]"));
    }

    #[test]
    fn test_console_sink_json() {
        let line = ConsoleSink::new(AlertFormat::Json).render(&alert());
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["channel"], "smoker");
        assert_eq!(value["condition"], "rapid-drop");
        assert_eq!(value["timestamp"], "03/07/23 14:06:00");
        assert_eq!(value["current"], 35.5);
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_channel_sink_forwards() {
        let (sink, mut rx) = ChannelSink::create();
        sink.deliver(&alert());
        assert_eq!(rx.try_recv().unwrap(), alert());
    }

    #[test]
    fn test_channel_sink_ignores_dropped_receiver() {
        let (sink, rx) = ChannelSink::create();
        drop(rx);
        sink.deliver(&alert());
    }
}
