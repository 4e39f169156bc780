//! Per-channel window monitors.
//!
//! A [`WindowMonitor`] owns the trailing window for one channel and the rule
//! evaluated over it. It is pure state: [`WindowMonitor::observe`] returns the
//! alert instead of reporting it, so the caller decides where alerts go.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::rule::{Condition, TrendRule};
use super::window::Window;
use crate::error::{ConfigError, ReadingError};
use crate::reading::Reading;

/// Smallest window that allows comparing two readings.
pub const MIN_CAPACITY: usize = 2;

/// Largest accepted window: a day of readings at the 30 second cadence.
pub const MAX_CAPACITY: usize = 2880;

/// Configuration for one monitored channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Channel identity used in alerts and logs.
    pub name: String,
    /// Number of readings the rule is evaluated over.
    pub capacity: usize,
    pub rule: TrendRule,
    /// Alert sentence. Defaults to a generic description of the rule.
    #[serde(default)]
    pub description: Option<String>,
    /// Column holding this channel in the replay CSV. Defaults to `name`.
    #[serde(default)]
    pub column: Option<String>,
    /// Broker queue carrying this channel. Defaults to `name`.
    #[serde(default)]
    pub queue: Option<String>,
}

impl ChannelConfig {
    pub fn new(name: impl Into<String>, capacity: usize, rule: TrendRule) -> Self {
        Self {
            name: name.into(),
            capacity,
            rule,
            description: None,
            column: None,
            queue: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    /// Smoker temperature: a drop of more than 15 degrees within 2.5 minutes.
    pub fn smoker() -> Self {
        Self::new("smoker", 5, TrendRule::DropAnyOfWindow { threshold: 15.0 })
            .with_column("Channel1")
            .with_description(
                "Smoker Alert: The smoker has decreased by more than 15 degrees in the last 2.5 minutes",
            )
    }

    /// Food probe 1: a fall of more than 1 degree over 10 minutes.
    pub fn food1() -> Self {
        Self::new("food1", 20, TrendRule::StallEndpoints { threshold: -1.0 })
            .with_column("Channel2")
            .with_description(
                "Food Stall: Food 1 has decreased by more than 1 degree over the last 10 minutes",
            )
    }

    /// Food probe 2: any fall at all over 10 minutes.
    pub fn food2() -> Self {
        Self::new("food2", 20, TrendRule::StallEndpoints { threshold: 0.0 })
            .with_column("Channel3")
            .with_description("Food Stall: Food 2 has decreased over the last 10 minutes")
    }

    /// The three built-in channels.
    pub fn defaults() -> Vec<Self> {
        vec![Self::smoker(), Self::food1(), Self::food2()]
    }

    pub fn column(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.name)
    }

    pub fn queue(&self) -> &str {
        self.queue.as_deref().unwrap_or(&self.name)
    }

    pub fn alert_description(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| self.rule.describe(&self.name, self.capacity))
    }

    /// Check that a monitor can be built from this configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity < MIN_CAPACITY {
            return Err(ConfigError::CapacityTooSmall {
                channel: self.name.clone(),
                capacity: self.capacity,
                minimum: MIN_CAPACITY,
            });
        }
        if self.capacity > MAX_CAPACITY {
            return Err(ConfigError::CapacityTooLarge {
                channel: self.name.clone(),
                capacity: self.capacity,
                maximum: MAX_CAPACITY,
            });
        }
        let threshold = self.rule.threshold();
        if !threshold.is_finite() {
            return Err(ConfigError::NonFiniteThreshold {
                channel: self.name.clone(),
                threshold,
            });
        }
        Ok(())
    }
}

/// Validate a set of channels: non-empty, unique names, each one valid.
pub fn validate_channels(channels: &[ChannelConfig]) -> Result<(), ConfigError> {
    if channels.is_empty() {
        return Err(ConfigError::NoChannels);
    }
    let mut seen = HashSet::new();
    for channel in channels {
        channel.validate()?;
        if !seen.insert(channel.name.as_str()) {
            return Err(ConfigError::DuplicateChannel(channel.name.clone()));
        }
    }
    Ok(())
}

/// An alert raised by a monitor. Emitted once, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub channel: String,
    pub condition: Condition,
    /// Human-readable condition sentence.
    pub message: String,
    /// Timestamp of the reading that triggered the alert.
    pub timestamp: String,
    /// The triggering message as received.
    pub raw: String,
    /// Value the newest reading was compared against.
    pub reference: f64,
    /// Newest reading.
    pub current: f64,
}

impl Alert {
    /// Signed change from the reference value to the newest reading.
    pub fn change(&self) -> f64 {
        self.current - self.reference
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}  Timestamp: {}",
            self.channel, self.message, self.raw
        )
    }
}

/// Trailing-window trend monitor for one channel.
#[derive(Debug, Clone)]
pub struct WindowMonitor {
    channel: String,
    description: String,
    rule: TrendRule,
    window: Window,
}

impl WindowMonitor {
    /// Build a monitor, rejecting invalid configuration up front.
    pub fn new(config: &ChannelConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            channel: config.name.clone(),
            description: config.alert_description(),
            rule: config.rule,
            window: Window::new(config.capacity),
        })
    }

    /// Build one monitor per channel, in order.
    pub fn from_channels(channels: &[ChannelConfig]) -> Result<Vec<Self>, ConfigError> {
        validate_channels(channels)?;
        channels.iter().map(Self::new).collect()
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn rule(&self) -> TrendRule {
        self.rule
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Feed one reading.
    ///
    /// Absent readings are ignored. The rule is only evaluated once the
    /// window is full; when it fires the window is cleared, so the next
    /// reading starts a fresh warm-up.
    pub fn observe(&mut self, reading: &Reading) -> Option<Alert> {
        let value = reading.value?;
        self.window.push(value);
        if !self.window.is_full() {
            return None;
        }

        let trigger = self.rule.evaluate(&self.window)?;
        self.window.clear();

        Some(Alert {
            channel: self.channel.clone(),
            condition: self.rule.condition(),
            message: self.description.clone(),
            timestamp: reading.timestamp.clone(),
            raw: reading.raw.clone(),
            reference: trigger.reference,
            current: trigger.current,
        })
    }

    /// Parse a raw message and feed it.
    ///
    /// A malformed message leaves the window untouched.
    pub fn observe_message(&mut self, payload: &str) -> Result<Option<Alert>, ReadingError> {
        let reading = Reading::parse(payload)?;
        Ok(self.observe(&reading))
    }

    /// Drop all buffered readings.
    pub fn reset(&mut self) {
        self.window.clear();
    }
}
