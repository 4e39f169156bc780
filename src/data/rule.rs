//! Trend rules evaluated over a full window.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::window::Window;

/// The condition an alert reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Condition {
    /// A fast drop anywhere in the window (fuel or fire loss).
    RapidDrop,
    /// The window ends lower than it started (food stall).
    Stall,
}

impl Condition {
    /// Returns a short label for display.
    pub fn label(&self) -> &'static str {
        match self {
            Condition::RapidDrop => "rapid drop",
            Condition::Stall => "stall",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A trend rule and its threshold.
///
/// In configuration files this is written as an inline table, e.g.
/// `rule = { kind = "stall-endpoints", threshold = -1.0 }`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TrendRule {
    /// Fires when any earlier value exceeds the newest by more than `threshold`.
    DropAnyOfWindow { threshold: f64 },
    /// Fires when `newest - oldest` is strictly below `threshold`.
    StallEndpoints { threshold: f64 },
}

/// The comparison that made a rule fire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trigger {
    /// The earlier value the newest one was compared against.
    pub reference: f64,
    /// The newest value in the window.
    pub current: f64,
}

impl TrendRule {
    pub fn threshold(&self) -> f64 {
        match *self {
            TrendRule::DropAnyOfWindow { threshold } | TrendRule::StallEndpoints { threshold } => {
                threshold
            }
        }
    }

    pub fn condition(&self) -> Condition {
        match self {
            TrendRule::DropAnyOfWindow { .. } => Condition::RapidDrop,
            TrendRule::StallEndpoints { .. } => Condition::Stall,
        }
    }

    /// Generic alert sentence used when a channel has no description of its own.
    pub fn describe(&self, channel: &str, capacity: usize) -> String {
        match *self {
            TrendRule::DropAnyOfWindow { threshold } => format!(
                "{} Alert: {} has dropped by more than {} within the last {} readings",
                channel, channel, threshold, capacity
            ),
            TrendRule::StallEndpoints { threshold } => format!(
                "{} Stall: {} changed by less than {} across the last {} readings",
                channel, channel, threshold, capacity
            ),
        }
    }

    /// Evaluate the rule against a window.
    ///
    /// Callers only evaluate full windows; an empty window never fires.
    pub fn evaluate(&self, window: &Window) -> Option<Trigger> {
        let current = window.newest()?;
        match *self {
            TrendRule::DropAnyOfWindow { threshold } => window
                .iter()
                .take(window.len() - 1)
                .find(|&earlier| earlier - current > threshold)
                .map(|reference| Trigger { reference, current }),
            TrendRule::StallEndpoints { threshold } => {
                let reference = window.oldest()?;
                (current - reference < threshold).then_some(Trigger { reference, current })
            }
        }
    }
}
