//! Windowed trend analysis.
//!
//! This module holds the core of the crate: per-channel trailing windows and
//! the rules evaluated over them.
//!
//! ## Submodules
//!
//! - [`duration`]: Parsing and formatting of duration strings (e.g., "30s", "500ms")
//! - [`window`]: Fixed-capacity ring buffer of recent readings ([`Window`])
//! - [`rule`]: Trend rules ([`TrendRule`]) and the conditions they report
//! - [`monitor`]: Per-channel monitors ([`WindowMonitor`]) and their [`Alert`]s
//!
//! ## Data Flow
//!
//! ```text
//! "[03/07/23 14:06:00, 35.5]"
//!        │
//!        ▼
//! Reading::parse()
//!        │
//!        ▼
//! WindowMonitor::observe() ──▶ Window::push()
//!        │                          │ (full)
//!        │                          ▼
//!        │                   TrendRule::evaluate()
//!        ▼
//! Option<Alert> (window cleared when Some)
//! ```

pub mod duration;
pub mod monitor;
pub mod rule;
pub mod window;

pub use monitor::{validate_channels, Alert, ChannelConfig, WindowMonitor, MAX_CAPACITY, MIN_CAPACITY};
pub use rule::{Condition, TrendRule, Trigger};
pub use window::Window;
