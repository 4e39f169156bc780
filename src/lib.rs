//! # smokewatch
//!
//! Windowed trend alerts for smoker temperature probes.
//!
//! A smoker reports three temperatures every 30 seconds: the smoker itself
//! and two food probes. Each one arrives on its own channel as a message like
//! `[03/07/23 14:06:00, 35.5]` (the value may be empty when a probe is not
//! plugged in). This crate keeps a short trailing window per channel and
//! raises an alert when the window shows trouble:
//!
//! - **smoker**: a drop of more than 15 degrees within 2.5 minutes (the fire
//!   is going out),
//! - **food1 / food2**: the temperature has fallen over 10 minutes (the food
//!   has stalled).
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  ┌──────────┐   ┌──────────┐   ┌──────────────┐   ┌───────┐  │
//! │  │  source  │──▶│ consumer │──▶│     data     │──▶│ sink  │  │
//! │  │ (input)  │◀──│  (ack)   │   │ (monitoring) │   │(alert)│  │
//! │  └──────────┘   └────┬─────┘   └──────────────┘   └───────┘  │
//! │       ▲              │ one task per channel                  │
//! │       │              ▼                                       │
//! │  CsvReplay      ┌──────────┐                                 │
//! │  AmqpSource     │  watch   │◀── stop (Ctrl-C)                │
//! │  ChannelSource  └──────────┘                                 │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`reading`]**: Parsing of `[<timestamp>, <value>]` messages into [`Reading`]s
//! - **[`data`]**: The windows, trend rules and per-channel [`WindowMonitor`]s
//! - **[`source`]**: The [`ReadingSource`] trait with in-memory and broker
//!   implementations, plus the CSV replay feed
//! - **[`consumer`]**: The per-channel receive, observe, acknowledge loop
//! - **[`watch`]**: Spawning consumers and stopping them together
//! - **[`sink`]**: Where alerts go ([`AlertSink`])
//! - **[`settings`]**: Channel and transport configuration
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! # Replay a recorded cook, one row every 30 seconds
//! smokewatch --file smokertemps.csv
//!
//! # Same, as fast as possible, alerts as JSON lines
//! smokewatch --file smokertemps.csv --cadence 0s --json
//!
//! # Listen on RabbitMQ queues instead
//! smokewatch --subscribe --config smokewatch.toml
//! ```
//!
//! ### As a library
//!
//! ```
//! use smokewatch::{ChannelConfig, WindowMonitor};
//!
//! let mut monitor = WindowMonitor::new(&ChannelConfig::smoker()).unwrap();
//! for value in ["200", "199", "198", "197"] {
//!     let message = format!("[03/07/23 14:06:00, {}]", value);
//!     assert!(monitor.observe_message(&message).unwrap().is_none());
//! }
//!
//! let alert = monitor
//!     .observe_message("[03/07/23 14:08:00, 180]")
//!     .unwrap()
//!     .expect("a 20 degree drop");
//! assert_eq!(alert.channel, "smoker");
//! assert!(monitor.window().is_empty());
//! ```
//!
//! ### Watching channels concurrently
//!
//! ```
//! use std::sync::Arc;
//! use smokewatch::{ChannelConfig, ChannelSink, ChannelSource, ReadingSource, Watcher, WindowMonitor};
//!
//! # tokio_test::block_on(async {
//! let monitor = WindowMonitor::new(&ChannelConfig::food1()).unwrap();
//! let (tx, source) = ChannelSource::create("food1", 16);
//! let (sink, mut alerts) = ChannelSink::create();
//!
//! let bindings = vec![(monitor, Box::new(source) as Box<dyn ReadingSource>)];
//! let watcher = Watcher::spawn(bindings, Arc::new(sink));
//!
//! tx.send("[03/07/23 14:06:00, 150]".to_string()).await.unwrap();
//! drop(tx);
//!
//! let report = watcher.join().await;
//! assert_eq!(report.total_alerts(), 0);
//! assert!(alerts.try_recv().is_err());
//! # });
//! ```

pub mod consumer;
pub mod data;
pub mod error;
pub mod reading;
pub mod settings;
pub mod sink;
pub mod source;
pub mod watch;

// Re-export main types for convenience
pub use consumer::{ChannelConsumer, ChannelStats};
pub use data::{Alert, ChannelConfig, Condition, TrendRule, Window, WindowMonitor};
pub use error::{ConfigError, ReadingError, SourceError};
pub use reading::Reading;
pub use settings::{AmqpSettings, Settings};
pub use sink::{AlertFormat, AlertSink, ChannelSink, ConsoleSink};
pub use source::{ChannelSource, CsvReplay, Delivery, ReadingSource, ReplayTarget};
pub use watch::{StopHandle, WatchReport, Watcher};
