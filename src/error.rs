//! Error types for readings, configuration and transports.

use thiserror::Error;

/// Errors raised while extracting a reading from an inbound message.
///
/// These are never fatal: the consumer reports them and moves on to the
/// next message.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReadingError {
    /// The message does not follow the `[<timestamp>, <value>]` framing.
    #[error("Malformed reading {payload:?}: {reason}")]
    Malformed {
        payload: String,
        reason: &'static str,
    },

    /// The value field is present but is not a finite number.
    #[error("Non-numeric value {value:?} in reading {payload:?}")]
    NotNumeric { payload: String, value: String },

    /// A timestamp that would break the fixed value offset.
    #[error("Timestamp {timestamp:?} is not {expected} characters wide")]
    TimestampWidth { timestamp: String, expected: usize },
}

/// Errors raised while building monitors from configuration.
///
/// All of these are fatal and surface before any reading is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A window too small to compare two readings.
    #[error("Channel '{channel}': window capacity {capacity} is too small (minimum {minimum})")]
    CapacityTooSmall {
        channel: String,
        capacity: usize,
        minimum: usize,
    },

    /// A window larger than any cook could fill.
    #[error("Channel '{channel}': window capacity {capacity} is too large (maximum {maximum})")]
    CapacityTooLarge {
        channel: String,
        capacity: usize,
        maximum: usize,
    },

    /// Threshold is NaN or infinite.
    #[error("Channel '{channel}': threshold must be finite, got {threshold}")]
    NonFiniteThreshold { channel: String, threshold: f64 },

    /// Two channels share a name.
    #[error("Duplicate channel name '{0}'")]
    DuplicateChannel(String),

    /// Nothing to monitor.
    #[error("No channels configured")]
    NoChannels,

    /// The replay cadence could not be parsed.
    #[error("Invalid cadence '{value}': {reason}")]
    InvalidCadence { value: String, reason: String },

    /// The settings file or environment could not be read or deserialized.
    #[error("Failed to load settings: {0}")]
    Load(#[from] config::ConfigError),
}

/// Errors raised by reading sources (file replay, broker, channels).
#[derive(Debug, Error)]
pub enum SourceError {
    /// I/O failure reading a file or stream.
    #[error("Read error: {0}")]
    Io(#[from] std::io::Error),

    /// A column named in the channel configuration is absent from the header.
    #[error("Column '{0}' not found in header")]
    MissingColumn(String),

    /// The replay file has no header row.
    #[error("Empty input: no header row")]
    EmptyInput,

    /// Broker failure.
    #[cfg(feature = "amqp")]
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),
}
