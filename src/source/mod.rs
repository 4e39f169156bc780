//! Reading source abstraction.
//!
//! This module provides a trait-based abstraction for receiving reading
//! messages for one channel from various transports (in-memory channels,
//! message brokers), plus the CSV replay feed that produces them.

#[cfg(feature = "amqp")]
pub mod amqp;
mod channel;
mod file;

pub use channel::{AckCounter, ChannelSource};
pub use file::{CsvHeader, CsvReplay, ReplayStats, ReplayTarget};

use std::fmt::Debug;

use async_trait::async_trait;

use crate::error::SourceError;

/// A message received from a source, waiting to be acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Transport identifier passed back to [`ReadingSource::ack`].
    pub tag: u64,
    /// The message text, e.g. `[03/07/23 14:06:00, 35.5]`.
    pub payload: String,
}

/// Trait for receiving the messages of one channel.
///
/// Consumers call [`recv`](ReadingSource::recv), process the delivery, and
/// only then call [`ack`](ReadingSource::ack) with its tag.
///
/// # Example
///
/// ```
/// use smokewatch::{ChannelSource, ReadingSource};
///
/// # tokio_test::block_on(async {
/// let (tx, mut source) = ChannelSource::create("smoker", 4);
/// tx.send("[03/07/23 14:06:00, 35.5]".to_string()).await.unwrap();
///
/// let delivery = source.recv().await.unwrap().unwrap();
/// source.ack(delivery.tag).await.unwrap();
/// # });
/// ```
#[async_trait]
pub trait ReadingSource: Send + Debug {
    /// Wait for the next message.
    ///
    /// Returns `Ok(None)` once the source is exhausted.
    async fn recv(&mut self) -> Result<Option<Delivery>, SourceError>;

    /// Tell the transport a delivery has been handled.
    async fn ack(&mut self, tag: u64) -> Result<(), SourceError>;

    /// Release transport resources.
    async fn close(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    /// Returns a human-readable description of the source.
    fn description(&self) -> &str;
}
