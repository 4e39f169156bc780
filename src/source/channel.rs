//! Channel-based reading source.
//!
//! Receives messages via a tokio mpsc channel. This is the in-memory
//! transport used by the CSV replay feed, by library callers bridging their
//! own transport, and by tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Delivery, ReadingSource};
use crate::error::SourceError;

/// Shared count of acknowledged deliveries.
///
/// Stays readable after the source has been moved into a consumer task.
#[derive(Debug, Clone, Default)]
pub struct AckCounter(Arc<AtomicU64>);

impl AckCounter {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

/// A source that receives messages from an in-memory channel.
///
/// # Example
///
/// ```
/// use smokewatch::ChannelSource;
///
/// // Create a channel pair
/// let (tx, source) = ChannelSource::create("food1", 16);
/// ```
#[derive(Debug)]
pub struct ChannelSource {
    receiver: mpsc::Receiver<String>,
    description: String,
    next_tag: u64,
    acked: AckCounter,
}

impl ChannelSource {
    /// Create a new channel source.
    ///
    /// # Arguments
    ///
    /// * `receiver` - The receiving end of an mpsc channel
    /// * `source_description` - Where messages come from (e.g. "replay:smoker")
    pub fn new(receiver: mpsc::Receiver<String>, source_description: &str) -> Self {
        Self {
            receiver,
            description: format!("channel: {}", source_description),
            next_tag: 1,
            acked: AckCounter::default(),
        }
    }

    /// Create a channel pair for sending messages to a ChannelSource.
    ///
    /// Returns (sender, source). Dropping every sender exhausts the source.
    pub fn create(source_description: &str, buffer: usize) -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self::new(rx, source_description))
    }

    /// Handle to the number of acknowledged deliveries.
    pub fn ack_counter(&self) -> AckCounter {
        self.acked.clone()
    }
}

#[async_trait]
impl ReadingSource for ChannelSource {
    async fn recv(&mut self) -> Result<Option<Delivery>, SourceError> {
        let Some(payload) = self.receiver.recv().await else {
            return Ok(None);
        };
        let tag = self.next_tag;
        self.next_tag += 1;
        Ok(Some(Delivery { tag, payload }))
    }

    async fn ack(&mut self, _tag: u64) -> Result<(), SourceError> {
        self.acked.increment();
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SourceError> {
        self.receiver.close();
        Ok(())
    }

    fn description(&self) -> &str {
        &self.description
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_source_recv_in_order() {
        let (tx, mut source) = ChannelSource::create("test", 4);
        tx.send("first".to_string()).await.unwrap();
        tx.send("second".to_string()).await.unwrap();

        let first = source.recv().await.unwrap().unwrap();
        let second = source.recv().await.unwrap().unwrap();
        assert_eq!(first.payload, "first");
        assert_eq!(second.payload, "second");
        assert!(second.tag > first.tag);
    }

    #[tokio::test]
    async fn test_channel_source_exhausted_when_sender_dropped() {
        let (tx, mut source) = ChannelSource::create("test", 4);
        tx.send("only".to_string()).await.unwrap();
        drop(tx);

        assert!(source.recv().await.unwrap().is_some());
        assert!(source.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_channel_source_counts_acks() {
        let (tx, mut source) = ChannelSource::create("test", 4);
        let acked = source.ack_counter();
        tx.send("one".to_string()).await.unwrap();

        let delivery = source.recv().await.unwrap().unwrap();
        assert_eq!(acked.get(), 0);
        source.ack(delivery.tag).await.unwrap();
        assert_eq!(acked.get(), 1);
    }

    #[tokio::test]
    async fn test_channel_source_close_rejects_senders() {
        let (tx, mut source) = ChannelSource::create("test", 4);
        source.close().await.unwrap();
        assert!(tx.send("late".to_string()).await.is_err());
    }

    #[test]
    fn test_channel_source_description() {
        let (_tx, source) = ChannelSource::create("replay:smoker", 1);
        assert_eq!(source.description(), "channel: replay:smoker");
    }
}
