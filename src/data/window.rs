//! Fixed-capacity trailing window of readings.

use std::collections::VecDeque;

/// The most recent numeric readings for one channel, oldest first.
///
/// Pushing into a full window evicts the oldest value, so the length never
/// exceeds the capacity.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    values: VecDeque<f64>,
    capacity: usize,
}

impl Window {
    /// Create an empty window holding at most `capacity` values.
    pub fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::new(),
            capacity,
        }
    }

    /// Append a value, returning the evicted oldest value if the window was full.
    pub fn push(&mut self, value: f64) -> Option<f64> {
        self.values.push_back(value);
        if self.values.len() > self.capacity {
            self.values.pop_front()
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether the window holds exactly `capacity` values.
    pub fn is_full(&self) -> bool {
        self.capacity > 0 && self.values.len() == self.capacity
    }

    /// The most recent value.
    pub fn newest(&self) -> Option<f64> {
        self.values.back().copied()
    }

    /// The least recent value.
    pub fn oldest(&self) -> Option<f64> {
        self.values.front().copied()
    }

    /// Values from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    /// Copy of the current contents, oldest first.
    pub fn to_vec(&self) -> Vec<f64> {
        self.values.iter().copied().collect()
    }
}
