//! FIFO of admitted keyframes awaiting export.
//!
//! The queue itself is not synchronized. The pipeline wraps it in
//! `Arc<Mutex<FrameQueue>>` and every caller takes the lock for the duration
//! of a single operation.

use std::collections::VecDeque;

use crate::capture::FrameCacheEntry;

/// Keyframes in admission order.
#[derive(Debug, Default)]
pub struct FrameQueue {
    entries: VecDeque<FrameCacheEntry>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `entry`, replacing any queued entry captured at the same timestamp.
    pub fn enqueue(&mut self, entry: FrameCacheEntry) {
        let timestamp = entry.timestamp();
        self.entries.retain(|e| e.timestamp() != timestamp);
        self.entries.push_back(entry);
    }

    pub fn dequeue(&mut self) -> Option<FrameCacheEntry> {
        self.entries.pop_front()
    }

    /// Remove and return every entry, oldest first.
    pub fn dequeue_all(&mut self) -> Vec<FrameCacheEntry> {
        self.entries.drain(..).collect()
    }

    /// Remove the first entry captured at `timestamp`.
    pub fn remove(&mut self, timestamp: f64) -> Option<FrameCacheEntry> {
        let position = self
            .entries
            .iter()
            .position(|e| e.timestamp() == timestamp)?;
        self.entries.remove(position)
    }

    /// Whether an entry with this timestamp is queued.
    pub fn is_in_queue(&self, timestamp: f64) -> bool {
        self.entries.iter().any(|e| e.timestamp() == timestamp)
    }

    pub fn head(&self) -> Option<&FrameCacheEntry> {
        self.entries.front()
    }

    pub fn tail(&self) -> Option<&FrameCacheEntry> {
        self.entries.back()
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
