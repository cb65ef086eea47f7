use crate::types::WithTimestamp;
use std::{
    collections::{VecDeque, vec_deque},
    time::Duration,
};

/// A bounded buffer of unmatched messages kept in arrival order.
///
/// Pushing into a full buffer evicts the oldest entry first, so a
/// stream whose partners never arrive cannot grow memory.
#[derive(Debug)]
pub struct PendingBuffer<T>
where
    T: WithTimestamp,
{
    buffer: VecDeque<T>,
    capacity: usize,
}

impl<T> PendingBuffer<T>
where
    T: WithTimestamp,
{
    /// Creates a buffer holding at most `capacity` messages. A zero
    /// capacity is treated as one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() >= self.capacity
    }

    pub fn front(&self) -> Option<&T> {
        self.buffer.front()
    }

    pub fn back(&self) -> Option<&T> {
        self.buffer.back()
    }

    pub fn iter(&self) -> vec_deque::Iter<'_, T> {
        self.buffer.iter()
    }

    /// Appends a message. If the buffer is at capacity, the oldest
    /// message is evicted and returned.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.is_full() {
            self.buffer.pop_front()
        } else {
            None
        };
        self.buffer.push_back(item);
        evicted
    }

    /// Removes the message at `index` in arrival order.
    pub fn remove(&mut self, index: usize) -> Option<T> {
        self.buffer.remove(index)
    }

    /// Drops every message whose timestamp is strictly before `ts` and
    /// returns the number of dropped messages.
    ///
    /// Unlike a time-ordered buffer this scans the whole buffer, since
    /// out-of-order arrivals may sit behind newer messages.
    pub fn drop_before(&mut self, ts: Duration) -> usize {
        let before = self.buffer.len();
        self.buffer.retain(|item| item.timestamp() >= ts);
        before - self.buffer.len()
    }
}
