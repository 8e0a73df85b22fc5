//! Delimiter-or-timeout frame assembly for the receive path.
//!
//! Bytes read from the link are appended to a temporary frame buffer. The
//! buffer is handed out as one frame as soon as it contains the delimiter, or
//! once the frame has been accumulating for longer than the timeout. Every
//! received byte is also mirrored into a bounded [`RingBuffer`] so the most
//! recent raw traffic can be inspected independently of framing.

use bytes::Bytes;
use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

pub const FRAME_DELIMITER: u8 = b'\n';
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_millis(100);
pub const DEFAULT_RING_CAPACITY: usize = 64 * 1024;

/// Fixed-capacity byte history; pushing past capacity evicts the oldest bytes.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    data: VecDeque<u8>,
    capacity: usize,
    total: u64,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: VecDeque::with_capacity(capacity.min(DEFAULT_RING_CAPACITY)),
            capacity,
            total: 0,
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.total += bytes.len() as u64;
        let incoming = if bytes.len() > self.capacity {
            &bytes[bytes.len() - self.capacity..]
        } else {
            bytes
        };
        let overflow = (self.data.len() + incoming.len()).saturating_sub(self.capacity);
        self.data.drain(..overflow);
        self.data.extend(incoming.iter().copied());
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes ever pushed, including evicted ones.
    pub fn total_received(&self) -> u64 {
        self.total
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.data.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorState {
    Idle,
    Accumulating,
}

#[derive(Debug)]
pub struct FrameAccumulator {
    pending: Vec<u8>,
    history: RingBuffer,
    delimiter: u8,
    timeout: Duration,
    last_flush: Instant,
}

impl FrameAccumulator {
    pub fn new(now: Instant) -> Self {
        Self::with_limits(DEFAULT_FRAME_TIMEOUT, DEFAULT_RING_CAPACITY, now)
    }

    pub fn with_limits(timeout: Duration, ring_capacity: usize, now: Instant) -> Self {
        Self {
            pending: Vec::with_capacity(256),
            history: RingBuffer::new(ring_capacity),
            delimiter: FRAME_DELIMITER,
            timeout,
            last_flush: now,
        }
    }

    pub fn state(&self) -> AccumulatorState {
        if self.pending.is_empty() {
            AccumulatorState::Idle
        } else {
            AccumulatorState::Accumulating
        }
    }

    pub fn history(&self) -> &RingBuffer {
        &self.history
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Feed freshly read bytes; returns a frame when the flush rule fires.
    pub fn push(&mut self, bytes: &[u8], now: Instant) -> Option<Bytes> {
        if bytes.is_empty() {
            return self.poll(now);
        }
        if self.pending.is_empty() {
            // Idle -> Accumulating restarts the frame clock.
            self.last_flush = now;
        }
        self.history.extend(bytes);
        self.pending.extend_from_slice(bytes);

        if self.pending.contains(&self.delimiter) || self.expired(now) {
            return self.flush(now);
        }
        None
    }

    /// Called on idle cycles so partial frames without a delimiter drain out.
    pub fn poll(&mut self, now: Instant) -> Option<Bytes> {
        if !self.pending.is_empty() && self.expired(now) {
            return self.flush(now);
        }
        None
    }

    /// Hand out whatever is pending regardless of the timer.
    pub fn flush(&mut self, now: Instant) -> Option<Bytes> {
        self.last_flush = now;
        if self.pending.is_empty() {
            return None;
        }
        let frame = Bytes::from(std::mem::take(&mut self.pending));
        Some(frame)
    }

    fn expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_flush) > self.timeout
    }
}
