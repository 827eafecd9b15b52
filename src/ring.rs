//! Fixed-capacity ring buffer for staging outbound messages
//!
//! The buffer sits between a single producer and a single consumer sharing
//! one address space and never allocates after construction. Capacity is
//! rounded up to the next power of two so index wraparound is a bitmask
//! instead of a division.
//!
//! # Concurrency contract
//!
//! All mutating operations take `&mut self`, so a `RingBuffer` is a
//! non-shareable handle: the single-producer/single-consumer contract is a
//! compile-time property rather than a runtime check. Callers that need to
//! share one buffer across tasks must add their own mutual exclusion, or
//! use one buffer per producer context.

use crate::message::Message;

/// Single-producer/single-consumer staging buffer over [`Message`].
#[derive(Debug)]
pub struct RingBuffer {
    buffer: Box<[Option<Message>]>,
    mask: usize,
    write_pos: usize,
    read_pos: usize,
    size: usize,
    total_enqueued: u64,
    total_dequeued: u64,
    overflow_count: u64,
}

/// Point-in-time counters for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingBufferStats {
    pub capacity: usize,
    pub size: usize,
    pub total_enqueued: u64,
    pub total_dequeued: u64,
    pub overflow_count: u64,
}

impl RingBuffer {
    /// Create a buffer holding at least `capacity` messages.
    ///
    /// The effective capacity is `capacity` rounded up to the next power of
    /// two (a request for 5 yields 8).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        let buffer = (0..capacity).map(|_| None).collect::<Vec<_>>();
        Self {
            buffer: buffer.into_boxed_slice(),
            mask: capacity - 1,
            write_pos: 0,
            read_pos: 0,
            size: 0,
            total_enqueued: 0,
            total_dequeued: 0,
            overflow_count: 0,
        }
    }

    /// Stage a message.
    ///
    /// Returns `false` and increments the overflow counter when the buffer
    /// is full. Overflow is an ordinary backpressure signal the caller must
    /// check, not an error.
    pub fn enqueue(&mut self, message: Message) -> bool {
        if self.size == self.capacity() {
            self.overflow_count += 1;
            return false;
        }
        self.buffer[self.write_pos] = Some(message);
        self.write_pos = (self.write_pos + 1) & self.mask;
        self.size += 1;
        self.total_enqueued += 1;
        true
    }

    /// Remove and return the oldest staged message.
    pub fn dequeue(&mut self) -> Option<Message> {
        if self.size == 0 {
            return None;
        }
        let message = self.buffer[self.read_pos].take();
        self.read_pos = (self.read_pos + 1) & self.mask;
        self.size -= 1;
        self.total_dequeued += 1;
        message
    }

    /// Dequeue up to `max_count` messages, amortizing per-message overhead.
    pub fn dequeue_batch(&mut self, max_count: usize) -> Vec<Message> {
        let count = max_count.min(self.size);
        let mut batch = Vec::with_capacity(count);
        for _ in 0..count {
            match self.dequeue() {
                Some(message) => batch.push(message),
                None => break,
            }
        }
        batch
    }

    /// Non-destructive read of the next message to dequeue.
    pub fn peek(&self) -> Option<&Message> {
        if self.size == 0 {
            return None;
        }
        self.buffer[self.read_pos].as_ref()
    }

    /// Drop all staged messages. Counters other than `size` are preserved.
    pub fn clear(&mut self) {
        for slot in self.buffer.iter_mut() {
            *slot = None;
        }
        self.write_pos = 0;
        self.read_pos = 0;
        self.size = 0;
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn is_full(&self) -> bool {
        self.size == self.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    pub fn stats(&self) -> RingBufferStats {
        RingBufferStats {
            capacity: self.capacity(),
            size: self.size,
            total_enqueued: self.total_enqueued,
            total_dequeued: self.total_dequeued,
            overflow_count: self.overflow_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn message(n: usize) -> Message {
        Message::new("bus.test", Bytes::from(format!("payload-{}", n)))
    }

    #[test]
    fn test_capacity_rounds_up_to_power_of_two() {
        assert_eq!(RingBuffer::new(5).capacity(), 8);
        assert_eq!(RingBuffer::new(128).capacity(), 128);
        assert_eq!(RingBuffer::new(1).capacity(), 1);
        assert_eq!(RingBuffer::new(0).capacity(), 1);
    }

    #[test]
    fn test_overflow_returns_false_and_counts() {
        let mut ring = RingBuffer::new(4);
        for n in 0..4 {
            assert!(ring.enqueue(message(n)));
        }

        assert!(!ring.enqueue(message(99)));
        let stats = ring.stats();
        assert_eq!(stats.overflow_count, 1);
        assert_eq!(stats.size, 4);
        assert_eq!(stats.total_enqueued, 4);
        assert!(ring.is_full());
    }

    #[test]
    fn test_fifo_order_preserved() {
        let mut ring = RingBuffer::new(8);
        for n in 0..6 {
            assert!(ring.enqueue(message(n)));
        }

        for n in 0..6 {
            let out = ring.dequeue().expect("message present");
            assert_eq!(out.payload, Bytes::from(format!("payload-{}", n)));
        }
        assert!(ring.dequeue().is_none());
        assert!(ring.is_empty());
    }

    #[test]
    fn test_wraparound_keeps_order() {
        let mut ring = RingBuffer::new(4);
        // Advance the positions past the end of the backing array.
        for round in 0..5 {
            for n in 0..3 {
                assert!(ring.enqueue(message(round * 10 + n)));
            }
            for n in 0..3 {
                let out = ring.dequeue().unwrap();
                assert_eq!(out.payload, Bytes::from(format!("payload-{}", round * 10 + n)));
            }
        }
        let stats = ring.stats();
        assert_eq!(stats.total_enqueued, 15);
        assert_eq!(stats.total_dequeued, 15);
        assert_eq!(stats.overflow_count, 0);
    }

    #[test]
    fn test_dequeue_batch_stops_at_empty() {
        let mut ring = RingBuffer::new(8);
        for n in 0..3 {
            ring.enqueue(message(n));
        }

        let batch = ring.dequeue_batch(10);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].payload, Bytes::from("payload-0"));
        assert_eq!(batch[2].payload, Bytes::from("payload-2"));
        assert!(ring.is_empty());

        assert!(ring.dequeue_batch(10).is_empty());
    }

    #[test]
    fn test_dequeue_batch_respects_max() {
        let mut ring = RingBuffer::new(8);
        for n in 0..6 {
            ring.enqueue(message(n));
        }

        let batch = ring.dequeue_batch(4);
        assert_eq!(batch.len(), 4);
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn test_peek_is_non_destructive() {
        let mut ring = RingBuffer::new(4);
        ring.enqueue(message(1));

        assert_eq!(ring.peek().unwrap().payload, Bytes::from("payload-1"));
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.stats().total_dequeued, 0);

        ring.dequeue().unwrap();
        assert!(ring.peek().is_none());
    }

    #[test]
    fn test_clear_preserves_counters() {
        let mut ring = RingBuffer::new(4);
        for n in 0..3 {
            ring.enqueue(message(n));
        }
        ring.dequeue().unwrap();
        ring.clear();

        assert!(ring.is_empty());
        let stats = ring.stats();
        assert_eq!(stats.total_enqueued, 3);
        assert_eq!(stats.total_dequeued, 1);

        // Buffer remains usable after clear.
        assert!(ring.enqueue(message(9)));
        assert_eq!(ring.dequeue().unwrap().payload, Bytes::from("payload-9"));
    }
}
