//! Frame ring between the capture callback and the distributor.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_queue::ArrayQueue;

use crate::AudioFrame;

/// Bounded, lock-free queue of captured frames with a drop-oldest policy.
///
/// The capture callback pushes and the distributor pops. When the ring is
/// full, a push evicts the oldest unread frame and bumps the drop counter.
/// Pushing never blocks, so a slow consumer can never stall the audio thread.
pub struct FrameRing {
    queue: ArrayQueue<AudioFrame>,
    dropped: AtomicU64,
}

impl FrameRing {
    /// Creates a ring holding up to `capacity` frames (at least 2).
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(2)),
            dropped: AtomicU64::new(0),
        }
    }

    /// Pushes a frame, evicting the oldest one if the ring is full.
    ///
    /// Returns `true` if a frame was dropped to make room.
    pub fn push(&self, frame: AudioFrame) -> bool {
        let evicted = self.queue.force_push(frame).is_some();
        if evicted {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        evicted
    }

    /// Pops the oldest unread frame.
    pub fn pop(&self) -> Option<AudioFrame> {
        self.queue.pop()
    }

    /// Discards every buffered frame without counting them as drops.
    pub fn clear(&self) {
        while self.queue.pop().is_some() {}
    }

    /// Number of frames waiting to be read.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns `true` if no frames are waiting.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Maximum number of buffered frames.
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Total frames dropped because the ring was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn frame(sequence: u64) -> AudioFrame {
        AudioFrame::new(vec![0.0; 4], sequence, 48000, 1, Duration::ZERO)
    }

    #[test]
    fn test_fifo_order() {
        let ring = FrameRing::new(4);
        for seq in 0..3 {
            assert!(!ring.push(frame(seq)));
        }

        assert_eq!(ring.len(), 3);
        assert_eq!(ring.pop().unwrap().sequence, 0);
        assert_eq!(ring.pop().unwrap().sequence, 1);
        assert_eq!(ring.pop().unwrap().sequence, 2);
        assert!(ring.pop().is_none());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let ring = FrameRing::new(2);
        ring.push(frame(0));
        ring.push(frame(1));
        assert!(ring.push(frame(2)));
        assert!(ring.push(frame(3)));

        assert_eq!(ring.dropped(), 2);
        assert_eq!(ring.pop().unwrap().sequence, 2);
        assert_eq!(ring.pop().unwrap().sequence, 3);
    }

    #[test]
    fn test_minimum_capacity() {
        let ring = FrameRing::new(0);
        assert_eq!(ring.capacity(), 2);
    }

    #[test]
    fn test_clear_is_not_a_drop() {
        let ring = FrameRing::new(4);
        ring.push(frame(0));
        ring.push(frame(1));
        ring.clear();

        assert!(ring.is_empty());
        assert_eq!(ring.dropped(), 0);
    }

    #[test]
    fn test_push_from_other_thread() {
        let ring = std::sync::Arc::new(FrameRing::new(8));
        let producer = ring.clone();
        let handle = std::thread::spawn(move || {
            for seq in 0..100 {
                producer.push(frame(seq));
            }
        });
        handle.join().unwrap();

        assert_eq!(ring.len(), 8);
        assert_eq!(ring.dropped(), 92);
        assert_eq!(ring.pop().unwrap().sequence, 92);
    }
}
