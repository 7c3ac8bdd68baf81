//! Lock-free SPSC sample ring with overwrite-oldest overflow.
//!
//! # Architecture
//!
//! ```text
//! Conversion ISR ──push──▶ SampleRing ──drain_into──▶ Forwarding task
//!  (producer)              front / rear               (consumer)
//! ```
//!
//! # Rules
//!
//! - `front` (next write index) has exactly one writer: the producer.
//! - `rear` (next read index) only ever moves forward, and only through
//!   `compare_exchange`: the consumer commits what it copied, the producer
//!   retires the oldest sample when the ring is full.
//! - Empty iff `front == rear`. The ring has `capacity + 1` slots, so
//!   exactly `capacity` samples are readable when full.
//! - A slot is overwritten only after it has been retired, so a consumer
//!   that loses the `rear` race knows exactly which prefix of its copy is
//!   stale.
//!
//! # Memory Ordering
//!
//! - Producer: slot stores after a `Release` fence, `front` published
//!   with `Release`.
//! - Consumer: `front` loaded with `Acquire`, `Acquire` fence after the
//!   copy before re-reading `rear`.
//! - `rear` read-modify-writes are `AcqRel` on both sides.

use alloc::boxed::Box;
use core::sync::atomic::{fence, AtomicI16, AtomicU32, AtomicUsize, Ordering};

/// Consumer gives up after this many lost races in one drain.
const MAX_DRAIN_ATTEMPTS: usize = 4;

/// Result of one drain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Drained {
    /// Samples written to the output, oldest first.
    pub count: usize,
    /// Sum of the interrupt-to-interrupt deltas of those samples.
    pub period_us: u64,
}

impl Drained {
    pub const EMPTY: Self = Self { count: 0, period_us: 0 };

    /// Achieved sample rate over the drained span.
    ///
    /// `None` when no timestamp span was recorded.
    pub fn rate_hz(&self) -> Option<f32> {
        if self.count == 0 || self.period_us == 0 {
            return None;
        }
        Some(self.count as f32 * 1_000_000.0 / self.period_us as f32)
    }
}

/// Fixed-capacity ring of signed samples.
///
/// Safe to share between one producer (interrupt) and one consumer (task).
/// Several concurrent producers or consumers are memory safe but void the
/// ordering guarantees.
pub struct SampleRing {
    samples: Box<[AtomicI16]>,
    deltas: Box<[AtomicU32]>,
    front: AtomicUsize,
    rear: AtomicUsize,
    dropped: AtomicU32,
}

impl SampleRing {
    /// Allocate a ring holding up to `capacity` unread samples.
    pub fn new(capacity: usize) -> Self {
        let slots = capacity + 1;
        Self {
            samples: (0..slots).map(|_| AtomicI16::new(0)).collect(),
            deltas: (0..slots).map(|_| AtomicU32::new(0)).collect(),
            front: AtomicUsize::new(0),
            rear: AtomicUsize::new(0),
            dropped: AtomicU32::new(0),
        }
    }

    /// Push one sample (producer only).
    ///
    /// Returns `true` if the oldest unread sample was dropped to make room.
    ///
    /// # Timing
    ///
    /// O(1), never blocks, never allocates. Safe in interrupt context.
    #[inline(always)]
    pub fn push(&self, sample: i16, delta_us: u32) -> bool {
        let front = self.front.load(Ordering::Relaxed);

        // Slot `front` is the gap slot, never part of the unread region.
        fence(Ordering::Release);
        self.samples[front].store(sample, Ordering::Relaxed);
        self.deltas[front].store(delta_us, Ordering::Relaxed);

        let next = self.advance(front, 1);
        let rear = self.rear.load(Ordering::Acquire);
        let mut dropped = false;

        if next == rear {
            // Full: retire the oldest sample. A failed exchange means the
            // consumer freed space in the meantime.
            if self
                .rear
                .compare_exchange(rear, self.advance(rear, 1), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                dropped = true;
            }
        }

        self.front.store(next, Ordering::Release);
        dropped
    }

    /// Drain up to `out.len()` samples in capture order (consumer only).
    ///
    /// Non-blocking: returns [`Drained::EMPTY`] when nothing is available.
    /// A wrapped region is copied in two segments, tail `[rear, len)` then
    /// head `[0, front)`.
    pub fn drain_into(&self, out: &mut [i16]) -> Drained {
        if out.is_empty() {
            return Drained::EMPTY;
        }

        for _ in 0..MAX_DRAIN_ATTEMPTS {
            let drops_before = self.dropped.load(Ordering::Acquire);
            let rear = self.rear.load(Ordering::Acquire);
            let front = self.front.load(Ordering::Acquire);

            let available = self.distance(rear, front);
            if available == 0 {
                return Drained::EMPTY;
            }

            let copied = available.min(out.len());
            let period_us = self.copy_out(rear, &mut out[..copied]);

            fence(Ordering::Acquire);
            let drops_after = self.dropped.load(Ordering::Relaxed);
            if drops_after.wrapping_sub(drops_before) as usize >= self.slots() {
                // Producer may have lapped the whole ring during the copy.
                continue;
            }

            let target = self.advance(rear, copied);
            let mut current = rear;
            loop {
                let stale = self.distance(rear, current);
                if stale >= copied {
                    // Everything copied was retired meanwhile; start over.
                    break;
                }
                match self.rear.compare_exchange(
                    current,
                    target,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => {
                        let count = copied - stale;
                        if stale > 0 {
                            out.copy_within(stale..copied, 0);
                        }
                        return Drained {
                            count,
                            period_us: period_us * count as u64 / copied as u64,
                        };
                    }
                    Err(actual) => current = actual,
                }
            }
        }

        Drained::EMPTY
    }

    /// Copy `out.len()` samples starting at `start`, returning the delta sum.
    #[inline]
    fn copy_out(&self, start: usize, out: &mut [i16]) -> u64 {
        let n = out.len();
        let tail = n.min(self.slots() - start);
        let (out_tail, out_head) = out.split_at_mut(tail);

        let mut period_us = 0u64;
        for (dst, (sample, delta)) in out_tail.iter_mut().zip(
            self.samples[start..start + tail]
                .iter()
                .zip(&self.deltas[start..start + tail]),
        ) {
            *dst = sample.load(Ordering::Relaxed);
            period_us += delta.load(Ordering::Relaxed) as u64;
        }
        for (dst, (sample, delta)) in out_head
            .iter_mut()
            .zip(self.samples.iter().zip(self.deltas.iter()))
        {
            *dst = sample.load(Ordering::Relaxed);
            period_us += delta.load(Ordering::Relaxed) as u64;
        }
        period_us
    }

    /// Maximum number of unread samples.
    pub fn capacity(&self) -> usize {
        self.samples.len() - 1
    }

    /// Number of physical slots (`capacity + 1`).
    pub fn slots(&self) -> usize {
        self.samples.len()
    }

    /// Next write index.
    pub fn front(&self) -> usize {
        self.front.load(Ordering::Acquire)
    }

    /// Next read index.
    pub fn rear(&self) -> usize {
        self.rear.load(Ordering::Acquire)
    }

    /// Unread samples (snapshot).
    pub fn len(&self) -> usize {
        let rear = self.rear.load(Ordering::Acquire);
        let front = self.front.load(Ordering::Acquire);
        self.distance(rear, front)
    }

    pub fn is_empty(&self) -> bool {
        self.front() == self.rear()
    }

    /// Samples dropped by overwrite-oldest since allocation.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[inline(always)]
    fn advance(&self, idx: usize, n: usize) -> usize {
        (idx + n) % self.slots()
    }

    #[inline(always)]
    fn distance(&self, from: usize, to: usize) -> usize {
        if to >= from {
            to - from
        } else {
            to + self.slots() - from
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain_all(ring: &SampleRing) -> std::vec::Vec<i16> {
        let mut out = std::vec![0i16; ring.capacity() + 1];
        let d = ring.drain_into(&mut out);
        out.truncate(d.count);
        out
    }

    #[test]
    fn test_new_ring_is_empty() {
        let ring = SampleRing::new(16);
        assert!(ring.is_empty());
        assert_eq!(ring.len(), 0);
        assert_eq!(ring.capacity(), 16);
        assert_eq!(ring.slots(), 17);
    }

    #[test]
    fn test_push_then_drain_in_order() {
        let ring = SampleRing::new(8);
        for s in [10, 20, 30] {
            assert!(!ring.push(s, 100));
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(drain_all(&ring), [10, 20, 30]);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_drain_empty_returns_nothing() {
        let ring = SampleRing::new(4);
        let mut out = [0i16; 4];
        assert_eq!(ring.drain_into(&mut out), Drained::EMPTY);
    }

    #[test]
    fn test_drain_respects_max_len() {
        let ring = SampleRing::new(8);
        for s in 0..6 {
            ring.push(s, 10);
        }
        let mut out = [0i16; 4];
        let d = ring.drain_into(&mut out);
        assert_eq!(d.count, 4);
        assert_eq!(d.period_us, 40);
        assert_eq!(out, [0, 1, 2, 3]);
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn test_full_push_advances_front_and_rear() {
        let ring = SampleRing::new(3);
        for s in 0..3 {
            ring.push(s, 1);
        }
        let (f, r) = (ring.front(), ring.rear());
        assert!(ring.push(3, 1));
        assert_eq!(ring.front(), (f + 1) % 4);
        assert_eq!(ring.rear(), (r + 1) % 4);
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.dropped(), 1);
    }

    #[test]
    fn test_rate_from_deltas() {
        let d = Drained { count: 100, period_us: 10_000 };
        assert_eq!(d.rate_hz(), Some(10_000.0));
        assert_eq!(Drained { count: 5, period_us: 0 }.rate_hz(), None);
    }
}
