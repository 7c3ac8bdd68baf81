//! Acquisition session: the state one stream shares between the timer
//! interrupt, the SPI-completion interrupt and the drain task.
//!
//! Constructed by `Ads8689::start_stream`, handed to the backend by
//! `Arc`, destroyed once the backend has detached both interrupts.

use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::command::decode_signed;
use crate::forward::SampleSource;
use crate::hal::HotRegisters;
use crate::ring::{Drained, SampleRing};
use crate::stats::{AcquisitionSnapshot, AcquisitionStats};
use crate::timing::TimingPlan;

pub struct AcquisitionSession<R: HotRegisters> {
    ring: SampleRing,
    plan: TimingPlan,
    regs: R,
    stats: AcquisitionStats,
    /// Timestamp of the last timer alarm (start of the current period).
    period_start_us: AtomicU32,
    /// Timestamp of the last completed conversion.
    last_conversion_us: AtomicU32,
}

impl<R: HotRegisters> AcquisitionSession<R> {
    /// Allocate the ring. `started_us` seeds the delta of the first sample.
    pub fn new(capacity: usize, plan: TimingPlan, regs: R, started_us: u32) -> Self {
        Self {
            ring: SampleRing::new(capacity),
            plan,
            regs,
            stats: AcquisitionStats::new(),
            period_start_us: AtomicU32::new(started_us),
            last_conversion_us: AtomicU32::new(started_us),
        }
    }

    /// Timer alarm handler.
    ///
    /// Interrupt context. Does not touch the ring.
    #[inline(always)]
    pub fn on_timer_alarm(&self, now_us: u32) {
        self.period_start_us.store(now_us, Ordering::Relaxed);
        self.regs.start_conversion();
        self.stats.record_trigger();
    }

    /// SPI-completion handler: clear, read, convert, push.
    ///
    /// Interrupt context. Never blocks, never allocates.
    #[inline(always)]
    pub fn on_conversion_complete(&self, now_us: u32) {
        self.regs.clear_done();
        let sample = decode_signed(self.regs.read_word());

        let last = self.last_conversion_us.swap(now_us, Ordering::Relaxed);
        let delta_us = now_us.wrapping_sub(last);
        let latency_us = now_us.wrapping_sub(self.period_start_us.load(Ordering::Relaxed));

        let dropped = self.ring.push(sample, delta_us);
        self.stats.record_conversion(delta_us, latency_us, dropped);
    }

    /// Drain into a caller buffer (non-blocking).
    pub fn drain_into(&self, out: &mut [i16]) -> Drained {
        self.ring.drain_into(out)
    }

    /// Drain up to `max_len` samples into a fresh vector.
    ///
    /// `max_len` is clamped to the ring capacity.
    pub fn read_buffer(&self, max_len: usize) -> (Vec<i16>, Option<f32>) {
        let mut out = vec![0i16; max_len.min(self.ring.capacity())];
        let drained = self.ring.drain_into(&mut out);
        out.truncate(drained.count);
        (out, drained.rate_hz())
    }

    pub fn stats(&self) -> AcquisitionSnapshot {
        self.stats.snapshot()
    }

    pub fn plan(&self) -> &TimingPlan {
        &self.plan
    }

    pub fn ring(&self) -> &SampleRing {
        &self.ring
    }
}

impl<R: HotRegisters> SampleSource for AcquisitionSession<R> {
    fn drain_into(&self, out: &mut [i16]) -> Drained {
        self.ring.drain_into(out)
    }
}
