//! Streaming health counters.
//!
//! Overrun and backpressure are expected under load. They are never
//! returned as errors: interrupt handlers and the forwarding task bump
//! these counters and the supervisor reads snapshots.

use core::sync::atomic::{AtomicU32, Ordering};

/// Counters written from interrupt context.
///
/// Every update is a single relaxed atomic, safe from any ISR.
pub struct AcquisitionStats {
    /// Timer alarms that asserted the SPI start bit.
    triggers: AtomicU32,

    /// Completed conversions pushed to the ring.
    conversions: AtomicU32,

    /// Samples dropped by the ring (overwrite-oldest).
    overruns: AtomicU32,

    /// Last interrupt-to-interrupt delta in µs.
    last_delta_us: AtomicU32,

    /// Largest delta since the stream started (jitter watermark).
    max_delta_us: AtomicU32,

    /// Largest trigger-to-completion latency in µs.
    max_latency_us: AtomicU32,
}

impl AcquisitionStats {
    pub const fn new() -> Self {
        Self {
            triggers: AtomicU32::new(0),
            conversions: AtomicU32::new(0),
            overruns: AtomicU32::new(0),
            last_delta_us: AtomicU32::new(0),
            max_delta_us: AtomicU32::new(0),
            max_latency_us: AtomicU32::new(0),
        }
    }

    #[inline(always)]
    pub fn record_trigger(&self) {
        self.triggers.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_conversion(&self, delta_us: u32, latency_us: u32, dropped: bool) {
        self.conversions.fetch_add(1, Ordering::Relaxed);
        if dropped {
            self.overruns.fetch_add(1, Ordering::Relaxed);
        }
        self.last_delta_us.store(delta_us, Ordering::Relaxed);
        self.max_delta_us.fetch_max(delta_us, Ordering::Relaxed);
        self.max_latency_us.fetch_max(latency_us, Ordering::Relaxed);
    }

    pub fn triggers(&self) -> u32 {
        self.triggers.load(Ordering::Relaxed)
    }

    pub fn conversions(&self) -> u32 {
        self.conversions.load(Ordering::Relaxed)
    }

    pub fn overruns(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn snapshot(&self) -> AcquisitionSnapshot {
        AcquisitionSnapshot {
            triggers: self.triggers(),
            conversions: self.conversions(),
            overruns: self.overruns(),
            last_delta_us: self.last_delta_us.load(Ordering::Relaxed),
            max_delta_us: self.max_delta_us.load(Ordering::Relaxed),
            max_latency_us: self.max_latency_us.load(Ordering::Relaxed),
        }
    }
}

impl Default for AcquisitionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of acquisition counters at a point in time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AcquisitionSnapshot {
    pub triggers: u32,
    pub conversions: u32,
    pub overruns: u32,
    pub last_delta_us: u32,
    pub max_delta_us: u32,
    pub max_latency_us: u32,
}

impl AcquisitionSnapshot {
    /// Conversions the SPI never completed (trigger without completion).
    pub fn missed_conversions(&self) -> u32 {
        self.triggers.saturating_sub(self.conversions)
    }
}

/// Width of the rolling saturation window.
pub const SATURATION_WINDOW: u32 = 64;

/// Forwarding counters, owned by the forwarding task.
///
/// Plain fields: only the forwarding task mutates them, others read
/// copies through [`ForwardStats::snapshot`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ForwardStats {
    /// Non-empty drains.
    pub drains: u32,
    /// Drains that filled the whole block (ring may be outpacing us).
    pub saturated: u32,
    /// Sends rejected by the transport.
    pub rejected: u32,
    /// Blocks given up after too many rejections.
    pub discarded_blocks: u32,
    /// Samples inside discarded blocks.
    pub discarded_samples: u32,
    /// Samples accepted by the transport.
    pub forwarded_samples: u32,
    /// Last achieved rate reported by a drain.
    pub last_rate_hz: Option<f32>,
    /// One bit per recent drain, 1 = saturated. Bit 0 is the newest.
    window: u64,
}

impl ForwardStats {
    pub const fn new() -> Self {
        Self {
            drains: 0,
            saturated: 0,
            rejected: 0,
            discarded_blocks: 0,
            discarded_samples: 0,
            forwarded_samples: 0,
            last_rate_hz: None,
            window: 0,
        }
    }

    /// Account one non-empty drain.
    pub fn record_drain(&mut self, saturated: bool, rate_hz: Option<f32>) {
        self.drains = self.drains.wrapping_add(1);
        self.window = (self.window << 1) | saturated as u64;
        if saturated {
            self.saturated = self.saturated.wrapping_add(1);
        }
        if rate_hz.is_some() {
            self.last_rate_hz = rate_hz;
        }
    }

    pub fn record_rejected(&mut self) {
        self.rejected = self.rejected.wrapping_add(1);
    }

    pub fn record_forwarded(&mut self, samples: usize) {
        self.forwarded_samples = self.forwarded_samples.wrapping_add(samples as u32);
    }

    pub fn record_discarded(&mut self, samples: usize) {
        self.discarded_blocks = self.discarded_blocks.wrapping_add(1);
        self.discarded_samples = self.discarded_samples.wrapping_add(samples as u32);
    }

    /// Fraction of saturated drains over the last [`SATURATION_WINDOW`] drains.
    pub fn saturation_ratio(&self) -> f32 {
        let span = self.drains.min(SATURATION_WINDOW);
        if span == 0 {
            return 0.0;
        }
        let mask = if span == 64 { u64::MAX } else { (1u64 << span) - 1 };
        (self.window & mask).count_ones() as f32 / span as f32
    }

    pub fn snapshot(&self) -> Self {
        *self
    }
}

/// [`ForwardStats`] published for other tasks.
///
/// Single writer (the forwarding task), any number of readers. Each field
/// is its own relaxed atomic, so a reader may see one publish half
/// applied; the supervisor only needs trends.
pub struct ForwardHealth {
    drains: AtomicU32,
    saturated: AtomicU32,
    rejected: AtomicU32,
    discarded_blocks: AtomicU32,
    discarded_samples: AtomicU32,
    forwarded_samples: AtomicU32,
    /// `f32` bits, NaN when no rate was measured yet.
    last_rate_hz: AtomicU32,
    /// `f32` bits.
    saturation_ratio: AtomicU32,
}

/// Copy of [`ForwardHealth`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ForwardHealthSnapshot {
    pub drains: u32,
    pub saturated: u32,
    pub rejected: u32,
    pub discarded_blocks: u32,
    pub discarded_samples: u32,
    pub forwarded_samples: u32,
    pub last_rate_hz: Option<f32>,
    /// Saturated share of the last [`SATURATION_WINDOW`] drains.
    pub saturation_ratio: f32,
}

impl ForwardHealth {
    pub const fn new() -> Self {
        Self {
            drains: AtomicU32::new(0),
            saturated: AtomicU32::new(0),
            rejected: AtomicU32::new(0),
            discarded_blocks: AtomicU32::new(0),
            discarded_samples: AtomicU32::new(0),
            forwarded_samples: AtomicU32::new(0),
            last_rate_hz: AtomicU32::new(f32::NAN.to_bits()),
            saturation_ratio: AtomicU32::new(0),
        }
    }

    pub fn publish(&self, stats: &ForwardStats) {
        self.drains.store(stats.drains, Ordering::Relaxed);
        self.saturated.store(stats.saturated, Ordering::Relaxed);
        self.rejected.store(stats.rejected, Ordering::Relaxed);
        self.discarded_blocks.store(stats.discarded_blocks, Ordering::Relaxed);
        self.discarded_samples.store(stats.discarded_samples, Ordering::Relaxed);
        self.forwarded_samples.store(stats.forwarded_samples, Ordering::Relaxed);
        let rate = stats.last_rate_hz.unwrap_or(f32::NAN);
        self.last_rate_hz.store(rate.to_bits(), Ordering::Relaxed);
        self.saturation_ratio
            .store(stats.saturation_ratio().to_bits(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ForwardHealthSnapshot {
        let rate = f32::from_bits(self.last_rate_hz.load(Ordering::Relaxed));
        ForwardHealthSnapshot {
            drains: self.drains.load(Ordering::Relaxed),
            saturated: self.saturated.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            discarded_blocks: self.discarded_blocks.load(Ordering::Relaxed),
            discarded_samples: self.discarded_samples.load(Ordering::Relaxed),
            forwarded_samples: self.forwarded_samples.load(Ordering::Relaxed),
            last_rate_hz: if rate.is_nan() { None } else { Some(rate) },
            saturation_ratio: f32::from_bits(self.saturation_ratio.load(Ordering::Relaxed)),
        }
    }
}

impl Default for ForwardHealth {
    fn default() -> Self {
        Self::new()
    }
}
