//! Module: config
//!
//! Purpose: Acquisition settings shared between the supervisor, the
//! device driver and the forwarding task.
//!
//! Architecture:
//! - `CONFIG`: global lock-free settings, one atomic per field
//! - `generation`: bumped on every accepted change, so tasks can notice
//!   a reconfiguration without comparing every field
//! - `DaqSettings`: plain copy used by setup code
//! - `nvs`: schema-versioned persistence (ESP-IDF only)
//!
//! Safety: RT-safe. All access via atomics, no locks.

use core::sync::atomic::{AtomicU16, AtomicU32, AtomicU8, Ordering};

use crate::command::InputRange;
use crate::error::ConfigurationError;
use crate::timing::MAX_SAMPLE_FREQ_HZ;
use crate::wire;

pub mod nvs;

pub use nvs::{load_from_nvs, save_to_nvs, MigrationResult, NvsError, NVS_NAMESPACE};

/// Plain copy of the acquisition settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DaqSettings {
    pub sample_freq_hz: u32,
    pub range: InputRange,
    /// Ring capacity in samples.
    pub buffer_capacity: u32,
    /// Samples per forwarded block.
    pub block_len: u32,
    pub poll_delay_ms: u32,
    pub backoff_ms: u32,
    pub max_retries: u32,
    pub tcp_port: u16,
}

impl DaqSettings {
    pub const DEFAULT: Self = Self {
        sample_freq_hz: 1_000,
        range: InputRange::Bipolar1p25x,
        buffer_capacity: 4096,
        block_len: (wire::MAX_PACKET_BYTES / 2) as u32,
        poll_delay_ms: 5,
        backoff_ms: 50,
        max_retries: 20,
        tcp_port: wire::PORT,
    };

    /// Check every field; the first offending one is reported.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        check_freq(self.sample_freq_hz)?;
        if self.buffer_capacity == 0 || self.block_len == 0 {
            return Err(ConfigurationError::ZeroCapacity);
        }
        Ok(())
    }
}

impl Default for DaqSettings {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Global acquisition settings.
pub struct DaqConfig {
    pub sample_freq_hz: AtomicU32,
    pub range: AtomicU8,
    pub buffer_capacity: AtomicU32,
    pub block_len: AtomicU32,
    pub poll_delay_ms: AtomicU32,
    pub backoff_ms: AtomicU32,
    pub max_retries: AtomicU32,
    pub tcp_port: AtomicU16,
    generation: AtomicU32,
}

impl DaqConfig {
    pub const fn new(defaults: DaqSettings) -> Self {
        Self {
            sample_freq_hz: AtomicU32::new(defaults.sample_freq_hz),
            range: AtomicU8::new(defaults.range.bits()),
            buffer_capacity: AtomicU32::new(defaults.buffer_capacity),
            block_len: AtomicU32::new(defaults.block_len),
            poll_delay_ms: AtomicU32::new(defaults.poll_delay_ms),
            backoff_ms: AtomicU32::new(defaults.backoff_ms),
            max_retries: AtomicU32::new(defaults.max_retries),
            tcp_port: AtomicU16::new(defaults.tcp_port),
            generation: AtomicU32::new(0),
        }
    }

    /// Changes accepted since boot.
    pub fn generation(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::Release);
    }

    pub fn set_sample_freq_hz(&self, hz: u32) -> Result<(), ConfigurationError> {
        check_freq(hz)?;
        self.sample_freq_hz.store(hz, Ordering::Relaxed);
        self.bump();
        Ok(())
    }

    pub fn set_range_bits(&self, bits: u8) -> Result<(), ConfigurationError> {
        let range = InputRange::from_bits(bits).ok_or(ConfigurationError::InvalidRange(bits))?;
        self.set_range(range);
        Ok(())
    }

    pub fn set_range(&self, range: InputRange) {
        self.range.store(range.bits(), Ordering::Relaxed);
        self.bump();
    }

    pub fn set_buffer_capacity(&self, samples: u32) -> Result<(), ConfigurationError> {
        if samples == 0 {
            return Err(ConfigurationError::ZeroCapacity);
        }
        self.buffer_capacity.store(samples, Ordering::Relaxed);
        self.bump();
        Ok(())
    }

    pub fn set_block_len(&self, samples: u32) -> Result<(), ConfigurationError> {
        if samples == 0 {
            return Err(ConfigurationError::ZeroCapacity);
        }
        self.block_len.store(samples, Ordering::Relaxed);
        self.bump();
        Ok(())
    }

    pub fn set_backpressure(&self, poll_delay_ms: u32, backoff_ms: u32, max_retries: u32) {
        self.poll_delay_ms.store(poll_delay_ms, Ordering::Relaxed);
        self.backoff_ms.store(backoff_ms, Ordering::Relaxed);
        self.max_retries.store(max_retries, Ordering::Relaxed);
        self.bump();
    }

    pub fn set_tcp_port(&self, port: u16) {
        self.tcp_port.store(port, Ordering::Relaxed);
        self.bump();
    }

    /// Replace every field after validating the whole set.
    pub fn apply(&self, settings: &DaqSettings) -> Result<(), ConfigurationError> {
        settings.validate()?;
        self.sample_freq_hz.store(settings.sample_freq_hz, Ordering::Relaxed);
        self.range.store(settings.range.bits(), Ordering::Relaxed);
        self.buffer_capacity.store(settings.buffer_capacity, Ordering::Relaxed);
        self.block_len.store(settings.block_len, Ordering::Relaxed);
        self.poll_delay_ms.store(settings.poll_delay_ms, Ordering::Relaxed);
        self.backoff_ms.store(settings.backoff_ms, Ordering::Relaxed);
        self.max_retries.store(settings.max_retries, Ordering::Relaxed);
        self.tcp_port.store(settings.tcp_port, Ordering::Relaxed);
        self.bump();
        Ok(())
    }

    /// Copy of the current settings.
    ///
    /// An unknown range code (never stored by the setters) reads as the default.
    pub fn snapshot(&self) -> DaqSettings {
        DaqSettings {
            sample_freq_hz: self.sample_freq_hz.load(Ordering::Relaxed),
            range: InputRange::from_bits(self.range.load(Ordering::Relaxed)).unwrap_or_default(),
            buffer_capacity: self.buffer_capacity.load(Ordering::Relaxed),
            block_len: self.block_len.load(Ordering::Relaxed),
            poll_delay_ms: self.poll_delay_ms.load(Ordering::Relaxed),
            backoff_ms: self.backoff_ms.load(Ordering::Relaxed),
            max_retries: self.max_retries.load(Ordering::Relaxed),
            tcp_port: self.tcp_port.load(Ordering::Relaxed),
        }
    }
}

impl Default for DaqConfig {
    fn default() -> Self {
        Self::new(DaqSettings::DEFAULT)
    }
}

fn check_freq(hz: u32) -> Result<(), ConfigurationError> {
    if hz == 0 {
        return Err(ConfigurationError::ZeroFrequency);
    }
    if hz > MAX_SAMPLE_FREQ_HZ {
        return Err(ConfigurationError::FrequencyTooHigh {
            requested: hz,
            max: MAX_SAMPLE_FREQ_HZ,
        });
    }
    Ok(())
}

/// Global configuration instance.
pub static CONFIG: DaqConfig = DaqConfig::new(DaqSettings::DEFAULT);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DaqConfig::default();
        let s = config.snapshot();
        assert_eq!(s, DaqSettings::DEFAULT);
        assert_eq!(s.block_len, 512);
        assert_eq!(s.tcp_port, 3333);
        assert_eq!(config.generation(), 0);
    }

    #[test]
    fn test_setters_validate_and_bump_generation() {
        let config = DaqConfig::default();
        assert_eq!(
            config.set_sample_freq_hz(150_000),
            Err(ConfigurationError::FrequencyTooHigh { requested: 150_000, max: 100_000 })
        );
        assert_eq!(config.generation(), 0);

        config.set_sample_freq_hz(100_000).unwrap();
        assert_eq!(config.generation(), 1);
        assert_eq!(config.snapshot().sample_freq_hz, 100_000);

        assert_eq!(config.set_range_bits(0b0110), Err(ConfigurationError::InvalidRange(0b0110)));
        config.set_range_bits(0b1000).unwrap();
        assert_eq!(config.snapshot().range, InputRange::Unipolar3x);

        assert_eq!(config.set_buffer_capacity(0), Err(ConfigurationError::ZeroCapacity));
    }

    #[test]
    fn test_apply_is_all_or_nothing() {
        let config = DaqConfig::default();
        let bad = DaqSettings { sample_freq_hz: 0, tcp_port: 1, ..DaqSettings::DEFAULT };
        assert!(config.apply(&bad).is_err());
        assert_eq!(config.snapshot().tcp_port, 3333);

        let good = DaqSettings { sample_freq_hz: 20_000, block_len: 256, ..DaqSettings::DEFAULT };
        config.apply(&good).unwrap();
        assert_eq!(config.snapshot(), good);
    }
}
