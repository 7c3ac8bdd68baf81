//! Acquisition timer plan.
//!
//! Turns a requested sample frequency into the alarm value of a
//! free-running auto-reload countdown timer. On ESP32 the timer runs from
//! the 80 MHz APB clock with divider 8, i.e. 100 ns per tick, so the alarm
//! is `period_us * 10`.

use crate::error::ConfigurationError;

/// Device-rated conversion ceiling.
pub const MAX_SAMPLE_FREQ_HZ: u32 = 100_000;

/// Default timer divider on the 80 MHz APB clock.
pub const TIMER_DIVIDER: u32 = 8;

/// Resulting default tick rate (10 MHz).
pub const TIMER_TICK_HZ: u32 = 80_000_000 / TIMER_DIVIDER;

/// Validated timing for one stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimingPlan {
    sample_freq_hz: u32,
    tick_hz: u32,
    alarm_ticks: u32,
    period_us: u32,
}

impl TimingPlan {
    /// Plan a stream at `sample_freq_hz` on a timer ticking at `tick_hz`.
    ///
    /// Pure validation: nothing is allocated or registered.
    pub fn new(sample_freq_hz: u32, tick_hz: u32) -> Result<Self, ConfigurationError> {
        if sample_freq_hz == 0 {
            return Err(ConfigurationError::ZeroFrequency);
        }
        if sample_freq_hz > MAX_SAMPLE_FREQ_HZ {
            return Err(ConfigurationError::FrequencyTooHigh {
                requested: sample_freq_hz,
                max: MAX_SAMPLE_FREQ_HZ,
            });
        }

        let alarm_ticks = div_round(tick_hz as u64, sample_freq_hz as u64) as u32;
        if alarm_ticks == 0 {
            return Err(ConfigurationError::TimerTooCoarse {
                tick_hz,
                requested: sample_freq_hz,
            });
        }

        Ok(Self {
            sample_freq_hz,
            tick_hz,
            alarm_ticks,
            period_us: div_round(1_000_000, sample_freq_hz as u64) as u32,
        })
    }

    /// Plan on the default 10 MHz acquisition timer.
    pub fn with_default_timer(sample_freq_hz: u32) -> Result<Self, ConfigurationError> {
        Self::new(sample_freq_hz, TIMER_TICK_HZ)
    }

    pub fn sample_freq_hz(&self) -> u32 {
        self.sample_freq_hz
    }

    pub fn tick_hz(&self) -> u32 {
        self.tick_hz
    }

    /// Timer alarm (reload) value in ticks.
    pub fn alarm_ticks(&self) -> u32 {
        self.alarm_ticks
    }

    /// Sample period rounded to whole microseconds.
    pub fn period_us(&self) -> u32 {
        self.period_us
    }

    /// Rate the timer actually produces after tick quantization.
    pub fn nominal_rate_hz(&self) -> f32 {
        self.tick_hz as f32 / self.alarm_ticks as f32
    }
}

#[inline]
fn div_round(num: u64, den: u64) -> u64 {
    (num + den / 2) / den
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alarm_is_period_times_ten_on_default_timer() {
        let plan = TimingPlan::with_default_timer(1_000).unwrap();
        assert_eq!(plan.period_us(), 1_000);
        assert_eq!(plan.alarm_ticks(), 10_000);

        let plan = TimingPlan::with_default_timer(100_000).unwrap();
        assert_eq!(plan.period_us(), 10);
        assert_eq!(plan.alarm_ticks(), 100);
    }

    #[test]
    fn test_ceiling_rejected() {
        assert_eq!(
            TimingPlan::with_default_timer(150_000),
            Err(ConfigurationError::FrequencyTooHigh { requested: 150_000, max: 100_000 })
        );
        assert!(TimingPlan::with_default_timer(100_001).is_err());
    }

    #[test]
    fn test_zero_frequency_rejected() {
        assert_eq!(TimingPlan::with_default_timer(0), Err(ConfigurationError::ZeroFrequency));
    }

    #[test]
    fn test_coarse_timer_rejected() {
        assert!(matches!(
            TimingPlan::new(50_000, 10_000),
            Err(ConfigurationError::TimerTooCoarse { .. })
        ));
    }

    #[test]
    fn test_non_integer_period_rounds() {
        let plan = TimingPlan::with_default_timer(30_000).unwrap();
        assert_eq!(plan.alarm_ticks(), 333);
        assert_eq!(plan.period_us(), 33);
        assert!((plan.nominal_rate_hz() - 30_030.03).abs() < 0.1);
    }
}
