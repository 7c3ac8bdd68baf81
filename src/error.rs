//! Error types for the acquisition driver.
//!
//! Only setup and command paths return errors. Streaming-time conditions
//! (ring overrun, transport backpressure) are counters, see
//! [`crate::stats`].

use core::fmt;

use embedded_hal::spi::ErrorKind;

/// SPI or peripheral failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// SPI transaction failed.
    Spi(ErrorKind),
    /// ESP-IDF call failed with this `esp_err_t`.
    Esp(i32),
    /// Requested more response bytes than the scratch buffer holds.
    ReadTooLong { requested: usize, max: usize },
    /// A stream owns the bus; command transactions are refused.
    Busy,
}

impl TransportError {
    /// Get error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::Spi(_) => "T01",
            Self::Esp(_) => "T02",
            Self::ReadTooLong { .. } => "T03",
            Self::Busy => "T04",
        }
    }

    /// Get error message
    pub fn message(&self) -> &'static str {
        match self {
            Self::Spi(_) => "SPI transaction failed",
            Self::Esp(_) => "ESP-IDF call failed",
            Self::ReadTooLong { .. } => "read length exceeds scratch buffer",
            Self::Busy => "bus owned by active stream",
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())?;
        match self {
            Self::Spi(kind) => write!(f, " ({})", kind),
            Self::Esp(code) => write!(f, " (esp_err_t {:#x})", code),
            Self::ReadTooLong { requested, max } => write!(f, " ({} > {})", requested, max),
            Self::Busy => Ok(()),
        }
    }
}

#[cfg(target_os = "espidf")]
impl From<esp_idf_svc::sys::EspError> for TransportError {
    fn from(e: esp_idf_svc::sys::EspError) -> Self {
        TransportError::Esp(e.code())
    }
}

/// Rejected stream or device configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Sample frequency of 0 Hz.
    ZeroFrequency,
    /// Sample frequency above the device-rated ceiling.
    FrequencyTooHigh { requested: u32, max: u32 },
    /// Timer resolution cannot express the sample period.
    TimerTooCoarse { tick_hz: u32, requested: u32 },
    /// Ring buffer of zero samples.
    ZeroCapacity,
    /// RANGE_SEL code not defined by the device.
    InvalidRange(u8),
}

impl ConfigurationError {
    /// Get error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ZeroFrequency => "C01",
            Self::FrequencyTooHigh { .. } => "C02",
            Self::TimerTooCoarse { .. } => "C03",
            Self::ZeroCapacity => "C04",
            Self::InvalidRange(_) => "C05",
        }
    }

    /// Get error message
    pub fn message(&self) -> &'static str {
        match self {
            Self::ZeroFrequency => "sample frequency is zero",
            Self::FrequencyTooHigh { .. } => "sample frequency above device ceiling",
            Self::TimerTooCoarse { .. } => "timer too coarse for sample frequency",
            Self::ZeroCapacity => "buffer capacity is zero",
            Self::InvalidRange(_) => "invalid input range",
        }
    }
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())?;
        match self {
            Self::FrequencyTooHigh { requested, max } => {
                write!(f, " ({} Hz > {} Hz)", requested, max)
            }
            Self::TimerTooCoarse { tick_hz, requested } => {
                write!(f, " ({} Hz tick, {} Hz requested)", tick_hz, requested)
            }
            Self::InvalidRange(bits) => write!(f, " ({:#06b})", bits),
            Self::ZeroFrequency | Self::ZeroCapacity => Ok(()),
        }
    }
}

/// Any driver error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Transport(TransportError),
    Configuration(ConfigurationError),
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::Transport(e)
    }
}

impl From<ConfigurationError> for Error {
    fn from(e: ConfigurationError) -> Self {
        Error::Configuration(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transport(e) => e.fmt(f),
            Error::Configuration(e) => e.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::ToString;

    #[test]
    fn test_display_includes_code_and_detail() {
        let e = ConfigurationError::FrequencyTooHigh { requested: 150_000, max: 100_000 };
        let s = e.to_string();
        assert!(s.starts_with("C02"));
        assert!(s.contains("150000"));
    }

    #[test]
    fn test_error_from_conversions() {
        let e: Error = TransportError::Busy.into();
        assert_eq!(e, Error::Transport(TransportError::Busy));
        let e: Error = ConfigurationError::ZeroCapacity.into();
        assert_eq!(e.to_string(), "C04: buffer capacity is zero");
    }
}
