//! NVS persistence for acquisition settings with schema versioning.
//!
//! # Version History
//!
//! - **v1** (current): sample frequency, input range, ring capacity,
//!   block length, poll delay, backoff, retry limit, TCP port
//!
//! # Adding a version
//!
//! 1. Increment `CURRENT_SCHEMA_VERSION`
//! 2. Implement `migrate_v1_to_v2()` writing defaults for the new keys
//! 3. Route it in `migrate_settings()`

use core::cmp::Ordering;

use crate::error::ConfigurationError;

#[cfg(target_os = "espidf")]
use crate::config::{DaqSettings, CONFIG};
#[cfg(target_os = "espidf")]
use crate::command::InputRange;
#[cfg(target_os = "espidf")]
use esp_idf_svc::nvs::*;
#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::EspError;

/// Current NVS schema version.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// NVS namespace for acquisition settings.
pub const NVS_NAMESPACE: &str = "daq_cfg";

/// NVS keys (max 15 characters).
pub mod nvs_keys {
    pub const VERSION: &str = "schema_ver";
    pub const SAMPLE_FREQ: &str = "freq_hz";
    pub const RANGE: &str = "range";
    pub const CAPACITY: &str = "capacity";
    pub const BLOCK_LEN: &str = "block_len";
    pub const POLL_DELAY: &str = "poll_ms";
    pub const BACKOFF: &str = "backoff_ms";
    pub const MAX_RETRIES: &str = "retries";
    pub const TCP_PORT: &str = "tcp_port";
}

/// Outcome of [`load_from_nvs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationResult {
    /// Nothing stored yet, defaults kept
    FreshInstall,
    /// Stored schema matches, settings applied
    UpToDate,
    /// Stored schema upgraded, then applied
    Migrated { from_version: u32, to_version: u32 },
}

/// Settings persistence failures.
#[derive(Debug)]
pub enum NvsError {
    /// Namespace could not be opened
    #[cfg(target_os = "espidf")]
    InitFailed(EspError),
    /// Written by newer firmware; downgrades are refused
    TooNew { stored_version: u32 },
    /// Key read or write failed
    #[cfg(target_os = "espidf")]
    IoError(EspError),
    /// No upgrade route between these versions
    UnsupportedMigration { from: u32, to: u32 },
    /// Stored settings failed validation; defaults kept
    Invalid(ConfigurationError),
    /// Host build, no flash
    #[cfg(not(target_os = "espidf"))]
    NotAvailable,
}

#[cfg(target_os = "espidf")]
impl From<EspError> for NvsError {
    fn from(e: EspError) -> Self {
        NvsError::IoError(e)
    }
}

impl From<ConfigurationError> for NvsError {
    fn from(e: ConfigurationError) -> Self {
        NvsError::Invalid(e)
    }
}

/// Decide what to do with the stored schema version.
pub fn classify(stored_version: u32) -> Result<Option<MigrationResult>, NvsError> {
    match stored_version.cmp(&CURRENT_SCHEMA_VERSION) {
        Ordering::Equal => Ok(Some(MigrationResult::UpToDate)),
        Ordering::Less if stored_version == 0 => Ok(Some(MigrationResult::FreshInstall)),
        // Needs a migration first.
        Ordering::Less => Ok(None),
        Ordering::Greater => Err(NvsError::TooNew { stored_version }),
    }
}

/// Load settings from NVS into [`CONFIG`], migrating if needed.
///
/// The stored set is validated as a whole; an invalid set leaves the
/// defaults in place.
#[cfg(target_os = "espidf")]
pub fn load_from_nvs(partition: EspDefaultNvsPartition) -> Result<MigrationResult, NvsError> {
    let mut storage =
        EspNvs::new(partition, NVS_NAMESPACE, true).map_err(NvsError::InitFailed)?;

    let stored_version = storage.get_u32(nvs_keys::VERSION)?.unwrap_or(0);

    let result = match classify(stored_version)? {
        Some(result) => result,
        None => {
            migrate_settings(&mut storage, stored_version, CURRENT_SCHEMA_VERSION)?;
            MigrationResult::Migrated {
                from_version: stored_version,
                to_version: CURRENT_SCHEMA_VERSION,
            }
        }
    };

    if result != MigrationResult::FreshInstall {
        let settings = load_v1_settings(&storage)?;
        CONFIG.apply(&settings)?;
    }
    Ok(result)
}

/// Host stub.
#[cfg(not(target_os = "espidf"))]
pub fn load_from_nvs() -> Result<MigrationResult, NvsError> {
    Err(NvsError::NotAvailable)
}

/// Save the current [`CONFIG`] with the version stamp.
#[cfg(target_os = "espidf")]
pub fn save_to_nvs(partition: EspDefaultNvsPartition) -> Result<(), NvsError> {
    let mut storage =
        EspNvs::new(partition, NVS_NAMESPACE, true).map_err(NvsError::InitFailed)?;

    storage.set_u32(nvs_keys::VERSION, CURRENT_SCHEMA_VERSION)?;
    save_v1_settings(&mut storage, &CONFIG.snapshot())?;
    Ok(())
}

/// Host stub.
#[cfg(not(target_os = "espidf"))]
pub fn save_to_nvs() -> Result<(), NvsError> {
    Err(NvsError::NotAvailable)
}

// ---- schema v1 ----

#[cfg(target_os = "espidf")]
fn load_v1_settings(storage: &EspNvs<NvsDefault>) -> Result<DaqSettings, NvsError> {
    let mut s = CONFIG.snapshot();

    if let Some(v) = storage.get_u32(nvs_keys::SAMPLE_FREQ)? {
        s.sample_freq_hz = v;
    }
    if let Some(bits) = storage.get_u8(nvs_keys::RANGE)? {
        s.range = InputRange::from_bits(bits).ok_or(ConfigurationError::InvalidRange(bits))?;
    }
    if let Some(v) = storage.get_u32(nvs_keys::CAPACITY)? {
        s.buffer_capacity = v;
    }
    if let Some(v) = storage.get_u32(nvs_keys::BLOCK_LEN)? {
        s.block_len = v;
    }
    if let Some(v) = storage.get_u32(nvs_keys::POLL_DELAY)? {
        s.poll_delay_ms = v;
    }
    if let Some(v) = storage.get_u32(nvs_keys::BACKOFF)? {
        s.backoff_ms = v;
    }
    if let Some(v) = storage.get_u32(nvs_keys::MAX_RETRIES)? {
        s.max_retries = v;
    }
    if let Some(v) = storage.get_u16(nvs_keys::TCP_PORT)? {
        s.tcp_port = v;
    }

    Ok(s)
}

#[cfg(target_os = "espidf")]
fn save_v1_settings(storage: &mut EspNvs<NvsDefault>, s: &DaqSettings) -> Result<(), NvsError> {
    storage.set_u32(nvs_keys::SAMPLE_FREQ, s.sample_freq_hz)?;
    storage.set_u8(nvs_keys::RANGE, s.range.bits())?;
    storage.set_u32(nvs_keys::CAPACITY, s.buffer_capacity)?;
    storage.set_u32(nvs_keys::BLOCK_LEN, s.block_len)?;
    storage.set_u32(nvs_keys::POLL_DELAY, s.poll_delay_ms)?;
    storage.set_u32(nvs_keys::BACKOFF, s.backoff_ms)?;
    storage.set_u32(nvs_keys::MAX_RETRIES, s.max_retries)?;
    storage.set_u16(nvs_keys::TCP_PORT, s.tcp_port)?;
    Ok(())
}

// ---- migration ----

/// Route a stored schema to the current one.
///
/// Each step rewrites the keys it changes and stamps its version.
#[cfg(target_os = "espidf")]
#[allow(clippy::match_single_binding)]
fn migrate_settings(
    _storage: &mut EspNvs<NvsDefault>,
    from_version: u32,
    to_version: u32,
) -> Result<(), NvsError> {
    match (from_version, to_version) {
        // (1, 2) => migrate_v1_to_v2(_storage),
        _ => Err(NvsError::UnsupportedMigration {
            from: from_version,
            to: to_version,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_versions() {
        assert_eq!(classify(0).unwrap(), Some(MigrationResult::FreshInstall));
        assert_eq!(classify(CURRENT_SCHEMA_VERSION).unwrap(), Some(MigrationResult::UpToDate));
        assert!(matches!(
            classify(CURRENT_SCHEMA_VERSION + 1),
            Err(NvsError::TooNew { stored_version }) if stored_version == CURRENT_SCHEMA_VERSION + 1
        ));
    }

    #[test]
    fn test_keys_fit_nvs_limit() {
        for key in [
            nvs_keys::VERSION,
            nvs_keys::SAMPLE_FREQ,
            nvs_keys::RANGE,
            nvs_keys::CAPACITY,
            nvs_keys::BLOCK_LEN,
            nvs_keys::POLL_DELAY,
            nvs_keys::BACKOFF,
            nvs_keys::MAX_RETRIES,
            nvs_keys::TCP_PORT,
        ] {
            assert!(key.len() <= 15, "{} too long", key);
        }
        assert!(NVS_NAMESPACE.len() <= 15);
    }

    #[test]
    fn test_host_stub() {
        assert!(matches!(load_from_nvs(), Err(NvsError::NotAvailable)));
        assert!(matches!(save_to_nvs(), Err(NvsError::NotAvailable)));
    }
}
