//! # Reference Backends
//!
//! Two conformant implementations of the storage contract.
//!
//! | Backend | Storage | Lock visibility |
//! |---------|---------|-----------------|
//! | [`DirVfs`] | files under a root directory | every process ([`FileArbiter`](crate::FileArbiter)) |
//! | [`MemoryVfs`] | process memory | handles of one `MemoryVfs` ([`MemoryLockTable`](crate::MemoryLockTable)) |
//!
//! Both are configured with [`BackendOptions`].

mod dir;
mod memory;

pub use dir::{DirFile, DirVfs};
pub use memory::{MemoryFile, MemoryVfs};

use crate::{DeviceCharacteristics, VfsError};

/// Sector size used when none is configured.
pub const DEFAULT_SECTOR_SIZE: u32 = 4096;

/// Medium properties a reference backend reports for its handles.
///
/// The defaults advertise nothing: a 4 KiB sector and no device
/// characteristics. Only add characteristics the underlying storage really
/// provides.
///
/// # Example
///
/// ```rust
/// use dbvfs::{BackendOptions, DeviceCharacteristics};
///
/// let options = BackendOptions::default()
///     .with_sector_size(512)
///     .with_characteristics(DeviceCharacteristics::POWERSAFE_OVERWRITE);
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct BackendOptions {
    /// Reported sector size in bytes; a power of two in `512..=65536`.
    pub sector_size: u32,
    /// Reported device characteristics.
    pub characteristics: DeviceCharacteristics,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            sector_size: DEFAULT_SECTOR_SIZE,
            characteristics: DeviceCharacteristics::empty(),
        }
    }
}

impl BackendOptions {
    /// Set the reported sector size.
    #[must_use]
    pub fn with_sector_size(mut self, sector_size: u32) -> Self {
        self.sector_size = sector_size;
        self
    }

    /// Set the reported device characteristics.
    #[must_use]
    pub fn with_characteristics(mut self, characteristics: DeviceCharacteristics) -> Self {
        self.characteristics = characteristics;
        self
    }

    /// Check the options.
    ///
    /// # Errors
    ///
    /// [`VfsError::Config`] if the sector size is not a power of two in
    /// `512..=65536`.
    pub fn validate(&self) -> Result<(), VfsError> {
        if !self.sector_size.is_power_of_two() || !(512..=65536).contains(&self.sector_size) {
            return Err(VfsError::Config(format!(
                "sector size {} is not a power of two in 512..=65536",
                self.sector_size
            )));
        }
        Ok(())
    }

    /// Parse options from JSON; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// [`VfsError::Config`] if the JSON is malformed or the options are
    /// invalid.
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> Result<Self, VfsError> {
        let options: Self =
            serde_json::from_str(json).map_err(|e| VfsError::Config(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }
}
