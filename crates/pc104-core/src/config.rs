//! Bridge configuration: device location, window geometry, accepted encodings.

use std::env;
use std::path::PathBuf;

use crate::{window_size, BusPort, Decoder, EncodingSet, WindowError, DEFAULT_SPLIT_POINT};

/// Sysfs directory of the TS-7250-V3 FPGA ISA bridge.
pub const DEFAULT_DEVICE_DIR: &str = "/sys/devices/soc0/soc/2100000.aips-bus/21b8000.weim/\
    21b8000.weim:fpga@50000000/50004000.syscon/50004050.fpgaisa/";

/// Environment variable overriding [`BridgeConfig::device_dir`].
pub const DEVICE_DIR_ENV: &str = "PC104_DEVICE_DIR";

/// Top-level immutable configuration for one bridge instance.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct BridgeConfig {
    /// Directory holding the six port device files.
    pub device_dir: PathBuf,
    /// Size of each sub-window; the window spans twice this.
    pub split_point: usize,
    /// Load/store kinds the trap path emulates.
    pub encodings: EncodingSet,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            device_dir: PathBuf::from(DEFAULT_DEVICE_DIR),
            split_point: DEFAULT_SPLIT_POINT,
            encodings: EncodingSet::ALL,
        }
    }
}

impl BridgeConfig {
    /// Default configuration with [`DEVICE_DIR_ENV`] applied when set.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(dir) = env::var_os(DEVICE_DIR_ENV).filter(|dir| !dir.is_empty()) {
            config.device_dir = PathBuf::from(dir);
        }
        config
    }

    /// Path of the device file serving `port`.
    #[must_use]
    pub fn device_path(&self, port: BusPort) -> PathBuf {
        self.device_dir.join(port.device_name())
    }

    /// Total window size implied by [`BridgeConfig::split_point`].
    ///
    /// # Errors
    ///
    /// Returns a [`WindowError`] for an unusable split point.
    pub fn window_size(&self) -> Result<usize, WindowError> {
        window_size(self.split_point)
    }

    /// Decoder restricted to [`BridgeConfig::encodings`].
    #[must_use]
    pub const fn decoder(&self) -> Decoder {
        Decoder::new(self.encodings)
    }
}
