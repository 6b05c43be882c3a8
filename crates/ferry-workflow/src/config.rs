use crate::IntegrityOptions;
use std::path::PathBuf;
use std::time::Duration;

pub const SCRATCH_DIR_ENV: &str = "FERRY_SCRATCH_DIR";
pub const DRIVER_DIR_ENV: &str = "FERRY_DRIVER_DIR";
pub const BRIDGE_TIMEOUT_ENV: &str = "FERRY_BRIDGE_TIMEOUT_MS";

const DEFAULT_SCRATCH_DIR_NAME: &str = "ferry";

/// Settings for the external conversion bridge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Root handed to scratch provisioning; bridge files land in `<root>/temp`.
    pub scratch_root: PathBuf,
    /// Directory holding the converter module loaded by the driver program.
    pub driver_dir: PathBuf,
    /// `None` waits for the child indefinitely.
    pub timeout: Option<Duration>,
    pub strict: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            scratch_root: std::env::temp_dir().join(DEFAULT_SCRATCH_DIR_NAME),
            driver_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            timeout: None,
            strict: true,
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Blank or unparsable values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();
        if let Some(root) = read(SCRATCH_DIR_ENV) {
            config.scratch_root = PathBuf::from(root.trim());
        }
        if let Some(dir) = read(DRIVER_DIR_ENV) {
            config.driver_dir = PathBuf::from(dir.trim());
        }
        config.timeout = read(BRIDGE_TIMEOUT_ENV)
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|millis| *millis > 0)
            .map(Duration::from_millis);
        config
    }

    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = root.into();
        self
    }

    pub fn with_driver_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.driver_dir = dir.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// Options for one `convert` call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConvertOptions {
    pub bridge: BridgeConfig,
    pub integrity: IntegrityOptions,
}
