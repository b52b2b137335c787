use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::modprobe::Precedence;

const DEFAULT_SYS_MODULE_ROOT: &str = "/sys/module";
const DEFAULT_MODPROBE_DIR: &str = "/etc/modprobe.d";
const DEFAULT_MODINFO_BIN: &str = "modinfo";
const DEFAULT_METADATA_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_SCAN_CONCURRENCY: usize = 8;

/// Where the engine reads from and how it behaves. Defaults describe the
/// live system; tests and the CLI point the roots elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Directory whose subdirectories are the loaded modules.
    pub sys_module_root: PathBuf,
    /// Persistent configuration directory, read-only to this tool.
    pub modprobe_dir: PathBuf,
    /// Metadata tool binary; bare names are resolved on PATH.
    pub modinfo_bin: PathBuf,
    /// Budget for one metadata tool invocation.
    pub metadata_timeout_ms: u64,
    /// Upper bound on modules scanned in parallel.
    pub scan_concurrency: usize,
    /// Which persistent entry wins when several target the same parameter.
    pub precedence: Precedence,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            sys_module_root: PathBuf::from(DEFAULT_SYS_MODULE_ROOT),
            modprobe_dir: PathBuf::from(DEFAULT_MODPROBE_DIR),
            modinfo_bin: PathBuf::from(DEFAULT_MODINFO_BIN),
            metadata_timeout_ms: DEFAULT_METADATA_TIMEOUT_MS,
            scan_concurrency: DEFAULT_SCAN_CONCURRENCY,
            precedence: Precedence::default(),
        }
    }
}

impl CoreConfig {
    /// Loads a TOML config file; fields left out keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source: Box::new(source),
        })
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_timeout_ms)
    }

    pub fn module_dir(&self, module: &str) -> PathBuf {
        self.sys_module_root.join(module)
    }

    pub fn parameters_dir(&self, module: &str) -> PathBuf {
        self.module_dir(module).join("parameters")
    }

    pub fn param_path(&self, module: &str, param: &str) -> PathBuf {
        self.parameters_dir(module).join(param)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: Box<toml::de::Error>,
    },
}
