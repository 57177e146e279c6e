//! Engine configuration, loaded from TOML.
//!
//! ```toml
//! data_dir = "/var/lib/rolewarden"
//! report_threshold = 3
//! catalog = "/etc/rolewarden/catalog.toml"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::degrade::DEFAULT_REPORT_THRESHOLD;
use crate::error::ConfigError;

/// Configuration for a [`Warden`](crate::warden::Warden).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    /// Directory for the durable report ledger. `None` keeps reports in memory.
    pub data_dir: Option<PathBuf>,
    /// Approved reports per `(subject, marker)` pair that trigger a demotion.
    pub report_threshold: u32,
    /// Role catalog TOML. `None` uses the built-in catalog.
    pub catalog: Option<PathBuf>,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            report_threshold: DEFAULT_REPORT_THRESHOLD,
            catalog: None,
        }
    }
}

impl WardenConfig {
    /// Read and validate a config file.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.report_threshold == 0 {
            return Err(ConfigError::Invalid {
                message: "report_threshold must be > 0".into(),
            });
        }
        Ok(())
    }
}
