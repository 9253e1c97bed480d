use facet::Facet;
use std::path::Path;

use crate::error::XdError;

/// Server-side configuration, loaded from a TOML file via `facet_toml`.
#[derive(Debug, Clone, Facet)]
pub struct Config {
    /// Directory under which image files and the passthrough filesystem
    /// provider are rooted.
    pub root: String,
    #[facet(default)]
    pub transport: TransportConfig,
    #[facet(default)]
    pub merge: MergeConfig,
}

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct TransportConfig {
    #[facet(default = "127.0.0.1:6400")]
    pub listen: String,
    /// Number of outbound send slots (§4.2). Recommended 4.
    #[facet(default = 4)]
    pub send_slots: usize,
    /// Number of concurrent rx bindings.
    #[facet(default = 8)]
    pub rx_bindings: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:6400".into(),
            send_slots: 4,
            rx_bindings: 8,
        }
    }
}

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct MergeConfig {
    /// Error-table byte written into weak blocks of a merged image.
    /// CBM DOS convention: `0x01` (default) or `0xFF`.
    #[facet(default = 1)]
    pub weak_block_entry: u8,
    /// Keep each source image's own error table in the scan report even
    /// when none was present on disk (treat "no table" as "not tracked"
    /// rather than silently "all good").
    #[facet(default = false)]
    pub preserve_error_table: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            weak_block_entry: 1,
            preserve_error_table: false,
        }
    }
}

impl Config {
    fn validate(&self) -> Result<(), XdError> {
        if self.root.is_empty() {
            return Err(XdError::Validation {
                message: "root must not be empty".into(),
            });
        }
        if self.transport.send_slots == 0 {
            return Err(XdError::Validation {
                message: "transport.send_slots must be at least 1".into(),
            });
        }
        if self.transport.rx_bindings == 0 {
            return Err(XdError::Validation {
                message: "transport.rx_bindings must be at least 1".into(),
            });
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config, XdError> {
    let contents = std::fs::read_to_string(path).map_err(|source| XdError::ConfigLoad {
        path: path.display().to_string(),
        source,
    })?;

    let config: Config = facet_toml::from_str(&contents).map_err(|e| XdError::ConfigParse {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    config.validate()?;
    Ok(config)
}
