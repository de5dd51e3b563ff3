//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `binhub.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - ServerConfig: Listen address and optional dashboard asset directory.
//!     - StorageConfig: Where the bin snapshot lives.
//!     - BroadcastConfig: Observer channel depth.
//!     - StockConfig: Critical / warning thresholds for the summary.
//!     - LoggingConfig: Default log filter and telemetry verbosity.
//!     - SimulatorConfig: Defaults for the bin-sim tool.
//!
//! every section is optional; a partial file only overrides what it names.
//!
//! ==============================================================================

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::hub::HubOptions;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct HubConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub broadcast: BroadcastConfig,
    pub stock: StockConfig,
    pub logging: LoggingConfig,
    pub simulator: SimulatorConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// built dashboard (index.html etc.); served at / when it exists
    pub static_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub data_file: PathBuf,
    /// keep the registry in memory only
    pub in_memory: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BroadcastConfig {
    pub capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StockConfig {
    pub critical_below: u64,
    pub warning_below: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_telemetry: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimulatorConfig {
    pub hub_url: String,
    pub device_id: String,
    pub total_capacity: Option<u64>,
}

/// where the active configuration came from
#[derive(Debug, Clone)]
pub enum ConfigOrigin {
    File(PathBuf),
    /// defaults, with any files that existed but failed to load
    Defaults(Vec<(PathBuf, String)>),
}

impl ConfigOrigin {
    pub fn log(&self) {
        match self {
            ConfigOrigin::File(path) => tracing::info!("[CONFIG] Loaded from {}", path.display()),
            ConfigOrigin::Defaults(failures) => {
                for (path, e) in failures {
                    tracing::warn!("[CONFIG] Failed to load {}: {}", path.display(), e);
                }
                tracing::warn!("[CONFIG] No usable config file found - using defaults");
            }
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
            static_dir: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("bolt_data.json"),
            in_memory: false,
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

impl Default for StockConfig {
    fn default() -> Self {
        Self {
            critical_below: 15,
            warning_below: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            show_telemetry: true,
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            hub_url: "http://localhost:3000".to_string(),
            device_id: "sim-bin-1".to_string(),
            total_capacity: Some(40),
        }
    }
}

impl HubConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: HubConfig =
            toml::from_str(content).map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.stock.critical_below > self.stock.warning_below {
            anyhow::bail!(
                "stock.critical_below ({}) must not exceed stock.warning_below ({})",
                self.stock.critical_below,
                self.stock.warning_below
            );
        }
        Ok(())
    }

    /// Load with default fallback
    ///
    /// an explicit path is tried alone; otherwise the usual locations are
    /// searched.
    pub fn load_or_default(explicit: Option<&Path>) -> Self {
        let (config, origin) = Self::resolve(explicit);
        origin.log();
        config
    }

    /// same search as load_or_default without logging, for use before the
    /// log subscriber exists
    pub fn resolve(explicit: Option<&Path>) -> (Self, ConfigOrigin) {
        let paths = match explicit {
            Some(p) => vec![p.to_path_buf()],
            None => vec![
                PathBuf::from("config").join("binhub.toml"),
                PathBuf::from("..").join("config").join("binhub.toml"),
            ],
        };

        let mut failures = Vec::new();
        for path in paths {
            if path.exists() {
                match Self::load(&path) {
                    Ok(config) => return (config, ConfigOrigin::File(path)),
                    Err(e) => failures.push((path, e.to_string())),
                }
            }
        }
        (Self::default(), ConfigOrigin::Defaults(failures))
    }

    pub fn hub_options(&self) -> HubOptions {
        HubOptions {
            critical_below: self.stock.critical_below,
            warning_below: self.stock.warning_below,
            show_telemetry: self.logging.show_telemetry,
        }
    }

    /// Log configuration summary
    pub fn log_summary(&self) {
        tracing::info!("[CONFIG] Bind: {}", self.server.bind);
        if self.storage.in_memory {
            tracing::info!("[CONFIG] Storage: in memory");
        } else {
            tracing::info!("[CONFIG] Storage: {}", self.storage.data_file.display());
        }
        if let Some(dir) = &self.server.static_dir {
            tracing::info!("[CONFIG] Dashboard assets: {}", dir.display());
        }
        tracing::info!(
            "[CONFIG] Stock thresholds: critical < {}, warning < {}",
            self.stock.critical_below,
            self.stock.warning_below
        );
    }
}
