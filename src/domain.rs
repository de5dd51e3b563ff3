//! ==============================================================================
//! domain.rs - bin state, staged configuration and wire payloads
//! ==============================================================================
//!
//! purpose:
//!     the records the hub keeps per physical bin, and the json bodies that
//!     devices and dashboards send in.
//!
//! relationships:
//!     - used by: registry.rs (owns Bin), staging.rs (owns PendingConfig)
//!     - used by: api.rs (request payloads, ConfigView, Summary)
//!
//! ==============================================================================

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// full registry contents, keyed by device id
pub type BinMap = BTreeMap<String, Bin>;

/// state record for one physical bin sensor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bin {
    /// unique chip identifier, never changes after registration
    #[serde(alias = "chipID")]
    pub device_id: String,
    /// current sensed quantity
    #[serde(default)]
    pub bolt_count: u64,
    /// ceiling for bolt_count (0 or unset means unbounded)
    #[serde(default)]
    pub total_capacity: Option<u64>,
    #[serde(default)]
    pub part_number: Option<String>,
    #[serde(default)]
    pub location_code: Option<String>,
    /// weight of a single unit in grams
    #[serde(default, alias = "boltWeight")]
    pub unit_weight: Option<f64>,
    /// time of the last accepted telemetry write
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
}

impl Bin {
    /// a freshly onboarded bin: empty, unconfigured, never reported
    pub fn new(device_id: impl Into<String>, total_capacity: Option<u64>) -> Self {
        Self {
            device_id: device_id.into(),
            bolt_count: 0,
            total_capacity,
            part_number: None,
            location_code: None,
            unit_weight: None,
            last_update: None,
        }
    }

    /// capacity that bolt_count is checked against, if any
    pub fn effective_capacity(&self) -> Option<u64> {
        self.total_capacity.filter(|c| *c > 0)
    }
}

/// operator-supplied metadata for a bin
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinConfig {
    pub part_number: String,
    pub location_code: String,
    pub unit_weight: f64,
}

/// a configuration applied to a bin but not yet acknowledged by the device
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingConfig {
    pub device_id: String,
    #[serde(flatten)]
    pub config: BinConfig,
    pub confirmed: bool,
    pub staged_at: DateTime<Utc>,
}

/// what a polling device gets back from GET /config/{deviceId}
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigView {
    pub device_id: String,
    pub part_number: Option<String>,
    pub location_code: Option<String>,
    pub unit_weight: Option<f64>,
    /// true while the device has not confirmed this configuration
    pub pending: bool,
}

// ==============================================================================
// stock status
// ==============================================================================

/// coarse fill level, same buckets the dashboard colours by
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StockStatus {
    Critical,
    Warning,
    Optimal,
}

impl StockStatus {
    pub fn classify(bolt_count: u64, critical_below: u64, warning_below: u64) -> Self {
        match bolt_count {
            n if n < critical_below => StockStatus::Critical,
            n if n < warning_below => StockStatus::Warning,
            _ => StockStatus::Optimal,
        }
    }
}

/// fleet overview served at GET /summary
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_bins: usize,
    pub critical: usize,
    pub warning: usize,
    pub optimal: usize,
    pub pending_configs: usize,
}

// ==============================================================================
// request payloads
// ==============================================================================
// numbers arrive as signed json values so a negative count is reported as
// out of range instead of failing deserialization.

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(alias = "chipID")]
    pub device_id: String,
    #[serde(default)]
    pub total_capacity: Option<u64>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRequest {
    #[serde(alias = "chipID")]
    pub device_id: String,
    pub bolt_count: i64,
    #[serde(default)]
    pub total_capacity: Option<i64>,
}

/// unit_weight is kept raw: dashboards submit it from a form field and may
/// send "12.5" as a string
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigRequest {
    #[serde(alias = "chipID")]
    pub device_id: String,
    pub part_number: String,
    pub location_code: String,
    #[serde(alias = "boltWeight")]
    pub unit_weight: serde_json::Value,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    #[serde(alias = "chipID")]
    pub device_id: String,
}
