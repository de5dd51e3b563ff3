//! ==============================================================================
//! registry.rs - authoritative bin state
//! ==============================================================================
//!
//! purpose:
//!     holds one Bin per registered device and enforces the rules for changing
//!     it. nothing outside this module mutates a Bin.
//!
//! rules:
//!     - telemetry and configuration never create a bin; only register() does
//!     - bolt_count stays within [0, capacity] when capacity is positive
//!     - a rejected update leaves the stored bin untouched
//!
//! relationships:
//!     - used by: hub.rs (the only owner, behind the hub mutex)
//!     - uses: domain.rs (Bin, BinConfig), error.rs (HubError)
//!
//! ==============================================================================

use chrono::{DateTime, Utc};

use crate::domain::{Bin, BinConfig, BinMap};
use crate::error::{HubError, HubResult};

#[derive(Debug, Default)]
pub struct BinRegistry {
    bins: BinMap,
}

impl BinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// rebuild from a loaded snapshot
    ///
    /// entries whose key disagrees with the stored device id are re-keyed by
    /// the map key, which is what devices address the bin by.
    pub fn from_snapshot(snapshot: BinMap) -> Self {
        let bins = snapshot
            .into_iter()
            .map(|(key, mut bin)| {
                if bin.device_id != key {
                    tracing::warn!("Snapshot entry '{}' carried device id '{}'", key, bin.device_id);
                    bin.device_id = key.clone();
                }
                if let Some(limit) = bin.effective_capacity().filter(|c| bin.bolt_count > *c) {
                    tracing::warn!(
                        "Snapshot entry '{}' has bolt count {} above total capacity {}",
                        key,
                        bin.bolt_count,
                        limit
                    );
                }
                (key, bin)
            })
            .collect();
        Self { bins }
    }

    pub fn get(&self, device_id: &str) -> Option<&Bin> {
        self.bins.get(device_id)
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bin> {
        self.bins.values()
    }

    /// immutable copy of every bin, for persistence and observer seeding
    pub fn snapshot(&self) -> BinMap {
        self.bins.clone()
    }

    /// onboard a device
    ///
    /// returns the bin and whether it was created. an already known device is
    /// returned as-is.
    pub fn register(&mut self, device_id: &str, total_capacity: Option<u64>) -> HubResult<(Bin, bool)> {
        let device_id = require_device_id(device_id)?;
        if let Some(existing) = self.bins.get(device_id) {
            return Ok((existing.clone(), false));
        }
        let bin = Bin::new(device_id, total_capacity);
        self.bins.insert(device_id.to_string(), bin.clone());
        Ok((bin, true))
    }

    /// accept a sensed quantity from a device
    pub fn apply_telemetry(
        &mut self,
        device_id: &str,
        bolt_count: i64,
        total_capacity: Option<i64>,
        at: DateTime<Utc>,
    ) -> HubResult<Bin> {
        let device_id = require_device_id(device_id)?;
        let existing = self
            .bins
            .get(device_id)
            .ok_or_else(|| HubError::UnknownDevice(device_id.to_string()))?;

        let count = u64::try_from(bolt_count)
            .map_err(|_| HubError::OutOfRange(format!("bolt count {} is negative", bolt_count)))?;
        let capacity = match total_capacity {
            Some(c) => Some(
                u64::try_from(c)
                    .map_err(|_| HubError::OutOfRange(format!("total capacity {} is negative", c)))?,
            ),
            None => existing.total_capacity,
        };
        if let Some(limit) = capacity.filter(|c| *c > 0) {
            if count > limit {
                return Err(HubError::OutOfRange(format!(
                    "bolt count {} exceeds total capacity {}",
                    count, limit
                )));
            }
        }

        let updated = Bin {
            bolt_count: count,
            total_capacity: capacity,
            last_update: Some(at),
            ..existing.clone()
        };
        self.bins.insert(device_id.to_string(), updated.clone());
        Ok(updated)
    }

    /// replace a bin's configuration in place; counts and timestamps are kept
    pub fn apply_config(&mut self, device_id: &str, config: &BinConfig) -> HubResult<Bin> {
        let device_id = require_device_id(device_id)?;
        validate_config(config)?;
        let bin = self
            .bins
            .get_mut(device_id)
            .ok_or_else(|| HubError::UnknownDevice(device_id.to_string()))?;

        bin.part_number = Some(config.part_number.clone());
        bin.location_code = Some(config.location_code.clone());
        bin.unit_weight = Some(config.unit_weight);
        Ok(bin.clone())
    }
}

/// ids are matched byte for byte on every path, so padded ids are refused
/// rather than silently normalized
fn require_device_id(device_id: &str) -> HubResult<&str> {
    if device_id.trim().is_empty() {
        return Err(HubError::MalformedRequest("deviceId is required".into()));
    }
    if device_id.trim() != device_id {
        return Err(HubError::MalformedRequest(format!(
            "deviceId '{}' has surrounding whitespace",
            device_id
        )));
    }
    Ok(device_id)
}

/// checks every field of a proposed configuration
pub fn validate_config(config: &BinConfig) -> HubResult<()> {
    if config.part_number.trim().is_empty() {
        return Err(HubError::MalformedRequest("partNumber is required".into()));
    }
    if config.location_code.trim().is_empty() {
        return Err(HubError::MalformedRequest("locationCode is required".into()));
    }
    if !config.unit_weight.is_finite() || config.unit_weight < 0.0 {
        return Err(HubError::InvalidWeight(config.unit_weight.to_string()));
    }
    Ok(())
}

/// interpret a raw json weight as a finite non-negative number
///
/// accepts json numbers and numeric strings ("12.5").
pub fn parse_unit_weight(raw: &serde_json::Value) -> HubResult<f64> {
    let weight = match raw {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| HubError::InvalidWeight(raw.to_string()))?;

    if !weight.is_finite() || weight < 0.0 {
        return Err(HubError::InvalidWeight(raw.to_string()));
    }
    Ok(weight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn config(part: &str, loc: &str, weight: f64) -> BinConfig {
        BinConfig {
            part_number: part.into(),
            location_code: loc.into(),
            unit_weight: weight,
        }
    }

    fn registry_with(device_id: &str, capacity: Option<u64>) -> BinRegistry {
        let mut registry = BinRegistry::new();
        registry.register(device_id, capacity).unwrap();
        registry
    }

    #[test]
    fn register_creates_once() {
        let mut registry = BinRegistry::new();
        let (bin, created) = registry.register("A", Some(100)).unwrap();
        assert!(created);
        assert_eq!(bin.bolt_count, 0);
        assert_eq!(bin.total_capacity, Some(100));

        registry.apply_telemetry("A", 10, None, at(0)).unwrap();
        let (again, created) = registry.register("A", Some(5)).unwrap();
        assert!(!created);
        assert_eq!(again.bolt_count, 10);
        assert_eq!(again.total_capacity, Some(100));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn register_rejects_blank_id() {
        let mut registry = BinRegistry::new();
        assert!(matches!(registry.register("  ", None), Err(HubError::MalformedRequest(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn padded_ids_are_rejected_everywhere() {
        let mut registry = BinRegistry::new();
        assert!(matches!(registry.register("A ", None), Err(HubError::MalformedRequest(_))));
        assert!(registry.is_empty());

        registry.register("A", None).unwrap();
        assert!(matches!(
            registry.apply_telemetry(" A", 3, None, at(0)),
            Err(HubError::MalformedRequest(_))
        ));
        assert!(matches!(
            registry.apply_config("A\t", &config("P1", "L1", 1.0)),
            Err(HubError::MalformedRequest(_))
        ));
        assert_eq!(registry.get("A").unwrap().bolt_count, 0);
    }

    #[test]
    fn telemetry_on_unknown_device_is_rejected() {
        let mut registry = BinRegistry::new();
        let err = registry.apply_telemetry("ghost", 1, None, at(0)).unwrap_err();
        assert!(matches!(err, HubError::UnknownDevice(id) if id == "ghost"));
        assert!(registry.is_empty());
    }

    #[test]
    fn telemetry_over_capacity_keeps_prior_state() {
        let mut registry = registry_with("A", Some(100));
        registry.apply_telemetry("A", 50, None, at(0)).unwrap();
        let before = registry.get("A").cloned();

        let err = registry.apply_telemetry("A", 150, None, at(1)).unwrap_err();
        assert!(matches!(err, HubError::OutOfRange(_)));
        assert_eq!(registry.get("A").cloned(), before);
    }

    #[test]
    fn negative_values_are_out_of_range() {
        let mut registry = registry_with("A", None);
        assert!(matches!(
            registry.apply_telemetry("A", -1, None, at(0)),
            Err(HubError::OutOfRange(_))
        ));
        assert!(matches!(
            registry.apply_telemetry("A", 1, Some(-5), at(0)),
            Err(HubError::OutOfRange(_))
        ));
        assert_eq!(registry.get("A").unwrap().last_update, None);
    }

    #[test]
    fn supplied_capacity_is_checked_before_storing() {
        let mut registry = registry_with("A", Some(100));
        assert!(matches!(
            registry.apply_telemetry("A", 60, Some(40), at(0)),
            Err(HubError::OutOfRange(_))
        ));
        let bin = registry.apply_telemetry("A", 60, Some(200), at(0)).unwrap();
        assert_eq!(bin.total_capacity, Some(200));
        assert_eq!(bin.bolt_count, 60);
    }

    #[test]
    fn zero_or_missing_capacity_does_not_bound() {
        let mut registry = registry_with("A", Some(0));
        assert_eq!(registry.apply_telemetry("A", 5000, None, at(0)).unwrap().bolt_count, 5000);
        let mut registry = registry_with("B", None);
        assert_eq!(registry.apply_telemetry("B", 5000, None, at(0)).unwrap().bolt_count, 5000);
    }

    #[test]
    fn telemetry_preserves_configuration() {
        let mut registry = registry_with("A", Some(100));
        registry.apply_config("A", &config("P1", "L1", 12.5)).unwrap();
        let bin = registry.apply_telemetry("A", 40, None, at(3)).unwrap();
        assert_eq!(bin.part_number.as_deref(), Some("P1"));
        assert_eq!(bin.location_code.as_deref(), Some("L1"));
        assert_eq!(bin.unit_weight, Some(12.5));
        assert_eq!(bin.last_update, Some(at(3)));
    }

    #[test]
    fn telemetry_replay_converges() {
        let mut registry = registry_with("A", Some(100));
        registry.apply_telemetry("A", 40, Some(100), at(0)).unwrap();
        let first = registry.snapshot();
        registry.apply_telemetry("A", 40, Some(100), at(0)).unwrap();
        assert_eq!(registry.snapshot(), first);
    }

    #[test]
    fn config_keeps_count_and_timestamp() {
        let mut registry = registry_with("A", None);
        registry.apply_telemetry("A", 7, None, at(9)).unwrap();
        let bin = registry.apply_config("A", &config("P2", "L2", 1.0)).unwrap();
        assert_eq!(bin.bolt_count, 7);
        assert_eq!(bin.last_update, Some(at(9)));
        assert_eq!(bin.part_number.as_deref(), Some("P2"));
    }

    #[test]
    fn config_on_unknown_device_is_rejected() {
        let mut registry = BinRegistry::new();
        let err = registry.apply_config("A", &config("P1", "L1", 12.5)).unwrap_err();
        assert!(matches!(err, HubError::UnknownDevice(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn config_validation() {
        let mut registry = registry_with("A", None);
        assert!(matches!(
            registry.apply_config("A", &config("", "L1", 1.0)),
            Err(HubError::MalformedRequest(_))
        ));
        assert!(matches!(
            registry.apply_config("A", &config("P1", " ", 1.0)),
            Err(HubError::MalformedRequest(_))
        ));
        assert!(matches!(
            registry.apply_config("A", &config("P1", "L1", -0.5)),
            Err(HubError::InvalidWeight(_))
        ));
        assert!(matches!(
            registry.apply_config("A", &config("P1", "L1", f64::NAN)),
            Err(HubError::InvalidWeight(_))
        ));
        assert_eq!(registry.get("A").unwrap().part_number, None);
    }

    #[test]
    fn unit_weight_parsing() {
        assert_eq!(parse_unit_weight(&json!(12.5)).unwrap(), 12.5);
        assert_eq!(parse_unit_weight(&json!(0)).unwrap(), 0.0);
        assert_eq!(parse_unit_weight(&json!(" 3.25 ")).unwrap(), 3.25);
        assert!(matches!(parse_unit_weight(&json!("heavy")), Err(HubError::InvalidWeight(_))));
        assert!(matches!(parse_unit_weight(&json!(-1)), Err(HubError::InvalidWeight(_))));
        assert!(matches!(parse_unit_weight(&json!("inf")), Err(HubError::InvalidWeight(_))));
        assert!(matches!(parse_unit_weight(&json!(null)), Err(HubError::InvalidWeight(_))));
        assert!(matches!(parse_unit_weight(&json!(true)), Err(HubError::InvalidWeight(_))));
    }

    #[test]
    fn snapshot_rekeys_mismatched_entries() {
        let mut snapshot = BinMap::new();
        snapshot.insert("A".into(), Bin::new("B", None));
        let registry = BinRegistry::from_snapshot(snapshot);
        assert_eq!(registry.get("A").unwrap().device_id, "A");
    }

    #[test]
    fn snapshot_over_capacity_is_loaded_as_is() {
        let mut bin = Bin::new("A", Some(10));
        bin.bolt_count = 25;
        let mut snapshot = BinMap::new();
        snapshot.insert("A".into(), bin);

        let mut registry = BinRegistry::from_snapshot(snapshot);
        assert_eq!(registry.get("A").unwrap().bolt_count, 25);
        // the next report has to respect the capacity again
        assert!(matches!(
            registry.apply_telemetry("A", 25, None, at(0)),
            Err(HubError::OutOfRange(_))
        ));
    }
}
