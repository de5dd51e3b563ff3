//! ==============================================================================
//! staging.rs - configuration awaiting device confirmation
//! ==============================================================================
//!
//! the bin already carries an accepted configuration; this ledger only
//! remembers that the device has not acknowledged it yet. one entry per
//! device, newest proposal wins, nothing is persisted.
//!
//! ==============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::domain::{BinConfig, PendingConfig};
use crate::error::{HubError, HubResult};

#[derive(Debug, Default)]
pub struct ConfigLedger {
    pending: HashMap<String, PendingConfig>,
}

impl ConfigLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// record a proposal, discarding whatever was staged before
    pub fn stage(&mut self, device_id: &str, config: BinConfig, at: DateTime<Utc>) -> &PendingConfig {
        let entry = PendingConfig {
            device_id: device_id.to_string(),
            config,
            confirmed: false,
            staged_at: at,
        };
        if let Some(replaced) = self.pending.insert(device_id.to_string(), entry) {
            tracing::debug!(
                "Superseded unconfirmed config for {} staged at {}",
                device_id,
                replaced.staged_at
            );
        }
        &self.pending[device_id]
    }

    /// device acknowledged the staged config; the entry is removed
    pub fn confirm(&mut self, device_id: &str) -> HubResult<PendingConfig> {
        let mut entry = self
            .pending
            .remove(device_id)
            .ok_or_else(|| HubError::NoPendingConfig(device_id.to_string()))?;
        entry.confirmed = true;
        Ok(entry)
    }

    pub fn pending_for(&self, device_id: &str) -> Option<&PendingConfig> {
        self.pending.get(device_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
