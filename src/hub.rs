//! ==============================================================================
//! hub.rs - the serialized bin synchronization engine
//! ==============================================================================
//!
//! purpose:
//!     one owner for the registry, the staging ledger, the snapshot store and
//!     the observer publisher. every request goes through a Hub behind a
//!     single mutex (SharedHub), so mutations apply one at a time in arrival
//!     order and deltas reach observers in that same order.
//!
//! per accepted mutation, in order:
//!     1. registry validates and mutates
//!     2. store.save(snapshot)          (failure logged, state kept)
//!     3. publisher.publish_delta(bin)
//!     4. ledger.stage(config)          (configuration edits only)
//!
//! rejected requests touch nothing.
//!
//! relationships:
//!     - uses: registry.rs, staging.rs, persist.rs, broadcast.rs
//!     - used by: api.rs (handlers lock the SharedHub), main.rs (construction)
//!
//! ==============================================================================

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::broadcast::{BinPublisher, Subscription};
use crate::domain::{
    Bin, BinConfig, BinMap, ConfigRequest, ConfigView, PendingConfig, RegisterRequest,
    StockStatus, Summary, TelemetryRequest,
};
use crate::error::{HubError, HubResult};
use crate::persist::SnapshotStore;
use crate::registry::{parse_unit_weight, BinRegistry};
use crate::staging::ConfigLedger;

/// handle passed to every request handler
pub type SharedHub = Arc<Mutex<Hub>>;

#[derive(Clone, Debug)]
pub struct HubOptions {
    /// bins below this count are critical
    pub critical_below: u64,
    /// bins below this count (and not critical) are in warning
    pub warning_below: u64,
    /// log every accepted telemetry update at info instead of debug
    pub show_telemetry: bool,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self {
            critical_below: 15,
            warning_below: 30,
            show_telemetry: true,
        }
    }
}

pub struct Hub {
    registry: BinRegistry,
    ledger: ConfigLedger,
    store: Arc<dyn SnapshotStore>,
    publisher: Arc<dyn BinPublisher>,
    options: HubOptions,
    clock: fn() -> DateTime<Utc>,
}

impl Hub {
    /// build a hub seeded from whatever the store holds
    pub fn new(store: Arc<dyn SnapshotStore>, publisher: Arc<dyn BinPublisher>, options: HubOptions) -> Self {
        let registry = BinRegistry::from_snapshot(store.load());
        Self {
            registry,
            ledger: ConfigLedger::new(),
            store,
            publisher,
            options,
            clock: Utc::now,
        }
    }

    /// replace the time source used for lastUpdate / stagedAt
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn into_shared(self) -> SharedHub {
        Arc::new(Mutex::new(self))
    }

    // ==========================================================================
    // mutations
    // ==========================================================================

    /// onboard a device; true when a new bin was created
    pub fn register(&mut self, req: &RegisterRequest) -> HubResult<(Bin, bool)> {
        let (bin, created) = self.registry.register(&req.device_id, req.total_capacity)?;
        if created {
            tracing::info!("Registered bin {} (capacity {:?})", bin.device_id, bin.total_capacity);
            self.commit(&bin);
        } else {
            tracing::debug!("Bin {} already registered", bin.device_id);
        }
        Ok((bin, created))
    }

    pub fn apply_telemetry(&mut self, req: &TelemetryRequest) -> HubResult<Bin> {
        let now = (self.clock)();
        let bin = self
            .registry
            .apply_telemetry(&req.device_id, req.bolt_count, req.total_capacity, now)
            .inspect_err(|e| tracing::warn!("Rejected telemetry from {}: {}", req.device_id, e))?;

        if self.options.show_telemetry {
            tracing::info!("[{}] bolt count {}", bin.device_id, bin.bolt_count);
        } else {
            tracing::debug!("[{}] bolt count {}", bin.device_id, bin.bolt_count);
        }
        self.commit(&bin);
        Ok(bin)
    }

    /// apply an operator edit to the bin now and stage it for the device
    pub fn apply_config(&mut self, req: &ConfigRequest) -> HubResult<Bin> {
        let config = BinConfig {
            part_number: req.part_number.trim().to_string(),
            location_code: req.location_code.trim().to_string(),
            unit_weight: parse_unit_weight(&req.unit_weight)?,
        };
        let bin = self
            .registry
            .apply_config(&req.device_id, &config)
            .inspect_err(|e| tracing::warn!("Rejected config for {}: {}", req.device_id, e))?;

        self.commit(&bin);
        let staged = self.ledger.stage(&bin.device_id, config, (self.clock)());
        tracing::info!(
            "Staged config for {}: part {} at {} ({} g)",
            staged.device_id,
            staged.config.part_number,
            staged.config.location_code,
            staged.config.unit_weight
        );
        Ok(bin)
    }

    /// the device reports it applied its staged config
    pub fn confirm(&mut self, device_id: &str) -> HubResult<PendingConfig> {
        let confirmed = self.ledger.confirm(device_id)?;
        tracing::info!("Config confirmed by {}", confirmed.device_id);
        Ok(confirmed)
    }

    fn commit(&self, bin: &Bin) {
        if let Err(e) = self.store.save(&self.registry.snapshot()) {
            tracing::error!("Failed to persist bin data after update to {}: {}", bin.device_id, e);
        }
        self.publisher.publish_delta(&bin.device_id, bin);
    }

    // ==========================================================================
    // reads
    // ==========================================================================

    pub fn bin(&self, device_id: &str) -> HubResult<Bin> {
        self.registry
            .get(device_id)
            .cloned()
            .ok_or_else(|| HubError::UnknownDevice(device_id.to_string()))
    }

    pub fn snapshot(&self) -> BinMap {
        self.registry.snapshot()
    }

    /// what a polling device should apply: the staged proposal if any,
    /// otherwise the bin's current configuration
    pub fn config_for(&self, device_id: &str) -> HubResult<ConfigView> {
        let bin = self.bin(device_id)?;
        let view = match self.ledger.pending_for(device_id) {
            Some(pending) => ConfigView {
                device_id: bin.device_id,
                part_number: Some(pending.config.part_number.clone()),
                location_code: Some(pending.config.location_code.clone()),
                unit_weight: Some(pending.config.unit_weight),
                pending: true,
            },
            None => ConfigView {
                device_id: bin.device_id,
                part_number: bin.part_number,
                location_code: bin.location_code,
                unit_weight: bin.unit_weight,
                pending: false,
            },
        };
        Ok(view)
    }

    pub fn pending_for(&self, device_id: &str) -> Option<&PendingConfig> {
        self.ledger.pending_for(device_id)
    }

    /// attach an observer: full snapshot now, deltas afterwards
    ///
    /// runs under the hub lock, so no mutation can fall between the snapshot
    /// and the subscription.
    pub fn subscribe(&self) -> Subscription {
        self.publisher.publish_full(self.registry.snapshot())
    }

    pub fn stock_status(&self, bin: &Bin) -> StockStatus {
        StockStatus::classify(bin.bolt_count, self.options.critical_below, self.options.warning_below)
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary {
            total_bins: self.registry.len(),
            pending_configs: self.ledger.pending_count(),
            ..Summary::default()
        };
        for bin in self.registry.iter() {
            match self.stock_status(bin) {
                StockStatus::Critical => summary.critical += 1,
                StockStatus::Warning => summary.warning += 1,
                StockStatus::Optimal => summary.optimal += 1,
            }
        }
        summary
    }

    pub fn observer_count(&self) -> usize {
        self.publisher.observer_count()
    }
}
