//! ==============================================================================
//! binhub - inventory bin synchronization hub
//! ==============================================================================
//!
//! keeps a fleet of bolt-counting bins (one chip id each) in sync with live
//! dashboards, and hands operator configuration down to devices through a
//! staged, confirmed handshake.
//!
//! modules, leaves first:
//!     - domain:    Bin, PendingConfig, payloads
//!     - error:     HubError and its http mapping
//!     - registry:  authoritative bin state and validation
//!     - staging:   configuration awaiting device confirmation
//!     - persist:   snapshot load / save
//!     - broadcast: observer fan-out
//!     - hub:       the serialized engine tying the above together
//!     - api:       axum router
//!     - config:    binhub.toml
//!
//! ==============================================================================

pub mod api;
pub mod broadcast;
pub mod config;
pub mod domain;
pub mod error;
pub mod hub;
pub mod persist;
pub mod registry;
pub mod staging;

pub use error::{HubError, HubResult};
pub use hub::{Hub, HubOptions, SharedHub};
