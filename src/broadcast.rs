//! ==============================================================================
//! broadcast.rs - push bin state to connected observers
//! ==============================================================================
//!
//! purpose:
//!     fire-and-forget fan-out of registry changes. a new observer receives the
//!     whole registry once, then one delta per accepted mutation. nothing is
//!     replayed: an observer that lags behind the channel capacity loses the
//!     skipped deltas.
//!
//! events (names match what the dashboard listens for):
//!     - initialBinData: { "<deviceId>": Bin, ... }
//!     - updateBinData:  { "deviceId": "...", "data": Bin }
//!
//! relationships:
//!     - used by: hub.rs (publishes after each mutation)
//!     - used by: api.rs (GET /events turns a Subscription into sse)
//!
//! ==============================================================================

use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use crate::domain::{Bin, BinMap};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BinDelta {
    pub device_id: String,
    pub data: Bin,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BinEvent {
    /// full registry, sent once to each new observer
    InitialBinData(BinMap),
    /// one bin changed
    UpdateBinData(BinDelta),
}

impl BinEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BinEvent::InitialBinData(_) => "initialBinData",
            BinEvent::UpdateBinData(_) => "updateBinData",
        }
    }

    pub fn payload(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            BinEvent::InitialBinData(bins) => serde_json::to_value(bins),
            BinEvent::UpdateBinData(delta) => serde_json::to_value(delta),
        }
    }
}

/// what the hub depends on to notify observers
pub trait BinPublisher: Send + Sync {
    /// seed a newly connected observer with the full registry
    ///
    /// the returned subscription yields `snapshot` first, then every delta
    /// published after this call.
    fn publish_full(&self, snapshot: BinMap) -> Subscription;

    /// tell every connected observer that one bin changed
    fn publish_delta(&self, device_id: &str, bin: &Bin);

    /// number of observers currently attached
    fn observer_count(&self) -> usize;
}

/// one observer's view of the event flow
pub struct Subscription {
    initial: BinEvent,
    receiver: broadcast::Receiver<BinEvent>,
}

impl Subscription {
    /// initial snapshot followed by live deltas; lagged deltas are dropped
    pub fn into_stream(self) -> impl Stream<Item = BinEvent> + Send + 'static {
        let live = BroadcastStream::new(self.receiver).filter_map(|item| match item {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!("Observer lagged, {} bin updates dropped", skipped);
                None
            }
        });
        tokio_stream::once(self.initial).chain(live)
    }
}

// ==============================================================================
// tokio broadcast implementation
// ==============================================================================

pub struct BroadcastHub {
    sender: broadcast::Sender<BinEvent>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(256)
    }
}

impl BinPublisher for BroadcastHub {
    fn publish_full(&self, snapshot: BinMap) -> Subscription {
        let receiver = self.sender.subscribe();
        tracing::info!(
            "Observer connected ({} bins, {} observers)",
            snapshot.len(),
            self.sender.receiver_count()
        );
        Subscription {
            initial: BinEvent::InitialBinData(snapshot),
            receiver,
        }
    }

    fn publish_delta(&self, device_id: &str, bin: &Bin) {
        let event = BinEvent::UpdateBinData(BinDelta {
            device_id: device_id.to_string(),
            data: bin.clone(),
        });
        // no receivers is fine
        let _ = self.sender.send(event);
    }

    fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bin(id: &str, count: u64) -> Bin {
        let mut b = Bin::new(id, None);
        b.bolt_count = count;
        b
    }

    #[tokio::test]
    async fn observer_sees_snapshot_then_deltas_in_order() {
        let hub = BroadcastHub::new(16);
        let mut snapshot = BinMap::new();
        snapshot.insert("A".into(), bin("A", 50));

        let mut stream = Box::pin(hub.publish_full(snapshot.clone()).into_stream());
        hub.publish_delta("A", &bin("A", 40));
        hub.publish_delta("A", &bin("A", 30));

        assert_eq!(stream.next().await, Some(BinEvent::InitialBinData(snapshot)));
        for expected in [40, 30] {
            match stream.next().await {
                Some(BinEvent::UpdateBinData(delta)) => {
                    assert_eq!(delta.device_id, "A");
                    assert_eq!(delta.data.bolt_count, expected);
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn late_observer_does_not_get_old_deltas() {
        let hub = BroadcastHub::new(16);
        hub.publish_delta("A", &bin("A", 1));

        let sub = hub.publish_full(BinMap::new());
        let mut stream = Box::pin(sub.into_stream());
        hub.publish_delta("A", &bin("A", 2));

        assert_eq!(stream.next().await, Some(BinEvent::InitialBinData(BinMap::new())));
        match stream.next().await {
            Some(BinEvent::UpdateBinData(delta)) => assert_eq!(delta.data.bolt_count, 2),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn lagging_observer_skips_ahead() {
        let hub = BroadcastHub::new(2);
        let mut stream = Box::pin(hub.publish_full(BinMap::new()).into_stream());
        for n in 0..5 {
            hub.publish_delta("A", &bin("A", n));
        }

        assert!(matches!(stream.next().await, Some(BinEvent::InitialBinData(_))));
        match stream.next().await {
            Some(BinEvent::UpdateBinData(delta)) => assert_eq!(delta.data.bolt_count, 3),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn publishing_without_observers_is_harmless() {
        let hub = BroadcastHub::default();
        hub.publish_delta("A", &bin("A", 1));
        assert_eq!(hub.observer_count(), 0);
    }

    #[test]
    fn delta_payload_shape() {
        let event = BinEvent::UpdateBinData(BinDelta {
            device_id: "A".into(),
            data: bin("A", 40),
        });
        assert_eq!(event.name(), "updateBinData");
        let payload = event.payload().unwrap();
        assert_eq!(payload["deviceId"], "A");
        assert_eq!(payload["data"]["boltCount"], 40);
    }
}
