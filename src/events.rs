//! Notifications published to the host after each processed row.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::{debug, warn};

use crate::constants::events::ROW_PROCESSED_EVENT;
use crate::types::{EventName, MagicNumber, NodeId, RowIndex};

/// Fire-and-forget notification channel to the host.
pub trait EventPublisher: Send + Sync {
    /// Publish `payload` under `event`. Delivery is not acknowledged.
    fn publish(&self, event: &str, payload: &Value);
}

/// Payload of `dataset_row_processed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowProcessedEvent {
    /// Cursor instance that processed the row.
    pub node_id: NodeId,
    /// Magic number after counting the row.
    pub magic_number: MagicNumber,
    /// Table index of the processed row.
    pub row_index: RowIndex,
}

impl RowProcessedEvent {
    /// Event name used when publishing.
    pub const NAME: &'static str = ROW_PROCESSED_EVENT;

    /// Decode a published payload.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        serde_json::from_value(payload.clone()).ok()
    }
}

/// Publisher that only logs.
#[derive(Clone, Debug, Default)]
pub struct LogPublisher;

impl EventPublisher for LogPublisher {
    fn publish(&self, event: &str, payload: &Value) {
        debug!("[dataset_batch:events] {} {}", event, payload);
    }
}

/// Publisher that drops everything.
#[derive(Clone, Debug, Default)]
pub struct NullPublisher;

impl EventPublisher for NullPublisher {
    fn publish(&self, _event: &str, _payload: &Value) {}
}

/// Publisher forwarding events over a channel to a host loop.
pub struct ChannelPublisher {
    sender: Mutex<Sender<(EventName, Value)>>,
}

impl ChannelPublisher {
    /// Create a publisher and the receiving end for the host.
    pub fn new() -> (Self, Receiver<(EventName, Value)>) {
        let (sender, receiver) = mpsc::channel();
        (
            Self {
                sender: Mutex::new(sender),
            },
            receiver,
        )
    }
}

impl EventPublisher for ChannelPublisher {
    fn publish(&self, event: &str, payload: &Value) {
        let Ok(sender) = self.sender.lock() else {
            warn!("[dataset_batch:events] channel publisher lock poisoned; dropping {event}");
            return;
        };
        if sender.send((event.to_string(), payload.clone())).is_err() {
            debug!("[dataset_batch:events] no receiver for {}", event);
        }
    }
}
