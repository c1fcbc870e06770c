//! Envelopes and Delivery
//!
//! Envelopes are the only way actors talk to each other. Delivery is
//! point-to-point by address; there is no implicit broadcast.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;

use super::{ActorError, ActorResult};

// ─────────────────────────────────────────────────────────────────────────────
// Envelope
// ─────────────────────────────────────────────────────────────────────────────

/// A message in transit between two actors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Sender address
    pub from: String,

    /// Recipient address
    pub to: String,

    /// Message kind tag (e.g., "EmergencyAlert", "Dispatch")
    pub kind: String,

    /// Message payload
    pub payload: serde_json::Value,

    /// Timestamp when the envelope was created (Unix milliseconds)
    pub timestamp: u64,
}

impl Envelope {
    /// Create a new envelope
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        kind: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind: kind.into(),
            payload,
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        }
    }

    /// Create an envelope with an empty payload
    pub fn empty(from: impl Into<String>, to: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::new(from, to, kind, serde_json::Value::Null)
    }

    /// Deserialize the payload to a specific type
    pub fn parse_payload<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Postman
// ─────────────────────────────────────────────────────────────────────────────

/// Address-routed delivery to actor mailboxes
///
/// Cloning is cheap; all clones share the same route table.
#[derive(Clone)]
pub struct Postman {
    routes: Arc<DashMap<String, mpsc::Sender<Envelope>>>,
    delivery_timeout: Duration,
}

impl Default for Postman {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl Postman {
    /// Create a postman whose deliveries wait at most `delivery_timeout` on a
    /// full mailbox
    pub fn new(delivery_timeout: Duration) -> Self {
        Self {
            routes: Arc::new(DashMap::new()),
            delivery_timeout,
        }
    }

    pub(crate) fn register(&self, address: &str, tx: mpsc::Sender<Envelope>) {
        self.routes.insert(address.to_string(), tx);
    }

    pub(crate) fn unregister(&self, address: &str) {
        self.routes.remove(address);
    }

    /// Whether an address currently has a mailbox
    pub fn contains(&self, address: &str) -> bool {
        self.routes.contains_key(address)
    }

    /// Deliver an envelope to its recipient's mailbox
    pub async fn deliver(&self, envelope: Envelope) -> ActorResult<()> {
        // Clone the sender so the map guard is not held across the await
        let tx = self
            .routes
            .get(&envelope.to)
            .map(|route| route.value().clone())
            .ok_or_else(|| ActorError::UnknownAddress(envelope.to.clone()))?;

        let to = envelope.to.clone();
        tx.send_timeout(envelope, self.delivery_timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => ActorError::DeliveryTimeout(to),
                SendTimeoutError::Closed(_) => ActorError::NotRunning(to),
            })
    }
}

impl std::fmt::Debug for Postman {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Postman")
            .field("routes", &self.routes.len())
            .field("delivery_timeout", &self.delivery_timeout)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
