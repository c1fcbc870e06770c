//! Actor Lifecycle Management
//!
//! Actors are long-running units of concurrent execution. Each one has a
//! stable address, a private mailbox and an optional tick timer.
//!
//! # Lifecycle
//!
//! Actors have the following lifecycle hooks:
//! - `on_start`: Called once before the first message is delivered
//! - `on_stop`: Called when the actor stops
//! - `on_message`: Called for every envelope delivered to the mailbox
//! - `on_tick`: Called periodically if tick_interval is set

mod envelope;
mod system;

pub use envelope::*;
pub use system::*;

use std::time::Duration;

use async_trait::async_trait;

// ─────────────────────────────────────────────────────────────────────────────
// Actor Error
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can occur in the actor runtime
#[derive(Debug, Clone, thiserror::Error)]
pub enum ActorError {
    #[error("Actor initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Address already in use: {0}")]
    AddressInUse(String),

    #[error("Unknown address: {0}")]
    UnknownAddress(String),

    #[error("Actor not running: {0}")]
    NotRunning(String),

    #[error("Delivery to {0} timed out")]
    DeliveryTimeout(String),

    #[error("Message handling failed: {0}")]
    MessageError(String),

    #[error("Shutdown timeout")]
    ShutdownTimeout,
}

/// Result type for actor operations
pub type ActorResult<T> = Result<T, ActorError>;

// ─────────────────────────────────────────────────────────────────────────────
// Actor Specification
// ─────────────────────────────────────────────────────────────────────────────

/// Static description of an actor
#[derive(Debug, Clone)]
pub struct ActorSpec {
    /// Stable address other actors use to reach this one
    pub address: String,

    /// Optional tick interval for periodic on_tick calls
    pub tick_interval: Option<Duration>,

    /// Timeout for graceful shutdown
    pub shutdown_timeout: Duration,

    /// Optional description
    pub description: Option<String>,
}

impl Default for ActorSpec {
    fn default() -> Self {
        Self {
            address: String::new(),
            tick_interval: None,
            shutdown_timeout: Duration::from_secs(5),
            description: None,
        }
    }
}

impl ActorSpec {
    /// Create a new actor spec for an address
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    /// Set tick interval
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = Some(interval);
        self
    }

    /// Set shutdown timeout
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set description
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Actor Context
// ─────────────────────────────────────────────────────────────────────────────

/// Context passed to actor lifecycle methods
pub struct ActorContext {
    /// Address of the actor this context belongs to
    pub address: String,

    /// Route table used to reach other actors
    postman: Postman,
}

impl ActorContext {
    /// Create a new actor context
    pub fn new(address: String, postman: Postman) -> Self {
        Self { address, postman }
    }

    /// Deliver a prepared envelope
    pub async fn deliver(&self, envelope: Envelope) -> ActorResult<()> {
        self.postman.deliver(envelope).await
    }

    /// Build an envelope from this actor and deliver it
    pub async fn send(
        &self,
        to: impl Into<String>,
        kind: impl Into<String>,
        payload: serde_json::Value,
    ) -> ActorResult<()> {
        let envelope = Envelope::new(&self.address, to, kind, payload);
        self.deliver(envelope).await
    }

    /// Whether an address currently has a mailbox
    pub fn is_reachable(&self, address: &str) -> bool {
        self.postman.contains(address)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Actor Trait
// ─────────────────────────────────────────────────────────────────────────────

/// The core Actor trait with lifecycle hooks
///
/// Implement this trait to create an actor that can be managed by the
/// ActorSystem. Errors returned from `on_message` and `on_tick` are logged and
/// never stop the actor loop.
#[async_trait]
pub trait Actor: Send + Sync + 'static {
    /// Returns the actor specification
    fn spec(&self) -> ActorSpec;

    /// Called when the actor starts
    ///
    /// If this returns an error, the actor will not be started.
    async fn on_start(&mut self, _ctx: &ActorContext) -> ActorResult<()> {
        Ok(())
    }

    /// Called when the actor stops
    async fn on_stop(&mut self, _ctx: &ActorContext) -> ActorResult<()> {
        Ok(())
    }

    /// Called for every envelope delivered to this actor's mailbox
    async fn on_message(&mut self, ctx: &ActorContext, envelope: Envelope) -> ActorResult<()>;

    /// Called periodically if tick_interval is set in the spec
    async fn on_tick(&mut self, _ctx: &ActorContext) -> ActorResult<()> {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
