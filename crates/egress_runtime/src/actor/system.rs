//! Actor System
//!
//! Spawns actors under unique addresses, routes envelopes to their mailboxes
//! and shuts them all down together.

use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{Actor, ActorContext, ActorError, ActorResult, ActorSpec, Envelope, Postman};

/// Capacity of every actor mailbox
const MAILBOX_CAPACITY: usize = 256;

// ─────────────────────────────────────────────────────────────────────────────
// Actor System
// ─────────────────────────────────────────────────────────────────────────────

/// Central manager for all actors
///
/// The ActorSystem is responsible for:
/// - Spawning new actors under unique addresses
/// - Routing envelopes to mailboxes
/// - Managing graceful shutdown
pub struct ActorSystem {
    /// Task of every spawned actor, by address
    tasks: DashMap<String, JoinHandle<ActorResult<()>>>,

    /// Shared route table handed to every actor context
    postman: Postman,

    /// Broadcast channel for shutdown signal
    shutdown_tx: broadcast::Sender<()>,

    /// How long shutdown_all waits for the actors to finish
    shutdown_timeout: Duration,
}

impl Default for ActorSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl ActorSystem {
    /// Create a new actor system
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            tasks: DashMap::new(),
            postman: Postman::default(),
            shutdown_tx,
            shutdown_timeout: Duration::from_secs(10),
        }
    }

    /// Spawn a new actor on its own task
    pub fn spawn<A: Actor>(&self, actor: A) -> ActorResult<()> {
        let spec = actor.spec();
        let address = spec.address.clone();

        if address.is_empty() {
            return Err(ActorError::InitializationFailed(
                "actor address must not be empty".to_string(),
            ));
        }
        if self.tasks.contains_key(&address) || self.postman.contains(&address) {
            return Err(ActorError::AddressInUse(address));
        }

        let (mailbox_tx, mailbox_rx) = mpsc::channel(MAILBOX_CAPACITY);
        self.postman.register(&address, mailbox_tx);

        tracing::debug!(
            address = %address,
            description = spec.description.as_deref().unwrap_or(""),
            tick = ?spec.tick_interval,
            "Spawning actor"
        );

        let ctx = ActorContext::new(address.clone(), self.postman.clone());
        let shutdown_rx = self.shutdown_tx.subscribe();
        let postman = self.postman.clone();
        let route = address.clone();

        let task = tokio::spawn(async move {
            let result = run_actor_loop(actor, ctx, mailbox_rx, shutdown_rx, spec).await;
            postman.unregister(&route);
            result
        });
        self.tasks.insert(address, task);

        Ok(())
    }

    /// Deliver an envelope from outside the actor system
    pub async fn post(&self, envelope: Envelope) -> ActorResult<()> {
        self.postman.deliver(envelope).await
    }

    /// Signal every actor to stop and wait for their tasks
    pub async fn shutdown_all(&self) -> ActorResult<()> {
        tracing::info!(actors = self.tasks.len(), "Initiating shutdown of all actors");

        let _ = self.shutdown_tx.send(());

        let addresses: Vec<String> = self.tasks.iter().map(|entry| entry.key().clone()).collect();
        let tasks: Vec<(String, JoinHandle<ActorResult<()>>)> = addresses
            .iter()
            .filter_map(|address| self.tasks.remove(address))
            .collect();

        let result = tokio::time::timeout(self.shutdown_timeout, async {
            for (address, task) in tasks {
                match task.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::debug!(address = %address, error = %e, "Actor ended with an error"),
                    Err(e) => tracing::error!(address = %address, error = ?e, "Actor task panicked"),
                }
            }
        })
        .await;

        if result.is_err() {
            tracing::warn!("Some actors did not stop within timeout");
            return Err(ActorError::ShutdownTimeout);
        }

        Ok(())
    }

    /// Get the number of actors
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Check if there are no actors
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Actor Task Loop
// ─────────────────────────────────────────────────────────────────────────────

/// Run the main actor loop
///
/// A receive never blocks forever: when the mailbox is quiet the tick timer
/// fires, so every actor keeps making progress on its own.
async fn run_actor_loop<A: Actor>(
    mut actor: A,
    ctx: ActorContext,
    mut mailbox_rx: mpsc::Receiver<Envelope>,
    mut shutdown_rx: broadcast::Receiver<()>,
    spec: ActorSpec,
) -> ActorResult<()> {
    if let Err(e) = actor.on_start(&ctx).await {
        tracing::error!(address = %ctx.address, error = %e, "Actor failed to start");
        return Err(e);
    }
    tracing::debug!(address = %ctx.address, "Actor started");

    // first tick one full interval after start
    let mut tick_timer = spec.tick_interval.map(|interval| {
        let mut timer = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer
    });

    loop {
        tokio::select! {
            // Global shutdown signal
            _ = shutdown_rx.recv() => {
                tracing::debug!(address = %ctx.address, "Received global shutdown signal");
                break;
            }

            // Mailbox
            Some(envelope) = mailbox_rx.recv() => {
                let kind = envelope.kind.clone();
                if let Err(e) = actor.on_message(&ctx, envelope).await {
                    tracing::warn!(
                        address = %ctx.address,
                        kind = %kind,
                        error = %e,
                        "Error handling message"
                    );
                }
            }

            // Tick timer
            _ = async {
                if let Some(ref mut timer) = tick_timer {
                    timer.tick().await
                } else {
                    std::future::pending::<tokio::time::Instant>().await
                }
            } => {
                if let Err(e) = actor.on_tick(&ctx).await {
                    tracing::warn!(
                        address = %ctx.address,
                        error = %e,
                        "Error during tick"
                    );
                }
            }
        }
    }

    tracing::debug!(address = %ctx.address, "Actor stopping");

    match tokio::time::timeout(spec.shutdown_timeout, actor.on_stop(&ctx)).await {
        Ok(Ok(())) => {
            tracing::debug!(address = %ctx.address, "Actor stopped");
            Ok(())
        }
        Ok(Err(e)) => {
            tracing::error!(address = %ctx.address, error = %e, "Actor stop failed");
            Err(e)
        }
        Err(_) => {
            tracing::error!(address = %ctx.address, "Actor stop timed out");
            Err(ActorError::ShutdownTimeout)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
