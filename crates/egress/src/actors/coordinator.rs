//! Building management coordinator
//!
//! Receives emergency alerts, applies the lockdown policy, orders occupants
//! out, dispatches the matching responder and tracks each incident until a
//! resolution report arrives. Dispatches that go unanswered for too long
//! are re-sent a bounded number of times.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use egress_runtime::{Actor, ActorContext, ActorResult, ActorSpec, Envelope};

use crate::building::{Building, LockTarget};
use crate::config::TimingConfig;
use crate::incident::{IncidentLog, IncidentStatus};
use crate::messages::{IncidentKind, IncidentPayload, Message, address, post};

pub struct Coordinator {
    building: Arc<Building>,
    incidents: IncidentLog,
    occupants: Vec<String>,
    tick: Duration,
    dispatch_timeout: Duration,
    max_redispatch: u32,
    /// A cyber attack was reported; locks are no longer lifted automatically
    systems_compromised: bool,
    /// Elevators were locked by this coordinator because of a fire
    fire_elevator_lock: bool,
}

impl Coordinator {
    pub fn new(
        building: Arc<Building>,
        incidents: IncidentLog,
        occupants: Vec<String>,
        timing: &TimingConfig,
    ) -> Self {
        Self {
            building,
            incidents,
            occupants,
            tick: timing.tick(),
            dispatch_timeout: timing.dispatch_timeout(),
            max_redispatch: timing.max_redispatch,
            systems_compromised: false,
            fire_elevator_lock: false,
        }
    }

    async fn on_alert(&mut self, ctx: &ActorContext, payload: IncidentPayload) {
        let id = self.incidents.open(payload.incident, payload.location);
        warn!(
            incident = %id,
            kind = %payload.incident,
            location = ?payload.location,
            "Emergency reported"
        );

        self.apply_lockdown(payload.incident);

        let order = Message::EvacuationOrder(payload);
        for occupant in &self.occupants {
            if let Err(e) = post(ctx, occupant, &order).await {
                debug!(occupant = %occupant, error = %e, "Evacuation order not delivered");
            }
        }

        self.dispatch(ctx, id, payload).await;
    }

    fn apply_lockdown(&mut self, kind: IncidentKind) {
        let locks = self.building.locks();

        if kind == IncidentKind::CyberAttack {
            self.systems_compromised = true;
        }

        if matches!(kind, IncidentKind::Fire | IncidentKind::CyberAttack) {
            let was_locked = locks.set(LockTarget::Elevators, true);
            if !was_locked {
                info!(kind = %kind, "Elevators locked");
                if kind == IncidentKind::Fire {
                    self.fire_elevator_lock = true;
                }
            }
        }

        // egress wins over a compromised door system
        if kind != IncidentKind::GasLeak && locks.set(LockTarget::Doors, false) {
            info!(kind = %kind, "Emergency doors unlocked");
        }
    }

    async fn dispatch(&self, ctx: &ActorContext, id: Uuid, payload: IncidentPayload) {
        let responder = payload.incident.responder().address();
        if !ctx.is_reachable(responder) {
            warn!(
                incident = %id,
                responder = %responder,
                "No responder available, incident stays active"
            );
            return;
        }

        if let Err(e) = post(ctx, responder, &Message::Dispatch(payload)).await {
            warn!(incident = %id, responder = %responder, error = %e, "Dispatch failed");
            return;
        }

        match self
            .incidents
            .update(id, |incident| incident.record_dispatch(Instant::now()))
        {
            Ok(()) => info!(incident = %id, responder = %responder, "Responder dispatched"),
            Err(e) => warn!(incident = %id, error = %e, "Could not record dispatch"),
        }
    }

    fn on_resolution(&mut self, payload: IncidentPayload) {
        // a located report only ever closes the incident at that location
        let found = match payload.location {
            Some(_) => self.incidents.find_open(payload.incident, payload.location),
            None => self
                .incidents
                .find_open(payload.incident, None)
                .or_else(|| self.incidents.find_open_kind(payload.incident)),
        };
        let Some(id) = found else {
            debug!(
                kind = %payload.incident,
                location = ?payload.location,
                "Resolution for an incident that is not open"
            );
            return;
        };

        if let Err(e) = self
            .incidents
            .update(id, |incident| incident.advance(IncidentStatus::Resolved))
        {
            warn!(incident = %id, error = %e, "Could not resolve incident");
            return;
        }
        info!(incident = %id, kind = %payload.incident, "Incident resolved");

        if !self.incidents.any_open(payload.incident) {
            self.lift_lockdown(payload.incident);
        }
    }

    fn lift_lockdown(&mut self, kind: IncidentKind) {
        if kind != IncidentKind::Fire || !self.fire_elevator_lock {
            return;
        }
        if self.systems_compromised || self.building.locks().is_compromised() {
            debug!("Systems compromised, elevator lock stays until systems are restored");
            return;
        }
        self.building.locks().set(LockTarget::Elevators, false);
        self.fire_elevator_lock = false;
        info!("Elevators unlocked");
    }

    async fn redispatch_overdue(&self, ctx: &ActorContext) {
        let now = Instant::now();
        let overdue: Vec<_> = self
            .incidents
            .snapshot()
            .into_iter()
            .filter(|incident| incident.dispatch_overdue(now, self.dispatch_timeout))
            .collect();

        for incident in overdue {
            if incident.dispatch_attempts > self.max_redispatch {
                error!(
                    incident = %incident.id,
                    kind = %incident.kind,
                    attempts = incident.dispatch_attempts,
                    "Incident stalled, no more re-dispatches"
                );
                let _ = self.incidents.update(incident.id, |incident| {
                    incident.stalled = true;
                    Ok(())
                });
                continue;
            }

            info!(
                incident = %incident.id,
                attempt = incident.dispatch_attempts + 1,
                "Re-dispatching responder"
            );
            let payload = IncidentPayload::new(incident.kind, incident.location);
            self.dispatch(ctx, incident.id, payload).await;
        }
    }
}

#[async_trait]
impl Actor for Coordinator {
    fn spec(&self) -> ActorSpec {
        ActorSpec::new(address::COORDINATOR)
            .with_tick_interval(self.tick)
            .with_description("Building management coordinator")
    }

    async fn on_start(&mut self, _ctx: &ActorContext) -> ActorResult<()> {
        info!(occupants = self.occupants.len(), "Coordinator online");
        Ok(())
    }

    async fn on_message(&mut self, ctx: &ActorContext, envelope: Envelope) -> ActorResult<()> {
        let message = match Message::decode(&envelope) {
            Ok(message) => message,
            Err(e) => {
                warn!(from = %envelope.from, error = %e, "Dropping message");
                return Ok(());
            }
        };

        match message {
            Message::EmergencyAlert(payload) => self.on_alert(ctx, payload).await,
            Message::ElevatorRequest => {
                let unlocked = !self.building.locks().elevators_locked();
                debug!(from = %envelope.from, unlocked, "Elevator status requested");
                post(ctx, &envelope.from, &Message::ElevatorStatus { unlocked }).await?;
            }
            Message::ResolutionReport(payload) => self.on_resolution(payload),
            other => debug!(from = %envelope.from, kind = other.kind(), "Unexpected message"),
        }
        Ok(())
    }

    async fn on_tick(&mut self, ctx: &ActorContext) -> ActorResult<()> {
        self.redispatch_overdue(ctx).await;
        Ok(())
    }
}
