//! Incident source
//!
//! Starts one primary emergency on its first tick, applies the physical
//! effect to the building and alerts the coordinator. On every later tick a
//! single roll may escalate things: a new fire, a system lock or an
//! aftershock.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use egress_runtime::{Actor, ActorContext, ActorResult, ActorSpec, Envelope};

use crate::building::{Building, LockTarget};
use crate::config::HazardConfig;
use crate::messages::{IncidentKind, IncidentPayload, Message, address, post};
use crate::types::Position;

pub struct IncidentSource {
    building: Arc<Building>,
    rng: ChaCha8Rng,
    hazards: HazardConfig,
    interval: Duration,
    forced: Option<IncidentKind>,
    primary: Option<IncidentKind>,
}

impl IncidentSource {
    pub fn new(
        building: Arc<Building>,
        hazards: HazardConfig,
        interval: Duration,
        rng: ChaCha8Rng,
    ) -> Self {
        Self {
            building,
            rng,
            hazards,
            interval,
            forced: None,
            primary: None,
        }
    }

    /// Always start with `kind` instead of sampling one
    pub fn with_primary(mut self, kind: IncidentKind) -> Self {
        self.forced = Some(kind);
        self
    }

    /// The primary incident, once started
    pub fn primary(&self) -> Option<IncidentKind> {
        self.primary
    }

    fn sample_kind(&mut self) -> IncidentKind {
        IncidentKind::ALL
            .choose_weighted(&mut self.rng, |kind| kind.weight())
            .copied()
            .unwrap_or(IncidentKind::Fire)
    }

    /// Start the primary incident and return the alert to send
    pub fn start_primary(&mut self) -> IncidentPayload {
        let kind = match self.forced {
            Some(kind) => kind,
            None => self.sample_kind(),
        };
        self.primary = Some(kind);

        let location = match kind {
            IncidentKind::Fire => self.start_fire(),
            IncidentKind::Earthquake => self.earthquake(),
            IncidentKind::SecurityThreat => self.damage_random_room(),
            IncidentKind::CyberAttack => {
                self.cyber_attack();
                None
            }
            IncidentKind::GasLeak => None,
        };
        info!(kind = %kind, location = ?location, "Incident started");
        IncidentPayload::new(kind, location)
    }

    /// One escalation roll; returns an alert when the outcome needs one
    pub fn escalate(&mut self) -> Option<IncidentPayload> {
        let fire = self.hazards.escalation_fire_probability;
        let lock = fire + self.hazards.escalation_lock_probability;
        let aftershock = lock + self.hazards.escalation_aftershock_probability;

        let roll: f64 = self.rng.gen_range(0.0..1.0);
        if roll < fire {
            let location = self.start_fire()?;
            info!(%location, "Fire broke out");
            Some(IncidentPayload::new(IncidentKind::Fire, Some(location)))
        } else if roll < lock {
            if let Some(&target) = LockTarget::ALL.choose(&mut self.rng) {
                self.building.locks().compromise(target);
                info!(?target, "System locked");
            }
            None
        } else if roll < aftershock {
            let location = self.damage_random_room()?;
            info!(%location, "Aftershock");
            Some(IncidentPayload::new(IncidentKind::Earthquake, Some(location)))
        } else {
            None
        }
    }

    fn random_free_room(&mut self) -> Option<Position> {
        let building = Arc::clone(&self.building);
        let candidates: Vec<Position> = building
            .unoccupied_rooms()
            .into_iter()
            .filter(|&pos| building.room(pos).is_some_and(|room| room.is_safe()))
            .collect();
        candidates.choose(&mut self.rng).copied()
    }

    /// Ignite a free room and let the fire jump each adjacency with the
    /// configured probability
    fn start_fire(&mut self) -> Option<Position> {
        let origin = self.random_free_room()?;
        let building = Arc::clone(&self.building);
        let spread = self.hazards.fire_spread_probability;

        let mut burning = HashSet::from([origin]);
        let mut frontier = vec![origin];
        building.ignite(origin);
        while let Some(pos) = frontier.pop() {
            let Some(room) = building.room(pos) else {
                continue;
            };
            for &next in room.adjacent() {
                if !burning.contains(&next) && self.rng.gen_bool(spread) {
                    building.ignite(next);
                    burning.insert(next);
                    frontier.push(next);
                }
            }
        }
        debug!(%origin, rooms = burning.len(), "Fire spread");
        Some(origin)
    }

    /// Damage rooms at random; the alert names one damaged room nobody is in
    fn earthquake(&mut self) -> Option<Position> {
        let building = Arc::clone(&self.building);
        let damage = self.hazards.earthquake_damage_probability;

        let mut named = Vec::new();
        for room in building.rooms() {
            if self.rng.gen_bool(damage) {
                room.set_unavailable(true);
                if !room.is_occupied() {
                    named.push(room.position());
                }
            }
        }
        debug!(damaged_unoccupied = named.len(), "Earthquake damage");
        named.choose(&mut self.rng).copied()
    }

    fn damage_random_room(&mut self) -> Option<Position> {
        let pos = self.random_free_room()?;
        self.building.mark_unavailable(pos);
        Some(pos)
    }

    fn cyber_attack(&mut self) {
        let count = self.rng.gen_range(1..=LockTarget::ALL.len());
        for &target in LockTarget::ALL.choose_multiple(&mut self.rng, count) {
            self.building.locks().compromise(target);
            info!(?target, "System compromised");
        }
    }

    async fn alert(&self, ctx: &ActorContext, payload: IncidentPayload) {
        if let Err(e) = post(ctx, address::COORDINATOR, &Message::EmergencyAlert(payload)).await {
            warn!(kind = %payload.incident, error = %e, "Failed to raise alert");
        }
    }
}

#[async_trait]
impl Actor for IncidentSource {
    fn spec(&self) -> ActorSpec {
        ActorSpec::new(address::INCIDENT_SOURCE)
            .with_tick_interval(self.interval)
            .with_description("Incident source")
    }

    async fn on_message(&mut self, _ctx: &ActorContext, envelope: Envelope) -> ActorResult<()> {
        debug!(from = %envelope.from, kind = %envelope.kind, "Incident source ignores messages");
        Ok(())
    }

    async fn on_tick(&mut self, ctx: &ActorContext) -> ActorResult<()> {
        let alert = if self.primary.is_none() {
            Some(self.start_primary())
        } else {
            self.escalate()
        };
        if let Some(payload) = alert {
            self.alert(ctx, payload).await;
        }
        Ok(())
    }
}
