//! Simulation bootstrap
//!
//! Builds the building from a seeded RNG, places occupants, spawns every
//! actor on one [`ActorSystem`] and collects the outcome once the run ends.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use egress_runtime::{ActorSystem, Envelope};

use crate::actors::{Coordinator, IncidentSource, Occupant, Responder, TravelSettings};
use crate::building::{Building, LockState, Room, RoomView};
use crate::config::SimulationConfig;
use crate::incident::{Incident, IncidentLog};
use crate::messages::{IncidentKind, IncidentPayload, Message, ResponderRole, address};
use crate::navigation::Navigator;
use crate::tracking::{ActorClass, ActorTracker, ActorView};
use crate::types::{Error, MobilityClass, Position, Result};

/// Everything a renderer needs for one picture of the run
#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    pub rooms: Vec<RoomView>,
    pub actors: Vec<ActorView>,
    pub locks: LockState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvacuatedOccupant {
    pub id: String,
    pub mobility: MobilityClass,
    pub evacuated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrandedOccupant {
    pub id: String,
    pub mobility: MobilityClass,
    pub position: Option<Position>,
}

/// Outcome of a run
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub seed: u64,
    pub evacuated: Vec<EvacuatedOccupant>,
    pub stranded: Vec<StrandedOccupant>,
    pub incidents: Vec<Incident>,
    pub locks: LockState,
}

impl SimulationReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

pub struct Simulation {
    config: SimulationConfig,
    seed: u64,
    building: Arc<Building>,
    rng: ChaCha8Rng,
    system: ActorSystem,
    incidents: IncidentLog,
    tracker: ActorTracker,
    placement: Option<Vec<(Position, MobilityClass)>>,
    primary: Option<IncidentKind>,
    incident_source: bool,
    occupants: Vec<String>,
    started: bool,
}

impl Simulation {
    /// Validate the config and generate the building
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let seed = config.building.seed.unwrap_or_else(rand::random);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let building = Building::generate(
            config.building.floors,
            config.building.rows,
            config.building.cols,
            &mut rng,
        )?;
        info!(
            seed,
            floors = building.floors(),
            rows = building.rows(),
            cols = building.cols(),
            "Building generated"
        );
        Ok(Self::assemble(config, building, seed, rng))
    }

    /// Run on a prepared building instead of a generated one
    pub fn with_building(config: SimulationConfig, building: Building) -> Result<Self> {
        config.validate()?;
        let seed = config.building.seed.unwrap_or_else(rand::random);
        let rng = ChaCha8Rng::seed_from_u64(seed);
        Ok(Self::assemble(config, building, seed, rng))
    }

    fn assemble(config: SimulationConfig, building: Building, seed: u64, rng: ChaCha8Rng) -> Self {
        Self {
            config,
            seed,
            building: Arc::new(building),
            rng,
            system: ActorSystem::new(),
            incidents: IncidentLog::new(),
            tracker: ActorTracker::new(),
            placement: None,
            primary: None,
            incident_source: true,
            occupants: Vec::new(),
            started: false,
        }
    }

    /// Place occupants at fixed rooms instead of random ones
    pub fn with_placement(mut self, placement: Vec<(Position, MobilityClass)>) -> Self {
        self.placement = Some(placement);
        self
    }

    /// Force the primary incident kind
    pub fn with_primary(mut self, kind: IncidentKind) -> Self {
        self.primary = Some(kind);
        self
    }

    /// Run without the incident source; alerts only come from [`Simulation::raise`]
    pub fn without_incident_source(mut self) -> Self {
        self.incident_source = false;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn building(&self) -> &Arc<Building> {
        &self.building
    }

    pub fn system(&self) -> &ActorSystem {
        &self.system
    }

    pub fn incidents(&self) -> &IncidentLog {
        &self.incidents
    }

    pub fn tracker(&self) -> &ActorTracker {
        &self.tracker
    }

    /// Spawn every actor
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }

        let placement = match self.placement.take() {
            Some(placement) => placement,
            None => self.random_placement()?,
        };
        let entrances = self.entrances()?;
        let settings = TravelSettings::from_config(&self.config);
        let navigator = Navigator::new(Arc::clone(&self.building));

        self.occupants = (0..placement.len()).map(address::occupant).collect();
        self.system.spawn(Coordinator::new(
            Arc::clone(&self.building),
            self.incidents.clone(),
            self.occupants.clone(),
            &self.config.timing,
        ))?;

        for (i, role) in ResponderRole::ALL.into_iter().enumerate() {
            let start = entrances[i % entrances.len()];
            self.system.spawn(Responder::new(
                role,
                start,
                navigator.clone(),
                &settings,
                self.config.timing.responder_work(),
                self.tracker.clone(),
            ))?;
        }

        for (id, (start, mobility)) in self.occupants.iter().zip(placement) {
            debug!(occupant = %id, %start, ?mobility, "Placing occupant");
            self.system.spawn(Occupant::new(
                id.clone(),
                start,
                mobility,
                navigator.clone(),
                &settings,
                self.tracker.clone(),
            ))?;
        }

        if self.incident_source {
            let mut source = IncidentSource::new(
                Arc::clone(&self.building),
                self.config.hazards.clone(),
                self.config.timing.incident_interval(),
                ChaCha8Rng::seed_from_u64(self.rng.next_u64()),
            );
            if let Some(kind) = self.primary {
                source = source.with_primary(kind);
            }
            self.system.spawn(source)?;
        }

        self.started = true;
        info!(
            occupants = self.occupants.len(),
            actors = self.system.len(),
            "Simulation started"
        );
        Ok(())
    }

    /// Distinct non-exit rooms, each occupant reduced-mobility with the
    /// configured probability
    fn random_placement(&mut self) -> Result<Vec<(Position, MobilityClass)>> {
        let wanted = self.config.population.occupants;
        let mut rooms: Vec<Position> = self
            .building
            .rooms()
            .filter(|room| !room.kind().is_exit())
            .map(Room::position)
            .collect();
        if rooms.len() < wanted {
            return Err(Error::Config(format!(
                "{wanted} occupants do not fit in {} rooms",
                rooms.len()
            )));
        }

        rooms.shuffle(&mut self.rng);
        let reduced = self.config.population.reduced_mobility_probability;
        Ok(rooms
            .into_iter()
            .take(wanted)
            .map(|pos| {
                let mobility = if self.rng.gen_bool(reduced) {
                    MobilityClass::Reduced
                } else {
                    MobilityClass::Normal
                };
                (pos, mobility)
            })
            .collect())
    }

    /// Ground-floor exits, where responders enter
    fn entrances(&self) -> Result<Vec<Position>> {
        let mut exits: Vec<Position> = self.building.exits().map(Room::position).collect();
        if exits.is_empty() {
            return Err(Error::Config("building has no exits".into()));
        }
        let ground = exits.iter().map(|pos| pos.floor).min().unwrap_or(0);
        exits.retain(|pos| pos.floor == ground);
        Ok(exits)
    }

    /// Send an emergency alert to the coordinator as if the incident source
    /// had raised it
    pub async fn raise(&self, payload: IncidentPayload) -> Result<()> {
        let envelope = Message::EmergencyAlert(payload)
            .to_envelope(address::INCIDENT_SOURCE, address::COORDINATOR)?;
        self.post(envelope).await
    }

    pub async fn post(&self, envelope: Envelope) -> Result<()> {
        self.system.post(envelope).await?;
        Ok(())
    }

    /// Every occupant is out and every reported incident is resolved
    pub fn is_settled(&self) -> bool {
        let occupants_out = self
            .tracker
            .views()
            .iter()
            .filter(|view| view.class == ActorClass::Occupant)
            .all(|view| view.evacuated_at.is_some());
        let incidents = self.incidents.snapshot();
        occupants_out && !incidents.is_empty() && incidents.iter().all(|i| !i.status.is_open())
    }

    /// Run until the configured duration passes, `shutdown` completes or the
    /// run settles, then stop every actor
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) -> Result<SimulationReport> {
        self.start()?;

        let deadline = tokio::time::sleep(self.config.timing.run_duration());
        tokio::pin!(deadline);
        tokio::pin!(shutdown);
        let mut check = tokio::time::interval(self.config.timing.tick());
        check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    info!("Run time elapsed");
                    break;
                }
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                _ = check.tick() => {
                    if self.is_settled() {
                        info!("All occupants out and every incident resolved");
                        break;
                    }
                }
            }
        }

        self.shutdown().await?;
        Ok(self.report())
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.system.shutdown_all().await?;
        Ok(())
    }

    pub fn frame(&self) -> Frame {
        Frame {
            rooms: self.building.room_views(),
            actors: self.tracker.views(),
            locks: self.building.lock_state(),
        }
    }

    pub fn report(&self) -> SimulationReport {
        let mut evacuated = Vec::new();
        let mut stranded = Vec::new();
        for view in self.tracker.views() {
            if view.class != ActorClass::Occupant {
                continue;
            }
            match view.evacuated_at {
                Some(evacuated_at) => evacuated.push(EvacuatedOccupant {
                    id: view.id,
                    mobility: view.mobility,
                    evacuated_at,
                }),
                None => stranded.push(StrandedOccupant {
                    id: view.id,
                    mobility: view.mobility,
                    position: view.position,
                }),
            }
        }
        evacuated.sort_by_key(|o| o.evacuated_at);

        SimulationReport {
            seed: self.seed,
            evacuated,
            stranded,
            incidents: self.incidents.snapshot(),
            locks: self.building.lock_state(),
        }
    }
}
