//! Emergency responder
//!
//! Takes Dispatch messages for its own role, one job at a time. A located
//! job means walking to the room, clearing its hazards and reporting back.
//! A job without a room is worked in place for a fixed time.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use egress_runtime::{Actor, ActorContext, ActorResult, ActorSpec, Envelope};

use crate::building::Building;
use crate::messages::{IncidentPayload, Message, ResponderRole, address, post};
use crate::navigation::{ElevatorAccess, Goal, Navigator};
use crate::tracking::{ActorClass, ActorTracker};
use crate::types::{MobilityClass, Position};

use super::{TravelEvent, TravelSettings, Traveller};

/// Failed route attempts before a job yields to the rest of the queue
const MAX_BLOCKED_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Job {
    Travelling(IncidentPayload),
    Working {
        payload: IncidentPayload,
        until: Instant,
    },
}

impl Job {
    fn payload(&self) -> &IncidentPayload {
        match self {
            Job::Travelling(payload) | Job::Working { payload, .. } => payload,
        }
    }
}

pub struct Responder {
    role: ResponderRole,
    building: Arc<Building>,
    tracker: ActorTracker,
    traveller: Traveller,
    job: Option<Job>,
    queue: VecDeque<IncidentPayload>,
    tick: Duration,
    elevator_reply_timeout: Duration,
    work: Duration,
}

impl Responder {
    pub fn new(
        role: ResponderRole,
        start: Position,
        navigator: Navigator,
        settings: &TravelSettings,
        work: Duration,
        tracker: ActorTracker,
    ) -> Self {
        tracker.register(
            role.address(),
            ActorClass::Responder(role),
            MobilityClass::Normal,
            start,
        );
        Self {
            role,
            building: Arc::clone(navigator.building()),
            tracker,
            traveller: settings.traveller(navigator, start, MobilityClass::Normal, true),
            job: None,
            queue: VecDeque::new(),
            tick: settings.tick,
            elevator_reply_timeout: settings.elevator_reply_timeout,
            work,
        }
    }

    pub fn role(&self) -> ResponderRole {
        self.role
    }

    pub fn address(&self) -> &'static str {
        self.role.address()
    }

    pub fn pending(&self) -> usize {
        self.queue.len() + usize::from(self.job.is_some())
    }

    async fn on_dispatch(&mut self, ctx: &ActorContext, payload: IncidentPayload) {
        if !self.role.handles(payload.incident) {
            warn!(
                address = self.address(),
                kind = %payload.incident,
                "Dispatch for another role, dropping"
            );
            return;
        }
        let assigned = self.job.as_ref().map(Job::payload) == Some(&payload)
            || self.queue.contains(&payload);
        if assigned {
            debug!(address = self.address(), kind = %payload.incident, "Already assigned");
            return;
        }

        self.queue.push_back(payload);
        if self.job.is_none() {
            self.next_job(ctx).await;
        }
    }

    async fn next_job(&mut self, ctx: &ActorContext) {
        while self.job.is_none() {
            let Some(payload) = self.queue.pop_front() else {
                return;
            };
            self.begin(ctx, payload).await;
        }
    }

    async fn begin(&mut self, ctx: &ActorContext, payload: IncidentPayload) {
        let now = Instant::now();
        let Some(target) = payload.location else {
            info!(address = self.address(), kind = %payload.incident, "Working on site");
            self.job = Some(Job::Working {
                payload,
                until: now + self.work,
            });
            return;
        };
        if self.building.room(target).is_none() {
            warn!(address = self.address(), %target, "Dispatch names no room, dropping");
            return;
        }

        info!(
            address = self.address(),
            kind = %payload.incident,
            %target,
            from = %self.traveller.position(),
            "Heading to incident"
        );
        self.job = Some(Job::Travelling(payload));
        let goal = Goal::Room(target);
        self.traveller.reset();

        if self.traveller.needs_floor_change(goal) {
            match post(ctx, address::COORDINATOR, &Message::ElevatorRequest).await {
                Ok(()) => {
                    self.traveller
                        .await_elevator(goal, now + self.elevator_reply_timeout);
                    return;
                }
                Err(e) => {
                    debug!(address = self.address(), error = %e, "Elevator request failed, using stairs");
                }
            }
        }
        let event = self.traveller.start(goal, ElevatorAccess::Avoid, now);
        self.handle(ctx, event).await;
    }

    async fn handle(&mut self, ctx: &ActorContext, event: Option<TravelEvent>) {
        match event {
            Some(TravelEvent::Moved { to, edge, .. }) => {
                self.tracker.record_move(self.address(), to, edge);
            }
            Some(TravelEvent::Replanned) => {
                debug!(address = self.address(), "Route changed");
            }
            Some(TravelEvent::Blocked { attempts }) => {
                if attempts == 1 {
                    warn!(
                        address = self.address(),
                        position = %self.traveller.position(),
                        "No route to incident, retrying"
                    );
                } else {
                    debug!(address = self.address(), attempts, "Still blocked");
                }
                if attempts >= MAX_BLOCKED_ATTEMPTS && !self.queue.is_empty() {
                    self.yield_job();
                }
            }
            Some(TravelEvent::Arrived(_)) => {
                if let Some(job) = self.job.take() {
                    self.finish(ctx, *job.payload()).await;
                }
            }
            None => {}
        }
    }

    /// Move an unreachable job behind the queued ones; the next tick starts
    /// the job at the front
    fn yield_job(&mut self) {
        if let Some(job) = self.job.take() {
            let payload = *job.payload();
            warn!(
                address = self.address(),
                kind = %payload.incident,
                location = ?payload.location,
                queued = self.queue.len(),
                "Incident unreachable, serving queued jobs first"
            );
            self.queue.push_back(payload);
        }
        self.traveller.reset();
    }

    /// Clear the hazard and report to the coordinator; the next job starts
    /// from `next_job` or the following tick
    async fn finish(&mut self, ctx: &ActorContext, payload: IncidentPayload) {
        self.job = None;
        if let Some(room) = payload.location {
            self.building.clear_hazards(room);
        }
        info!(
            address = self.address(),
            kind = %payload.incident,
            location = ?payload.location,
            "Incident cleared"
        );
        if let Err(e) = post(ctx, address::COORDINATOR, &Message::ResolutionReport(payload)).await
        {
            warn!(address = self.address(), error = %e, "Failed to report resolution");
        }
    }
}

#[async_trait]
impl Actor for Responder {
    fn spec(&self) -> ActorSpec {
        ActorSpec::new(self.address())
            .with_tick_interval(self.tick)
            .with_description(format!("Responder ({:?})", self.role))
    }

    async fn on_message(&mut self, ctx: &ActorContext, envelope: Envelope) -> ActorResult<()> {
        let message = match Message::decode(&envelope) {
            Ok(message) => message,
            Err(e) => {
                warn!(address = self.address(), from = %envelope.from, error = %e, "Dropping message");
                return Ok(());
            }
        };

        match message {
            Message::Dispatch(payload) => self.on_dispatch(ctx, payload).await,
            Message::ElevatorStatus { unlocked } => {
                if matches!(self.job, Some(Job::Travelling(_))) {
                    let event = self.traveller.elevator_reply(unlocked, Instant::now());
                    self.handle(ctx, event).await;
                }
            }
            other => debug!(address = self.address(), kind = other.kind(), "Unexpected message"),
        }
        Ok(())
    }

    async fn on_tick(&mut self, ctx: &ActorContext) -> ActorResult<()> {
        let now = Instant::now();
        match self.job {
            Some(Job::Working { payload, until }) if now >= until => {
                self.finish(ctx, payload).await;
            }
            Some(Job::Travelling(_)) => {
                let event = self.traveller.advance(now);
                self.handle(ctx, event).await;
            }
            Some(Job::Working { .. }) => {}
            None => self.next_job(ctx).await,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egress_runtime::ActorSystem;

    use crate::actors::testing::listen;
    use crate::building::{Connectors, StairPosition};
    use crate::messages::IncidentKind;

    fn settings() -> TravelSettings {
        let mut settings = TravelSettings::default();
        settings.tick = Duration::from_millis(20);
        settings.elevator_reply_timeout = Duration::from_millis(200);
        settings.evacuation_retry = Duration::from_millis(300);
        settings
    }

    fn dispatch(to: &str, kind: IncidentKind, location: Option<Position>) -> Envelope {
        Message::Dispatch(IncidentPayload::new(kind, location))
            .to_envelope(address::COORDINATOR, to)
            .unwrap()
    }

    fn responder(role: ResponderRole, building: &Arc<Building>, tracker: &ActorTracker) -> Responder {
        Responder::new(
            role,
            Position::new(0, 0, 0),
            Navigator::new(Arc::clone(building)),
            &settings(),
            Duration::from_secs(2),
            tracker.clone(),
        )
    }

    fn floor() -> Arc<Building> {
        Arc::new(Building::from_text(&[&["NHHH", "HHHH"]], Connectors::default()).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_clears_fire_and_reports() {
        let building = floor();
        let target = Position::new(0, 1, 3);
        building.ignite(target);
        let tracker = ActorTracker::new();

        let system = ActorSystem::new();
        let bms = listen(&system, address::COORDINATOR);
        system
            .spawn(responder(ResponderRole::Fireman, &building, &tracker))
            .unwrap();

        system
            .post(dispatch(address::FIREMAN, IncidentKind::Fire, Some(target)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(!building.room(target).unwrap().is_on_fire());
        assert_eq!(
            bms.messages(),
            vec![Message::ResolutionReport(IncidentPayload::new(
                IncidentKind::Fire,
                Some(target)
            ))]
        );
        assert_eq!(tracker.get(address::FIREMAN).unwrap().position, Some(target));
        // responders are not building occupants
        assert!(!building.room(target).unwrap().is_occupied());

        system.shutdown_all().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_works_in_place_without_location() {
        let building = floor();
        let tracker = ActorTracker::new();

        let system = ActorSystem::new();
        let bms = listen(&system, address::COORDINATOR);
        system
            .spawn(responder(ResponderRole::ItResponder, &building, &tracker))
            .unwrap();

        system
            .post(dispatch(address::IT_RESPONDER, IncidentKind::CyberAttack, None))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(bms.messages().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(
            bms.messages(),
            vec![Message::ResolutionReport(IncidentPayload::new(
                IncidentKind::CyberAttack,
                None
            ))]
        );
        assert_eq!(
            tracker.get(address::IT_RESPONDER).unwrap().position,
            Some(Position::new(0, 0, 0))
        );

        system.shutdown_all().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_drops_dispatch_for_other_role() {
        let building = floor();
        let tracker = ActorTracker::new();

        let system = ActorSystem::new();
        let bms = listen(&system, address::COORDINATOR);
        system
            .spawn(responder(ResponderRole::Cop, &building, &tracker))
            .unwrap();

        system
            .post(dispatch(address::COP, IncidentKind::Fire, Some(Position::new(0, 1, 1))))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(bms.messages().is_empty());
        assert_eq!(
            tracker.get(address::COP).unwrap().position,
            Some(Position::new(0, 0, 0))
        );

        system.shutdown_all().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_queues_jobs_in_order_without_duplicates() {
        let building = floor();
        let first = Position::new(0, 0, 3);
        let second = Position::new(0, 1, 0);
        building.ignite(first);
        building.ignite(second);
        let tracker = ActorTracker::new();

        let system = ActorSystem::new();
        let bms = listen(&system, address::COORDINATOR);
        system
            .spawn(responder(ResponderRole::Fireman, &building, &tracker))
            .unwrap();

        for location in [first, second, first] {
            system
                .post(dispatch(address::FIREMAN, IncidentKind::Fire, Some(location)))
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(
            bms.messages(),
            vec![
                Message::ResolutionReport(IncidentPayload::new(IncidentKind::Fire, Some(first))),
                Message::ResolutionReport(IncidentPayload::new(IncidentKind::Fire, Some(second))),
            ]
        );
        assert!(building.rooms().all(|room| !room.is_on_fire()));

        system.shutdown_all().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_job_does_not_starve_queue() {
        let building = floor();
        let walled_in = Position::new(0, 1, 3);
        let reachable = Position::new(0, 0, 1);
        building.ignite(walled_in);
        building.ignite(reachable);
        building.mark_unavailable(Position::new(0, 0, 3));
        building.mark_unavailable(Position::new(0, 1, 2));
        let tracker = ActorTracker::new();

        let system = ActorSystem::new();
        let bms = listen(&system, address::COORDINATOR);
        system
            .spawn(responder(ResponderRole::Fireman, &building, &tracker))
            .unwrap();

        for location in [walled_in, reachable] {
            system
                .post(dispatch(address::FIREMAN, IncidentKind::Fire, Some(location)))
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(
            bms.messages(),
            vec![Message::ResolutionReport(IncidentPayload::new(
                IncidentKind::Fire,
                Some(reachable)
            ))]
        );
        assert!(!building.room(reachable).unwrap().is_on_fire());
        assert!(building.room(walled_in).unwrap().is_on_fire());

        system.shutdown_all().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_climbs_to_upper_floor_incident() {
        let building = Arc::new(
            Building::from_text(
                &[&["NHH"], &["HHH"]],
                Connectors {
                    elevator: Some((0, 2)),
                    emergency_stair: None,
                    stairs: vec![StairPosition {
                        lower_floor: 0,
                        row: 0,
                        col: 1,
                    }],
                },
            )
            .unwrap(),
        );
        let target = Position::new(1, 0, 0);
        building.ignite(target);
        let tracker = ActorTracker::new();

        let system = ActorSystem::new();
        let bms = listen(&system, address::COORDINATOR);
        system
            .spawn(responder(ResponderRole::Fireman, &building, &tracker))
            .unwrap();

        system
            .post(dispatch(address::FIREMAN, IncidentKind::Fire, Some(target)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        // the listener never answers the elevator request, so the stairs are used
        assert_eq!(bms.count(Message::ELEVATOR_REQUEST), 1);
        assert_eq!(bms.count(Message::RESOLUTION_REPORT), 1);
        assert!(!building.room(target).unwrap().is_on_fire());

        system.shutdown_all().await.unwrap();
    }
}
