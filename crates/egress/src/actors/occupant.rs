//! Building occupant
//!
//! Waits for an evacuation order, then heads for the nearest exit. A route
//! that needs another floor starts with an elevator request to the
//! coordinator; without a positive answer the occupant takes the stairs.
//! Once outside it stops reacting to anything.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use egress_runtime::{Actor, ActorContext, ActorResult, ActorSpec, Envelope};

use crate::building::Building;
use crate::messages::{IncidentPayload, Message, address, post};
use crate::navigation::{ElevatorAccess, Goal, Navigator};
use crate::tracking::{ActorClass, ActorTracker};
use crate::types::{MobilityClass, Position};

use super::{TravelEvent, TravelSettings, Traveller};

pub struct Occupant {
    address: String,
    building: Arc<Building>,
    tracker: ActorTracker,
    traveller: Traveller,
    tick: Duration,
    elevator_reply_timeout: Duration,
    evacuated_at: Option<DateTime<Utc>>,
}

impl Occupant {
    /// Create an occupant standing in `start`, counted in that room right away
    pub fn new(
        address: impl Into<String>,
        start: Position,
        mobility: MobilityClass,
        navigator: Navigator,
        settings: &TravelSettings,
        tracker: ActorTracker,
    ) -> Self {
        let address = address.into();
        let building = Arc::clone(navigator.building());
        building.move_occupant(None, Some(start));
        tracker.register(&address, ActorClass::Occupant, mobility, start);

        Self {
            address,
            building,
            tracker,
            traveller: settings.traveller(navigator, start, mobility, false),
            tick: settings.tick,
            elevator_reply_timeout: settings.elevator_reply_timeout,
            evacuated_at: None,
        }
    }

    pub fn evacuated_at(&self) -> Option<DateTime<Utc>> {
        self.evacuated_at
    }

    async fn on_evacuation_order(&mut self, ctx: &ActorContext, payload: IncidentPayload) {
        if !self.traveller.is_idle() {
            debug!(address = %self.address, "Already evacuating");
            return;
        }
        info!(
            address = %self.address,
            kind = %payload.incident,
            position = %self.traveller.position(),
            "Evacuation order received"
        );

        let now = Instant::now();
        let goal = Goal::NearestExit;
        if self.traveller.needs_floor_change(goal) {
            match post(ctx, address::COORDINATOR, &Message::ElevatorRequest).await {
                Ok(()) => {
                    self.traveller
                        .await_elevator(goal, now + self.elevator_reply_timeout);
                    return;
                }
                Err(e) => {
                    debug!(address = %self.address, error = %e, "Elevator request failed, using stairs");
                }
            }
        }
        let event = self.traveller.start(goal, ElevatorAccess::Avoid, now);
        self.handle(event);
    }

    fn handle(&mut self, event: Option<TravelEvent>) {
        match event {
            Some(TravelEvent::Moved { from, to, edge }) => {
                self.building.move_occupant(Some(from), Some(to));
                self.tracker.record_move(&self.address, to, edge);
                debug!(address = %self.address, %from, %to, ?edge, "Moved");
            }
            Some(TravelEvent::Replanned) => {
                debug!(address = %self.address, "Route changed");
            }
            Some(TravelEvent::Blocked { attempts }) => {
                if attempts == 1 {
                    warn!(
                        address = %self.address,
                        position = %self.traveller.position(),
                        "No safe route to an exit, waiting for the path to clear"
                    );
                } else {
                    debug!(address = %self.address, attempts, "Still blocked");
                }
            }
            Some(TravelEvent::Arrived(exit)) => self.leave_building(exit),
            None => {}
        }
    }

    fn leave_building(&mut self, exit: Position) {
        let at = Utc::now();
        self.building.move_occupant(Some(exit), None);
        self.tracker.mark_evacuated(&self.address, at);
        self.evacuated_at = Some(at);
        info!(address = %self.address, %exit, "Occupant evacuated");
    }
}

#[async_trait]
impl Actor for Occupant {
    fn spec(&self) -> ActorSpec {
        ActorSpec::new(&self.address)
            .with_tick_interval(self.tick)
            .with_description("Building occupant")
    }

    async fn on_message(&mut self, ctx: &ActorContext, envelope: Envelope) -> ActorResult<()> {
        if self.evacuated_at.is_some() {
            return Ok(());
        }
        let message = match Message::decode(&envelope) {
            Ok(message) => message,
            Err(e) => {
                warn!(address = %self.address, from = %envelope.from, error = %e, "Dropping message");
                return Ok(());
            }
        };

        match message {
            Message::EvacuationOrder(payload) => self.on_evacuation_order(ctx, payload).await,
            Message::ElevatorStatus { unlocked } => {
                debug!(address = %self.address, unlocked, "Elevator status received");
                let event = self.traveller.elevator_reply(unlocked, Instant::now());
                self.handle(event);
            }
            other => debug!(address = %self.address, kind = other.kind(), "Unexpected message"),
        }
        Ok(())
    }

    async fn on_tick(&mut self, _ctx: &ActorContext) -> ActorResult<()> {
        if self.evacuated_at.is_none() {
            let event = self.traveller.advance(Instant::now());
            self.handle(event);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egress_runtime::ActorSystem;

    use crate::actors::testing::{answer, listen};
    use crate::building::{Connectors, StairPosition};
    use crate::messages::IncidentKind;
    use crate::navigation::EdgeKind;
    use crate::tracking::ActorView;

    fn settings() -> TravelSettings {
        let mut settings = TravelSettings::default();
        settings.tick = Duration::from_millis(20);
        settings.elevator_reply_timeout = Duration::from_millis(200);
        settings.evacuation_retry = Duration::from_millis(300);
        settings
    }

    fn order(from: &str, to: &str) -> Envelope {
        Message::EvacuationOrder(IncidentPayload::new(IncidentKind::Fire, None))
            .to_envelope(from, to)
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_evacuates_on_order() {
        let building =
            Arc::new(Building::from_text(&[&["HHHHN"]], Connectors::default()).unwrap());
        let tracker = ActorTracker::new();
        let start = Position::new(0, 0, 0);
        let occupant = Occupant::new(
            "occupant0",
            start,
            MobilityClass::Normal,
            Navigator::new(Arc::clone(&building)),
            &settings(),
            tracker.clone(),
        );
        assert!(building.room(start).unwrap().is_occupied());

        let system = ActorSystem::new();
        system.spawn(occupant).unwrap();

        // nothing happens without an order
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(tracker.get("occupant0").unwrap().position, Some(start));

        system.post(order("bms", "occupant0")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        let view = tracker.get("occupant0").unwrap();
        assert!(view.evacuated_at.is_some());
        assert_eq!(view.position, None);
        assert!(building.rooms().all(|room| !room.is_occupied()));

        system.shutdown_all().await.unwrap();
    }

    fn two_floors_with_elevator() -> Arc<Building> {
        Arc::new(
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
        )
    }

    /// Evacuate a reduced-mobility occupant from the elevator room upstairs
    /// while the coordinator answers with `unlocked`
    async fn evacuate_with_reply(unlocked: bool) -> ActorView {
        let building = two_floors_with_elevator();
        let tracker = ActorTracker::new();
        let mut settings = settings();
        // only a real answer gets the occupant moving in time
        settings.elevator_reply_timeout = Duration::from_secs(60);
        let occupant = Occupant::new(
            "occupant0",
            Position::new(1, 0, 2),
            MobilityClass::Reduced,
            Navigator::new(Arc::clone(&building)),
            &settings,
            tracker.clone(),
        );

        let system = ActorSystem::new();
        let bms = answer(&system, address::COORDINATOR, Message::ElevatorStatus { unlocked });
        system.spawn(occupant).unwrap();

        system.post(order("bms", "occupant0")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(bms.messages(), vec![Message::ElevatorRequest]);

        system.shutdown_all().await.unwrap();
        tracker.get("occupant0").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_locked_elevator_reply_sends_occupant_to_stairs() {
        let view = evacuate_with_reply(false).await;
        assert!(view.evacuated_at.is_some());
        assert_eq!(view.transits, vec![EdgeKind::Stair]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlocked_elevator_reply_is_used() {
        let view = evacuate_with_reply(true).await;
        assert!(view.evacuated_at.is_some());
        assert_eq!(view.transits, vec![EdgeKind::Elevator]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_asks_for_elevator_before_changing_floors() {
        let building = two_floors_with_elevator();
        let tracker = ActorTracker::new();
        let occupant = Occupant::new(
            "occupant0",
            Position::new(1, 0, 2),
            MobilityClass::Reduced,
            Navigator::new(Arc::clone(&building)),
            &settings(),
            tracker.clone(),
        );

        let system = ActorSystem::new();
        // the listener never answers, so the request times out
        let bms = listen(&system, address::COORDINATOR);
        system.spawn(occupant).unwrap();

        system.post(order("bms", "occupant0")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(20)).await;

        assert_eq!(bms.messages(), vec![Message::ElevatorRequest]);
        assert!(tracker.get("occupant0").unwrap().evacuated_at.is_some());

        system.shutdown_all().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignores_orders_after_evacuating() {
        let building = Arc::new(Building::from_text(&[&["NH"]], Connectors::default()).unwrap());
        let tracker = ActorTracker::new();
        let occupant = Occupant::new(
            "occupant0",
            Position::new(0, 0, 0),
            MobilityClass::Normal,
            Navigator::new(Arc::clone(&building)),
            &settings(),
            tracker.clone(),
        );

        let system = ActorSystem::new();
        system.spawn(occupant).unwrap();

        // already standing in an exit
        system.post(order("bms", "occupant0")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let first = tracker.get("occupant0").unwrap().evacuated_at;
        assert!(first.is_some());

        system.post(order("bms", "occupant0")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(tracker.get("occupant0").unwrap().evacuated_at, first);
        assert!(!building.room(Position::new(0, 0, 0)).unwrap().is_occupied());

        system.shutdown_all().await.unwrap();
    }
}
