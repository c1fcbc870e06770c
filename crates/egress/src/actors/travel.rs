//! Step-by-step movement through the building
//!
//! A [`Traveller`] owns an actor's position and drives it along a planned
//! route, one step per due tick. Every step is re-checked against the live
//! building before it is taken; a step that became unusable triggers a
//! replan from the current room, and a failed plan parks the traveller in
//! `Blocked` until the retry time.

use std::collections::VecDeque;

use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::config::TimingConfig;
use crate::navigation::{EdgeKind, ElevatorAccess, Goal, Navigator, RouteOptions, Step};
use crate::types::{MobilityClass, Position};

/// Time each kind of step takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub step: Duration,
    pub reduced_step: Duration,
    pub elevator_transit: Duration,
    pub stair_per_floor: Duration,
    pub reduced_stair_per_floor: Duration,
}

impl Pacing {
    pub fn from_timing(timing: &TimingConfig) -> Self {
        Self {
            step: Duration::from_millis(timing.step_ms),
            reduced_step: Duration::from_millis(timing.reduced_step_ms),
            elevator_transit: Duration::from_millis(timing.elevator_transit_ms),
            stair_per_floor: Duration::from_millis(timing.stair_per_floor_ms),
            reduced_stair_per_floor: Duration::from_millis(timing.reduced_stair_per_floor_ms),
        }
    }

    pub fn delay(&self, edge: EdgeKind, floors: usize, mobility: MobilityClass) -> Duration {
        let reduced = mobility == MobilityClass::Reduced;
        let floors = floors.max(1) as u32;
        match edge {
            EdgeKind::Walk if reduced => self.reduced_step,
            EdgeKind::Walk => self.step,
            EdgeKind::Elevator => self.elevator_transit,
            EdgeKind::Stair | EdgeKind::EmergencyStair if reduced => {
                self.reduced_stair_per_floor * floors
            }
            EdgeKind::Stair | EdgeKind::EmergencyStair => self.stair_per_floor * floors,
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self::from_timing(&TimingConfig::default())
    }
}

/// Which part of a journey the traveller is in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Start and goal on one floor
    SameFloor,
    /// Walking to a vertical connector
    ToConnector,
    /// At a connector, about to change floors
    InTransit,
    /// On the goal floor after changing floors
    FinalLeg,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TravelState {
    Idle,
    AwaitingElevator {
        goal: Goal,
        deadline: Instant,
    },
    Navigating {
        goal: Goal,
        phase: Phase,
        steps: VecDeque<Step>,
        next_step_at: Instant,
    },
    Blocked {
        goal: Goal,
        retry_at: Instant,
        attempts: u32,
    },
    Arrived {
        at: Position,
    },
}

/// Something the owning actor should react to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TravelEvent {
    Moved {
        from: Position,
        to: Position,
        edge: EdgeKind,
    },
    Replanned,
    Blocked {
        attempts: u32,
    },
    Arrived(Position),
}

/// Movement state of one actor
#[derive(Debug)]
pub struct Traveller {
    navigator: Navigator,
    position: Position,
    options: RouteOptions,
    pacing: Pacing,
    retry: Duration,
    crossed_floor: bool,
    state: TravelState,
}

impl Traveller {
    pub fn new(
        navigator: Navigator,
        position: Position,
        options: RouteOptions,
        pacing: Pacing,
        retry: Duration,
    ) -> Self {
        Self {
            navigator,
            position,
            options,
            pacing,
            retry,
            crossed_floor: false,
            state: TravelState::Idle,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn mobility(&self) -> MobilityClass {
        self.options.mobility
    }

    pub fn state(&self) -> &TravelState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == TravelState::Idle
    }

    pub fn is_awaiting_elevator(&self) -> bool {
        matches!(self.state, TravelState::AwaitingElevator { .. })
    }

    pub fn phase(&self) -> Option<Phase> {
        match &self.state {
            TravelState::Navigating { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// Whether reaching `goal` from here involves another floor
    pub fn needs_floor_change(&self, goal: Goal) -> bool {
        self.navigator.needs_floor_change(self.position, goal)
    }

    /// Hold off planning until the coordinator answers, or `deadline` passes
    pub fn await_elevator(&mut self, goal: Goal, deadline: Instant) {
        self.state = TravelState::AwaitingElevator { goal, deadline };
    }

    /// Coordinator's answer to an elevator request; ignored unless one is pending
    pub fn elevator_reply(&mut self, unlocked: bool, now: Instant) -> Option<TravelEvent> {
        let TravelState::AwaitingElevator { goal, .. } = self.state else {
            return None;
        };
        let access = if unlocked {
            ElevatorAccess::IfUnlocked
        } else {
            ElevatorAccess::Avoid
        };
        self.start(goal, access, now)
    }

    /// Plan toward `goal` and begin moving on the next due tick
    pub fn start(&mut self, goal: Goal, access: ElevatorAccess, now: Instant) -> Option<TravelEvent> {
        self.options.elevator = access;
        self.crossed_floor = false;
        self.plan(goal, now, 0)
    }

    /// Forget the current journey
    pub fn reset(&mut self) {
        self.state = TravelState::Idle;
    }

    /// Make progress if anything is due at `now`
    pub fn advance(&mut self, now: Instant) -> Option<TravelEvent> {
        match self.state {
            TravelState::AwaitingElevator { goal, deadline } if now >= deadline => {
                debug!(position = %self.position, "No elevator answer, taking the stairs");
                self.start(goal, ElevatorAccess::Avoid, now)
            }
            TravelState::Blocked {
                goal,
                retry_at,
                attempts,
            } if now >= retry_at => self.plan(goal, now, attempts),
            TravelState::Navigating { next_step_at, .. } if now >= next_step_at => {
                self.take_step(now)
            }
            _ => None,
        }
    }

    fn plan(&mut self, goal: Goal, now: Instant, failed_attempts: u32) -> Option<TravelEvent> {
        match self.navigator.route(self.position, goal, &self.options) {
            Some(route) if route.is_empty() => {
                self.state = TravelState::Arrived { at: self.position };
                Some(TravelEvent::Arrived(self.position))
            }
            Some(route) => {
                let steps: VecDeque<Step> = route.steps.into();
                self.state = TravelState::Navigating {
                    goal,
                    phase: phase_for(&steps, self.crossed_floor),
                    steps,
                    next_step_at: now,
                };
                None
            }
            None => {
                let attempts = failed_attempts + 1;
                self.state = TravelState::Blocked {
                    goal,
                    retry_at: now + self.retry,
                    attempts,
                };
                Some(TravelEvent::Blocked { attempts })
            }
        }
    }

    fn take_step(&mut self, now: Instant) -> Option<TravelEvent> {
        let (goal, next) = match &self.state {
            TravelState::Navigating { goal, steps, .. } => (*goal, steps.front().copied()),
            _ => return None,
        };

        let Some(step) = next else {
            if self.navigator.is_goal(self.position, goal) {
                self.state = TravelState::Arrived { at: self.position };
                return Some(TravelEvent::Arrived(self.position));
            }
            return self.plan(goal, now, 0).or(Some(TravelEvent::Replanned));
        };

        if !self
            .navigator
            .step_usable(self.position, &step, goal, &self.options)
        {
            debug!(from = %self.position, to = %step.to, "Step no longer usable, replanning");
            return self.plan(goal, now, 0).or(Some(TravelEvent::Replanned));
        }

        let from = self.position;
        self.position = step.to;
        if step.edge.is_vertical() {
            self.crossed_floor = true;
        }
        let delay = self.pacing.delay(
            step.edge,
            from.floor.abs_diff(step.to.floor),
            self.options.mobility,
        );

        if let TravelState::Navigating {
            steps,
            phase,
            next_step_at,
            ..
        } = &mut self.state
        {
            steps.pop_front();
            *phase = phase_for(steps, self.crossed_floor);
            *next_step_at = now + delay;
        }

        Some(TravelEvent::Moved {
            from,
            to: step.to,
            edge: step.edge,
        })
    }
}

fn phase_for(steps: &VecDeque<Step>, crossed_floor: bool) -> Phase {
    match steps.front() {
        Some(step) if step.edge.is_vertical() => Phase::InTransit,
        _ if steps.iter().any(|step| step.edge.is_vertical()) => Phase::ToConnector,
        _ if crossed_floor => Phase::FinalLeg,
        _ => Phase::SameFloor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::building::{Building, Connectors, StairPosition};

    fn pacing() -> Pacing {
        Pacing {
            step: Duration::from_millis(100),
            reduced_step: Duration::from_millis(300),
            elevator_transit: Duration::from_millis(400),
            stair_per_floor: Duration::from_millis(200),
            reduced_stair_per_floor: Duration::from_millis(900),
        }
    }

    fn traveller(building: Building, start: Position, mobility: MobilityClass) -> Traveller {
        Traveller::new(
            Navigator::new(Arc::new(building)),
            start,
            RouteOptions::default().with_mobility(mobility),
            pacing(),
            Duration::from_secs(1),
        )
    }

    fn corridor() -> Building {
        Building::from_text(&[&["HHHN"]], Connectors::default()).unwrap()
    }

    fn tower() -> Building {
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
        .unwrap()
    }

    /// Advance until arrival, returning the events and the time taken
    fn run(traveller: &mut Traveller, start: Instant) -> (Vec<TravelEvent>, Duration) {
        let mut now = start;
        let mut events = Vec::new();
        for _ in 0..1000 {
            if let Some(event) = traveller.advance(now) {
                events.push(event);
                if matches!(event, TravelEvent::Arrived(_)) {
                    break;
                }
            }
            now += Duration::from_millis(50);
        }
        (events, now - start)
    }

    #[test]
    fn test_pacing_by_mobility() {
        let pacing = pacing();
        assert_eq!(
            pacing.delay(EdgeKind::Walk, 0, MobilityClass::Reduced),
            Duration::from_millis(300)
        );
        assert_eq!(
            pacing.delay(EdgeKind::Stair, 2, MobilityClass::Normal),
            Duration::from_millis(400)
        );
        assert_eq!(
            pacing.delay(EdgeKind::Elevator, 3, MobilityClass::Reduced),
            Duration::from_millis(400)
        );
    }

    #[test]
    fn test_walks_to_exit_step_by_step() {
        let t0 = Instant::now();
        let mut traveller = traveller(corridor(), Position::new(0, 0, 0), MobilityClass::Normal);
        assert!(traveller.start(Goal::NearestExit, ElevatorAccess::Avoid, t0).is_none());
        assert_eq!(traveller.phase(), Some(Phase::SameFloor));

        // nothing happens before the step is due
        assert!(traveller.advance(t0 - Duration::from_millis(1)).is_none());

        let (events, _) = run(&mut traveller, t0);
        let moves = events
            .iter()
            .filter(|e| matches!(e, TravelEvent::Moved { .. }))
            .count();
        assert_eq!(moves, 3);
        assert_eq!(events.last(), Some(&TravelEvent::Arrived(Position::new(0, 0, 3))));
        assert_eq!(traveller.state(), &TravelState::Arrived { at: Position::new(0, 0, 3) });
    }

    #[test]
    fn test_reduced_mobility_is_slower() {
        let t0 = Instant::now();
        let mut normal = traveller(corridor(), Position::new(0, 0, 0), MobilityClass::Normal);
        normal.start(Goal::NearestExit, ElevatorAccess::Avoid, t0);
        let (_, normal_time) = run(&mut normal, t0);

        let mut reduced = traveller(corridor(), Position::new(0, 0, 0), MobilityClass::Reduced);
        reduced.start(Goal::NearestExit, ElevatorAccess::Avoid, t0);
        let (_, reduced_time) = run(&mut reduced, t0);

        assert!(reduced_time > normal_time);
    }

    #[test]
    fn test_blocked_until_path_clears() {
        let t0 = Instant::now();
        let building = corridor();
        building.ignite(Position::new(0, 0, 2));
        let mut traveller = traveller(building, Position::new(0, 0, 0), MobilityClass::Normal);

        assert_eq!(
            traveller.start(Goal::NearestExit, ElevatorAccess::Avoid, t0),
            Some(TravelEvent::Blocked { attempts: 1 })
        );
        assert!(traveller.advance(t0 + Duration::from_millis(500)).is_none());
        assert_eq!(
            traveller.advance(t0 + Duration::from_secs(1)),
            Some(TravelEvent::Blocked { attempts: 2 })
        );

        traveller
            .navigator
            .building()
            .clear_hazards(Position::new(0, 0, 2));
        assert!(traveller.advance(t0 + Duration::from_secs(2)).is_none());
        assert!(matches!(traveller.state(), TravelState::Navigating { .. }));
    }

    #[test]
    fn test_new_hazard_triggers_replan() {
        let t0 = Instant::now();
        let building = Building::from_text(&[&["HHH", "HSN", "HHH"]], Connectors::default())
            .unwrap();
        let mut traveller = traveller(building, Position::new(0, 0, 0), MobilityClass::Normal);
        traveller.start(Goal::NearestExit, ElevatorAccess::Avoid, t0);

        // block whichever room the first step heads for
        let first = match traveller.state() {
            TravelState::Navigating { steps, .. } => steps[0].to,
            other => panic!("unexpected state {other:?}"),
        };
        traveller.navigator.building().ignite(first);

        assert_eq!(traveller.advance(t0), Some(TravelEvent::Replanned));
        let (events, _) = run(&mut traveller, t0);
        assert_eq!(events.last(), Some(&TravelEvent::Arrived(Position::new(0, 1, 2))));
        for event in events {
            if let TravelEvent::Moved { to, .. } = event {
                assert_ne!(to, first);
            }
        }
    }

    #[test]
    fn test_elevator_timeout_falls_back_to_stairs() {
        let t0 = Instant::now();
        let mut traveller = traveller(tower(), Position::new(1, 0, 2), MobilityClass::Reduced);
        assert!(traveller.needs_floor_change(Goal::NearestExit));

        traveller.await_elevator(Goal::NearestExit, t0 + Duration::from_secs(1));
        assert!(traveller.advance(t0).is_none());
        assert!(traveller.is_awaiting_elevator());

        traveller.advance(t0 + Duration::from_secs(1));
        let (events, _) = run(&mut traveller, t0 + Duration::from_secs(1));
        assert!(events.iter().any(|e| matches!(
            e,
            TravelEvent::Moved {
                edge: EdgeKind::Stair,
                ..
            }
        )));
        assert!(!events.iter().any(|e| matches!(
            e,
            TravelEvent::Moved {
                edge: EdgeKind::Elevator,
                ..
            }
        )));
    }

    #[test]
    fn test_unlocked_elevator_reply_lets_reduced_mobility_ride() {
        let t0 = Instant::now();
        let mut traveller = traveller(tower(), Position::new(1, 0, 2), MobilityClass::Reduced);
        traveller.await_elevator(Goal::NearestExit, t0 + Duration::from_secs(1));

        assert!(traveller.elevator_reply(true, t0).is_none());
        assert_eq!(traveller.phase(), Some(Phase::InTransit));

        let (events, _) = run(&mut traveller, t0);
        assert!(matches!(
            events[0],
            TravelEvent::Moved {
                edge: EdgeKind::Elevator,
                ..
            }
        ));
        assert_eq!(events.last(), Some(&TravelEvent::Arrived(Position::new(0, 0, 0))));

        // a late reply is ignored
        assert!(traveller.elevator_reply(true, t0).is_none());
    }
}
