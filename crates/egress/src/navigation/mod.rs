//! Hazard-aware route planning
//!
//! Routes are computed against the live building: edges into burning or
//! closed rooms, locked elevators and locked emergency stairs are skipped.
//! A route is only valid for the snapshot it was planned on, so travellers
//! re-check every step with [`Navigator::step_usable`] before taking it.

mod greedy;

use std::sync::Arc;

use pathfinding::prelude::astar;
use serde::{Deserialize, Serialize};

use crate::building::{Building, ConnectorKind, Room};
use crate::types::{MobilityClass, Position};

/// Where a route should end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Goal {
    /// One specific room
    Room(Position),
    /// Any exit
    NearestExit,
    /// Any room with a vertical link
    NearestConnector,
}

/// Search strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Priority search, shortest under the current hazards
    #[default]
    Optimal,
    /// Closest-neighbour walk; cheap but can dead-end
    Greedy,
}

/// Whether a route may ride elevators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ElevatorAccess {
    #[default]
    Avoid,
    /// Allowed while the elevator lock is off
    IfUnlocked,
}

/// How a step moves between rooms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Walk,
    Elevator,
    Stair,
    EmergencyStair,
}

impl EdgeKind {
    pub fn is_vertical(self) -> bool {
        self != EdgeKind::Walk
    }

    fn connector(self) -> Option<ConnectorKind> {
        match self {
            EdgeKind::Walk => None,
            EdgeKind::Elevator => Some(ConnectorKind::Elevator),
            EdgeKind::Stair => Some(ConnectorKind::Stair),
            EdgeKind::EmergencyStair => Some(ConnectorKind::EmergencyStair),
        }
    }
}

impl From<ConnectorKind> for EdgeKind {
    fn from(connector: ConnectorKind) -> Self {
        match connector {
            ConnectorKind::Elevator => EdgeKind::Elevator,
            ConnectorKind::Stair => EdgeKind::Stair,
            ConnectorKind::EmergencyStair => EdgeKind::EmergencyStair,
        }
    }
}

/// Cost of vertical edges; a walk step always costs 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerticalCosts {
    /// Any ride, regardless of the number of floors
    pub elevator: u32,
    /// Stairs, multiplied by floors climbed
    pub stair_per_floor: u32,
}

impl VerticalCosts {
    pub const NORMAL: VerticalCosts = VerticalCosts {
        elevator: 3,
        stair_per_floor: 2,
    };

    /// Stairs are expensive enough that a free elevator wins
    pub const REDUCED: VerticalCosts = VerticalCosts {
        elevator: 2,
        stair_per_floor: 6,
    };

    pub fn for_mobility(mobility: MobilityClass) -> Self {
        match mobility {
            MobilityClass::Normal => Self::NORMAL,
            MobilityClass::Reduced => Self::REDUCED,
        }
    }

    fn cost(&self, edge: EdgeKind, floors: usize) -> u32 {
        let floors = floors as u32;
        match edge {
            EdgeKind::Walk => 1,
            EdgeKind::Elevator => self.elevator,
            EdgeKind::Stair | EdgeKind::EmergencyStair => self.stair_per_floor * floors,
        }
    }
}

/// Per-route settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RouteOptions {
    pub strategy: Strategy,
    pub elevator: ElevatorAccess,
    pub mobility: MobilityClass,
    /// Allow the goal room itself to be on fire or unavailable
    pub enter_hazardous_goal: bool,
}

impl RouteOptions {
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_elevator(mut self, elevator: ElevatorAccess) -> Self {
        self.elevator = elevator;
        self
    }

    pub fn with_mobility(mut self, mobility: MobilityClass) -> Self {
        self.mobility = mobility;
        self
    }

    pub fn entering_hazardous_goal(mut self) -> Self {
        self.enter_hazardous_goal = true;
        self
    }
}

/// One move of a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Step {
    pub to: Position,
    pub edge: EdgeKind,
}

/// Ordered steps from a start room to a goal room
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Route {
    pub steps: Vec<Step>,
    pub cost: u32,
}

impl Route {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Final room, `None` for an empty route
    pub fn destination(&self) -> Option<Position> {
        self.steps.last().map(|step| step.to)
    }

    pub fn uses(&self, edge: EdgeKind) -> bool {
        self.steps.iter().any(|step| step.edge == edge)
    }
}

/// Route planner over a shared building
#[derive(Debug, Clone)]
pub struct Navigator {
    building: Arc<Building>,
}

impl Navigator {
    pub fn new(building: Arc<Building>) -> Self {
        Self { building }
    }

    pub fn building(&self) -> &Arc<Building> {
        &self.building
    }

    pub fn is_goal(&self, pos: Position, goal: Goal) -> bool {
        match goal {
            Goal::Room(target) => pos == target,
            Goal::NearestExit => self
                .building
                .room(pos)
                .is_some_and(|room| room.kind().is_exit()),
            Goal::NearestConnector => self
                .building
                .room(pos)
                .is_some_and(Room::has_vertical_links),
        }
    }

    fn goal_positions(&self, goal: Goal) -> Vec<Position> {
        match goal {
            Goal::Room(target) => vec![target],
            Goal::NearestExit => self.building.exits().map(Room::position).collect(),
            Goal::NearestConnector => self.building.connectors().map(Room::position).collect(),
        }
    }

    /// Closest goal room by 3-D Manhattan distance, safe rooms first
    pub fn nearest_goal(&self, from: Position, goal: Goal) -> Option<Position> {
        let candidates = self.goal_positions(goal);
        let safe = candidates
            .iter()
            .copied()
            .filter(|pos| self.building.room(*pos).is_some_and(Room::is_safe))
            .min_by_key(|pos| pos.manhattan(&from));
        safe.or_else(|| candidates.into_iter().min_by_key(|pos| pos.manhattan(&from)))
    }

    /// Whether the nearest goal room lies on another floor
    pub fn needs_floor_change(&self, from: Position, goal: Goal) -> bool {
        self.nearest_goal(from, goal)
            .is_some_and(|target| target.floor != from.floor)
    }

    /// Plan a route; `None` when the goal cannot be reached right now
    pub fn route(&self, from: Position, goal: Goal, options: &RouteOptions) -> Option<Route> {
        self.building.room(from)?;
        if self.is_goal(from, goal) {
            return Some(Route::default());
        }
        match options.strategy {
            Strategy::Optimal => self.optimal(from, goal, options),
            Strategy::Greedy => greedy::route(self, from, goal, options),
        }
    }

    /// Whether `step` can still be taken from `from`
    pub fn step_usable(
        &self,
        from: Position,
        step: &Step,
        goal: Goal,
        options: &RouteOptions,
    ) -> bool {
        let Some(room) = self.building.room(from) else {
            return false;
        };
        let linked = match step.edge.connector() {
            None => room.adjacent().contains(&step.to),
            Some(connector) => {
                self.connector_open(connector, options) && room.links(connector).contains(&step.to)
            }
        };
        linked && self.enterable(step.to, goal, options)
    }

    pub(crate) fn connector_open(&self, connector: ConnectorKind, options: &RouteOptions) -> bool {
        let locks = self.building.locks();
        match connector {
            ConnectorKind::Elevator => {
                options.elevator == ElevatorAccess::IfUnlocked && !locks.elevators_locked()
            }
            ConnectorKind::Stair => true,
            ConnectorKind::EmergencyStair => !locks.doors_locked(),
        }
    }

    fn enterable(&self, pos: Position, goal: Goal, options: &RouteOptions) -> bool {
        match self.building.room(pos) {
            Some(room) if room.is_safe() => true,
            Some(_) => options.enter_hazardous_goal && self.is_goal(pos, goal),
            None => false,
        }
    }

    /// Usable moves out of `from` with their costs
    pub(crate) fn successors(
        &self,
        from: Position,
        goal: Goal,
        options: &RouteOptions,
    ) -> Vec<(Step, u32)> {
        let Some(room) = self.building.room(from) else {
            return Vec::new();
        };
        let costs = VerticalCosts::for_mobility(options.mobility);

        let mut moves: Vec<(Step, u32)> = room
            .adjacent()
            .iter()
            .filter(|to| self.enterable(**to, goal, options))
            .map(|to| {
                let step = Step {
                    to: *to,
                    edge: EdgeKind::Walk,
                };
                (step, 1)
            })
            .collect();

        for connector in ConnectorKind::ALL {
            if !self.connector_open(connector, options) {
                continue;
            }
            let edge = EdgeKind::from(connector);
            for to in room.links(connector) {
                if self.enterable(*to, goal, options) {
                    let cost = costs.cost(edge, from.floor.abs_diff(to.floor));
                    moves.push((Step { to: *to, edge }, cost));
                }
            }
        }
        moves
    }

    fn optimal(&self, from: Position, goal: Goal, options: &RouteOptions) -> Option<Route> {
        let targets = self.goal_positions(goal);

        let (path, cost) = astar(
            &from,
            |pos| {
                self.successors(*pos, goal, options)
                    .into_iter()
                    .map(|(step, cost)| (step.to, cost))
            },
            |pos| heuristic(pos, &targets),
            |pos| self.is_goal(*pos, goal),
        )?;

        // several edge kinds can join the same two rooms; keep the cheapest
        let steps = path
            .windows(2)
            .map(|pair| {
                self.successors(pair[0], goal, options)
                    .into_iter()
                    .filter(|(step, _)| step.to == pair[1])
                    .min_by_key(|(_, cost)| *cost)
                    .map(|(step, _)| step)
            })
            .collect::<Option<Vec<Step>>>()?;

        Some(Route { steps, cost })
    }
}

/// Planar distance plus one if a floor change is still needed
fn heuristic(pos: &Position, targets: &[Position]) -> u32 {
    targets
        .iter()
        .map(|target| {
            let vertical = u32::from(target.floor != pos.floor);
            pos.planar_distance(target) as u32 + vertical
        })
        .min()
        .unwrap_or(0)
}
