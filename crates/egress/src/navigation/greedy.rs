//! Closest-neighbour routing
//!
//! Walks toward a single target room, never revisiting a room. When the
//! target is on another floor it first heads for the nearest usable
//! connector on the current floor, rides it, and resumes on the new floor.

use std::collections::HashSet;

use crate::building::ConnectorKind;
use crate::types::Position;

use super::{Goal, Navigator, Route, RouteOptions, Step};

pub(super) fn route(
    nav: &Navigator,
    from: Position,
    goal: Goal,
    options: &RouteOptions,
) -> Option<Route> {
    let target = nav.nearest_goal(from, goal)?;
    let mut visited = HashSet::from([from]);
    let mut current = from;
    let mut route = Route::default();

    while !nav.is_goal(current, goal) {
        let moves: Vec<(Step, u32)> = nav
            .successors(current, goal, options)
            .into_iter()
            .filter(|(step, _)| !visited.contains(&step.to))
            .collect();

        let next = if current.floor == target.floor {
            walk_toward(&moves, target)
        } else {
            let gap = current.floor.abs_diff(target.floor);
            let ride = moves
                .iter()
                .filter(|(step, _)| {
                    step.edge.is_vertical() && step.to.floor.abs_diff(target.floor) < gap
                })
                .min_by_key(|(step, cost)| (step.to.floor.abs_diff(target.floor), *cost))
                .copied();
            match ride {
                Some(ride) => Some(ride),
                None => {
                    let connector = nearest_connector(nav, current, target, options)?;
                    walk_toward(&moves, connector)
                }
            }
        };

        let (step, cost) = next?;
        visited.insert(step.to);
        route.steps.push(step);
        route.cost += cost;
        current = step.to;
    }

    Some(route)
}

fn walk_toward(moves: &[(Step, u32)], toward: Position) -> Option<(Step, u32)> {
    moves
        .iter()
        .filter(|(step, _)| !step.edge.is_vertical())
        .min_by_key(|(step, _)| step.to.manhattan(&toward))
        .copied()
}

/// Closest room on the current floor with an open link toward the target floor
fn nearest_connector(
    nav: &Navigator,
    current: Position,
    target: Position,
    options: &RouteOptions,
) -> Option<Position> {
    let gap = current.floor.abs_diff(target.floor);
    nav.building()
        .rooms_on_floor(current.floor)
        .filter(|room| {
            ConnectorKind::ALL.iter().any(|connector| {
                nav.connector_open(*connector, options)
                    && room
                        .links(*connector)
                        .iter()
                        .any(|to| to.floor.abs_diff(target.floor) < gap)
            })
        })
        .map(|room| room.position())
        .min_by_key(|pos| pos.planar_distance(&current))
}
