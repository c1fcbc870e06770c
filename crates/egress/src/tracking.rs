//! Where every actor is
//!
//! Actors write their own entry; renderers and the run report only read.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::messages::ResponderRole;
use crate::navigation::EdgeKind;
use crate::types::{MobilityClass, Position};

/// What kind of actor an entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "role")]
pub enum ActorClass {
    Occupant,
    Responder(ResponderRole),
}

/// Position and status of one actor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActorView {
    pub id: String,
    pub class: ActorClass,
    pub mobility: MobilityClass,
    /// `None` once the actor has left the building
    pub position: Option<Position>,
    pub evacuated_at: Option<DateTime<Utc>>,
    /// Floor changes taken so far, in order
    pub transits: Vec<EdgeKind>,
}

/// Shared actor position table
#[derive(Debug, Clone, Default)]
pub struct ActorTracker {
    views: Arc<DashMap<String, ActorView>>,
}

impl ActorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        id: impl Into<String>,
        class: ActorClass,
        mobility: MobilityClass,
        position: Position,
    ) {
        let id = id.into();
        self.views.insert(
            id.clone(),
            ActorView {
                id,
                class,
                mobility,
                position: Some(position),
                evacuated_at: None,
                transits: Vec::new(),
            },
        );
    }

    /// Record one step; vertical edges are kept in `transits`
    pub fn record_move(&self, id: &str, to: Position, edge: EdgeKind) {
        if let Some(mut view) = self.views.get_mut(id) {
            view.position = Some(to);
            if edge.is_vertical() {
                view.transits.push(edge);
            }
        }
    }

    /// Record the evacuation time and take the actor off the floor plan
    pub fn mark_evacuated(&self, id: &str, at: DateTime<Utc>) {
        if let Some(mut view) = self.views.get_mut(id) {
            view.position = None;
            view.evacuated_at = Some(at);
        }
    }

    pub fn get(&self, id: &str) -> Option<ActorView> {
        self.views.get(id).map(|view| view.clone())
    }

    /// All entries ordered by id
    pub fn views(&self) -> Vec<ActorView> {
        let mut views: Vec<ActorView> = self.views.iter().map(|e| e.value().clone()).collect();
        views.sort_by(|a, b| a.id.cmp(&b.id));
        views
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_and_evacuate() {
        let tracker = ActorTracker::new();
        tracker.register(
            "occupant1",
            ActorClass::Occupant,
            MobilityClass::Reduced,
            Position::new(0, 1, 1),
        );
        tracker.register(
            "fireman",
            ActorClass::Responder(ResponderRole::Fireman),
            MobilityClass::Normal,
            Position::new(0, 0, 0),
        );

        tracker.record_move("occupant1", Position::new(0, 1, 2), EdgeKind::Walk);
        tracker.record_move("occupant1", Position::new(1, 1, 2), EdgeKind::Stair);
        let view = tracker.get("occupant1").unwrap();
        assert_eq!(view.position, Some(Position::new(1, 1, 2)));
        assert_eq!(view.transits, vec![EdgeKind::Stair]);

        let now = Utc::now();
        tracker.mark_evacuated("occupant1", now);
        let view = tracker.get("occupant1").unwrap();
        assert_eq!(view.position, None);
        assert_eq!(view.evacuated_at, Some(now));

        let ids: Vec<String> = tracker.views().into_iter().map(|v| v.id).collect();
        assert_eq!(ids, vec!["fireman", "occupant1"]);
    }

    #[test]
    fn test_unknown_ids_are_ignored() {
        let tracker = ActorTracker::new();
        tracker.record_move("ghost", Position::new(0, 0, 0), EdgeKind::Walk);
        assert!(tracker.get("ghost").is_none());
    }
}
