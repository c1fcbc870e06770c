//! Rooms
//!
//! A room is one cell of the building grid. Its topology (kind, adjacency,
//! vertical links) is fixed once the building is assembled; only the hazard
//! and occupancy flags change while the simulation runs.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

use crate::types::Position;

/// What a room is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomKind {
    Hallway,
    Store,
    Restroom,
    NormalExit,
    EmergencyExit,
}

impl RoomKind {
    pub fn is_exit(self) -> bool {
        matches!(self, RoomKind::NormalExit | RoomKind::EmergencyExit)
    }

    /// Hallways and exits: the connective cells every floor plan is built around
    pub fn is_corridor(self) -> bool {
        self == RoomKind::Hallway || self.is_exit()
    }

    /// Single-character glyph used by text floor plans
    pub fn glyph(self) -> char {
        match self {
            RoomKind::Hallway => 'H',
            RoomKind::Store => 'S',
            RoomKind::Restroom => 'R',
            RoomKind::NormalExit => 'N',
            RoomKind::EmergencyExit => 'E',
        }
    }

    pub fn from_glyph(glyph: char) -> Option<RoomKind> {
        match glyph {
            'H' => Some(RoomKind::Hallway),
            'S' => Some(RoomKind::Store),
            'R' => Some(RoomKind::Restroom),
            'N' => Some(RoomKind::NormalExit),
            'E' => Some(RoomKind::EmergencyExit),
            _ => None,
        }
    }
}

/// Class of vertical transit between floors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectorKind {
    Elevator,
    Stair,
    EmergencyStair,
}

impl ConnectorKind {
    pub const ALL: [ConnectorKind; 3] = [
        ConnectorKind::Elevator,
        ConnectorKind::Stair,
        ConnectorKind::EmergencyStair,
    ];
}

/// A node of the building graph
#[derive(Debug)]
pub struct Room {
    position: Position,
    kind: RoomKind,
    pub(crate) adjacent: BTreeSet<Position>,
    pub(crate) elevator_links: BTreeSet<Position>,
    pub(crate) stair_links: BTreeSet<Position>,
    pub(crate) emergency_stair_links: BTreeSet<Position>,
    on_fire: AtomicBool,
    unavailable: AtomicBool,
    occupants: AtomicU32,
}

impl Room {
    pub(crate) fn new(position: Position, kind: RoomKind) -> Self {
        Self {
            position,
            kind,
            adjacent: BTreeSet::new(),
            elevator_links: BTreeSet::new(),
            stair_links: BTreeSet::new(),
            emergency_stair_links: BTreeSet::new(),
            on_fire: AtomicBool::new(false),
            unavailable: AtomicBool::new(false),
            occupants: AtomicU32::new(0),
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn kind(&self) -> RoomKind {
        self.kind
    }

    /// Same-floor rooms reachable in one step
    pub fn adjacent(&self) -> &BTreeSet<Position> {
        &self.adjacent
    }

    /// Rooms on other floors reachable through a connector
    pub fn links(&self, connector: ConnectorKind) -> &BTreeSet<Position> {
        match connector {
            ConnectorKind::Elevator => &self.elevator_links,
            ConnectorKind::Stair => &self.stair_links,
            ConnectorKind::EmergencyStair => &self.emergency_stair_links,
        }
    }

    pub fn has_vertical_links(&self) -> bool {
        ConnectorKind::ALL.iter().any(|c| !self.links(*c).is_empty())
    }

    pub fn is_on_fire(&self) -> bool {
        self.on_fire.load(Ordering::SeqCst)
    }

    pub fn is_unavailable(&self) -> bool {
        self.unavailable.load(Ordering::SeqCst)
    }

    /// Neither burning nor closed off
    pub fn is_safe(&self) -> bool {
        !self.is_on_fire() && !self.is_unavailable()
    }

    pub fn is_occupied(&self) -> bool {
        self.occupant_count() > 0
    }

    pub fn occupant_count(&self) -> u32 {
        self.occupants.load(Ordering::SeqCst)
    }

    /// Returns the previous value
    pub fn set_on_fire(&self, on_fire: bool) -> bool {
        self.on_fire.swap(on_fire, Ordering::SeqCst)
    }

    /// Returns the previous value
    pub fn set_unavailable(&self, unavailable: bool) -> bool {
        self.unavailable.swap(unavailable, Ordering::SeqCst)
    }

    pub fn clear_hazards(&self) {
        self.set_on_fire(false);
        self.set_unavailable(false);
    }

    pub(crate) fn enter(&self) {
        self.occupants.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn leave(&self) {
        let _ = self
            .occupants
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub fn view(&self) -> RoomView {
        RoomView {
            floor: self.position.floor,
            row: self.position.row,
            col: self.position.col,
            kind: self.kind,
            on_fire: self.is_on_fire(),
            unavailable: self.is_unavailable(),
            occupied: self.is_occupied(),
        }
    }
}

/// Read-only snapshot of a room for renderers and reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomView {
    pub floor: usize,
    pub row: usize,
    pub col: usize,
    pub kind: RoomKind,
    pub on_fire: bool,
    pub unavailable: bool,
    pub occupied: bool,
}
