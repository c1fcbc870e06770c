//! Building topology and live hazard state
//!
//! The building is generated (or parsed) once and then shared as
//! `Arc<Building>`. Topology never changes afterwards; rooms carry atomic
//! hazard flags and the building carries the three lockdown flags.

mod layout;
mod room;

pub use layout::{Connectors, FloorPlan, LayoutError, StairPosition, generate};
pub use room::{ConnectorKind, Room, RoomKind, RoomView};

use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::Position;

/// Building-wide lockdown flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockTarget {
    Doors,
    Elevators,
    Communications,
}

impl LockTarget {
    pub const ALL: [LockTarget; 3] = [
        LockTarget::Doors,
        LockTarget::Elevators,
        LockTarget::Communications,
    ];
}

/// Snapshot of the lockdown flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockState {
    pub doors_locked: bool,
    pub elevators_locked: bool,
    pub communications_locked: bool,
}

/// Live lockdown flags
///
/// Always read at the point of decision; never cache the values.
#[derive(Debug, Default)]
pub struct LockFlags {
    doors: AtomicBool,
    elevators: AtomicBool,
    communications: AtomicBool,
    /// Some flag was set by a compromised system rather than by policy
    compromised: AtomicBool,
}

impl LockFlags {
    fn flag(&self, target: LockTarget) -> &AtomicBool {
        match target {
            LockTarget::Doors => &self.doors,
            LockTarget::Elevators => &self.elevators,
            LockTarget::Communications => &self.communications,
        }
    }

    pub fn is_locked(&self, target: LockTarget) -> bool {
        self.flag(target).load(Ordering::SeqCst)
    }

    /// Set a flag, returning its previous value
    pub fn set(&self, target: LockTarget, locked: bool) -> bool {
        self.flag(target).swap(locked, Ordering::SeqCst)
    }

    /// Lock `target` through a compromised system, returning the previous value
    ///
    /// The coordinator does not lift locks while the systems are compromised.
    pub fn compromise(&self, target: LockTarget) -> bool {
        self.compromised.store(true, Ordering::SeqCst);
        self.set(target, true)
    }

    pub fn is_compromised(&self) -> bool {
        self.compromised.load(Ordering::SeqCst)
    }

    /// Flip a flag, returning the new value
    pub fn toggle(&self, target: LockTarget) -> bool {
        !self.flag(target).fetch_xor(true, Ordering::SeqCst)
    }

    pub fn doors_locked(&self) -> bool {
        self.is_locked(LockTarget::Doors)
    }

    pub fn elevators_locked(&self) -> bool {
        self.is_locked(LockTarget::Elevators)
    }

    pub fn communications_locked(&self) -> bool {
        self.is_locked(LockTarget::Communications)
    }

    pub fn snapshot(&self) -> LockState {
        LockState {
            doors_locked: self.doors_locked(),
            elevators_locked: self.elevators_locked(),
            communications_locked: self.communications_locked(),
        }
    }
}

/// Multi-floor grid of rooms
#[derive(Debug)]
pub struct Building {
    floors: usize,
    rows: usize,
    cols: usize,
    cells: Vec<Option<Room>>,
    locks: LockFlags,
}

impl Building {
    /// Generate a random building
    pub fn generate<R: Rng + ?Sized>(
        floors: usize,
        rows: usize,
        cols: usize,
        rng: &mut R,
    ) -> Result<Self, LayoutError> {
        Self::from_plan(&generate(floors, rows, cols, rng)?)
    }

    /// Build from text rows, see [`FloorPlan::parse`]
    pub fn from_text(floors: &[&[&str]], connectors: Connectors) -> Result<Self, LayoutError> {
        Self::from_plan(&FloorPlan::parse(floors, connectors)?)
    }

    /// Assemble rooms, adjacency and vertical links from a plan
    pub fn from_plan(plan: &FloorPlan) -> Result<Self, LayoutError> {
        let (floors, rows, cols) = (plan.floors(), plan.rows(), plan.cols());
        if floors == 0 || rows == 0 || cols == 0 {
            return Err(LayoutError::EmptyGrid { floors, rows, cols });
        }

        let mut cells = Vec::with_capacity(floors * rows * cols);
        for floor in 0..floors {
            for row in 0..rows {
                for col in 0..cols {
                    cells.push(
                        plan.kind(floor, row, col)
                            .map(|kind| Room::new(Position::new(floor, row, col), kind)),
                    );
                }
            }
        }

        let mut building = Self {
            floors,
            rows,
            cols,
            cells,
            locks: LockFlags::default(),
        };
        building.link_neighbours();
        building.link_connectors(plan.connectors())?;

        debug!(
            floors,
            rows,
            cols,
            rooms = building.rooms().count(),
            "Building assembled"
        );
        Ok(building)
    }

    fn link_neighbours(&mut self) {
        let mut edges = Vec::new();
        for room in self.rooms() {
            let pos = room.position();
            let right = Position::new(pos.floor, pos.row, pos.col + 1);
            let down = Position::new(pos.floor, pos.row + 1, pos.col);
            for other in [right, down] {
                if let Some(neighbour) = self.room(other) {
                    if room.kind().is_corridor() || neighbour.kind().is_corridor() {
                        edges.push((pos, other));
                    }
                }
            }
        }
        for (a, b) in edges {
            if let Some(room) = self.room_mut(a) {
                room.adjacent.insert(b);
            }
            if let Some(room) = self.room_mut(b) {
                room.adjacent.insert(a);
            }
        }
    }

    fn link_connectors(&mut self, connectors: &Connectors) -> Result<(), LayoutError> {
        let every_floor: Vec<usize> = (0..self.floors).collect();
        if let Some(cell) = connectors.elevator {
            self.link_shaft(ConnectorKind::Elevator, cell, &every_floor)?;
        }
        if let Some(cell) = connectors.emergency_stair {
            self.link_shaft(ConnectorKind::EmergencyStair, cell, &every_floor)?;
        }
        for stair in &connectors.stairs {
            if stair.lower_floor + 1 >= self.floors {
                return Err(LayoutError::InvalidPlan(format!(
                    "stair above floor {} leaves the building",
                    stair.lower_floor
                )));
            }
            self.link_shaft(
                ConnectorKind::Stair,
                (stair.row, stair.col),
                &[stair.lower_floor, stair.lower_floor + 1],
            )?;
        }
        Ok(())
    }

    /// Link the same cell on each of `floors` to the cell on every other one
    fn link_shaft(
        &mut self,
        connector: ConnectorKind,
        (row, col): (usize, usize),
        floors: &[usize],
    ) -> Result<(), LayoutError> {
        let positions: Vec<Position> = floors
            .iter()
            .map(|floor| Position::new(*floor, row, col))
            .collect();

        for pos in &positions {
            match self.room(*pos) {
                Some(room) if room.kind().is_corridor() => {}
                _ => {
                    return Err(LayoutError::InvalidPlan(format!(
                        "{connector:?} at {pos} is not on a corridor"
                    )));
                }
            }
        }

        for pos in &positions {
            let others = positions.iter().filter(|other| *other != pos).copied();
            if let Some(room) = self.room_mut(*pos) {
                let links = match connector {
                    ConnectorKind::Elevator => &mut room.elevator_links,
                    ConnectorKind::Stair => &mut room.stair_links,
                    ConnectorKind::EmergencyStair => &mut room.emergency_stair_links,
                };
                links.extend(others);
            }
        }
        Ok(())
    }

    pub fn floors(&self) -> usize {
        self.floors
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    fn index(&self, pos: Position) -> Option<usize> {
        (pos.floor < self.floors && pos.row < self.rows && pos.col < self.cols)
            .then(|| (pos.floor * self.rows + pos.row) * self.cols + pos.col)
    }

    pub fn room(&self, pos: Position) -> Option<&Room> {
        self.index(pos).and_then(|idx| self.cells[idx].as_ref())
    }

    fn room_mut(&mut self, pos: Position) -> Option<&mut Room> {
        self.index(pos).and_then(|idx| self.cells[idx].as_mut())
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.cells.iter().flatten()
    }

    pub fn rooms_on_floor(&self, floor: usize) -> impl Iterator<Item = &Room> {
        self.rooms().filter(move |room| room.position().floor == floor)
    }

    pub fn exits(&self) -> impl Iterator<Item = &Room> {
        self.rooms().filter(|room| room.kind().is_exit())
    }

    /// Rooms with at least one vertical link
    pub fn connectors(&self) -> impl Iterator<Item = &Room> {
        self.rooms().filter(|room| room.has_vertical_links())
    }

    pub fn locks(&self) -> &LockFlags {
        &self.locks
    }

    pub fn lock_state(&self) -> LockState {
        self.locks.snapshot()
    }

    /// Set a room on fire; `false` when there is no room there
    pub fn ignite(&self, pos: Position) -> bool {
        self.room(pos).map(|room| room.set_on_fire(true)).is_some()
    }

    /// Close a room off; `false` when there is no room there
    pub fn mark_unavailable(&self, pos: Position) -> bool {
        self.room(pos)
            .map(|room| room.set_unavailable(true))
            .is_some()
    }

    /// Clear fire and damage from a room; `false` when there is no room there
    pub fn clear_hazards(&self, pos: Position) -> bool {
        self.room(pos).map(Room::clear_hazards).is_some()
    }

    /// Lift every lockdown flag
    pub fn restore_systems(&self) {
        for target in LockTarget::ALL {
            self.locks.set(target, false);
        }
        self.locks.compromised.store(false, Ordering::SeqCst);
    }

    pub fn unoccupied_rooms(&self) -> Vec<Position> {
        self.rooms()
            .filter(|room| !room.is_occupied())
            .map(Room::position)
            .collect()
    }

    /// Move one occupant between rooms; `None` means outside the building
    pub fn move_occupant(&self, from: Option<Position>, to: Option<Position>) {
        if let Some(room) = from.and_then(|pos| self.room(pos)) {
            room.leave();
        }
        if let Some(room) = to.and_then(|pos| self.room(pos)) {
            room.enter();
        }
    }

    pub fn room_views(&self) -> Vec<RoomView> {
        self.rooms().map(Room::view).collect()
    }

    /// Text rendering of one floor
    ///
    /// Room glyphs as in text plans, `F` for fire, `X` for unavailable,
    /// lowercase while occupied, `.` for no room.
    pub fn render_floor(&self, floor: usize) -> String {
        let mut out = String::with_capacity(self.rows * (self.cols + 1));
        let _ = writeln!(out, "floor {floor}");
        for row in 0..self.rows {
            for col in 0..self.cols {
                let glyph = match self.room(Position::new(floor, row, col)) {
                    None => '.',
                    Some(room) if room.is_on_fire() => 'F',
                    Some(room) if room.is_unavailable() => 'X',
                    Some(room) if room.is_occupied() => room.kind().glyph().to_ascii_lowercase(),
                    Some(room) => room.kind().glyph(),
                };
                out.push(glyph);
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn two_floors() -> Building {
        Building::from_text(
            &[&["NHS", "HHH", "EH."], &["SHH", "HHH", "RHS"]],
            Connectors {
                elevator: Some((1, 0)),
                emergency_stair: Some((1, 2)),
                stairs: vec![StairPosition {
                    lower_floor: 0,
                    row: 0,
                    col: 1,
                }],
            },
        )
        .unwrap()
    }

    #[test]
    fn test_adjacency_requires_a_corridor_endpoint() {
        let building = Building::from_text(&[&["SR", "HS"]], Connectors::default()).unwrap();
        let store = building.room(Position::new(0, 0, 0)).unwrap();
        // store and restroom side by side are not connected
        assert!(!store.adjacent().contains(&Position::new(0, 0, 1)));
        assert!(store.adjacent().contains(&Position::new(0, 1, 0)));

        let hallway = building.room(Position::new(0, 1, 0)).unwrap();
        assert_eq!(hallway.adjacent().len(), 2);
    }

    #[test]
    fn test_connector_links() {
        let building = two_floors();

        let elevator = building.room(Position::new(0, 1, 0)).unwrap();
        assert!(elevator
            .links(ConnectorKind::Elevator)
            .contains(&Position::new(1, 1, 0)));
        assert!(elevator.links(ConnectorKind::Stair).is_empty());

        let stair_top = building.room(Position::new(1, 0, 1)).unwrap();
        assert!(stair_top
            .links(ConnectorKind::Stair)
            .contains(&Position::new(0, 0, 1)));

        assert_eq!(building.connectors().count(), 6);
        assert_eq!(building.exits().count(), 2);
    }

    #[test]
    fn test_connector_on_store_is_rejected() {
        let result = Building::from_text(
            &[&["HS"], &["HH"]],
            Connectors {
                elevator: Some((0, 1)),
                ..Connectors::default()
            },
        );
        assert!(matches!(result, Err(LayoutError::InvalidPlan(_))));
    }

    #[test]
    fn test_hazard_entry_points() {
        let building = two_floors();
        let pos = Position::new(0, 1, 1);

        assert!(building.ignite(pos));
        assert!(building.room(pos).unwrap().is_on_fire());
        assert!(building.mark_unavailable(pos));
        assert!(building.clear_hazards(pos));
        assert!(building.room(pos).unwrap().is_safe());

        // no room at (2, 2) on floor 0
        assert!(!building.ignite(Position::new(0, 2, 2)));
    }

    #[test]
    fn test_locks_and_restore() {
        let building = two_floors();
        let locks = building.locks();

        assert!(!locks.set(LockTarget::Elevators, true));
        assert!(locks.toggle(LockTarget::Doors));
        assert_eq!(
            building.lock_state(),
            LockState {
                doors_locked: true,
                elevators_locked: true,
                communications_locked: false,
            }
        );
        assert!(!locks.is_compromised());

        assert!(!locks.compromise(LockTarget::Communications));
        assert!(locks.is_compromised());
        assert!(locks.communications_locked());

        building.restore_systems();
        assert_eq!(building.lock_state(), LockState::default());
        assert!(!locks.is_compromised());
    }

    #[test]
    fn test_occupancy_and_render() {
        let building = two_floors();
        let pos = Position::new(0, 0, 2);
        building.move_occupant(None, Some(pos));
        assert!(!building.unoccupied_rooms().contains(&pos));

        building.ignite(Position::new(0, 1, 1));
        let text = building.render_floor(0);
        assert_eq!(text, "floor 0\nNHs\nHFH\nEH.\n");

        building.move_occupant(Some(pos), None);
        assert!(building.unoccupied_rooms().contains(&pos));
    }

    #[test]
    fn test_generated_building_links_every_floor() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let building = Building::generate(3, 5, 5, &mut rng).unwrap();

        let elevators: Vec<_> = building
            .rooms()
            .filter(|room| !room.links(ConnectorKind::Elevator).is_empty())
            .collect();
        assert_eq!(elevators.len(), 3);
        for room in elevators {
            assert_eq!(room.links(ConnectorKind::Elevator).len(), 2);
        }
        assert_eq!(building.room_views().len(), 75);
    }
}
