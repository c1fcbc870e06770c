//! Floor plan generation
//!
//! Produces a [`FloorPlan`]: one grid of room kinds per floor plus the
//! positions of the vertical connectors. Generated and hand-written plans go
//! through the same assembly in [`Building::from_plan`](super::Building::from_plan).

use std::collections::{HashSet, VecDeque};

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use super::RoomKind;

/// Relative frequency of each kind before the plan is fixed up
const KIND_WEIGHTS: [(RoomKind, f64); 3] = [
    (RoomKind::Hallway, 0.6),
    (RoomKind::Store, 0.3),
    (RoomKind::Restroom, 0.1),
];

/// Layout errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("building dimensions must be non-zero, got {floors}x{rows}x{cols}")]
    EmptyGrid {
        floors: usize,
        rows: usize,
        cols: usize,
    },

    #[error("floor {floor} has no free border cell left for the {purpose}")]
    NoBorderHallway { floor: usize, purpose: &'static str },

    #[error("invalid floor plan: {0}")]
    InvalidPlan(String),
}

/// Normal stair between `lower_floor` and the floor above it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StairPosition {
    pub lower_floor: usize,
    pub row: usize,
    pub col: usize,
}

/// Grid cells holding vertical transit
///
/// Elevator and emergency stair occupy the same `(row, col)` on every floor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connectors {
    pub elevator: Option<(usize, usize)>,
    pub emergency_stair: Option<(usize, usize)>,
    pub stairs: Vec<StairPosition>,
}

/// Room kinds for every cell of every floor, `None` for empty cells
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloorPlan {
    floors: usize,
    rows: usize,
    cols: usize,
    cells: Vec<Option<RoomKind>>,
    connectors: Connectors,
}

impl FloorPlan {
    /// Parse a plan from one string per grid row, per floor
    ///
    /// Glyphs: `H` hallway, `S` store, `R` restroom, `N` normal exit,
    /// `E` emergency exit, `.` no room.
    pub fn parse(floors: &[&[&str]], connectors: Connectors) -> Result<Self, LayoutError> {
        let rows = floors.first().map(|f| f.len()).unwrap_or(0);
        let cols = floors
            .first()
            .and_then(|f| f.first())
            .map(|r| r.chars().count())
            .unwrap_or(0);
        if floors.is_empty() || rows == 0 || cols == 0 {
            return Err(LayoutError::EmptyGrid {
                floors: floors.len(),
                rows,
                cols,
            });
        }

        let mut cells = Vec::with_capacity(floors.len() * rows * cols);
        for (floor, lines) in floors.iter().enumerate() {
            if lines.len() != rows {
                return Err(LayoutError::InvalidPlan(format!(
                    "floor {floor} has {} rows, expected {rows}",
                    lines.len()
                )));
            }
            for (row, line) in lines.iter().enumerate() {
                if line.chars().count() != cols {
                    return Err(LayoutError::InvalidPlan(format!(
                        "floor {floor} row {row} has {} cells, expected {cols}",
                        line.chars().count()
                    )));
                }
                for glyph in line.chars() {
                    let cell = match glyph {
                        '.' => None,
                        other => Some(RoomKind::from_glyph(other).ok_or_else(|| {
                            LayoutError::InvalidPlan(format!("unknown glyph '{other}'"))
                        })?),
                    };
                    cells.push(cell);
                }
            }
        }

        Ok(Self {
            floors: floors.len(),
            rows,
            cols,
            cells,
            connectors,
        })
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

    pub fn connectors(&self) -> &Connectors {
        &self.connectors
    }

    pub fn kind(&self, floor: usize, row: usize, col: usize) -> Option<RoomKind> {
        if floor >= self.floors || row >= self.rows || col >= self.cols {
            return None;
        }
        self.cells[(floor * self.rows + row) * self.cols + col]
    }
}

/// Generate a random plan satisfying the corridor invariants
pub fn generate<R: Rng + ?Sized>(
    floors: usize,
    rows: usize,
    cols: usize,
    rng: &mut R,
) -> Result<FloorPlan, LayoutError> {
    if floors == 0 || rows == 0 || cols == 0 {
        return Err(LayoutError::EmptyGrid { floors, rows, cols });
    }

    let mut grids: Vec<FloorGrid> = (0..floors)
        .map(|_| {
            let mut grid = FloorGrid::random(rows, cols, rng);
            grid.ensure_hallway_access(rng);
            grid.connect_components();
            grid
        })
        .collect();

    let mut reserved = Reservations::new(floors);
    let mut connectors = Connectors::default();

    if floors > 1 {
        let every_floor: Vec<usize> = (0..floors).collect();
        connectors.elevator = Some(reserved.claim(&mut grids, &every_floor, rng, "elevator")?);
        connectors.emergency_stair =
            Some(reserved.claim(&mut grids, &every_floor, rng, "emergency stair")?);
        for lower_floor in 0..floors - 1 {
            let (row, col) =
                reserved.claim(&mut grids, &[lower_floor, lower_floor + 1], rng, "stair")?;
            connectors.stairs.push(StairPosition {
                lower_floor,
                row,
                col,
            });
        }
    }

    let exits = [
        (RoomKind::NormalExit, "normal exit"),
        (RoomKind::NormalExit, "normal exit"),
        (RoomKind::EmergencyExit, "emergency exit"),
    ];
    let mut placed = Vec::with_capacity(exits.len());
    for (kind, purpose) in exits {
        placed.push((reserved.claim(&mut grids, &[0], rng, purpose)?, kind));
    }
    for (cell, kind) in placed {
        grids[0].set(cell, kind);
    }
    // An exit may have been the only hallway next to a store
    grids[0].ensure_hallway_access(rng);
    grids[0].connect_components();

    let cells = grids
        .into_iter()
        .flat_map(|grid| grid.cells.into_iter().map(Some))
        .collect();

    Ok(FloorPlan {
        floors,
        rows,
        cols,
        cells,
        connectors,
    })
}

type Cell = (usize, usize);

struct FloorGrid {
    rows: usize,
    cols: usize,
    cells: Vec<RoomKind>,
}

impl FloorGrid {
    fn random<R: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut R) -> Self {
        let cells = (0..rows * cols)
            .map(|_| {
                KIND_WEIGHTS
                    .choose_weighted(rng, |(_, weight)| *weight)
                    .map(|(kind, _)| *kind)
                    // weights are constant and positive
                    .unwrap_or(RoomKind::Hallway)
            })
            .collect();
        Self { rows, cols, cells }
    }

    fn get(&self, (row, col): Cell) -> RoomKind {
        self.cells[row * self.cols + col]
    }

    fn set(&mut self, (row, col): Cell, kind: RoomKind) {
        self.cells[row * self.cols + col] = kind;
    }

    fn neighbours(&self, (row, col): Cell) -> Vec<Cell> {
        let mut out = Vec::with_capacity(4);
        if row > 0 {
            out.push((row - 1, col));
        }
        if row + 1 < self.rows {
            out.push((row + 1, col));
        }
        if col > 0 {
            out.push((row, col - 1));
        }
        if col + 1 < self.cols {
            out.push((row, col + 1));
        }
        out
    }

    fn is_border(&self, (row, col): Cell) -> bool {
        row == 0 || col == 0 || row + 1 == self.rows || col + 1 == self.cols
    }

    /// Give every store and restroom a hallway neighbour
    fn ensure_hallway_access<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for row in 0..self.rows {
            for col in 0..self.cols {
                let cell = (row, col);
                if self.get(cell).is_corridor() {
                    continue;
                }
                let neighbours = self.neighbours(cell);
                if neighbours
                    .iter()
                    .any(|n| self.get(*n) == RoomKind::Hallway)
                {
                    continue;
                }
                let convertible: Vec<Cell> = neighbours
                    .into_iter()
                    .filter(|n| !self.get(*n).is_corridor())
                    .collect();
                match convertible.choose(rng) {
                    Some(target) => self.set(*target, RoomKind::Hallway),
                    None => self.set(cell, RoomKind::Hallway),
                }
            }
        }
    }

    /// Connected groups of corridor cells, 4-neighbour adjacency
    fn corridor_components(&self) -> Vec<Vec<Cell>> {
        let mut seen = vec![false; self.cells.len()];
        let mut components = Vec::new();

        for start in 0..self.cells.len() {
            if seen[start] || !self.cells[start].is_corridor() {
                continue;
            }
            seen[start] = true;
            let mut component = Vec::new();
            let mut queue = VecDeque::from([(start / self.cols, start % self.cols)]);
            while let Some(cell) = queue.pop_front() {
                component.push(cell);
                for next in self.neighbours(cell) {
                    let idx = next.0 * self.cols + next.1;
                    if !seen[idx] && self.cells[idx].is_corridor() {
                        seen[idx] = true;
                        queue.push_back(next);
                    }
                }
            }
            components.push(component);
        }
        components
    }

    /// Merge corridor components by carving hallways between the closest pair
    fn connect_components(&mut self) {
        loop {
            let components = self.corridor_components();
            if components.len() <= 1 {
                return;
            }

            let mut best: Option<(usize, Cell, Cell)> = None;
            for (i, a) in components.iter().enumerate() {
                for b in components.iter().skip(i + 1) {
                    for &ca in a {
                        for &cb in b {
                            let d = ca.0.abs_diff(cb.0) + ca.1.abs_diff(cb.1);
                            if best.is_none_or(|(bd, _, _)| d < bd) {
                                best = Some((d, ca, cb));
                            }
                        }
                    }
                }
            }

            match best {
                Some((_, from, to)) => self.carve(from, to),
                None => return,
            }
        }
    }

    /// L-shaped hallway: along the row first, then along the column
    fn carve(&mut self, from: Cell, to: Cell) {
        let (mut row, mut col) = from;
        while row != to.0 {
            row = if row < to.0 { row + 1 } else { row - 1 };
            self.promote((row, col));
        }
        while col != to.1 {
            col = if col < to.1 { col + 1 } else { col - 1 };
            self.promote((row, col));
        }
    }

    fn promote(&mut self, cell: Cell) {
        if !self.get(cell).is_corridor() {
            self.set(cell, RoomKind::Hallway);
        }
    }
}

/// Border cells already claimed for a connector or exit, per floor
struct Reservations {
    taken: Vec<HashSet<Cell>>,
}

impl Reservations {
    fn new(floors: usize) -> Self {
        Self {
            taken: vec![HashSet::new(); floors],
        }
    }

    /// Reserve one border cell shared by `floors`, promoting it to hallway where needed
    ///
    /// Cells that are already hallway on every floor win, then cells that are
    /// hallway on the first listed floor, then any free border cell.
    fn claim<R: Rng + ?Sized>(
        &mut self,
        grids: &mut [FloorGrid],
        floors: &[usize],
        rng: &mut R,
        purpose: &'static str,
    ) -> Result<Cell, LayoutError> {
        let first = floors.first().copied().unwrap_or(0);
        let grid = &grids[first];

        let free: Vec<Cell> = (0..grid.rows)
            .flat_map(|row| (0..grid.cols).map(move |col| (row, col)))
            .filter(|cell| grid.is_border(*cell))
            .filter(|cell| floors.iter().all(|f| !self.taken[*f].contains(cell)))
            .filter(|cell| floors.iter().all(|f| !grids[*f].get(*cell).is_exit()))
            .collect();

        let all_hallway: Vec<Cell> = free
            .iter()
            .copied()
            .filter(|cell| floors.iter().all(|f| grids[*f].get(*cell) == RoomKind::Hallway))
            .collect();
        let first_hallway: Vec<Cell> = free
            .iter()
            .copied()
            .filter(|cell| grid.get(*cell) == RoomKind::Hallway)
            .collect();

        let chosen = [all_hallway, first_hallway, free]
            .into_iter()
            .find_map(|tier| tier.choose(rng).copied())
            .ok_or(LayoutError::NoBorderHallway {
                floor: first,
                purpose,
            })?;

        for &floor in floors {
            if grids[floor].get(chosen) != RoomKind::Hallway {
                grids[floor].set(chosen, RoomKind::Hallway);
                grids[floor].connect_components();
            }
            self.taken[floor].insert(chosen);
        }
        Ok(chosen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn corridor_cells(plan: &FloorPlan, floor: usize) -> Vec<Cell> {
        let mut out = Vec::new();
        for row in 0..plan.rows() {
            for col in 0..plan.cols() {
                if plan.kind(floor, row, col).is_some_and(|k| k.is_corridor()) {
                    out.push((row, col));
                }
            }
        }
        out
    }

    fn reachable(plan: &FloorPlan, floor: usize, start: Cell) -> HashSet<Cell> {
        let mut seen = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some((row, col)) = queue.pop_front() {
            let candidates = [
                (row.wrapping_sub(1), col),
                (row + 1, col),
                (row, col.wrapping_sub(1)),
                (row, col + 1),
            ];
            for next in candidates {
                if plan
                    .kind(floor, next.0, next.1)
                    .is_some_and(|k| k.is_corridor())
                    && seen.insert(next)
                {
                    queue.push_back(next);
                }
            }
        }
        seen
    }

    #[test]
    fn test_corridors_connected_across_seeds() {
        for seed in 0..100u64 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let rows = 3 + (seed as usize % 5);
            let cols = 3 + (seed as usize % 4);
            let floors = 1 + (seed as usize % 3);
            let plan = generate(floors, rows, cols, &mut rng).unwrap();

            for floor in 0..floors {
                let corridors = corridor_cells(&plan, floor);
                assert!(!corridors.is_empty(), "seed {seed} floor {floor}");
                let seen = reachable(&plan, floor, corridors[0]);
                assert_eq!(seen.len(), corridors.len(), "seed {seed} floor {floor}");
            }
        }
    }

    #[test]
    fn test_stores_and_restrooms_touch_a_hallway() {
        for seed in 0..100u64 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let plan = generate(2, 5, 6, &mut rng).unwrap();
            for floor in 0..2 {
                for row in 0..5 {
                    for col in 0..6 {
                        let Some(kind) = plan.kind(floor, row, col) else {
                            continue;
                        };
                        if kind.is_corridor() {
                            continue;
                        }
                        let has_hallway = [
                            (row.wrapping_sub(1), col),
                            (row + 1, col),
                            (row, col.wrapping_sub(1)),
                            (row, col + 1),
                        ]
                        .iter()
                        .any(|(r, c)| plan.kind(floor, *r, *c) == Some(RoomKind::Hallway));
                        assert!(has_hallway, "seed {seed} ({floor}, {row}, {col})");
                    }
                }
            }
        }
    }

    #[test]
    fn test_ground_floor_exits() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let plan = generate(3, 4, 4, &mut rng).unwrap();

        let count = |floor: usize, kind: RoomKind| {
            (0..4)
                .flat_map(|r| (0..4).map(move |c| (r, c)))
                .filter(|(r, c)| plan.kind(floor, *r, *c) == Some(kind))
                .count()
        };
        assert_eq!(count(0, RoomKind::NormalExit), 2);
        assert_eq!(count(0, RoomKind::EmergencyExit), 1);
        assert_eq!(count(1, RoomKind::NormalExit), 0);
        assert_eq!(count(2, RoomKind::EmergencyExit), 0);
    }

    #[test]
    fn test_connectors_are_distinct_border_hallways() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let plan = generate(3, 4, 5, &mut rng).unwrap();
        let connectors = plan.connectors();

        let elevator = connectors.elevator.unwrap();
        let emergency = connectors.emergency_stair.unwrap();
        assert_ne!(elevator, emergency);
        assert_eq!(connectors.stairs.len(), 2);

        for floor in 0..3 {
            for (row, col) in [elevator, emergency] {
                assert_eq!(plan.kind(floor, row, col), Some(RoomKind::Hallway));
            }
        }
        for stair in &connectors.stairs {
            let cell = (stair.row, stair.col);
            assert_ne!(cell, elevator);
            assert_ne!(cell, emergency);
            for floor in [stair.lower_floor, stair.lower_floor + 1] {
                assert_eq!(plan.kind(floor, stair.row, stair.col), Some(RoomKind::Hallway));
            }
        }
    }

    #[test]
    fn test_single_floor_has_no_connectors() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let plan = generate(1, 5, 5, &mut rng).unwrap();
        assert_eq!(plan.connectors(), &Connectors::default());
    }

    #[test]
    fn test_too_small_grid_fails() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(matches!(
            generate(1, 1, 1, &mut rng),
            Err(LayoutError::NoBorderHallway { floor: 0, .. })
        ));
        assert!(matches!(
            generate(0, 3, 3, &mut rng),
            Err(LayoutError::EmptyGrid { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_ragged_rows_and_unknown_glyphs() {
        let ragged: &[&[&str]] = &[&["HH", "H"]];
        assert!(matches!(
            FloorPlan::parse(ragged, Connectors::default()),
            Err(LayoutError::InvalidPlan(_))
        ));

        let unknown: &[&[&str]] = &[&["HX"]];
        assert!(matches!(
            FloorPlan::parse(unknown, Connectors::default()),
            Err(LayoutError::InvalidPlan(_))
        ));

        let ok: &[&[&str]] = &[&["NHS", ".HR"]];
        let plan = FloorPlan::parse(ok, Connectors::default()).unwrap();
        assert_eq!(plan.kind(0, 1, 0), None);
        assert_eq!(plan.kind(0, 0, 0), Some(RoomKind::NormalExit));
        assert_eq!(plan.kind(0, 1, 2), Some(RoomKind::Restroom));
    }
}
