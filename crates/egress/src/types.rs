use serde::{Deserialize, Serialize};

use egress_runtime::ActorError;

use crate::building::LayoutError;
use crate::incident::IncidentError;
use crate::messages::DecodeError;

/// Grid coordinates of a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub floor: usize,
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub fn new(floor: usize, row: usize, col: usize) -> Self {
        Self { floor, row, col }
    }

    /// Manhattan distance across row, column and floor
    pub fn manhattan(&self, other: &Position) -> usize {
        self.planar_distance(other) + self.floor.abs_diff(other.floor)
    }

    /// Manhattan distance ignoring the floor
    pub fn planar_distance(&self, other: &Position) -> usize {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col)
    }

    /// Same cell on another floor
    pub fn on_floor(&self, floor: usize) -> Position {
        Position { floor, ..*self }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, floor {})", self.row, self.col, self.floor)
    }
}

/// How fast an actor moves and which vertical transit it favours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MobilityClass {
    #[default]
    Normal,
    Reduced,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),

    #[error("Actor error: {0}")]
    Actor(#[from] ActorError),

    #[error("Message error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Incident error: {0}")]
    Incident(#[from] IncidentError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}
