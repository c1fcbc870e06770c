//! Egress - Building Emergency Response Simulation
//!
//! This crate provides the simulation core:
//! - Procedurally generated multi-floor building topology
//! - Hazard and lockdown state shared by every actor
//! - Hazard-aware navigation (greedy and priority search)
//! - Coordinator, incident source, occupant and responder actors running on
//!   `egress_runtime`

// Re-export the actor runtime
pub use egress_runtime;

pub mod actors;
pub mod building;
pub mod config;
pub mod incident;
pub mod messages;
pub mod navigation;
pub mod simulation;
pub mod tracking;
pub mod types;

// Re-exports for convenience
pub use building::{Building, LockState, Room, RoomKind};
pub use config::SimulationConfig;
pub use simulation::{Simulation, SimulationReport};
pub use types::*;
