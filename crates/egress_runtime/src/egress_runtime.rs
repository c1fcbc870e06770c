//! Egress Runtime
//!
//! In-process actor runtime used by the simulation. Every actor owns a bounded
//! mailbox, runs on its own tokio task and is reachable by a stable string
//! address through the shared [`Postman`](actor::Postman).

pub mod actor;

pub use actor::*;
