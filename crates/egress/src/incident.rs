// Incident records kept by the coordinator
//
// An incident moves Active -> Dispatched -> Resolved and never backwards.
// The log is shared with the simulation so the final report can read it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::time::{Duration, Instant};
use uuid::Uuid;

use crate::messages::IncidentKind;
use crate::types::Position;

/// Lifecycle of an incident
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Active,
    Dispatched,
    Resolved,
}

impl IncidentStatus {
    pub fn is_open(self) -> bool {
        self != IncidentStatus::Resolved
    }
}

/// Incident errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IncidentError {
    #[error("incident {id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        id: Uuid,
        from: IncidentStatus,
        to: IncidentStatus,
    },

    #[error("incident {0} not found")]
    NotFound(Uuid),
}

/// A status change and when it happened
#[derive(Debug, Clone, Serialize)]
pub struct Transition {
    pub status: IncidentStatus,
    pub at: DateTime<Utc>,
}

/// One reported emergency
#[derive(Debug, Clone, Serialize)]
pub struct Incident {
    pub id: Uuid,
    pub kind: IncidentKind,
    pub location: Option<Position>,
    pub status: IncidentStatus,
    pub history: Vec<Transition>,
    pub dispatch_attempts: u32,
    /// Set once re-dispatching has been given up
    pub stalled: bool,
    #[serde(skip)]
    last_dispatch: Option<Instant>,
}

impl Incident {
    pub fn new(kind: IncidentKind, location: Option<Position>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            location,
            status: IncidentStatus::Active,
            history: vec![Transition {
                status: IncidentStatus::Active,
                at: Utc::now(),
            }],
            dispatch_attempts: 0,
            stalled: false,
            last_dispatch: None,
        }
    }

    /// Move strictly forward in the lifecycle
    pub fn advance(&mut self, to: IncidentStatus) -> Result<(), IncidentError> {
        if to <= self.status {
            return Err(IncidentError::InvalidTransition {
                id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.history.push(Transition {
            status: to,
            at: Utc::now(),
        });
        Ok(())
    }

    /// Count a dispatch; the first one moves the incident to Dispatched
    pub fn record_dispatch(&mut self, now: Instant) -> Result<(), IncidentError> {
        match self.status {
            IncidentStatus::Active => self.advance(IncidentStatus::Dispatched)?,
            IncidentStatus::Dispatched => {}
            IncidentStatus::Resolved => {
                return Err(IncidentError::InvalidTransition {
                    id: self.id,
                    from: self.status,
                    to: IncidentStatus::Dispatched,
                });
            }
        }
        self.dispatch_attempts += 1;
        self.last_dispatch = Some(now);
        Ok(())
    }

    /// Dispatched, not stalled, and waiting longer than `timeout` since the last dispatch
    pub fn dispatch_overdue(&self, now: Instant, timeout: Duration) -> bool {
        self.status == IncidentStatus::Dispatched
            && !self.stalled
            && self
                .last_dispatch
                .is_some_and(|at| now.saturating_duration_since(at) >= timeout)
    }
}

/// Shared list of incidents in arrival order
#[derive(Debug, Clone, Default)]
pub struct IncidentLog {
    incidents: Arc<RwLock<Vec<Incident>>>,
}

impl IncidentLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new Active incident
    pub fn open(&self, kind: IncidentKind, location: Option<Position>) -> Uuid {
        let incident = Incident::new(kind, location);
        let id = incident.id;
        self.incidents.write().push(incident);
        id
    }

    /// Apply `f` to one incident under the write lock
    pub fn update<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Incident) -> Result<T, IncidentError>,
    ) -> Result<T, IncidentError> {
        let mut incidents = self.incidents.write();
        let incident = incidents
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(IncidentError::NotFound(id))?;
        f(incident)
    }

    /// Oldest open incident of `kind` at `location`
    pub fn find_open(&self, kind: IncidentKind, location: Option<Position>) -> Option<Uuid> {
        self.incidents
            .read()
            .iter()
            .find(|i| i.status.is_open() && i.kind == kind && i.location == location)
            .map(|i| i.id)
    }

    /// Oldest open incident of `kind`, wherever it is
    pub fn find_open_kind(&self, kind: IncidentKind) -> Option<Uuid> {
        self.incidents
            .read()
            .iter()
            .find(|i| i.status.is_open() && i.kind == kind)
            .map(|i| i.id)
    }

    pub fn any_open(&self, kind: IncidentKind) -> bool {
        self.find_open_kind(kind).is_some()
    }

    pub fn snapshot(&self) -> Vec<Incident> {
        self.incidents.read().clone()
    }

    pub fn len(&self) -> usize {
        self.incidents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
