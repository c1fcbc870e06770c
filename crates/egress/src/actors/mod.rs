//! Simulation actors
//!
//! Every actor runs on `egress_runtime`: it decodes envelopes into
//! [`Message`](crate::messages::Message) at the mailbox boundary and makes
//! time-based progress in `on_tick`.

pub mod coordinator;
pub mod occupant;
pub mod responder;
pub mod source;
pub mod travel;

#[cfg(test)]
pub(crate) mod testing;

pub use coordinator::Coordinator;
pub use occupant::Occupant;
pub use responder::Responder;
pub use source::IncidentSource;
pub use travel::{Pacing, Phase, TravelEvent, TravelState, Traveller};

use tokio::time::Duration;

use crate::config::SimulationConfig;
use crate::navigation::{Navigator, RouteOptions, Strategy};
use crate::types::{MobilityClass, Position};

/// Settings shared by every moving actor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TravelSettings {
    pub tick: Duration,
    pub pacing: Pacing,
    pub strategy: Strategy,
    pub evacuation_retry: Duration,
    pub elevator_reply_timeout: Duration,
}

impl TravelSettings {
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            tick: config.timing.tick(),
            pacing: Pacing::from_timing(&config.timing),
            strategy: config.navigation.strategy,
            evacuation_retry: config.timing.evacuation_retry(),
            elevator_reply_timeout: config.timing.elevator_reply_timeout(),
        }
    }

    pub(crate) fn traveller(
        &self,
        navigator: Navigator,
        start: Position,
        mobility: MobilityClass,
        enter_hazardous_goal: bool,
    ) -> Traveller {
        let mut options = RouteOptions::default()
            .with_strategy(self.strategy)
            .with_mobility(mobility);
        options.enter_hazardous_goal = enter_hazardous_goal;
        Traveller::new(navigator, start, options, self.pacing, self.evacuation_retry)
    }
}

impl Default for TravelSettings {
    fn default() -> Self {
        Self::from_config(&SimulationConfig::default())
    }
}
