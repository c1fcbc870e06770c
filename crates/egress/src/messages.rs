//! Messages exchanged between simulation actors
//!
//! On the wire every message is an [`Envelope`] with a kind tag and a JSON
//! payload. Receivers decode it once into [`Message`] and match on that.

use serde::{Deserialize, Serialize};

use egress_runtime::{ActorContext, ActorError, ActorResult, Envelope};

use crate::types::Position;

/// Well-known actor addresses
pub mod address {
    pub const COORDINATOR: &str = "bms";
    pub const INCIDENT_SOURCE: &str = "incident_source";
    pub const FIREMAN: &str = "fireman";
    pub const COP: &str = "cop";
    pub const GAS_RESPONDER: &str = "gas_responder";
    pub const IT_RESPONDER: &str = "it_responder";

    pub fn occupant(index: usize) -> String {
        format!("occupant{index}")
    }
}

/// Kind of emergency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    Fire,
    Earthquake,
    GasLeak,
    SecurityThreat,
    CyberAttack,
}

impl IncidentKind {
    pub const ALL: [IncidentKind; 5] = [
        IncidentKind::Fire,
        IncidentKind::Earthquake,
        IncidentKind::GasLeak,
        IncidentKind::SecurityThreat,
        IncidentKind::CyberAttack,
    ];

    /// Relative likelihood of this kind being the primary incident
    pub fn weight(self) -> f64 {
        match self {
            IncidentKind::Fire => 0.35,
            IncidentKind::Earthquake => 0.25,
            IncidentKind::GasLeak => 0.2,
            IncidentKind::SecurityThreat => 0.1,
            IncidentKind::CyberAttack => 0.1,
        }
    }

    /// Responder role authorized to resolve this kind
    pub fn responder(self) -> ResponderRole {
        match self {
            IncidentKind::Fire | IncidentKind::Earthquake => ResponderRole::Fireman,
            IncidentKind::SecurityThreat => ResponderRole::Cop,
            IncidentKind::GasLeak => ResponderRole::GasResponder,
            IncidentKind::CyberAttack => ResponderRole::ItResponder,
        }
    }
}

impl std::fmt::Display for IncidentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IncidentKind::Fire => "fire",
            IncidentKind::Earthquake => "earthquake",
            IncidentKind::GasLeak => "gas_leak",
            IncidentKind::SecurityThreat => "security_threat",
            IncidentKind::CyberAttack => "cyber_attack",
        };
        f.write_str(name)
    }
}

/// Responder specialisation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponderRole {
    Fireman,
    Cop,
    GasResponder,
    ItResponder,
}

impl ResponderRole {
    pub const ALL: [ResponderRole; 4] = [
        ResponderRole::Fireman,
        ResponderRole::Cop,
        ResponderRole::GasResponder,
        ResponderRole::ItResponder,
    ];

    pub fn address(self) -> &'static str {
        match self {
            ResponderRole::Fireman => address::FIREMAN,
            ResponderRole::Cop => address::COP,
            ResponderRole::GasResponder => address::GAS_RESPONDER,
            ResponderRole::ItResponder => address::IT_RESPONDER,
        }
    }

    pub fn handles(self, kind: IncidentKind) -> bool {
        kind.responder() == self
    }
}

/// Incident kind plus the affected room, if there is one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentPayload {
    pub incident: IncidentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Position>,
}

impl IncidentPayload {
    pub fn new(incident: IncidentKind, location: Option<Position>) -> Self {
        Self { incident, location }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct ElevatorStatusPayload {
    unlocked: bool,
}

/// Decoded message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Incident source to coordinator
    EmergencyAlert(IncidentPayload),
    /// Coordinator to the matching responder
    Dispatch(IncidentPayload),
    /// Responder to coordinator once the hazard is cleared
    ResolutionReport(IncidentPayload),
    /// Coordinator to every occupant
    EvacuationOrder(IncidentPayload),
    /// Traveller to coordinator before a cross-floor route
    ElevatorRequest,
    /// Coordinator's answer to an elevator request
    ElevatorStatus { unlocked: bool },
}

/// Message decoding errors
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown message kind '{0}'")]
    UnknownKind(String),

    #[error("malformed {kind} payload: {source}")]
    Malformed {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Message {
    pub const EMERGENCY_ALERT: &'static str = "EmergencyAlert";
    pub const DISPATCH: &'static str = "Dispatch";
    pub const RESOLUTION_REPORT: &'static str = "ResolutionReport";
    pub const EVACUATION_ORDER: &'static str = "EvacuationOrder";
    pub const ELEVATOR_REQUEST: &'static str = "ElevatorRequest";
    pub const ELEVATOR_STATUS: &'static str = "ElevatorStatus";

    /// Wire kind tag
    pub fn kind(&self) -> &'static str {
        match self {
            Message::EmergencyAlert(_) => Self::EMERGENCY_ALERT,
            Message::Dispatch(_) => Self::DISPATCH,
            Message::ResolutionReport(_) => Self::RESOLUTION_REPORT,
            Message::EvacuationOrder(_) => Self::EVACUATION_ORDER,
            Message::ElevatorRequest => Self::ELEVATOR_REQUEST,
            Message::ElevatorStatus { .. } => Self::ELEVATOR_STATUS,
        }
    }

    pub fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Message::EmergencyAlert(p)
            | Message::Dispatch(p)
            | Message::ResolutionReport(p)
            | Message::EvacuationOrder(p) => serde_json::to_value(p),
            Message::ElevatorRequest => Ok(serde_json::Value::Null),
            Message::ElevatorStatus { unlocked } => {
                serde_json::to_value(ElevatorStatusPayload { unlocked: *unlocked })
            }
        }
    }

    /// Wrap into an envelope addressed `from` -> `to`
    pub fn to_envelope(
        &self,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Result<Envelope, serde_json::Error> {
        Ok(Envelope::new(from, to, self.kind(), self.payload()?))
    }

    /// Decode an inbound envelope
    pub fn decode(envelope: &Envelope) -> Result<Message, DecodeError> {
        let incident = || -> Result<IncidentPayload, DecodeError> {
            envelope
                .parse_payload()
                .map_err(|source| DecodeError::Malformed {
                    kind: envelope.kind.clone(),
                    source,
                })
        };

        match envelope.kind.as_str() {
            Self::EMERGENCY_ALERT => Ok(Message::EmergencyAlert(incident()?)),
            Self::DISPATCH => Ok(Message::Dispatch(incident()?)),
            Self::RESOLUTION_REPORT => Ok(Message::ResolutionReport(incident()?)),
            Self::EVACUATION_ORDER => Ok(Message::EvacuationOrder(incident()?)),
            Self::ELEVATOR_REQUEST => Ok(Message::ElevatorRequest),
            Self::ELEVATOR_STATUS => {
                let status: ElevatorStatusPayload =
                    envelope
                        .parse_payload()
                        .map_err(|source| DecodeError::Malformed {
                            kind: envelope.kind.clone(),
                            source,
                        })?;
                Ok(Message::ElevatorStatus {
                    unlocked: status.unlocked,
                })
            }
            other => Err(DecodeError::UnknownKind(other.to_string())),
        }
    }
}

/// Send a message from the context's actor
pub async fn post(ctx: &ActorContext, to: &str, message: &Message) -> ActorResult<()> {
    let envelope = message
        .to_envelope(&ctx.address, to)
        .map_err(|e| ActorError::MessageError(e.to_string()))?;
    ctx.deliver(envelope).await
}
