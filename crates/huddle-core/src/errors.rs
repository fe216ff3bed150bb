use serde::Serialize;

use crate::ids::{CardId, ConnectionId, PairId};
use crate::model::PhaseName;

/// Failure classes a rejected command falls into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The frame could not be understood (unknown method, bad params).
    InvalidRequest,
    /// The command is well-formed but not valid in the current state.
    PreconditionViolation,
    /// The command names an entity that does not exist.
    ReferenceNotFound,
    /// The sender is not allowed to issue the command.
    UnauthorizedCommand,
}

/// Typed error hierarchy for session commands.
/// Every failure is scoped to the offending command; none is fatal.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    // Request shape
    #[error("method not found: {0}")]
    UnknownMethod(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("session duration must be at least one minute, got {0}")]
    InvalidDuration(u32),

    // Preconditions
    #[error("connection {0} is already registered")]
    AlreadyRegistered(ConnectionId),
    #[error("participant {0} is already paired")]
    AlreadyPaired(ConnectionId),
    #[error("cannot pair {0} with itself")]
    SelfPair(ConnectionId),
    #[error("connection {0} is not a participant")]
    NotAParticipant(ConnectionId),
    #[error("cannot {action} while the session is in {phase}")]
    InvalidPhase {
        action: &'static str,
        phase: PhaseName,
    },

    // References
    #[error("unknown participant: {0}")]
    UnknownParticipant(ConnectionId),
    #[error("unknown pair: {0}")]
    UnknownPair(PairId),
    #[error("unknown card: {0}")]
    UnknownCard(CardId),

    // Authorization
    #[error("connection {0} has not registered")]
    NotRegistered(ConnectionId),
    #[error("{method} is restricted to the facilitator")]
    Unauthorized { method: &'static str },
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownMethod(_) | Self::InvalidParams(_) | Self::InvalidDuration(_) => {
                ErrorKind::InvalidRequest
            }
            Self::AlreadyRegistered(_)
            | Self::AlreadyPaired(_)
            | Self::SelfPair(_)
            | Self::NotAParticipant(_)
            | Self::InvalidPhase { .. } => ErrorKind::PreconditionViolation,
            Self::UnknownParticipant(_) | Self::UnknownPair(_) | Self::UnknownCard(_) => {
                ErrorKind::ReferenceNotFound
            }
            Self::NotRegistered(_) | Self::Unauthorized { .. } => ErrorKind::UnauthorizedCommand,
        }
    }

    /// Stable wire code for the error response.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownMethod(_) => "METHOD_NOT_FOUND",
            Self::InvalidParams(_) => "INVALID_PARAMS",
            Self::InvalidDuration(_) => "INVALID_DURATION",
            Self::AlreadyRegistered(_) => "ALREADY_REGISTERED",
            Self::AlreadyPaired(_) => "ALREADY_PAIRED",
            Self::SelfPair(_) => "SELF_PAIR",
            Self::NotAParticipant(_) => "NOT_A_PARTICIPANT",
            Self::InvalidPhase { .. } => "INVALID_PHASE",
            Self::UnknownParticipant(_) => "UNKNOWN_PARTICIPANT",
            Self::UnknownPair(_) => "UNKNOWN_PAIR",
            Self::UnknownCard(_) => "UNKNOWN_CARD",
            Self::NotRegistered(_) => "NOT_REGISTERED",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
        }
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        SessionError::InvalidParams(e.to_string())
    }
}
