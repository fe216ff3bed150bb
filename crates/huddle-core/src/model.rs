//! Session data model: participants, pairs, cards, phase and review state.
//!
//! All wire-facing types serialize with camelCase keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CardId, ConnectionId, PairId};

/// Role a connection declares when it registers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Facilitator,
    Participant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Facilitator => "facilitator",
            Self::Participant => "participant",
        }
    }
}

/// Card category. Also the review filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[default]
    Idea,
    Issue,
    Impression,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Idea, Category::Issue, Category::Impression];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idea => "Idea",
            Self::Issue => "Issue",
            Self::Impression => "Impression",
        }
    }
}

/// A connected, registered client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub connection_id: ConnectionId,
    pub role: Role,
    pub display_name: String,
    pub pair_id: Option<PairId>,
}

impl Participant {
    pub fn is_facilitator(&self) -> bool {
        self.role == Role::Facilitator
    }

    pub fn is_paired(&self) -> bool {
        self.pair_id.is_some()
    }
}

/// Two participants grouped together. Membership never changes once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pair {
    pub pair_id: PairId,
    pub member_ids: [ConnectionId; 2],
}

impl Pair {
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.member_ids.iter().any(|m| m == id)
    }
}

/// A submitted contribution. Immutable after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: CardId,
    pub author_name: String,
    pub category: Category,
    pub reflection_text: String,
    pub next_action_text: String,
}

/// Content of a card before the ledger assigns it an id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CardDraft {
    pub author_name: String,
    pub category: Category,
    pub reflection_text: String,
    pub next_action_text: String,
}

/// A pair together with its card ledger, as shown on the roster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairView {
    pub pair_id: PairId,
    pub member_ids: [ConnectionId; 2],
    pub cards: Vec<Card>,
}

/// Global session phase. Ordered: `Lobby < Active < Review`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseName {
    Lobby,
    Active,
    Review,
}

impl PhaseName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lobby => "lobby",
            Self::Active => "active",
            Self::Review => "review",
        }
    }
}

impl std::fmt::Display for PhaseName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase state. Only `Active` carries a deadline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionPhase {
    #[default]
    Lobby,
    Active { deadline: DateTime<Utc> },
    Review,
}

impl SessionPhase {
    pub fn name(&self) -> PhaseName {
        match self {
            Self::Lobby => PhaseName::Lobby,
            Self::Active { .. } => PhaseName::Active,
            Self::Review => PhaseName::Review,
        }
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Active { deadline } => Some(*deadline),
            Self::Lobby | Self::Review => None,
        }
    }

    /// Deadline as Unix epoch milliseconds, the form clients render.
    pub fn deadline_ms(&self) -> Option<i64> {
        self.deadline().map(|d| d.timestamp_millis())
    }
}

/// Facilitator-controlled review view shared by every client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewState {
    pub active_category: Category,
    pub focused_card_id: Option<CardId>,
}
