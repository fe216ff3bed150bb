//! Outbound broadcasts (server → clients) and the scope each one targets.
//!
//! On the wire a broadcast is `{ type, timestamp, data }`; this module owns
//! `type` and `data`, the transport adds `timestamp`.

use serde::{Deserialize, Serialize};

use crate::ids::{CardId, ConnectionId, PairId};
use crate::model::{Card, Category, PairView, Participant, PhaseName, ReviewState};

/// Set of connections that receive a broadcast.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Every live connection.
    All,
    /// The members of one pair.
    Pair(PairId),
    /// A single connection.
    Connection(ConnectionId),
}

impl Scope {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &str {
        match self {
            Self::All => "all",
            Self::Pair(id) => id.as_str(),
            Self::Connection(id) => id.as_str(),
        }
    }
}

/// Broadcast payloads, tagged by wire type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum Broadcast {
    RosterUpdate {
        participants: Vec<Participant>,
        pairs: Vec<PairView>,
    },
    PhaseChange {
        phase: PhaseName,
        deadline: Option<i64>,
    },
    CardsUpdate {
        pair_id: PairId,
        cards: Vec<Card>,
    },
    ReviewStateUpdate {
        active_category: Category,
        focused_card_id: Option<CardId>,
    },
    ReviewFocusUpdate {
        focused_card_id: Option<CardId>,
    },
}

impl Broadcast {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RosterUpdate { .. } => "roster_update",
            Self::PhaseChange { .. } => "phase_change",
            Self::CardsUpdate { .. } => "cards_update",
            Self::ReviewStateUpdate { .. } => "review_state_update",
            Self::ReviewFocusUpdate { .. } => "review_focus_update",
        }
    }

    pub fn review_state(state: ReviewState) -> Self {
        Self::ReviewStateUpdate {
            active_category: state.active_category,
            focused_card_id: state.focused_card_id,
        }
    }
}

/// A broadcast addressed to a scope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub scope: Scope,
    pub broadcast: Broadcast,
}

impl Envelope {
    pub fn all(broadcast: Broadcast) -> Self {
        Self {
            scope: Scope::All,
            broadcast,
        }
    }

    pub fn pair(pair_id: PairId, broadcast: Broadcast) -> Self {
        Self {
            scope: Scope::Pair(pair_id),
            broadcast,
        }
    }
}

/// Full view of the session, returned to a single connection on request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub phase: PhaseName,
    pub deadline: Option<i64>,
    pub participants: Vec<Participant>,
    pub pairs: Vec<PairView>,
    pub review: ReviewState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn phase_change_wire_shape() {
        let b = Broadcast::PhaseChange {
            phase: PhaseName::Active,
            deadline: Some(1_700_000_600_000),
        };
        let json = serde_json::to_value(&b).unwrap();
        assert_eq!(
            json,
            json!({"type": "phase_change", "data": {"phase": "active", "deadline": 1_700_000_600_000_i64}})
        );
        assert_eq!(b.event_type(), "phase_change");
    }

    #[test]
    fn review_focus_update_clears_with_null() {
        let b = Broadcast::ReviewFocusUpdate { focused_card_id: None };
        let json = serde_json::to_value(&b).unwrap();
        assert_eq!(json["type"], "review_focus_update");
        assert!(json["data"]["focusedCardId"].is_null());
    }

    #[test]
    fn review_state_update_from_state() {
        let b = Broadcast::review_state(ReviewState::default());
        let json = serde_json::to_value(&b).unwrap();
        assert_eq!(json["data"], json!({"activeCategory": "Idea", "focusedCardId": null}));
    }

    #[test]
    fn event_type_matches_serde_tag() {
        let samples = [
            Broadcast::RosterUpdate {
                participants: vec![],
                pairs: vec![],
            },
            Broadcast::CardsUpdate {
                pair_id: PairId::from_raw("pair_1"),
                cards: vec![],
            },
            Broadcast::review_state(ReviewState::default()),
        ];
        for b in samples {
            let json = serde_json::to_value(&b).unwrap();
            assert_eq!(json["type"], b.event_type());
        }
    }

    #[test]
    fn scope_labels() {
        assert_eq!(Scope::All.label(), "all");
        assert_eq!(Scope::Pair(PairId::from_raw("pair_9")).label(), "pair_9");
    }
}
