//! Inbound commands (client → server).
//!
//! A command arrives as a method name plus a JSON params object. Parsing is
//! strict about types but tolerant about a missing or `null` params value
//! for methods that take no arguments.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::errors::SessionError;
use crate::ids::{CardId, ConnectionId, PairId};
use crate::model::{CardDraft, Category, Role};

/// A parsed inbound command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Register {
        role: Role,
        display_name: Option<String>,
    },
    CreatePair {
        id_a: ConnectionId,
        id_b: ConnectionId,
    },
    StartSession {
        duration_minutes: u32,
    },
    SubmitCard {
        pair_id: PairId,
        draft: CardDraft,
    },
    EnterReview,
    SetReviewCategory {
        category: Category,
    },
    SetFocus {
        card_id: Option<CardId>,
    },
    GetState,
    ExportCards {
        category: Category,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterParams {
    role: Role,
    #[serde(default, alias = "name")]
    display_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePairParams {
    id_a: ConnectionId,
    id_b: ConnectionId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartSessionParams {
    duration_minutes: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitCardParams {
    pair_id: PairId,
    author_name: String,
    category: Category,
    reflection_text: String,
    next_action_text: String,
}

#[derive(Deserialize)]
struct CategoryParams {
    category: Category,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetFocusParams {
    #[serde(default)]
    card_id: Option<CardId>,
}

fn params<T: DeserializeOwned>(value: &Value) -> Result<T, SessionError> {
    let value = if value.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        value.clone()
    };
    Ok(serde_json::from_value(value)?)
}

impl Command {
    /// Every method name the server understands.
    pub const METHODS: [&'static str; 9] = [
        "register",
        "create_pair",
        "start_session",
        "submit_card",
        "enter_review",
        "set_review_category",
        "set_focus",
        "get_state",
        "export_cards",
    ];

    /// The static name of a known method, or `None` for anything else.
    pub fn known_method(method: &str) -> Option<&'static str> {
        Self::METHODS.iter().copied().find(|m| *m == method)
    }

    /// Parse a method name and its params into a command.
    pub fn parse(method: &str, raw: &Value) -> Result<Self, SessionError> {
        let command = match method {
            "register" => {
                let p: RegisterParams = params(raw)?;
                Self::Register {
                    role: p.role,
                    display_name: p.display_name,
                }
            }
            "create_pair" => {
                let p: CreatePairParams = params(raw)?;
                Self::CreatePair {
                    id_a: p.id_a,
                    id_b: p.id_b,
                }
            }
            "start_session" => {
                let p: StartSessionParams = params(raw)?;
                Self::StartSession {
                    duration_minutes: p.duration_minutes,
                }
            }
            "submit_card" => {
                let p: SubmitCardParams = params(raw)?;
                Self::SubmitCard {
                    pair_id: p.pair_id,
                    draft: CardDraft {
                        author_name: p.author_name,
                        category: p.category,
                        reflection_text: p.reflection_text,
                        next_action_text: p.next_action_text,
                    },
                }
            }
            "enter_review" => Self::EnterReview,
            "set_review_category" => {
                let p: CategoryParams = params(raw)?;
                Self::SetReviewCategory {
                    category: p.category,
                }
            }
            "set_focus" => {
                let p: SetFocusParams = params(raw)?;
                Self::SetFocus { card_id: p.card_id }
            }
            "get_state" => Self::GetState,
            "export_cards" => {
                let p: CategoryParams = params(raw)?;
                Self::ExportCards {
                    category: p.category,
                }
            }
            other => return Err(SessionError::UnknownMethod(other.to_string())),
        };
        Ok(command)
    }

    /// Wire method name.
    pub fn method(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::CreatePair { .. } => "create_pair",
            Self::StartSession { .. } => "start_session",
            Self::SubmitCard { .. } => "submit_card",
            Self::EnterReview => "enter_review",
            Self::SetReviewCategory { .. } => "set_review_category",
            Self::SetFocus { .. } => "set_focus",
            Self::GetState => "get_state",
            Self::ExportCards { .. } => "export_cards",
        }
    }

    /// Whether only a facilitator connection may issue this command.
    pub fn requires_facilitator(&self) -> bool {
        matches!(
            self,
            Self::CreatePair { .. }
                | Self::StartSession { .. }
                | Self::EnterReview
                | Self::SetReviewCategory { .. }
                | Self::SetFocus { .. }
                | Self::ExportCards { .. }
        )
    }
}
