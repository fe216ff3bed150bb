//! Review broadcast state: the facilitator's active filter and focused card.
//!
//! Toggle behavior (clicking a focused card to close it) is a client concern;
//! the server only applies the value it is given.

use huddle_core::ids::CardId;
use huddle_core::model::{Category, ReviewState};

#[derive(Debug, Default)]
pub struct ReviewBroadcastState {
    state: ReviewState,
}

impl ReviewBroadcastState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> ReviewState {
        self.state
    }

    /// Switch the filter. Always clears the focus.
    pub fn set_category(&mut self, category: Category) -> ReviewState {
        self.state = ReviewState {
            active_category: category,
            focused_card_id: None,
        };
        self.state
    }

    /// Set or clear the focused card. Never changes the category.
    pub fn set_focus(&mut self, card_id: Option<CardId>) -> Option<CardId> {
        self.state.focused_card_id = card_id;
        card_id
    }

    /// Back to `{Idea, none}`.
    pub fn reset(&mut self) -> ReviewState {
        self.state = ReviewState::default();
        self.state
    }
}
