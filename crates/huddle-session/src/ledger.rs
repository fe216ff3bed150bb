//! Card ledger: per-pair append-only card store.
//!
//! Card ids come from one counter for the whole session, so ordering by id
//! is ordering by server arrival.

use std::collections::HashMap;

use huddle_core::errors::SessionError;
use huddle_core::ids::{CardId, PairId};
use huddle_core::model::{Card, CardDraft, Category};

use crate::pairing::PairingManager;

#[derive(Debug)]
pub struct CardLedger {
    cards: HashMap<PairId, Vec<Card>>,
    next_id: CardId,
}

impl Default for CardLedger {
    fn default() -> Self {
        Self {
            cards: HashMap::new(),
            next_id: CardId::new(1),
        }
    }
}

impl CardLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a card to a pair's ledger.
    ///
    /// Text fields are trimmed; the reflection and next action must not be
    /// empty. An unknown pair is a `ReferenceNotFound` failure.
    pub fn submit(
        &mut self,
        pairs: &PairingManager,
        pair_id: &PairId,
        draft: CardDraft,
    ) -> Result<&Card, SessionError> {
        if !pairs.contains(pair_id) {
            return Err(SessionError::UnknownPair(pair_id.clone()));
        }
        let reflection_text = required(&draft.reflection_text, "reflectionText")?;
        let next_action_text = required(&draft.next_action_text, "nextActionText")?;

        let card = Card {
            id: self.next_id,
            author_name: draft.author_name.trim().to_string(),
            category: draft.category,
            reflection_text,
            next_action_text,
        };
        self.next_id = self.next_id.next();

        tracing::debug!(pair_id = %pair_id, card_id = %card.id, category = card.category.as_str(), "card submitted");
        let ledger = self.cards.entry(pair_id.clone()).or_default();
        ledger.push(card);
        Ok(&ledger[ledger.len() - 1])
    }

    /// A pair's cards in submission order. Empty for pairs with no cards.
    pub fn cards(&self, pair_id: &PairId) -> &[Card] {
        self.cards.get(pair_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn find(&self, card_id: CardId) -> Option<&Card> {
        self.cards.values().flatten().find(|c| c.id == card_id)
    }

    pub fn total(&self) -> usize {
        self.cards.values().map(Vec::len).sum()
    }

    /// Tab-separated export of one category, pair creation order then
    /// submission order: `<n>\t<author>\t<reflection>` per line, newlines in
    /// the reflection collapsed to spaces.
    pub fn export(&self, pairs: &PairingManager, category: Category) -> (String, usize) {
        let lines: Vec<String> = pairs
            .iter()
            .flat_map(|p| self.cards(&p.pair_id))
            .filter(|c| c.category == category)
            .enumerate()
            .map(|(i, c)| {
                let reflection = c.reflection_text.replace("\r\n", " ").replace('\n', " ");
                format!("{}\t{}\t{}", i + 1, c.author_name, reflection)
            })
            .collect();
        let count = lines.len();
        (lines.join("\n"), count)
    }
}

fn required(value: &str, field: &str) -> Result<String, SessionError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SessionError::InvalidParams(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConnectionRegistry;
    use assert_matches::assert_matches;
    use huddle_core::ids::ConnectionId;
    use huddle_core::model::Role;

    fn draft(author: &str, category: Category, reflection: &str) -> CardDraft {
        CardDraft {
            author_name: author.into(),
            category,
            reflection_text: reflection.into(),
            next_action_text: "follow up".into(),
        }
    }

    fn paired() -> (PairingManager, PairId, PairId) {
        let mut reg = ConnectionRegistry::new();
        for id in ["conn_a", "conn_b", "conn_c", "conn_d"] {
            reg.register(ConnectionId::from_raw(id), Role::Participant, Some(id)).unwrap();
        }
        let mut pm = PairingManager::new();
        let first = pm
            .create_pair(&mut reg, &ConnectionId::from_raw("conn_a"), &ConnectionId::from_raw("conn_b"))
            .unwrap()
            .pair_id
            .clone();
        let second = pm
            .create_pair(&mut reg, &ConnectionId::from_raw("conn_c"), &ConnectionId::from_raw("conn_d"))
            .unwrap()
            .pair_id
            .clone();
        (pm, first, second)
    }

    #[test]
    fn submit_appends_in_arrival_order() {
        let (pm, pair, _) = paired();
        let mut ledger = CardLedger::new();
        let first = ledger.submit(&pm, &pair, draft("Ann", Category::Idea, "one")).unwrap().id;
        let second = ledger.submit(&pm, &pair, draft("Bo", Category::Issue, "two")).unwrap().id;
        assert!(first < second);
        let texts: Vec<&str> = ledger.cards(&pair).iter().map(|c| c.reflection_text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two"]);
    }

    #[test]
    fn ids_are_global_across_pairs() {
        let (pm, first, second) = paired();
        let mut ledger = CardLedger::new();
        let a = ledger.submit(&pm, &first, draft("Ann", Category::Idea, "x")).unwrap().id;
        let b = ledger.submit(&pm, &second, draft("Cy", Category::Idea, "y")).unwrap().id;
        assert_eq!(b, a.next());
        assert_eq!(ledger.total(), 2);
        assert_eq!(ledger.find(b).unwrap().author_name, "Cy");
    }

    #[test]
    fn unknown_pair_rejected_without_consuming_id() {
        let (pm, pair, _) = paired();
        let mut ledger = CardLedger::new();
        let err = ledger
            .submit(&pm, &PairId::from_raw("pair_missing"), draft("Ann", Category::Idea, "x"))
            .unwrap_err();
        assert_matches!(err, SessionError::UnknownPair(_));
        assert_eq!(ledger.total(), 0);
        let card = ledger.submit(&pm, &pair, draft("Ann", Category::Idea, "x")).unwrap();
        assert_eq!(card.id, CardId::new(1));
    }

    #[test]
    fn empty_reflection_rejected() {
        let (pm, pair, _) = paired();
        let mut ledger = CardLedger::new();
        let err = ledger.submit(&pm, &pair, draft("Ann", Category::Idea, "   ")).unwrap_err();
        assert_matches!(err, SessionError::InvalidParams(msg) if msg.contains("reflectionText"));
        assert!(ledger.cards(&pair).is_empty());
    }

    #[test]
    fn export_filters_category_and_flattens_newlines() {
        let (pm, first, second) = paired();
        let mut ledger = CardLedger::new();
        ledger.submit(&pm, &second, draft("Cy", Category::Idea, "later pair")).unwrap();
        ledger.submit(&pm, &first, draft("Ann", Category::Idea, "line one\nline two")).unwrap();
        ledger.submit(&pm, &first, draft("Bo", Category::Issue, "not exported")).unwrap();

        let (text, count) = ledger.export(&pm, Category::Idea);
        assert_eq!(count, 2);
        assert_eq!(text, "1\tAnn\tline one line two\n2\tCy\tlater pair");
    }

    #[test]
    fn export_empty_category() {
        let (pm, _, _) = paired();
        let ledger = CardLedger::new();
        assert_eq!(ledger.export(&pm, Category::Impression), (String::new(), 0));
    }
}
