//! Pairing manager: forms two-participant groups.
//!
//! Pairing is one-way. Once a participant has a `pair_id` it can never be
//! paired again, so a connection belongs to at most one pair.

use huddle_core::errors::SessionError;
use huddle_core::ids::{ConnectionId, PairId};
use huddle_core::model::Pair;
use indexmap::IndexMap;

use crate::registry::ConnectionRegistry;

/// All pairs in creation order.
#[derive(Debug, Default)]
pub struct PairingManager {
    pairs: IndexMap<PairId, Pair>,
}

impl PairingManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pair two currently-unpaired participants.
    ///
    /// Validates both ids before touching any state, so a rejected call
    /// leaves the registry and existing pairs unchanged.
    pub fn create_pair(
        &mut self,
        registry: &mut ConnectionRegistry,
        id_a: &ConnectionId,
        id_b: &ConnectionId,
    ) -> Result<&Pair, SessionError> {
        if id_a == id_b {
            return Err(SessionError::SelfPair(id_a.clone()));
        }
        for id in [id_a, id_b] {
            let participant = registry
                .get(id)
                .ok_or_else(|| SessionError::UnknownParticipant(id.clone()))?;
            if participant.is_facilitator() {
                return Err(SessionError::NotAParticipant(id.clone()));
            }
            // Either record marks the connection as taken.
            if participant.is_paired() || self.pair_of(id).is_some() {
                return Err(SessionError::AlreadyPaired(id.clone()));
            }
        }

        let pair_id = PairId::new();
        registry.assign_pair(id_a, &pair_id);
        registry.assign_pair(id_b, &pair_id);

        let pair = Pair {
            pair_id: pair_id.clone(),
            member_ids: [id_a.clone(), id_b.clone()],
        };
        tracing::info!(pair_id = %pair_id, a = %id_a, b = %id_b, "pair created");
        Ok(&*self.pairs.entry(pair_id).or_insert(pair))
    }

    pub fn get(&self, pair_id: &PairId) -> Option<&Pair> {
        self.pairs.get(pair_id)
    }

    pub fn contains(&self, pair_id: &PairId) -> bool {
        self.pairs.contains_key(pair_id)
    }

    /// The pair a connection belongs to, if any.
    pub fn pair_of(&self, connection_id: &ConnectionId) -> Option<&Pair> {
        self.pairs.values().find(|p| p.contains(connection_id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pair> {
        self.pairs.values()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
