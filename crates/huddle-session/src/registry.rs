//! Connection registry: every registered connection with its role and pairing.

use huddle_core::errors::SessionError;
use huddle_core::ids::{ConnectionId, PairId};
use huddle_core::model::{Participant, Role};
use indexmap::IndexMap;

/// Name used for a facilitator that registers without one.
pub const FACILITATOR_PLACEHOLDER: &str = "Facilitator";

/// Registered connections in join order.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    participants: IndexMap<ConnectionId, Participant>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Display names are trimmed; an empty name gets
    /// a placeholder. Duplicate display names are allowed.
    pub fn register(
        &mut self,
        connection_id: ConnectionId,
        role: Role,
        display_name: Option<&str>,
    ) -> Result<&Participant, SessionError> {
        if self.participants.contains_key(&connection_id) {
            return Err(SessionError::AlreadyRegistered(connection_id));
        }

        let display_name = match display_name.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => placeholder_name(&connection_id, role),
        };

        let participant = Participant {
            connection_id: connection_id.clone(),
            role,
            display_name,
            pair_id: None,
        };
        let entry = self.participants.entry(connection_id).or_insert(participant);
        Ok(&*entry)
    }

    /// Remove a connection. Its pair and cards are left untouched.
    pub fn remove(&mut self, connection_id: &ConnectionId) -> Option<Participant> {
        self.participants.shift_remove(connection_id)
    }

    pub fn get(&self, connection_id: &ConnectionId) -> Option<&Participant> {
        self.participants.get(connection_id)
    }

    /// Look up the sender of a command; unregistered senders are unauthorized.
    pub fn require(&self, connection_id: &ConnectionId) -> Result<&Participant, SessionError> {
        self.get(connection_id)
            .ok_or_else(|| SessionError::NotRegistered(connection_id.clone()))
    }

    /// Record a pairing. Callers must have checked the participant is unpaired.
    pub(crate) fn assign_pair(&mut self, connection_id: &ConnectionId, pair_id: &PairId) {
        if let Some(p) = self.participants.get_mut(connection_id) {
            debug_assert!(p.pair_id.is_none(), "pair_id is set at most once");
            p.pair_id = Some(pair_id.clone());
        }
    }

    /// Participants matching a predicate, in join order.
    pub fn list(&self, predicate: impl Fn(&Participant) -> bool) -> Vec<Participant> {
        self.participants
            .values()
            .filter(|p| predicate(p))
            .cloned()
            .collect()
    }

    pub fn with_role(&self, role: Role) -> Vec<Participant> {
        self.list(|p| p.role == role)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

/// Placeholder display name for a connection that registered without one.
pub fn placeholder_name(connection_id: &ConnectionId, role: Role) -> String {
    match role {
        Role::Facilitator => FACILITATOR_PLACEHOLDER.to_string(),
        Role::Participant => {
            let short: String = connection_id.suffix().chars().take(4).collect();
            format!("Guest-{short}")
        }
    }
}
