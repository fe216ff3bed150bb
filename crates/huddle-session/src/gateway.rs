//! Event gateway: the session aggregate and its command dispatch.
//!
//! [`SessionGateway`] owns every component exclusively. Each call runs to
//! completion and returns the reply for the sender plus the broadcasts to
//! fan out, in emission order. A failed command returns no broadcasts and
//! leaves state untouched.

use chrono::{DateTime, Utc};
use huddle_core::commands::Command;
use huddle_core::errors::SessionError;
use huddle_core::events::{Broadcast, Envelope, SessionSnapshot};
use huddle_core::ids::{CardId, ConnectionId, PairId};
use huddle_core::model::{CardDraft, Category, PairView, PhaseName, Role, SessionPhase};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::ledger::CardLedger;
use crate::pairing::PairingManager;
use crate::phase::PhaseController;
use crate::registry::ConnectionRegistry;
use crate::review::ReviewBroadcastState;

/// Outcome of one inbound command.
#[derive(Debug)]
pub struct Dispatch {
    /// Response for the sender only.
    pub reply: Result<Value, SessionError>,
    /// Broadcasts, in the order they must be delivered.
    pub outbound: Vec<Envelope>,
    /// Connections that joined a pair scope during this command.
    pub scope_joins: Vec<(ConnectionId, PairId)>,
}

impl Dispatch {
    fn rejected(error: SessionError) -> Self {
        Self {
            reply: Err(error),
            outbound: Vec::new(),
            scope_joins: Vec::new(),
        }
    }

    fn ok(value: Value) -> Self {
        Self {
            reply: Ok(value),
            outbound: Vec::new(),
            scope_joins: Vec::new(),
        }
    }

    fn with(mut self, envelope: Envelope) -> Self {
        self.outbound.push(envelope);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.reply.is_ok()
    }
}

#[derive(Debug, Default)]
pub struct SessionGateway {
    registry: ConnectionRegistry,
    pairing: PairingManager,
    phase: PhaseController,
    ledger: CardLedger,
    review: ReviewBroadcastState,
}

impl SessionGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and handle a raw request. Parse failures are rejections like
    /// any other.
    pub fn dispatch(
        &mut self,
        sender: &ConnectionId,
        method: &str,
        params: &Value,
        now: DateTime<Utc>,
    ) -> Dispatch {
        match Command::parse(method, params) {
            Ok(command) => self.handle(sender, command, now),
            Err(e) => {
                warn!(connection_id = %sender, method, code = e.code(), error = %e, "malformed command");
                Dispatch::rejected(e)
            }
        }
    }

    pub fn handle(&mut self, sender: &ConnectionId, command: Command, now: DateTime<Utc>) -> Dispatch {
        let method = command.method();
        if let Err(e) = self.authorize(sender, &command) {
            warn!(connection_id = %sender, method, code = e.code(), "command rejected");
            return Dispatch::rejected(e);
        }

        let result = match command {
            Command::Register { role, display_name } => {
                self.register(sender, role, display_name.as_deref())
            }
            Command::CreatePair { id_a, id_b } => self.create_pair(&id_a, &id_b),
            Command::StartSession { duration_minutes } => self.start(duration_minutes, now),
            Command::SubmitCard { pair_id, draft } => self.submit_card(&pair_id, draft),
            Command::EnterReview => Ok(self.enter_review()),
            Command::SetReviewCategory { category } => Ok(self.set_review_category(category)),
            Command::SetFocus { card_id } => self.set_focus(card_id),
            Command::GetState => Ok(Dispatch::ok(json!(self.snapshot()))),
            Command::ExportCards { category } => Ok(self.export_cards(category)),
        };

        match result {
            Ok(dispatch) => {
                debug!(connection_id = %sender, method, broadcasts = dispatch.outbound.len(), "command applied");
                dispatch
            }
            Err(e) => {
                warn!(connection_id = %sender, method, code = e.code(), error = %e, "command rejected");
                Dispatch::rejected(e)
            }
        }
    }

    fn authorize(&self, sender: &ConnectionId, command: &Command) -> Result<(), SessionError> {
        if matches!(command, Command::Register { .. }) {
            return Ok(());
        }
        let participant = self.registry.require(sender)?;
        if command.requires_facilitator() && !participant.is_facilitator() {
            return Err(SessionError::Unauthorized {
                method: command.method(),
            });
        }
        Ok(())
    }

    fn register(
        &mut self,
        sender: &ConnectionId,
        role: Role,
        display_name: Option<&str>,
    ) -> Result<Dispatch, SessionError> {
        let participant = self.registry.register(sender.clone(), role, display_name)?.clone();
        info!(
            connection_id = %sender,
            role = role.as_str(),
            display_name = %participant.display_name,
            "registered"
        );
        let reply = json!({
            "participant": participant,
            "state": self.snapshot(),
        });
        Ok(Dispatch::ok(reply).with(self.roster()))
    }

    fn create_pair(&mut self, id_a: &ConnectionId, id_b: &ConnectionId) -> Result<Dispatch, SessionError> {
        let pair = self.pairing.create_pair(&mut self.registry, id_a, id_b)?.clone();
        let mut dispatch = Dispatch::ok(json!(pair)).with(self.roster());
        dispatch.scope_joins = pair
            .member_ids
            .iter()
            .map(|member| (member.clone(), pair.pair_id.clone()))
            .collect();
        Ok(dispatch)
    }

    fn start(&mut self, duration_minutes: u32, now: DateTime<Utc>) -> Result<Dispatch, SessionError> {
        let deadline = self.phase.start(duration_minutes, now)?.timestamp_millis();
        let broadcast = Broadcast::PhaseChange {
            phase: PhaseName::Active,
            deadline: Some(deadline),
        };
        Ok(Dispatch::ok(json!({ "phase": PhaseName::Active, "deadline": deadline }))
            .with(Envelope::all(broadcast)))
    }

    fn submit_card(&mut self, pair_id: &PairId, draft: CardDraft) -> Result<Dispatch, SessionError> {
        let card = self.ledger.submit(&self.pairing, pair_id, draft)?.clone();
        let cards = Broadcast::CardsUpdate {
            pair_id: pair_id.clone(),
            cards: self.ledger.cards(pair_id).to_vec(),
        };
        Ok(Dispatch::ok(json!(card))
            .with(Envelope::pair(pair_id.clone(), cards))
            .with(self.roster()))
    }

    /// Phase change first, then the reset review state.
    fn enter_review(&mut self) -> Dispatch {
        self.phase.enter_review();
        let state = self.review.reset();
        Dispatch::ok(json!({ "phase": PhaseName::Review }))
            .with(Envelope::all(Broadcast::PhaseChange {
                phase: PhaseName::Review,
                deadline: None,
            }))
            .with(Envelope::all(Broadcast::review_state(state)))
    }

    fn set_review_category(&mut self, category: Category) -> Dispatch {
        let state = self.review.set_category(category);
        Dispatch::ok(json!(state)).with(Envelope::all(Broadcast::review_state(state)))
    }

    fn set_focus(&mut self, card_id: Option<CardId>) -> Result<Dispatch, SessionError> {
        if let Some(id) = card_id {
            if self.ledger.find(id).is_none() {
                return Err(SessionError::UnknownCard(id));
            }
        }
        let focused_card_id = self.review.set_focus(card_id);
        Ok(Dispatch::ok(json!({ "focusedCardId": focused_card_id }))
            .with(Envelope::all(Broadcast::ReviewFocusUpdate { focused_card_id })))
    }

    fn export_cards(&self, category: Category) -> Dispatch {
        let (text, count) = self.ledger.export(&self.pairing, category);
        info!(category = category.as_str(), count, "cards exported");
        Dispatch::ok(json!({
            "category": category,
            "count": count,
            "text": text,
        }))
    }

    /// Drop a connection. Its pair and cards stay; the roster is rebroadcast
    /// if the connection had registered.
    pub fn disconnect(&mut self, connection_id: &ConnectionId) -> Vec<Envelope> {
        match self.registry.remove(connection_id) {
            Some(participant) => {
                info!(
                    connection_id = %connection_id,
                    role = participant.role.as_str(),
                    pair_id = ?participant.pair_id,
                    "participant left"
                );
                vec![self.roster()]
            }
            None => Vec::new(),
        }
    }

    /// Enter review if the active deadline has passed. Emits the same
    /// broadcasts as an explicit `enter_review`; no-op otherwise.
    pub fn deadline_elapsed(&mut self, now: DateTime<Utc>) -> Vec<Envelope> {
        if !self.phase.deadline_passed(now) {
            return Vec::new();
        }
        info!("deadline reached, entering review");
        self.enter_review().outbound
    }

    /// Global roster: registered participants (facilitators excluded) and
    /// every pair with its cards.
    pub fn roster(&self) -> Envelope {
        Envelope::all(Broadcast::RosterUpdate {
            participants: self.registry.with_role(Role::Participant),
            pairs: self.pair_views(),
        })
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let phase = self.phase.phase();
        SessionSnapshot {
            phase: phase.name(),
            deadline: phase.deadline_ms(),
            participants: self.registry.with_role(Role::Participant),
            pairs: self.pair_views(),
            review: self.review.current(),
        }
    }

    fn pair_views(&self) -> Vec<PairView> {
        self.pairing
            .iter()
            .map(|p| PairView {
                pair_id: p.pair_id.clone(),
                member_ids: p.member_ids.clone(),
                cards: self.ledger.cards(&p.pair_id).to_vec(),
            })
            .collect()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase.phase()
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn pairing(&self) -> &PairingManager {
        &self.pairing
    }

    pub fn ledger(&self) -> &CardLedger {
        &self.ledger
    }

    pub fn review(&self) -> &ReviewBroadcastState {
        &self.review
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use huddle_core::events::Scope;

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
    }

    fn conn(s: &str) -> ConnectionId {
        ConnectionId::from_raw(s)
    }

    fn register(gw: &mut SessionGateway, id: &str, role: Role, name: &str) {
        let d = gw.handle(
            &conn(id),
            Command::Register {
                role,
                display_name: Some(name.into()),
            },
            t0(),
        );
        assert!(d.is_ok(), "{:?}", d.reply);
    }

    fn lobby() -> SessionGateway {
        let mut gw = SessionGateway::new();
        register(&mut gw, "conn_f", Role::Facilitator, "Fay");
        register(&mut gw, "conn_a", Role::Participant, "Ann");
        register(&mut gw, "conn_b", Role::Participant, "Bo");
        gw
    }

    #[test]
    fn register_replies_with_snapshot_and_broadcasts_roster() {
        let mut gw = SessionGateway::new();
        let d = gw.handle(
            &conn("conn_a"),
            Command::Register {
                role: Role::Participant,
                display_name: Some("Ann".into()),
            },
            t0(),
        );
        let reply = d.reply.unwrap();
        assert_eq!(reply["participant"]["displayName"], "Ann");
        assert_eq!(reply["state"]["phase"], "lobby");
        assert_eq!(d.outbound.len(), 1);
        assert_eq!(d.outbound[0].scope, Scope::All);
        assert_eq!(d.outbound[0].broadcast.event_type(), "roster_update");
    }

    #[test]
    fn roster_excludes_facilitators() {
        let gw = lobby();
        assert_matches!(gw.roster().broadcast, Broadcast::RosterUpdate { participants, .. } => {
            assert_eq!(participants.len(), 2);
            assert!(participants.iter().all(|p| p.role == Role::Participant));
        });
    }

    #[test]
    fn unregistered_sender_rejected() {
        let mut gw = SessionGateway::new();
        let d = gw.handle(&conn("conn_x"), Command::GetState, t0());
        assert_matches!(d.reply, Err(SessionError::NotRegistered(_)));
        assert!(d.outbound.is_empty());
    }

    #[test]
    fn participant_cannot_run_facilitator_commands() {
        let mut gw = lobby();
        for command in [
            Command::StartSession { duration_minutes: 5 },
            Command::EnterReview,
            Command::SetReviewCategory { category: Category::Issue },
            Command::SetFocus { card_id: None },
            Command::CreatePair {
                id_a: conn("conn_a"),
                id_b: conn("conn_b"),
            },
            Command::ExportCards { category: Category::Idea },
        ] {
            let d = gw.handle(&conn("conn_a"), command, t0());
            assert_matches!(d.reply, Err(SessionError::Unauthorized { .. }));
            assert!(d.outbound.is_empty());
        }
        assert_eq!(gw.phase(), SessionPhase::Lobby);
        assert!(gw.pairing().is_empty());
    }

    #[test]
    fn create_pair_reports_scope_joins() {
        let mut gw = lobby();
        let d = gw.handle(
            &conn("conn_f"),
            Command::CreatePair {
                id_a: conn("conn_a"),
                id_b: conn("conn_b"),
            },
            t0(),
        );
        let pair_id = PairId::from_raw(d.reply.unwrap()["pairId"].as_str().unwrap());
        assert_eq!(
            d.scope_joins,
            vec![(conn("conn_a"), pair_id.clone()), (conn("conn_b"), pair_id)]
        );
    }

    #[test]
    fn dispatch_rejects_unknown_method() {
        let mut gw = lobby();
        let d = gw.dispatch(&conn("conn_f"), "reset_everything", &Value::Null, t0());
        assert_matches!(d.reply, Err(SessionError::UnknownMethod(m)) if m == "reset_everything");
    }

    #[test]
    fn set_focus_on_unknown_card_rejected() {
        let mut gw = lobby();
        let d = gw.handle(&conn("conn_f"), Command::SetFocus { card_id: Some(CardId::new(7)) }, t0());
        assert_matches!(d.reply, Err(SessionError::UnknownCard(_)));
        assert_eq!(gw.review().current().focused_card_id, None);
    }

    #[test]
    fn deadline_elapsed_enters_review_once() {
        let mut gw = lobby();
        let d = gw.handle(&conn("conn_f"), Command::StartSession { duration_minutes: 1 }, t0());
        assert!(d.is_ok());
        assert!(gw.deadline_elapsed(t0()).is_empty());

        let later = t0() + chrono::TimeDelta::minutes(1);
        let out = gw.deadline_elapsed(later);
        let types: Vec<_> = out.iter().map(|e| e.broadcast.event_type()).collect();
        assert_eq!(types, vec!["phase_change", "review_state_update"]);
        assert_eq!(gw.phase(), SessionPhase::Review);
        assert!(gw.deadline_elapsed(later).is_empty());
    }

    #[test]
    fn disconnect_keeps_pair_and_rebroadcasts_roster() {
        let mut gw = lobby();
        gw.handle(
            &conn("conn_f"),
            Command::CreatePair {
                id_a: conn("conn_a"),
                id_b: conn("conn_b"),
            },
            t0(),
        );
        let out = gw.disconnect(&conn("conn_a"));
        assert_eq!(out.len(), 1);
        assert_matches!(&out[0].broadcast, Broadcast::RosterUpdate { participants, pairs } => {
            assert_eq!(participants.len(), 1);
            assert_eq!(pairs.len(), 1);
            assert!(pairs[0].member_ids.contains(&conn("conn_a")));
        });
        assert!(gw.disconnect(&conn("conn_a")).is_empty());
    }

    #[test]
    fn export_cards_returns_text() {
        let mut gw = lobby();
        let d = gw.handle(
            &conn("conn_f"),
            Command::CreatePair {
                id_a: conn("conn_a"),
                id_b: conn("conn_b"),
            },
            t0(),
        );
        let pair_id = PairId::from_raw(d.reply.unwrap()["pairId"].as_str().unwrap());
        gw.handle(
            &conn("conn_a"),
            Command::SubmitCard {
                pair_id,
                draft: CardDraft {
                    author_name: "Ann".into(),
                    category: Category::Issue,
                    reflection_text: "too fast".into(),
                    next_action_text: "slow down".into(),
                },
            },
            t0(),
        );
        let d = gw.handle(&conn("conn_f"), Command::ExportCards { category: Category::Issue }, t0());
        assert!(d.outbound.is_empty());
        let reply = d.reply.unwrap();
        assert_eq!(reply["count"], 1);
        assert_eq!(reply["text"], "1\tAnn\ttoo fast");
    }
}
