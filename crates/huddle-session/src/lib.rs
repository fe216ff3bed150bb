//! # huddle-session
//!
//! The authoritative, synchronous session engine. No I/O and no async:
//! callers feed it one command at a time and deliver what it returns.
//!
//! - [`registry::ConnectionRegistry`]: registered connections and roles
//! - [`pairing::PairingManager`]: two-participant pairs, one per participant
//! - [`phase::PhaseController`]: `Lobby → Active → Review`
//! - [`ledger::CardLedger`]: per-pair append-only cards
//! - [`review::ReviewBroadcastState`]: review filter and focus
//! - [`gateway::SessionGateway`]: owns all of the above and dispatches commands

#![deny(unsafe_code)]

pub mod gateway;
pub mod ledger;
pub mod pairing;
pub mod phase;
pub mod registry;
pub mod review;

pub use gateway::{Dispatch, SessionGateway};
