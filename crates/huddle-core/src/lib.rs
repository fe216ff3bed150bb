//! # huddle-core
//!
//! Shared vocabulary for the huddle session server:
//!
//! - **Branded IDs**: [`ids::ConnectionId`], [`ids::PairId`], [`ids::CardId`]
//! - **Model**: participants, pairs, cards, phase and review state
//! - **Commands**: [`commands::Command`] parsed from inbound method + params
//! - **Broadcasts**: [`events::Broadcast`] addressed by [`events::Scope`]
//! - **Errors**: [`errors::SessionError`] with its [`errors::ErrorKind`] class
//!
//! Depended on by every other huddle crate.

#![deny(unsafe_code)]

pub mod commands;
pub mod errors;
pub mod events;
pub mod ids;
pub mod model;
