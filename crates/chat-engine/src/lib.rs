//! Reconciliation and messaging engine for matched relationships.
//!
//! The engine maintains exactly one live, end-to-end encrypted direct
//! room per mutual match on a remote chat service, replays missed
//! history after attaching to a room, and repairs the known failure
//! modes of federated room state. All of its work runs on a single
//! spawned task fed by a command queue; callers interact through
//! [`EngineHandle`] and subscribe to [`chat_core::DelegateEvent`]s.
//!
//! The remote service itself stays behind the [`ChatBackend`] trait and
//! the match authority behind [`MatchStateSource`]; the engine owns the
//! policy, not the transport.

pub mod facade;
pub mod match_state;

mod dispatcher;
mod engine;
mod history;
mod reconcile;
mod recovery;
mod registry;
mod router;

#[cfg(test)]
mod testutil;

pub use engine::{spawn_engine, EngineConfig, EngineHandle};
pub use facade::{ChatBackend, DecryptedBatch, TimelineHandle};
pub use match_state::MatchStateSource;
