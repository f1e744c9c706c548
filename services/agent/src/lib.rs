//! Session driver for an automated werewolf-game participant.
//!
//! The server pushes typed requests over one persistent websocket. The
//! [`dispatch::Dispatcher`] routes them: classic turn-based requests go
//! straight to the decision participant, while realtime phase starts hand
//! the connection to the [`realtime::RealtimeCoordinator`] until the phase
//! closes. [`session::run_agent`] wraps the whole thing in a
//! connect/retry cycle.

pub mod client;
pub mod config;
pub mod cost;
pub mod dispatch;
pub mod participant;
pub mod policy;
pub mod realtime;
pub mod session;

#[cfg(test)]
pub(crate) mod testutil;
