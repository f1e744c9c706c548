//! Wire vocabulary for the werewolf game server protocol.
//!
//! The server drives the whole exchange: it sends JSON-encoded [`Packet`]s
//! and the agent replies with plain text. Requests split into the classic
//! turn-based kinds and the realtime (group-chat) kinds that bracket a
//! bounded broadcast window.

mod packet;
mod request;

pub use packet::{
    Info, Judge, MaxCount, Packet, Role, Setting, Species, Status, Talk, TalkSetting,
    TimeoutSetting, Vote,
};
pub use request::Request;

/// Utterance sent to stop speaking for the rest of the phase.
pub const OVER: &str = "Over";
/// Utterance sent to pass a single turn without speaking.
pub const SKIP: &str = "Skip";
