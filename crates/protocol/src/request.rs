use serde::{Deserialize, Serialize};

/// Every request kind the server can issue.
///
/// The first block is the turn-based protocol (one request, one reply);
/// the second block is the realtime sub-protocol that opens, feeds and
/// closes a group-chat window.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    Name,
    Talk,
    Whisper,
    Vote,
    Divine,
    Guard,
    Attack,
    Initialize,
    DailyInitialize,
    DailyFinish,
    Finish,

    TalkStart,
    TalkBroadcast,
    TalkEnd,
    WhisperStart,
    WhisperBroadcast,
    WhisperEnd,
}

impl Request {
    /// Whether this request belongs to the realtime sub-protocol.
    pub fn is_realtime(self) -> bool {
        matches!(
            self,
            Self::TalkStart
                | Self::TalkBroadcast
                | Self::TalkEnd
                | Self::WhisperStart
                | Self::WhisperBroadcast
                | Self::WhisperEnd
        )
    }

    /// Whether this request opens a realtime phase.
    pub fn is_phase_start(self) -> bool {
        matches!(self, Self::TalkStart | Self::WhisperStart)
    }

    /// The end request that closes the phase opened by this start request.
    /// Returns `None` for anything that is not a phase start.
    pub fn end_request_for_start(self) -> Option<Self> {
        match self {
            Self::TalkStart => Some(Self::TalkEnd),
            Self::WhisperStart => Some(Self::WhisperEnd),
            _ => None,
        }
    }

    /// Whether this request is a realtime broadcast.
    pub fn is_broadcast(self) -> bool {
        matches!(self, Self::TalkBroadcast | Self::WhisperBroadcast)
    }
}
