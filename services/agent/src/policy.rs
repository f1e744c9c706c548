//! The decision seam.
//!
//! What to say, how to vote and how to read the game is an external
//! capability behind [`DecisionPolicy`]; this crate only drives the
//! protocol around it. [`SilentPolicy`] is the built-in inert baseline
//! that keeps the binary runnable without any strategy attached.

use crate::cost::Usage;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use wolf_protocol::{Info, Request, Setting, Talk};

/// A borrowed view of the participant's game state, handed to the policy
/// for each decision.
pub struct GameView<'a> {
    /// The request being answered.
    pub request: Request,
    pub info: Option<&'a Info>,
    pub setting: Option<&'a Setting>,
    pub talk_history: &'a [Talk],
    pub whisper_history: &'a [Talk],
    pub sent_talk_count: usize,
    pub sent_whisper_count: usize,
}

/// Outcome of a realtime speak decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeDecision {
    /// Stop speaking for the rest of the phase (the `Over` sentinel is sent
    /// once; listening continues).
    Terminate,
    /// Say nothing this turn; keep listening.
    Listen,
    /// Say this.
    Say(String),
}

/// A turn-based reply: zero or one outgoing message, plus any usage the
/// decision consumed.
pub struct PolicyReply {
    pub text: Option<String>,
    pub usage: Option<Usage>,
}

/// A realtime reply.
pub struct RealtimeReply {
    pub decision: RealtimeDecision,
    pub usage: Option<Usage>,
}

/// The opaque decision-making capability.
#[async_trait]
pub trait DecisionPolicy: Send + Sync {
    /// Produces the reply to one turn-based request.
    async fn act(&mut self, view: GameView<'_>) -> Result<PolicyReply>;

    /// Decides whether/what to say during a realtime phase, given the
    /// messages observed so far and the remaining utterance allowance.
    async fn talk_realtime(
        &mut self,
        view: GameView<'_>,
        seen: &[Talk],
        is_talk: bool,
        remain_count: u32,
    ) -> Result<RealtimeReply>;
}

/// Builds a fresh policy per game instance.
pub type PolicyFactory = Arc<dyn Fn() -> Box<dyn DecisionPolicy> + Send + Sync>;

/// A placeholder policy: skips its turn-based utterances, answers targeted
/// requests with its own name, and only listens during realtime phases.
#[derive(Debug, Default)]
pub struct SilentPolicy;

#[async_trait]
impl DecisionPolicy for SilentPolicy {
    async fn act(&mut self, view: GameView<'_>) -> Result<PolicyReply> {
        let text = match view.request {
            Request::Talk | Request::Whisper => Some(wolf_protocol::SKIP.to_string()),
            Request::Vote | Request::Divine | Request::Guard | Request::Attack => {
                view.info.map(|info| info.agent.clone())
            }
            _ => None,
        };
        Ok(PolicyReply { text, usage: None })
    }

    async fn talk_realtime(
        &mut self,
        _view: GameView<'_>,
        _seen: &[Talk],
        _is_talk: bool,
        _remain_count: u32,
    ) -> Result<RealtimeReply> {
        Ok(RealtimeReply {
            decision: RealtimeDecision::Listen,
            usage: None,
        })
    }
}
