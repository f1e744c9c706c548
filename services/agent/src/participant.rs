//! The decision-making participant: one per game instance.
//!
//! Owns the cumulative conversation history and the current game info;
//! both the dispatcher (turn-based path) and the realtime coordinator
//! (broadcast merges) write into it so every decision call sees up-to-date
//! context. The decision content itself lives behind the boxed
//! [`DecisionPolicy`].

use crate::{
    config::Config,
    cost::CostTracker,
    policy::{DecisionPolicy, GameView, PolicyReply, RealtimeDecision, RealtimeReply},
};
use anyhow::{Context, Result};
use wolf_protocol::{Info, Packet, Request, Setting, Talk};

pub struct Participant {
    pub name: String,
    pub info: Option<Info>,
    pub setting: Option<Setting>,
    /// Append-only logs, in server-send order.
    pub talk_history: Vec<Talk>,
    pub whisper_history: Vec<Talk>,
    /// Turn-based bookkeeping, reconciled from the histories after a
    /// realtime phase.
    pub sent_talk_count: usize,
    pub sent_whisper_count: usize,
    pub cost: CostTracker,
    request: Option<Request>,
    policy: Box<dyn DecisionPolicy>,
}

impl Participant {
    /// Creates a participant bound to an INITIALIZE packet's full snapshot.
    pub fn new(
        config: &Config,
        name: String,
        init_packet: &Packet,
        policy: Box<dyn DecisionPolicy>,
    ) -> Self {
        let mut participant = Self {
            name,
            info: None,
            setting: None,
            talk_history: Vec::new(),
            whisper_history: Vec::new(),
            sent_talk_count: 0,
            sent_whisper_count: 0,
            cost: CostTracker::new(config.llm_type.clone(), config.llm_model.clone()),
            request: None,
            policy,
        };
        participant.set_packet(init_packet);
        participant
    }

    /// Merges an info snapshot under the full/partial invariant: a full
    /// snapshot (it carries the status map) replaces the whole record; a
    /// partial one may only update the remaining-utterance count.
    pub fn apply_info(&mut self, info: &Info) {
        if info.is_full() {
            self.info = Some(info.clone());
        } else if let Some(current) = &mut self.info {
            current.remain_count = info.remain_count;
        } else {
            self.info = Some(info.clone());
        }
    }

    /// Applies one turn-based packet: info/setting merge plus history
    /// appends, in receipt order.
    pub fn set_packet(&mut self, packet: &Packet) {
        self.request = Some(packet.request);
        if let Some(info) = &packet.info {
            self.apply_info(info);
        }
        if let Some(setting) = &packet.setting {
            self.setting = Some(setting.clone());
        }
        if let Some(talks) = &packet.talk_history {
            self.talk_history.extend(talks.iter().cloned());
        }
        if let Some(whispers) = &packet.whisper_history {
            self.whisper_history.extend(whispers.iter().cloned());
        }
    }

    /// Produces zero-or-one outgoing message for the last applied packet,
    /// tracking usage on completion.
    pub async fn act(&mut self) -> Result<Option<String>> {
        let request = self.request.context("act() called before any packet")?;
        let view = GameView {
            request,
            info: self.info.as_ref(),
            setting: self.setting.as_ref(),
            talk_history: &self.talk_history,
            whisper_history: &self.whisper_history,
            sent_talk_count: self.sent_talk_count,
            sent_whisper_count: self.sent_whisper_count,
        };
        let PolicyReply { text, usage } = self.policy.act(view).await?;
        if let Some(usage) = usage {
            let _ = self.cost.track(usage);
        }
        if text.is_some() {
            match request {
                Request::Talk => self.sent_talk_count += 1,
                Request::Whisper => self.sent_whisper_count += 1,
                _ => {}
            }
        }
        Ok(text)
    }

    /// Asks the policy whether/what to say in the current realtime phase.
    pub async fn talk_realtime(
        &mut self,
        seen: &[Talk],
        is_talk: bool,
        remain_count: u32,
    ) -> Result<RealtimeDecision> {
        let request = if is_talk {
            Request::Talk
        } else {
            Request::Whisper
        };
        let view = GameView {
            request,
            info: self.info.as_ref(),
            setting: self.setting.as_ref(),
            talk_history: &self.talk_history,
            whisper_history: &self.whisper_history,
            sent_talk_count: self.sent_talk_count,
            sent_whisper_count: self.sent_whisper_count,
        };
        let RealtimeReply { decision, usage } =
            self.policy.talk_realtime(view, seen, is_talk, remain_count).await?;
        if let Some(usage) = usage {
            let _ = self.cost.track(usage);
        }
        Ok(decision)
    }
}
