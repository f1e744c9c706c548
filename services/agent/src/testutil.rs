//! Scripted in-memory fakes shared by the coordinator and dispatcher tests.

use crate::{
    client::{Transport, TransportError},
    config::Config,
    cost::Usage,
    participant::Participant,
    policy::{DecisionPolicy, GameView, PolicyReply, RealtimeDecision, RealtimeReply},
};
use anyhow::{Result, bail};
use async_trait::async_trait;
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};
use tokio::{
    sync::{Mutex, mpsc},
    time::Instant,
};
use tracing::Level;
use wolf_protocol::{Info, Packet, Request, Talk};

pub(crate) fn test_config() -> Config {
    Config {
        // port 1 is never listening, so best-effort cost reports fail fast
        websocket_url: "ws://127.0.0.1:1/ws".to_string(),
        token: None,
        auto_reconnect: false,
        poll_interval: Duration::from_millis(500),
        speak_cooldown: Duration::from_secs(3),
        team: "wolf".to_string(),
        agent_index: 1,
        llm_type: "openai".to_string(),
        llm_model: "gpt-4o-mini".to_string(),
        log_level: Level::INFO,
    }
}

fn full_info(remain: Option<u32>) -> Info {
    serde_json::from_value(serde_json::json!({
        "game_id": "g1",
        "day": 1,
        "agent": "Agent[01]",
        "status_map": {"Agent[01]": "ALIVE", "Agent[02]": "ALIVE"},
        "remain_count": remain,
    }))
    .unwrap()
}

fn partial_info(remain: Option<u32>) -> Info {
    serde_json::from_value(serde_json::json!({
        "game_id": "g1",
        "day": 1,
        "agent": "Agent[01]",
        "remain_count": remain,
    }))
    .unwrap()
}

pub(crate) fn init_packet() -> Packet {
    Packet {
        request: Request::Initialize,
        info: Some(full_info(None)),
        setting: None,
        talk_history: None,
        whisper_history: None,
    }
}

pub(crate) fn start_packet(is_talk: bool, remain: u32) -> Packet {
    Packet {
        request: if is_talk {
            Request::TalkStart
        } else {
            Request::WhisperStart
        },
        info: Some(full_info(Some(remain))),
        setting: None,
        talk_history: None,
        whisper_history: None,
    }
}

pub(crate) fn broadcast_packet(is_talk: bool, idx: u32, text: &str, remain: Option<u32>) -> Packet {
    let entry = Talk {
        idx,
        day: 1,
        turn: 0,
        agent: "Agent[02]".to_string(),
        text: text.to_string(),
        skip: false,
        over: false,
    };
    let (request, talks, whispers) = if is_talk {
        (Request::TalkBroadcast, Some(vec![entry]), None)
    } else {
        (Request::WhisperBroadcast, None, Some(vec![entry]))
    };
    Packet {
        request,
        info: Some(partial_info(remain)),
        setting: None,
        talk_history: talks,
        whisper_history: whispers,
    }
}

pub(crate) fn end_packet(is_talk: bool) -> Packet {
    Packet::of(if is_talk {
        Request::TalkEnd
    } else {
        Request::WhisperEnd
    })
}

pub(crate) fn test_participant(policy: ScriptedPolicy) -> Participant {
    Participant::new(
        &test_config(),
        "wolf1".to_string(),
        &init_packet(),
        Box::new(policy),
    )
}

/// Pushes packets into a [`ScriptedTransport`] from test tasks.
pub(crate) struct Feeder(mpsc::UnboundedSender<Packet>);

impl Feeder {
    pub(crate) fn push(&self, packet: Packet) {
        let _ = self.0.send(packet);
    }
}

/// An in-memory [`Transport`]: receives come from an internal queue fed by
/// the test, sends are recorded with their (virtual) timestamps.
pub(crate) struct ScriptedTransport {
    incoming: Mutex<mpsc::UnboundedReceiver<Packet>>,
    feed: mpsc::UnboundedSender<Packet>,
    sent: StdMutex<Vec<(Instant, String)>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Arc<Self> {
        let (feed, incoming) = mpsc::unbounded_channel();
        Arc::new(Self {
            incoming: Mutex::new(incoming),
            feed,
            sent: StdMutex::new(Vec::new()),
        })
    }

    pub(crate) fn feeder(&self) -> Feeder {
        Feeder(self.feed.clone())
    }

    pub(crate) fn sent(&self) -> Vec<(Instant, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn receive(&self) -> Result<Packet, TransportError> {
        let mut incoming = self.incoming.lock().await;
        incoming
            .recv()
            .await
            .ok_or_else(|| TransportError::Fatal("script exhausted".to_string()))
    }

    async fn receive_timeout(&self, timeout: Duration) -> Result<Packet, TransportError> {
        tokio::time::timeout(timeout, self.receive())
            .await
            .unwrap_or(Err(TransportError::Timeout))
    }

    async fn send(&self, text: &str) -> Result<(), TransportError> {
        self.sent
            .lock()
            .unwrap()
            .push((Instant::now(), text.to_string()));
        Ok(())
    }

    async fn close(&self) {}
}

enum ScriptMode {
    /// Speak the scripted lines in order; error when the script runs dry.
    Say(VecDeque<String>),
    /// Always listen / reply with nothing.
    Listen,
    /// Terminate on the first realtime decision; error on any further one.
    Terminate { fired: bool },
}

/// A deterministic [`DecisionPolicy`] for tests.
pub(crate) struct ScriptedPolicy {
    mode: ScriptMode,
}

impl Default for ScriptedPolicy {
    fn default() -> Self {
        Self::listening()
    }
}

impl ScriptedPolicy {
    pub(crate) fn saying(lines: Vec<&str>) -> Self {
        Self {
            mode: ScriptMode::Say(lines.into_iter().map(str::to_string).collect()),
        }
    }

    pub(crate) fn listening() -> Self {
        Self {
            mode: ScriptMode::Listen,
        }
    }

    pub(crate) fn terminating() -> Self {
        Self {
            mode: ScriptMode::Terminate { fired: false },
        }
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        match &mut self.mode {
            ScriptMode::Say(lines) => match lines.pop_front() {
                Some(line) => Ok(Some(line)),
                None => bail!("scripted policy exhausted"),
            },
            ScriptMode::Listen => Ok(None),
            ScriptMode::Terminate { .. } => Ok(None),
        }
    }
}

const TEST_USAGE: Usage = Usage {
    input_tokens: 10,
    output_tokens: 5,
};

#[async_trait]
impl DecisionPolicy for ScriptedPolicy {
    async fn act(&mut self, view: GameView<'_>) -> Result<PolicyReply> {
        // only speaking requests consume the script
        let text = match view.request {
            Request::Talk | Request::Whisper => self.next_line()?,
            _ => None,
        };
        let usage = text.is_some().then_some(TEST_USAGE);
        Ok(PolicyReply { text, usage })
    }

    async fn talk_realtime(
        &mut self,
        _view: GameView<'_>,
        _seen: &[Talk],
        _is_talk: bool,
        _remain_count: u32,
    ) -> Result<RealtimeReply> {
        let decision = match &mut self.mode {
            ScriptMode::Say(lines) => match lines.pop_front() {
                Some(line) => RealtimeDecision::Say(line),
                None => bail!("scripted policy exhausted"),
            },
            ScriptMode::Listen => RealtimeDecision::Listen,
            ScriptMode::Terminate { fired } => {
                if *fired {
                    bail!("decision requested after termination");
                }
                *fired = true;
                RealtimeDecision::Terminate
            }
        };
        Ok(RealtimeReply {
            decision,
            usage: Some(TEST_USAGE),
        })
    }
}
