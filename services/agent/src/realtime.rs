//! Realtime (group-chat) phase coordination.
//!
//! On TALK_START/WHISPER_START the dispatcher hands the connection to a
//! [`RealtimeCoordinator`], which runs one phase to completion: a spawned
//! background task receives broadcasts into an order-preserving queue while
//! the foreground loop drains it, merges state, and polls the participant
//! for whether to speak, subject to a minimum inter-message interval. On
//! TALK_END/WHISPER_END control returns to the dispatcher, together with
//! any non-realtime packet intercepted mid-phase.

use crate::{
    client::{Transport, TransportError},
    participant::Participant,
    policy::RealtimeDecision,
};
use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::mpsc,
    time::{self, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use wolf_protocol::{OVER, Packet, Request};

/// Read timeout for the background receiver; bounds how long cancellation
/// can go unobserved.
const RECV_TIMEOUT: Duration = Duration::from_millis(500);

/// How long to wait for the background receiver to acknowledge shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// In-memory state of one realtime phase. Created at phase start, mutated
/// only by the coordinator's foreground loop, discarded at phase end.
#[derive(Debug)]
pub struct PhaseState {
    pub is_talk: bool,
    /// Server-controlled budget of further utterances. Decremented exactly
    /// once per accepted send; otherwise only server values set it.
    pub remain_count: u32,
    /// Messages observed during this phase, in delivery order.
    pub talks_in_phase: Vec<wolf_protocol::Talk>,
    pub ended: bool,
    /// Set once the termination sentinel has been sent. Later broadcasts
    /// may still refresh `remain_count` with server values, but no further
    /// sends happen this phase.
    pub over_sent: bool,
    pub last_speak_time: Option<Instant>,
}

impl PhaseState {
    pub fn new(is_talk: bool) -> Self {
        Self {
            is_talk,
            remain_count: 0,
            talks_in_phase: Vec::new(),
            ended: false,
            over_sent: false,
            last_speak_time: None,
        }
    }

    /// Whether enough time has passed since the last send to consider
    /// speaking again. The first send of a phase is never throttled.
    fn cooldown_elapsed(&self, cooldown: Duration) -> bool {
        self.last_speak_time
            .map_or(true, |last| last.elapsed() >= cooldown)
    }
}

/// Runs exactly one realtime phase at a time over a shared transport.
pub struct RealtimeCoordinator {
    transport: Arc<dyn Transport>,
    poll_interval: Duration,
    speak_cooldown: Duration,
}

impl RealtimeCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        poll_interval: Duration,
        speak_cooldown: Duration,
    ) -> Self {
        Self {
            transport,
            poll_interval,
            speak_cooldown,
        }
    }

    /// Handles a complete realtime phase, from its start packet to the
    /// matching end request.
    ///
    /// Returns the non-realtime packet intercepted mid-phase, if any; the
    /// caller must re-dispatch it as if freshly received.
    pub async fn handle_phase(
        &self,
        participant: &mut Participant,
        start_packet: Packet,
    ) -> Result<Option<Packet>> {
        let end_request = start_packet
            .request
            .end_request_for_start()
            .with_context(|| format!("{:?} does not start a realtime phase", start_packet.request))?;
        let is_talk = start_packet.request == Request::TalkStart;

        let mut state = PhaseState::new(is_talk);
        apply_packet(&start_packet, &mut state, participant);

        info!(
            agent = %participant.name,
            kind = if is_talk { "talk" } else { "whisper" },
            remain_count = state.remain_count,
            "realtime phase started"
        );

        let (queue_tx, mut queue_rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();
        let receiver = tokio::spawn(receiver_loop(
            self.transport.clone(),
            queue_tx,
            stop.clone(),
        ));

        let mut next_packet = None;
        let outcome = self
            .run_phase(&mut state, participant, end_request, &mut queue_rx, &mut next_packet)
            .await;

        // Stop the receiver before touching the connection again. The
        // bounded wait can expire only if the transport itself is wedged;
        // the abandoned task still exits on its next receive timeout.
        stop.cancel();
        if time::timeout(SHUTDOWN_GRACE, receiver).await.is_err() {
            warn!(
                agent = %participant.name,
                "background receiver did not stop within the grace period; abandoning it"
            );
        }

        // Keep the turn-based counters consistent with what actually
        // accumulated during the phase.
        if is_talk {
            participant.sent_talk_count = participant.talk_history.len();
        } else {
            participant.sent_whisper_count = participant.whisper_history.len();
        }

        outcome?;
        Ok(next_packet)
    }

    async fn run_phase(
        &self,
        state: &mut PhaseState,
        participant: &mut Participant,
        end_request: Request,
        queue_rx: &mut mpsc::UnboundedReceiver<Packet>,
        next_packet: &mut Option<Packet>,
    ) -> Result<()> {
        while !state.ended {
            // Drain everything currently queued, in receipt order, without
            // blocking.
            while let Ok(packet) = queue_rx.try_recv() {
                if packet.request == end_request {
                    info!(agent = %participant.name, "realtime phase end received");
                    state.ended = true;
                    break;
                } else if packet.request.is_broadcast() {
                    apply_packet(&packet, state, participant);
                } else if !packet.request.is_realtime() {
                    // The server moved on mid-phase. Preserve the packet for
                    // the dispatcher and close the phase; losing a
                    // server-driven transition is worse than cutting the
                    // phase short.
                    info!(
                        agent = %participant.name,
                        request = ?packet.request,
                        "non-realtime packet during phase; closing phase"
                    );
                    *next_packet = Some(packet);
                    state.ended = true;
                    break;
                } else {
                    warn!(
                        agent = %participant.name,
                        request = ?packet.request,
                        "unexpected realtime packet mid-phase; skipping"
                    );
                }
            }
            if state.ended {
                break;
            }

            if !state.over_sent
                && state.remain_count > 0
                && state.cooldown_elapsed(self.speak_cooldown)
            {
                let decision = participant
                    .talk_realtime(&state.talks_in_phase, state.is_talk, state.remain_count)
                    .await?;
                match decision {
                    RealtimeDecision::Terminate => {
                        self.transport.send(OVER).await?;
                        // Stop speaking but keep listening until the end
                        // request arrives.
                        state.remain_count = 0;
                        state.over_sent = true;
                        info!(agent = %participant.name, "sent the termination sentinel");
                    }
                    RealtimeDecision::Listen => {}
                    RealtimeDecision::Say(text) => {
                        self.transport.send(&text).await?;
                        state.remain_count -= 1;
                        state.last_speak_time = Some(Instant::now());
                        info!(
                            agent = %participant.name,
                            text = %text,
                            remain_count = state.remain_count,
                            "realtime utterance sent"
                        );
                    }
                }
            }

            time::sleep(self.poll_interval).await;
        }
        Ok(())
    }
}

/// Merges one start/broadcast packet into the phase state and the
/// participant's persistent record. All mutation of shared state during a
/// phase funnels through here, on the foreground task.
fn apply_packet(packet: &Packet, state: &mut PhaseState, participant: &mut Participant) {
    if let Some(info) = &packet.info {
        if let Some(remain) = info.remain_count {
            state.remain_count = remain;
        }
        participant.apply_info(info);
    }
    if let Some(setting) = &packet.setting {
        participant.setting = Some(setting.clone());
    }

    let talks = if state.is_talk {
        &packet.talk_history
    } else {
        &packet.whisper_history
    };
    if let Some(talks) = talks {
        for talk in talks {
            if state.is_talk {
                participant.talk_history.push(talk.clone());
            } else {
                participant.whisper_history.push(talk.clone());
            }
            state.talks_in_phase.push(talk.clone());
            info!(
                agent = %participant.name,
                speaker = %talk.agent,
                text = %talk.text,
                "broadcast received"
            );
        }
    }
}

/// Background half of the phase: blocking receives with a short timeout,
/// pushed onto the queue in arrival order. Never mutates shared state.
async fn receiver_loop(
    transport: Arc<dyn Transport>,
    queue_tx: mpsc::UnboundedSender<Packet>,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            received = transport.receive_timeout(RECV_TIMEOUT) => match received {
                Ok(packet) => {
                    if queue_tx.send(packet).is_err() {
                        break;
                    }
                }
                // Timeouts are steady-state here, not faults.
                Err(TransportError::Timeout) => {}
                Err(TransportError::Transient(reason)) => {
                    warn!(%reason, "transient receive error during phase");
                }
                Err(TransportError::Fatal(reason)) => {
                    warn!(%reason, "connection failed during phase; stopping receiver");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{
        broadcast_packet, end_packet, start_packet, test_config, test_participant,
        ScriptedPolicy, ScriptedTransport,
    };

    fn coordinator(transport: &Arc<ScriptedTransport>) -> RealtimeCoordinator {
        let t: Arc<dyn Transport> = transport.clone();
        RealtimeCoordinator::new(t, Duration::from_millis(500), Duration::from_secs(3))
    }

    /// Scenario A: remain_count=2, cooldown 3s, poll 0.5s, policy always
    /// speaks. Exactly two sends, at least 3s apart, clean end.
    #[tokio::test(start_paused = true)]
    async fn two_sends_respect_cooldown() {
        let transport = ScriptedTransport::new();
        let mut participant = test_participant(ScriptedPolicy::saying(vec!["one", "two", "three"]));
        let feed = transport.feeder();

        tokio::spawn(async move {
            time::sleep(Duration::from_secs(5)).await;
            feed.push(end_packet(true));
        });

        let next = coordinator(&transport)
            .handle_phase(&mut participant, start_packet(true, 2))
            .await
            .unwrap();

        assert!(next.is_none());
        let sent = transport.sent();
        assert_eq!(
            sent.iter().map(|(_, t)| t.as_str()).collect::<Vec<_>>(),
            ["one", "two"]
        );
        let gap = sent[1].0 - sent[0].0;
        assert!(gap >= Duration::from_secs(3), "sends only {gap:?} apart");
    }

    /// Scenario B: the policy terminates on its first decision. One `Over`
    /// sentinel, no further sends, broadcasts still accumulate until END.
    #[tokio::test(start_paused = true)]
    async fn termination_sentinel_stops_speaking_but_not_listening() {
        let transport = ScriptedTransport::new();
        let mut participant = test_participant(ScriptedPolicy::terminating());
        let feed = transport.feeder();

        tokio::spawn(async move {
            time::sleep(Duration::from_secs(1)).await;
            feed.push(broadcast_packet(true, 7, "still chatting", Some(1)));
            time::sleep(Duration::from_secs(1)).await;
            feed.push(end_packet(true));
        });

        let next = coordinator(&transport)
            .handle_phase(&mut participant, start_packet(true, 3))
            .await
            .unwrap();

        assert!(next.is_none());
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, OVER);
        // the broadcast after Over still reached the history
        assert!(
            participant
                .talk_history
                .iter()
                .any(|t| t.text == "still chatting")
        );
    }

    /// Broadcasts merge in delivery order, and a partial snapshot updates
    /// only the remaining count.
    #[tokio::test(start_paused = true)]
    async fn broadcasts_merge_in_order() {
        let transport = ScriptedTransport::new();
        let mut participant = test_participant(ScriptedPolicy::listening());
        let feed = transport.feeder();

        tokio::spawn(async move {
            time::sleep(Duration::from_millis(600)).await;
            feed.push(broadcast_packet(true, 1, "first", Some(5)));
            feed.push(broadcast_packet(true, 2, "second", Some(5)));
            feed.push(broadcast_packet(true, 3, "third", Some(4)));
            time::sleep(Duration::from_secs(1)).await;
            feed.push(end_packet(true));
        });

        let _ = coordinator(&transport)
            .handle_phase(&mut participant, start_packet(true, 5))
            .await
            .unwrap();

        let texts: Vec<&str> = participant
            .talk_history
            .iter()
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(texts, ["first", "second", "third"]);

        let info = participant.info.as_ref().unwrap();
        assert_eq!(info.remain_count, Some(4));
        // full snapshot's status map survived the partial merges
        assert!(!info.status_map.is_empty());
        assert!(transport.sent().is_empty());
    }

    /// A non-realtime packet arriving mid-phase is returned exactly once
    /// and never merged as a phase message.
    #[tokio::test(start_paused = true)]
    async fn out_of_band_packet_is_preserved() {
        let transport = ScriptedTransport::new();
        let mut participant = test_participant(ScriptedPolicy::listening());
        let feed = transport.feeder();

        tokio::spawn(async move {
            time::sleep(Duration::from_secs(1)).await;
            feed.push(Packet::of(Request::Vote));
        });

        let next = coordinator(&transport)
            .handle_phase(&mut participant, start_packet(true, 5))
            .await
            .unwrap();

        assert_eq!(next.map(|p| p.request), Some(Request::Vote));
        assert!(participant.talk_history.is_empty());
    }

    /// Whisper phases accumulate into the whisper history and reconcile
    /// the whisper counter.
    #[tokio::test(start_paused = true)]
    async fn whisper_phase_uses_whisper_history() {
        let transport = ScriptedTransport::new();
        let mut participant = test_participant(ScriptedPolicy::listening());
        let feed = transport.feeder();

        tokio::spawn(async move {
            time::sleep(Duration::from_secs(1)).await;
            feed.push(broadcast_packet(false, 1, "psst", Some(2)));
            feed.push(end_packet(false));
        });

        let _ = coordinator(&transport)
            .handle_phase(&mut participant, start_packet(false, 2))
            .await
            .unwrap();

        assert_eq!(participant.whisper_history.len(), 1);
        assert!(participant.talk_history.is_empty());
        assert_eq!(participant.sent_whisper_count, 1);
    }

    /// remain_count reaching zero stops decisions; the phase still closes
    /// cleanly on the end request.
    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_stops_decisions() {
        let transport = ScriptedTransport::new();
        let mut participant = test_participant(ScriptedPolicy::saying(vec!["only"]));
        let feed = transport.feeder();

        tokio::spawn(async move {
            time::sleep(Duration::from_secs(10)).await;
            feed.push(end_packet(true));
        });

        let _ = coordinator(&transport)
            .handle_phase(&mut participant, start_packet(true, 1))
            .await
            .unwrap();

        // one budgeted send; the scripted policy would have errored on a
        // second decision call
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn listen_decision_sends_nothing() {
        let transport = ScriptedTransport::new();
        let mut participant = test_participant(ScriptedPolicy::listening());
        let feed = transport.feeder();

        tokio::spawn(async move {
            time::sleep(Duration::from_secs(2)).await;
            feed.push(end_packet(true));
        });

        let _ = coordinator(&transport)
            .handle_phase(&mut participant, start_packet(true, 3))
            .await
            .unwrap();
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn rejects_non_start_packet() {
        let transport = ScriptedTransport::new();
        let mut participant = test_participant(ScriptedPolicy::listening());

        let result = coordinator(&transport)
            .handle_phase(&mut participant, Packet::of(Request::TalkBroadcast))
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn cooldown_allows_first_send() {
        let state = PhaseState::new(true);
        assert!(state.cooldown_elapsed(Duration::from_secs(3)));
    }

    #[test]
    fn config_defaults_match_reference_timing() {
        let config = test_config();
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.speak_cooldown, Duration::from_secs(3));
    }
}
