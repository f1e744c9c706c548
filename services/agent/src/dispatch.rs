//! Top-level protocol dispatch: one control loop per game connection.
//!
//! Receives one packet at a time and routes it to the turn-based path or,
//! for realtime phase starts, hands the connection to the
//! [`RealtimeCoordinator`]. A packet the coordinator intercepted mid-phase
//! re-enters dispatch as if freshly received.

use crate::{
    client::{Transport, TransportError},
    config::Config,
    participant::Participant,
    policy::PolicyFactory,
    realtime::RealtimeCoordinator,
};
use anyhow::{Context, Result, anyhow};
use std::sync::Arc;
use tracing::{info, warn};
use wolf_protocol::{Packet, Request};

enum Flow {
    /// The packet is fully handled; receive the next one.
    Handled,
    /// A phase returned an unconsumed packet; dispatch it now.
    Redispatch(Packet),
    /// FINISH was handled; the game loop is done.
    GameOver,
}

pub struct Dispatcher {
    config: Config,
    name: String,
    transport: Arc<dyn Transport>,
    build_policy: PolicyFactory,
    participant: Option<Participant>,
    coordinator: Option<RealtimeCoordinator>,
}

impl Dispatcher {
    pub fn new(
        config: Config,
        name: String,
        transport: Arc<dyn Transport>,
        build_policy: PolicyFactory,
    ) -> Self {
        Self {
            config,
            name,
            transport,
            build_policy,
            participant: None,
            coordinator: None,
        }
    }

    /// Runs one game session to completion (FINISH) or to a fatal error.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            let mut packet = loop {
                match self.transport.receive().await {
                    Ok(packet) => break packet,
                    Err(TransportError::Transient(reason)) => {
                        warn!(agent = %self.name, %reason, "skipping unreadable packet");
                    }
                    Err(error) => {
                        return Err(error).context("failed to receive from the game server");
                    }
                }
            };
            loop {
                match self.dispatch(packet).await? {
                    Flow::Handled => break,
                    Flow::Redispatch(next) => packet = next,
                    Flow::GameOver => return Ok(()),
                }
            }
        }
    }

    async fn dispatch(&mut self, packet: Packet) -> Result<Flow> {
        let request = packet.request;

        if request.is_realtime() {
            // Continuing without a participant would run on undefined
            // state; this is a protocol-ordering defect, not a retryable
            // condition.
            let participant = self
                .participant
                .as_mut()
                .ok_or_else(|| anyhow!("realtime request {request:?} before any INITIALIZE"))?;
            if request.is_phase_start() {
                let coordinator = self.coordinator.get_or_insert_with(|| {
                    RealtimeCoordinator::new(
                        self.transport.clone(),
                        self.config.poll_interval,
                        self.config.speak_cooldown,
                    )
                });
                return Ok(match coordinator.handle_phase(participant, packet).await? {
                    Some(next) => Flow::Redispatch(next),
                    None => Flow::Handled,
                });
            }
            // A broadcast or end with no live phase: ordering anomaly,
            // skip-and-log.
            warn!(
                agent = %self.name,
                request = ?request,
                "realtime packet outside an active phase; skipping"
            );
            return Ok(Flow::Handled);
        }

        if request == Request::Name {
            self.transport.send(&self.name).await?;
            return Ok(Flow::Handled);
        }

        if request == Request::Initialize {
            self.participant = Some(Participant::new(
                &self.config,
                self.name.clone(),
                &packet,
                (self.build_policy)(),
            ));
            // a new game invalidates any phase state
            self.coordinator = None;
            info!(agent = %self.name, "participant initialized for a new game");
        }

        let participant = self
            .participant
            .as_mut()
            .ok_or_else(|| anyhow!("turn-based request {request:?} before any INITIALIZE"))?;
        if request != Request::Initialize {
            participant.set_packet(&packet);
        }
        let reply = participant.act().await?;
        // audit trail: one entry per inbound/outbound pair, keyed by kind
        info!(
            agent = %self.name,
            request = ?request,
            reply = reply.as_deref().unwrap_or(""),
            "request handled"
        );
        if let Some(text) = &reply {
            self.transport.send(text).await?;
        }

        if request == Request::Finish {
            self.flush_cost_report().await;
            return Ok(Flow::GameOver);
        }
        Ok(Flow::Handled)
    }

    /// Sends the accumulated cost report at game end, when there is
    /// anything to report. Best effort: failures never affect dispatch.
    async fn flush_cost_report(&self) {
        let Some(participant) = &self.participant else {
            return;
        };
        if participant.cost.call_count == 0 {
            return;
        }
        let Some(info) = &participant.info else {
            return;
        };
        participant
            .cost
            .report_to_server(
                &self.config.websocket_url,
                &info.game_id,
                &info.agent,
                &self.config.team,
            )
            .await;
        info!(
            agent = %self.name,
            total_cost = participant.cost.total_cost(),
            input_tokens = participant.cost.total_input_tokens,
            output_tokens = participant.cost.total_output_tokens,
            calls = participant.cost.call_count,
            "game cost summary"
        );
    }
}
