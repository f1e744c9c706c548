//! Token usage and cost accounting for the decision participant.
//!
//! Purely passive: call sites record usage deltas on completion of each
//! decision call, and the dispatcher flushes a best-effort report to the
//! server when a game finishes.

use serde::Serialize;
use tracing::{info, warn};
use url::Url;

/// Per-model pricing in USD per 1M tokens: (model prefix, input, output).
const COST_TABLE: &[(&str, f64, f64)] = &[
    ("gpt-4o-2024-11-20", 2.50, 10.00),
    ("gpt-4o-mini", 0.15, 0.60),
    ("gpt-4o", 2.50, 10.00),
    ("gpt-4.1-mini", 0.40, 1.60),
    ("gpt-4.1-nano", 0.10, 0.40),
    ("gpt-4.1", 2.00, 8.00),
    ("o3-mini", 1.10, 4.40),
    ("o4-mini", 1.10, 4.40),
    ("gemini-2.0-flash-lite", 0.02, 0.10),
    ("gemini-2.0-flash", 0.10, 0.40),
    ("gemini-2.5-flash", 0.15, 0.60),
    ("gemini-2.5-pro", 1.25, 10.00),
    ("gemini-1.5-flash", 0.075, 0.30),
    ("gemini-1.5-pro", 1.25, 5.00),
    ("ollama", 0.0, 0.0),
];

/// Token counts reported by one decision call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// One tracked call with its priced-out cost.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackedCall {
    pub usage: Usage,
    pub input_cost: f64,
    pub output_cost: f64,
}

/// Cumulative usage counters for one participant instance.
#[derive(Debug, Default)]
pub struct CostTracker {
    pub llm_type: String,
    pub model_name: String,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_input_cost: f64,
    pub total_output_cost: f64,
    pub call_count: u64,
    pub history: Vec<TrackedCall>,
}

/// The report payload the server's cost endpoint expects.
#[derive(Serialize, Debug)]
pub struct CostReport {
    pub game_id: String,
    pub agent: String,
    pub team: String,
    pub model: String,
    pub llm_type: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
    pub call_count: u64,
}

impl CostTracker {
    pub fn new(llm_type: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            llm_type: llm_type.into(),
            model_name: model_name.into(),
            ..Self::default()
        }
    }

    /// USD per 1M tokens for the configured model: exact match first, then
    /// prefix match, else zero with a warning.
    fn cost_per_million(&self) -> (f64, f64) {
        if self.llm_type == "ollama" {
            return (0.0, 0.0);
        }
        if let Some(&(_, input, output)) = COST_TABLE
            .iter()
            .find(|(name, _, _)| *name == self.model_name)
        {
            return (input, output);
        }
        if let Some(&(_, input, output)) = COST_TABLE
            .iter()
            .find(|(name, _, _)| self.model_name.starts_with(name))
        {
            return (input, output);
        }
        warn!(model = %self.model_name, "model not in the cost table; pricing it at zero");
        (0.0, 0.0)
    }

    /// Records one decision call's usage and returns its priced-out record.
    pub fn track(&mut self, usage: Usage) -> TrackedCall {
        let (input_per_m, output_per_m) = self.cost_per_million();
        let call = TrackedCall {
            usage,
            input_cost: usage.input_tokens as f64 / 1_000_000.0 * input_per_m,
            output_cost: usage.output_tokens as f64 / 1_000_000.0 * output_per_m,
        };

        self.total_input_tokens += usage.input_tokens;
        self.total_output_tokens += usage.output_tokens;
        self.total_input_cost += call.input_cost;
        self.total_output_cost += call.output_cost;
        self.call_count += 1;
        self.history.push(call);
        call
    }

    pub fn total_cost(&self) -> f64 {
        self.total_input_cost + self.total_output_cost
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_input_tokens + self.total_output_tokens
    }

    fn to_report(&self, game_id: &str, agent_name: &str, team_name: &str) -> CostReport {
        CostReport {
            game_id: game_id.to_string(),
            agent: agent_name.to_string(),
            team: team_name.to_string(),
            model: self.model_name.clone(),
            llm_type: self.llm_type.clone(),
            input_tokens: self.total_input_tokens,
            output_tokens: self.total_output_tokens,
            input_cost: self.total_input_cost,
            output_cost: self.total_output_cost,
            total_cost: self.total_cost(),
            call_count: self.call_count,
        }
    }

    /// POSTs the accumulated report to the server's cost endpoint, derived
    /// from the websocket URL. Failures are logged and never propagate.
    pub async fn report_to_server(
        &self,
        ws_url: &str,
        game_id: &str,
        agent_name: &str,
        team_name: &str,
    ) {
        let Some(endpoint) = report_endpoint(ws_url) else {
            warn!(url = %ws_url, "could not derive a cost report endpoint");
            return;
        };

        let payload = self.to_report(game_id, agent_name, team_name);
        let client = reqwest::Client::new();
        let result = client
            .post(&endpoint)
            .json(&payload)
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                info!(agent = %agent_name, total_cost = self.total_cost(), "cost report sent");
            }
            Ok(response) => {
                warn!(status = %response.status(), "cost report rejected by the server");
            }
            Err(e) => {
                warn!(error = %e, "failed to send the cost report");
            }
        }
    }
}

/// Derives `http(s)://host[:port]/api/cost/report` from a `ws(s)://` URL.
pub fn report_endpoint(ws_url: &str) -> Option<String> {
    let parsed = Url::parse(ws_url).ok()?;
    let scheme = match parsed.scheme() {
        "wss" => "https",
        "ws" => "http",
        _ => return None,
    };
    let host = parsed.host_str()?;
    match parsed.port() {
        Some(port) => Some(format!("{scheme}://{host}:{port}/api/cost/report")),
        None => Some(format!("{scheme}://{host}/api/cost/report")),
    }
}
