use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// Websocket URL of the game server (`ws://` or `wss://`).
    pub websocket_url: String,
    /// Optional bearer token presented on connect.
    pub token: Option<String>,
    /// Whether to reconnect and start a fresh session after a failure.
    pub auto_reconnect: bool,
    /// How often the realtime coordinator polls for new broadcasts and
    /// reconsiders speaking.
    pub poll_interval: Duration,
    /// Minimum interval between two outgoing realtime utterances.
    pub speak_cooldown: Duration,
    /// Team name; the display name is `{team}{index}`.
    pub team: String,
    /// Per-process agent index.
    pub agent_index: u32,
    /// Provider key for the cost table (e.g. "openai", "ollama").
    pub llm_type: String,
    /// Model name for the cost table.
    pub llm_model: String,
    pub log_level: Level,
}

fn parse_secs(var: &str, default: f64) -> Result<Duration, ConfigError> {
    let value = match std::env::var(var) {
        Ok(raw) => raw
            .parse::<f64>()
            .map_err(|e| ConfigError::InvalidValue(var.to_string(), e.to_string()))?,
        Err(_) => default,
    };
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::InvalidValue(
            var.to_string(),
            format!("'{}' is not a valid duration in seconds", value),
        ));
    }
    Ok(Duration::from_secs_f64(value))
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let websocket_url = std::env::var("WEBSOCKET_URL")
            .map_err(|_| ConfigError::MissingVar("WEBSOCKET_URL".to_string()))?;

        let token = std::env::var("WEBSOCKET_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());

        let auto_reconnect_str =
            std::env::var("AUTO_RECONNECT").unwrap_or_else(|_| "true".to_string());
        let auto_reconnect = auto_reconnect_str.parse::<bool>().map_err(|_| {
            ConfigError::InvalidValue(
                "AUTO_RECONNECT".to_string(),
                format!("'{}' is not a boolean", auto_reconnect_str),
            )
        })?;

        let poll_interval = parse_secs("REALTIME_POLL_INTERVAL", 0.5)?;
        let speak_cooldown = parse_secs("REALTIME_SPEAK_COOLDOWN", 3.0)?;

        let team = std::env::var("TEAM_NAME").unwrap_or_else(|_| "wolf".to_string());

        let agent_index_str = std::env::var("AGENT_INDEX").unwrap_or_else(|_| "1".to_string());
        let agent_index = agent_index_str.parse::<u32>().map_err(|_| {
            ConfigError::InvalidValue(
                "AGENT_INDEX".to_string(),
                format!("'{}' is not a valid index", agent_index_str),
            )
        })?;

        let llm_type = std::env::var("LLM_TYPE").unwrap_or_else(|_| "ollama".to_string());
        let llm_model = std::env::var("LLM_MODEL").unwrap_or_else(|_| "ollama".to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            websocket_url,
            token,
            auto_reconnect,
            poll_interval,
            speak_cooldown,
            team,
            agent_index,
            llm_type,
            llm_model,
            log_level,
        })
    }

    /// The display name this agent answers a NAME request with.
    pub fn agent_name(&self) -> String {
        format!("{}{}", self.team, self.agent_index)
    }
}
