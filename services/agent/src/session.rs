//! Connection-level supervision: connect, run the dispatcher, disconnect,
//! and retry with a fixed backoff for as long as auto-reconnect is on.
//! Participant state never survives a reconnect; every cycle starts a
//! fresh dispatcher.

use crate::{
    client::{Connection, Transport},
    config::Config,
    dispatch::Dispatcher,
    policy::PolicyFactory,
};
use anyhow::Result;
use std::{sync::Arc, time::Duration};
use tokio::time;
use tracing::{info, warn};

const RECONNECT_BACKOFF: Duration = Duration::from_secs(15);

/// Runs one agent against the configured server until the process is
/// stopped or, with auto-reconnect off, until the first session ends.
pub async fn run_agent(config: Config, build_policy: PolicyFactory) -> Result<()> {
    let name = config.agent_name();
    loop {
        let connection =
            match Connection::connect(&config.websocket_url, config.token.as_deref()).await {
                Ok(connection) => connection,
                Err(error) => {
                    warn!(agent = %name, %error, "could not connect to the game server");
                    if !config.auto_reconnect {
                        return Err(error.into());
                    }
                    info!(agent = %name, "retrying in {:?}", RECONNECT_BACKOFF);
                    time::sleep(RECONNECT_BACKOFF).await;
                    continue;
                }
            };
        info!(agent = %name, url = %config.websocket_url, "connected to the game server");

        let transport: Arc<dyn Transport> = Arc::new(connection);
        let mut dispatcher = Dispatcher::new(
            config.clone(),
            name.clone(),
            transport.clone(),
            build_policy.clone(),
        );
        let outcome = dispatcher.run().await;

        transport.close().await;
        info!(agent = %name, "disconnected from the game server");

        if let Err(error) = outcome {
            warn!(agent = %name, error = ?error, "game session ended with an error");
        }
        if !config.auto_reconnect {
            break;
        }
    }
    Ok(())
}
