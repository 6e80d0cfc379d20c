//! pairwise Session Host
//!
//! Serves sessions of paired objects. Every client that calls
//! `start_session` on the session manager gets a session root with an
//! `EchoMember` peer for the local location; the client binds its own member
//! at the returned base and both start once the pairing completes.

use anyhow::Result;
use pairwise_message::Details;
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pairwise_session_host::config::HostConfig;
use pairwise_session_host::demo::EchoMember;
use pairwise_session_host::{bootstrap_session, NodeContext, SessionManager, System};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first: it carries the default log level
    let config = HostConfig::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting pairwise session host");
    info!(
        system_name = %config.system_name,
        service_path = %config.service_path,
        call_timeout_ms = config.call_timeout_ms,
        pairing_timeout_secs = ?config.pairing_timeout_secs,
        "Configuration loaded"
    );

    let system = System::from_config(&config);
    let manager = system.bind(
        config.service_path.clone(),
        SessionManager::from_config(&config, EchoMember::factory()),
        NodeContext::new(),
    )?;

    let client = if config.demo_client {
        let client_system = system.sibling("client");
        match bootstrap_session(
            &client_system,
            &config.service_path,
            None,
            &EchoMember::factory(),
            None,
            Details::new(),
        )
        .await
        {
            Ok((member, started)) => {
                info!(session_id = %started.id, base = %started.base, "Loopback client joined");
                if let Err(e) = member
                    .call("pair", json!({"role": "bello", "peer_role": "view"}))
                    .await
                {
                    error!(error = %e, "Loopback client could not start a pairing");
                }
                Some(member)
            }
            Err(e) => {
                error!(error = %e, "Loopback client failed to start");
                None
            }
        }
    } else {
        None
    };

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    if let Some(member) = client {
        member.unbind().await;
    }
    manager.unbind().await;

    info!("Session host shutdown complete");
    Ok(())
}
