//! Lyrion Bridge daemon.
//!
//! Loads the persisted configuration, builds the coordinator and, when
//! configured, brings all entities online so their state streams onto the
//! event bus for the hub transport to pick up.

use std::sync::Arc;

use anyhow::Result;
use lyrion_bridge::{config, coordinator::Coordinator, hub};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lyrion_bridge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "Starting Lyrion Bridge v{} ({})",
        env!("LYRION_BRIDGE_VERSION"),
        env!("LYRION_BRIDGE_GIT_SHA")
    );

    let config = config::load();
    let configured = config.is_configured();

    let bus = hub::create_bus();
    let registry = Arc::new(hub::BusRegistry::new(bus.clone()));
    let coordinator = Arc::new(Coordinator::new(config, registry));

    // Log bus traffic; the hub transport subscribes the same way
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            tracing::debug!(?event, "bus event");
        }
    });

    if configured {
        if coordinator.initialize().await {
            // Standalone mode: poll every registered entity
            let entity_ids = coordinator.entity_ids().await;
            coordinator.subscribe(&entity_ids).await;
        }
    } else {
        tracing::info!("no configuration found; waiting for setup");
    }

    tracing::info!("bridge running, press Ctrl-C to stop");
    signal::ctrl_c().await?;

    coordinator.shutdown().await;
    tracing::info!("bye");
    Ok(())
}
