use anyhow::Result;
use beacon_cluster::{Nodes, Replicator};
use beacon_core::Registry;
use beacon_discovery::Discovery;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::fmt::init as tracing_init;

mod config;
mod http;
mod metrics;
mod reaper;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_init();

    let config = config::Config::load()?;
    info!(
        zone = %config.zone,
        addr = %config.http_addr,
        peers = config.nodes.len(),
        "starting beacon-server"
    );

    let registry = Arc::new(Registry::new());
    let nodes: Arc<dyn Replicator> = Arc::new(Nodes::new(
        &config.http_addr,
        &config.zone,
        &config.nodes,
        Duration::from_millis(config.replication_timeout_ms),
        config.replication_queue,
    )?);
    let discovery = Arc::new(Discovery::new(config.zone.clone(), registry, nodes));
    let metrics = Arc::new(metrics::Metrics::new()?);

    tokio::spawn(reaper::run(
        discovery.clone(),
        Duration::from_secs(config.reaper_interval_secs),
        Duration::from_secs(config.instance_ttl_secs),
    ));

    http::serve(
        &config.http_addr,
        http::AppContext {
            discovery,
            metrics,
            poll_wait: Duration::from_secs(config.poll_wait_secs),
        },
    )
    .await
}
