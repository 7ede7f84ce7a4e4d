//! Background expiry of instances whose renewals have lapsed
//!
//! The registry never evicts on its own; this task cancels through the
//! facade so expiry replicates to peers like any client cancellation.

use beacon_api::{now_nanos, ArgCancel};
use beacon_discovery::Discovery;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub async fn run(discovery: Arc<Discovery>, interval: Duration, ttl: Duration) {
    let mut tick = tokio::time::interval(interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tick.tick().await;
        reap(&discovery, ttl).await;
    }
}

async fn reap(discovery: &Discovery, ttl: Duration) {
    let deadline = now_nanos() - ttl.as_nanos() as i64;
    for instances in discovery.fetch_all().await.into_values() {
        for ins in instances {
            if ins.renew_timestamp >= deadline {
                continue;
            }
            info!(appid = %ins.appid, hostname = %ins.hostname, "reaping lapsed instance");
            let arg = ArgCancel {
                zone: ins.zone,
                env: ins.env,
                appid: ins.appid,
                hostname: ins.hostname,
                latest_timestamp: 0,
                replication: false,
            };
            if let Err(err) = discovery.cancel(&arg).await {
                // Lost a race with a concurrent cancel; nothing to do.
                warn!(appid = %arg.appid, hostname = %arg.hostname, %err, "reap cancel failed");
            }
        }
    }
}
