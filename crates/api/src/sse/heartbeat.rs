//! Periodic keep-alive frames for idle SSE connections.
//!
//! Intermediaries (nginx, load balancers) cut idle streams; a comment
//! frame every 30 seconds keeps them open. Ping failures double as dead
//! connection detection.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::registry::ConnectionRegistry;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

pub fn start_heartbeat(
    registry: Arc<ConnectionRegistry>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("SSE heartbeat shutting down");
                    break;
                }
                _ = interval.tick() => {
                    registry.ping_all();
                }
            }
        }
    })
}
