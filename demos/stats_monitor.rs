//! Live monitor for the detection service's event channel.
//!
//! Connects to `STATS_WS_URL` (default `ws://localhost:8000/ws`), logs every
//! counts frame, sends a keep-alive frame every 30 seconds, and exits once
//! automatic reconnection gives up.
//!
//! Run with tracing enabled:
//! ```sh
//! RUST_LOG=info,stats_channel=debug cargo run --example stats_monitor --features tracing
//! ```

use std::time::Duration;

use futures::StreamExt as _;
use serde_json::json;
use stats_channel::types::StatsFrame;
use stats_channel::ws::{
    Config, ConnectionManager, Event, EventKind, JsonParser, TungsteniteTransport,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    info!(endpoint = %config.endpoint, "Starting stats monitor");

    let manager: ConnectionManager<StatsFrame> =
        ConnectionManager::new(config, TungsteniteTransport::new(), JsonParser::new())?;

    manager.add_listener(EventKind::Connection, |event| {
        if let Event::Connection { connected } = event {
            info!(connected, "Connection changed");
        }
    });
    manager.add_listener(EventKind::Error, |event| {
        if let Event::Error(error) = event {
            warn!(%error, "Channel error");
        }
    });

    let mut frames = Box::pin(manager.subscribe(EventKind::Message));
    let mut exhausted = Box::pin(manager.subscribe(EventKind::Exhausted));
    let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);

    manager.connect_default();

    loop {
        tokio::select! {
            Some(event) = frames.next() => {
                let Event::Message(frame) = event else {
                    continue;
                };
                match frame {
                    StatsFrame::Counts(counts) => info!(
                        heavy = counts.heavy_vehicles,
                        light = counts.light_vehicles,
                        total = counts.total(),
                        classes = ?counts.class_counters,
                        "Counts"
                    ),
                    StatsFrame::Status(status) => debug!(
                        status = %status.status,
                        message = %status.message,
                        "Status reply"
                    ),
                    other => debug!(frame = ?other, "Unhandled frame"),
                }
            }
            Some(_) = exhausted.next() => {
                warn!(
                    attempts = manager.reconnect_attempt().count,
                    "Gave up reconnecting"
                );
                break;
            }
            _ = keepalive.tick() => {
                if manager.is_connected_now()
                    && let Err(e) = manager.send(&json!({ "type": "keepalive" }))
                {
                    debug!(error = %e, "Keep-alive not sent");
                }
            }
        }
    }

    manager.disconnect();
    Ok(())
}
