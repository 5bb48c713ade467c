//! Resilient event-channel client.
//!
//! This module keeps one streaming connection alive, reconnects with capped
//! exponential backoff, and fans decoded frames out to listeners.
//!
//! # Architecture
//!
//! - [`ConnectionManager`]: Handle to the background task that owns the socket
//! - [`Transport`]: Opens sockets; [`TungsteniteTransport`] with the `ws` feature
//! - [`MessageParser`]: Trait for parsing incoming frames
//! - [`ReconnectPolicy`]: Attempt counting and backoff delays
//! - [`ListenerRegistry`]: Ordered per-kind subscribers
//!
//! # Example
//!
//! ```ignore
//! let manager: ConnectionManager<StatsFrame> =
//!     ConnectionManager::new(Config::from_env()?, TungsteniteTransport::new(), JsonParser::new())?;
//!
//! let mut counts = manager.subscribe(EventKind::Message);
//! manager.connect_default();
//!
//! while let Some(Event::Message(frame)) = counts.next().await {
//!     println!("{frame:?}");
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod listeners;
pub mod reconnect;
pub mod timer;
pub mod traits;
pub mod transport;
#[cfg(feature = "ws")]
pub mod tungstenite;

pub use config::{Config, ReconnectConfig};
pub use connection::{ConnectionManager, ConnectionState};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use listeners::{Event, EventKind, ListenerId, ListenerRegistry, Unsubscribe};
pub use reconnect::{ReconnectAttempt, ReconnectPhase, ReconnectPolicy};
pub use timer::{Scheduler, TimerHandle, TokioScheduler};
pub use traits::*;
pub use transport::{CloseFrame, Socket, Transport, TransportEvents};
#[cfg(feature = "ws")]
pub use tungstenite::TungsteniteTransport;
