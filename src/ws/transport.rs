//! Transport abstraction the connection manager drives.
//!
//! A [`Transport`] opens one duplex streaming connection per call and reports
//! what happens on it through the [`TransportEvents`] handle it was given. The
//! manager never talks to a socket library directly, so tests can substitute a
//! fake transport and fire open/message/close/error deterministically.

use std::fmt;

use tokio::sync::mpsc;

use super::connection::Command;
use super::error::WsError;

/// Close code for a connection that dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Close code used when the peer sent a close frame without a status.
pub const NO_STATUS_RECEIVED: u16 = 1005;

/// Code and reason reported when a connection closes.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

impl CloseFrame {
    #[must_use]
    pub fn new<S: Into<String>>(code: u16, reason: S) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn abnormal<S: Into<String>>(reason: S) -> Self {
        Self::new(ABNORMAL_CLOSURE, reason)
    }
}

impl fmt::Display for CloseFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.reason)
    }
}

/// Callbacks a transport delivers for a single socket.
#[derive(Debug)]
pub(crate) enum TransportEvent {
    Opened,
    Message(String),
    Closed(CloseFrame),
    Error(WsError),
}

/// Opens streaming connections.
pub trait Transport: Send + Sync + 'static {
    /// Start opening a connection to `url`.
    ///
    /// Must not block. The outcome is reported later through `events`: either
    /// [`TransportEvents::opened`], or [`TransportEvents::error`] followed by
    /// [`TransportEvents::closed`].
    fn open(&self, url: &str, events: TransportEvents) -> Box<dyn Socket>;
}

/// Handle to one connection opened by a [`Transport`].
pub trait Socket: Send + 'static {
    /// Queue a text frame for the remote side.
    fn send(&mut self, frame: String) -> Result<(), WsError>;

    /// Close the connection and release its resources.
    ///
    /// Callbacks reported after this call are ignored by the manager.
    fn close(&mut self);
}

/// Sink through which a transport reports callbacks for one socket.
///
/// Every socket gets its own sink tagged with that socket's generation, so
/// callbacks from a socket the manager has already replaced are discarded.
#[derive(Clone)]
pub struct TransportEvents {
    generation: u64,
    commands: mpsc::UnboundedSender<Command>,
}

impl TransportEvents {
    pub(crate) fn new(generation: u64, commands: mpsc::UnboundedSender<Command>) -> Self {
        Self {
            generation,
            commands,
        }
    }

    /// The connection is established.
    pub fn opened(&self) {
        self.emit(TransportEvent::Opened);
    }

    /// One inbound text frame.
    pub fn message(&self, frame: String) {
        self.emit(TransportEvent::Message(frame));
    }

    /// The connection closed, cleanly or not.
    pub fn closed(&self, frame: CloseFrame) {
        self.emit(TransportEvent::Closed(frame));
    }

    /// A transport-level failure. A [`closed`](Self::closed) call is expected to follow.
    pub fn error(&self, error: WsError) {
        self.emit(TransportEvent::Error(error));
    }

    fn emit(&self, event: TransportEvent) {
        // The manager may already be gone; nothing is listening in that case.
        _ = self.commands.send(Command::Transport {
            generation: self.generation,
            event,
        });
    }
}

impl fmt::Debug for TransportEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportEvents")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}
