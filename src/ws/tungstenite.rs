//! [`Transport`] backed by `tokio-tungstenite`.

use futures::{SinkExt as _, StreamExt as _};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::error::WsError;
use super::transport::{CloseFrame, NO_STATUS_RECEIVED, Socket, Transport, TransportEvents};

/// Opens WebSocket connections with `tokio-tungstenite`.
///
/// Each [`open`](Transport::open) spawns one task that owns the stream. Text
/// frames are forwarded as messages; binary frames and control frames are
/// ignored.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteTransport;

impl TungsteniteTransport {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Transport for TungsteniteTransport {
    fn open(&self, url: &str, events: TransportEvents) -> Box<dyn Socket> {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        tokio::spawn(run_socket(
            url.to_owned(),
            events,
            outgoing_rx,
            shutdown.clone(),
        ));

        Box::new(TungsteniteSocket {
            outgoing_tx,
            shutdown,
        })
    }
}

struct TungsteniteSocket {
    outgoing_tx: mpsc::UnboundedSender<String>,
    shutdown: CancellationToken,
}

impl Socket for TungsteniteSocket {
    fn send(&mut self, frame: String) -> Result<(), WsError> {
        self.outgoing_tx
            .send(frame)
            .map_err(|_e| WsError::ConnectionClosed)
    }

    fn close(&mut self) {
        self.shutdown.cancel();
    }
}

impl Drop for TungsteniteSocket {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_socket(
    url: String,
    events: TransportEvents,
    mut outgoing_rx: mpsc::UnboundedReceiver<String>,
    shutdown: CancellationToken,
) {
    #[cfg(feature = "tracing")]
    tracing::debug!(%url, "Connecting to WebSocket");

    let connected = tokio::select! {
        () = shutdown.cancelled() => return,
        result = connect_async(url.as_str()) => result,
    };

    let ws_stream = match connected {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(%url, error = %e, "Unable to connect");
            events.error(WsError::Connection(e));
            events.closed(CloseFrame::abnormal("connection failed"));
            return;
        }
    };

    events.opened();
    let (mut write, mut read) = ws_stream.split();

    let close = loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                // Released by the manager, which no longer wants callbacks.
                _ = write.send(Message::Close(None)).await;
                return;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        #[cfg(feature = "tracing")]
                        tracing::trace!(text = %text.as_str(), "Received WebSocket text message");
                        events.message(text.as_str().to_owned());
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break frame.map_or_else(
                            || CloseFrame::new(NO_STATUS_RECEIVED, ""),
                            |f| CloseFrame::new(u16::from(f.code), f.reason.as_str()),
                        );
                    }
                    Some(Ok(_)) => {
                        // Ignore binary frames and control frames.
                    }
                    Some(Err(e)) => {
                        events.error(WsError::Connection(e));
                        break CloseFrame::abnormal("stream error");
                    }
                    None => break CloseFrame::abnormal("stream ended"),
                }
            }

            Some(frame) = outgoing_rx.recv() => {
                if let Err(e) = write.send(Message::Text(frame.into())).await {
                    events.error(WsError::Connection(e));
                    break CloseFrame::abnormal("write failed");
                }
            }
        }
    };

    #[cfg(feature = "tracing")]
    tracing::debug!(%url, code = close.code, reason = %close.reason, "WebSocket closed");

    events.closed(close);
}
