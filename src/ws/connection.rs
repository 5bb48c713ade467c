#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::Stream;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};

use super::config::Config;
use super::error::WsError;
use super::listeners::{Event, EventKind, ListenerId, ListenerRegistry, Unsubscribe};
use super::reconnect::{Decision, ReconnectAttempt, ReconnectPolicy};
use super::timer::{Scheduler, TimerHandle, TokioScheduler};
use super::traits::MessageParser;
use super::transport::{Socket, Transport, TransportEvent, TransportEvents};
use crate::Result;
use crate::error::{Error, Kind};

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Never connected
    #[default]
    Idle,
    /// Waiting for the transport to open
    Connecting,
    /// Successfully connected
    Open {
        /// When the connection was established
        since: Instant,
    },
    /// Tearing down on request
    Closing,
    /// The last connection is gone
    Closed,
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Open { .. })
    }
}

/// Everything the actor task reacts to, in arrival order.
#[derive(Debug)]
pub(crate) enum Command {
    Connect(String),
    Disconnect,
    Send(String),
    Reconnect { epoch: u64 },
    Transport { generation: u64, event: TransportEvent },
    Shutdown,
}

/// Keeps one streaming connection alive and fans its events out to listeners.
///
/// All clones share one background task that owns the socket, the reconnect
/// policy, and the pending reconnect timer. Collaborator calls and transport
/// callbacks are queued on a single channel and handled one at a time, so
/// messages are delivered in receive order and `Connection { connected: true }`
/// always precedes the messages of that connection.
///
/// Dropping the last clone closes the socket and cancels any pending timer.
/// Listeners are owned by the manager, so a listener that captures a clone
/// keeps it alive forever. Prefer [`subscribe`](Self::subscribe), or remove
/// such a listener through its [`Unsubscribe`] before dropping the other handles.
///
/// # Example
///
/// ```ignore
/// let manager: ConnectionManager<StatsFrame> =
///     ConnectionManager::new(Config::default(), TungsteniteTransport::new(), JsonParser::new())?;
///
/// manager.add_listener(EventKind::Message, |event| {
///     if let Event::Message(frame) = event {
///         println!("{frame:?}");
///     }
/// });
/// manager.connect_default();
/// ```
pub struct ConnectionManager<M> {
    inner: Arc<Inner<M>>,
}

struct Inner<M> {
    config: Config,
    commands: mpsc::UnboundedSender<Command>,
    registry: Arc<ListenerRegistry<M>>,
    state_rx: watch::Receiver<ConnectionState>,
    attempt_rx: watch::Receiver<ReconnectAttempt>,
}

impl<M> Drop for Inner<M> {
    fn drop(&mut self) {
        _ = self.commands.send(Command::Shutdown);
    }
}

impl<M> Clone for ConnectionManager<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M> fmt::Debug for ConnectionManager<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.inner.config.endpoint)
            .field("state", &*self.inner.state_rx.borrow())
            .finish_non_exhaustive()
    }
}

impl<M: Send + Sync + 'static> ConnectionManager<M> {
    /// Create a manager that schedules reconnects with [`TokioScheduler`].
    ///
    /// Must be called from within a Tokio runtime. Nothing connects until
    /// [`connect`](Self::connect) is called.
    pub fn new<T, P>(config: Config, transport: T, parser: P) -> Result<Self>
    where
        T: Transport,
        P: MessageParser<M>,
    {
        Self::with_scheduler(config, transport, parser, TokioScheduler)
    }

    /// Create a manager with a custom reconnect [`Scheduler`].
    ///
    /// Fails with a validation error if the reconnect tuning could shrink delays.
    pub fn with_scheduler<T, P, S>(
        config: Config,
        transport: T,
        parser: P,
        scheduler: S,
    ) -> Result<Self>
    where
        T: Transport,
        P: MessageParser<M>,
        S: Scheduler,
    {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| Error::with_source(Kind::Internal, e))?;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let (attempt_tx, attempt_rx) = watch::channel(ReconnectAttempt::default());
        let registry = Arc::new(ListenerRegistry::new());

        let driver = Driver {
            transport: Box::new(transport),
            scheduler: Box::new(scheduler),
            parser,
            registry: Arc::clone(&registry),
            commands: commands_tx.clone(),
            state_tx,
            attempt_tx,
            policy: ReconnectPolicy::new(config.reconnect.clone()),
            url: None,
            socket: None,
            generation: 0,
            pending: None,
            timer_epoch: 0,
        };
        runtime.spawn(driver.run(commands_rx));

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                commands: commands_tx,
                registry,
                state_rx,
                attempt_rx,
            }),
        })
    }

    /// Open a connection to `url`, closing any existing one first.
    ///
    /// Resets the reconnect policy, so this also recovers from exhaustion.
    /// Never fails; connection problems surface as events.
    pub fn connect(&self, url: &str) {
        self.command(Command::Connect(url.to_owned()));
    }

    /// [`connect`](Self::connect) to the configured endpoint.
    pub fn connect_default(&self) {
        self.connect(&self.inner.config.endpoint);
    }

    /// Close the connection without reconnecting and cancel any pending reconnect.
    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    /// Send a JSON-encoded request over the open connection.
    ///
    /// Fails with [`WsError::ChannelUnavailable`] unless the connection is open.
    /// Frames are never buffered across reconnects.
    pub fn send<R: Serialize>(&self, request: &R) -> Result<()> {
        if !self.is_connected_now() {
            return Err(WsError::ChannelUnavailable.into());
        }

        let json = serde_json::to_string(request)?;
        self.inner
            .commands
            .send(Command::Send(json))
            .map_err(|_e| WsError::ConnectionClosed)?;
        Ok(())
    }

    /// Register `callback` for events of `kind`.
    pub fn add_listener<F>(&self, kind: EventKind, callback: F) -> Unsubscribe<M>
    where
        F: Fn(&Event<M>) + Send + Sync + 'static,
    {
        self.inner.registry.add(kind, callback)
    }

    /// Remove a registration. Unknown registrations are ignored.
    pub fn remove_listener(&self, kind: EventKind, id: ListenerId) -> bool {
        self.inner.registry.remove(kind, id)
    }

    /// Number of listeners registered for `kind`.
    #[must_use]
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.inner.registry.len(kind)
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_rx.borrow()
    }

    /// Whether the connection is open right now.
    #[must_use]
    pub fn is_connected_now(&self) -> bool {
        self.state().is_connected()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_rx.clone()
    }

    /// Get the current reconnect policy snapshot.
    #[must_use]
    pub fn reconnect_attempt(&self) -> ReconnectAttempt {
        *self.inner.attempt_rx.borrow()
    }

    /// Subscribe to reconnect policy changes.
    #[must_use]
    pub fn reconnect_receiver(&self) -> watch::Receiver<ReconnectAttempt> {
        self.inner.attempt_rx.clone()
    }

    /// Configuration this manager was created with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    fn command(&self, command: Command) {
        if self.inner.commands.send(command).is_err() {
            #[cfg(feature = "tracing")]
            tracing::warn!("Connection task has stopped, ignoring command");
        }
    }
}

impl<M: Clone + Send + Sync + 'static> ConnectionManager<M> {
    /// Stream the events of `kind`. Dropping the stream removes its listener.
    ///
    /// Events are buffered without bound until the stream is polled.
    #[must_use]
    pub fn subscribe(&self, kind: EventKind) -> impl Stream<Item = Event<M>> + use<M> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registration = UnsubscribeOnDrop(Some(self.add_listener(kind, move |event| {
            _ = tx.send(event.clone());
        })));

        async_stream::stream! {
            let _registration = registration;
            while let Some(event) = rx.recv().await {
                yield event;
            }
        }
    }
}

struct UnsubscribeOnDrop<M>(Option<Unsubscribe<M>>);

impl<M> Drop for UnsubscribeOnDrop<M> {
    fn drop(&mut self) {
        if let Some(registration) = self.0.take() {
            registration.unsubscribe();
        }
    }
}

/// Background task owning the socket and all mutable connection state.
struct Driver<M, P> {
    transport: Box<dyn Transport>,
    scheduler: Box<dyn Scheduler>,
    parser: P,
    registry: Arc<ListenerRegistry<M>>,
    commands: mpsc::UnboundedSender<Command>,
    state_tx: watch::Sender<ConnectionState>,
    attempt_tx: watch::Sender<ReconnectAttempt>,
    policy: ReconnectPolicy,
    /// Target of the latest explicit `connect`
    url: Option<String>,
    socket: Option<Box<dyn Socket>>,
    /// Generation of the current socket; callbacks tagged otherwise are stale
    generation: u64,
    pending: Option<TimerHandle>,
    /// Epoch of the pending timer; fires tagged otherwise are stale
    timer_epoch: u64,
}

impl<M, P> Driver<M, P>
where
    M: Send + Sync + 'static,
    P: MessageParser<M>,
{
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Connect(url) => self.connect(url),
                Command::Disconnect => self.disconnect(),
                Command::Send(frame) => self.send(frame),
                Command::Reconnect { epoch } => self.reconnect(epoch),
                Command::Transport { generation, event } => {
                    if generation == self.generation && self.socket.is_some() {
                        self.handle_transport(event);
                    } else {
                        #[cfg(feature = "tracing")]
                        tracing::trace!(generation, ?event, "Ignoring callback from a released socket");
                    }
                }
                Command::Shutdown => break,
            }
        }

        self.cancel_pending();
        if let Some(mut socket) = self.socket.take() {
            socket.close();
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Connection task stopped");
    }

    fn connect(&mut self, url: String) {
        self.cancel_pending();
        self.policy.reset();
        self.publish_attempt();
        self.url = Some(url);
        self.open_socket();
    }

    fn reconnect(&mut self, epoch: u64) {
        if epoch != self.timer_epoch || self.pending.take().is_none() {
            #[cfg(feature = "tracing")]
            tracing::trace!(epoch, "Ignoring cancelled reconnect timer");
            return;
        }

        self.policy.on_fire();
        self.publish_attempt();

        #[cfg(feature = "tracing")]
        {
            let attempt = self.policy.attempt();
            match self.policy.max_attempts() {
                Some(max) => tracing::info!("Attempting to reconnect ({}/{max})", attempt.count),
                None => tracing::info!("Attempting to reconnect ({})", attempt.count),
            }
        }

        self.open_socket();
    }

    fn open_socket(&mut self) {
        let Some(url) = self.url.clone() else {
            return;
        };

        // Never keep two sockets alive.
        self.release_socket();

        self.generation = self.generation.wrapping_add(1);
        let events = TransportEvents::new(self.generation, self.commands.clone());

        #[cfg(feature = "tracing")]
        tracing::info!(%url, generation = self.generation, "Connecting");

        self.set_state(ConnectionState::Connecting);
        self.socket = Some(self.transport.open(&url, events));
    }

    fn disconnect(&mut self) {
        self.cancel_pending();
        self.policy.cancel();
        self.publish_attempt();
        self.release_socket();
    }

    /// Close the current socket, if any, and report the lost connection once.
    fn release_socket(&mut self) {
        let Some(mut socket) = self.socket.take() else {
            return;
        };

        self.set_state(ConnectionState::Closing);
        socket.close();
        self.set_state(ConnectionState::Closed);
        self.registry.notify(&Event::Connection { connected: false });
    }

    fn send(&mut self, frame: String) {
        match self.socket.as_mut() {
            Some(socket) if self.state_tx.borrow().is_connected() => {
                if let Err(e) = socket.send(frame) {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %e, "Failed to send frame");
                    #[cfg(not(feature = "tracing"))]
                    let _: &WsError = &e;
                }
            }
            _ => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Dropping outbound frame, connection closed before it was sent");
                #[cfg(not(feature = "tracing"))]
                let _: &String = &frame;
            }
        }
    }

    fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => self.on_open(),
            TransportEvent::Message(frame) => self.on_message(&frame),
            TransportEvent::Closed(frame) => {
                #[cfg(feature = "tracing")]
                tracing::info!(code = frame.code, reason = %frame.reason, "WebSocket closed");
                #[cfg(not(feature = "tracing"))]
                let _: &super::transport::CloseFrame = &frame;
                self.on_close();
            }
            TransportEvent::Error(error) => {
                #[cfg(feature = "tracing")]
                tracing::error!(%error, "WebSocket error");
                self.registry.notify(&Event::Error(Arc::new(error)));
            }
        }
    }

    fn on_open(&mut self) {
        if *self.state_tx.borrow() != ConnectionState::Connecting {
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::info!("WebSocket connection established");

        self.set_state(ConnectionState::Open {
            since: Instant::now(),
        });
        self.policy.reset();
        self.publish_attempt();
        self.registry.notify(&Event::Connection { connected: true });
    }

    fn on_message(&self, frame: &str) {
        if !self.state_tx.borrow().is_connected() {
            #[cfg(feature = "tracing")]
            tracing::warn!(%frame, "Dropping frame received before open");
            return;
        }

        match self.parser.parse(frame) {
            Ok(message) => {
                self.registry.notify(&Event::Message(message));
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(%frame, error = %e, "Failed to parse WebSocket message");
                #[cfg(not(feature = "tracing"))]
                let _: &WsError = &e;
            }
        }
    }

    fn on_close(&mut self) {
        // The transport already released the connection.
        self.socket = None;
        self.set_state(ConnectionState::Closed);
        self.registry.notify(&Event::Connection { connected: false });

        let decision = self.policy.on_close();
        self.publish_attempt();

        match decision {
            Decision::Retry(delay) => self.schedule(delay),
            Decision::Exhausted => {
                #[cfg(feature = "tracing")]
                tracing::error!("Max reconnection attempts reached");
                self.registry.notify(&Event::Exhausted);
            }
            Decision::Halted => {}
        }
    }

    fn schedule(&mut self, delay: Duration) {
        self.cancel_pending();
        self.timer_epoch = self.timer_epoch.wrapping_add(1);

        let epoch = self.timer_epoch;
        let commands = self.commands.clone();

        #[cfg(feature = "tracing")]
        tracing::debug!(?delay, "Scheduling reconnect");

        self.pending = Some(self.scheduler.schedule(
            delay,
            Box::new(move || {
                _ = commands.send(Command::Reconnect { epoch });
            }),
        ));
    }

    fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.cancel();
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);

        #[cfg(feature = "tracing")]
        tracing::debug!(?previous, current = ?state, "Connection state changed");
        #[cfg(not(feature = "tracing"))]
        let _: ConnectionState = previous;
    }

    fn publish_attempt(&self) {
        self.attempt_tx.send_replace(self.policy.attempt());
    }
}
