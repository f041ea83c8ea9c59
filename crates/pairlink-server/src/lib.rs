//! pairlink relay server.
//!
//! Presence and matchmaking relay: tracks which users hold an open
//! connection, relays direct events between them (chat broadcast, typing
//! indicators, call invites), and pairs anonymously waiting users into
//! two-party call rooms, backfilling a room from the queue when one side
//! leaves.
//!
//! # Architecture
//!
//! The relay core follows the sans-IO pattern: [`RelayDriver`] consumes
//! [`RelayEvent`]s and returns [`RelayAction`]s without performing any I/O,
//! while [`Server`] executes the actions over axum WebSocket connections.
//! Each inbound event is processed to completion under a single driver lock
//! before the next is admitted, so multi-structure updates (for example a
//! disconnect's queue/room/presence cleanup) are never observed partially.
//!
//! # Components
//!
//! - [`RelayDriver`]: action-based orchestrator (pure logic, no I/O)
//! - [`PresenceRegistry`]: who is online, keyed by connection
//! - [`MatchQueue`]: FIFO anonymous-pairing queue
//! - [`RoomTracker`]: active call rooms with queue backfill
//! - [`Server`]: production runtime executing driver actions
//! - [`SystemEnv`]: production randomness (OS CSPRNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod driver;
mod env;
mod error;
mod matchmaker;
mod registry;
mod rooms;
mod transport;

use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use pairlink_proto::{ClientEvent, ServerEvent};
use tokio::{
    net::TcpListener,
    sync::{Mutex, RwLock, mpsc},
};

pub use driver::{DriverConfig, RelayAction, RelayDriver, RelayEvent};
pub use env::{Environment, SystemEnv};
pub use error::ServerError;
pub use matchmaker::{EnqueueOutcome, MatchQueue, WaitingEntry, generate_room_id};
pub use registry::{ConnectionId, PresenceRegistry, UserPresence};
pub use rooms::{Occupant, RoomTracker, VacateOutcome};

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:3001").
    pub bind_address: String,
    /// Browser origins allowed to connect. Empty admits any origin.
    pub allowed_origins: Vec<String>,
    /// Driver configuration (connection limit).
    pub driver: DriverConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3001".to_string(),
            allowed_origins: Vec::new(),
            driver: DriverConfig::default(),
        }
    }
}

/// Shared state handed to every connection task.
///
/// The driver sits behind one async mutex - the relay's single
/// mutual-exclusion discipline. The sender map is the transport-side
/// buffer: queueing an outbound frame never blocks, so a slow client
/// cannot stall event processing for anyone else.
#[derive(Clone)]
pub(crate) struct AppState {
    /// The sans-IO relay core
    driver: Arc<Mutex<RelayDriver<SystemEnv>>>,
    /// Connection id -> outbound channel feeding that connection's socket
    senders: Arc<RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<Message>>>>,
    /// Origin allow-list shared with the upgrade handler
    allowed_origins: Arc<Vec<String>>,
    /// Randomness for connection ids
    env: SystemEnv,
}

/// Production relay server.
///
/// Wraps [`RelayDriver`] with axum WebSocket transport and the system
/// environment.
pub struct Server {
    listener: TcpListener,
    router: axum::Router,
}

impl Server {
    /// Create and bind a new server.
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        let address: SocketAddr = config.bind_address.parse().map_err(|e| {
            ServerError::Config(format!("invalid bind address '{}': {e}", config.bind_address))
        })?;

        if config.allowed_origins.is_empty() {
            tracing::warn!("no origin allow-list configured - accepting any origin");
        }

        let env = SystemEnv::new();
        let state = AppState {
            driver: Arc::new(Mutex::new(RelayDriver::new(env.clone(), config.driver))),
            senders: Arc::new(RwLock::new(HashMap::new())),
            allowed_origins: Arc::new(config.allowed_origins),
            env,
        };

        let router = transport::router(state)?;
        let listener = TcpListener::bind(address).await?;

        Ok(Self { listener, router })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the server until the process is stopped.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("relay listening on {}", self.listener.local_addr()?);
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }
}

/// Handle one client connection for its whole lifetime.
///
/// A fresh random connection id is assigned on every upgrade; reconnection
/// has no continuity with the previous connection.
pub(crate) async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = state.env.random_u64();
    let (mut sink, mut stream) = socket.split();
    let (sender, mut outbound) = mpsc::unbounded_channel::<Message>();

    state.senders.write().await.insert(connection_id, sender);

    // Writer task: drains the outbound channel into the socket. Ends when
    // the channel closes - either the cleanup below or a server-initiated
    // close that removed the sender from the map.
    let mut writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    dispatch(&state, RelayEvent::ConnectionOpened { connection_id }).await;

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => match ClientEvent::from_json(text.as_str()) {
                    Ok(event) => {
                        dispatch(&state, RelayEvent::EventReceived { connection_id, event }).await;
                    },
                    Err(error) => {
                        tracing::debug!(connection_id, %error, "dropping malformed event");
                    },
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}, // binary frames and ping/pong need no handling
                Some(Err(error)) => {
                    tracing::debug!(connection_id, %error, "socket error");
                    break;
                },
            },
            _ = &mut writer => break,
        }
    }

    state.senders.write().await.remove(&connection_id);
    dispatch(
        &state,
        RelayEvent::ConnectionClosed { connection_id, reason: "socket closed".to_string() },
    )
    .await;
    writer.abort();
}

/// Feed one event through the driver and execute the resulting actions.
///
/// The driver lock is held across both steps so the outbound frames of one
/// event are queued before the next event is processed - clients observe
/// presence updates in the order they happened. Queueing is non-blocking,
/// so holding the lock never waits on a slow client.
async fn dispatch(state: &AppState, event: RelayEvent) {
    let mut driver = state.driver.lock().await;
    let actions = driver.process_event(event);
    execute_actions(state, actions).await;
}

/// Execute driver actions against the connection sender map.
async fn execute_actions(state: &AppState, actions: Vec<RelayAction>) {
    for action in actions {
        match action {
            RelayAction::Send { connection_id, event } => {
                let Some(text) = encode(&event) else { continue };
                let senders = state.senders.read().await;
                match senders.get(&connection_id) {
                    Some(sender) => {
                        if sender.send(Message::Text(text.into())).is_err() {
                            tracing::debug!(connection_id, "send to closing connection dropped");
                        }
                    },
                    None => tracing::debug!(connection_id, "send target not connected"),
                }
            },
            RelayAction::Broadcast { event, exclude } => {
                let Some(text) = encode(&event) else { continue };
                let senders = state.senders.read().await;
                for (id, sender) in senders.iter() {
                    if Some(*id) == exclude {
                        continue;
                    }
                    if sender.send(Message::Text(text.clone().into())).is_err() {
                        tracing::debug!(
                            connection_id = *id,
                            "broadcast to closing connection dropped",
                        );
                    }
                }
            },
            RelayAction::Close { connection_id, reason } => {
                tracing::info!(connection_id, %reason, "closing connection");
                // Dropping the sender ends the writer task, which closes
                // the socket from the write half.
                state.senders.write().await.remove(&connection_id);
            },
        }
    }
}

fn encode(event: &ServerEvent) -> Option<String> {
    match event.to_json() {
        Ok(text) => Some(text),
        Err(error) => {
            tracing::error!(%error, "failed to encode outbound event");
            None
        },
    }
}
