//! Relay driver.
//!
//! Ties together the presence registry, matchmaking queue, and room tracker
//! behind a single event-processing entry point. The driver performs no
//! I/O: the runtime feeds it one [`RelayEvent`] at a time and executes the
//! returned [`RelayAction`]s. Processing each event to completion before
//! the next is admitted is the concurrency contract the cleanup ordering
//! relies on.
//!
//! No operation here surfaces an error to the caller. Malformed or stale
//! input (an event from an unknown connection, a leave with no active room,
//! a relay to an offline user) is logged and dropped.

use std::collections::HashMap;

use pairlink_proto::{ClientEvent, Init, RandomCallMatch, RandomCallWaiting, ServerEvent};

use crate::{
    env::Environment,
    matchmaker::{EnqueueOutcome, MatchQueue, WaitingEntry},
    registry::{ConnectionId, PresenceRegistry},
    rooms::{Occupant, RoomTracker, VacateOutcome},
};

/// Driver configuration.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { max_connections: 10_000 }
    }
}

/// Events the driver processes.
///
/// These are produced by the transport runtime.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// A new connection was accepted.
    ConnectionOpened {
        /// Unique connection id assigned by the runtime.
        connection_id: ConnectionId,
    },
    /// A client event arrived on a connection.
    EventReceived {
        /// Connection that sent the event.
        connection_id: ConnectionId,
        /// The decoded event.
        event: ClientEvent,
    },
    /// A connection was closed (by peer or error).
    ConnectionClosed {
        /// Connection that was closed.
        connection_id: ConnectionId,
        /// Reason for closure.
        reason: String,
    },
}

/// Actions the driver produces.
///
/// These are executed by the transport runtime. All sends are best-effort
/// fire-and-forget; a dead target is dropped silently.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayAction {
    /// Send an event to one connection.
    Send {
        /// Target connection.
        connection_id: ConnectionId,
        /// Event to send.
        event: ServerEvent,
    },
    /// Send an event to every connection, optionally excluding one.
    Broadcast {
        /// Event to send.
        event: ServerEvent,
        /// Connection to skip, if any.
        exclude: Option<ConnectionId>,
    },
    /// Close a connection.
    Close {
        /// Connection to close.
        connection_id: ConnectionId,
        /// Reason for closure.
        reason: String,
    },
}

/// Per-connection relay state.
#[derive(Debug, Default)]
struct Connection {
    /// Room this connection currently participates in, if any.
    current_room: Option<String>,
}

/// Action-based relay core: presence, direct relays, matchmaking, rooms.
pub struct RelayDriver<E: Environment> {
    /// Connection table (connection id -> per-connection state)
    connections: HashMap<ConnectionId, Connection>,
    /// Who is online
    registry: PresenceRegistry,
    /// Users waiting for an anonymous partner
    queue: MatchQueue,
    /// Active call rooms
    rooms: RoomTracker,
    /// Randomness source (room ids)
    env: E,
    /// Driver configuration
    config: DriverConfig,
}

impl<E: Environment> RelayDriver<E> {
    /// Create a new relay driver with empty state.
    pub fn new(env: E, config: DriverConfig) -> Self {
        Self {
            connections: HashMap::new(),
            registry: PresenceRegistry::new(),
            queue: MatchQueue::new(),
            rooms: RoomTracker::new(),
            env,
            config,
        }
    }

    /// Process one event and return the actions to execute.
    ///
    /// This is the main entry point for the relay core.
    pub fn process_event(&mut self, event: RelayEvent) -> Vec<RelayAction> {
        match event {
            RelayEvent::ConnectionOpened { connection_id } => self.handle_opened(connection_id),
            RelayEvent::EventReceived { connection_id, event } => {
                self.handle_client_event(connection_id, event)
            },
            RelayEvent::ConnectionClosed { connection_id, reason } => {
                self.handle_closed(connection_id, &reason)
            },
        }
    }

    fn handle_opened(&mut self, connection_id: ConnectionId) -> Vec<RelayAction> {
        if self.connections.len() >= self.config.max_connections {
            tracing::warn!(connection_id, "connection limit reached, refusing connection");
            return vec![RelayAction::Close {
                connection_id,
                reason: "max connections exceeded".to_string(),
            }];
        }

        self.connections.insert(connection_id, Connection::default());
        tracing::debug!(connection_id, "connection opened");
        Vec::new()
    }

    fn handle_client_event(
        &mut self,
        connection_id: ConnectionId,
        event: ClientEvent,
    ) -> Vec<RelayAction> {
        if !self.connections.contains_key(&connection_id) {
            tracing::debug!(connection_id, "event from unknown connection dropped");
            return Vec::new();
        }

        match event {
            ClientEvent::Init(init) => self.handle_init(connection_id, init),
            ClientEvent::Message(payload) => {
                vec![RelayAction::Broadcast { event: ServerEvent::Message(payload), exclude: None }]
            },
            ClientEvent::Typing(typing) => vec![RelayAction::Broadcast {
                event: ServerEvent::Typing(typing),
                exclude: Some(connection_id),
            }],
            ClientEvent::VideoCallInvite(invite) => {
                let target = invite.to.clone();
                self.relay_to_user(&target, ServerEvent::VideoCallInvite(invite))
            },
            ClientEvent::VideoCallReject(reject) => {
                let target = reject.to.clone();
                self.relay_to_user(&target, ServerEvent::VideoCallReject(reject))
            },
            ClientEvent::RandomCallWaiting(waiting) => self.handle_waiting(connection_id, waiting),
            ClientEvent::LeaveRandomCall => self.handle_leave(connection_id),
        }
    }

    /// `init`: register presence and republish the online list.
    fn handle_init(&mut self, connection_id: ConnectionId, init: Init) -> Vec<RelayAction> {
        let display_name = init.first_name.unwrap_or_else(|| init.user_id.clone());
        tracing::info!(connection_id, user_id = %init.user_id, "user online");
        self.registry.register(connection_id, init.user_id, display_name);
        vec![self.presence_update()]
    }

    /// Presence broadcast carrying the current snapshot.
    fn presence_update(&self) -> RelayAction {
        RelayAction::Broadcast {
            event: ServerEvent::OnlineUsers(self.registry.snapshot()),
            exclude: None,
        }
    }

    /// Unicast to the first connection registered under `user_id`.
    ///
    /// An offline target drops the event; the sender is not awaiting an
    /// acknowledgment.
    fn relay_to_user(&self, user_id: &str, event: ServerEvent) -> Vec<RelayAction> {
        match self.registry.find_by_user(user_id) {
            Some(target) => vec![RelayAction::Send { connection_id: target, event }],
            None => {
                tracing::debug!(user_id, "relay target not online, dropping event");
                Vec::new()
            },
        }
    }

    /// `random-call-waiting`: enqueue and pair if a partner is available.
    fn handle_waiting(
        &mut self,
        connection_id: ConnectionId,
        waiting: RandomCallWaiting,
    ) -> Vec<RelayAction> {
        let entry = WaitingEntry {
            connection_id,
            user_id: waiting.user_id,
            display_name: waiting.name,
        };

        match self.queue.enqueue(entry, &self.env) {
            EnqueueOutcome::AlreadyWaiting => {
                tracing::debug!(connection_id, "duplicate wait request ignored");
                Vec::new()
            },
            EnqueueOutcome::Waiting => {
                tracing::debug!(connection_id, waiting = self.queue.len(), "user queued");
                Vec::new()
            },
            EnqueueOutcome::Matched { room_id, pair } => self.open_room(room_id, pair),
        }
    }

    /// Open a room for two matched waiters and notify both.
    fn open_room(&mut self, room_id: String, pair: [WaitingEntry; 2]) -> Vec<RelayAction> {
        let occupants = pair.map(Occupant::from);
        tracing::info!(
            %room_id,
            first = %occupants[0].user_id,
            second = %occupants[1].user_id,
            "matched waiting users",
        );

        let actions = occupants
            .iter()
            .map(|occupant| RelayAction::Send {
                connection_id: occupant.connection_id,
                event: ServerEvent::RandomCallMatch(RandomCallMatch { room_id: room_id.clone() }),
            })
            .collect();

        for occupant in &occupants {
            self.set_room(occupant.connection_id, Some(room_id.clone()));
        }
        self.rooms.insert_pair(room_id, occupants);
        actions
    }

    /// `leave-random-call`: vacate the sender's current room, if any.
    fn handle_leave(&mut self, connection_id: ConnectionId) -> Vec<RelayAction> {
        let Some(room_id) = self.take_room(connection_id) else {
            tracing::debug!(connection_id, "leave with no active room ignored");
            return Vec::new();
        };
        self.vacate_room(&room_id, connection_id)
    }

    /// Remove one occupant, backfilling from the queue or tearing down.
    fn vacate_room(&mut self, room_id: &str, connection_id: ConnectionId) -> Vec<RelayAction> {
        match self.rooms.vacate(room_id, connection_id, &mut self.queue) {
            VacateOutcome::NotTracked | VacateOutcome::NotOccupant => {
                tracing::debug!(room_id, connection_id, "stale room reference ignored");
                Vec::new()
            },
            VacateOutcome::Backfilled { remaining, joined } => {
                tracing::info!(room_id, joined = %joined.user_id, "backfilled room from queue");
                self.set_room(joined.connection_id, Some(room_id.to_string()));
                [remaining, joined]
                    .iter()
                    .map(|occupant| RelayAction::Send {
                        connection_id: occupant.connection_id,
                        event: ServerEvent::RandomCallMatch(RandomCallMatch {
                            room_id: room_id.to_string(),
                        }),
                    })
                    .collect()
            },
            VacateOutcome::Deleted { survivor } => {
                if let Some(survivor) = survivor {
                    self.set_room(survivor.connection_id, None);
                }
                tracing::debug!(room_id, "room closed");
                Vec::new()
            },
        }
    }

    /// Disconnect cleanup, in order: queue, room (with backfill), registry,
    /// presence republish. The republished list is already consistent
    /// because the queue and room state settle first.
    fn handle_closed(&mut self, connection_id: ConnectionId, reason: &str) -> Vec<RelayAction> {
        let Some(connection) = self.connections.remove(&connection_id) else {
            return Vec::new();
        };
        tracing::info!(connection_id, reason, "connection closed");

        let mut actions = Vec::new();

        self.queue.remove_connection(connection_id);

        if let Some(room_id) = connection.current_room {
            actions.extend(self.vacate_room(&room_id, connection_id));
        }

        if self.registry.unregister(connection_id) {
            actions.push(self.presence_update());
        }

        actions
    }

    fn set_room(&mut self, connection_id: ConnectionId, room: Option<String>) {
        if let Some(connection) = self.connections.get_mut(&connection_id) {
            connection.current_room = room;
        }
    }

    fn take_room(&mut self, connection_id: ConnectionId) -> Option<String> {
        self.connections.get_mut(&connection_id).and_then(|c| c.current_room.take())
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of registered (online) users.
    pub fn online_count(&self) -> usize {
        self.registry.len()
    }

    /// Number of users waiting to be paired.
    pub fn waiting_count(&self) -> usize {
        self.queue.len()
    }

    /// Number of active call rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Whether a room id is tracked.
    pub fn has_room(&self, room_id: &str) -> bool {
        self.rooms.contains(room_id)
    }

    /// Room a connection currently participates in, if any.
    pub fn current_room(&self, connection_id: ConnectionId) -> Option<&str> {
        self.connections.get(&connection_id).and_then(|c| c.current_room.as_deref())
    }
}

impl<E: Environment> std::fmt::Debug for RelayDriver<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayDriver")
            .field("connection_count", &self.connections.len())
            .field("online_count", &self.registry.len())
            .field("waiting_count", &self.queue.len())
            .field("room_count", &self.rooms.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use pairlink_proto::Typing;

    use super::*;
    use crate::env::SystemEnv;

    fn driver() -> RelayDriver<SystemEnv> {
        RelayDriver::new(SystemEnv::new(), DriverConfig::default())
    }

    fn open(driver: &mut RelayDriver<SystemEnv>, connection_id: ConnectionId) {
        let actions =
            driver.process_event(RelayEvent::ConnectionOpened { connection_id });
        assert!(actions.is_empty());
    }

    fn init(driver: &mut RelayDriver<SystemEnv>, connection_id: ConnectionId, user_id: &str) {
        driver.process_event(RelayEvent::EventReceived {
            connection_id,
            event: ClientEvent::Init(Init { user_id: user_id.to_string(), first_name: None }),
        });
    }

    fn wait(
        driver: &mut RelayDriver<SystemEnv>,
        connection_id: ConnectionId,
        user_id: &str,
    ) -> Vec<RelayAction> {
        driver.process_event(RelayEvent::EventReceived {
            connection_id,
            event: ClientEvent::RandomCallWaiting(RandomCallWaiting {
                user_id: user_id.to_string(),
                name: user_id.to_string(),
            }),
        })
    }

    fn close(driver: &mut RelayDriver<SystemEnv>, connection_id: ConnectionId) -> Vec<RelayAction> {
        driver.process_event(RelayEvent::ConnectionClosed {
            connection_id,
            reason: "test".to_string(),
        })
    }

    /// Room id carried by a `Send { RandomCallMatch }` action.
    fn match_room(action: &RelayAction) -> &str {
        match action {
            RelayAction::Send { event: ServerEvent::RandomCallMatch(m), .. } => &m.room_id,
            other => panic!("expected a match notification, got {other:?}"),
        }
    }

    #[test]
    fn connection_limit_refuses_with_close() {
        let mut driver =
            RelayDriver::new(SystemEnv::new(), DriverConfig { max_connections: 2 });

        open(&mut driver, 1);
        open(&mut driver, 2);

        let actions = driver.process_event(RelayEvent::ConnectionOpened { connection_id: 3 });
        assert_eq!(driver.connection_count(), 2);
        assert!(matches!(actions.as_slice(), [RelayAction::Close { connection_id: 3, .. }]));
    }

    #[test]
    fn init_broadcasts_presence_to_all() {
        let mut driver = driver();
        open(&mut driver, 1);

        let actions = driver.process_event(RelayEvent::EventReceived {
            connection_id: 1,
            event: ClientEvent::Init(Init {
                user_id: "alice".to_string(),
                first_name: Some("Alice".to_string()),
            }),
        });

        let [RelayAction::Broadcast { event: ServerEvent::OnlineUsers(users), exclude: None }] =
            actions.as_slice()
        else {
            panic!("expected a presence broadcast, got {actions:?}");
        };
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id, "alice");
        assert_eq!(users[0].first_name, "Alice");
    }

    #[test]
    fn event_from_unknown_connection_is_dropped() {
        let mut driver = driver();

        let actions = driver.process_event(RelayEvent::EventReceived {
            connection_id: 99,
            event: ClientEvent::Init(Init { user_id: "ghost".to_string(), first_name: None }),
        });

        assert!(actions.is_empty());
        assert_eq!(driver.online_count(), 0);
    }

    #[test]
    fn message_broadcasts_verbatim_to_everyone() {
        let mut driver = driver();
        open(&mut driver, 1);

        let payload = serde_json::json!({"text": "hi", "sender": "alice"});
        let actions = driver.process_event(RelayEvent::EventReceived {
            connection_id: 1,
            event: ClientEvent::Message(payload.clone()),
        });

        assert_eq!(
            actions,
            vec![RelayAction::Broadcast { event: ServerEvent::Message(payload), exclude: None }]
        );
    }

    #[test]
    fn typing_excludes_sender() {
        let mut driver = driver();
        open(&mut driver, 1);

        let typing = Typing { from: "alice".to_string(), to: "bob".to_string() };
        let actions = driver.process_event(RelayEvent::EventReceived {
            connection_id: 1,
            event: ClientEvent::Typing(typing.clone()),
        });

        assert_eq!(
            actions,
            vec![RelayAction::Broadcast {
                event: ServerEvent::Typing(typing),
                exclude: Some(1),
            }]
        );
    }

    #[test]
    fn call_invite_is_unicast_to_target() {
        let mut driver = driver();
        open(&mut driver, 1);
        open(&mut driver, 2);
        init(&mut driver, 1, "alice");
        init(&mut driver, 2, "bob");

        let invite = pairlink_proto::CallInvite {
            to: "bob".to_string(),
            from: "alice".to_string(),
            room_id: "room-1".to_string(),
            caller_name: "Alice".to_string(),
        };
        let actions = driver.process_event(RelayEvent::EventReceived {
            connection_id: 1,
            event: ClientEvent::VideoCallInvite(invite.clone()),
        });

        assert_eq!(
            actions,
            vec![RelayAction::Send {
                connection_id: 2,
                event: ServerEvent::VideoCallInvite(invite),
            }]
        );
    }

    #[test]
    fn relay_to_offline_user_produces_nothing() {
        let mut driver = driver();
        open(&mut driver, 1);
        init(&mut driver, 1, "alice");

        let actions = driver.process_event(RelayEvent::EventReceived {
            connection_id: 1,
            event: ClientEvent::VideoCallReject(pairlink_proto::CallReject {
                to: "nobody".to_string(),
                from: "alice".to_string(),
                room_id: "room-1".to_string(),
            }),
        });

        assert!(actions.is_empty());
    }

    #[test]
    fn two_waiters_are_matched_into_a_room() {
        let mut driver = driver();
        open(&mut driver, 1);
        open(&mut driver, 2);

        assert!(wait(&mut driver, 1, "alice").is_empty());
        assert_eq!(driver.waiting_count(), 1);

        let actions = wait(&mut driver, 2, "bob");
        assert_eq!(actions.len(), 2);
        let room = match_room(&actions[0]).to_string();
        assert_eq!(match_room(&actions[1]), room);

        assert_eq!(driver.waiting_count(), 0);
        assert!(driver.has_room(&room));
        assert_eq!(driver.current_room(1), Some(room.as_str()));
        assert_eq!(driver.current_room(2), Some(room.as_str()));
    }

    #[test]
    fn leave_with_empty_queue_tears_down_room() {
        let mut driver = driver();
        open(&mut driver, 1);
        open(&mut driver, 2);
        wait(&mut driver, 1, "alice");
        let actions = wait(&mut driver, 2, "bob");
        let room = match_room(&actions[0]).to_string();

        let actions = driver.process_event(RelayEvent::EventReceived {
            connection_id: 1,
            event: ClientEvent::LeaveRandomCall,
        });

        assert!(actions.is_empty());
        assert!(!driver.has_room(&room));
        assert_eq!(driver.current_room(1), None);
        // Survivor's binding is cleared along with the room
        assert_eq!(driver.current_room(2), None);
    }

    #[test]
    fn leave_without_room_is_noop() {
        let mut driver = driver();
        open(&mut driver, 1);

        let actions = driver.process_event(RelayEvent::EventReceived {
            connection_id: 1,
            event: ClientEvent::LeaveRandomCall,
        });

        assert!(actions.is_empty());
    }

    #[test]
    fn leave_backfills_from_queue() {
        let mut driver = driver();
        for id in 1..=3 {
            open(&mut driver, id);
        }
        wait(&mut driver, 1, "alice");
        let actions = wait(&mut driver, 2, "bob");
        let room = match_room(&actions[0]).to_string();
        wait(&mut driver, 3, "carol");

        let actions = driver.process_event(RelayEvent::EventReceived {
            connection_id: 1,
            event: ClientEvent::LeaveRandomCall,
        });

        // Both the survivor and the backfilled waiter get the same room
        assert_eq!(actions.len(), 2);
        assert_eq!(match_room(&actions[0]), room);
        assert_eq!(match_room(&actions[1]), room);

        assert_eq!(driver.waiting_count(), 0);
        assert_eq!(driver.current_room(1), None);
        assert_eq!(driver.current_room(2), Some(room.as_str()));
        assert_eq!(driver.current_room(3), Some(room.as_str()));
    }

    #[test]
    fn disconnect_cleans_queue_room_and_presence() {
        let mut driver = driver();
        open(&mut driver, 1);
        open(&mut driver, 2);
        init(&mut driver, 1, "alice");
        init(&mut driver, 2, "bob");
        wait(&mut driver, 1, "alice");
        let actions = wait(&mut driver, 2, "bob");
        let room = match_room(&actions[0]).to_string();

        let actions = close(&mut driver, 2);

        // Queue was empty, so the room dies with the departing occupant and
        // the presence list is republished without bob.
        assert!(!driver.has_room(&room));
        assert_eq!(driver.current_room(1), None);
        let [RelayAction::Broadcast { event: ServerEvent::OnlineUsers(users), .. }] =
            actions.as_slice()
        else {
            panic!("expected a presence broadcast, got {actions:?}");
        };
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id, "alice");
    }

    #[test]
    fn disconnect_of_waiting_user_leaves_queue_clean() {
        let mut driver = driver();
        open(&mut driver, 1);
        open(&mut driver, 2);
        wait(&mut driver, 1, "alice");

        close(&mut driver, 1);
        assert_eq!(driver.waiting_count(), 0);

        // A later waiter pairs with someone new, not the ghost
        assert!(wait(&mut driver, 2, "bob").is_empty());
        assert_eq!(driver.waiting_count(), 1);
    }

    #[test]
    fn disconnect_without_identity_publishes_nothing() {
        let mut driver = driver();
        open(&mut driver, 1);

        let actions = close(&mut driver, 1);
        assert!(actions.is_empty());
    }
}
