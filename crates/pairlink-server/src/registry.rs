//! Presence registry: who is online, keyed by connection.
//!
//! One entry per connection id. Duplicate user ids are deliberately not
//! merged - the same user connected twice is two presence entries,
//! deduplicated only by connection. Insertion order is preserved so the
//! broadcast snapshot lists users in the order they came online.

use indexmap::IndexMap;
use pairlink_proto::OnlineUser;

/// Identifier for one client connection, assigned by the runtime.
pub type ConnectionId = u64;

/// One online user, as announced by an `init` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPresence {
    /// Client-supplied user identifier. Not verified.
    pub user_id: String,
    /// Display name; defaulted to the user id when the client sent none.
    pub display_name: String,
}

/// Registry of online users, keyed by connection id.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    entries: IndexMap<ConnectionId, UserPresence>,
}

impl PresenceRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the presence entry for a connection.
    ///
    /// Idempotent per connection id; a re-`init` keeps the connection's
    /// original position in the snapshot.
    pub fn register(&mut self, connection_id: ConnectionId, user_id: String, display_name: String) {
        self.entries.insert(connection_id, UserPresence { user_id, display_name });
    }

    /// Remove the entry for a connection.
    ///
    /// Returns `true` if an entry was present. No-op for unknown ids.
    pub fn unregister(&mut self, connection_id: ConnectionId) -> bool {
        self.entries.shift_remove(&connection_id).is_some()
    }

    /// Presence entry for a connection, if registered.
    pub fn get(&self, connection_id: ConnectionId) -> Option<&UserPresence> {
        self.entries.get(&connection_id)
    }

    /// First connection (in registration order) announcing this user id.
    ///
    /// `None` if the user is not online. When duplicates exist the earliest
    /// registered connection wins; the rest are unreachable for direct
    /// relays until it goes away.
    pub fn find_by_user(&self, user_id: &str) -> Option<ConnectionId> {
        self.entries.iter().find(|(_, p)| p.user_id == user_id).map(|(id, _)| *id)
    }

    /// Current presence list, in registration order.
    pub fn snapshot(&self) -> Vec<OnlineUser> {
        self.entries
            .values()
            .map(|p| OnlineUser { id: p.user_id.clone(), first_name: p.display_name.clone() })
            .collect()
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
