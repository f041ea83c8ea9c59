//! Anonymous-call matchmaking queue.
//!
//! Strict FIFO: the two oldest waiters are paired the moment the queue
//! holds two entries, synchronously with the enqueue that made it so -
//! there is no scheduler tick. A user id waits at most once; repeat
//! requests while waiting are no-ops. A waiter leaves the queue by being
//! matched or by its connection going away.

use std::collections::VecDeque;

use crate::{env::Environment, registry::ConnectionId};

/// Alphabet for the random part of a room token.
const ROOM_ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of the random part of a room token.
const ROOM_ID_LEN: usize = 16;

/// Generate a fresh room identifier: `call-` plus 16 random alphanumerics.
///
/// Uniqueness across the process lifetime is probabilistic (a 36^16 space);
/// collisions are not handled.
pub fn generate_room_id<E: Environment>(env: &E) -> String {
    let mut bytes = [0u8; ROOM_ID_LEN];
    env.random_bytes(&mut bytes);

    let mut id = String::with_capacity("call-".len() + ROOM_ID_LEN);
    id.push_str("call-");
    for byte in bytes {
        id.push(ROOM_ID_ALPHABET[byte as usize % ROOM_ID_ALPHABET.len()] as char);
    }
    id
}

/// One user waiting to be paired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitingEntry {
    /// Connection that issued the wait request.
    pub connection_id: ConnectionId,
    /// Client-supplied user identifier; the dedup key.
    pub user_id: String,
    /// Display name sent with the wait request.
    pub display_name: String,
}

/// Result of an enqueue attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The user id was already waiting; nothing changed.
    AlreadyWaiting,
    /// Queued; no partner available yet.
    Waiting,
    /// The two oldest waiters were paired under a fresh room id.
    Matched {
        /// Newly generated room identifier.
        room_id: String,
        /// The paired waiters, oldest first.
        pair: [WaitingEntry; 2],
    },
}

/// FIFO queue of users waiting for an anonymous call partner.
#[derive(Debug, Default)]
pub struct MatchQueue {
    waiting: VecDeque<WaitingEntry>,
}

impl MatchQueue {
    /// Create a new empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a waiter, pairing the two oldest entries if that makes two.
    ///
    /// A user id already present leaves the queue untouched
    /// (`AlreadyWaiting`). First-available matching, no preferences.
    pub fn enqueue<E: Environment>(&mut self, entry: WaitingEntry, env: &E) -> EnqueueOutcome {
        if self.contains_user(&entry.user_id) {
            return EnqueueOutcome::AlreadyWaiting;
        }

        self.waiting.push_back(entry);

        if self.waiting.len() >= 2
            && let (Some(first), Some(second)) = (self.waiting.pop_front(), self.waiting.pop_front())
        {
            return EnqueueOutcome::Matched {
                room_id: generate_room_id(env),
                pair: [first, second],
            };
        }

        EnqueueOutcome::Waiting
    }

    /// Remove the waiting entry owned by a connection, if any.
    pub fn remove_connection(&mut self, connection_id: ConnectionId) -> Option<WaitingEntry> {
        let index = self.waiting.iter().position(|w| w.connection_id == connection_id)?;
        self.waiting.remove(index)
    }

    /// Pop the oldest waiter. Used by room backfill.
    pub fn pop_front(&mut self) -> Option<WaitingEntry> {
        self.waiting.pop_front()
    }

    /// Whether a user id is currently waiting.
    pub fn contains_user(&self, user_id: &str) -> bool {
        self.waiting.iter().any(|w| w.user_id == user_id)
    }

    /// Number of waiting entries.
    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    /// Whether nobody is waiting.
    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}
