//! Wire protocol for the pairlink relay.
//!
//! Events travel as JSON envelopes over WebSocket text frames:
//! `{"event": <name>, "data": <payload>}`. The envelope is an adjacently
//! tagged serde enum, so event names and payload field spellings are fixed
//! at the type level and verified by round-trip tests.
//!
//! The relay never interprets chat content: `message` payloads are opaque
//! JSON relayed verbatim. Everything else carries a small typed payload.
//!
//! # Invariants
//!
//! Each inbound event name maps to exactly one [`ClientEvent`] variant and
//! each outbound name to one [`ServerEvent`] variant. Decoding an encoded
//! event must produce an equivalent value.

mod error;
mod events;

pub use error::ProtocolError;
pub use events::{
    CallInvite, CallReject, ClientEvent, Init, OnlineUser, RandomCallMatch, RandomCallWaiting,
    ServerEvent, Typing,
};
