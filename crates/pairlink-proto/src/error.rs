//! Protocol error types.

use thiserror::Error;

/// Errors from event encoding and decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Inbound text was not a valid event envelope.
    ///
    /// Covers non-JSON input, unknown event names, and payloads missing a
    /// required field. The relay drops the frame; the sender gets nothing
    /// back.
    #[error("malformed client event: {0}")]
    Malformed(#[source] serde_json::Error),

    /// An outbound event failed to serialize.
    ///
    /// Should never happen for events built from decoded input. Indicates a
    /// bug - report as issue.
    #[error("failed to encode server event: {0}")]
    Encode(#[source] serde_json::Error),
}
