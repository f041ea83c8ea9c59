//! Server error types.
//!
//! The relay core itself never fails - every anomaly there is a logged
//! no-op. Errors exist only at the seams: configuration at startup and the
//! transport underneath.

use thiserror::Error;

/// Errors that can occur while starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration error (invalid bind address, malformed origin).
    ///
    /// Fatal at startup. Fix configuration and restart.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport/network error (bind failure, accept failure, I/O error).
    ///
    /// May be transient (network issues) or fatal (bind address in use).
    /// Check error message for details.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ServerError::Config("invalid bind address '1.2.3'".to_string());
        assert_eq!(err.to_string(), "configuration error: invalid bind address '1.2.3'");
    }

    #[test]
    fn io_error_converts_to_transport() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use");
        let err = ServerError::from(io);
        assert!(matches!(err, ServerError::Transport(_)));
        assert!(err.to_string().starts_with("transport error:"));
    }
}
