//! Error types for the edge client

use thiserror::Error;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors produced by the connection, capture and reporting layers.
///
/// None of these are fatal to the process: connection-layer errors feed the
/// reconnect loop, capture errors drop the current cycle.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Socket level failure (connect, handshake, read)
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// Server answered the identification packet with a rejection marker
    #[error("identity '{id}' rejected by server: {response}")]
    IdentityRejected { id: String, response: String },

    /// Camera could not be opened or produced no frame
    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// Detection failed in a way the fallback policy could not absorb
    #[error("inference failure: {0}")]
    Inference(String),

    /// Writing a report to the active connection failed
    #[error("send failure: {0}")]
    Send(String),

    /// No active connection to send on
    #[error("not connected")]
    NotConnected,

    /// Configuration could not be read or parsed
    #[error("configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Whether this error should hand control back to the reconnect loop
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            ClientError::Connection(_)
                | ClientError::IdentityRejected { .. }
                | ClientError::Send(_)
                | ClientError::NotConnected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_rejected_display() {
        let err = ClientError::IdentityRejected {
            id: "JETSON".to_string(),
            response: "JETSON 등록되지 않은 ID입니다!".to_string(),
        };
        let s = err.to_string();
        assert!(s.contains("JETSON"));
        assert!(s.contains("rejected"));
    }

    #[test]
    fn test_connection_level_classification() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(ClientError::from(io).is_connection_level());
        assert!(ClientError::NotConnected.is_connection_level());
        assert!(!ClientError::CaptureUnavailable("no camera".into()).is_connection_level());
        assert!(!ClientError::Config("bad".into()).is_connection_level());
    }
}
