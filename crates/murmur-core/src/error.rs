//! Error types for Murmur operations

use thiserror::Error;

/// Result type alias for Murmur operations
pub type Result<T> = std::result::Result<T, MurmurError>;

/// Errors that can occur in Murmur
///
/// The dissemination core itself has no fatal paths; these surface at the
/// protocol boundary, the transport edge and configuration loading.
#[derive(Error, Debug, Clone)]
pub enum MurmurError {
    // === Protocol Boundary ===
    /// Request arrived before the node learned its identity
    #[error("Node not initialized: {0}")]
    NotInitialized(String),

    /// Request body could not be decoded
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// Request kind this node does not handle
    #[error("Not supported: {0}")]
    NotSupported(String),

    // === Transport ===
    /// Outbound message could not be queued for delivery
    #[error("Transport error: {0}")]
    Transport(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    // === Configuration ===
    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    // === General Errors ===
    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes understood by the cluster test harness
impl MurmurError {
    /// Get the protocol error code for error replies
    pub fn code(&self) -> u32 {
        match self {
            Self::NotSupported(_) => 10,
            Self::NotInitialized(_) | Self::Transport(_) => 11,
            Self::MalformedRequest(_) | Self::Serialization(_) => 12,
            _ => 13,
        }
    }

    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotInitialized(_) | Self::Transport(_))
    }
}

impl From<std::io::Error> for MurmurError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(MurmurError::NotSupported("cas".into()).code(), 10);
        assert_eq!(MurmurError::NotInitialized("topology".into()).code(), 11);
        assert_eq!(MurmurError::MalformedRequest("bad".into()).code(), 12);
        assert_eq!(MurmurError::Internal("boom".into()).code(), 13);
    }

    #[test]
    fn test_error_display() {
        let err = MurmurError::MalformedRequest("missing field `message`".into());
        let msg = format!("{}", err);
        assert!(msg.contains("Malformed request"));
        assert!(msg.contains("message"));
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(MurmurError::Transport("outbox closed".into()).is_recoverable());
        assert!(!MurmurError::MalformedRequest("bad".into()).is_recoverable());
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdout gone");
        let err: MurmurError = io.into();
        assert!(matches!(err, MurmurError::Io(_)));
        assert_eq!(err.code(), 13);
    }
}
