use thiserror::Error;

/// Failures that abort startup. Once the mesh is up, peer failures are
/// absorbed by the consensus loop and never reach the caller.
#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("rendezvous timed out")]
    Timeout,

    #[error("malformed handshake: {0}")]
    Malformed(String),

    #[error("invalid roster: {0}")]
    Roster(String),

    #[error("unsupported protocol version {0}")]
    Version(u32),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("handshake encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roster_error_message() {
        let error = Error::Roster("expected 2 peers, got 1".to_string());
        assert_eq!(error.to_string(), "invalid roster: expected 2 peers, got 1");
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let error: Error = io.into();
        assert!(matches!(error, Error::Io(_)));
    }
}
