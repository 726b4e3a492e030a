use thiserror::Error;

/// Errors surfaced by the relay client, its channels and its configuration.
///
/// The first three kinds replace failure modes that a bare event-wiring
/// client would swallow silently.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Inbound payload is missing `sender`/`message` or has the wrong shape.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The channel is closed or was never connected.
    #[error("channel unavailable")]
    ChannelUnavailable,

    /// Blank message body while empty messages are configured to be rejected.
    #[error("empty message rejected")]
    EmptyMessageRejected,

    /// A location or scheme that cannot be turned into a connection target.
    #[error("invalid location: {0}")]
    InvalidLocation(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type Result<T, E = RelayError> = std::result::Result<T, E>;
