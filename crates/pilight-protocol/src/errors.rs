/// Failure to encode or decode a protocol frame.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("failed to serialize frame: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("malformed frame: {message}")]
    Malformed { message: String },
}
