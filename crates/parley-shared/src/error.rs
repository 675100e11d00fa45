use thiserror::Error;

/// Errors produced while constructing or decoding protocol payloads.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A message must carry text content, an attachment, or both.
    #[error("Message has neither content nor attachment")]
    EmptyMessage,

    /// JSON encoding or decoding failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A frame arrived on a destination this client does not recognise.
    #[error("Unrecognised topic: {0}")]
    UnknownTopic(String),
}
