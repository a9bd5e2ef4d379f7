use thiserror::Error;
use uuid::Uuid;

/// Failure of a single request/response call.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server rejected request with status {0}")]
    Rejected(u16),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no conversation is open")]
    NoOpenConversation,

    #[error("sending failed: {0}")]
    SendFailed(ApiError),

    #[error("fetch failed: {0}")]
    FetchFailed(ApiError),

    #[error("gateway refused the connection")]
    AuthInvalid,

    #[error("gateway transport error: {0}")]
    Gateway(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Something the user should be told about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A message could not be sent and was removed from the conversation.
    SendFailed { counterpart: Uuid, text: String, reason: String },
    /// Loading a conversation or the partner list failed.
    FetchFailed { reason: String },
}
