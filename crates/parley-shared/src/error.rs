use thiserror::Error;

/// Reasons a bearer access token is refused.
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Token is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("Token body is malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Token signature is invalid")]
    BadSignature,

    #[error("Token expired")]
    Expired,

    #[error("Verification key is invalid")]
    InvalidKey,
}

/// Reasons an inbound client frame cannot be turned into an event.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}
