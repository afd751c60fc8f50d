use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use parley_shared::protocol::ClientEvent;
use parley_shared::{ConversationRef, ProtocolError, TokenError, UserId};
use parley_store::StoreError;

// ---------------------------------------------------------------------------
// Gateway errors
// ---------------------------------------------------------------------------

/// Failure of a real-time gateway operation.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing or invalid credential, or a credential for an unknown user.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The referenced conversation or user does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The requester is not a member of the referenced conversation.
    #[error("User {user} is not a member of conversation {conversation}")]
    AccessDenied {
        user: UserId,
        conversation: ConversationRef,
    },

    /// The client sent a frame that is not a valid event.
    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ProtocolError),

    #[error("Storage failure: {0}")]
    Storage(StoreError),
}

impl From<StoreError> for GatewayError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => GatewayError::NotFound("record".into()),
            other => GatewayError::Storage(other),
        }
    }
}

impl From<TokenError> for GatewayError {
    fn from(e: TokenError) -> Self {
        GatewayError::AuthenticationFailed(e.to_string())
    }
}

impl GatewayError {
    /// Whether this failure, raised while handling `event`, ends the
    /// connection.
    ///
    /// `NotFound` and `AccessDenied` only abort the operation. Storage
    /// failures close the connection on the history read path and leave it
    /// open everywhere else.
    pub fn closes_connection(&self, event: &ClientEvent) -> bool {
        match self {
            GatewayError::AuthenticationFailed(_) | GatewayError::ValidationFailed(_) => true,
            GatewayError::NotFound(_) | GatewayError::AccessDenied { .. } => false,
            GatewayError::Storage(_) => matches!(event, ClientEvent::FetchMessages { .. }),
        }
    }

    /// Short stable label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::AuthenticationFailed(_) => "authentication_failed",
            GatewayError::NotFound(_) => "not_found",
            GatewayError::AccessDenied { .. } => "access_denied",
            GatewayError::ValidationFailed(_) => "validation_failed",
            GatewayError::Storage(_) => "storage_failure",
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Not found")]
    NotFound,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<GatewayError> for ServerError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::AuthenticationFailed(_) => ServerError::Unauthorized,
            // Existence is not revealed to non-members.
            GatewayError::NotFound(_) | GatewayError::AccessDenied { .. } => ServerError::NotFound,
            GatewayError::ValidationFailed(e) => ServerError::BadRequest(e.to_string()),
            GatewayError::Storage(e) => ServerError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ServerError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_shared::ConversationId;

    fn fetch() -> ClientEvent {
        ClientEvent::FetchMessages {
            conversation_ref: ConversationRef::Concrete(ConversationId(1)),
            page: 0,
        }
    }

    fn send() -> ClientEvent {
        ClientEvent::Message {
            conversation_ref: ConversationRef::Concrete(ConversationId(1)),
            content: "hi".into(),
        }
    }

    #[test]
    fn test_storage_failure_closes_only_history_reads() {
        let err = GatewayError::Storage(StoreError::Poisoned);
        assert!(err.closes_connection(&fetch()));
        assert!(!err.closes_connection(&send()));
        assert!(!err.closes_connection(&ClientEvent::FetchContacts));
    }

    #[test]
    fn test_lookup_failures_never_close() {
        let denied = GatewayError::AccessDenied {
            user: UserId(3),
            conversation: ConversationRef::Concrete(ConversationId(1)),
        };
        assert!(!denied.closes_connection(&fetch()));
        assert!(!GatewayError::NotFound("conversation".into()).closes_connection(&send()));
    }

    #[test]
    fn test_store_not_found_maps_to_not_found() {
        assert!(matches!(
            GatewayError::from(StoreError::NotFound),
            GatewayError::NotFound(_)
        ));
        assert!(matches!(
            GatewayError::from(StoreError::Poisoned),
            GatewayError::Storage(_)
        ));
    }

    #[test]
    fn test_denied_and_missing_share_a_status() {
        let denied = ServerError::from(GatewayError::AccessDenied {
            user: UserId(3),
            conversation: ConversationRef::SelfNotes,
        });
        let missing = ServerError::from(GatewayError::NotFound("conversation".into()));
        assert_eq!(denied.into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(missing.into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ServerError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
