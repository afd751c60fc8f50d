//! # parley-shared
//!
//! Types shared between the Parley gateway and its storage layer: identifiers,
//! the JSON wire protocol spoken over the real-time socket, bearer access
//! tokens, and protocol constants.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod token;
pub mod types;

pub use error::{ProtocolError, TokenError};
pub use types::{ConversationId, ConversationRef, MessageId, UserId};
