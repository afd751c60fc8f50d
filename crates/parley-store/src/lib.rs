//! # parley-store
//!
//! Durable storage for the Parley gateway, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for users,
//! friendships, conversations and messages. [`SharedDatabase`] wraps it for
//! use from async tasks.

pub mod conversations;
pub mod database;
pub mod handle;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod users;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use handle::SharedDatabase;
pub use models::*;
