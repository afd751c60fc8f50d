use thiserror::Error;

/// Failures surfaced by the persistence layer.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The platform reported no per-user data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A lookup by id or name matched no row.
    #[error("Record not found")]
    NotFound,

    /// A schema step failed while upgrading the database file.
    #[error("Migration error: {0}")]
    Migration(String),

    /// A conversation would violate its membership invariants.
    #[error("Invalid membership: {0}")]
    InvalidMembership(String),

    /// The author of a message is not a member of its conversation.
    #[error("User is not a member of the conversation")]
    NotMember,

    /// A previous holder of the database lock panicked.
    #[error("Database lock poisoned")]
    Poisoned,

    /// The blocking task running a query was cancelled or panicked.
    #[error("Blocking task failed: {0}")]
    Join(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
