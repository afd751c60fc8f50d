//! Async access to the synchronous [`Database`].
//!
//! SQLite calls block, so every call is shipped to tokio's blocking pool.
//! The connection sits behind a mutex; statements from different tasks are
//! serialised there instead of on the async executor threads.

use std::sync::{Arc, Mutex};

use crate::database::Database;
use crate::error::{Result, StoreError};

/// Cloneable handle shared by every connection task.
#[derive(Clone)]
pub struct SharedDatabase {
    inner: Arc<Mutex<Database>>,
}

impl SharedDatabase {
    pub fn new(db: Database) -> Self {
        Self {
            inner: Arc::new(Mutex::new(db)),
        }
    }

    /// Run `f` against the database on the blocking pool.
    pub async fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut db = inner.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut *db)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }
}
