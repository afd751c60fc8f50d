//! Schema upgrades.
//!
//! `PRAGMA user_version` records the last applied step. Opening a database
//! applies every step above that number, in order, each inside its own
//! transaction.

pub mod v001_initial;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

type Step = fn(&Connection) -> rusqlite::Result<()>;

/// Ordered schema steps; step `n` upgrades the file to `user_version = n`.
const STEPS: &[(&str, Step)] = &[("v001_initial", v001_initial::up)];

fn schema_version(conn: &Connection) -> Result<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Bring `conn` up to the newest schema.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let found = schema_version(conn)?;
    let latest = STEPS.len() as u32;

    if found >= latest {
        tracing::debug!(version = found, "schema up to date");
        return Ok(());
    }

    for (version, (name, step)) in (1u32..).zip(STEPS.iter()) {
        if version <= found {
            continue;
        }
        tracing::info!(step = name, version, "upgrading schema");
        conn.execute_batch("BEGIN")?;
        let applied = step(conn).and_then(|()| conn.pragma_update(None, "user_version", version));
        match applied {
            Ok(()) => conn.execute_batch("COMMIT")?,
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                return Err(StoreError::Migration(format!("{name}: {e}")));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_run_is_a_no_op() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), STEPS.len() as u32);
    }

    #[test]
    fn creates_chat_tables() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        for table in ["users", "conversations", "conversation_members", "messages"] {
            let found: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(found, 1, "missing table {table}");
        }
    }
}
