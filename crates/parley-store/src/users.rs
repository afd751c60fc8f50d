//! User rows, presence columns and the friend set.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use parley_shared::types::UserId;

use crate::database::{decode_ts, encode_ts, not_found, Database};
use crate::error::Result;
use crate::models::{NewUser, User};

const USER_COLUMNS: &str =
    "id, username, email, avatar, status, password_hash, is_online, last_online, created_at";

impl Database {
    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Insert a new user. Called by the registration flow.
    pub fn create_user(&self, new_user: &NewUser) -> Result<User> {
        let now = Utc::now();
        self.conn().execute(
            "INSERT INTO users (username, email, avatar, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                new_user.username,
                new_user.email,
                new_user.avatar,
                new_user.password_hash,
                encode_ts(&now),
            ],
        )?;
        self.get_user(UserId(self.conn().last_insert_rowid()))
    }

    pub fn get_user(&self, id: UserId) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.0],
                row_to_user,
            )
            .map_err(not_found)
    }

    /// Load several users at once, in ascending id order. Unknown ids are
    /// skipped.
    pub fn get_users(&self, ids: &[UserId]) -> Result<Vec<User>> {
        let mut stmt = self
            .conn()
            .prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))?;

        let mut sorted: Vec<UserId> = ids.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut users = Vec::with_capacity(sorted.len());
        for id in sorted {
            match stmt.query_row(params![id.0], row_to_user) {
                Ok(user) => users.push(user),
                Err(rusqlite::Error::QueryReturnedNoRows) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(users)
    }

    // ------------------------------------------------------------------
    // Presence
    // ------------------------------------------------------------------

    /// Mark a user online. `last_online` is left untouched. Returns `false`
    /// when the user does not exist.
    pub fn mark_online(&self, id: UserId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("UPDATE users SET is_online = 1 WHERE id = ?1", params![id.0])?;
        Ok(affected > 0)
    }

    /// Mark a user offline and record when that happened.
    pub fn mark_offline(&self, id: UserId, at: DateTime<Utc>) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE users SET is_online = 0, last_online = ?1 WHERE id = ?2",
            params![encode_ts(&at), id.0],
        )?;
        Ok(affected > 0)
    }

    /// Mark every user still flagged online as offline at `at`.
    ///
    /// Run at startup: live connections do not survive a restart, so any
    /// `is_online` flag left behind by a previous process is stale.
    pub fn reset_presence(&self, at: DateTime<Utc>) -> Result<usize> {
        Ok(self.conn().execute(
            "UPDATE users SET is_online = 0, last_online = ?1 WHERE is_online = 1",
            params![encode_ts(&at)],
        )?)
    }

    // ------------------------------------------------------------------
    // Friends
    // ------------------------------------------------------------------

    /// Friend ids of `user`, in the order they were added.
    pub fn list_friends(&self, user: UserId) -> Result<Vec<UserId>> {
        let mut stmt = self.conn().prepare(
            "SELECT friend_id FROM friends
             WHERE user_id = ?1
             ORDER BY rowid ASC",
        )?;

        let rows = stmt.query_map(params![user.0], |row| row.get::<_, i64>(0).map(UserId))?;

        let mut friends = Vec::new();
        for row in rows {
            friends.push(row?);
        }
        Ok(friends)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Add `friend` to `user`'s friend set. Idempotent; returns `true` only
/// when the edge was new.
pub(crate) fn ensure_friend(conn: &Connection, user: UserId, friend: UserId) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO friends (user_id, friend_id) VALUES (?1, ?2)",
        params![user.0, friend.0],
    )?;
    Ok(affected > 0)
}

pub(crate) fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let last_online: Option<String> = row.get(7)?;
    let created_at: String = row.get(8)?;

    Ok(User {
        id: UserId(row.get(0)?),
        username: row.get(1)?,
        email: row.get(2)?,
        avatar: row.get(3)?,
        status: row.get(4)?,
        password_hash: row.get(5)?,
        is_online: row.get(6)?,
        last_online: last_online.map(|s| decode_ts(7, &s)).transpose()?,
        created_at: decode_ts(8, &created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::testutil::new_user;

    #[test]
    fn create_and_get_user() {
        let db = Database::open_in_memory().unwrap();
        let ada = db.create_user(&new_user("ada")).unwrap();

        assert_eq!(db.get_user(ada.id).unwrap(), ada);
        assert!(!ada.is_online);
        assert_eq!(ada.status, "default");
    }

    #[test]
    fn unknown_user_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.get_user(UserId(99)), Err(StoreError::NotFound)));
    }

    #[test]
    fn duplicate_username_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&new_user("ada")).unwrap();
        assert!(db.create_user(&new_user("ada")).is_err());
    }

    #[test]
    fn presence_transitions() {
        let db = Database::open_in_memory().unwrap();
        let ada = db.create_user(&new_user("ada")).unwrap();

        assert!(db.mark_online(ada.id).unwrap());
        let user = db.get_user(ada.id).unwrap();
        assert!(user.is_online);
        assert!(user.last_online.is_none());

        let at = Utc::now();
        assert!(db.mark_offline(ada.id, at).unwrap());
        let user = db.get_user(ada.id).unwrap();
        assert!(!user.is_online);
        assert_eq!(
            user.last_online.map(|t| t.timestamp_micros()),
            Some(at.timestamp_micros())
        );

        assert!(!db.mark_online(UserId(404)).unwrap());
    }

    #[test]
    fn reset_presence_clears_stale_flags() {
        let db = Database::open_in_memory().unwrap();
        let ada = db.create_user(&new_user("ada")).unwrap();
        let bob = db.create_user(&new_user("bob")).unwrap();
        db.mark_online(ada.id).unwrap();

        assert_eq!(db.reset_presence(Utc::now()).unwrap(), 1);
        assert!(!db.get_user(ada.id).unwrap().is_online);
        assert!(db.get_user(ada.id).unwrap().last_online.is_some());
        assert!(db.get_user(bob.id).unwrap().last_online.is_none());
    }

    #[test]
    fn friends_have_set_semantics() {
        let db = Database::open_in_memory().unwrap();
        let ada = db.create_user(&new_user("ada")).unwrap();
        let bob = db.create_user(&new_user("bob")).unwrap();
        let cy = db.create_user(&new_user("cy")).unwrap();

        assert!(ensure_friend(db.conn(), ada.id, cy.id).unwrap());
        assert!(ensure_friend(db.conn(), ada.id, bob.id).unwrap());
        assert!(!ensure_friend(db.conn(), ada.id, cy.id).unwrap());

        assert_eq!(db.list_friends(ada.id).unwrap(), vec![cy.id, bob.id]);
        assert!(db.list_friends(bob.id).unwrap().is_empty());
    }

    #[test]
    fn get_users_skips_unknown() {
        let db = Database::open_in_memory().unwrap();
        let ada = db.create_user(&new_user("ada")).unwrap();
        let bob = db.create_user(&new_user("bob")).unwrap();

        let users = db.get_users(&[bob.id, UserId(404), ada.id, bob.id]).unwrap();
        let ids: Vec<UserId> = users.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![ada.id, bob.id]);
    }
}
