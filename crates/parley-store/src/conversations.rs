//! CRUD operations for [`Conversation`] records and their membership.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use parley_shared::constants::SELF_NOTES_NAME;
use parley_shared::types::{ConversationId, UserId};

use crate::database::{decode_ts, encode_ts, not_found, Database};
use crate::error::{Result, StoreError};
use crate::models::{Conversation, NewConversation};
use crate::users::ensure_friend;

const CONVERSATION_COLUMNS: &str = "id, name, avatar, owner_id, self_notes_for, message_count, \
                                    last_message, created_at, updated_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Create a direct or group conversation.
    ///
    /// The owner is always a member. Every participant is made a friend of
    /// every other participant (idempotently), as contact creation does.
    /// Fails with [`StoreError::InvalidMembership`] when fewer than two
    /// distinct users would take part.
    pub fn create_conversation(&mut self, new: &NewConversation) -> Result<Conversation> {
        let mut members: Vec<UserId> = new.members.clone();
        members.push(new.owner_id);
        members.sort();
        members.dedup();

        if members.len() < 2 {
            return Err(StoreError::InvalidMembership(
                "a conversation needs at least two distinct members".into(),
            ));
        }
        if members.iter().any(UserId::is_system) {
            return Err(StoreError::InvalidMembership(
                "the system owner cannot be a member".into(),
            ));
        }

        let now = encode_ts(&Utc::now());
        let tx = self.conn_mut().transaction()?;

        tx.execute(
            "INSERT INTO conversations (name, avatar, owner_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![new.name, new.avatar, new.owner_id.0, now],
        )?;
        let id = ConversationId(tx.last_insert_rowid());

        for member in &members {
            tx.execute(
                "INSERT INTO conversation_members (conversation_id, user_id) VALUES (?1, ?2)",
                params![id.0, member.0],
            )?;
        }

        for a in &members {
            for b in members.iter().filter(|b| *b != a) {
                ensure_friend(&tx, *a, *b)?;
            }
        }

        let conversation = fetch_conversation(&tx, id)?;
        tx.commit()?;

        tracing::debug!(conversation = %id, members = members.len(), "conversation created");
        Ok(conversation)
    }

    /// Return `user`'s self-notes conversation, creating it on first use.
    ///
    /// The row is owned by [`UserId::SYSTEM`] and has `user` as its only
    /// member. The unique `self_notes_for` column keeps it to one per user.
    pub fn get_or_create_self_notes(&mut self, user: UserId) -> Result<Conversation> {
        let tx = self.conn_mut().transaction()?;

        let now = encode_ts(&Utc::now());
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO conversations
                 (name, owner_id, self_notes_for, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![SELF_NOTES_NAME, UserId::SYSTEM.0, user.0, now],
        )?;

        if inserted > 0 {
            let id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO conversation_members (conversation_id, user_id) VALUES (?1, ?2)",
                params![id, user.0],
            )?;
            tracing::debug!(user = %user, conversation = id, "self-notes conversation created");
        }

        let conversation = find_self_notes(&tx, user)?.ok_or(StoreError::NotFound)?;
        tx.commit()?;
        Ok(conversation)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single conversation, members included.
    pub fn get_conversation(&self, id: ConversationId) -> Result<Conversation> {
        fetch_conversation(self.conn(), id)
    }

    /// Conversations `user` belongs to, most recently active first.
    pub fn list_conversations_for_user(
        &self,
        user: UserId,
        limit: u32,
    ) -> Result<Vec<Conversation>> {
        let mut stmt = self.conn().prepare(
            "SELECT c.id
             FROM conversations c
             JOIN conversation_members m ON m.conversation_id = c.id
             WHERE m.user_id = ?1
             ORDER BY c.updated_at DESC, c.id DESC
             LIMIT ?2",
        )?;

        let ids = stmt.query_map(params![user.0, limit], |row| row.get::<_, i64>(0))?;

        let mut conversations = Vec::new();
        for id in ids {
            conversations.push(fetch_conversation(self.conn(), ConversationId(id?))?);
        }
        Ok(conversations)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn is_member(
    conn: &Connection,
    conversation: ConversationId,
    user: UserId,
) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM conversation_members WHERE conversation_id = ?1 AND user_id = ?2",
            params![conversation.0, user.0],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// `user`'s self-notes conversation, if it has been created yet.
pub(crate) fn find_self_notes(conn: &Connection, user: UserId) -> Result<Option<Conversation>> {
    let id: Option<i64> = conn
        .query_row(
            "SELECT id FROM conversations WHERE self_notes_for = ?1",
            params![user.0],
            |row| row.get(0),
        )
        .optional()?;

    id.map(|id| fetch_conversation(conn, ConversationId(id)))
        .transpose()
}

fn fetch_conversation(conn: &Connection, id: ConversationId) -> Result<Conversation> {
    let mut conversation = conn
        .query_row(
            &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
            params![id.0],
            row_to_conversation,
        )
        .map_err(not_found)?;

    let mut stmt = conn.prepare(
        "SELECT user_id FROM conversation_members
         WHERE conversation_id = ?1
         ORDER BY user_id ASC",
    )?;
    let rows = stmt.query_map(params![id.0], |row| row.get::<_, i64>(0).map(UserId))?;
    for row in rows {
        conversation.members.push(row?);
    }

    Ok(conversation)
}

/// Map a `rusqlite::Row` to a [`Conversation`] with an empty member list.
fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    let self_notes_for: Option<i64> = row.get(4)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;

    Ok(Conversation {
        id: ConversationId(row.get(0)?),
        name: row.get(1)?,
        avatar: row.get(2)?,
        owner_id: UserId(row.get(3)?),
        self_notes_for: self_notes_for.map(UserId),
        members: Vec::new(),
        message_count: row.get(5)?,
        last_message: row.get(6)?,
        created_at: decode_ts(7, &created_at)?,
        updated_at: decode_ts(8, &updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::new_user;

    fn direct(owner: UserId, other: UserId) -> NewConversation {
        NewConversation {
            owner_id: owner,
            name: None,
            avatar: None,
            members: vec![other],
        }
    }

    #[test]
    fn create_direct_conversation() {
        let mut db = Database::open_in_memory().unwrap();
        let ada = db.create_user(&new_user("ada")).unwrap();
        let bob = db.create_user(&new_user("bob")).unwrap();

        let c = db.create_conversation(&direct(ada.id, bob.id)).unwrap();
        assert_eq!(c.members, vec![ada.id, bob.id]);
        assert_eq!(c.owner_id, ada.id);
        assert_eq!(c.message_count, 0);
        assert!(!c.is_self_notes());

        assert_eq!(db.get_conversation(c.id).unwrap(), c);
        assert!(is_member(db.conn(), c.id, bob.id).unwrap());
    }

    #[test]
    fn create_conversation_makes_participants_friends() {
        let mut db = Database::open_in_memory().unwrap();
        let ada = db.create_user(&new_user("ada")).unwrap();
        let bob = db.create_user(&new_user("bob")).unwrap();
        let cy = db.create_user(&new_user("cy")).unwrap();

        db.create_conversation(&direct(ada.id, bob.id)).unwrap();
        db.create_conversation(&NewConversation {
            owner_id: ada.id,
            name: Some("trio".into()),
            avatar: None,
            members: vec![bob.id, cy.id],
        })
        .unwrap();

        assert_eq!(db.list_friends(ada.id).unwrap(), vec![bob.id, cy.id]);
        assert_eq!(db.list_friends(cy.id).unwrap(), vec![ada.id, bob.id]);
    }

    #[test]
    fn single_member_conversation_rejected() {
        let mut db = Database::open_in_memory().unwrap();
        let ada = db.create_user(&new_user("ada")).unwrap();

        let err = db.create_conversation(&direct(ada.id, ada.id)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidMembership(_)));
    }

    #[test]
    fn self_notes_created_once_per_user() {
        let mut db = Database::open_in_memory().unwrap();
        let ada = db.create_user(&new_user("ada")).unwrap();
        let bob = db.create_user(&new_user("bob")).unwrap();

        assert!(find_self_notes(db.conn(), ada.id).unwrap().is_none());

        let first = db.get_or_create_self_notes(ada.id).unwrap();
        let again = db.get_or_create_self_notes(ada.id).unwrap();
        let other = db.get_or_create_self_notes(bob.id).unwrap();

        assert_eq!(first.id, again.id);
        assert_ne!(first.id, other.id);
        assert_eq!(first.members, vec![ada.id]);
        assert_eq!(other.members, vec![bob.id]);
        assert_eq!(first.owner_id, UserId::SYSTEM);
        assert_eq!(first.self_notes_for, Some(ada.id));
        assert_eq!(first.name.as_deref(), Some(SELF_NOTES_NAME));
        assert_eq!(find_self_notes(db.conn(), ada.id).unwrap(), Some(first));
    }

    #[test]
    fn missing_conversation_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.get_conversation(ConversationId(42)),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn list_for_user_only_returns_memberships() {
        let mut db = Database::open_in_memory().unwrap();
        let ada = db.create_user(&new_user("ada")).unwrap();
        let bob = db.create_user(&new_user("bob")).unwrap();
        let cy = db.create_user(&new_user("cy")).unwrap();

        let ab = db.create_conversation(&direct(ada.id, bob.id)).unwrap();
        let bc = db.create_conversation(&direct(bob.id, cy.id)).unwrap();

        let ada_list: Vec<ConversationId> = db
            .list_conversations_for_user(ada.id, 12)
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ada_list, vec![ab.id]);

        let bob_list = db.list_conversations_for_user(bob.id, 1).unwrap();
        assert_eq!(bob_list.len(), 1);
        assert_eq!(bob_list[0].id, bc.id);
    }
}
