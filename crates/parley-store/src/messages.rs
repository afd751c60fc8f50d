use chrono::{DateTime, Utc};
use rusqlite::params;

use parley_shared::types::{ConversationId, MessageId, UserId};

use crate::conversations::is_member;
use crate::database::{decode_ts, encode_ts, Database};
use crate::error::{Result, StoreError};
use crate::models::Message;

impl Database {
    /// Persist a message and bump its conversation's counters.
    ///
    /// The insert, the `message_count` increment and the `last_message`
    /// overwrite commit together or not at all. The author must be a member
    /// of the conversation at commit time.
    pub fn append_message(
        &mut self,
        conversation_id: ConversationId,
        owner_id: UserId,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Message> {
        let tx = self.conn_mut().transaction()?;

        if !is_member(&tx, conversation_id, owner_id)? {
            return Err(StoreError::NotMember);
        }

        let ts = encode_ts(&created_at);
        tx.execute(
            "INSERT INTO messages (conversation_id, owner_id, content, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![conversation_id.0, owner_id.0, content, ts],
        )?;
        let id = MessageId(tx.last_insert_rowid());

        let updated = tx.execute(
            "UPDATE conversations
             SET message_count = message_count + 1,
                 last_message = ?1,
                 updated_at = ?2
             WHERE id = ?3",
            params![content, ts, conversation_id.0],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound);
        }

        tx.commit()?;

        Ok(Message {
            id,
            conversation_id,
            owner_id,
            content: content.to_string(),
            created_at: decode_ts(4, &ts)?,
        })
    }

    /// One page of a conversation's log, newest first.
    pub fn get_messages_for_conversation(
        &self,
        conversation_id: ConversationId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, conversation_id, owner_id, content, created_at
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2 OFFSET ?3",
        )?;

        let rows = stmt.query_map(params![conversation_id.0, limit, offset], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn count_messages(&self, conversation_id: ConversationId) -> Result<i64> {
        Ok(self.conn().query_row(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
            params![conversation_id.0],
            |row| row.get(0),
        )?)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let ts_str: String = row.get(4)?;

    Ok(Message {
        id: MessageId(row.get(0)?),
        conversation_id: ConversationId(row.get(1)?),
        owner_id: UserId(row.get(2)?),
        content: row.get(3)?,
        created_at: decode_ts(4, &ts_str)?,
    })
}
