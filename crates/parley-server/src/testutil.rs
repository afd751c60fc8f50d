//! Shared fixtures for the gateway tests.

use chrono::Utc;

use parley_shared::{ConversationId, UserId};
use parley_store::{Database, NewConversation, NewUser, SharedDatabase, User};

pub(crate) struct TestStore {
    pub db: SharedDatabase,
}

impl TestStore {
    pub fn new() -> Self {
        Self {
            db: SharedDatabase::new(Database::open_in_memory().unwrap()),
        }
    }

    pub async fn user(&self, name: &str) -> UserId {
        let new_user = NewUser {
            username: name.to_string(),
            email: Some(format!("{name}@example.org")),
            avatar: None,
            password_hash: format!("$argon2id$hash-of-{name}"),
        };
        self.db
            .call(move |db| db.create_user(&new_user))
            .await
            .unwrap()
            .id
    }

    pub async fn get_user(&self, id: UserId) -> User {
        self.db.call(move |db| db.get_user(id)).await.unwrap()
    }

    /// Create a conversation owned by `owner` with `others` as members.
    pub async fn conversation(&self, owner: UserId, others: &[UserId]) -> ConversationId {
        let new = NewConversation {
            owner_id: owner,
            name: None,
            avatar: None,
            members: others.to_vec(),
        };
        self.db
            .call(move |db| db.create_conversation(&new))
            .await
            .unwrap()
            .id
    }

    /// Append `count` messages from `author`, one millisecond apart.
    pub async fn seed_messages(&self, id: ConversationId, author: UserId, count: i64) {
        self.db
            .call(move |db| {
                let start = Utc::now();
                for i in 0..count {
                    db.append_message(
                        id,
                        author,
                        &format!("m{i}"),
                        start + chrono::Duration::milliseconds(i),
                    )?;
                }
                Ok(())
            })
            .await
            .unwrap();
    }

    pub async fn message_count(&self, id: ConversationId) -> i64 {
        self.db.call(move |db| db.count_messages(id)).await.unwrap()
    }
}
