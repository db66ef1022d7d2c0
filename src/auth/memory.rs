//! In-memory stand-ins for the Postgres repos, used by unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::password_reset::PasswordResetRepo;
use crate::auth::repo_types::{PasswordResetRow, User};
use crate::auth::sessions::SessionRepo;
use crate::error::Result;

struct ResetRow {
    token_hash: String,
    expires_at: OffsetDateTime,
}

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    // token_hash -> user id
    sessions: HashMap<String, Uuid>,
    // keyed by user id, mirroring the unique constraint
    resets: HashMap<Uuid, ResetRow>,
}

#[derive(Default)]
pub struct MemoryAuthDb {
    tables: Mutex<Tables>,
}

impl MemoryAuthDb {
    pub fn add_user(&self, email: &str) -> User {
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: String::new(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.tables.lock().unwrap().users.push(user.clone());
        user
    }

    pub fn insert_reset(&self, user_id: Uuid, token_hash: &str, expires_at: OffsetDateTime) {
        self.tables.lock().unwrap().resets.insert(
            user_id,
            ResetRow {
                token_hash: token_hash.to_string(),
                expires_at,
            },
        );
    }

    pub fn reset_count(&self) -> usize {
        self.tables.lock().unwrap().resets.len()
    }

    pub fn session_hashes(&self) -> Vec<String> {
        self.tables.lock().unwrap().sessions.keys().cloned().collect()
    }

    fn user(tables: &Tables, id: Uuid) -> Option<User> {
        tables.users.iter().find(|u| u.id == id).cloned()
    }
}

#[async_trait]
impl SessionRepo for MemoryAuthDb {
    async fn insert(&self, user_id: Uuid, token_hash: &str) -> Result<()> {
        self.tables
            .lock()
            .unwrap()
            .sessions
            .insert(token_hash.to_string(), user_id);
        Ok(())
    }

    async fn user_by_token_hash(&self, token_hash: &str) -> Result<Option<User>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .sessions
            .get(token_hash)
            .and_then(|user_id| Self::user(&tables, *user_id)))
    }

    async fn delete_by_token_hash(&self, token_hash: &str) -> Result<()> {
        self.tables.lock().unwrap().sessions.remove(token_hash);
        Ok(())
    }
}

#[async_trait]
impl PasswordResetRepo for MemoryAuthDb {
    async fn user_id_by_email(&self, email: &str) -> Result<Option<Uuid>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.users.iter().find(|u| u.email == email).map(|u| u.id))
    }

    async fn upsert(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<()> {
        self.tables.lock().unwrap().resets.insert(
            user_id,
            ResetRow {
                token_hash: token_hash.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn take_by_token_hash(&self, token_hash: &str) -> Result<Option<PasswordResetRow>> {
        let mut tables = self.tables.lock().unwrap();
        let Some(user_id) = tables
            .resets
            .iter()
            .find(|(_, r)| r.token_hash == token_hash)
            .map(|(user_id, _)| *user_id)
        else {
            return Ok(None);
        };
        let Some(row) = tables.resets.remove(&user_id) else {
            return Ok(None);
        };
        Ok(Self::user(&tables, user_id).map(|user| PasswordResetRow {
            expires_at: row.expires_at,
            user,
        }))
    }
}
