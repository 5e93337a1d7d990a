//! Session registry
//!
//! Minimal login-session bookkeeping for a caller that authenticates users:
//! issue a token, check it later.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new token for `user_id`.
    pub fn create_session(&self, user_id: &str) -> String {
        let token = Uuid::new_v4().to_string();
        let now = Utc::now();
        let record = SessionRecord {
            user_id: user_id.to_string(),
            created_at: now,
            last_activity: now,
        };
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.insert(token.clone(), record);
        }
        token
    }

    /// Whether `token` is known. A known token has its activity time refreshed.
    pub fn validate_session(&self, token: &str) -> bool {
        let Ok(mut sessions) = self.sessions.write() else {
            return false;
        };
        match sessions.get_mut(token) {
            Some(record) => {
                record.last_activity = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, token: &str) -> Option<SessionRecord> {
        self.sessions.read().ok()?.get(token).cloned()
    }
}
