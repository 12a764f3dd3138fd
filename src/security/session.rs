//! Session registry
//!
//! Sessions opened after OTP completion. A session binds a caller to one
//! account (customers) or to an admin username.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{OperationContext, Role};

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub actor: String,
    pub role: Role,
    pub account_number: Option<String>,
    pub opened_at: DateTime<Utc>,
}

impl Session {
    /// Operation context carrying this session's identity
    pub fn context(&self) -> OperationContext {
        let base = match (&self.role, &self.account_number) {
            (Role::Customer, Some(account)) => OperationContext::customer(account.clone()),
            (Role::Admin, _) => OperationContext::admin(self.actor.clone()),
            _ => OperationContext::system(),
        };
        base.with_session(self.id)
    }
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Uuid, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<Uuid, Session>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn open_customer(&self, account_number: &str) -> Session {
        self.insert(Session {
            id: Uuid::new_v4(),
            actor: account_number.to_string(),
            role: Role::Customer,
            account_number: Some(account_number.to_string()),
            opened_at: Utc::now(),
        })
    }

    pub fn open_admin(&self, username: &str) -> Session {
        self.insert(Session {
            id: Uuid::new_v4(),
            actor: username.to_string(),
            role: Role::Admin,
            account_number: None,
            opened_at: Utc::now(),
        })
    }

    fn insert(&self, session: Session) -> Session {
        self.sessions().insert(session.id, session.clone());
        session
    }

    pub fn get(&self, id: Uuid) -> Option<Session> {
        self.sessions().get(&id).cloned()
    }

    pub fn close(&self, id: Uuid) -> bool {
        self.sessions().remove(&id).is_some()
    }

    /// Invalidate every session bound to `account_number`
    pub fn revoke_account(&self, account_number: &str) -> usize {
        let mut sessions = self.sessions();
        let before = sessions.len();
        sessions.retain(|_, s| s.account_number.as_deref() != Some(account_number));
        before - sessions.len()
    }

    /// Invalidate every admin session of `username`
    pub fn revoke_admin(&self, username: &str) -> usize {
        let mut sessions = self.sessions();
        let before = sessions.len();
        sessions.retain(|_, s| !(s.role == Role::Admin && s.actor.eq_ignore_ascii_case(username)));
        before - sessions.len()
    }
}
