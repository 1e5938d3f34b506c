//! Persisted security tokens (access, refresh, invitation, reset).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Purpose a token was minted for. Doubles as the `scope` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "token_type", rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Invitation,
    Reset,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Invitation => "invitation",
            TokenType::Reset => "reset",
            TokenType::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row in `security_tokens`.
///
/// `user_id` is empty for invitation tokens, which are minted before the
/// user exists.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct SecurityToken {
    pub id: Uuid,
    pub token: String,
    pub token_type: TokenType,
    pub created_at: DateTime<Utc>,
    pub expire_on: DateTime<Utc>,
    pub user_id: Option<Uuid>,
}

impl SecurityToken {
    pub fn new(
        token: String,
        token_type: TokenType,
        expire_on: DateTime<Utc>,
        user_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            token,
            token_type,
            created_at: Utc::now(),
            expire_on,
            user_id,
        }
    }
}
