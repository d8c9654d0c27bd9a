//! Database row types: these map directly to SQLite rows.
//! Enum-ish columns stay as text here; callers parse them into the shared
//! `agora-types` enums at the API boundary.

use anyhow::Result;
use chrono::{DateTime, Utc};

use agora_types::models::{Role, User};

pub struct UserRow {
    pub id: i64,
    pub discord_id: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRow {
    pub fn into_user(self) -> Result<User> {
        let role: Role = self.role.parse()?;
        Ok(User {
            id: self.id,
            discord_id: self.discord_id,
            username: self.username,
            avatar_url: self.avatar_url,
            role,
            created_at: self.created_at,
        })
    }
}

/// One proposal joined with its author and vote tallies, plus the viewer's
/// own vote when present.
pub struct ProposalRow {
    pub id: i64,
    pub scope: String,
    pub kind: String,
    pub title: String,
    pub description: String,
    pub status: String,
    pub deadline_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author_id: i64,
    pub author_name: String,
    pub author_avatar: Option<String>,
    pub author_role: String,
    pub for_votes: i64,
    pub against_votes: i64,
    pub abstain_votes: i64,
    pub total_votes: i64,
    pub my_vote: Option<String>,
}

pub struct VoterRow {
    pub value: String,
    pub user_id: i64,
    pub username: String,
    pub avatar_url: Option<String>,
}

pub struct RegistryRow {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub decision: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub author_id: i64,
    pub author_name: String,
    pub author_avatar: Option<String>,
    pub author_role: String,
}

pub struct NotificationRow {
    pub id: i64,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub href: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
