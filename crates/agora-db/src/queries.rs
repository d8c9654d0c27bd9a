use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use agora_types::models::{Decision, ProposalKind, Role, Scope, VoteTally, VoteValue};

use crate::Database;
use crate::models::{NotificationRow, ProposalRow, RegistryRow, UserRow, VoterRow};

/// Profile fields taken from the OAuth provider on every login.
#[derive(Debug, Clone)]
pub struct OAuthProfile {
    pub discord_id: String,
    pub username: String,
    pub avatar_url: Option<String>,
}

/// Notification payload handed to the store for fan-out.
#[derive(Debug, Clone)]
pub struct NotificationPayload {
    pub kind: String,
    pub title: String,
    pub message: String,
    pub href: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub enum ReadTarget {
    One(i64),
    All,
}

/// Rejection reasons for the vote sequence, in the order they are checked.
#[derive(Debug, thiserror::Error)]
pub enum VoteError {
    #[error("proposal not found")]
    NotFound,
    #[error("minister access required")]
    MinisterOnly,
    #[error("voting is already closed")]
    Closed,
    #[error("you have already voted")]
    AlreadyVoted,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl Database {
    // -- Users --

    /// Create or refresh a user from an OAuth login. Existing users keep
    /// their role; `force_admin` (the configured seed-admin allowlist)
    /// overrides it either way. Returns the row and whether it was created.
    pub fn upsert_oauth_user(
        &self,
        profile: &OAuthProfile,
        force_admin: bool,
        now: DateTime<Utc>,
    ) -> Result<(UserRow, bool)> {
        self.with_conn(|conn| {
            let existing: Option<(i64, String)> = conn
                .query_row(
                    "SELECT id, role FROM users WHERE discord_id = ?1",
                    [&profile.discord_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let (id, created) = match existing {
                Some((id, role)) => {
                    let role = if force_admin {
                        Role::Admin.as_str().to_string()
                    } else {
                        role
                    };
                    conn.execute(
                        "UPDATE users
                         SET username = ?1, avatar_url = ?2, role = ?3, updated_at = ?4
                         WHERE id = ?5",
                        params![profile.username, profile.avatar_url, role, now, id],
                    )?;
                    (id, false)
                }
                None => {
                    let role = if force_admin { Role::Admin } else { Role::Citizen };
                    conn.execute(
                        "INSERT INTO users (discord_id, username, avatar_url, role, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                        params![
                            profile.discord_id,
                            profile.username,
                            profile.avatar_url,
                            role.as_str(),
                            now
                        ],
                    )?;
                    (conn.last_insert_rowid(), true)
                }
            };

            let row = query_user_by_id(conn, id)?
                .ok_or_else(|| anyhow!("user {id} missing after upsert"))?;
            Ok((row, created))
        })
    }

    pub fn get_user(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    /// All users, admins first, then ministers, then citizens by name.
    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, discord_id, username, avatar_url, role, created_at, updated_at
                 FROM users
                 ORDER BY
                     CASE role
                         WHEN 'admin' THEN 0
                         WHEN 'minister' THEN 1
                         ELSE 2
                     END,
                     username ASC",
            )?;

            let rows = stmt
                .query_map([], map_user_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn set_user_role(
        &self,
        id: i64,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET role = ?1, updated_at = ?2 WHERE id = ?3",
                params![role.as_str(), now, id],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_user_by_id(conn, id)
        })
    }

    // -- Sessions --

    pub fn create_session(
        &self,
        token: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (token, user_id, expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![token, user_id, expires_at, now],
            )?;
            Ok(())
        })
    }

    pub fn delete_session(&self, token: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM sessions WHERE token = ?1", [token])?;
            Ok(())
        })
    }

    /// Resolve a session token to its user. An expired token is deleted on
    /// the spot and resolves to nothing.
    pub fn session_user(&self, token: &str, now: DateTime<Utc>) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let found: Option<(DateTime<Utc>, UserRow)> = conn
                .query_row(
                    "SELECT s.expires_at,
                            u.id, u.discord_id, u.username, u.avatar_url, u.role,
                            u.created_at, u.updated_at
                     FROM sessions s
                     JOIN users u ON u.id = s.user_id
                     WHERE s.token = ?1",
                    [token],
                    |row| {
                        Ok((
                            row.get(0)?,
                            UserRow {
                                id: row.get(1)?,
                                discord_id: row.get(2)?,
                                username: row.get(3)?,
                                avatar_url: row.get(4)?,
                                role: row.get(5)?,
                                created_at: row.get(6)?,
                                updated_at: row.get(7)?,
                            },
                        ))
                    },
                )
                .optional()?;

            match found {
                Some((expires_at, user)) if expires_at > now => Ok(Some(user)),
                Some(_) => {
                    conn.execute("DELETE FROM sessions WHERE token = ?1", [token])?;
                    Ok(None)
                }
                None => Ok(None),
            }
        })
    }

    // -- Settlement --

    /// Resolve every open proposal whose deadline has passed: a strict
    /// majority of "for" votes sends it to review, anything else (ties and
    /// zero-vote proposals included) rejects it. The `status = 'open'`
    /// predicate is re-checked inside the UPDATE, so the statement is
    /// idempotent and safe under concurrent invocation. Returns the number
    /// of proposals that changed state.
    pub fn settle_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = settle(conn, now)?;
            Ok(changed)
        })
    }

    // -- Proposals --

    pub fn insert_proposal(
        &self,
        author_id: i64,
        scope: Scope,
        kind: ProposalKind,
        title: &str,
        description: &str,
        deadline_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO proposals
                     (scope, kind, title, description, author_id, deadline_at, status,
                      created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'open', ?7, ?7)",
                params![
                    scope.as_str(),
                    kind.as_str(),
                    title,
                    description,
                    author_id,
                    deadline_at,
                    now
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn list_proposals(&self, scope: Scope, viewer_id: i64) -> Result<Vec<ProposalRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{PROPOSAL_SELECT} WHERE p.scope = ?2
                 GROUP BY p.id
                 ORDER BY p.created_at DESC"
            ))?;

            let rows = stmt
                .query_map(params![viewer_id, scope.as_str()], map_proposal_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_proposal(&self, id: i64, viewer_id: i64) -> Result<Option<ProposalRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("{PROPOSAL_SELECT} WHERE p.id = ?2 GROUP BY p.id"),
                    params![viewer_id, id],
                    map_proposal_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Public proposals created by this author since `window_start`: the
    /// sliding-window count behind the creation rate limit.
    pub fn count_recent_public_proposals(
        &self,
        author_id: i64,
        window_start: DateTime<Utc>,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*)
                 FROM proposals
                 WHERE scope = 'public' AND author_id = ?1 AND created_at >= ?2",
                params![author_id, window_start],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    pub fn delete_proposal(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM proposals WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }

    // -- Votes --

    /// The whole vote sequence under one connection lock: settle, then check
    /// existence, scope access, openness and duplicates, then insert and
    /// return fresh tallies. The UNIQUE(proposal_id, user_id) constraint is
    /// the backstop that makes double-voting impossible even when two
    /// requests race past the duplicate check.
    pub fn cast_vote(
        &self,
        proposal_id: i64,
        voter_id: i64,
        voter_role: Role,
        value: VoteValue,
        now: DateTime<Utc>,
    ) -> Result<VoteTally, VoteError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| VoteError::Store(anyhow!("db lock poisoned: {e}")))?;

        settle(&conn, now).map_err(anyhow::Error::from)?;

        let header: Option<(String, String, DateTime<Utc>)> = conn
            .query_row(
                "SELECT scope, status, deadline_at FROM proposals WHERE id = ?1",
                [proposal_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(anyhow::Error::from)?;

        let Some((scope, status, deadline_at)) = header else {
            return Err(VoteError::NotFound);
        };

        if scope == Scope::Minister.as_str() && !voter_role.can_access_minister_scope() {
            return Err(VoteError::MinisterOnly);
        }

        if status != "open" || deadline_at <= now {
            return Err(VoteError::Closed);
        }

        let already: Option<i64> = conn
            .query_row(
                "SELECT id FROM votes WHERE proposal_id = ?1 AND user_id = ?2",
                params![proposal_id, voter_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(anyhow::Error::from)?;

        if already.is_some() {
            return Err(VoteError::AlreadyVoted);
        }

        match conn.execute(
            "INSERT INTO votes (proposal_id, user_id, value, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![proposal_id, voter_id, value.as_str(), now],
        ) {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(VoteError::AlreadyVoted);
            }
            Err(err) => return Err(VoteError::Store(err.into())),
        }

        query_tally(&conn, proposal_id).map_err(VoteError::Store)
    }

    /// Per-voter breakdown in ballot order. Callers gate this behind the
    /// audit capability.
    pub fn list_voters(&self, proposal_id: i64) -> Result<Vec<VoterRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT v.value, u.id, u.username, u.avatar_url
                 FROM votes v
                 JOIN users u ON u.id = v.user_id
                 WHERE v.proposal_id = ?1
                 ORDER BY v.created_at ASC",
            )?;

            let rows = stmt
                .query_map([proposal_id], |row| {
                    Ok(VoterRow {
                        value: row.get(0)?,
                        user_id: row.get(1)?,
                        username: row.get(2)?,
                        avatar_url: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Registry --

    pub fn insert_registry_entry(
        &self,
        author_id: i64,
        title: &str,
        body: &str,
        decision: Decision,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO registry_entries (title, body, decision, reason, author_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![title, body, decision.as_str(), reason, author_id, now],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn list_registry_entries(&self) -> Result<Vec<RegistryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.id, r.title, r.body, r.decision, r.reason, r.created_at,
                        r.author_id, u.username, u.avatar_url, u.role
                 FROM registry_entries r
                 JOIN users u ON u.id = r.author_id
                 ORDER BY r.created_at DESC",
            )?;

            let rows = stmt
                .query_map([], |row| {
                    Ok(RegistryRow {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        body: row.get(2)?,
                        decision: row.get(3)?,
                        reason: row.get(4)?,
                        created_at: row.get(5)?,
                        author_id: row.get(6)?,
                        author_name: row.get(7)?,
                        author_avatar: row.get(8)?,
                        author_role: row.get(9)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn delete_registry_entry(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM registry_entries WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }

    // -- Notifications --

    pub fn user_ids_by_roles(&self, roles: &[Role]) -> Result<Vec<i64>> {
        if roles.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=roles.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "SELECT id FROM users WHERE role IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let labels: Vec<&str> = roles.iter().map(|r| r.as_str()).collect();
            let bindings: Vec<&dyn rusqlite::types::ToSql> = labels
                .iter()
                .map(|label| label as &dyn rusqlite::types::ToSql)
                .collect();

            let ids = stmt
                .query_map(bindings.as_slice(), |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    /// Write one inbox row per recipient. Returns how many were written.
    pub fn notify_users(
        &self,
        user_ids: &[i64],
        payload: &NotificationPayload,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        if user_ids.is_empty() {
            return Ok(0);
        }

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "INSERT INTO notifications (user_id, type, title, message, href, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for user_id in user_ids {
                stmt.execute(params![
                    user_id,
                    payload.kind,
                    payload.title,
                    payload.message,
                    payload.href,
                    now
                ])?;
            }
            Ok(user_ids.len())
        })
    }

    pub fn list_notifications(
        &self,
        user_id: i64,
        limit: u32,
    ) -> Result<(Vec<NotificationRow>, i64)> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, type, title, message, href, is_read, created_at
                 FROM notifications
                 WHERE user_id = ?1
                 ORDER BY created_at DESC
                 LIMIT ?2",
            )?;

            let rows = stmt
                .query_map(params![user_id, limit], |row| {
                    Ok(NotificationRow {
                        id: row.get(0)?,
                        kind: row.get(1)?,
                        title: row.get(2)?,
                        message: row.get(3)?,
                        href: row.get(4)?,
                        is_read: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let unread = query_unread_count(conn, user_id)?;
            Ok((rows, unread))
        })
    }

    pub fn unread_count(&self, user_id: i64) -> Result<i64> {
        self.with_conn(|conn| query_unread_count(conn, user_id))
    }

    /// Flip the read flag on one notification (scoped to its owner) or on
    /// the whole inbox. Returns the remaining unread count.
    pub fn mark_notifications_read(&self, user_id: i64, target: ReadTarget) -> Result<i64> {
        self.with_conn(|conn| {
            match target {
                ReadTarget::All => {
                    conn.execute(
                        "UPDATE notifications SET is_read = 1
                         WHERE user_id = ?1 AND is_read = 0",
                        [user_id],
                    )?;
                }
                ReadTarget::One(id) => {
                    conn.execute(
                        "UPDATE notifications SET is_read = 1
                         WHERE id = ?1 AND user_id = ?2",
                        params![id, user_id],
                    )?;
                }
            }
            query_unread_count(conn, user_id)
        })
    }
}

/// The settlement statement, shared by the lazy read path, the vote
/// sequence and the background sweep. One conditional UPDATE so the store
/// applies each transition atomically.
fn settle(conn: &Connection, now: DateTime<Utc>) -> rusqlite::Result<usize> {
    conn.execute(
        "WITH tallies AS (
             SELECT p.id AS proposal_id,
                    COALESCE(SUM(CASE WHEN v.value = 'for' THEN 1 ELSE 0 END), 0) AS for_votes,
                    COUNT(v.id) AS total_votes
             FROM proposals p
             LEFT JOIN votes v ON v.proposal_id = p.id
             WHERE p.status = 'open' AND p.deadline_at <= ?1
             GROUP BY p.id
         )
         UPDATE proposals
         SET status = CASE
                 WHEN tallies.total_votes > 0
                  AND tallies.for_votes * 100.0 / tallies.total_votes > 50.0
                 THEN 'sent_review'
                 ELSE 'rejected'
             END,
             updated_at = ?1
         FROM tallies
         WHERE proposals.id = tallies.proposal_id
           AND proposals.status = 'open'",
        params![now],
    )
}

/// Shared SELECT for proposal reads: author join, aggregate tallies, and the
/// viewer's own vote (?1 is the viewer id).
const PROPOSAL_SELECT: &str = "
    SELECT p.id, p.scope, p.kind, p.title, p.description, p.status,
           p.deadline_at, p.created_at, p.updated_at,
           p.author_id, u.username, u.avatar_url, u.role,
           COALESCE(SUM(CASE WHEN v.value = 'for' THEN 1 ELSE 0 END), 0) AS for_votes,
           COALESCE(SUM(CASE WHEN v.value = 'against' THEN 1 ELSE 0 END), 0) AS against_votes,
           COALESCE(SUM(CASE WHEN v.value = 'abstain' THEN 1 ELSE 0 END), 0) AS abstain_votes,
           COUNT(v.id) AS total_votes,
           uv.value AS my_vote
    FROM proposals p
    JOIN users u ON u.id = p.author_id
    LEFT JOIN votes v ON v.proposal_id = p.id
    LEFT JOIN votes uv ON uv.proposal_id = p.id AND uv.user_id = ?1";

fn map_proposal_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProposalRow> {
    Ok(ProposalRow {
        id: row.get(0)?,
        scope: row.get(1)?,
        kind: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        status: row.get(5)?,
        deadline_at: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        author_id: row.get(9)?,
        author_name: row.get(10)?,
        author_avatar: row.get(11)?,
        author_role: row.get(12)?,
        for_votes: row.get(13)?,
        against_votes: row.get(14)?,
        abstain_votes: row.get(15)?,
        total_votes: row.get(16)?,
        my_vote: row.get(17)?,
    })
}

fn map_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        discord_id: row.get(1)?,
        username: row.get(2)?,
        avatar_url: row.get(3)?,
        role: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn query_user_by_id(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    let row = conn
        .query_row(
            "SELECT id, discord_id, username, avatar_url, role, created_at, updated_at
             FROM users WHERE id = ?1",
            [id],
            map_user_row,
        )
        .optional()?;
    Ok(row)
}

fn query_tally(conn: &Connection, proposal_id: i64) -> Result<VoteTally> {
    let tally = conn.query_row(
        "SELECT COALESCE(SUM(CASE WHEN value = 'for' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN value = 'against' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN value = 'abstain' THEN 1 ELSE 0 END), 0),
                COUNT(*)
         FROM votes
         WHERE proposal_id = ?1",
        [proposal_id],
        |row| {
            Ok(VoteTally {
                for_votes: row.get(0)?,
                against_votes: row.get(1)?,
                abstain_votes: row.get(2)?,
                total_votes: row.get(3)?,
            })
        },
    )?;
    Ok(tally)
}

fn query_unread_count(conn: &Connection, user_id: i64) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
        [user_id],
        |row| row.get(0),
    )?;
    Ok(count)
}
