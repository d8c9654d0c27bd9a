//! Request and response shapes for the HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    Decision, ProposalKind, ProposalStatus, Role, Scope, User, VoteTally, VoteValue, VoteVisibility,
};

// -- Auth --

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub authenticated: bool,
    pub user: Option<User>,
}

// -- Proposals --

#[derive(Debug, Clone, Serialize)]
pub struct ProposalAuthor {
    pub id: i64,
    pub username: String,
    pub avatar_url: Option<String>,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct ProposalResponse {
    pub id: i64,
    pub scope: Scope,
    pub kind: ProposalKind,
    pub title: String,
    pub description: String,
    pub status: ProposalStatus,
    pub deadline_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author: ProposalAuthor,
    pub votes: VoteVisibility,
    pub my_vote: Option<VoteValue>,
}

#[derive(Debug, Serialize)]
pub struct ListProposalsResponse {
    pub proposals: Vec<ProposalResponse>,
    pub scope: Scope,
}

/// `scope` and `kind` are free-form here; unknown values fall back to
/// `public` / `petition` at the gate. The deadline is an RFC 3339 timestamp
/// (or a naive `YYYY-MM-DDTHH:MM`, read as UTC).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateProposalRequest {
    pub scope: Option<String>,
    pub kind: Option<String>,
    pub title: String,
    pub description: String,
    pub deadline_at: String,
}

#[derive(Debug, Serialize)]
pub struct CreateProposalResponse {
    pub success: bool,
    pub proposal_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CastVoteRequest {
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct CastVoteResponse {
    pub success: bool,
    pub votes: VoteTally,
}

#[derive(Debug, Serialize)]
pub struct Voter {
    pub id: i64,
    pub username: String,
    pub avatar_url: Option<String>,
}

/// Per-voter identities, populated only for auditors.
#[derive(Debug, Default, Serialize)]
pub struct VoterBreakdown {
    #[serde(rename = "for")]
    pub for_voters: Vec<Voter>,
    #[serde(rename = "against")]
    pub against_voters: Vec<Voter>,
    #[serde(rename = "abstain")]
    pub abstain_voters: Vec<Voter>,
}

#[derive(Debug, Serialize)]
pub struct GetProposalResponse {
    pub proposal: ProposalResponse,
    pub can_see_voters: bool,
    pub voters: VoterBreakdown,
}

// -- Registry --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRegistryEntryRequest {
    pub title: String,
    pub body: String,
    pub decision: String,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateRegistryEntryResponse {
    pub success: bool,
    pub entry_id: i64,
}

#[derive(Debug, Serialize)]
pub struct RegistryEntryResponse {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub decision: Decision,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub author: ProposalAuthor,
}

#[derive(Debug, Serialize)]
pub struct ListRegistryResponse {
    pub entries: Vec<RegistryEntryResponse>,
}

// -- Notifications --

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub href: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ListNotificationsResponse {
    pub notifications: Vec<NotificationResponse>,
    pub unread_count: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkNotificationsReadRequest {
    pub id: Option<i64>,
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Serialize)]
pub struct MarkNotificationsReadResponse {
    pub success: bool,
    pub unread_count: i64,
}

// -- Admin --

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub avatar_url: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ListUsersResponse {
    pub users: Vec<UserSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateRoleRequest {
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct UpdateRoleResponse {
    pub success: bool,
    pub user: UserSummary,
}
