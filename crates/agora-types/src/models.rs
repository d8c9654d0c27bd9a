use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A stored or submitted label that is not one of the known values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value:?}")]
pub struct UnknownLabel {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownLabel {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// User role. Capability checks go through the predicate methods below rather
/// than comparing labels at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Citizen,
    Minister,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Citizen => "citizen",
            Role::Minister => "minister",
            Role::Admin => "admin",
        }
    }

    /// Read and vote in the minister-restricted scope.
    pub fn can_access_minister_scope(self) -> bool {
        matches!(self, Role::Minister | Role::Admin)
    }

    /// Submit proposals of kind `law`.
    pub fn can_propose_law(self) -> bool {
        matches!(self, Role::Minister | Role::Admin)
    }

    /// Append entries to the decision registry.
    pub fn can_record_decisions(self) -> bool {
        matches!(self, Role::Minister | Role::Admin)
    }

    /// See live vote totals and per-voter breakdowns while voting is open.
    pub fn can_audit_votes(self) -> bool {
        matches!(self, Role::Admin)
    }

    /// Change other users' roles.
    pub fn can_manage_users(self) -> bool {
        matches!(self, Role::Admin)
    }

    /// Delete proposals and registry entries.
    pub fn can_moderate(self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl FromStr for Role {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "citizen" => Ok(Role::Citizen),
            "minister" => Ok(Role::Minister),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownLabel::new("role", other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Public,
    Minister,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Public => "public",
            Scope::Minister => "minister",
        }
    }
}

impl FromStr for Scope {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Scope::Public),
            "minister" => Ok(Scope::Minister),
            other => Err(UnknownLabel::new("scope", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalKind {
    Petition,
    Law,
}

impl ProposalKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProposalKind::Petition => "petition",
            ProposalKind::Law => "law",
        }
    }
}

impl FromStr for ProposalKind {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "petition" => Ok(ProposalKind::Petition),
            "law" => Ok(ProposalKind::Law),
            other => Err(UnknownLabel::new("kind", other)),
        }
    }
}

/// Proposal lifecycle. Transitions only `open -> sent_review` and
/// `open -> rejected`, performed once by settlement after the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Open,
    SentReview,
    Rejected,
}

impl ProposalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProposalStatus::Open => "open",
            ProposalStatus::SentReview => "sent_review",
            ProposalStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for ProposalStatus {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(ProposalStatus::Open),
            "sent_review" => Ok(ProposalStatus::SentReview),
            "rejected" => Ok(ProposalStatus::Rejected),
            other => Err(UnknownLabel::new("status", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteValue {
    For,
    Against,
    Abstain,
}

impl VoteValue {
    pub fn as_str(self) -> &'static str {
        match self {
            VoteValue::For => "for",
            VoteValue::Against => "against",
            VoteValue::Abstain => "abstain",
        }
    }
}

impl FromStr for VoteValue {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "for" => Ok(VoteValue::For),
            "against" => Ok(VoteValue::Against),
            "abstain" => Ok(VoteValue::Abstain),
            other => Err(UnknownLabel::new("vote value", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accepted,
    Rejected,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Accepted => "accepted",
            Decision::Rejected => "rejected",
        }
    }
}

impl FromStr for Decision {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accepted" => Ok(Decision::Accepted),
            "rejected" => Ok(Decision::Rejected),
            other => Err(UnknownLabel::new("decision", other)),
        }
    }
}

/// The authenticated user as handlers see it, resolved from a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub discord_id: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Aggregate vote counts for one proposal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    #[serde(rename = "for")]
    pub for_votes: i64,
    #[serde(rename = "against")]
    pub against_votes: i64,
    #[serde(rename = "abstain")]
    pub abstain_votes: i64,
    #[serde(rename = "total")]
    pub total_votes: i64,
}

/// Vote totals as exposed to a viewer. `Hidden` serializes as an explicit
/// `{"hidden": true}` marker so callers can never mistake withheld totals for
/// a proposal with zero votes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum VoteVisibility {
    Visible(VoteTally),
    Hidden { hidden: bool },
}

impl VoteVisibility {
    pub fn hidden() -> Self {
        VoteVisibility::Hidden { hidden: true }
    }
}

/// Decide whether a viewer gets the real totals. Live totals stay hidden
/// while voting is open so published numbers cannot sway undecided voters;
/// auditors are exempt, and settled or expired proposals show totals to
/// everyone.
pub fn apply_vote_visibility(
    tally: VoteTally,
    status: ProposalStatus,
    deadline_at: DateTime<Utc>,
    now: DateTime<Utc>,
    viewer: Role,
) -> VoteVisibility {
    let live = status == ProposalStatus::Open && deadline_at > now;
    if live && !viewer.can_audit_votes() {
        VoteVisibility::hidden()
    } else {
        VoteVisibility::Visible(tally)
    }
}
