//! Proposal lifecycle handlers: list, get, create, vote, moderate.
//!
//! Every read path settles expired proposals first, so the status a caller
//! observes is always current at the moment of the read.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::info;

use agora_db::models::ProposalRow;
use agora_db::queries::NotificationPayload;
use agora_types::api::{
    CastVoteRequest, CastVoteResponse, CreateProposalRequest, CreateProposalResponse,
    GetProposalResponse, ListProposalsResponse, ProposalAuthor, ProposalResponse, Voter,
    VoterBreakdown,
};
use agora_types::models::{
    ProposalKind, ProposalStatus, Role, Scope, User, VoteTally, VoteValue, apply_vote_visibility,
};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::validate;

/// At most this many public proposals per author inside the trailing window.
const PUBLIC_CREATION_LIMIT: i64 = 2;
const PUBLIC_CREATION_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub scope: Option<String>,
}

/// Unknown scope labels fall back to the public section.
fn parse_scope(raw: Option<&str>) -> Scope {
    match raw {
        Some("minister") => Scope::Minister,
        _ => Scope::Public,
    }
}

fn proposal_response(
    row: ProposalRow,
    viewer: Role,
    now: DateTime<Utc>,
) -> Result<ProposalResponse, ApiError> {
    let scope: Scope = row.scope.parse().map_err(anyhow::Error::from)?;
    let kind: ProposalKind = row.kind.parse().map_err(anyhow::Error::from)?;
    let status: ProposalStatus = row.status.parse().map_err(anyhow::Error::from)?;
    let author_role: Role = row.author_role.parse().map_err(anyhow::Error::from)?;
    let my_vote = row
        .my_vote
        .as_deref()
        .map(str::parse::<VoteValue>)
        .transpose()
        .map_err(anyhow::Error::from)?;

    let tally = VoteTally {
        for_votes: row.for_votes,
        against_votes: row.against_votes,
        abstain_votes: row.abstain_votes,
        total_votes: row.total_votes,
    };
    let votes = apply_vote_visibility(tally, status, row.deadline_at, now, viewer);

    Ok(ProposalResponse {
        id: row.id,
        scope,
        kind,
        title: row.title,
        description: row.description,
        status,
        deadline_at: row.deadline_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
        author: ProposalAuthor {
            id: row.author_id,
            username: row.author_name,
            avatar_url: row.author_avatar,
            role: author_role,
        },
        votes,
        my_vote,
    })
}

/// `GET /proposals?scope=`: settle, then list the requested section with
/// per-item vote visibility already applied.
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListProposalsResponse>, ApiError> {
    let scope = parse_scope(query.scope.as_deref());
    if scope == Scope::Minister && !user.role.can_access_minister_scope() {
        return Err(ApiError::Forbidden("minister access required"));
    }

    let now = Utc::now();
    let st = state.clone();
    let viewer_id = user.id;
    let rows = blocking(move || {
        st.db.settle_expired(now)?;
        st.db.list_proposals(scope, viewer_id).map_err(ApiError::from)
    })
    .await?;

    let proposals = rows
        .into_iter()
        .map(|row| proposal_response(row, user.role, now))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(ListProposalsResponse { proposals, scope }))
}

/// `GET /proposals/{id}`: one proposal plus, for auditors, the per-voter
/// breakdown.
pub async fn get_one(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
) -> Result<Json<GetProposalResponse>, ApiError> {
    if id <= 0 {
        return Err(ApiError::Validation("invalid proposal id".to_string()));
    }

    let now = Utc::now();
    let can_see_voters = user.role.can_audit_votes();
    let st = state.clone();
    let viewer_id = user.id;
    let (row, voter_rows) = blocking(move || {
        st.db.settle_expired(now)?;
        let Some(row) = st.db.get_proposal(id, viewer_id)? else {
            return Err(ApiError::NotFound("proposal"));
        };
        let voters = if can_see_voters {
            st.db.list_voters(id)?
        } else {
            Vec::new()
        };
        Ok((row, voters))
    })
    .await?;

    let scope: Scope = row.scope.parse().map_err(anyhow::Error::from)?;
    if scope == Scope::Minister && !user.role.can_access_minister_scope() {
        return Err(ApiError::Forbidden("minister access required"));
    }

    let proposal = proposal_response(row, user.role, now)?;

    let mut voters = VoterBreakdown::default();
    for row in voter_rows {
        let voter = Voter {
            id: row.user_id,
            username: row.username,
            avatar_url: row.avatar_url,
        };
        match row.value.parse::<VoteValue>().map_err(anyhow::Error::from)? {
            VoteValue::For => voters.for_voters.push(voter),
            VoteValue::Against => voters.against_voters.push(voter),
            VoteValue::Abstain => voters.abstain_voters.push(voter),
        }
    }

    Ok(Json(GetProposalResponse {
        proposal,
        can_see_voters,
        voters,
    }))
}

/// `POST /proposals`: the creation gate. Normalize and validate input,
/// check scope/kind eligibility, enforce the sliding-window rate limit,
/// insert, then fan out a notification to ministers and admins.
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(req): Json<CreateProposalRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = parse_scope(req.scope.as_deref());
    let kind = match req.kind.as_deref() {
        Some("law") => ProposalKind::Law,
        _ => ProposalKind::Petition,
    };

    let title = validate::title(&req.title)?;
    let description = validate::body(&req.description)?;
    let now = Utc::now();
    let deadline_at = validate::deadline(&req.deadline_at, now)?;

    if scope == Scope::Minister && !user.role.can_access_minister_scope() {
        return Err(ApiError::Forbidden("minister access required"));
    }
    if kind == ProposalKind::Law && !user.role.can_propose_law() {
        return Err(ApiError::Forbidden("law proposals require the minister role"));
    }

    let st = state.clone();
    let author = user.clone();
    let proposal_id = blocking(move || {
        if scope == Scope::Public {
            let window_start = now - Duration::hours(PUBLIC_CREATION_WINDOW_HOURS);
            let recent = st.db.count_recent_public_proposals(author.id, window_start)?;
            if recent >= PUBLIC_CREATION_LIMIT {
                return Err(ApiError::RateLimited(format!(
                    "at most {PUBLIC_CREATION_LIMIT} public proposals may be created per \
                     {PUBLIC_CREATION_WINDOW_HOURS} hours"
                )));
            }
        }

        let proposal_id =
            st.db
                .insert_proposal(author.id, scope, kind, &title, &description, deadline_at, now)?;

        let targets = st.db.user_ids_by_roles(&[Role::Admin, Role::Minister])?;
        let noun = match kind {
            ProposalKind::Law => "law proposal",
            ProposalKind::Petition => "petition",
        };
        st.db.notify_users(
            &targets,
            &NotificationPayload {
                kind: "proposal_created".to_string(),
                title: "New proposal".to_string(),
                message: format!("{} submitted a {noun}: {title}", author.username),
                href: Some(format!("/petition-detail?id={proposal_id}")),
            },
            now,
        )?;

        Ok(proposal_id)
    })
    .await?;

    info!(
        "proposal {proposal_id} created by {} ({}/{})",
        user.username,
        scope.as_str(),
        kind.as_str()
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateProposalResponse {
            success: true,
            proposal_id,
        }),
    ))
}

/// `POST /proposals/{id}/vote`: record one ballot. Validation order:
/// input shape, settlement, existence, scope access, openness, duplicate
/// check, insert; the store's uniqueness constraint backstops the race.
pub async fn cast_vote(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
    Json(req): Json<CastVoteRequest>,
) -> Result<Json<CastVoteResponse>, ApiError> {
    if id <= 0 {
        return Err(ApiError::Validation("invalid proposal id".to_string()));
    }
    let value: VoteValue = req
        .value
        .trim()
        .parse()
        .map_err(|_| ApiError::Validation("vote value must be for, against or abstain".to_string()))?;

    let now = Utc::now();
    let st = state.clone();
    let role = user.role;
    let voter_id = user.id;
    let votes =
        blocking(move || st.db.cast_vote(id, voter_id, role, value, now).map_err(ApiError::from))
            .await?;

    Ok(Json(CastVoteResponse { success: true, votes }))
}

/// `DELETE /proposals/{id}`: admin moderation; votes go with the proposal.
pub async fn remove(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !user.role.can_moderate() {
        return Err(ApiError::Forbidden("admin access required"));
    }
    if id <= 0 {
        return Err(ApiError::Validation("invalid proposal id".to_string()));
    }

    let st = state.clone();
    let deleted = blocking(move || st.db.delete_proposal(id).map_err(ApiError::from)).await?;
    if !deleted {
        return Err(ApiError::NotFound("proposal"));
    }

    info!("proposal {id} deleted by {}", user.username);
    Ok(Json(serde_json::json!({ "success": true, "proposal_id": id })))
}
