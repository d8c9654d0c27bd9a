//! Store tests against an in-memory database.

use chrono::{DateTime, Duration, TimeZone, Utc};

use agora_types::models::{Decision, ProposalKind, ProposalStatus, Role, Scope, VoteValue};

use crate::Database;
use crate::queries::{NotificationPayload, OAuthProfile, ReadTarget, VoteError};

fn db() -> Database {
    Database::open_in_memory().expect("in-memory db")
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn seed_user(db: &Database, name: &str, role: Role) -> i64 {
    let profile = OAuthProfile {
        discord_id: format!("discord-{name}"),
        username: name.to_string(),
        avatar_url: None,
    };
    let (user, created) = db.upsert_oauth_user(&profile, false, t0()).unwrap();
    assert!(created);
    if role != Role::Citizen {
        db.set_user_role(user.id, role, t0()).unwrap();
    }
    user.id
}

fn seed_proposal(db: &Database, author: i64, scope: Scope, deadline: DateTime<Utc>) -> i64 {
    db.insert_proposal(
        author,
        scope,
        ProposalKind::Petition,
        "Repaint the old bridge",
        "The paint has peeled for two winters now.",
        deadline,
        t0(),
    )
    .unwrap()
}

fn proposal_status(db: &Database, id: i64) -> (ProposalStatus, DateTime<Utc>) {
    db.with_conn(|conn| {
        let (status, updated_at): (String, DateTime<Utc>) = conn.query_row(
            "SELECT status, updated_at FROM proposals WHERE id = ?1",
            [id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((status.parse().unwrap(), updated_at))
    })
    .unwrap()
}

fn vote_rows(db: &Database, id: i64) -> i64 {
    db.with_conn(|conn| {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM votes WHERE proposal_id = ?1",
            [id],
            |row| row.get(0),
        )?;
        Ok(count)
    })
    .unwrap()
}

// ── Settlement ──

#[test]
fn settlement_rejects_expired_proposal_with_no_votes() {
    let db = db();
    let author = seed_user(&db, "ada", Role::Citizen);
    let proposal = seed_proposal(&db, author, Scope::Public, t0() + Duration::hours(1));

    let settled = db.settle_expired(t0() + Duration::hours(2)).unwrap();
    assert_eq!(settled, 1);

    let (status, _) = proposal_status(&db, proposal);
    assert_eq!(status, ProposalStatus::Rejected);
}

#[test]
fn settlement_requires_strict_majority() {
    let db = db();
    let author = seed_user(&db, "ada", Role::Citizen);
    let a = seed_user(&db, "bela", Role::Citizen);
    let b = seed_user(&db, "cleo", Role::Citizen);
    let c = seed_user(&db, "dina", Role::Citizen);

    // Exactly 50% "for": rejected.
    let tied = seed_proposal(&db, author, Scope::Public, t0() + Duration::hours(1));
    db.cast_vote(tied, a, Role::Citizen, VoteValue::For, t0()).unwrap();
    db.cast_vote(tied, b, Role::Citizen, VoteValue::Against, t0()).unwrap();

    // Two of three "for": sent to review.
    let carried = seed_proposal(&db, author, Scope::Public, t0() + Duration::hours(1));
    db.cast_vote(carried, a, Role::Citizen, VoteValue::For, t0()).unwrap();
    db.cast_vote(carried, b, Role::Citizen, VoteValue::For, t0()).unwrap();
    db.cast_vote(carried, c, Role::Citizen, VoteValue::Abstain, t0()).unwrap();

    db.settle_expired(t0() + Duration::hours(2)).unwrap();

    assert_eq!(proposal_status(&db, tied).0, ProposalStatus::Rejected);
    assert_eq!(proposal_status(&db, carried).0, ProposalStatus::SentReview);
}

#[test]
fn settlement_counts_abstain_in_the_denominator() {
    let db = db();
    let author = seed_user(&db, "ada", Role::Citizen);
    let a = seed_user(&db, "bela", Role::Citizen);
    let b = seed_user(&db, "cleo", Role::Citizen);

    // One "for", one abstain: 50%, not a strict majority.
    let proposal = seed_proposal(&db, author, Scope::Public, t0() + Duration::hours(1));
    db.cast_vote(proposal, a, Role::Citizen, VoteValue::For, t0()).unwrap();
    db.cast_vote(proposal, b, Role::Citizen, VoteValue::Abstain, t0()).unwrap();

    db.settle_expired(t0() + Duration::hours(2)).unwrap();
    assert_eq!(proposal_status(&db, proposal).0, ProposalStatus::Rejected);
}

#[test]
fn settlement_is_idempotent() {
    let db = db();
    let author = seed_user(&db, "ada", Role::Citizen);
    let voter = seed_user(&db, "bela", Role::Citizen);
    let proposal = seed_proposal(&db, author, Scope::Public, t0() + Duration::hours(1));
    db.cast_vote(proposal, voter, Role::Citizen, VoteValue::For, t0()).unwrap();

    let first = db.settle_expired(t0() + Duration::hours(2)).unwrap();
    assert_eq!(first, 1);
    let (status, updated_at) = proposal_status(&db, proposal);
    assert_eq!(status, ProposalStatus::SentReview);

    // A later pass never touches a settled proposal.
    let second = db.settle_expired(t0() + Duration::hours(3)).unwrap();
    assert_eq!(second, 0);
    let (status_after, updated_after) = proposal_status(&db, proposal);
    assert_eq!(status_after, ProposalStatus::SentReview);
    assert_eq!(updated_after, updated_at);
    assert_eq!(vote_rows(&db, proposal), 1);
}

#[test]
fn settlement_leaves_future_deadlines_open() {
    let db = db();
    let author = seed_user(&db, "ada", Role::Citizen);
    let proposal = seed_proposal(&db, author, Scope::Public, t0() + Duration::hours(3));

    let settled = db.settle_expired(t0() + Duration::hours(2)).unwrap();
    assert_eq!(settled, 0);
    assert_eq!(proposal_status(&db, proposal).0, ProposalStatus::Open);
}

#[test]
fn settlement_after_deadline_passes_with_all_for_votes() {
    let db = db();
    let author = seed_user(&db, "ada", Role::Citizen);
    let proposal = seed_proposal(&db, author, Scope::Public, t0() + Duration::hours(1));

    for name in ["bela", "cleo", "dina"] {
        let voter = seed_user(&db, name, Role::Citizen);
        db.cast_vote(proposal, voter, Role::Citizen, VoteValue::For, t0()).unwrap();
    }

    let settle_at = t0() + Duration::hours(2);
    db.settle_expired(settle_at).unwrap();

    let (status, updated_at) = proposal_status(&db, proposal);
    assert_eq!(status, ProposalStatus::SentReview);
    assert_eq!(updated_at, settle_at);
    assert_eq!(vote_rows(&db, proposal), 3);
}

// ── Voting ──

#[test]
fn cast_vote_returns_fresh_tallies() {
    let db = db();
    let author = seed_user(&db, "ada", Role::Citizen);
    let a = seed_user(&db, "bela", Role::Citizen);
    let b = seed_user(&db, "cleo", Role::Citizen);
    let proposal = seed_proposal(&db, author, Scope::Public, t0() + Duration::hours(1));

    db.cast_vote(proposal, a, Role::Citizen, VoteValue::Against, t0()).unwrap();
    let tally = db.cast_vote(proposal, b, Role::Citizen, VoteValue::For, t0()).unwrap();

    assert_eq!(tally.for_votes, 1);
    assert_eq!(tally.against_votes, 1);
    assert_eq!(tally.abstain_votes, 0);
    assert_eq!(tally.total_votes, 2);
}

#[test]
fn second_vote_by_same_user_is_rejected() {
    let db = db();
    let author = seed_user(&db, "ada", Role::Citizen);
    let voter = seed_user(&db, "bela", Role::Citizen);
    let proposal = seed_proposal(&db, author, Scope::Public, t0() + Duration::hours(1));

    db.cast_vote(proposal, voter, Role::Citizen, VoteValue::For, t0()).unwrap();
    let err = db
        .cast_vote(proposal, voter, Role::Citizen, VoteValue::Against, t0())
        .unwrap_err();

    assert!(matches!(err, VoteError::AlreadyVoted));
    assert_eq!(vote_rows(&db, proposal), 1);
}

#[test]
fn unique_constraint_backstops_the_duplicate_check() {
    let db = db();
    let author = seed_user(&db, "ada", Role::Citizen);
    let voter = seed_user(&db, "bela", Role::Citizen);
    let proposal = seed_proposal(&db, author, Scope::Public, t0() + Duration::hours(1));

    // Bypass the application-level duplicate check entirely.
    let insert = |value: &str| {
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO votes (proposal_id, user_id, value, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![proposal, voter, value, t0()],
            )?;
            Ok(())
        })
    };

    insert("for").unwrap();
    assert!(insert("against").is_err());
    assert_eq!(vote_rows(&db, proposal), 1);
}

#[test]
fn vote_on_minister_proposal_requires_the_capability() {
    let db = db();
    let minister = seed_user(&db, "mira", Role::Minister);
    let citizen = seed_user(&db, "bela", Role::Citizen);
    let proposal = seed_proposal(&db, minister, Scope::Minister, t0() + Duration::hours(1));

    let err = db
        .cast_vote(proposal, citizen, Role::Citizen, VoteValue::For, t0())
        .unwrap_err();
    assert!(matches!(err, VoteError::MinisterOnly));

    db.cast_vote(proposal, minister, Role::Minister, VoteValue::For, t0()).unwrap();
}

#[test]
fn vote_after_deadline_settles_first_and_is_rejected() {
    let db = db();
    let author = seed_user(&db, "ada", Role::Citizen);
    let voter = seed_user(&db, "bela", Role::Citizen);
    let proposal = seed_proposal(&db, author, Scope::Public, t0() + Duration::hours(1));

    // The deadline has passed but no settlement has run yet. The vote call
    // settles synchronously first, so the ballot is never admitted.
    let err = db
        .cast_vote(proposal, voter, Role::Citizen, VoteValue::For, t0() + Duration::hours(2))
        .unwrap_err();

    assert!(matches!(err, VoteError::Closed));
    assert_eq!(proposal_status(&db, proposal).0, ProposalStatus::Rejected);
    assert_eq!(vote_rows(&db, proposal), 0);
}

#[test]
fn vote_on_unknown_proposal_is_not_found() {
    let db = db();
    let voter = seed_user(&db, "bela", Role::Citizen);

    let err = db
        .cast_vote(9999, voter, Role::Citizen, VoteValue::For, t0())
        .unwrap_err();
    assert!(matches!(err, VoteError::NotFound));
}

// ── Proposal reads --

#[test]
fn list_proposals_carries_tallies_and_my_vote() {
    let db = db();
    let author = seed_user(&db, "ada", Role::Citizen);
    let viewer = seed_user(&db, "bela", Role::Citizen);
    let other = seed_user(&db, "cleo", Role::Citizen);
    let proposal = seed_proposal(&db, author, Scope::Public, t0() + Duration::hours(1));

    db.cast_vote(proposal, viewer, Role::Citizen, VoteValue::Abstain, t0()).unwrap();
    db.cast_vote(proposal, other, Role::Citizen, VoteValue::For, t0()).unwrap();

    let rows = db.list_proposals(Scope::Public, viewer).unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.id, proposal);
    assert_eq!(row.author_name, "ada");
    assert_eq!(row.for_votes, 1);
    assert_eq!(row.abstain_votes, 1);
    assert_eq!(row.total_votes, 2);
    assert_eq!(row.my_vote.as_deref(), Some("abstain"));

    // Another viewer has no ballot on record.
    let rows = db.list_proposals(Scope::Public, author).unwrap();
    assert_eq!(rows[0].my_vote, None);
}

#[test]
fn list_proposals_filters_by_scope() {
    let db = db();
    let minister = seed_user(&db, "mira", Role::Minister);
    seed_proposal(&db, minister, Scope::Public, t0() + Duration::hours(1));
    seed_proposal(&db, minister, Scope::Minister, t0() + Duration::hours(1));

    assert_eq!(db.list_proposals(Scope::Public, minister).unwrap().len(), 1);
    assert_eq!(db.list_proposals(Scope::Minister, minister).unwrap().len(), 1);
}

#[test]
fn voter_breakdown_lists_ballots_in_order() {
    let db = db();
    let author = seed_user(&db, "ada", Role::Citizen);
    let a = seed_user(&db, "bela", Role::Citizen);
    let b = seed_user(&db, "cleo", Role::Citizen);
    let proposal = seed_proposal(&db, author, Scope::Public, t0() + Duration::hours(1));

    db.cast_vote(proposal, a, Role::Citizen, VoteValue::For, t0()).unwrap();
    db.cast_vote(proposal, b, Role::Citizen, VoteValue::Against, t0() + Duration::minutes(1))
        .unwrap();

    let voters = db.list_voters(proposal).unwrap();
    assert_eq!(voters.len(), 2);
    assert_eq!(voters[0].username, "bela");
    assert_eq!(voters[0].value, "for");
    assert_eq!(voters[1].username, "cleo");
    assert_eq!(voters[1].value, "against");
}

#[test]
fn rate_limit_window_slides() {
    let db = db();
    let author = seed_user(&db, "ada", Role::Citizen);
    seed_proposal(&db, author, Scope::Public, t0() + Duration::hours(5));
    db.insert_proposal(
        author,
        Scope::Public,
        ProposalKind::Petition,
        "Second petition today",
        "Another issue worth a public vote.",
        t0() + Duration::hours(6),
        t0() + Duration::hours(1),
    )
    .unwrap();

    // Both fall inside a window opening before t0.
    let count = db
        .count_recent_public_proposals(author, t0() - Duration::hours(23))
        .unwrap();
    assert_eq!(count, 2);

    // A window opening after the first creation only sees the second.
    let count = db
        .count_recent_public_proposals(author, t0() + Duration::minutes(30))
        .unwrap();
    assert_eq!(count, 1);

    // Minister-scope proposals never count against the public limit.
    let minister = seed_user(&db, "mira", Role::Minister);
    seed_proposal(&db, minister, Scope::Minister, t0() + Duration::hours(5));
    let count = db
        .count_recent_public_proposals(minister, t0() - Duration::hours(23))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn delete_proposal_reports_whether_anything_was_removed() {
    let db = db();
    let author = seed_user(&db, "ada", Role::Citizen);
    let proposal = seed_proposal(&db, author, Scope::Public, t0() + Duration::hours(1));

    assert!(db.delete_proposal(proposal).unwrap());
    assert!(!db.delete_proposal(proposal).unwrap());
}

// ── Users & sessions ──

#[test]
fn upsert_refreshes_profile_but_preserves_role() {
    let db = db();
    let id = seed_user(&db, "ada", Role::Minister);

    let profile = OAuthProfile {
        discord_id: "discord-ada".to_string(),
        username: "ada_renamed".to_string(),
        avatar_url: Some("https://cdn.example/ada.png".to_string()),
    };
    let (user, created) = db
        .upsert_oauth_user(&profile, false, t0() + Duration::days(1))
        .unwrap();

    assert!(!created);
    assert_eq!(user.id, id);
    assert_eq!(user.username, "ada_renamed");
    assert_eq!(user.avatar_url.as_deref(), Some("https://cdn.example/ada.png"));
    assert_eq!(user.role, "minister");
}

#[test]
fn seed_admin_is_forced_on_every_login() {
    let db = db();
    let profile = OAuthProfile {
        discord_id: "discord-root".to_string(),
        username: "root".to_string(),
        avatar_url: None,
    };

    let (user, _) = db.upsert_oauth_user(&profile, true, t0()).unwrap();
    assert_eq!(user.role, "admin");

    // A later demotion does not survive the next login.
    db.set_user_role(user.id, Role::Citizen, t0()).unwrap();
    let (user, _) = db
        .upsert_oauth_user(&profile, true, t0() + Duration::days(1))
        .unwrap();
    assert_eq!(user.role, "admin");
}

#[test]
fn session_round_trip_and_lazy_expiry() {
    let db = db();
    let id = seed_user(&db, "ada", Role::Citizen);
    db.create_session("token-1", id, t0() + Duration::days(30), t0()).unwrap();

    let user = db.session_user("token-1", t0()).unwrap();
    assert_eq!(user.map(|u| u.id), Some(id));

    // Presenting the token after expiry purges the session row.
    assert!(db.session_user("token-1", t0() + Duration::days(31)).unwrap().is_none());
    assert!(db.session_user("token-1", t0()).unwrap().is_none());
}

#[test]
fn logout_deletes_the_session() {
    let db = db();
    let id = seed_user(&db, "ada", Role::Citizen);
    db.create_session("token-1", id, t0() + Duration::days(30), t0()).unwrap();

    db.delete_session("token-1").unwrap();
    assert!(db.session_user("token-1", t0()).unwrap().is_none());
}

#[test]
fn list_users_orders_admins_first() {
    let db = db();
    seed_user(&db, "zoe", Role::Citizen);
    seed_user(&db, "mira", Role::Minister);
    seed_user(&db, "axel", Role::Admin);

    let users = db.list_users().unwrap();
    let names: Vec<&str> = users.iter().map(|u| u.username.as_str()).collect();
    assert_eq!(names, vec!["axel", "mira", "zoe"]);
}

// ── Registry ──

#[test]
fn registry_entries_append_and_delete() {
    let db = db();
    let minister = seed_user(&db, "mira", Role::Minister);

    let entry = db
        .insert_registry_entry(
            minister,
            "Bridge repainting act",
            "The council resolved to repaint the old bridge.",
            Decision::Accepted,
            Some("carried by public vote"),
            t0(),
        )
        .unwrap();

    let entries = db.list_registry_entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, entry);
    assert_eq!(entries[0].decision, "accepted");
    assert_eq!(entries[0].author_name, "mira");
    assert_eq!(entries[0].reason.as_deref(), Some("carried by public vote"));

    assert!(db.delete_registry_entry(entry).unwrap());
    assert!(!db.delete_registry_entry(entry).unwrap());
    assert!(db.list_registry_entries().unwrap().is_empty());
}

// ── Notifications ──

#[test]
fn fan_out_targets_roles_and_read_flags_flip() {
    let db = db();
    let admin = seed_user(&db, "axel", Role::Admin);
    let minister = seed_user(&db, "mira", Role::Minister);
    let citizen = seed_user(&db, "ada", Role::Citizen);

    let targets = db.user_ids_by_roles(&[Role::Admin, Role::Minister]).unwrap();
    assert_eq!(targets.len(), 2);
    assert!(targets.contains(&admin) && targets.contains(&minister));
    assert!(!targets.contains(&citizen));

    let payload = NotificationPayload {
        kind: "proposal_created".to_string(),
        title: "New proposal".to_string(),
        message: "ada submitted a petition: Repaint the old bridge".to_string(),
        href: Some("/petition-detail?id=1".to_string()),
    };
    assert_eq!(db.notify_users(&targets, &payload, t0()).unwrap(), 2);

    let (inbox, unread) = db.list_notifications(minister, 30).unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(unread, 1);
    assert_eq!(inbox[0].kind, "proposal_created");
    assert!(!inbox[0].is_read);

    let unread = db
        .mark_notifications_read(minister, ReadTarget::One(inbox[0].id))
        .unwrap();
    assert_eq!(unread, 0);

    // The admin inbox is untouched, and marking all clears it.
    assert_eq!(db.unread_count(admin).unwrap(), 1);
    assert_eq!(db.mark_notifications_read(admin, ReadTarget::All).unwrap(), 0);
}

#[test]
fn marking_someone_elses_notification_does_nothing() {
    let db = db();
    let admin = seed_user(&db, "axel", Role::Admin);
    let citizen = seed_user(&db, "ada", Role::Citizen);

    let payload = NotificationPayload {
        kind: "user_registered".to_string(),
        title: "New registration".to_string(),
        message: "ada signed up through Discord.".to_string(),
        href: None,
    };
    db.notify_users(&[admin], &payload, t0()).unwrap();
    let (inbox, _) = db.list_notifications(admin, 30).unwrap();

    db.mark_notifications_read(citizen, ReadTarget::One(inbox[0].id)).unwrap();
    assert_eq!(db.unread_count(admin).unwrap(), 1);
}
