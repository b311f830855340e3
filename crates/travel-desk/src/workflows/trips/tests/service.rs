use std::sync::Arc;

use chrono::Duration;

use super::common::*;
use crate::workflows::trips::{
    ActorRole, FileMeta, LifecycleAction, NotFoundError, PendingAction, PendingDecision, Policy,
    PolicyId, RepositoryError, RequestOutcome, RiskLevel, TimelineStatus, TripFilter, TripId,
    TripLifecycleService, TripServiceError, TripStatus, ValidationError, AUTO_APPROVE_ACTOR,
    SYSTEM_ACTOR,
};

fn eng_policy() -> PolicyId {
    PolicyId("eng-standard".to_string())
}

fn held(outcome: RequestOutcome) -> PendingDecision {
    match outcome {
        RequestOutcome::PendingDecision { decision } => decision,
        other => panic!("expected a pending decision, got {other:?}"),
    }
}

fn pdf(name: &str) -> FileMeta {
    FileMeta {
        filename: name.to_string(),
        size_bytes: 12_000,
        content_type: "application/pdf".to_string(),
    }
}

#[test]
fn high_risk_destination_is_held_without_side_effects() {
    let h = harness();

    let outcome = h
        .service
        .request_trip(draft("Damascus, Syria", days_from_today(30)), None)
        .expect("evaluation succeeds");

    let decision = held(outcome);
    assert_eq!(decision.risk.level, RiskLevel::High);
    assert!(decision.id.0.starts_with("decision-"));
    assert_eq!(h.service.held_decisions(), 1);
    assert_eq!(decision.expires_at, Some(now() + Duration::minutes(60)));
    assert_eq!(h.repository.len(), 0);
    assert!(h.notifications.events().is_empty());
}

#[test]
fn compliant_low_risk_trip_under_threshold_is_auto_approved() {
    let h = harness();

    let outcome = h
        .service
        .request_trip(paris_draft(), Some(&eng_policy()))
        .expect("request succeeds");

    let RequestOutcome::Committed { trip } = outcome else {
        panic!("expected a committed trip");
    };
    assert_eq!(trip.status(), TripStatus::Approved);
    assert_eq!(trip.timeline()[0].status, TimelineStatus::Approved);
    assert_eq!(trip.timeline()[0].actor, AUTO_APPROVE_ACTOR);
    assert_eq!(trip.policy.as_ref().map(|policy| policy.version), Some(1));
    assert_eq!(h.repository.stored(&trip.id), Some(trip.clone()));

    let events = h.notifications.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].to, "dana.whitfield@example.com");
    assert_eq!(events[0].subject, "Your trip request to Paris, France is approved");
}

#[test]
fn cost_above_threshold_commits_as_pending() {
    let h = harness();
    let mut draft = paris_draft();
    draft.cost_estimate = Some(1500.0);

    let outcome = h
        .service
        .request_trip(draft, Some(&eng_policy()))
        .expect("request succeeds");

    let RequestOutcome::Committed { trip } = outcome else {
        panic!("expected a committed trip");
    };
    assert_eq!(trip.status(), TripStatus::Pending);
    assert!(h.notifications.events().is_empty());
}

#[test]
fn unknown_policy_is_not_found() {
    let h = harness();
    let missing = PolicyId("retired".to_string());

    let err = h
        .service
        .request_trip(paris_draft(), Some(&missing))
        .expect_err("policy lookup fails");

    assert!(matches!(
        err,
        TripServiceError::NotFound(NotFoundError::Policy(ref id)) if *id == missing
    ));
    assert_eq!(h.repository.len(), 0);
}

#[test]
fn invalid_drafts_are_rejected_before_evaluation() {
    let h = harness();

    let mut no_destination = paris_draft();
    no_destination.destination = "   ".to_string();
    let mut backwards = paris_draft();
    backwards.end = Some(days_from_today(20));
    let mut no_start = paris_draft();
    no_start.start = None;

    for (draft, expected) in [
        (no_destination, ValidationError::MissingDestination),
        (
            backwards,
            ValidationError::EndBeforeStart {
                start: days_from_today(30),
                end: days_from_today(20),
            },
        ),
        (no_start, ValidationError::MissingStartDate),
    ] {
        let err = h
            .service
            .request_trip(draft, Some(&eng_policy()))
            .expect_err("invalid draft");
        assert!(matches!(err, TripServiceError::Validation(ref found) if *found == expected));
    }
    assert_eq!(h.repository.len(), 0);
}

#[test]
fn policy_violation_holds_even_a_low_risk_trip() {
    let h = harness();

    let decision = held(
        h.service
            .request_trip(draft("Berlin", days_from_today(5)), Some(&eng_policy()))
            .expect("evaluation succeeds"),
    );

    assert_eq!(decision.risk.level, RiskLevel::Low);
    assert_eq!(decision.violations.len(), 1);
    assert_eq!(decision.violations[0].rule, "advance_booking");
    assert_eq!(
        decision.escalation_recipients,
        vec!["travel-managers@example.com".to_string()]
    );
    assert_eq!(decision.hold_reasons().len(), 1);
}

#[test]
fn policy_recipients_override_the_manager_list() {
    let h = harness();
    h.policies.insert(Policy {
        id: PolicyId("sales".to_string()),
        notification_emails: vec!["sales-approvals@example.com".to_string()],
        ..auto_policy()
    });

    let decision = held(
        h.service
            .request_trip(
                draft("Berlin", days_from_today(5)),
                Some(&PolicyId("sales".to_string())),
            )
            .expect("evaluation succeeds"),
    );

    assert_eq!(
        decision.escalation_recipients,
        vec!["sales-approvals@example.com".to_string()]
    );
}

#[test]
fn confirming_commits_a_pending_trip_with_the_note() {
    let h = harness();
    let decision = held(
        h.service
            .request_trip(draft("Damascus, Syria", days_from_today(30)), None)
            .expect("evaluation succeeds"),
    );

    let trip = h
        .service
        .resolve_pending(&decision.id, PendingAction::Confirm, Some("Embassy visit"))
        .expect("confirm succeeds")
        .expect("confirm commits");

    assert_eq!(trip.status(), TripStatus::Pending);
    assert_eq!(trip.risk.level, RiskLevel::High);
    assert_eq!(trip.comments()[0].text, "Embassy visit");
    assert!(h.repository.stored(&trip.id).is_some());
    assert!(h.notifications.events().is_empty());
}

#[test]
fn requesting_approval_escalates_to_every_recipient() {
    let h = harness();
    h.policies.insert(Policy {
        id: PolicyId("field-ops".to_string()),
        notification_emails: vec![
            "travel-managers@example.com".to_string(),
            "security@example.com".to_string(),
        ],
        ..auto_policy()
    });
    let decision = held(
        h.service
            .request_trip(
                draft("Damascus, Syria", days_from_today(30)),
                Some(&PolicyId("field-ops".to_string())),
            )
            .expect("evaluation succeeds"),
    );

    let trip = h
        .service
        .resolve_pending(&decision.id, PendingAction::RequestApproval, None)
        .expect("escalation succeeds")
        .expect("escalation commits");

    let events = h.notifications.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].to, "security@example.com");
    assert!(events
        .iter()
        .all(|event| event.trip_id == trip.id
            && event.subject == "Approval requested: Dana Whitfield trip to Damascus, Syria"));
    assert!(events[0]
        .body
        .contains("Risk (High): Destination matched high-risk country: syria"));
}

#[test]
fn cancelling_discards_the_draft() {
    let h = harness();
    let decision = held(
        h.service
            .request_trip(draft("Damascus, Syria", days_from_today(30)), None)
            .expect("evaluation succeeds"),
    );

    let resolved = h
        .service
        .resolve_pending(&decision.id, PendingAction::Cancel, None)
        .expect("cancel succeeds");

    assert!(resolved.is_none());
    assert_eq!(h.service.held_decisions(), 0);
    assert_eq!(h.repository.len(), 0);
    assert!(h.notifications.events().is_empty());
}

#[test]
fn expired_decisions_cannot_be_committed_but_can_be_cancelled() {
    let h = harness();
    let decision = held(
        h.service
            .request_trip(draft("Damascus, Syria", days_from_today(30)), None)
            .expect("evaluation succeeds"),
    );
    h.clock.advance(Duration::minutes(61));

    let err = h
        .service
        .resolve_pending(&decision.id, PendingAction::Confirm, None)
        .expect_err("decision expired");
    assert!(matches!(
        err,
        TripServiceError::DecisionExpired { ref decision_id, .. } if *decision_id == decision.id
    ));

    let cancelled = h
        .service
        .resolve_pending(&decision.id, PendingAction::Cancel, None)
        .expect("cancel still succeeds");
    assert!(cancelled.is_none());
    assert_eq!(h.repository.len(), 0);
}

#[test]
fn decisions_commit_once() {
    let h = harness();
    let decision = held(
        h.service
            .request_trip(draft("Damascus, Syria", days_from_today(30)), None)
            .expect("evaluation succeeds"),
    );

    h.service
        .resolve_pending(&decision.id, PendingAction::RequestApproval, None)
        .expect("first resolution commits");
    let err = h
        .service
        .resolve_pending(&decision.id, PendingAction::RequestApproval, None)
        .expect_err("decision already used");

    assert!(matches!(
        err,
        TripServiceError::NotFound(NotFoundError::Decision(ref id)) if *id == decision.id
    ));
    assert_eq!(h.repository.len(), 1);
    assert_eq!(h.notifications.events().len(), 1);
}

#[test]
fn resolution_uses_the_issued_decision_not_the_callers_copy() {
    let h = harness();
    let mut copy = held(
        h.service
            .request_trip(draft("Damascus, Syria", days_from_today(30)), None)
            .expect("evaluation succeeds"),
    );
    copy.risk.level = RiskLevel::Low;
    copy.violations.clear();
    copy.escalation_recipients = vec!["someone@elsewhere.example".to_string()];
    copy.expires_at = None;

    let trip = h
        .service
        .resolve_pending(&copy.id, PendingAction::RequestApproval, None)
        .expect("resolution succeeds")
        .expect("resolution commits");

    assert_eq!(trip.risk_level(), RiskLevel::High);
    let events = h.notifications.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].to, "travel-managers@example.com");
}

#[test]
fn edited_expiry_does_not_extend_a_decision() {
    let h = harness();
    let mut copy = held(
        h.service
            .request_trip(draft("Damascus, Syria", days_from_today(30)), None)
            .expect("evaluation succeeds"),
    );
    copy.expires_at = None;
    h.clock.advance(Duration::minutes(120));

    let err = h
        .service
        .resolve_pending(&copy.id, PendingAction::Confirm, None)
        .expect_err("decision expired");

    assert!(matches!(err, TripServiceError::DecisionExpired { .. }));
    assert_eq!(h.repository.len(), 0);
}

#[test]
fn long_expired_decisions_are_swept_on_the_next_hold() {
    let h = harness();
    let stale = held(
        h.service
            .request_trip(draft("Damascus, Syria", days_from_today(30)), None)
            .expect("evaluation succeeds"),
    );
    h.clock.advance(Duration::minutes(30));
    h.service
        .request_trip(draft("Kabul, Afghanistan", days_from_today(30)), None)
        .expect("evaluation succeeds");
    assert_eq!(h.service.held_decisions(), 2);

    h.clock.advance(Duration::minutes(100));
    h.service
        .request_trip(draft("Caracas, Venezuela", days_from_today(30)), None)
        .expect("evaluation succeeds");

    assert_eq!(h.service.held_decisions(), 2);
    let err = h
        .service
        .resolve_pending(&stale.id, PendingAction::Confirm, None)
        .expect_err("swept");
    assert!(matches!(err, TripServiceError::NotFound(NotFoundError::Decision(_))));
}

#[test]
fn failed_commits_keep_the_decision_open() {
    let policies = MemoryPolicies::default();
    let service = TripLifecycleService::new(
        Arc::new(UnavailableRepository),
        Arc::new(policies),
        Arc::new(MemoryNotifications::default()),
        config(),
    )
    .with_clock(Arc::new(FixedClock::new(now())));
    let decision = held(
        service
            .request_trip(draft("Damascus, Syria", days_from_today(30)), None)
            .expect("evaluation succeeds"),
    );

    let err = service
        .resolve_pending(&decision.id, PendingAction::Confirm, None)
        .expect_err("save fails");

    assert!(matches!(err, TripServiceError::Repository(_)));
    assert_eq!(service.held_decisions(), 1);
}

#[test]
fn employees_cannot_approve() {
    let h = harness();
    let trip = pending_trip(&h.service);

    let err = h
        .service
        .approve(&trip.id, &employee(), None)
        .expect_err("employees cannot decide");

    assert!(matches!(
        err,
        TripServiceError::PermissionDenied {
            role: ActorRole::Employee,
            action: LifecycleAction::Approve,
            ..
        }
    ));
    let stored = h.repository.stored(&trip.id).expect("trip stored");
    assert_eq!(stored.status(), TripStatus::Pending);
    assert_eq!(stored.timeline().len(), 1);
}

#[test]
fn permission_is_checked_before_the_trip_is_looked_up() {
    let h = harness();
    let err = h
        .service
        .reject(&TripId("trip-missing".to_string()), &employee(), "no")
        .expect_err("employees cannot decide");

    assert!(matches!(err, TripServiceError::PermissionDenied { .. }));
}

#[test]
fn approval_records_comment_and_notifies_requester() {
    let h = harness();
    let trip = pending_trip(&h.service);

    let approved = h
        .service
        .approve(&trip.id, &finance(), Some("Within Q2 budget"))
        .expect("finance may approve");

    assert_eq!(approved.status(), TripStatus::Approved);
    assert_eq!(approved.timeline()[0].actor, "Priya Natarajan");
    assert_eq!(approved.comments()[0].text, "Within Q2 budget");
    let events = h.notifications.events();
    assert_eq!(events.len(), 1);
    assert!(events[0].body.contains("Comments: Within Q2 budget"));
}

#[test]
fn rejecting_a_pending_trip_requires_a_reason() {
    let h = harness();
    let trip = pending_trip(&h.service);

    let err = h
        .service
        .reject(&trip.id, &manager(), "  ")
        .expect_err("reason required");

    assert!(matches!(
        err,
        TripServiceError::Validation(ValidationError::MissingRejectionReason)
    ));
    assert_eq!(
        h.repository.stored(&trip.id).map(|trip| trip.status()),
        Some(TripStatus::Pending)
    );
}

#[test]
fn withdrawing_an_approved_trip_defaults_the_reason() {
    let h = harness();
    let trip = pending_trip(&h.service);
    h.service
        .approve(&trip.id, &manager(), None)
        .expect("approve");

    let withdrawn = h
        .service
        .reject(&trip.id, &manager(), "")
        .expect("withdraw");

    assert_eq!(withdrawn.status(), TripStatus::Rejected);
    assert_eq!(withdrawn.comments()[0].text, "Withdrawn by approver");
    let events = h.notifications.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].subject, "Your trip request to Paris, France was rejected");
    assert!(events[1].body.contains("Reason: Withdrawn by approver"));
}

#[test]
fn rejected_trip_cannot_be_activated() {
    let h = harness();
    let trip = pending_trip(&h.service);
    h.service
        .reject(&trip.id, &manager(), "Conference cancelled")
        .expect("reject");

    let err = h
        .service
        .activate(&trip.id)
        .expect_err("terminal state");

    assert!(matches!(
        err,
        TripServiceError::InvalidTransition {
            status: TripStatus::Rejected,
            action: LifecycleAction::Activate,
            ..
        }
    ));
}

#[test]
fn activation_and_completion_are_attributed_to_the_system() {
    let h = harness();
    let trip = pending_trip(&h.service);
    h.service
        .approve(&trip.id, &manager(), None)
        .expect("approve");

    h.service.activate(&trip.id).expect("activate");
    let completed = h.service.complete(&trip.id).expect("complete");

    assert_eq!(completed.status(), TripStatus::Completed);
    assert_eq!(completed.timeline()[0].actor, SYSTEM_ACTOR);
    assert_eq!(completed.timeline()[1].actor, SYSTEM_ACTOR);
    assert!(completed.is_consistent());
}

#[test]
fn failed_transitions_leave_the_stored_trip_unchanged() {
    let h = harness();
    let trip = pending_trip(&h.service);
    h.service
        .approve(&trip.id, &manager(), None)
        .expect("approve");
    let before = h.repository.stored(&trip.id).expect("stored");

    assert!(h.service.approve(&trip.id, &manager(), Some("again")).is_err());
    assert!(h.service.complete(&trip.id).is_err());

    assert_eq!(h.repository.stored(&trip.id), Some(before));
}

#[test]
fn missing_trips_are_not_found() {
    let h = harness();
    let missing = TripId("trip-404".to_string());

    for err in [
        h.service.approve(&missing, &manager(), None).expect_err("missing"),
        h.service.activate(&missing).expect_err("missing"),
        h.service.get_trip(&missing).expect_err("missing"),
        h.service.delete(&missing).expect_err("missing"),
    ] {
        assert!(matches!(err, TripServiceError::NotFound(NotFoundError::Trip(_))));
    }
}

#[test]
fn attachments_require_a_filename_and_a_live_trip() {
    let h = harness();
    let trip = pending_trip(&h.service);

    let err = h
        .service
        .attach_file(&trip.id, pdf(" "))
        .expect_err("filename required");
    assert!(matches!(
        err,
        TripServiceError::Validation(ValidationError::MissingFilename)
    ));

    let updated = h
        .service
        .attach_file(&trip.id, pdf("itinerary.pdf"))
        .expect("attach");
    assert_eq!(updated.attachments().len(), 1);
    assert_eq!(updated.attachments()[0].attached_at, now());

    h.service
        .reject(&trip.id, &manager(), "Duplicate request")
        .expect("reject");
    let err = h
        .service
        .attach_file(&trip.id, pdf("receipt.pdf"))
        .expect_err("terminal");
    assert!(matches!(
        err,
        TripServiceError::InvalidTransition {
            action: LifecycleAction::AttachFile,
            ..
        }
    ));
}

#[test]
fn comments_are_trimmed_and_must_not_be_empty() {
    let h = harness();
    let trip = pending_trip(&h.service);

    let err = h
        .service
        .add_comment(&trip.id, &employee(), "\n")
        .expect_err("empty comment");
    assert!(matches!(
        err,
        TripServiceError::Validation(ValidationError::EmptyComment)
    ));

    let updated = h
        .service
        .add_comment(&trip.id, &employee(), "  Hotel booked  ")
        .expect("comment");
    assert_eq!(updated.comments()[0].text, "Hotel booked");
    assert_eq!(updated.comments()[0].author, "Sam Ortiz");
}

#[test]
fn delete_removes_the_trip_in_any_state() {
    let h = harness();
    let trip = pending_trip(&h.service);
    h.service
        .reject(&trip.id, &manager(), "Duplicate")
        .expect("reject");

    h.service.delete(&trip.id).expect("delete");

    assert!(h.repository.stored(&trip.id).is_none());
    assert!(matches!(
        h.service.delete(&trip.id),
        Err(TripServiceError::NotFound(_))
    ));
}

#[test]
fn listing_filters_and_orders_newest_first() {
    let h = harness();
    let first = pending_trip(&h.service);
    h.clock.advance(Duration::minutes(5));
    let mut sales = draft("Lyon, France", days_from_today(40));
    sales.department = "Sales".to_string();
    sales.requester = "Alex Kim".to_string();
    let RequestOutcome::Committed { trip: second } =
        h.service.request_trip(sales, None).expect("request")
    else {
        panic!("expected a committed trip");
    };
    h.clock.advance(Duration::minutes(5));
    let third = pending_trip(&h.service);
    h.service
        .approve(&third.id, &manager(), None)
        .expect("approve");

    let all = h.service.list_trips(&TripFilter::default()).expect("list");
    let ids: Vec<_> = all.iter().map(|trip| trip.id.clone()).collect();
    assert_eq!(ids, vec![third.id.clone(), second.id.clone(), first.id.clone()]);

    let france = h
        .service
        .list_trips(&TripFilter {
            destination: Some("FRANCE".to_string()),
            department: Some("sal".to_string()),
            ..TripFilter::default()
        })
        .expect("list");
    assert_eq!(france.len(), 1);
    assert_eq!(france[0].id, second.id);

    let approved = h
        .service
        .list_trips(&TripFilter {
            status: Some(TripStatus::Approved),
            requester: Some("dana".to_string()),
            ..TripFilter::default()
        })
        .expect("list");
    assert_eq!(approved.len(), 1);
    assert_eq!(approved[0].id, third.id);
}

#[test]
fn audit_trail_merges_status_changes_and_comments() {
    let h = harness();
    let trip = pending_trip(&h.service);
    h.clock.advance(Duration::minutes(1));
    h.service
        .add_comment(&trip.id, &employee(), "Please expedite")
        .expect("comment");
    h.clock.advance(Duration::minutes(1));
    h.service
        .approve(&trip.id, &manager(), None)
        .expect("approve");

    let trail = h.service.audit_trail(&trip.id).expect("audit");

    let actors: Vec<&str> = trail.iter().map(|entry| entry.actor.as_str()).collect();
    assert_eq!(actors, vec!["Morgan Lee", "Sam Ortiz", "Dana Whitfield"]);
}

#[test]
fn notification_failures_do_not_undo_transitions() {
    let repository = MemoryRepository::default();
    let service = TripLifecycleService::new(
        Arc::new(repository.clone()),
        Arc::new(MemoryPolicies::default()),
        Arc::new(FailingNotifications),
        config(),
    )
    .with_clock(Arc::new(FixedClock::new(now())));
    let RequestOutcome::Committed { trip } =
        service.request_trip(paris_draft(), None).expect("request")
    else {
        panic!("expected a committed trip");
    };

    let approved = service
        .approve(&trip.id, &manager(), None)
        .expect("approval survives delivery failure");

    assert_eq!(approved.status(), TripStatus::Approved);
    assert_eq!(
        repository.stored(&trip.id).map(|trip| trip.status()),
        Some(TripStatus::Approved)
    );
}

#[test]
fn repository_outages_surface_as_repository_errors() {
    let service = TripLifecycleService::new(
        Arc::new(UnavailableRepository),
        Arc::new(MemoryPolicies::default()),
        Arc::new(MemoryNotifications::default()),
        config(),
    );

    let err = service
        .request_trip(paris_draft(), None)
        .expect_err("save fails");

    assert!(matches!(
        err,
        TripServiceError::Repository(RepositoryError::Unavailable(_))
    ));
}

#[test]
fn concurrent_approvals_apply_exactly_once() {
    let h = harness();
    let trip = pending_trip(&h.service);

    let successes = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&h.service);
                let id = trip.id.clone();
                scope.spawn(move || service.approve(&id, &manager(), None).is_ok())
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("thread"))
            .filter(|approved| *approved)
            .count()
    });

    assert_eq!(successes, 1);
    let stored = h.repository.stored(&trip.id).expect("stored");
    assert_eq!(stored.timeline().len(), 2);
}
