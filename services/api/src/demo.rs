use crate::infra::{InMemoryNotificationLog, InMemoryPolicyStore, InMemoryTripRepository};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use clap::Args;
use std::sync::Arc;
use travel_desk::error::AppError;
use travel_desk::workflows::trips::risk;
use travel_desk::workflows::trips::{
    AccommodationRules, Actor, ActorRole, BookingRules, Clock, LifecycleConfig, PendingAction,
    PendingDecision, Policy, PolicyId, RequestOutcome, RiskApproval, TravelDetails, Trip,
    TripDraft, TripFilter, TripLifecycleService, TripServiceError,
};

type DemoService =
    TripLifecycleService<InMemoryTripRepository, InMemoryPolicyStore, InMemoryNotificationLog>;

#[derive(Args, Debug)]
pub(crate) struct AssessArgs {
    /// Free-text destination, e.g. "Karachi, Pakistan"
    #[arg(long)]
    pub(crate) destination: String,
    /// Planned start date (YYYY-MM-DD); enables the seasonal checks
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) start: Option<NaiveDate>,
    /// Print the assessment as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Evaluation date for the demo (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

/// Clock pinned to the demo's evaluation date.
struct DemoClock(DateTime<Utc>);

impl Clock for DemoClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub(crate) fn run_assess(args: AssessArgs) -> Result<(), AppError> {
    let assessment = risk::analyze(&args.destination, args.start);

    if args.json {
        match serde_json::to_string_pretty(&assessment) {
            Ok(json) => println!("{json}"),
            Err(err) => println!("Assessment unavailable as JSON: {err}"),
        }
        return Ok(());
    }

    println!("Destination: {}", args.destination.trim());
    if let Some(start) = args.start {
        println!("Start date: {start}");
    }
    println!(
        "Risk level: {}{}",
        assessment.level,
        if assessment.safe { "" } else { " (confirmation required)" }
    );
    for reason in &assessment.reasons {
        println!("  - {reason}");
    }
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let today = args.today.unwrap_or_else(|| Utc::now().date_naive());
    let now = today.and_time(NaiveTime::MIN).and_utc() + Duration::hours(9);

    let notifications = InMemoryNotificationLog::default();
    let policies = InMemoryPolicyStore::seeded().map_err(TripServiceError::from)?;
    let engineering = policies
        .publish(engineering_policy())
        .map_err(TripServiceError::from)?;

    let service: DemoService = TripLifecycleService::new(
        Arc::new(InMemoryTripRepository::default()),
        Arc::new(policies),
        Arc::new(notifications.clone()),
        LifecycleConfig::default(),
    )
    .with_clock(Arc::new(DemoClock(now)));

    let manager = Actor::new("Morgan Lee", ActorRole::Manager);
    let requester = Actor::new("Dana Whitfield", ActorRole::Employee);

    println!("Travel desk demo");
    println!(
        "Evaluation date: {today} | policy: {} v{}",
        engineering.id, engineering.version
    );

    println!("\n1. Compliant request under the auto-approval threshold");
    let lisbon = request(
        &service,
        demo_draft("Lisbon, Portugal", today + Duration::days(30), 3, 780.0),
        &engineering.id,
    )?;

    println!("\n2. High-risk destination held for confirmation");
    let damascus = match service.request_trip(
        demo_draft("Damascus, Syria", today + Duration::days(45), 5, 1_400.0),
        Some(&engineering.id),
    )? {
        RequestOutcome::PendingDecision { decision } => {
            print_hold(&decision);
            service.resolve_pending(
                &decision.id,
                PendingAction::RequestApproval,
                Some("Humanitarian partner audit"),
            )?
        }
        RequestOutcome::Committed { trip } => Some(trip),
    };

    println!("\n3. Late booking with a non-preferred airline, then cancelled");
    let mut late = demo_draft("Berlin, Germany", today + Duration::days(4), 2, 520.0);
    late.travel.airline = Some("Budget Air".to_string());
    if let RequestOutcome::PendingDecision { decision } =
        service.request_trip(late, Some(&engineering.id))?
    {
        print_hold(&decision);
        service.resolve_pending(&decision.id, PendingAction::Cancel, None)?;
        println!("  Draft discarded; nothing stored");
    }

    if let Some(trip) = damascus {
        println!("\n4. Approval flow for {}", trip.id());
        match service.approve(trip.id(), &requester, None) {
            Ok(_) => println!("  Unexpected: employee approval accepted"),
            Err(err) => println!("  Employee approval refused: {err}"),
        }
        service.approve(trip.id(), &manager, Some("Security briefing booked"))?;
        service.activate(trip.id())?;
        let completed = service.complete(trip.id())?;
        print_trip(&completed);
        match service.activate(trip.id()) {
            Ok(_) => println!("  Unexpected: completed trip re-activated"),
            Err(err) => println!("  Re-activation refused: {err}"),
        }
    }

    if let Some(trip) = lisbon {
        println!("\n5. Withdrawing an approved trip");
        let withdrawn = service.reject(trip.id(), &manager, "")?;
        print_trip(&withdrawn);
    }

    println!("\nTrips on file (newest first)");
    for trip in service.list_trips(&TripFilter::default())? {
        println!(
            "  {} | {} | {} | {} | risk {}",
            trip.id(),
            trip.requester,
            trip.destination,
            trip.status(),
            trip.risk_level()
        );
    }

    let sent = notifications.recent(usize::MAX);
    if sent.is_empty() {
        println!("\nNotifications: none dispatched");
    } else {
        println!("\nNotifications (newest first)");
        for event in sent {
            println!("  {} -> {}: {}", event.timestamp.format("%H:%M"), event.to, event.subject);
        }
    }

    Ok(())
}

fn request(
    service: &DemoService,
    draft: TripDraft,
    policy: &PolicyId,
) -> Result<Option<Trip>, AppError> {
    match service.request_trip(draft, Some(policy))? {
        RequestOutcome::Committed { trip } => {
            print_trip(&trip);
            Ok(Some(trip))
        }
        RequestOutcome::PendingDecision { decision } => {
            print_hold(&decision);
            Ok(None)
        }
    }
}

fn print_hold(decision: &PendingDecision) {
    println!(
        "  Held for confirmation ({}) - risk {}",
        decision.id, decision.risk.level
    );
    for reason in decision.hold_reasons() {
        println!("    - {reason}");
    }
}

fn print_trip(trip: &Trip) {
    println!(
        "  {} to {} ({}) is {}",
        trip.requester,
        trip.destination,
        trip.date_span(),
        trip.status()
    );
    for entry in trip.timeline() {
        println!("    {} by {}", entry.status.label(), entry.actor);
    }
    for comment in trip.comments() {
        println!("    comment from {}: {}", comment.author, comment.text);
    }
}

fn demo_draft(destination: &str, start: NaiveDate, nights: i64, cost: f64) -> TripDraft {
    TripDraft {
        requester: "Dana Whitfield".to_string(),
        requester_email: Some("dana.whitfield@example.com".to_string()),
        department: "Engineering".to_string(),
        destination: destination.to_string(),
        start: Some(start),
        end: Some(start + Duration::days(nights)),
        purpose: "Customer site visit".to_string(),
        cost_estimate: Some(cost),
        travel: TravelDetails {
            airline: Some("TAP Air Portugal".to_string()),
            insured: Some(true),
            ..TravelDetails::default()
        },
    }
}

fn engineering_policy() -> Policy {
    Policy {
        id: PolicyId("engineering".to_string()),
        name: "Engineering Travel".to_string(),
        department: Some("Engineering".to_string()),
        booking: BookingRules {
            preferred_airlines: vec![
                "TAP Air Portugal".to_string(),
                "Lufthansa".to_string(),
            ],
            ..BookingRules::default()
        },
        accommodation: AccommodationRules {
            nightly_limit: Some(300.0),
            ..AccommodationRules::default()
        },
        risk_approval: RiskApproval::Auto { threshold: 1_000.0 },
        notification_emails: vec!["eng-travel-approvers@example.com".to_string()],
        ..Policy::standard()
    }
}
