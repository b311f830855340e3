use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::trips::{
    trip_router, AccommodationRules, Actor, ActorRole, BookingRules, Clock, LifecycleConfig,
    NotificationError, NotificationEvent, NotificationSink, Policy, PolicyId, PolicyStore,
    RepositoryError, RequestOutcome, RiskApproval, Trip, TripDraft, TripFilter, TripId,
    TripLifecycleService, TripRepository,
};

pub(super) type TestService =
    TripLifecycleService<MemoryRepository, MemoryPolicies, MemoryNotifications>;

#[derive(Clone, Default)]
pub(super) struct MemoryRepository {
    trips: Arc<Mutex<HashMap<TripId, Trip>>>,
}

impl MemoryRepository {
    pub(super) fn stored(&self, id: &TripId) -> Option<Trip> {
        self.trips
            .lock()
            .expect("repository mutex poisoned")
            .get(id)
            .cloned()
    }

    pub(super) fn len(&self) -> usize {
        self.trips.lock().expect("repository mutex poisoned").len()
    }
}

impl TripRepository for MemoryRepository {
    fn load(&self, id: &TripId) -> Result<Option<Trip>, RepositoryError> {
        Ok(self.stored(id))
    }

    fn save(&self, trip: &Trip) -> Result<(), RepositoryError> {
        self.trips
            .lock()
            .expect("repository mutex poisoned")
            .insert(trip.id.clone(), trip.clone());
        Ok(())
    }

    fn delete(&self, id: &TripId) -> Result<(), RepositoryError> {
        self.trips
            .lock()
            .expect("repository mutex poisoned")
            .remove(id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn list(&self, filter: &TripFilter) -> Result<Vec<Trip>, RepositoryError> {
        Ok(self
            .trips
            .lock()
            .expect("repository mutex poisoned")
            .values()
            .filter(|trip| filter.matches(trip))
            .cloned()
            .collect())
    }
}

pub(super) struct UnavailableRepository;

impl TripRepository for UnavailableRepository {
    fn load(&self, _id: &TripId) -> Result<Option<Trip>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn save(&self, _trip: &Trip) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn delete(&self, _id: &TripId) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(&self, _filter: &TripFilter) -> Result<Vec<Trip>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

#[derive(Clone, Default)]
pub(super) struct MemoryPolicies {
    policies: Arc<Mutex<HashMap<PolicyId, Policy>>>,
}

impl MemoryPolicies {
    pub(super) fn insert(&self, policy: Policy) {
        self.policies
            .lock()
            .expect("policy mutex poisoned")
            .insert(policy.id.clone(), policy);
    }
}

impl PolicyStore for MemoryPolicies {
    fn get(&self, id: &PolicyId) -> Result<Option<Policy>, RepositoryError> {
        Ok(self
            .policies
            .lock()
            .expect("policy mutex poisoned")
            .get(id)
            .cloned())
    }
}

#[derive(Clone, Default)]
pub(super) struct MemoryNotifications {
    events: Arc<Mutex<Vec<NotificationEvent>>>,
}

impl MemoryNotifications {
    pub(super) fn events(&self) -> Vec<NotificationEvent> {
        self.events
            .lock()
            .expect("notification mutex poisoned")
            .clone()
    }
}

impl NotificationSink for MemoryNotifications {
    fn send(&self, event: NotificationEvent) -> Result<(), NotificationError> {
        self.events
            .lock()
            .expect("notification mutex poisoned")
            .push(event);
        Ok(())
    }
}

pub(super) struct FailingNotifications;

impl NotificationSink for FailingNotifications {
    fn send(&self, _event: NotificationEvent) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("smtp relay refused".to_string()))
    }
}

pub(super) struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub(super) fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub(super) fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock mutex poisoned");
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn today() -> NaiveDate {
    now().date_naive()
}

pub(super) fn days_from_today(days: i64) -> NaiveDate {
    today() + Duration::days(days)
}

pub(super) fn draft(destination: &str, start: NaiveDate) -> TripDraft {
    TripDraft {
        requester: "Dana Whitfield".to_string(),
        requester_email: Some("dana.whitfield@example.com".to_string()),
        department: "Engineering".to_string(),
        destination: destination.to_string(),
        start: Some(start),
        end: Some(start + Duration::days(3)),
        purpose: "Partner workshop".to_string(),
        cost_estimate: Some(500.0),
        ..TripDraft::default()
    }
}

pub(super) fn paris_draft() -> TripDraft {
    TripDraft {
        end: None,
        ..draft("Paris, France", days_from_today(30))
    }
}

/// Advance booking of 14 days, auto-approval up to 1000.
pub(super) fn auto_policy() -> Policy {
    Policy {
        id: PolicyId("eng-standard".to_string()),
        name: "Engineering Standard".to_string(),
        booking: BookingRules {
            advance_booking_days: 14,
            ..BookingRules::default()
        },
        accommodation: AccommodationRules::default(),
        insurance_required: false,
        risk_approval: RiskApproval::Auto { threshold: 1000.0 },
        ..Policy::standard()
    }
}

pub(super) fn config() -> LifecycleConfig {
    LifecycleConfig {
        manager_recipients: vec!["travel-managers@example.com".to_string()],
        pending_decision_ttl: Some(Duration::minutes(60)),
    }
}

pub(super) struct Harness {
    pub service: Arc<TestService>,
    pub repository: MemoryRepository,
    pub policies: MemoryPolicies,
    pub notifications: MemoryNotifications,
    pub clock: Arc<FixedClock>,
}

pub(super) fn harness() -> Harness {
    let repository = MemoryRepository::default();
    let policies = MemoryPolicies::default();
    policies.insert(auto_policy());
    let notifications = MemoryNotifications::default();
    let clock = Arc::new(FixedClock::new(now()));

    let service = TripLifecycleService::new(
        Arc::new(repository.clone()),
        Arc::new(policies.clone()),
        Arc::new(notifications.clone()),
        config(),
    )
    .with_clock(clock.clone());

    Harness {
        service: Arc::new(service),
        repository,
        policies,
        notifications,
        clock,
    }
}

/// Commit a clean, policy-free trip which stays pending.
pub(super) fn pending_trip(service: &TestService) -> Trip {
    match service
        .request_trip(paris_draft(), None)
        .expect("request succeeds")
    {
        RequestOutcome::Committed { trip } => trip,
        other => panic!("expected a committed trip, got {other:?}"),
    }
}

pub(super) fn manager() -> Actor {
    Actor::new("Morgan Lee", ActorRole::Manager)
}

pub(super) fn finance() -> Actor {
    Actor::new("Priya Natarajan", ActorRole::Finance)
}

pub(super) fn employee() -> Actor {
    Actor::new("Sam Ortiz", ActorRole::Employee)
}

pub(super) fn router_for(service: Arc<TestService>) -> axum::Router {
    trip_router(service)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json body")
}
