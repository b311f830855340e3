use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use travel_desk::workflows::trips::{
    NotificationError, NotificationEvent, NotificationSink, Policy, PolicyId, PolicyRef,
    PolicyStore, RepositoryError, Trip, TripFilter, TripId, TripRepository,
};

/// Notifications retained for the inbox view.
pub(crate) const NOTIFICATION_LOG_CAPACITY: usize = 100;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) notifications: InMemoryNotificationLog,
}

fn poisoned<T>(_: PoisonError<T>) -> RepositoryError {
    RepositoryError::Unavailable("in-memory store lock poisoned".to_string())
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryTripRepository {
    records: Arc<Mutex<HashMap<TripId, Trip>>>,
}

impl TripRepository for InMemoryTripRepository {
    fn load(&self, id: &TripId) -> Result<Option<Trip>, RepositoryError> {
        let guard = self.records.lock().map_err(poisoned)?;
        Ok(guard.get(id).cloned())
    }

    fn save(&self, trip: &Trip) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().map_err(poisoned)?;
        guard.insert(trip.id().clone(), trip.clone());
        Ok(())
    }

    fn delete(&self, id: &TripId) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().map_err(poisoned)?;
        guard.remove(id).map(|_| ()).ok_or(RepositoryError::NotFound)
    }

    fn list(&self, filter: &TripFilter) -> Result<Vec<Trip>, RepositoryError> {
        let guard = self.records.lock().map_err(poisoned)?;
        Ok(guard
            .values()
            .filter(|trip| filter.matches(trip))
            .cloned()
            .collect())
    }
}

/// Versioned policy store. Every publish appends an immutable version; lookups resolve
/// to the latest one.
#[derive(Default, Clone)]
pub(crate) struct InMemoryPolicyStore {
    versions: Arc<RwLock<HashMap<PolicyId, Vec<Policy>>>>,
}

impl InMemoryPolicyStore {
    /// Store seeded with the baseline policy.
    pub(crate) fn seeded() -> Result<Self, RepositoryError> {
        let store = Self::default();
        store.publish(Policy::standard())?;
        Ok(store)
    }

    pub(crate) fn publish(&self, mut policy: Policy) -> Result<PolicyRef, RepositoryError> {
        let mut guard = self.versions.write().map_err(poisoned)?;
        let history = guard.entry(policy.id.clone()).or_default();
        policy.version = history.last().map_or(1, |latest| latest.version + 1);
        let reference = policy.reference();
        history.push(policy);
        Ok(reference)
    }

    pub(crate) fn version(&self, reference: &PolicyRef) -> Result<Option<Policy>, RepositoryError> {
        let guard = self.versions.read().map_err(poisoned)?;
        Ok(guard.get(&reference.id).and_then(|history| {
            history
                .iter()
                .find(|policy| policy.version == reference.version)
                .cloned()
        }))
    }
}

impl PolicyStore for InMemoryPolicyStore {
    fn get(&self, id: &PolicyId) -> Result<Option<Policy>, RepositoryError> {
        let guard = self.versions.read().map_err(poisoned)?;
        Ok(guard.get(id).and_then(|history| history.last().cloned()))
    }
}

/// Bounded newest-first log standing in for a mail transport.
#[derive(Clone)]
pub(crate) struct InMemoryNotificationLog {
    events: Arc<Mutex<VecDeque<NotificationEvent>>>,
    capacity: usize,
}

impl Default for InMemoryNotificationLog {
    fn default() -> Self {
        Self::with_capacity(NOTIFICATION_LOG_CAPACITY)
    }
}

impl InMemoryNotificationLog {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub(crate) fn recent(&self, limit: usize) -> Vec<NotificationEvent> {
        let guard = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        guard.iter().take(limit).cloned().collect()
    }
}

impl NotificationSink for InMemoryNotificationLog {
    fn send(&self, event: NotificationEvent) -> Result<(), NotificationError> {
        let mut guard = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        guard.push_front(event);
        guard.truncate(self.capacity);
        Ok(())
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
