use super::domain::{Trip, TripFilter, TripId};
use super::policy::{Policy, PolicyId};

/// Storage abstraction for committed trips; the engine is agnostic to the backing store.
pub trait TripRepository: Send + Sync {
    fn load(&self, id: &TripId) -> Result<Option<Trip>, RepositoryError>;
    /// Insert or replace the trip stored under `trip.id`.
    fn save(&self, trip: &Trip) -> Result<(), RepositoryError>;
    fn delete(&self, id: &TripId) -> Result<(), RepositoryError>;
    fn list(&self, filter: &TripFilter) -> Result<Vec<Trip>, RepositoryError>;
}

/// Read-only policy lookup. Versioning is the store's concern; `get` returns the latest
/// published version.
pub trait PolicyStore: Send + Sync {
    fn get(&self, id: &PolicyId) -> Result<Option<Policy>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
