//! Persistence seam for the matching engine.
//!
//! Multi-row operations that must be atomic (offer batches, accepting an offer,
//! claiming queue items) are single trait methods so that a transactional
//! backend can run each of them as one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::assignment::{DriverAssignmentHistory, MatchingAssignment};
use crate::models::config::MatchingAlgorithmConfig;
use crate::models::driver::Driver;
use crate::models::metrics::DriverPerformanceMetrics;
use crate::models::queue::ReassignmentQueueItem;
use crate::models::request::{FulfillmentStatus, ServiceRequest};

pub mod memory;

pub use memory::InMemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Coarse, index-friendly driver filter. The locator applies the full set of
/// eligibility rules on top of it.
#[derive(Debug, Clone)]
pub struct DriverQuery {
    pub service_type: String,
    pub min_rating: f64,
}

/// An accepted offer together with the siblings it cancelled.
#[derive(Debug, Clone)]
pub struct AcceptOutcome {
    pub assignment: MatchingAssignment,
    pub cancelled: Vec<MatchingAssignment>,
}

/// A rejected or expired offer and the number of sibling offers for the same
/// request still pending after the transition.
#[derive(Debug, Clone)]
pub struct ResolveOutcome {
    pub assignment: MatchingAssignment,
    pub pending_siblings: usize,
}

#[async_trait]
pub trait MatchingStore: Send + Sync {
    async fn upsert_driver(&self, driver: Driver) -> Result<(), StoreError>;

    async fn get_driver(&self, id: Uuid) -> Result<Driver, StoreError>;

    async fn list_drivers(&self) -> Result<Vec<Driver>, StoreError>;

    /// Drivers that are flagged available, support the service type and meet
    /// the rating floor, ordered by id.
    async fn query_drivers(&self, query: &DriverQuery) -> Result<Vec<Driver>, StoreError>;

    async fn insert_request(&self, request: ServiceRequest) -> Result<(), StoreError>;

    async fn get_request(&self, id: Uuid) -> Result<ServiceRequest, StoreError>;

    /// Fails with [`StoreError::Conflict`] once the request is cancelled or
    /// completed, unless `status` is the one it already has.
    async fn set_request_status(
        &self,
        id: Uuid,
        status: FulfillmentStatus,
    ) -> Result<ServiceRequest, StoreError>;

    async fn active_config(&self) -> Result<Option<MatchingAlgorithmConfig>, StoreError>;

    /// Stores `config` and makes it the only active one.
    async fn activate_config(&self, config: MatchingAlgorithmConfig) -> Result<(), StoreError>;

    /// Persists every offer with its history row, or none of them, and marks
    /// the request offered. Fails with [`StoreError::Conflict`] when the
    /// request is no longer awaiting a driver.
    async fn insert_offers(
        &self,
        offers: Vec<(MatchingAssignment, DriverAssignmentHistory)>,
    ) -> Result<(), StoreError>;

    async fn get_assignment(&self, id: Uuid) -> Result<MatchingAssignment, StoreError>;

    async fn assignments_for_request(
        &self,
        request_id: Uuid,
    ) -> Result<Vec<MatchingAssignment>, StoreError>;

    /// Moves a pending offer to accepted, cancels its pending siblings, binds
    /// the driver to the request and marks the driver busy. Fails with
    /// [`StoreError::Conflict`] if the offer is no longer pending or the
    /// request is no longer awaiting a driver.
    async fn accept_offer(&self, id: Uuid, at: DateTime<Utc>)
    -> Result<AcceptOutcome, StoreError>;

    async fn reject_offer(
        &self,
        id: Uuid,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<ResolveOutcome, StoreError>;

    async fn expire_offer(&self, id: Uuid, at: DateTime<Utc>)
    -> Result<ResolveOutcome, StoreError>;

    /// Ids of pending offers whose response timeout is at or before `now`.
    async fn overdue_offers(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError>;

    /// Marks the request cancelled and cancels its pending offers in one
    /// step. Fails with [`StoreError::Conflict`] when a driver is already
    /// bound to the request or it is completed. Cancelling twice returns no
    /// offers.
    async fn cancel_request(
        &self,
        request_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Vec<MatchingAssignment>, StoreError>;

    async fn assignments_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<MatchingAssignment>, StoreError>;

    async fn history_for_driver(
        &self,
        driver_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DriverAssignmentHistory>, StoreError>;

    /// Drivers with at least one history row offered within the window.
    async fn drivers_with_history(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, StoreError>;

    /// Stamps completion on the accepted history row of the request.
    async fn mark_completed(
        &self,
        request_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<DriverAssignmentHistory, StoreError>;

    async fn latest_reassignment(
        &self,
        request_id: Uuid,
    ) -> Result<Option<ReassignmentQueueItem>, StoreError>;

    /// Queues `item` unless the request already has an active item, in which
    /// case `false` is returned and nothing changes.
    async fn enqueue_reassignment(&self, item: ReassignmentQueueItem) -> Result<bool, StoreError>;

    /// Atomically moves up to `limit` due items to processing, highest
    /// priority first and oldest first within a priority.
    async fn claim_reassignments(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReassignmentQueueItem>, StoreError>;

    async fn update_reassignment(&self, item: ReassignmentQueueItem) -> Result<(), StoreError>;

    /// Cancels the active queue item for the request, if any.
    async fn cancel_reassignment(
        &self,
        request_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<ReassignmentQueueItem>, StoreError>;

    async fn pending_reassignments(&self) -> Result<usize, StoreError>;

    /// Inserts or replaces the row for `(driver_id, period_start)` and
    /// refreshes the driver's current metrics projection.
    async fn upsert_performance(
        &self,
        metrics: DriverPerformanceMetrics,
    ) -> Result<(), StoreError>;

    async fn performance_for(
        &self,
        driver_id: Uuid,
        period_start: DateTime<Utc>,
    ) -> Result<Option<DriverPerformanceMetrics>, StoreError>;
}
