use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::assignment::{AssignmentStatus, DriverAssignmentHistory, MatchingAssignment};
use crate::models::config::MatchingAlgorithmConfig;
use crate::models::driver::{AvailabilityStatus, Driver};
use crate::models::metrics::DriverPerformanceMetrics;
use crate::models::queue::{QueueStatus, ReassignmentQueueItem};
use crate::models::request::{FulfillmentStatus, ServiceRequest};
use crate::store::{AcceptOutcome, DriverQuery, MatchingStore, ResolveOutcome, StoreError};

/// DashMap-backed store. The `offers_by_request` entry of a request is held
/// for the whole of any multi-row change to that request's offers, which
/// serializes accept, reject, expire and cancel per request while unrelated
/// requests proceed in parallel.
///
/// Lock order: `offers_by_request`, then `assignments`, `history`,
/// `requests`, `drivers`. Never hold an `assignments` guard while taking an
/// index entry.
#[derive(Default)]
pub struct InMemoryStore {
    drivers: DashMap<Uuid, Driver>,
    requests: DashMap<Uuid, ServiceRequest>,
    configs: DashMap<u32, MatchingAlgorithmConfig>,
    active_config: RwLock<Option<MatchingAlgorithmConfig>>,
    assignments: DashMap<Uuid, MatchingAssignment>,
    offers_by_request: DashMap<Uuid, Vec<Uuid>>,
    history: DashMap<Uuid, DriverAssignmentHistory>,
    reassignments: DashMap<Uuid, ReassignmentQueueItem>,
    performance: DashMap<(Uuid, DateTime<Utc>), DriverPerformanceMetrics>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn request_of(&self, assignment_id: Uuid) -> Result<Uuid, StoreError> {
        self.assignments
            .get(&assignment_id)
            .map(|assignment| assignment.request_id())
            .ok_or_else(|| StoreError::NotFound(format!("assignment {assignment_id}")))
    }

    /// Checked while the request's offer index entry is held.
    fn ensure_open(&self, request_id: Uuid) -> Result<(), StoreError> {
        let request = self
            .requests
            .get(&request_id)
            .ok_or_else(|| StoreError::NotFound(format!("request {request_id}")))?;
        if !request.is_open() {
            return Err(StoreError::Conflict(format!(
                "request {request_id} is already {}",
                request.status.as_str()
            )));
        }
        Ok(())
    }

    fn mirror_history(&self, assignment: &MatchingAssignment, at: DateTime<Utc>) {
        if let Some(mut history) = self.history.get_mut(&assignment.id) {
            history.record_outcome(assignment, at);
        }
    }

    fn resolve(
        &self,
        id: Uuid,
        status: AssignmentStatus,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<ResolveOutcome, StoreError> {
        let request_id = self.request_of(id)?;
        let index = self
            .offers_by_request
            .get_mut(&request_id)
            .ok_or_else(|| StoreError::Backend(format!("offer index missing for {request_id}")))?;

        let resolved = {
            let mut assignment = self
                .assignments
                .get_mut(&id)
                .ok_or_else(|| StoreError::NotFound(format!("assignment {id}")))?;
            if !assignment.transition(status, at, reason) {
                return Err(StoreError::Conflict(format!(
                    "assignment {id} is already {}",
                    assignment.status.as_str()
                )));
            }
            assignment.clone()
        };
        self.mirror_history(&resolved, at);

        let pending_siblings = index
            .iter()
            .filter(|sibling_id| **sibling_id != id)
            .filter(|sibling_id| {
                self.assignments
                    .get(sibling_id)
                    .is_some_and(|sibling| sibling.status == AssignmentStatus::Pending)
            })
            .count();

        drop(index);
        Ok(ResolveOutcome {
            assignment: resolved,
            pending_siblings,
        })
    }
}

#[async_trait]
impl MatchingStore for InMemoryStore {
    async fn upsert_driver(&self, driver: Driver) -> Result<(), StoreError> {
        self.drivers.insert(driver.id, driver);
        Ok(())
    }

    async fn get_driver(&self, id: Uuid) -> Result<Driver, StoreError> {
        self.drivers
            .get(&id)
            .map(|driver| driver.clone())
            .ok_or_else(|| StoreError::NotFound(format!("driver {id}")))
    }

    async fn list_drivers(&self) -> Result<Vec<Driver>, StoreError> {
        let mut drivers: Vec<Driver> = self
            .drivers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        drivers.sort_by_key(|driver| driver.id);
        Ok(drivers)
    }

    async fn query_drivers(&self, query: &DriverQuery) -> Result<Vec<Driver>, StoreError> {
        let mut drivers: Vec<Driver> = self
            .drivers
            .iter()
            .filter(|entry| {
                let driver = entry.value();
                driver.is_available
                    && driver.rating >= query.min_rating
                    && driver.supports_service(&query.service_type)
            })
            .map(|entry| entry.value().clone())
            .collect();
        drivers.sort_by_key(|driver| driver.id);
        Ok(drivers)
    }

    async fn insert_request(&self, request: ServiceRequest) -> Result<(), StoreError> {
        match self.requests.entry(request.id) {
            Entry::Occupied(_) => Err(StoreError::Conflict(format!(
                "request {} already exists",
                request.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(request);
                Ok(())
            }
        }
    }

    async fn get_request(&self, id: Uuid) -> Result<ServiceRequest, StoreError> {
        self.requests
            .get(&id)
            .map(|request| request.clone())
            .ok_or_else(|| StoreError::NotFound(format!("request {id}")))
    }

    async fn set_request_status(
        &self,
        id: Uuid,
        status: FulfillmentStatus,
    ) -> Result<ServiceRequest, StoreError> {
        let mut request = self
            .requests
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("request {id}")))?;
        let closed = matches!(
            request.status,
            FulfillmentStatus::Cancelled | FulfillmentStatus::Completed
        );
        if closed && request.status != status {
            return Err(StoreError::Conflict(format!(
                "request {id} is already {}",
                request.status.as_str()
            )));
        }
        request.status = status;
        request.updated_at = Utc::now();
        Ok(request.clone())
    }

    async fn active_config(&self) -> Result<Option<MatchingAlgorithmConfig>, StoreError> {
        Ok(self.active_config.read().await.clone())
    }

    async fn activate_config(&self, config: MatchingAlgorithmConfig) -> Result<(), StoreError> {
        let mut active = self.active_config.write().await;
        for mut entry in self.configs.iter_mut() {
            entry.is_active = false;
        }

        let mut config = config;
        config.is_active = true;
        self.configs.insert(config.version, config.clone());
        *active = Some(config);
        Ok(())
    }

    async fn insert_offers(
        &self,
        offers: Vec<(MatchingAssignment, DriverAssignmentHistory)>,
    ) -> Result<(), StoreError> {
        let Some((first, _)) = offers.first() else {
            return Ok(());
        };
        let request_id = first.request_id();

        if offers
            .iter()
            .any(|(assignment, _)| assignment.request_id() != request_id)
        {
            return Err(StoreError::Conflict(
                "offer batch spans more than one request".to_string(),
            ));
        }

        let mut index = self.offers_by_request.entry(request_id).or_default();
        self.ensure_open(request_id)?;

        for (assignment, _) in &offers {
            if assignment.status != AssignmentStatus::Pending {
                return Err(StoreError::Conflict(format!(
                    "assignment {} is not pending",
                    assignment.id
                )));
            }
            if self.assignments.contains_key(&assignment.id) {
                return Err(StoreError::Conflict(format!(
                    "assignment {} already exists",
                    assignment.id
                )));
            }
        }

        for (assignment, history) in offers {
            index.push(assignment.id);
            self.history.insert(assignment.id, history);
            self.assignments.insert(assignment.id, assignment);
        }

        if let Some(mut request) = self.requests.get_mut(&request_id) {
            request.status = FulfillmentStatus::Offered;
            request.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn get_assignment(&self, id: Uuid) -> Result<MatchingAssignment, StoreError> {
        self.assignments
            .get(&id)
            .map(|assignment| assignment.clone())
            .ok_or_else(|| StoreError::NotFound(format!("assignment {id}")))
    }

    async fn assignments_for_request(
        &self,
        request_id: Uuid,
    ) -> Result<Vec<MatchingAssignment>, StoreError> {
        let ids = self
            .offers_by_request
            .get(&request_id)
            .map(|index| index.clone())
            .unwrap_or_default();

        Ok(ids
            .iter()
            .filter_map(|id| self.assignments.get(id).map(|assignment| assignment.clone()))
            .collect())
    }

    async fn accept_offer(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<AcceptOutcome, StoreError> {
        let request_id = self.request_of(id)?;
        let index = self
            .offers_by_request
            .get_mut(&request_id)
            .ok_or_else(|| StoreError::Backend(format!("offer index missing for {request_id}")))?;
        self.ensure_open(request_id)?;

        let accepted = {
            let mut assignment = self
                .assignments
                .get_mut(&id)
                .ok_or_else(|| StoreError::NotFound(format!("assignment {id}")))?;
            if !assignment.transition(AssignmentStatus::Accepted, at, None) {
                return Err(StoreError::Conflict(format!(
                    "assignment {id} is already {}",
                    assignment.status.as_str()
                )));
            }
            assignment.clone()
        };

        let mut cancelled = Vec::new();
        for sibling_id in index.iter().filter(|sibling_id| **sibling_id != id) {
            if let Some(mut sibling) = self.assignments.get_mut(sibling_id) {
                if sibling.transition(AssignmentStatus::Cancelled, at, None) {
                    cancelled.push(sibling.clone());
                }
            }
        }

        self.mirror_history(&accepted, at);
        for sibling in &cancelled {
            self.mirror_history(sibling, at);
        }

        if let Some(mut request) = self.requests.get_mut(&request_id) {
            request.status = FulfillmentStatus::Assigned;
            request.driver_id = Some(accepted.driver_id);
            request.updated_at = at;
        }
        if let Some(mut driver) = self.drivers.get_mut(&accepted.driver_id) {
            driver.set_availability(AvailabilityStatus::Busy, at);
        }

        drop(index);
        Ok(AcceptOutcome {
            assignment: accepted,
            cancelled,
        })
    }

    async fn reject_offer(
        &self,
        id: Uuid,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<ResolveOutcome, StoreError> {
        self.resolve(id, AssignmentStatus::Rejected, reason, at)
    }

    async fn expire_offer(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<ResolveOutcome, StoreError> {
        self.resolve(id, AssignmentStatus::Expired, None, at)
    }

    async fn overdue_offers(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError> {
        Ok(self
            .assignments
            .iter()
            .filter(|entry| {
                entry.status == AssignmentStatus::Pending && entry.response_timeout <= now
            })
            .map(|entry| entry.id)
            .collect())
    }

    async fn cancel_request(
        &self,
        request_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Vec<MatchingAssignment>, StoreError> {
        let index = self.offers_by_request.entry(request_id).or_default();

        {
            let request = self
                .requests
                .get(&request_id)
                .ok_or_else(|| StoreError::NotFound(format!("request {request_id}")))?;
            if matches!(
                request.status,
                FulfillmentStatus::Assigned | FulfillmentStatus::Completed
            ) {
                return Err(StoreError::Conflict(format!(
                    "request {request_id} is already {}",
                    request.status.as_str()
                )));
            }
        }

        let mut cancelled = Vec::new();
        for id in index.iter() {
            if let Some(mut assignment) = self.assignments.get_mut(id) {
                if assignment.transition(AssignmentStatus::Cancelled, at, None) {
                    cancelled.push(assignment.clone());
                }
            }
        }
        for assignment in &cancelled {
            self.mirror_history(assignment, at);
        }

        if let Some(mut request) = self.requests.get_mut(&request_id) {
            if request.status != FulfillmentStatus::Cancelled {
                request.status = FulfillmentStatus::Cancelled;
                request.updated_at = at;
            }
        }

        drop(index);
        Ok(cancelled)
    }

    async fn assignments_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<MatchingAssignment>, StoreError> {
        let mut assignments: Vec<MatchingAssignment> = self
            .assignments
            .iter()
            .filter(|entry| entry.offered_at >= from && entry.offered_at < to)
            .map(|entry| entry.value().clone())
            .collect();
        assignments.sort_by(|a, b| b.offered_at.cmp(&a.offered_at));
        Ok(assignments)
    }

    async fn history_for_driver(
        &self,
        driver_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DriverAssignmentHistory>, StoreError> {
        let mut rows: Vec<DriverAssignmentHistory> = self
            .history
            .iter()
            .filter(|entry| {
                entry.driver_id == driver_id && entry.offered_at >= from && entry.offered_at < to
            })
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|row| row.offered_at);
        Ok(rows)
    }

    async fn drivers_with_history(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, StoreError> {
        let drivers: BTreeSet<Uuid> = self
            .history
            .iter()
            .filter(|entry| entry.offered_at >= from && entry.offered_at < to)
            .map(|entry| entry.driver_id)
            .collect();
        Ok(drivers.into_iter().collect())
    }

    async fn mark_completed(
        &self,
        request_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<DriverAssignmentHistory, StoreError> {
        let mut row = self
            .history
            .iter_mut()
            .find(|entry| {
                entry.target.id() == request_id && entry.status == AssignmentStatus::Accepted
            })
            .ok_or_else(|| {
                StoreError::NotFound(format!("accepted assignment for request {request_id}"))
            })?;

        if row.completed_at.is_some() {
            return Err(StoreError::Conflict(format!(
                "request {request_id} is already completed"
            )));
        }
        row.completed_at = Some(at);
        Ok(row.clone())
    }

    async fn latest_reassignment(
        &self,
        request_id: Uuid,
    ) -> Result<Option<ReassignmentQueueItem>, StoreError> {
        Ok(self.reassignments.get(&request_id).map(|item| item.clone()))
    }

    async fn enqueue_reassignment(&self, item: ReassignmentQueueItem) -> Result<bool, StoreError> {
        match self.reassignments.entry(item.target.id()) {
            Entry::Occupied(mut slot) => {
                if slot.get().status.is_active() {
                    return Ok(false);
                }
                slot.insert(item);
                Ok(true)
            }
            Entry::Vacant(slot) => {
                slot.insert(item);
                Ok(true)
            }
        }
    }

    async fn claim_reassignments(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReassignmentQueueItem>, StoreError> {
        let mut due: Vec<(Uuid, i32, DateTime<Utc>)> = self
            .reassignments
            .iter()
            .filter(|entry| entry.is_due(now))
            .map(|entry| (*entry.key(), entry.priority, entry.created_at))
            .collect();
        due.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

        let mut claimed = Vec::new();
        for (key, _, _) in due {
            if claimed.len() >= limit {
                break;
            }
            if let Some(mut item) = self.reassignments.get_mut(&key) {
                if item.is_due(now) {
                    item.status = QueueStatus::Processing;
                    item.processing_started_at = Some(now);
                    claimed.push(item.clone());
                }
            }
        }
        Ok(claimed)
    }

    async fn update_reassignment(&self, item: ReassignmentQueueItem) -> Result<(), StoreError> {
        let mut stored = self
            .reassignments
            .get_mut(&item.target.id())
            .filter(|stored| stored.id == item.id)
            .ok_or_else(|| StoreError::NotFound(format!("reassignment item {}", item.id)))?;

        if stored.status == QueueStatus::Cancelled {
            return Err(StoreError::Conflict(format!(
                "reassignment item {} was cancelled",
                item.id
            )));
        }
        *stored = item;
        Ok(())
    }

    async fn cancel_reassignment(
        &self,
        request_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<ReassignmentQueueItem>, StoreError> {
        let Some(mut item) = self.reassignments.get_mut(&request_id) else {
            return Ok(None);
        };
        if !item.status.is_active() {
            return Ok(None);
        }
        item.finish(QueueStatus::Cancelled, at);
        Ok(Some(item.clone()))
    }

    async fn pending_reassignments(&self) -> Result<usize, StoreError> {
        Ok(self
            .reassignments
            .iter()
            .filter(|entry| entry.status == QueueStatus::Pending)
            .count())
    }

    async fn upsert_performance(
        &self,
        metrics: DriverPerformanceMetrics,
    ) -> Result<(), StoreError> {
        if let Some(mut driver) = self.drivers.get_mut(&metrics.driver_id) {
            driver.latest_metrics = Some(metrics.clone());
        }
        self.performance
            .insert((metrics.driver_id, metrics.period_start), metrics);
        Ok(())
    }

    async fn performance_for(
        &self,
        driver_id: Uuid,
        period_start: DateTime<Utc>,
    ) -> Result<Option<DriverPerformanceMetrics>, StoreError> {
        Ok(self
            .performance
            .get(&(driver_id, period_start))
            .map(|metrics| metrics.clone()))
    }
}
