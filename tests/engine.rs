use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use dispatch_matcher::config::EngineSettings;
use dispatch_matcher::engine::MatchingEngine;
use dispatch_matcher::error::AppError;
use dispatch_matcher::models::assignment::{AssignmentStatus, DriverResponse, MatchingAssignment};
use dispatch_matcher::models::config::MatchingAlgorithmConfig;
use dispatch_matcher::models::driver::{
    AvailabilityRecord, AvailabilityStatus, Driver, GeoPoint, VehicleType, VerificationStatus,
};
use dispatch_matcher::models::matching::{MatchFailure, TimeRange};
use dispatch_matcher::models::queue::QueueStatus;
use dispatch_matcher::models::request::{
    FulfillmentStatus, MatchingRequest, RequestType, ServiceRequest,
};
use dispatch_matcher::store::{InMemoryStore, MatchingStore};

const ORIGIN: GeoPoint = GeoPoint { lat: 0.0, lng: 0.0 };

fn test_config() -> MatchingAlgorithmConfig {
    MatchingAlgorithmConfig {
        reassignment_delay_secs: 0,
        ..MatchingAlgorithmConfig::default()
    }
}

async fn setup(config: MatchingAlgorithmConfig) -> (Arc<MatchingEngine>, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    store.activate_config(config).await.unwrap();
    let engine = MatchingEngine::new(store.clone(), EngineSettings::default(), 64);
    (Arc::new(engine), store)
}

fn driver(seed: u128, lat: f64, lng: f64) -> Driver {
    let now = Utc::now();
    Driver {
        id: Uuid::from_u128(seed),
        name: format!("driver-{seed}"),
        location: Some(GeoPoint { lat, lng }),
        vehicle_type: VehicleType::Car,
        service_types: vec!["delivery".to_string(), "ride".to_string()],
        is_available: true,
        verification_status: VerificationStatus::Verified,
        rating: 4.5,
        completed_deliveries: 50,
        completed_rides: 50,
        current_status: Some(AvailabilityRecord {
            status: AvailabilityStatus::Available,
            started_at: now,
        }),
        battery: None,
        connectivity: None,
        latest_metrics: None,
        preferences: None,
        updated_at: now,
    }
}

fn service_request(request_type: RequestType) -> ServiceRequest {
    let now = Utc::now();
    ServiceRequest {
        id: Uuid::new_v4(),
        request_type,
        pickup: ORIGIN,
        destination: Some(GeoPoint { lat: 0.05, lng: 0.05 }),
        service_type: "delivery".to_string(),
        estimated_value: Some(25.0),
        requirements: Default::default(),
        scheduled_at: None,
        preferences: Default::default(),
        priority: 0,
        status: FulfillmentStatus::Pending,
        driver_id: None,
        created_at: now,
        updated_at: now,
    }
}

fn matching_request() -> MatchingRequest {
    service_request(RequestType::Order).to_matching_request()
}

async fn add_drivers(store: &InMemoryStore, drivers: Vec<Driver>) {
    for d in drivers {
        store.upsert_driver(d).await.unwrap();
    }
}

async fn dispatched(
    engine: &MatchingEngine,
    store: &InMemoryStore,
) -> (ServiceRequest, Vec<MatchingAssignment>) {
    let request = service_request(RequestType::Ride);
    store.insert_request(request.clone()).await.unwrap();
    let outcome = engine.dispatch_request(request.id).await.unwrap();
    (request, outcome.assignments)
}

#[tokio::test]
async fn single_nearby_driver_matches_with_expected_metrics() {
    let (engine, store) = setup(test_config()).await;
    add_drivers(&store, vec![driver(1, 0.0, 0.01)]).await;

    let result = engine.find_matches(&matching_request()).await;

    assert!(result.success);
    assert_eq!(result.matches.len(), 1);
    let best = &result.matches[0];
    assert!((best.distance_km - 1.11).abs() < 0.01);
    assert_eq!(best.eta_minutes, 8);
    assert!((best.scores.distance - (1.0 - best.distance_km / 15.0)).abs() < 1e-9);
    assert!((best.scores.distance - 0.926).abs() < 0.001);
    assert_eq!(result.estimated_wait_minutes, Some(8));
    assert_eq!(result.algorithm.version, 1);
}

#[tokio::test]
async fn no_driver_within_radius_is_a_structured_failure() {
    let (engine, store) = setup(test_config()).await;
    add_drivers(&store, vec![driver(1, 0.0, 1.0)]).await;

    let result = engine.find_matches(&matching_request()).await;

    assert!(!result.success);
    assert!(result.matches.is_empty());
    assert_eq!(result.error, Some(MatchFailure::NoDriversAvailable));
    assert!(result.error.unwrap().message().contains("no drivers available"));
    assert!(result.algorithm.processing_time_ms >= 0.0);
}

#[tokio::test]
async fn ride_without_destination_is_invalid() {
    let (engine, _store) = setup(test_config()).await;
    let mut request = service_request(RequestType::Ride).to_matching_request();
    request.destination = None;

    let result = engine.find_matches(&request).await;

    assert!(!result.success);
    assert!(matches!(result.error, Some(MatchFailure::InvalidRequest(_))));
    assert_eq!(result.algorithm.algorithm_type, "weighted_multi_factor");
}

#[tokio::test]
async fn matches_are_ranked_and_truncated() {
    let (engine, store) = setup(test_config()).await;
    add_drivers(
        &store,
        vec![
            driver(1, 0.0, 0.09),
            driver(2, 0.0, 0.01),
            driver(3, 0.0, 0.05),
            driver(4, 0.0, 0.02),
            driver(5, 0.0, 0.07),
        ],
    )
    .await;

    let result = engine.find_matches(&matching_request()).await;

    assert_eq!(result.matches.len(), 3);
    let ids: Vec<Uuid> = result.matches.iter().map(|m| m.driver_id).collect();
    assert_eq!(
        ids,
        vec![Uuid::from_u128(2), Uuid::from_u128(4), Uuid::from_u128(3)]
    );
    assert!(
        result
            .matches
            .windows(2)
            .all(|pair| pair[0].scores.total >= pair[1].scores.total)
    );
}

#[tokio::test]
async fn equal_scores_keep_input_order() {
    let (engine, store) = setup(test_config()).await;
    add_drivers(&store, vec![driver(9, 0.0, 0.02), driver(3, 0.0, 0.02)]).await;

    let result = engine.find_matches(&matching_request()).await;

    let ids: Vec<Uuid> = result.matches.iter().map(|m| m.driver_id).collect();
    assert_eq!(ids, vec![Uuid::from_u128(3), Uuid::from_u128(9)]);
}

#[tokio::test]
async fn offers_get_rank_priorities_timeouts_and_history() {
    let (engine, store) = setup(test_config()).await;
    add_drivers(
        &store,
        vec![driver(1, 0.0, 0.01), driver(2, 0.0, 0.02), driver(3, 0.0, 0.03)],
    )
    .await;

    let (request, offers) = dispatched(&engine, &store).await;

    assert_eq!(offers.len(), 3);
    let priorities: Vec<i32> = offers.iter().map(|a| a.priority).collect();
    assert_eq!(priorities, vec![10, 9, 8]);
    for offer in &offers {
        assert_eq!(offer.status, AssignmentStatus::Pending);
        assert_eq!(offer.response_timeout - offer.offered_at, Duration::seconds(60));
        assert_eq!(offer.target.ride_id(), Some(request.id));
        assert!(offer.target.order_id().is_none());
    }

    let from = Utc::now() - Duration::hours(1);
    let to = Utc::now() + Duration::hours(1);
    let history = store.history_for_driver(offers[0].driver_id, from, to).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].scores, offers[0].scores);

    let stored = store.get_request(request.id).await.unwrap();
    assert_eq!(stored.status, FulfillmentStatus::Offered);
}

#[tokio::test]
async fn late_accept_after_sibling_won_is_a_conflict_and_stays_cancelled() {
    let (engine, store) = setup(test_config()).await;
    add_drivers(&store, vec![driver(1, 0.0, 0.01), driver(2, 0.0, 0.02)]).await;
    let (request, offers) = dispatched(&engine, &store).await;
    let (a, b) = (&offers[0], &offers[1]);

    let won = engine
        .handle_driver_response(b.id, b.driver_id, DriverResponse::Accepted, None)
        .await
        .unwrap();
    assert!(!won.requires_reassignment);
    assert_eq!(won.cancelled_siblings, vec![a.id]);

    let lost = engine
        .handle_driver_response(a.id, a.driver_id, DriverResponse::Accepted, None)
        .await;
    assert!(matches!(lost, Err(AppError::Conflict(_))));

    let a_after = store.get_assignment(a.id).await.unwrap();
    assert_eq!(a_after.status, AssignmentStatus::Cancelled);

    let stored = store.get_request(request.id).await.unwrap();
    assert_eq!(stored.status, FulfillmentStatus::Assigned);
    assert_eq!(stored.driver_id, Some(b.driver_id));

    let winner = store.get_driver(b.driver_id).await.unwrap();
    assert_eq!(winner.availability(), Some(AvailabilityStatus::Busy));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_accepts_produce_exactly_one_winner() {
    let (engine, store) = setup(test_config()).await;
    add_drivers(
        &store,
        vec![driver(1, 0.0, 0.01), driver(2, 0.0, 0.02), driver(3, 0.0, 0.03)],
    )
    .await;
    let (request, offers) = dispatched(&engine, &store).await;

    let handles: Vec<_> = offers
        .iter()
        .map(|offer| {
            let engine = engine.clone();
            let (id, driver_id) = (offer.id, offer.driver_id);
            tokio::spawn(async move {
                engine
                    .handle_driver_response(id, driver_id, DriverResponse::Accepted, None)
                    .await
            })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(AppError::Conflict(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(winners, 1);

    let final_states = store.assignments_for_request(request.id).await.unwrap();
    let accepted = final_states
        .iter()
        .filter(|a| a.status == AssignmentStatus::Accepted)
        .count();
    let cancelled = final_states
        .iter()
        .filter(|a| a.status == AssignmentStatus::Cancelled)
        .count();
    assert_eq!(accepted, 1);
    assert_eq!(cancelled, 2);
}

#[tokio::test]
async fn second_response_is_a_conflict_and_changes_nothing() {
    let (engine, store) = setup(test_config()).await;
    add_drivers(&store, vec![driver(1, 0.0, 0.01), driver(2, 0.0, 0.02)]).await;
    let (_request, offers) = dispatched(&engine, &store).await;
    let offer = &offers[0];

    engine
        .handle_driver_response(
            offer.id,
            offer.driver_id,
            DriverResponse::Rejected,
            Some("too far".to_string()),
        )
        .await
        .unwrap();
    let first = store.get_assignment(offer.id).await.unwrap();

    let again = engine
        .handle_driver_response(offer.id, offer.driver_id, DriverResponse::Accepted, None)
        .await;
    assert!(matches!(again, Err(AppError::Conflict(_))));

    let after = store.get_assignment(offer.id).await.unwrap();
    assert_eq!(after.status, AssignmentStatus::Rejected);
    assert_eq!(after.rejected_at, first.rejected_at);
    assert_eq!(after.rejection_reason.as_deref(), Some("too far"));
}

#[tokio::test]
async fn response_from_another_driver_is_forbidden() {
    let (engine, store) = setup(test_config()).await;
    add_drivers(&store, vec![driver(1, 0.0, 0.01)]).await;
    let (_request, offers) = dispatched(&engine, &store).await;

    let result = engine
        .handle_driver_response(offers[0].id, Uuid::new_v4(), DriverResponse::Accepted, None)
        .await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
    let unchanged = store.get_assignment(offers[0].id).await.unwrap();
    assert_eq!(unchanged.status, AssignmentStatus::Pending);
}

#[tokio::test]
async fn rejecting_the_last_pending_offer_queues_reassignment() {
    let (engine, store) = setup(test_config()).await;
    add_drivers(&store, vec![driver(1, 0.0, 0.01), driver(2, 0.0, 0.02)]).await;
    let (request, offers) = dispatched(&engine, &store).await;

    let first = engine
        .handle_driver_response(offers[0].id, offers[0].driver_id, DriverResponse::Rejected, None)
        .await
        .unwrap();
    assert!(!first.requires_reassignment);
    assert!(store.latest_reassignment(request.id).await.unwrap().is_none());

    let last = engine
        .handle_driver_response(offers[1].id, offers[1].driver_id, DriverResponse::Rejected, None)
        .await
        .unwrap();
    assert!(last.requires_reassignment);

    let item = store.latest_reassignment(request.id).await.unwrap().unwrap();
    assert_eq!(item.status, QueueStatus::Pending);
    assert_eq!(item.attempt, 1);
    assert_eq!(item.reason, "rejected");
    assert_eq!(item.original_driver_id, Some(offers[1].driver_id));
}

#[tokio::test]
async fn expiry_sweep_expires_overdue_offers_and_queues_request() {
    let (engine, store) = setup(test_config()).await;
    add_drivers(&store, vec![driver(1, 0.0, 0.01), driver(2, 0.0, 0.02)]).await;
    let (request, offers) = dispatched(&engine, &store).await;

    let not_yet = engine.expire_overdue_offers_at(Utc::now()).await.unwrap();
    assert_eq!(not_yet, 0);

    let later = Utc::now() + Duration::seconds(61);
    let expired = engine.expire_overdue_offers_at(later).await.unwrap();
    assert_eq!(expired, 2);

    for offer in &offers {
        let after = store.get_assignment(offer.id).await.unwrap();
        assert_eq!(after.status, AssignmentStatus::Expired);
    }
    let item = store.latest_reassignment(request.id).await.unwrap().unwrap();
    assert_eq!(item.reason, "expired");

    let again = engine.expire_overdue_offers_at(later).await.unwrap();
    assert_eq!(again, 0);
}

#[tokio::test]
async fn reassignment_widens_radius_on_later_attempts() {
    let (engine, store) = setup(test_config()).await;
    // About 27.8 km from the pickup: outside the default 15 km radius, inside
    // the 30 km radius of the second attempt.
    add_drivers(&store, vec![driver(1, 0.0, 0.25)]).await;

    let request = service_request(RequestType::Order);
    store.insert_request(request.clone()).await.unwrap();
    let dispatch = engine.dispatch_request(request.id).await.unwrap();
    assert!(dispatch.queued_for_reassignment);
    let queued = store.latest_reassignment(request.id).await.unwrap().unwrap();
    assert_eq!(queued.priority, 1);

    let first = engine.process_reassignment_queue().await.unwrap();
    assert_eq!(first.claimed, 1);
    assert_eq!(first.retried, 1);

    let item = store.latest_reassignment(request.id).await.unwrap().unwrap();
    assert_eq!(item.attempt, 2);
    assert_eq!(item.priority, 2);
    assert_eq!(item.status, QueueStatus::Pending);
    assert!(item.processing_started_at.is_none());
    assert_eq!(item.widened_radius_km(), Some(30.0));

    let second = engine.process_reassignment_queue().await.unwrap();
    assert_eq!(second.completed, 1);

    let item = store.latest_reassignment(request.id).await.unwrap().unwrap();
    assert_eq!(item.status, QueueStatus::Completed);

    let offers = store.assignments_for_request(request.id).await.unwrap();
    assert_eq!(offers.len(), 1);
    assert!(offers[0].distance_km > 15.0);
    assert_eq!(
        store.get_request(request.id).await.unwrap().status,
        FulfillmentStatus::Offered
    );
}

#[tokio::test]
async fn reassignment_fails_once_attempts_are_exhausted() {
    let (engine, store) = setup(test_config()).await;

    let request = service_request(RequestType::Order);
    store.insert_request(request.clone()).await.unwrap();
    engine.dispatch_request(request.id).await.unwrap();

    let first = engine.process_reassignment_queue().await.unwrap();
    let second = engine.process_reassignment_queue().await.unwrap();
    assert_eq!((first.retried, second.retried), (1, 1));

    let third = engine.process_reassignment_queue().await.unwrap();
    assert_eq!(third.failed, 1);

    let item = store.latest_reassignment(request.id).await.unwrap().unwrap();
    assert_eq!(item.status, QueueStatus::Failed);
    assert_eq!(item.attempt, item.max_attempts);
    assert_eq!(
        store.get_request(request.id).await.unwrap().status,
        FulfillmentStatus::Unmatched
    );

    let idle = engine.process_reassignment_queue().await.unwrap();
    assert_eq!(idle.claimed, 0);
}

#[tokio::test]
async fn rejecting_driver_is_not_offered_the_request_again() {
    let (engine, store) = setup(test_config()).await;
    add_drivers(&store, vec![driver(1, 0.0, 0.01)]).await;
    let (request, offers) = dispatched(&engine, &store).await;

    engine
        .handle_driver_response(offers[0].id, offers[0].driver_id, DriverResponse::Rejected, None)
        .await
        .unwrap();

    let report = engine.process_reassignment_queue().await.unwrap();
    assert_eq!(report.retried, 1);
    assert_eq!(store.assignments_for_request(request.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn cancellation_cancels_pending_offers_and_queued_work() {
    let (engine, store) = setup(test_config()).await;
    add_drivers(&store, vec![driver(1, 0.0, 0.01), driver(2, 0.0, 0.02)]).await;
    let (request, offers) = dispatched(&engine, &store).await;

    let outcome = engine.cancel_request(request.id).await.unwrap();
    assert_eq!(outcome.cancelled_offers.len(), 2);

    for offer in &offers {
        let after = store.get_assignment(offer.id).await.unwrap();
        assert_eq!(after.status, AssignmentStatus::Cancelled);
    }
    assert_eq!(
        store.get_request(request.id).await.unwrap().status,
        FulfillmentStatus::Cancelled
    );

    let mut queued = service_request(RequestType::Order);
    queued.service_type = "freight".to_string();
    store.insert_request(queued.clone()).await.unwrap();
    let dispatch = engine.dispatch_request(queued.id).await.unwrap();
    assert!(dispatch.queued_for_reassignment);

    let outcome = engine.cancel_request(queued.id).await.unwrap();
    assert!(outcome.cancelled_reassignment.is_some());
    let item = store.latest_reassignment(queued.id).await.unwrap().unwrap();
    assert_eq!(item.status, QueueStatus::Cancelled);
    assert_eq!(engine.process_reassignment_queue().await.unwrap().claimed, 0);
}

#[tokio::test]
async fn assigned_request_cannot_be_cancelled() {
    let (engine, store) = setup(test_config()).await;
    add_drivers(&store, vec![driver(1, 0.0, 0.01)]).await;
    let (request, offers) = dispatched(&engine, &store).await;
    let driver_id = offers[0].driver_id;

    engine
        .handle_driver_response(offers[0].id, driver_id, DriverResponse::Accepted, None)
        .await
        .unwrap();

    let result = engine.cancel_request(request.id).await;
    assert!(matches!(result, Err(AppError::Conflict(_))));

    let stored = store.get_request(request.id).await.unwrap();
    assert_eq!(stored.status, FulfillmentStatus::Assigned);
    assert_eq!(stored.driver_id, Some(driver_id));
    assert_eq!(
        store.get_assignment(offers[0].id).await.unwrap().status,
        AssignmentStatus::Accepted
    );

    engine.record_completion(request.id).await.unwrap();
    assert_eq!(
        store.get_request(request.id).await.unwrap().status,
        FulfillmentStatus::Completed
    );
}

#[tokio::test]
async fn cancelled_request_cannot_be_completed() {
    let (engine, store) = setup(test_config()).await;
    add_drivers(&store, vec![driver(1, 0.0, 0.01)]).await;
    let (request, _offers) = dispatched(&engine, &store).await;

    engine.cancel_request(request.id).await.unwrap();
    let again = engine.cancel_request(request.id).await.unwrap();
    assert!(again.cancelled_offers.is_empty());

    let result = engine.record_completion(request.id).await;
    assert!(matches!(result, Err(AppError::Conflict(_))));
    assert_eq!(
        store.get_request(request.id).await.unwrap().status,
        FulfillmentStatus::Cancelled
    );
}

#[tokio::test]
async fn closed_requests_refuse_offers_and_status_changes() {
    let (engine, store) = setup(test_config()).await;
    add_drivers(&store, vec![driver(1, 0.0, 0.01)]).await;
    let (request, offers) = dispatched(&engine, &store).await;

    store.cancel_request(request.id, Utc::now()).await.unwrap();

    let accept = store.accept_offer(offers[0].id, Utc::now()).await;
    assert!(accept.is_err());
    let reopen = store
        .set_request_status(request.id, FulfillmentStatus::Pending)
        .await;
    assert!(reopen.is_err());

    let redispatch = engine.dispatch_request(request.id).await;
    assert!(matches!(redispatch, Err(AppError::Conflict(_))));
    assert_eq!(
        store.get_request(request.id).await.unwrap().status,
        FulfillmentStatus::Cancelled
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_racing_accept_never_both_succeed() {
    for _ in 0..100 {
        let (engine, store) = setup(test_config()).await;
        add_drivers(&store, vec![driver(1, 0.0, 0.01)]).await;
        let (request, offers) = dispatched(&engine, &store).await;
        let (offer_id, driver_id) = (offers[0].id, offers[0].driver_id);

        let cancel = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.cancel_request(request.id).await })
        };
        let accept = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .handle_driver_response(offer_id, driver_id, DriverResponse::Accepted, None)
                    .await
            })
        };
        let cancel = cancel.await.unwrap();
        let accept = accept.await.unwrap();

        let stored = store.get_request(request.id).await.unwrap();
        let offer = store.get_assignment(offer_id).await.unwrap();
        let availability = store.get_driver(driver_id).await.unwrap().availability();

        match (&cancel, &accept) {
            (Ok(_), Err(AppError::Conflict(_))) => {
                assert_eq!(stored.status, FulfillmentStatus::Cancelled);
                assert!(stored.driver_id.is_none());
                assert_eq!(offer.status, AssignmentStatus::Cancelled);
                assert_eq!(availability, Some(AvailabilityStatus::Available));
            }
            (Err(AppError::Conflict(_)), Ok(_)) => {
                assert_eq!(stored.status, FulfillmentStatus::Assigned);
                assert_eq!(stored.driver_id, Some(driver_id));
                assert_eq!(offer.status, AssignmentStatus::Accepted);
                assert_eq!(availability, Some(AvailabilityStatus::Busy));
            }
            other => panic!("cancel and accept must have one winner, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn performance_rollup_is_idempotent_within_a_week() {
    let (engine, store) = setup(test_config()).await;
    add_drivers(&store, vec![driver(1, 0.0, 0.01)]).await;
    let (request, offers) = dispatched(&engine, &store).await;
    let driver_id = offers[0].driver_id;

    engine
        .handle_driver_response(offers[0].id, driver_id, DriverResponse::Accepted, None)
        .await
        .unwrap();
    engine.record_completion(request.id).await.unwrap();

    let first = engine.update_driver_performance_metrics(driver_id).await.unwrap();
    let second = engine.update_driver_performance_metrics(driver_id).await.unwrap();

    assert_eq!(first.period_start, second.period_start);
    assert_eq!(second.total_assignments, 1);
    assert_eq!(second.accepted_assignments, 1);
    assert_eq!(second.completed_assignments, 1);
    assert_eq!(second.acceptance_rate, 1.0);
    assert_eq!(second.completion_rate, 1.0);

    let stored = store
        .performance_for(driver_id, second.period_start)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.total_assignments, 1);

    let refreshed = store.get_driver(driver_id).await.unwrap();
    assert_eq!(refreshed.availability(), Some(AvailabilityStatus::Available));
    assert!(refreshed.latest_metrics.is_some());
}

#[tokio::test]
async fn statistics_summarize_offer_outcomes() {
    let (engine, store) = setup(test_config()).await;
    add_drivers(&store, vec![driver(1, 0.0, 0.01), driver(2, 0.0, 0.02)]).await;
    let (_request, offers) = dispatched(&engine, &store).await;

    engine
        .handle_driver_response(offers[0].id, offers[0].driver_id, DriverResponse::Rejected, None)
        .await
        .unwrap();
    engine
        .handle_driver_response(offers[1].id, offers[1].driver_id, DriverResponse::Accepted, None)
        .await
        .unwrap();

    let range = TimeRange {
        from: Utc::now() - Duration::hours(1),
        to: Utc::now() + Duration::hours(1),
    };
    let stats = engine.get_matching_statistics(range).await.unwrap();

    assert_eq!(stats.total_assignments, 2);
    assert_eq!(stats.successful_assignments, 1);
    assert_eq!(stats.failed_assignments, 1);
    assert_eq!(stats.total_requests, 1);
    assert_eq!(stats.success_rate, 1.0);
    assert_eq!(stats.acceptance_rate, 0.5);
    assert!(stats.avg_response_time_secs.is_some());
    assert_eq!(stats.recent_assignments.len(), 2);
}

#[tokio::test]
async fn missing_config_is_created_and_refresh_picks_up_new_versions() {
    let store = Arc::new(InMemoryStore::new());
    let engine = MatchingEngine::new(store.clone(), EngineSettings::default(), 16);

    let config = engine.current_config().await;
    assert_eq!(config.version, 1);
    assert!(store.active_config().await.unwrap().is_some());

    let tuned = MatchingAlgorithmConfig {
        version: 2,
        max_assignments: 5,
        ..MatchingAlgorithmConfig::default()
    };
    store.activate_config(tuned).await.unwrap();
    assert_eq!(engine.current_config().await.version, 1);

    let refreshed = engine.refresh_config().await;
    assert_eq!(refreshed.version, 2);
    assert_eq!(refreshed.max_assignments, 5);
}
