use std::sync::{Arc, Barrier};
use std::thread;

use warmpath::entity::identifiers;
use warmpath::{
    EnrichmentBatch, EntityType, ImportEngine, ImportEvent, ReviewDecision, ReviewPriority, ReviewQueue,
    ReviewReason, ReviewResolution, ReviewStatus, TransitionDetails, WarmpathConfig, WarmpathError,
};

fn engine_with_pending_item() -> (ImportEngine, warmpath::EntityId, warmpath::ReviewItemId) {
    let engine = ImportEngine::in_memory(WarmpathConfig::default()).unwrap();
    let batch = EnrichmentBatch::new();
    let existing = engine
        .import(
            &ImportEvent::new(EntityType::Company, "Initech Systems").identifier(identifiers::DOMAIN, "initech.com"),
            &batch,
        )
        .unwrap()
        .resolution
        .entity_id()
        .unwrap();
    let outcome = engine
        .import(&ImportEvent::new(EntityType::Company, "Initech System"), &batch)
        .unwrap();
    (engine, existing, outcome.review_item.unwrap())
}

#[test]
fn transition_out_of_resolved_fails_and_leaves_item_unchanged() {
    let (engine, existing, item_id) = engine_with_pending_item();
    let queue = engine.queue();

    let resolved = engine
        .adjudicate(item_id, ReviewDecision::LinkedToExisting { target: existing }, "reviewer-1")
        .unwrap();
    assert_eq!(resolved.status, ReviewStatus::Resolved);
    assert_eq!(resolved.resolution, Some(ReviewResolution::LinkedToExisting));

    for to in [ReviewStatus::Pending, ReviewStatus::InReview, ReviewStatus::Skipped, ReviewStatus::Resolved] {
        let err = queue
            .transition(item_id, to, TransitionDetails::default().reviewer("reviewer-2"))
            .unwrap_err();
        assert!(matches!(err, WarmpathError::Execution(_)), "{err:?}");

        let after = queue.get(item_id).unwrap();
        assert_eq!(after.status, ReviewStatus::Resolved);
        assert_eq!(after.resolution, Some(ReviewResolution::LinkedToExisting));
        assert_eq!(after.resolved_entity, Some(existing));
        assert_eq!(after.reviewer.as_deref(), Some("reviewer-1"));
        assert_eq!(after.updated_at, resolved.updated_at);
    }
}

#[test]
fn resolved_transition_requires_resolution_and_target() {
    let queue = ReviewQueue::in_memory();
    let item = warmpath::ReviewItem::new(
        ImportEvent::new(EntityType::Person, "Sam Smith"),
        ReviewReason::MultipleNameMatches,
        Vec::new(),
    );
    let id = queue.enqueue(item).unwrap();
    queue
        .transition(id, ReviewStatus::InReview, TransitionDetails::default())
        .unwrap();

    assert!(queue
        .transition(id, ReviewStatus::Resolved, TransitionDetails::default())
        .is_err());
    assert!(queue
        .transition(
            id,
            ReviewStatus::Resolved,
            TransitionDetails::resolved(ReviewResolution::Merged, None)
        )
        .is_err());
    assert_eq!(queue.get(id).unwrap().status, ReviewStatus::InReview);

    let done = queue
        .transition(
            id,
            ReviewStatus::Resolved,
            TransitionDetails::resolved(ReviewResolution::Rejected, None).notes("not the same person"),
        )
        .unwrap();
    assert_eq!(done.notes.as_deref(), Some("not the same person"));
    assert!(done.resolved_at.is_some());
}

#[test]
fn only_one_adjudicator_claims_an_item() {
    let (engine, _, item_id) = engine_with_pending_item();
    let queue = engine.queue().clone();
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let queue = queue.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                queue
                    .transition(
                        item_id,
                        ReviewStatus::InReview,
                        TransitionDetails::default().reviewer(format!("reviewer-{i}")),
                    )
                    .is_ok()
            })
        })
        .collect();
    let winners = handles.into_iter().map(|h| h.join().unwrap()).filter(|won| *won).count();
    assert_eq!(winners, 1);
}

#[test]
fn derived_imports_queue_at_low_priority() {
    let engine = ImportEngine::in_memory(WarmpathConfig::default()).unwrap();
    let batch = EnrichmentBatch::new();
    engine
        .import(&ImportEvent::new(EntityType::Company, "Umbrella Group"), &batch)
        .unwrap();

    let deep = ImportEvent::new(EntityType::Company, "Umbrella Groups").depth(2);
    let outcome = engine.import(&deep, &batch).unwrap();
    let item = engine.queue().get(outcome.review_item.unwrap()).unwrap();
    assert_eq!(item.priority, ReviewPriority::Low);

    let low = engine
        .queue()
        .list_by_status(ReviewStatus::Pending, Some(ReviewPriority::Low))
        .unwrap();
    assert_eq!(low.len(), 1);
    assert!(engine
        .queue()
        .list_by_status(ReviewStatus::Pending, Some(ReviewPriority::High))
        .unwrap()
        .is_empty());
}

#[test]
fn concurrent_adjudicators_write_the_store_once() {
    let (engine, _, item_id) = engine_with_pending_item();
    let engine = Arc::new(engine);
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                engine
                    .adjudicate(item_id, ReviewDecision::CreatedNew, &format!("reviewer-{i}"))
                    .is_ok()
            })
        })
        .collect();
    let winners = handles.into_iter().map(|h| h.join().unwrap()).filter(|won| *won).count();

    assert_eq!(winners, 1);
    assert_eq!(engine.store().list_by_type(EntityType::Company).unwrap().len(), 2);
    assert_eq!(engine.queue().get(item_id).unwrap().status, ReviewStatus::Resolved);
}
