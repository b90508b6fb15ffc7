mod common;

use common::*;
use futures::future::join_all;
use reviewflow_core::config::ConcurrencyMode;
use reviewflow_core::gateway::ReviewStore;
use reviewflow_core::models::TransitionDefinition;
use reviewflow_core::state_machine::{ApplyRequest, CreateItemRequest};
use reviewflow_core::ReviewError;

async fn conflicting_version_tokens(mode: ConcurrencyMode) {
    let world = TestWorld::with_mode(mode);
    let workflow = world.two_stage().await;
    let item = world.create(&workflow, "Shared item").await;

    let approve = {
        let engine = world.system.engine.clone();
        let request = ApplyRequest::new(item.item_id, MANAGER_A, "approve").expecting_version(1);
        tokio::spawn(async move { engine.apply(request).await })
    };
    let reject = {
        let engine = world.system.engine.clone();
        let request = ApplyRequest::new(item.item_id, MANAGER_A, "reject").expecting_version(1);
        tokio::spawn(async move { engine.apply(request).await })
    };

    let results = [approve.await.unwrap(), reject.await.unwrap()];
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(ReviewError::Conflict { .. })))
        .count();

    assert_eq!(succeeded, 1, "mode {mode}: {results:?}");
    assert_eq!(conflicts, 1, "mode {mode}: {results:?}");
    assert_eq!(world.store.record_count(), 1);
    assert_eq!(world.item(item.item_id).await.version, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_conflicting_versions_locking_mode() {
    conflicting_version_tokens(ConcurrencyMode::Locking).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_conflicting_versions_optimistic_mode() {
    conflicting_version_tokens(ConcurrencyMode::Optimistic).await;
}

async fn racing_approvals(mode: ConcurrencyMode) {
    let world = TestWorld::with_mode(mode);
    let workflow = world.two_stage().await;
    let item = world.create(&workflow, "Hot item").await;

    let handles = (0..16).map(|_| {
        let engine = world.system.engine.clone();
        let request = ApplyRequest::new(item.item_id, MANAGER_A, "approve");
        tokio::spawn(async move { engine.apply(request).await })
    });
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(
            matches!(err, ReviewError::Forbidden(_) | ReviewError::Conflict { .. }),
            "unexpected error in mode {mode}: {err:?}"
        );
    }

    let item = world.item(item.item_id).await;
    assert_eq!(item.status, "pending_review_level2");
    assert_eq!(item.version, 2);
    assert_eq!(world.store.record_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_approvals_apply_once_locking_mode() {
    racing_approvals(ConcurrencyMode::Locking).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_approvals_apply_once_optimistic_mode() {
    racing_approvals(ConcurrencyMode::Optimistic).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_different_items_progress_independently() {
    let world = TestWorld::new();
    let workflow = world.two_stage().await;

    let mut items = Vec::new();
    for n in 0..8 {
        items.push(world.create(&workflow, &format!("Item {n}")).await);
    }

    let handles = items.iter().map(|item| {
        let engine = world.system.engine.clone();
        let request = ApplyRequest::new(item.item_id, item.current_reviewer_id.unwrap(), "approve");
        tokio::spawn(async move { engine.apply(request).await })
    });
    for joined in join_all(handles).await {
        joined.unwrap().unwrap();
    }

    for item in &items {
        assert_eq!(world.item(item.item_id).await.status, "pending_review_level2");
    }
    assert_eq!(world.store.record_count(), items.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_transitions_added_only_before_first_item() {
    for _ in 0..20 {
        let world = TestWorld::new();
        let workflow = world.two_stage().await;
        let template_id = workflow.template_id();

        let add = {
            let registry = world.system.registry.clone();
            let fast_track = TransitionDefinition {
                from_order: 1,
                action: "fast_track".to_string(),
                to_order: None,
                result_status: "approved".to_string(),
            };
            tokio::spawn(async move { registry.add_transitions(template_id, vec![fast_track]).await })
        };
        let create = {
            let engine = world.system.engine.clone();
            let request = CreateItemRequest::new(template_id, CREATOR, "Racing item");
            tokio::spawn(async move { engine.create_item(request).await })
        };

        let added = add.await.unwrap();
        create.await.unwrap().unwrap();

        let expected = match added {
            Ok(_) => workflow.transitions.len() + 1,
            Err(ReviewError::InvalidState(_)) => workflow.transitions.len(),
            Err(other) => panic!("unexpected error {other:?}"),
        };
        let stored = world.store.transitions_for_template(template_id).await.unwrap();
        let served = world.system.registry.definition(template_id).await.unwrap();
        assert_eq!(stored.len(), expected);
        assert_eq!(served.transitions, stored);
    }
}
