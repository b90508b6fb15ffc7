mod common;

use chrono::Duration;
use common::*;
use reviewflow_core::models::ReviewDuration;
use reviewflow_core::state_machine::ApplyRequest;
use reviewflow_core::{HistoryLedger, ReviewError};

#[tokio::test]
async fn test_timeline_starts_with_creation_event() {
    let world = TestWorld::new();
    let workflow = world.two_stage().await;
    let item = world.create(&workflow, "Kickoff").await;

    let timeline = world.system.ledger.timeline_for(item.item_id).await.unwrap();
    assert_eq!(timeline.events.len(), 1);

    let created = &timeline.events[0];
    assert!(created.is_creation());
    assert_eq!(created.time, item.created_at);
    assert_eq!(created.stage_name, "Creation");
    assert_eq!(created.actor_name, "Carla Creator");
    assert_eq!(created.action_display_name, "Created");
    assert_eq!(created.result_status, "pending_review_level1");
    assert_eq!(created.status_display_name, "Pending Level 1 Review");
    assert_eq!(created.comment.as_deref(), Some("Item created"));

    let summary = HistoryLedger::summarize(&timeline);
    assert_eq!(summary.total_reviews, 0);
    assert_eq!(summary.total_duration, ReviewDuration::NotStarted);
    assert_eq!(summary.first_review_label(), "Review has not started yet");
    assert_eq!(summary.last_review_label(), "Review has not started yet");
    assert_eq!(summary.current_status_display, "Pending Level 1 Review");
}

#[tokio::test]
async fn test_timeline_follows_a_return_and_resubmit() {
    let world = TestWorld::new();
    let workflow = world.two_stage().await;
    let item = world.create(&workflow, "Revisions").await;

    world.act(item.item_id, MANAGER_A, "return").await.unwrap();
    world.act(item.item_id, CREATOR, "resubmit").await.unwrap();
    world.act(item.item_id, MANAGER_A, "approve").await.unwrap();
    world.tick(60 * 26);
    world.act(item.item_id, DIRECTOR_A, "approve").await.unwrap();

    let timeline = world.system.ledger.timeline_for(item.item_id).await.unwrap();
    assert_eq!(timeline.current_status, "approved");

    let steps: Vec<(&str, &str, &str)> = timeline
        .events
        .iter()
        .map(|e| (e.action.as_str(), e.stage_name.as_str(), e.result_status.as_str()))
        .collect();
    assert_eq!(
        steps,
        vec![
            ("created", "Creation", "pending_review_level1"),
            ("return", "Manager review", "returned_to_creator"),
            ("resubmit", "Returned to creator", "pending_review_level1"),
            ("approve", "Manager review", "pending_review_level2"),
            ("approve", "Director review", "approved"),
        ]
    );
    assert!(timeline.events.windows(2).all(|w| w[0].time <= w[1].time));

    let summary = HistoryLedger::summarize(&timeline);
    assert_eq!(summary.total_reviews, 4);
    assert_eq!(summary.approval_count, 2);
    assert_eq!(summary.return_count, 1);
    assert_eq!(summary.reject_count, 0);
    assert_eq!(summary.current_status_display, "Approved");
    // Four actions five minutes apart plus a 26 hour pause before the last
    assert_eq!(
        summary.total_duration,
        ReviewDuration::Elapsed(Duration::minutes(15) + Duration::hours(26))
    );
    assert_eq!(summary.total_duration.to_string(), "1 days 2 hours 15 minutes");
}

#[tokio::test]
async fn test_history_view_uses_detail_access_rule() {
    let world = TestWorld::new();
    let workflow = world.two_stage().await;
    let item = world.create(&workflow, "Private").await;
    world.act(item.item_id, MANAGER_A, "reject").await.unwrap();

    let err = world
        .system
        .visibility
        .history_for(OUTSIDER, item.item_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::Forbidden(_)), "got {err:?}");

    let view = world
        .system
        .visibility
        .history_for(AUDITOR, item.item_id)
        .await
        .unwrap();
    assert_eq!(view.title, "Private");
    assert_eq!(view.template_name, "2-stage");
    assert_eq!(view.timeline.events.len(), 2);
    assert_eq!(view.summary.reject_count, 1);
    assert_eq!(view.summary.current_status_display, "Rejected");

    let json = serde_json::to_value(&view).unwrap();
    assert_eq!(json["summary"]["total_duration"], "0 days 0 hours 0 minutes");
}

#[tokio::test]
async fn test_previous_approval_prefers_latest_record_on_timestamp_tie() {
    let world = TestWorld::new();
    let workflow = world.three_stage_pinned().await;
    let stage3 = workflow.stage_by_order(3).unwrap().stage_id;
    let item = world.create(&workflow, "Same instant").await;

    // No clock ticks: both approvals share one timestamp
    let engine = &world.system.engine;
    engine
        .apply(ApplyRequest::new(item.item_id, MANAGER_A, "approve"))
        .await
        .unwrap();
    engine
        .apply(ApplyRequest::new(item.item_id, DIRECTOR_A, "approve"))
        .await
        .unwrap();

    let previous = world
        .system
        .ledger
        .find_previous_approval(item.item_id, stage3, EXECUTIVE)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(previous.actor_id, DIRECTOR_A);

    let item = world.act(item.item_id, EXECUTIVE, "return").await.unwrap();
    assert_eq!(item.status, "returned_to_reviewer");
    assert_eq!(item.current_reviewer_id, Some(DIRECTOR_A));
    assert_eq!(
        item.current_stage_id,
        workflow.stage_by_order(2).map(|s| s.stage_id)
    );

    let last_return = world.system.ledger.last_return(item.item_id).await.unwrap().unwrap();
    assert_eq!(last_return.stage_id, Some(stage3));
    assert_eq!(last_return.next_reviewer_id, Some(DIRECTOR_A));
}

#[tokio::test]
async fn test_ledger_is_append_only_across_actions() {
    let world = TestWorld::new();
    let workflow = world.two_stage().await;
    let item = world.create(&workflow, "Audit").await;

    world.act(item.item_id, MANAGER_A, "approve").await.unwrap();
    let after_first = world.system.ledger.records_for(item.item_id).await.unwrap();
    world.act(item.item_id, DIRECTOR_A, "approve").await.unwrap();
    let after_second = world.system.ledger.records_for(item.item_id).await.unwrap();

    assert_eq!(after_second.len(), after_first.len() + 1);
    assert_eq!(&after_second[..after_first.len()], &after_first[..]);
}
