mod common;

use common::*;
use reviewflow_core::models::{TemplateDefinition, TransitionDefinition};
use reviewflow_core::state_machine::{is_completed, ApplyRequest};
use reviewflow_core::ReviewError;

fn transition(from: i32, action: &str, to: Option<i32>, status: &str) -> TransitionDefinition {
    TransitionDefinition {
        from_order: from,
        action: action.to_string(),
        to_order: to,
        result_status: status.to_string(),
    }
}

#[tokio::test]
async fn test_added_transition_becomes_usable() {
    let world = TestWorld::new();
    let workflow = world.two_stage().await;

    let updated = world
        .system
        .registry
        .add_transitions(
            workflow.template_id(),
            vec![transition(1, "Fast_Track", None, "approved")],
        )
        .await
        .unwrap();
    let stage1 = updated.stage_by_order(1).unwrap().stage_id;
    assert!(updated.transition(stage1, "fast_track").is_some());

    let item = world.create(&updated, "Expedited").await;
    let record = world
        .system
        .engine
        .apply(ApplyRequest::new(item.item_id, MANAGER_A, "fast_track"))
        .await
        .unwrap();
    assert_eq!(record.new_status, "approved");
    assert_eq!(world.item(item.item_id).await.current_stage_id, None);
}

#[tokio::test]
async fn test_transitions_locked_once_items_exist() {
    let world = TestWorld::new();
    let workflow = world.two_stage().await;
    world.create(&workflow, "In flight").await;

    let err = world
        .system
        .registry
        .add_transitions(
            workflow.template_id(),
            vec![transition(2, "escalate", None, "approved")],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::InvalidState(_)), "got {err:?}");
}

#[tokio::test]
async fn test_duplicate_transition_rejected() {
    let world = TestWorld::new();
    let workflow = world.two_stage().await;

    let err = world
        .system
        .registry
        .add_transitions(
            workflow.template_id(),
            vec![transition(1, "APPROVE", Some(2), "pending_review_level2")],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::Validation(_)), "got {err:?}");
}

#[tokio::test]
async fn test_malformed_definitions_rejected() {
    let world = TestWorld::new();
    let registry = &world.system.registry;

    let cases = [
        TemplateDefinition::new("No stages"),
        TemplateDefinition::new("Gap")
            .stage("One", MANAGER_ROLE)
            .stage("Two", DIRECTOR_ROLE)
            .transition(3, "approve", None, "approved"),
        TemplateDefinition::new("Reserved")
            .stage("One", MANAGER_ROLE)
            .transition(1, "resubmit", None, "approved"),
        TemplateDefinition::new("Unknown role").stage("One", 77),
        TemplateDefinition::new("Pinned outsider").pinned_stage("One", MANAGER_ROLE, OUTSIDER),
        TemplateDefinition::new("Blank status")
            .stage("One", MANAGER_ROLE)
            .transition(1, "approve", None, " "),
        TemplateDefinition::new("Terminal status mid-way")
            .stage("One", MANAGER_ROLE)
            .stage("Two", DIRECTOR_ROLE)
            .transition(1, "approve", Some(2), "approved")
            .transition(2, "approve", None, "approved"),
        TemplateDefinition::new("Open-ended finish")
            .stage("One", MANAGER_ROLE)
            .stage("Two", DIRECTOR_ROLE)
            .transition(1, "approve", Some(2), "pending_review_level2")
            .transition(2, "approve", None, "done"),
        TemplateDefinition::new("Advance into returned status")
            .stage("One", MANAGER_ROLE)
            .stage("Two", DIRECTOR_ROLE)
            .transition(1, "approve", Some(2), "returned_to_creator")
            .transition(2, "approve", None, "approved"),
        TemplateDefinition::new("Oversized action")
            .stage("One", MANAGER_ROLE)
            .transition(1, "a".repeat(65), None, "approved"),
    ];

    for definition in cases {
        let name = definition.name.clone();
        let err = registry.publish(definition).await.unwrap_err();
        assert!(matches!(err, ReviewError::Validation(_)), "{name}: got {err:?}");
    }
}

#[tokio::test]
async fn test_completed_flag_matches_position_after_every_step() {
    let world = TestWorld::new();
    let workflow = world
        .system
        .registry
        .publish(
            TemplateDefinition::new("Custom finish")
                .stage("Manager review", MANAGER_ROLE)
                .stage("Director review", DIRECTOR_ROLE)
                .transition(1, "approve", Some(2), "pending_review_level2")
                .transition(2, "sign_off", None, "completed"),
        )
        .await
        .unwrap();
    let item = world.create(&workflow, "Signed contract").await;

    world.tick(5);
    let record = world
        .system
        .engine
        .apply(ApplyRequest::new(item.item_id, MANAGER_A, "approve"))
        .await
        .unwrap();
    assert!(!is_completed(&record));
    assert!(world.item(item.item_id).await.current_stage_id.is_some());

    world.tick(5);
    let record = world
        .system
        .engine
        .apply(ApplyRequest::new(item.item_id, DIRECTOR_A, "sign_off"))
        .await
        .unwrap();
    assert!(is_completed(&record));
    let item = world.item(item.item_id).await;
    assert!(item.is_terminal());
    assert_eq!(item.current_reviewer_id, None);
}
