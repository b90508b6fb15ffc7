//! Eligibility guards.
//!
//! Each guard checks one precondition of acting on an item. The chain runs in
//! a fixed order so the first failing rule determines the error kind. The
//! transition engine enforces the chain; the visibility projection evaluates
//! the same chain read-only to list available actions.

use std::collections::HashSet;

use super::events::ReviewAction;
use super::states::ReviewStatus;
use crate::error::{ReviewError, Result};
use crate::models::{Item, Stage};

/// Everything a guard may look at
#[derive(Debug, Clone, Copy)]
pub struct ReviewContext<'a> {
    pub item: &'a Item,
    /// Stage referenced by `item.current_stage_id`, if any
    pub stage: Option<&'a Stage>,
    pub actor_id: i64,
    pub actor_roles: &'a HashSet<i64>,
    pub action: &'a ReviewAction,
}

impl ReviewContext<'_> {
    pub fn status(&self) -> ReviewStatus {
        ReviewStatus::from(self.item.status.as_str())
    }

    /// Creator resubmitting an item returned to them; no stage is involved
    pub fn is_creator_resubmit(&self) -> bool {
        *self.action == ReviewAction::Resubmit && self.status() == ReviewStatus::ReturnedToCreator
    }
}

pub trait ReviewGuard: Send + Sync {
    fn check(&self, ctx: &ReviewContext<'_>) -> Result<()>;

    /// Get a description of this guard for logging
    fn description(&self) -> &'static str;
}

/// Actor must be the current reviewer, or the creator resubmitting
pub struct ParticipantGuard;

impl ReviewGuard for ParticipantGuard {
    fn check(&self, ctx: &ReviewContext<'_>) -> Result<()> {
        let eligible = if ctx.is_creator_resubmit() {
            ctx.item.created_by == ctx.actor_id
        } else {
            ctx.item.current_reviewer_id == Some(ctx.actor_id)
        };

        if eligible {
            Ok(())
        } else {
            Err(ReviewError::forbidden(format!(
                "User {} is not the current reviewer of item {}",
                ctx.actor_id, ctx.item.item_id
            )))
        }
    }

    fn description(&self) -> &'static str {
        "Actor must be the current reviewer or the creator of a returned item"
    }
}

/// Returned items accept only resubmit; resubmit needs a returned item
pub struct ReturnedStatusGuard;

impl ReviewGuard for ReturnedStatusGuard {
    fn check(&self, ctx: &ReviewContext<'_>) -> Result<()> {
        let returned = ctx.status().is_returned();
        let resubmit = *ctx.action == ReviewAction::Resubmit;
        match (returned, resubmit) {
            (true, true) | (false, false) => Ok(()),
            (false, true) => Err(ReviewError::invalid_state(format!(
                "Item {} cannot be resubmitted from status '{}'",
                ctx.item.item_id, ctx.item.status
            ))),
            (true, false) => Err(ReviewError::invalid_state(format!(
                "Item {} is '{}' and only accepts resubmit, not '{}'",
                ctx.item.item_id, ctx.item.status, ctx.action
            ))),
        }
    }

    fn description(&self) -> &'static str {
        "Returned items accept only resubmit"
    }
}

/// Item must sit at a stage unless the creator is resubmitting
pub struct ReviewableStageGuard;

impl ReviewGuard for ReviewableStageGuard {
    fn check(&self, ctx: &ReviewContext<'_>) -> Result<()> {
        if ctx.is_creator_resubmit() || ctx.stage.is_some() {
            return Ok(());
        }
        Err(ReviewError::invalid_state(format!(
            "Item {} is not reviewable (status '{}')",
            ctx.item.item_id, ctx.item.status
        )))
    }

    fn description(&self) -> &'static str {
        "Item must be at a stage"
    }
}

/// Actor must hold the stage's required role
pub struct StageRoleGuard;

impl ReviewGuard for StageRoleGuard {
    fn check(&self, ctx: &ReviewContext<'_>) -> Result<()> {
        match ctx.stage {
            Some(stage) if !ctx.is_creator_resubmit() => {
                if ctx.actor_roles.contains(&stage.required_role_id) {
                    Ok(())
                } else {
                    Err(ReviewError::forbidden(format!(
                        "User {} does not hold role {} required by stage '{}'",
                        ctx.actor_id, stage.required_role_id, stage.name
                    )))
                }
            }
            _ => Ok(()),
        }
    }

    fn description(&self) -> &'static str {
        "Actor must hold the stage role"
    }
}

/// Pinned stages may only be reviewed by the pinned individual
pub struct PinnedReviewerGuard;

impl ReviewGuard for PinnedReviewerGuard {
    fn check(&self, ctx: &ReviewContext<'_>) -> Result<()> {
        match ctx.stage.and_then(|s| s.pinned_reviewer_id) {
            Some(pinned) if !ctx.is_creator_resubmit() && pinned != ctx.actor_id => {
                Err(ReviewError::forbidden(format!(
                    "Stage is pinned to user {pinned}; user {} may not review it",
                    ctx.actor_id
                )))
            }
            _ => Ok(()),
        }
    }

    fn description(&self) -> &'static str {
        "Actor must be the pinned reviewer"
    }
}

/// Eligibility of the actor is settled before the item's status is examined
static GUARD_CHAIN: [&dyn ReviewGuard; 5] = [
    &ParticipantGuard,
    &StageRoleGuard,
    &PinnedReviewerGuard,
    &ReturnedStatusGuard,
    &ReviewableStageGuard,
];

/// Run every guard in order, failing on the first violation
pub fn check_eligibility(ctx: &ReviewContext<'_>) -> Result<()> {
    for guard in GUARD_CHAIN.iter() {
        if let Err(err) = guard.check(ctx) {
            tracing::debug!(
                item_id = ctx.item.item_id,
                actor_id = ctx.actor_id,
                action = %ctx.action,
                guard = guard.description(),
                "Guard rejected action"
            );
            return Err(err);
        }
    }
    Ok(())
}

pub fn is_eligible(ctx: &ReviewContext<'_>) -> bool {
    check_eligibility(ctx).is_ok()
}
