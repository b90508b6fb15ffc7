//! # Reviewer Resolution
//!
//! Decides who reviews a stage next. Priority chain, first match wins:
//!
//! 1. the requested reviewer, when they hold the stage role (and are the
//!    pinned reviewer, if the stage is pinned)
//! 2. the stage's pinned reviewer
//! 3. the role member with the fewest pending items, lowest user id first
//!
//! Role memberships and workload counts come from TTL caches. A stale entry
//! can only skew load balancing: every candidate's role is re-checked against
//! the directory before it is returned.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::{Clock, TtlCache};
use crate::config::CacheConfig;
use crate::error::Result;
use crate::gateway::{IdentityDirectory, ReviewStore};
use crate::models::Stage;

/// Which rule produced a reviewer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    Requested,
    Pinned,
    Workload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewerSelection {
    pub reviewer_id: i64,
    pub source: SelectionSource,
}

pub struct ReviewerResolver {
    store: Arc<dyn ReviewStore>,
    directory: Arc<dyn IdentityDirectory>,
    /// reviewer id -> pending item count
    workload_cache: TtlCache<i64, i64>,
    /// role id -> member ids, ascending
    role_members_cache: TtlCache<i64, Vec<i64>>,
}

impl std::fmt::Debug for ReviewerResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewerResolver")
            .field("cache_enabled", &self.workload_cache.is_enabled())
            .finish()
    }
}

impl ReviewerResolver {
    pub fn new(
        store: Arc<dyn ReviewStore>,
        directory: Arc<dyn IdentityDirectory>,
        cache_config: &CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (workload_cache, role_members_cache) = if cache_config.enabled {
            (
                TtlCache::new("workload", cache_config.workload_ttl(), Arc::clone(&clock)),
                TtlCache::new(
                    "role_members",
                    cache_config.role_membership_ttl(),
                    Arc::clone(&clock),
                ),
            )
        } else {
            (
                TtlCache::disabled("workload", Arc::clone(&clock)),
                TtlCache::disabled("role_members", clock),
            )
        };

        Self {
            store,
            directory,
            workload_cache,
            role_members_cache,
        }
    }

    /// Reviewer for `stage`, or `None` when nobody is eligible
    pub async fn resolve(
        &self,
        stage: &Stage,
        requested_reviewer: Option<i64>,
        exclude_actor_id: Option<i64>,
    ) -> Result<Option<i64>> {
        Ok(self
            .select(stage, requested_reviewer, exclude_actor_id)
            .await?
            .map(|selection| selection.reviewer_id))
    }

    /// Like [`resolve`](Self::resolve), also reporting which rule matched
    pub async fn select(
        &self,
        stage: &Stage,
        requested_reviewer: Option<i64>,
        exclude_actor_id: Option<i64>,
    ) -> Result<Option<ReviewerSelection>> {
        if let Some(requested) = requested_reviewer {
            let pinned_ok = stage.pinned_reviewer_id.is_none_or(|p| p == requested);
            if pinned_ok && self.holds_role(requested, stage.required_role_id).await? {
                debug!(stage_id = stage.stage_id, reviewer_id = requested, "Using requested reviewer");
                return Ok(Some(ReviewerSelection {
                    reviewer_id: requested,
                    source: SelectionSource::Requested,
                }));
            }
            debug!(
                stage_id = stage.stage_id,
                reviewer_id = requested,
                "Requested reviewer is not eligible for stage, ignoring"
            );
        }

        if let Some(pinned) = stage.pinned_reviewer_id {
            if self.holds_role(pinned, stage.required_role_id).await? {
                return Ok(Some(ReviewerSelection {
                    reviewer_id: pinned,
                    source: SelectionSource::Pinned,
                }));
            }
            warn!(
                stage_id = stage.stage_id,
                reviewer_id = pinned,
                role_id = stage.required_role_id,
                "Pinned reviewer no longer holds the stage role"
            );
            return Ok(None);
        }

        self.least_loaded(stage, exclude_actor_id).await
    }

    async fn least_loaded(
        &self,
        stage: &Stage,
        exclude_actor_id: Option<i64>,
    ) -> Result<Option<ReviewerSelection>> {
        let candidates: Vec<i64> = self
            .role_members(stage.required_role_id)
            .await?
            .into_iter()
            .filter(|id| Some(*id) != exclude_actor_id)
            .collect();

        if candidates.is_empty() {
            debug!(stage_id = stage.stage_id, role_id = stage.required_role_id, "No candidates for stage");
            return Ok(None);
        }

        let workloads = self.workloads(&candidates).await?;
        let mut ranked: Vec<(i64, i64)> = candidates
            .iter()
            .map(|id| (workloads.get(id).copied().unwrap_or(0), *id))
            .collect();
        ranked.sort_unstable();

        for (pending, reviewer_id) in ranked {
            if self.holds_role(reviewer_id, stage.required_role_id).await? {
                debug!(
                    stage_id = stage.stage_id,
                    reviewer_id,
                    pending,
                    "Selected least loaded reviewer"
                );
                return Ok(Some(ReviewerSelection {
                    reviewer_id,
                    source: SelectionSource::Workload,
                }));
            }
            warn!(
                reviewer_id,
                role_id = stage.required_role_id,
                "Cached role membership is stale, refreshing"
            );
            self.role_members_cache.invalidate(&stage.required_role_id);
        }

        Ok(None)
    }

    async fn role_members(&self, role_id: i64) -> Result<Vec<i64>> {
        if let Some(members) = self.role_members_cache.get(&role_id) {
            return Ok(members);
        }
        let mut members = self.directory.users_in_role(role_id).await?;
        members.sort_unstable();
        members.dedup();
        self.role_members_cache.insert(role_id, members.clone());
        Ok(members)
    }

    async fn workloads(&self, reviewer_ids: &[i64]) -> Result<HashMap<i64, i64>> {
        let mut counts = HashMap::with_capacity(reviewer_ids.len());
        let mut missing = Vec::new();

        for id in reviewer_ids {
            match self.workload_cache.get(id) {
                Some(count) => {
                    counts.insert(*id, count);
                }
                None => missing.push(*id),
            }
        }

        if !missing.is_empty() {
            let fresh = self.store.count_pending_by_reviewer(&missing).await?;
            for id in missing {
                let count = fresh.get(&id).copied().unwrap_or(0);
                self.workload_cache.insert(id, count);
                counts.insert(id, count);
            }
        }

        Ok(counts)
    }

    async fn holds_role(&self, user_id: i64, role_id: i64) -> Result<bool> {
        Ok(self.directory.roles_of(user_id).await?.contains(&role_id))
    }

    /// Forget a reviewer's cached workload after their assignments change
    pub fn invalidate_workload(&self, reviewer_id: i64) {
        self.workload_cache.invalidate(&reviewer_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::gateway::{InMemoryDirectory, InMemoryStore};
    use crate::models::NewItem;
    use chrono::{Duration, Utc};

    struct Fixture {
        store: Arc<InMemoryStore>,
        directory: Arc<InMemoryDirectory>,
        clock: Arc<ManualClock>,
        resolver: ReviewerResolver,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let directory = Arc::new(InMemoryDirectory::new());
        let clock = Arc::new(ManualClock::default());
        directory.add_role(1, "Reviewer");
        for user in [10, 11, 12] {
            directory.add_user(user, format!("user {user}"));
            directory.assign_role(user, 1);
        }
        let resolver = ReviewerResolver::new(
            store.clone(),
            directory.clone(),
            &CacheConfig::default(),
            clock.clone(),
        );
        Fixture {
            store,
            directory,
            clock,
            resolver,
        }
    }

    fn stage(pinned: Option<i64>) -> Stage {
        Stage {
            stage_id: 1,
            template_id: 1,
            name: "Review".to_string(),
            stage_order: 1,
            required_role_id: 1,
            pinned_reviewer_id: pinned,
        }
    }

    async fn assign_pending(store: &InMemoryStore, reviewer: i64) {
        store
            .add_item(NewItem {
                template_id: 1,
                title: "work".to_string(),
                created_by: 1,
                status: "pending_review_level1".to_string(),
                current_stage_id: Some(1),
                current_reviewer_id: Some(reviewer),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_ties_break_on_lowest_id() {
        let f = fixture();
        let selection = f.resolver.select(&stage(None), None, None).await.unwrap().unwrap();
        assert_eq!(selection.reviewer_id, 10);
        assert_eq!(selection.source, SelectionSource::Workload);
    }

    #[tokio::test]
    async fn test_least_loaded_wins_and_actor_excluded() {
        let f = fixture();
        assign_pending(&f.store, 10).await;
        assign_pending(&f.store, 11).await;

        assert_eq!(f.resolver.resolve(&stage(None), None, None).await.unwrap(), Some(12));
        assert_eq!(
            f.resolver.resolve(&stage(None), None, Some(12)).await.unwrap(),
            Some(10)
        );
    }

    #[tokio::test]
    async fn test_requested_reviewer_needs_role() {
        let f = fixture();
        f.directory.add_user(99, "outsider");
        assert_eq!(
            f.resolver.resolve(&stage(None), Some(11), None).await.unwrap(),
            Some(11)
        );
        assert_eq!(
            f.resolver.resolve(&stage(None), Some(99), None).await.unwrap(),
            Some(10)
        );
    }

    #[tokio::test]
    async fn test_pinned_reviewer_beats_workload() {
        let f = fixture();
        let selection = f
            .resolver
            .select(&stage(Some(12)), Some(11), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(selection.reviewer_id, 12);
        assert_eq!(selection.source, SelectionSource::Pinned);
    }

    #[tokio::test]
    async fn test_workload_cache_is_stale_until_ttl() {
        let f = fixture();
        assert_eq!(f.resolver.resolve(&stage(None), None, None).await.unwrap(), Some(10));

        assign_pending(&f.store, 10).await;
        // Cached count for 10 is still zero
        assert_eq!(f.resolver.resolve(&stage(None), None, None).await.unwrap(), Some(10));

        f.clock.advance(Duration::seconds(31));
        assert_eq!(f.resolver.resolve(&stage(None), None, None).await.unwrap(), Some(11));
    }

    #[tokio::test]
    async fn test_stale_role_membership_is_reverified() {
        let f = fixture();
        assert_eq!(f.resolver.resolve(&stage(None), None, None).await.unwrap(), Some(10));
        assert_eq!(f.directory.role_member_lookups(), 1);

        f.directory.revoke_role(10, 1);
        assert_eq!(f.resolver.resolve(&stage(None), None, None).await.unwrap(), Some(11));
    }

    #[tokio::test]
    async fn test_no_members_yields_none() {
        let f = fixture();
        let mut empty = stage(None);
        empty.required_role_id = 2;
        assert_eq!(f.resolver.resolve(&empty, None, None).await.unwrap(), None);
    }
}
