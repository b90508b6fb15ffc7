//! # Review Record Model
//!
//! Append-only audit ledger entry. A record is written in the same unit of
//! work as the item state it describes and is never updated afterwards; the
//! ledger is the sole source of truth for who acted on an item and when.
//!
//! Maps to the `review_records` table:
//! ```sql
//! CREATE TABLE review_records (
//!   review_id BIGSERIAL PRIMARY KEY,
//!   item_id BIGINT NOT NULL,
//!   actor_id BIGINT NOT NULL,
//!   action VARCHAR NOT NULL,
//!   previous_status VARCHAR NOT NULL,
//!   new_status VARCHAR NOT NULL,
//!   stage_id BIGINT,
//!   next_reviewer_id BIGINT,
//!   comment TEXT,
//!   reviewed_at TIMESTAMPTZ NOT NULL
//! );
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::cmp::Ordering;

use crate::constants::actions;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ReviewRecord {
    pub review_id: i64,
    pub item_id: i64,
    pub actor_id: i64,
    pub action: String,
    pub previous_status: String,
    pub new_status: String,
    /// Stage the item was at when the action was taken
    pub stage_id: Option<i64>,
    /// Reviewer assigned as a result of the action
    pub next_reviewer_id: Option<i64>,
    pub comment: Option<String>,
    pub reviewed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReviewRecord {
    pub item_id: i64,
    pub actor_id: i64,
    pub action: String,
    pub previous_status: String,
    pub new_status: String,
    pub stage_id: Option<i64>,
    pub next_reviewer_id: Option<i64>,
    pub comment: Option<String>,
    pub reviewed_at: DateTime<Utc>,
}

impl ReviewRecord {
    pub fn is_approval(&self) -> bool {
        self.action == actions::APPROVE
    }

    pub fn is_return(&self) -> bool {
        self.action == actions::RETURN
    }

    /// Ledger order: timestamp, then record id
    pub fn chronological(a: &ReviewRecord, b: &ReviewRecord) -> Ordering {
        a.reviewed_at
            .cmp(&b.reviewed_at)
            .then(a.review_id.cmp(&b.review_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(id: i64, at: DateTime<Utc>) -> ReviewRecord {
        ReviewRecord {
            review_id: id,
            item_id: 1,
            actor_id: 2,
            action: "approve".to_string(),
            previous_status: "pending_review_level1".to_string(),
            new_status: "pending_review_level2".to_string(),
            stage_id: Some(1),
            next_reviewer_id: Some(3),
            comment: None,
            reviewed_at: at,
        }
    }

    #[test]
    fn test_chronological_ordering_breaks_ties_by_id() {
        let t0 = Utc::now();
        let mut records = vec![
            record(3, t0),
            record(1, t0 + Duration::seconds(5)),
            record(2, t0),
        ];
        records.sort_by(ReviewRecord::chronological);
        let ids: Vec<i64> = records.iter().map(|r| r.review_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }
}
