// Item persistence: trait plus Postgres and in-memory backends

pub mod items;
pub mod memory;
pub mod pool;

pub use items::PgItemStore;
pub use memory::MemoryItemStore;
pub use pool::{create_pool, run_migrations};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Item, ItemFilter, ItemStatus, ItemType, NewItem, StatusChange};

/// Upper bound for any listing query.
pub const MAX_LIST_LIMIT: i64 = 200;

/// Persisted collection of item reports.
#[tonic::async_trait]
pub trait ItemStore: Send + Sync {
    /// Persist a new report with a fresh id and `active` status.
    async fn insert(&self, item: NewItem) -> AppResult<Item>;

    async fn get(&self, id: Uuid) -> AppResult<Option<Item>>;

    /// Newest first, at most `filter.limit` (clamped to [`MAX_LIST_LIMIT`]).
    async fn list(&self, filter: &ItemFilter) -> AppResult<Vec<Item>>;

    /// Active items of `item_type` in `college` that carry an identifier hash.
    /// With a token, rows holding a different token are skipped; rows without
    /// a token stay eligible.
    async fn match_candidates(
        &self,
        item_type: ItemType,
        college: &str,
        token: Option<&str>,
        limit: i64,
    ) -> AppResult<Vec<Item>>;

    /// Lost+active items created at or before `created_before`, plus every
    /// escalated item.
    async fn escalation_pool(
        &self,
        created_before: DateTime<Utc>,
        college: Option<&str>,
    ) -> AppResult<Vec<Item>>;

    /// Apply `change` only if the stored status still equals `expected`.
    /// `None` when the item is missing or its status moved on.
    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: ItemStatus,
        change: &StatusChange,
    ) -> AppResult<Option<Item>>;

    async fn case_id_exists(&self, case_id: &str) -> AppResult<bool>;

    /// `true` when a row was removed.
    async fn delete(&self, id: Uuid) -> AppResult<bool>;

    /// Remove every item created before `cutoff`, returning what was removed.
    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Item>>;
}

pub(crate) fn clamp_limit(limit: i64) -> i64 {
    if limit <= 0 {
        MAX_LIST_LIMIT
    } else {
        limit.min(MAX_LIST_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(0), MAX_LIST_LIMIT);
        assert_eq!(clamp_limit(-5), MAX_LIST_LIMIT);
        assert_eq!(clamp_limit(20), 20);
        assert_eq!(clamp_limit(10_000), MAX_LIST_LIMIT);
    }
}
