use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{clamp_limit, ItemStore};
use crate::error::AppResult;
use crate::models::{Item, ItemFilter, ItemStatus, ItemType, NewItem, StatusChange};

/// In-process store for local development and tests.
#[derive(Default)]
pub struct MemoryItemStore {
    items: RwLock<HashMap<Uuid, Item>>,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn newest_first(mut items: Vec<Item>) -> Vec<Item> {
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items
    }
}

#[tonic::async_trait]
impl ItemStore for MemoryItemStore {
    async fn insert(&self, item: NewItem) -> AppResult<Item> {
        let record = Item {
            id: Uuid::new_v4(),
            name: item.name,
            description: item.description,
            location: item.location,
            college: item.college,
            contact: item.contact,
            item_type: item.item_type,
            reporter_email: item.reporter_email,
            image_url: item.image_url,
            ai_category: item.ai_category,
            identifier_hash: item.identifier_hash,
            identifier_token: item.identifier_token,
            status: ItemStatus::Active,
            feedback: None,
            police_case: None,
            created_at: item.created_at,
            updated_at: item.created_at,
        };
        self.items.write().await.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Item>> {
        Ok(self.items.read().await.get(&id).cloned())
    }

    async fn list(&self, filter: &ItemFilter) -> AppResult<Vec<Item>> {
        let items = self.items.read().await;
        let matching = items
            .values()
            .filter(|i| filter.item_type.map_or(true, |t| i.item_type == t))
            .filter(|i| filter.status.map_or(true, |s| i.status == s))
            .filter(|i| filter.college.as_ref().map_or(true, |c| &i.college == c))
            .cloned()
            .collect();

        let mut sorted = Self::newest_first(matching);
        sorted.truncate(clamp_limit(filter.limit) as usize);
        Ok(sorted)
    }

    async fn match_candidates(
        &self,
        item_type: ItemType,
        college: &str,
        token: Option<&str>,
        limit: i64,
    ) -> AppResult<Vec<Item>> {
        let items = self.items.read().await;
        let matching = items
            .values()
            .filter(|i| i.item_type == item_type && i.status == ItemStatus::Active)
            .filter(|i| i.college == college && i.identifier_hash.is_some())
            .filter(|i| match (token, i.identifier_token.as_deref()) {
                (Some(wanted), Some(stored)) => wanted == stored,
                _ => true,
            })
            .cloned()
            .collect();

        let mut sorted = Self::newest_first(matching);
        sorted.truncate(limit.max(0) as usize);
        Ok(sorted)
    }

    async fn escalation_pool(
        &self,
        created_before: DateTime<Utc>,
        college: Option<&str>,
    ) -> AppResult<Vec<Item>> {
        let items = self.items.read().await;
        let mut pool: Vec<Item> = items
            .values()
            .filter(|i| {
                (i.item_type == ItemType::Lost
                    && i.status == ItemStatus::Active
                    && i.created_at <= created_before)
                    || i.status == ItemStatus::Escalated
            })
            .filter(|i| college.map_or(true, |c| i.college == c))
            .cloned()
            .collect();
        pool.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(pool)
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: ItemStatus,
        change: &StatusChange,
    ) -> AppResult<Option<Item>> {
        let mut items = self.items.write().await;
        let Some(item) = items.get_mut(&id) else {
            return Ok(None);
        };
        if item.status != expected {
            return Ok(None);
        }

        item.status = change.status;
        if let Some(ref feedback) = change.feedback {
            item.feedback = Some(feedback.clone());
        }
        if item.police_case.is_none() {
            item.police_case = change.police_case.clone();
        }
        item.updated_at = Utc::now();
        Ok(Some(item.clone()))
    }

    async fn case_id_exists(&self, case_id: &str) -> AppResult<bool> {
        Ok(self
            .items
            .read()
            .await
            .values()
            .any(|i| i.police_case.as_ref().is_some_and(|c| c.case_id == case_id)))
    }

    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        Ok(self.items.write().await.remove(&id).is_some())
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Item>> {
        let mut items = self.items.write().await;
        let expired: Vec<Uuid> = items
            .values()
            .filter(|i| i.created_at < cutoff)
            .map(|i| i.id)
            .collect();
        Ok(expired.iter().filter_map(|id| items.remove(id)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PoliceCase, NOT_SCANNED};
    use chrono::Duration;

    fn new_item(item_type: ItemType, college: &str, hash: Option<&str>) -> NewItem {
        NewItem {
            name: "Phone".into(),
            description: String::new(),
            location: "Library".into(),
            college: college.into(),
            contact: String::new(),
            item_type,
            reporter_email: "owner@example.edu".into(),
            image_url: None,
            ai_category: NOT_SCANNED.into(),
            identifier_hash: hash.map(str::to_string),
            identifier_token: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_starts_active() {
        let store = MemoryItemStore::new();
        let item = store.insert(new_item(ItemType::Lost, "X", None)).await.unwrap();
        assert_eq!(item.status, ItemStatus::Active);
        assert_eq!(store.get(item.id).await.unwrap().unwrap().name, "Phone");
    }

    #[tokio::test]
    async fn test_match_candidates_filters_pool() {
        let store = MemoryItemStore::new();
        let hit = store
            .insert(new_item(ItemType::Found, "X", Some("h")))
            .await
            .unwrap();
        store.insert(new_item(ItemType::Lost, "X", Some("h"))).await.unwrap();
        store.insert(new_item(ItemType::Found, "Y", Some("h"))).await.unwrap();
        store.insert(new_item(ItemType::Found, "X", None)).await.unwrap();

        let candidates = store
            .match_candidates(ItemType::Found, "X", None, 10)
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, hit.id);
    }

    #[tokio::test]
    async fn test_match_candidates_token_prefilter() {
        let store = MemoryItemStore::new();
        let mut tokened = new_item(ItemType::Found, "X", Some("h"));
        tokened.identifier_token = Some("tok-a".into());
        store.insert(tokened).await.unwrap();
        let mut other = new_item(ItemType::Found, "X", Some("h"));
        other.identifier_token = Some("tok-b".into());
        store.insert(other).await.unwrap();
        store.insert(new_item(ItemType::Found, "X", Some("h"))).await.unwrap();

        let candidates = store
            .match_candidates(ItemType::Found, "X", Some("tok-a"), 10)
            .await
            .unwrap();
        assert_eq!(candidates.len(), 2);
        assert!(candidates
            .iter()
            .all(|c| c.identifier_token.as_deref() != Some("tok-b")));
    }

    #[tokio::test]
    async fn test_compare_and_set_requires_expected_status() {
        let store = MemoryItemStore::new();
        let item = store.insert(new_item(ItemType::Lost, "X", None)).await.unwrap();
        let change = StatusChange {
            status: ItemStatus::Recovered,
            feedback: Some("thanks".into()),
            police_case: None,
        };

        let updated = store
            .compare_and_set_status(item.id, ItemStatus::Active, &change)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, ItemStatus::Recovered);
        assert_eq!(updated.feedback.as_deref(), Some("thanks"));

        // Second writer with a stale expectation loses.
        assert!(store
            .compare_and_set_status(item.id, ItemStatus::Active, &change)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .compare_and_set_status(Uuid::new_v4(), ItemStatus::Active, &change)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_case_id_exists() {
        let store = MemoryItemStore::new();
        let item = store.insert(new_item(ItemType::Lost, "X", None)).await.unwrap();
        let change = StatusChange {
            status: ItemStatus::Verified,
            feedback: None,
            police_case: Some(PoliceCase {
                case_id: "LF-TEST0001-abc".into(),
                verified_at: Utc::now(),
            }),
        };
        store
            .compare_and_set_status(item.id, ItemStatus::Active, &change)
            .await
            .unwrap();
        assert!(store.case_id_exists("LF-TEST0001-abc").await.unwrap());
        assert!(!store.case_id_exists("LF-OTHER000-abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_created_before() {
        let store = MemoryItemStore::new();
        let mut old = new_item(ItemType::Lost, "X", None);
        old.created_at = Utc::now() - Duration::days(31);
        let old = store.insert(old).await.unwrap();
        let fresh = store.insert(new_item(ItemType::Lost, "X", None)).await.unwrap();

        let removed = store
            .delete_created_before(Utc::now() - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, old.id);
        assert!(store.get(old.id).await.unwrap().is_none());
        assert!(store.get(fresh.id).await.unwrap().is_some());
        assert!(store.delete(fresh.id).await.unwrap());
        assert!(!store.delete(fresh.id).await.unwrap());
    }
}
