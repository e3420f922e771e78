use std::sync::Arc;

use crate::db::ItemStore;
use crate::error::AppResult;
use crate::identifier::IdentifierHasher;
use crate::models::{Item, ItemType};

/// Finds an existing report of the opposite type carrying the same identifier.
///
/// The candidate pool is every active opposite-type item in the same college,
/// narrowed by lookup token when one is configured and capped at `pool_limit`.
/// Each candidate costs one Argon2 verification; the first success wins.
#[derive(Clone)]
pub struct IdentifierMatcher {
    store: Arc<dyn ItemStore>,
    hasher: IdentifierHasher,
    pool_limit: i64,
}

impl IdentifierMatcher {
    pub fn new(store: Arc<dyn ItemStore>, hasher: IdentifierHasher, pool_limit: i64) -> Self {
        Self {
            store,
            hasher,
            pool_limit,
        }
    }

    /// `normalized` must already be normalized; an empty value disables matching.
    pub async fn find_match(
        &self,
        normalized: &str,
        new_report_type: ItemType,
        college: &str,
    ) -> AppResult<Option<Item>> {
        if normalized.is_empty() {
            return Ok(None);
        }

        let token = self.hasher.lookup_token(normalized);
        let candidates = self
            .store
            .match_candidates(
                new_report_type.opposite(),
                college,
                token.as_deref(),
                self.pool_limit,
            )
            .await?;

        tracing::debug!(
            "Identifier match: college={}, type={}, candidates={}",
            college,
            new_report_type.opposite(),
            candidates.len()
        );

        for candidate in candidates {
            let Some(stored_hash) = candidate.identifier_hash.clone() else {
                continue;
            };
            match self
                .hasher
                .verify_blocking(normalized.to_string(), stored_hash)
                .await
            {
                Ok(true) => return Ok(Some(candidate)),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("Skipping candidate {} during match: {}", candidate.id, e);
                }
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryItemStore;
    use crate::identifier::{normalize, test_hasher};
    use crate::models::{ItemStatus, NewItem, StatusChange, NOT_SCANNED};
    use chrono::Utc;

    async fn seed(
        store: &MemoryItemStore,
        hasher: &IdentifierHasher,
        item_type: ItemType,
        college: &str,
        raw: &str,
    ) -> Item {
        let normalized = normalize(raw);
        store
            .insert(NewItem {
                name: "Phone".into(),
                description: String::new(),
                location: "Library".into(),
                college: college.into(),
                contact: String::new(),
                item_type,
                reporter_email: "owner@example.edu".into(),
                image_url: None,
                ai_category: NOT_SCANNED.into(),
                identifier_hash: Some(hasher.hash(&normalized).unwrap()),
                identifier_token: hasher.lookup_token(&normalized),
                created_at: Utc::now(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_matches_opposite_type_same_college() {
        let store = Arc::new(MemoryItemStore::new());
        let hasher = test_hasher(None);
        let found = seed(&store, &hasher, ItemType::Found, "X", "123456789012345").await;
        seed(&store, &hasher, ItemType::Lost, "X", "123456789012345").await;
        seed(&store, &hasher, ItemType::Found, "Y", "123456789012345").await;

        let matcher = IdentifierMatcher::new(store.clone(), hasher, 50);
        let hit = matcher
            .find_match(&normalize("123-456-789-012-345"), ItemType::Lost, "X")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.id, found.id);
        assert_eq!(hit.item_type, ItemType::Found);
        assert_eq!(hit.college, "X");
    }

    #[tokio::test]
    async fn test_ignores_non_active_candidates() {
        let store = Arc::new(MemoryItemStore::new());
        let hasher = test_hasher(None);
        let found = seed(&store, &hasher, ItemType::Found, "X", "123456789012345").await;
        store
            .compare_and_set_status(
                found.id,
                ItemStatus::Active,
                &StatusChange {
                    status: ItemStatus::Recovered,
                    feedback: None,
                    police_case: None,
                },
            )
            .await
            .unwrap();

        let matcher = IdentifierMatcher::new(store.clone(), hasher, 50);
        assert!(matcher
            .find_match("123456789012345", ItemType::Lost, "X")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_no_match_for_different_identifier() {
        let store = Arc::new(MemoryItemStore::new());
        let hasher = test_hasher(Some("token-secret"));
        seed(&store, &hasher, ItemType::Found, "X", "123456789012345").await;

        let matcher = IdentifierMatcher::new(store.clone(), hasher, 50);
        assert!(matcher
            .find_match("999999999999999", ItemType::Lost, "X")
            .await
            .unwrap()
            .is_none());
        assert!(matcher
            .find_match("", ItemType::Lost, "X")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_corrupt_hash_is_skipped() {
        let store = Arc::new(MemoryItemStore::new());
        let hasher = test_hasher(None);
        let valid = seed(&store, &hasher, ItemType::Found, "X", "123456789012345").await;
        // Newer, so it is checked first.
        store
            .insert(NewItem {
                name: "Tablet".into(),
                description: String::new(),
                location: "Library".into(),
                college: "X".into(),
                contact: String::new(),
                item_type: ItemType::Found,
                reporter_email: "other@example.edu".into(),
                image_url: None,
                ai_category: NOT_SCANNED.into(),
                identifier_hash: Some("not-a-phc-string".into()),
                identifier_token: None,
                created_at: Utc::now() + chrono::Duration::minutes(1),
            })
            .await
            .unwrap();

        let matcher = IdentifierMatcher::new(store.clone(), hasher, 50);
        let hit = matcher
            .find_match("123456789012345", ItemType::Lost, "X")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.id, valid.id);
    }

    #[tokio::test]
    async fn test_token_prefilter_still_confirms() {
        let store = Arc::new(MemoryItemStore::new());
        let hasher = test_hasher(Some("token-secret"));
        let found = seed(&store, &hasher, ItemType::Found, "X", "ab12cd34ef").await;

        let matcher = IdentifierMatcher::new(store.clone(), hasher, 50);
        let hit = matcher
            .find_match("ab12cd34ef", ItemType::Lost, "X")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.id, found.id);
    }
}
