use std::sync::Arc;

use uuid::Uuid;

use crate::db::ItemStore;
use crate::error::{AppError, AppResult};
use crate::identifier::{normalize, IdentifierHasher};

/// Preview shown when the item has no stored identifier.
pub const NO_IDENTIFIER_PREVIEW: &str = "NOT_REGISTERED";

const PREVIEW_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimVerification {
    pub matched: bool,
    pub stored_hash_preview: String,
}

/// Leading characters of the PHC string (algorithm and parameters only).
fn hash_preview(stored_hash: Option<&str>) -> String {
    match stored_hash {
        Some(hash) => {
            let head: String = hash.chars().take(PREVIEW_LEN).collect();
            format!("{}…", head)
        }
        None => NO_IDENTIFIER_PREVIEW.to_string(),
    }
}

/// Read-only check of a claimant's identifier against one stored item.
#[derive(Clone)]
pub struct ClaimVerifier {
    store: Arc<dyn ItemStore>,
    hasher: IdentifierHasher,
}

impl ClaimVerifier {
    pub fn new(store: Arc<dyn ItemStore>, hasher: IdentifierHasher) -> Self {
        Self { store, hasher }
    }

    pub async fn verify_claim(&self, item_id: Uuid, raw_identifier: &str) -> AppResult<ClaimVerification> {
        let item = self
            .store
            .get(item_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Item not found".to_string()))?;

        let stored_hash_preview = hash_preview(item.identifier_hash.as_deref());
        let normalized = normalize(raw_identifier);

        let matched = match item.identifier_hash {
            Some(stored_hash) if !normalized.is_empty() => {
                self.hasher.verify_blocking(normalized, stored_hash).await?
            }
            _ => false,
        };

        tracing::info!("Claim verification: item={}, matched={}", item_id, matched);

        Ok(ClaimVerification {
            matched,
            stored_hash_preview,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryItemStore;
    use crate::identifier::test_hasher;
    use crate::models::{ItemType, NewItem, NOT_SCANNED};
    use chrono::Utc;

    async fn setup(identifier: Option<&str>) -> (ClaimVerifier, Uuid) {
        let store = Arc::new(MemoryItemStore::new());
        let hasher = test_hasher(None);
        let item = store
            .insert(NewItem {
                name: "Phone".into(),
                description: String::new(),
                location: "Gym".into(),
                college: "X".into(),
                contact: String::new(),
                item_type: ItemType::Found,
                reporter_email: "finder@example.edu".into(),
                image_url: None,
                ai_category: NOT_SCANNED.into(),
                identifier_hash: identifier.map(|i| hasher.hash(i).unwrap()),
                identifier_token: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        (ClaimVerifier::new(store, hasher), item.id)
    }

    #[tokio::test]
    async fn test_matching_identifier_with_punctuation() {
        let (verifier, id) = setup(Some("123456789012345")).await;
        let result = verifier.verify_claim(id, "123-456-789-012-345").await.unwrap();
        assert!(result.matched);
        assert!(result.stored_hash_preview.starts_with("$argon2id$"));
        assert!(!result.stored_hash_preview.contains("123456789012345"));
    }

    #[tokio::test]
    async fn test_wrong_identifier_is_not_an_error() {
        let (verifier, id) = setup(Some("123456789012345")).await;
        let result = verifier.verify_claim(id, "000000000000000").await.unwrap();
        assert!(!result.matched);
    }

    #[tokio::test]
    async fn test_item_without_identifier() {
        let (verifier, id) = setup(None).await;
        let result = verifier.verify_claim(id, "123456789012345").await.unwrap();
        assert_eq!(
            result,
            ClaimVerification {
                matched: false,
                stored_hash_preview: NO_IDENTIFIER_PREVIEW.to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_missing_item() {
        let (verifier, _) = setup(None).await;
        assert!(matches!(
            verifier.verify_claim(Uuid::new_v4(), "123").await,
            Err(AppError::NotFound(_))
        ));
    }
}
