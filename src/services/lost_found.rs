use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::claim_verifier::{ClaimVerification, ClaimVerifier};
use super::escalation::EscalationPolicy;
use super::matcher::IdentifierMatcher;
use super::transitions::StatusTransitionManager;
use crate::classifier::Classifier;
use crate::db::ItemStore;
use crate::error::{AppError, AppResult};
use crate::identifier::{parse_identifier, IdentifierHasher};
use crate::middleware::AuthenticatedUser;
use crate::models::{Item, ItemFilter, ItemType, NewItem, NOT_SCANNED};
use crate::notifier::{Notice, Notifier};
use crate::storage::{image_key, object_key, StorageBackend};

/// Photo attached to a report.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub data: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Clone)]
pub struct ReportInput {
    pub item_type: String,
    pub name: String,
    pub description: String,
    pub location: String,
    pub college: String,
    pub contact: String,
    /// Raw identifier as typed; empty disables matching.
    pub identifier: String,
    pub image: Option<ImageUpload>,
}

#[derive(Debug, Clone)]
pub struct ReportOutcome {
    pub item: Item,
    pub ai_category: String,
    /// First opposite-type report whose identifier verified, if any.
    pub matched: Option<Item>,
}

impl ReportOutcome {
    pub fn match_detected(&self) -> bool {
        self.matched.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimOutcome {
    pub matched: bool,
    pub reporter_notified: bool,
}

/// Tunables for [`LostFoundService`].
#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    pub escalation: EscalationPolicy,
    pub retention: Duration,
    pub match_pool_limit: i64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            escalation: EscalationPolicy::default(),
            retention: Duration::days(30),
            match_pool_limit: 200,
        }
    }
}

struct StoredImage {
    key: String,
    url: String,
    category: String,
}

/// Boundary operations of the lost-and-found core.
pub struct LostFoundService {
    store: Arc<dyn ItemStore>,
    hasher: IdentifierHasher,
    matcher: IdentifierMatcher,
    verifier: ClaimVerifier,
    transitions: StatusTransitionManager,
    policy: EscalationPolicy,
    retention: Duration,
    storage: Option<Arc<dyn StorageBackend>>,
    classifier: Arc<dyn Classifier>,
    notifier: Arc<dyn Notifier>,
}

fn required(value: &str, field: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

impl LostFoundService {
    pub fn new(
        store: Arc<dyn ItemStore>,
        hasher: IdentifierHasher,
        settings: ServiceSettings,
        storage: Option<Arc<dyn StorageBackend>>,
        classifier: Arc<dyn Classifier>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            matcher: IdentifierMatcher::new(
                store.clone(),
                hasher.clone(),
                settings.match_pool_limit,
            ),
            verifier: ClaimVerifier::new(store.clone(), hasher.clone()),
            transitions: StatusTransitionManager::new(store.clone(), settings.escalation),
            policy: settings.escalation,
            retention: settings.retention,
            store,
            hasher,
            storage,
            classifier,
            notifier,
        }
    }

    async fn load(&self, id: Uuid) -> AppResult<Item> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Item not found".to_string()))
    }

    /// Upload the photo and ask the classifier for a label. Classification
    /// failures fall back to [`NOT_SCANNED`].
    async fn store_image(&self, image: &ImageUpload) -> AppResult<StoredImage> {
        let storage = self.storage.as_ref().ok_or_else(|| {
            AppError::InvalidInput("Image uploads are not enabled".to_string())
        })?;

        let key = image_key(Uuid::new_v4(), &image.content_type);
        let url = storage
            .upload(&key, &image.data, &image.content_type)
            .await?;

        let category = match self
            .classifier
            .classify(&image.data, &image.content_type)
            .await
        {
            Ok(label) => label,
            Err(e) => {
                tracing::warn!("Image classification failed, leaving unscanned: {}", e);
                NOT_SCANNED.to_string()
            }
        };

        Ok(StoredImage { key, url, category })
    }

    /// Persist a report, then look for an opposite-type report with the same
    /// identifier. Matching problems never fail the submission.
    pub async fn submit_report(
        &self,
        reporter: &AuthenticatedUser,
        input: ReportInput,
    ) -> AppResult<ReportOutcome> {
        let item_type: ItemType = input.item_type.trim().parse()?;
        let name = required(&input.name, "name")?;
        let college = required(&input.college, "college")?;
        let identifier = parse_identifier(&input.identifier)?;

        let (identifier_hash, identifier_token) = match identifier.as_deref() {
            Some(normalized) => (
                Some(self.hasher.hash_blocking(normalized.to_string()).await?),
                self.hasher.lookup_token(normalized),
            ),
            None => (None, None),
        };

        let stored = match input.image.as_ref().filter(|i| !i.data.is_empty()) {
            Some(image) => Some(self.store_image(image).await?),
            None => None,
        };
        let image_url = stored.as_ref().map(|s| s.url.clone());
        let ai_category = stored
            .as_ref()
            .map_or_else(|| NOT_SCANNED.to_string(), |s| s.category.clone());

        let inserted = self
            .store
            .insert(NewItem {
                name,
                description: input.description.trim().to_string(),
                location: input.location.trim().to_string(),
                college,
                contact: input.contact.trim().to_string(),
                item_type,
                reporter_email: reporter.email.clone(),
                image_url,
                ai_category: ai_category.clone(),
                identifier_hash,
                identifier_token,
                created_at: Utc::now(),
            })
            .await;

        let item = match inserted {
            Ok(item) => item,
            Err(e) => {
                if let (Some(storage), Some(image)) = (self.storage.as_ref(), stored.as_ref()) {
                    if let Err(cleanup) = storage.delete(&image.key).await {
                        tracing::warn!("Failed to remove orphaned image {}: {}", image.key, cleanup);
                    }
                }
                return Err(e);
            }
        };

        tracing::info!(
            "Report submitted: id={}, type={}, college={}, has_identifier={}",
            item.id,
            item.item_type,
            item.college,
            identifier.is_some()
        );

        let matched = match identifier.as_deref() {
            Some(normalized) => match self
                .matcher
                .find_match(normalized, item.item_type, &item.college)
                .await
            {
                Ok(found) => found,
                Err(e) => {
                    tracing::warn!("Identifier matching failed for {}: {}", item.id, e);
                    None
                }
            },
            None => None,
        };

        if let Some(ref other) = matched {
            tracing::info!("Possible match: new={}, existing={}", item.id, other.id);
            self.spawn_notice(
                other.reporter_email.clone(),
                Notice::PossibleMatch {
                    item_id: other.id,
                    item_name: other.name.clone(),
                    matched_item_id: item.id,
                },
            );
        }

        Ok(ReportOutcome {
            item,
            ai_category,
            matched,
        })
    }

    fn spawn_notice(&self, recipient: String, notice: Notice) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&recipient, &notice).await {
                tracing::warn!("Failed to deliver notice: {}", e);
            }
        });
    }

    pub async fn get_item(&self, id: Uuid) -> AppResult<Item> {
        self.load(id).await
    }

    pub async fn list_items(&self, filter: &ItemFilter) -> AppResult<Vec<Item>> {
        self.store.list(filter).await
    }

    /// Items needing police attention at `now`.
    pub async fn list_escalation_candidates(
        &self,
        actor: &AuthenticatedUser,
        now: DateTime<Utc>,
        college: Option<&str>,
    ) -> AppResult<Vec<Item>> {
        actor.require_police()?;
        let pool = self
            .store
            .escalation_pool(self.policy.cutoff(now), college)
            .await?;
        Ok(pool
            .into_iter()
            .filter(|item| self.policy.needs_escalation(item, now))
            .collect())
    }

    pub async fn verify_claim(
        &self,
        item_id: Uuid,
        raw_identifier: &str,
    ) -> AppResult<ClaimVerification> {
        self.verifier.verify_claim(item_id, raw_identifier).await
    }

    /// Verify the claimant's identifier and tell the reporter about the claim.
    pub async fn submit_claim(
        &self,
        claimant: &AuthenticatedUser,
        item_id: Uuid,
        raw_identifier: &str,
        evidence: &str,
    ) -> AppResult<ClaimOutcome> {
        let evidence = required(evidence, "evidence")?;
        let item = self.load(item_id).await?;
        if item.reporter_email == claimant.email {
            return Err(AppError::FailedPrecondition(
                "Cannot claim your own report".to_string(),
            ));
        }

        let verification = self.verifier.verify_claim(item_id, raw_identifier).await?;

        let notice = Notice::ClaimSubmitted {
            item_id,
            item_name: item.name.clone(),
            claimant_email: claimant.email.clone(),
            evidence,
            identifier_matched: verification.matched,
        };
        let reporter_notified = match self.notifier.notify(&item.reporter_email, &notice).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Claim notification for {} failed: {}", item_id, e);
                false
            }
        };

        Ok(ClaimOutcome {
            matched: verification.matched,
            reporter_notified,
        })
    }

    pub async fn toggle_recovered(
        &self,
        actor: &AuthenticatedUser,
        id: Uuid,
        feedback: &str,
    ) -> AppResult<Item> {
        let item = self.load(id).await?;
        actor.require_owner(&item.reporter_email)?;

        let feedback = Some(feedback.trim())
            .filter(|f| !f.is_empty())
            .map(str::to_string);
        self.transitions.toggle_recovered(&item, feedback).await
    }

    pub async fn escalate(&self, actor: &AuthenticatedUser, id: Uuid) -> AppResult<Item> {
        actor.require_police()?;
        self.transitions.escalate(id, Utc::now()).await
    }

    pub async fn police_verify(&self, actor: &AuthenticatedUser, id: Uuid) -> AppResult<Item> {
        actor.require_police()?;
        self.transitions.police_verify(id, Utc::now()).await
    }

    pub async fn delete_item(&self, actor: &AuthenticatedUser, id: Uuid) -> AppResult<()> {
        let item = self.load(id).await?;
        actor.require_owner(&item.reporter_email)?;
        self.transitions.delete(id).await?;
        self.remove_image(&item).await;
        Ok(())
    }

    /// Best effort; a leftover photo never fails the delete.
    async fn remove_image(&self, item: &Item) {
        let (Some(storage), Some(url)) = (self.storage.as_ref(), item.image_url.as_deref()) else {
            return;
        };
        let Some(key) = object_key(url) else {
            tracing::debug!("Image URL for {} has no object key, skipping", item.id);
            return;
        };
        if let Err(e) = storage.delete(key).await {
            tracing::warn!("Failed to delete image for {}: {}", item.id, e);
        }
    }

    /// Remove reports older than the retention window, photos included.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let removed = self
            .store
            .delete_created_before(now - self.retention)
            .await?;
        for item in &removed {
            self.remove_image(item).await;
        }
        if !removed.is_empty() {
            tracing::info!("Retention purge removed {} items", removed.len());
        }
        Ok(removed.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryItemStore;
    use crate::identifier::test_hasher;
    use crate::middleware::Role;
    use crate::models::{ItemStatus, StatusChange};
    use crate::notifier::LogNotifier;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, Notice)>>,
    }

    #[tonic::async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, recipient: &str, notice: &Notice) -> AppResult<()> {
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_string(), notice.clone()));
            Ok(())
        }
    }

    struct FailingNotifier;

    #[tonic::async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _recipient: &str, _notice: &Notice) -> AppResult<()> {
            Err(AppError::Internal("relay down".into()))
        }
    }

    struct FixedClassifier(&'static str);

    #[tonic::async_trait]
    impl Classifier for FixedClassifier {
        async fn classify(&self, _image: &[u8], _content_type: &str) -> AppResult<String> {
            Ok(self.0.to_string())
        }
    }

    struct BrokenClassifier;

    #[tonic::async_trait]
    impl Classifier for BrokenClassifier {
        async fn classify(&self, _image: &[u8], _content_type: &str) -> AppResult<String> {
            Err(AppError::Internal("model offline".into()))
        }
    }

    #[derive(Default)]
    struct FakeStorage {
        uploaded: Mutex<Vec<String>>,
        deleted: Mutex<Vec<String>>,
    }

    #[tonic::async_trait]
    impl StorageBackend for FakeStorage {
        async fn upload(&self, key: &str, _data: &[u8], _content_type: &str) -> AppResult<String> {
            self.uploaded.lock().unwrap().push(key.to_string());
            Ok(format!("https://cdn.example.edu/{}", key))
        }

        async fn delete(&self, key: &str) -> AppResult<()> {
            self.deleted.lock().unwrap().push(key.to_string());
            Ok(())
        }

        fn bucket(&self) -> &str {
            "test"
        }
    }

    /// Wraps the in-memory store and fails selected operations.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryItemStore,
        fail_insert: bool,
        fail_match: bool,
    }

    #[tonic::async_trait]
    impl ItemStore for FlakyStore {
        async fn insert(&self, item: NewItem) -> AppResult<Item> {
            if self.fail_insert {
                return Err(AppError::Storage("insert refused".into()));
            }
            self.inner.insert(item).await
        }

        async fn get(&self, id: Uuid) -> AppResult<Option<Item>> {
            self.inner.get(id).await
        }

        async fn list(&self, filter: &ItemFilter) -> AppResult<Vec<Item>> {
            self.inner.list(filter).await
        }

        async fn match_candidates(
            &self,
            item_type: ItemType,
            college: &str,
            token: Option<&str>,
            limit: i64,
        ) -> AppResult<Vec<Item>> {
            if self.fail_match {
                return Err(AppError::Storage("candidate query failed".into()));
            }
            self.inner
                .match_candidates(item_type, college, token, limit)
                .await
        }

        async fn escalation_pool(
            &self,
            created_before: DateTime<Utc>,
            college: Option<&str>,
        ) -> AppResult<Vec<Item>> {
            self.inner.escalation_pool(created_before, college).await
        }

        async fn compare_and_set_status(
            &self,
            id: Uuid,
            expected: ItemStatus,
            change: &StatusChange,
        ) -> AppResult<Option<Item>> {
            self.inner.compare_and_set_status(id, expected, change).await
        }

        async fn case_id_exists(&self, case_id: &str) -> AppResult<bool> {
            self.inner.case_id_exists(case_id).await
        }

        async fn delete(&self, id: Uuid) -> AppResult<bool> {
            self.inner.delete(id).await
        }

        async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Item>> {
            self.inner.delete_created_before(cutoff).await
        }
    }

    fn service_over(store: Arc<dyn ItemStore>, storage: Arc<FakeStorage>) -> LostFoundService {
        LostFoundService::new(
            store,
            test_hasher(Some("token-secret")),
            ServiceSettings::default(),
            Some(storage),
            Arc::new(FixedClassifier("phone")),
            Arc::new(LogNotifier),
        )
    }

    fn with_photo(mut input: ReportInput) -> ReportInput {
        input.image = Some(ImageUpload {
            data: vec![1, 2, 3],
            content_type: "image/png".into(),
        });
        input
    }

    fn student(email: &str) -> AuthenticatedUser {
        AuthenticatedUser::new(email, Role::Student)
    }

    fn service_with(
        store: Arc<MemoryItemStore>,
        classifier: Arc<dyn Classifier>,
        notifier: Arc<dyn Notifier>,
    ) -> LostFoundService {
        LostFoundService::new(
            store,
            test_hasher(Some("token-secret")),
            ServiceSettings::default(),
            Some(Arc::new(FakeStorage::default())),
            classifier,
            notifier,
        )
    }

    fn service(store: Arc<MemoryItemStore>) -> LostFoundService {
        service_with(store, Arc::new(FixedClassifier("phone")), Arc::new(LogNotifier))
    }

    fn report(item_type: &str, college: &str, identifier: &str) -> ReportInput {
        ReportInput {
            item_type: item_type.into(),
            name: "Black phone".into(),
            description: "Cracked screen".into(),
            location: "Library 2F".into(),
            college: college.into(),
            contact: "555-0100".into(),
            identifier: identifier.into(),
            image: None,
        }
    }

    async fn insert_aged(store: &MemoryItemStore, item_type: ItemType, age: Duration) -> Item {
        store
            .insert(NewItem {
                name: "Bike".into(),
                description: String::new(),
                location: "Gate".into(),
                college: "X".into(),
                contact: String::new(),
                item_type,
                reporter_email: "owner@example.edu".into(),
                image_url: None,
                ai_category: NOT_SCANNED.into(),
                identifier_hash: None,
                identifier_token: None,
                created_at: Utc::now() - age,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_punctuated_identifier_matches_existing_found_report() {
        let store = Arc::new(MemoryItemStore::new());
        let service = service(store.clone());

        let a = service
            .submit_report(&student("finder@example.edu"), report("found", "X", "123456789012345"))
            .await
            .unwrap();
        assert!(!a.match_detected());

        let b = service
            .submit_report(
                &student("owner@example.edu"),
                report("lost", "X", "123-456-789-012-345"),
            )
            .await
            .unwrap();
        assert!(b.match_detected());
        assert_eq!(b.matched.unwrap().id, a.item.id);
    }

    #[tokio::test]
    async fn test_no_match_across_colleges_or_same_type() {
        let store = Arc::new(MemoryItemStore::new());
        let service = service(store.clone());
        let user = student("a@example.edu");

        service
            .submit_report(&user, report("found", "X", "123456789012345"))
            .await
            .unwrap();
        let other_college = service
            .submit_report(&user, report("lost", "Y", "123456789012345"))
            .await
            .unwrap();
        assert!(!other_college.match_detected());
        let same_type = service
            .submit_report(&user, report("found", "X", "123456789012345"))
            .await
            .unwrap();
        assert!(!same_type.match_detected());
    }

    #[tokio::test]
    async fn test_report_without_identifier_skips_matching() {
        let store = Arc::new(MemoryItemStore::new());
        let service = service(store.clone());

        let outcome = service
            .submit_report(&student("a@example.edu"), report("lost", "X", ""))
            .await
            .unwrap();
        assert!(!outcome.match_detected());
        assert!(outcome.item.identifier_hash.is_none());
        assert!(outcome.item.identifier_token.is_none());
        assert_eq!(outcome.ai_category, NOT_SCANNED);
    }

    #[tokio::test]
    async fn test_report_stores_hash_not_plaintext() {
        let store = Arc::new(MemoryItemStore::new());
        let service = service(store.clone());

        let outcome = service
            .submit_report(&student("A@Example.edu"), report("lost", "X", "35-209900-176148-1"))
            .await
            .unwrap();
        let stored = store.get(outcome.item.id).await.unwrap().unwrap();
        let hash = stored.identifier_hash.unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(!hash.contains("352099001761481"));
        assert_eq!(stored.reporter_email, "a@example.edu");
        assert_eq!(stored.status, ItemStatus::Active);
    }

    #[tokio::test]
    async fn test_report_validation() {
        let store = Arc::new(MemoryItemStore::new());
        let service = service(store.clone());
        let user = student("a@example.edu");

        assert!(matches!(
            service.submit_report(&user, report("stolen", "X", "")).await,
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            service.submit_report(&user, report("lost", "  ", "")).await,
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            service.submit_report(&user, report("lost", "X", "12-34")).await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_image_is_stored_and_classified() {
        let store = Arc::new(MemoryItemStore::new());
        let service = service(store.clone());

        let mut input = report("found", "X", "");
        input.image = Some(ImageUpload {
            data: vec![0xff, 0xd8, 0xff],
            content_type: "image/jpeg".into(),
        });
        let outcome = service
            .submit_report(&student("a@example.edu"), input)
            .await
            .unwrap();
        assert_eq!(outcome.ai_category, "phone");
        assert_eq!(outcome.item.ai_category, "phone");
        assert!(outcome
            .item
            .image_url
            .unwrap()
            .starts_with("https://cdn.example.edu/items/"));
    }

    #[tokio::test]
    async fn test_classifier_failure_degrades_to_not_scanned() {
        let store = Arc::new(MemoryItemStore::new());
        let service = service_with(store, Arc::new(BrokenClassifier), Arc::new(LogNotifier));

        let mut input = report("found", "X", "");
        input.image = Some(ImageUpload {
            data: vec![1, 2, 3],
            content_type: "image/png".into(),
        });
        let outcome = service
            .submit_report(&student("a@example.edu"), input)
            .await
            .unwrap();
        assert_eq!(outcome.ai_category, NOT_SCANNED);
    }

    #[tokio::test]
    async fn test_escalation_candidates() {
        let store = Arc::new(MemoryItemStore::new());
        let old_lost = insert_aged(&store, ItemType::Lost, Duration::hours(30)).await;
        insert_aged(&store, ItemType::Lost, Duration::hours(2)).await;
        insert_aged(&store, ItemType::Found, Duration::hours(30)).await;
        let service = service(store.clone());

        let police = AuthenticatedUser::new("cop@example.edu", Role::Police);
        let queue = service
            .list_escalation_candidates(&police, Utc::now(), None)
            .await
            .unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].id, old_lost.id);
        // Listing is advisory and does not write.
        assert_eq!(
            store.get(old_lost.id).await.unwrap().unwrap().status,
            ItemStatus::Active
        );

        assert!(matches!(
            service
                .list_escalation_candidates(&student("s@example.edu"), Utc::now(), None)
                .await,
            Err(AppError::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_claim_identifier_returns_false() {
        let store = Arc::new(MemoryItemStore::new());
        let service = service(store.clone());
        let found = service
            .submit_report(&student("finder@example.edu"), report("found", "X", "123456789012345"))
            .await
            .unwrap();

        let result = service
            .verify_claim(found.item.id, "111111111111111")
            .await
            .unwrap();
        assert!(!result.matched);
    }

    #[tokio::test]
    async fn test_submit_claim_notifies_reporter() {
        let store = Arc::new(MemoryItemStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let service = service_with(store, Arc::new(FixedClassifier("phone")), notifier.clone());

        let found = service
            .submit_report(&student("finder@example.edu"), report("found", "X", "123456789012345"))
            .await
            .unwrap();

        let outcome = service
            .submit_claim(
                &student("owner@example.edu"),
                found.item.id,
                "123 456 789 012 345",
                "Lock screen shows my cat",
            )
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ClaimOutcome {
                matched: true,
                reporter_notified: true,
            }
        );

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "finder@example.edu");
        match &sent[0].1 {
            Notice::ClaimSubmitted {
                claimant_email,
                identifier_matched,
                ..
            } => {
                assert_eq!(claimant_email, "owner@example.edu");
                assert!(*identifier_matched);
            }
            other => panic!("unexpected notice {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submit_claim_survives_notification_failure() {
        let store = Arc::new(MemoryItemStore::new());
        let service = service_with(store, Arc::new(FixedClassifier("phone")), Arc::new(FailingNotifier));

        let found = service
            .submit_report(&student("finder@example.edu"), report("found", "X", ""))
            .await
            .unwrap();
        let outcome = service
            .submit_claim(&student("owner@example.edu"), found.item.id, "", "Blue case")
            .await
            .unwrap();
        assert!(!outcome.matched);
        assert!(!outcome.reporter_notified);

        assert!(matches!(
            service
                .submit_claim(&student("finder@example.edu"), found.item.id, "", "mine")
                .await,
            Err(AppError::FailedPrecondition(_))
        ));
    }

    #[tokio::test]
    async fn test_toggle_requires_owner() {
        let store = Arc::new(MemoryItemStore::new());
        let service = service(store.clone());
        let owner = student("owner@example.edu");
        let created = service
            .submit_report(&owner, report("lost", "X", ""))
            .await
            .unwrap();

        assert!(matches!(
            service
                .toggle_recovered(&student("else@example.edu"), created.item.id, "")
                .await,
            Err(AppError::PermissionDenied(_))
        ));

        let recovered = service
            .toggle_recovered(&owner, created.item.id, " Picked up at desk ")
            .await
            .unwrap();
        assert_eq!(recovered.status, ItemStatus::Recovered);
        assert_eq!(recovered.feedback.as_deref(), Some("Picked up at desk"));

        let back = service
            .toggle_recovered(&owner, created.item.id, "")
            .await
            .unwrap();
        assert_eq!(back.status, ItemStatus::Active);

        assert!(matches!(
            service
                .toggle_recovered(&owner, Uuid::new_v4(), "")
                .await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_police_verify_requires_role() {
        let store = Arc::new(MemoryItemStore::new());
        let item = insert_aged(&store, ItemType::Lost, Duration::hours(26)).await;
        let service = service(store);

        assert!(matches!(
            service.police_verify(&student("owner@example.edu"), item.id).await,
            Err(AppError::PermissionDenied(_))
        ));

        let police = AuthenticatedUser::new("cop@example.edu", Role::Police);
        let verified = service.police_verify(&police, item.id).await.unwrap();
        let case = verified.police_case.unwrap();
        assert!(!case.case_id.is_empty());
        assert_eq!(verified.status, ItemStatus::Verified);
    }

    #[tokio::test]
    async fn test_delete_then_delete_again_is_not_found() {
        let store = Arc::new(MemoryItemStore::new());
        let service = service(store);
        let owner = student("owner@example.edu");
        let created = service
            .submit_report(&owner, report("found", "X", ""))
            .await
            .unwrap();

        service.delete_item(&owner, created.item.id).await.unwrap();
        assert!(matches!(
            service.delete_item(&owner, created.item.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_photo() {
        let store = Arc::new(MemoryItemStore::new());
        let storage = Arc::new(FakeStorage::default());
        let service = LostFoundService::new(
            store,
            test_hasher(None),
            ServiceSettings::default(),
            Some(storage.clone()),
            Arc::new(FixedClassifier("bag")),
            Arc::new(LogNotifier),
        );
        let owner = student("owner@example.edu");

        let mut input = report("found", "X", "");
        input.image = Some(ImageUpload {
            data: vec![1, 2, 3],
            content_type: "image/png".into(),
        });
        let created = service.submit_report(&owner, input).await.unwrap();
        service.delete_item(&owner, created.item.id).await.unwrap();

        let deleted = storage.deleted.lock().unwrap();
        assert_eq!(deleted.len(), 1);
        assert!(deleted[0].starts_with("items/"));
        assert!(deleted[0].ends_with(".png"));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = Arc::new(MemoryItemStore::new());
        let expired = insert_aged(&store, ItemType::Lost, Duration::days(31)).await;
        let kept = insert_aged(&store, ItemType::Lost, Duration::days(29)).await;
        let service = service(store.clone());

        assert_eq!(service.purge_expired(Utc::now()).await.unwrap(), 1);
        assert!(store.get(expired.id).await.unwrap().is_none());
        assert!(store.get(kept.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_purge_expired_removes_photos() {
        let store = Arc::new(MemoryItemStore::new());
        let storage = Arc::new(FakeStorage::default());
        let service = service_over(store.clone(), storage.clone());
        let owner = student("owner@example.edu");

        let created = service
            .submit_report(&owner, with_photo(report("found", "X", "")))
            .await
            .unwrap();
        service
            .submit_report(&owner, report("lost", "X", ""))
            .await
            .unwrap();

        let removed = service
            .purge_expired(Utc::now() + Duration::days(31))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert!(store.get(created.item.id).await.unwrap().is_none());

        let deleted = storage.deleted.lock().unwrap();
        assert_eq!(deleted.len(), 1);
        assert!(created.item.image_url.unwrap().ends_with(&deleted[0]));
    }

    #[tokio::test]
    async fn test_submit_survives_candidate_query_failure() {
        let store = Arc::new(FlakyStore {
            fail_match: true,
            ..Default::default()
        });
        let service = service_over(store.clone(), Arc::new(FakeStorage::default()));

        service
            .submit_report(&student("finder@example.edu"), report("found", "X", "123456789012345"))
            .await
            .unwrap();
        let outcome = service
            .submit_report(&student("owner@example.edu"), report("lost", "X", "123456789012345"))
            .await
            .unwrap();
        assert!(!outcome.match_detected());
        assert!(store.get(outcome.item.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_insert_removes_uploaded_photo() {
        let store = Arc::new(FlakyStore {
            fail_insert: true,
            ..Default::default()
        });
        let storage = Arc::new(FakeStorage::default());
        let service = service_over(store, storage.clone());

        let result = service
            .submit_report(&student("a@example.edu"), with_photo(report("found", "X", "")))
            .await;
        assert!(matches!(result, Err(AppError::Storage(_))));

        let deleted = storage.deleted.lock().unwrap();
        assert_eq!(*deleted, *storage.uploaded.lock().unwrap());
        assert_eq!(deleted.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_identifier_uploads_nothing() {
        let storage = Arc::new(FakeStorage::default());
        let service = service_over(Arc::new(MemoryItemStore::new()), storage.clone());

        let result = service
            .submit_report(&student("a@example.edu"), with_photo(report("found", "X", "12")))
            .await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
        assert!(storage.uploaded.lock().unwrap().is_empty());
    }
}
