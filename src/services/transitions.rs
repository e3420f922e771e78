//! Item status state machine.
//!
//! ```text
//!   active <──toggle──> recovered
//!     │
//!     ├──escalate──> escalated ──police verify──> verified
//!     └─────────────police verify───────────────> verified
//! ```
//!
//! Every write is a conditional update on the status that was read, so two
//! concurrent requests for the same item cannot both apply.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use uuid::Uuid;

use super::escalation::EscalationPolicy;
use crate::db::ItemStore;
use crate::error::{AppError, AppResult};
use crate::models::{Item, ItemStatus, PoliceCase, StatusChange};

const CASE_ID_PREFIX: &str = "LF";
const CASE_ID_RANDOM_LEN: usize = 8;
const CASE_ID_ATTEMPTS: usize = 5;
const CASE_ID_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const BASE36_DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36_DIGITS[(n % 36) as usize] as char);
        n /= 36;
    }
    digits.iter().rev().collect()
}

/// `LF-<8 random alphanumerics>-<base36 unix millis>`.
pub fn generate_case_id(now: DateTime<Utc>) -> AppResult<String> {
    let rng = SystemRandom::new();
    let mut segment = String::with_capacity(CASE_ID_RANDOM_LEN);
    let mut buf = [0u8; 16];

    while segment.len() < CASE_ID_RANDOM_LEN {
        rng.fill(&mut buf)
            .map_err(|e| AppError::Internal(format!("RNG error: {}", e)))?;
        // Reject bytes >= 252 so every symbol is equally likely.
        for b in buf.iter().filter(|b| **b < 252) {
            if segment.len() == CASE_ID_RANDOM_LEN {
                break;
            }
            segment.push(CASE_ID_ALPHABET[(*b % 36) as usize] as char);
        }
    }

    let millis = now.timestamp_millis().max(0) as u64;
    Ok(format!("{}-{}-{}", CASE_ID_PREFIX, segment, to_base36(millis)))
}

#[derive(Clone)]
pub struct StatusTransitionManager {
    store: Arc<dyn ItemStore>,
    policy: EscalationPolicy,
}

impl StatusTransitionManager {
    pub fn new(store: Arc<dyn ItemStore>, policy: EscalationPolicy) -> Self {
        Self { store, policy }
    }

    async fn load(&self, id: Uuid) -> AppResult<Item> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Item not found".to_string()))
    }

    /// Conditional write; distinguishes a vanished item from a lost race.
    async fn apply(&self, id: Uuid, expected: ItemStatus, change: StatusChange) -> AppResult<Item> {
        if let Some(item) = self.store.compare_and_set_status(id, expected, &change).await? {
            tracing::info!(
                "Status transition: item={}, {} -> {}",
                id,
                expected,
                item.status
            );
            return Ok(item);
        }

        match self.store.get(id).await? {
            None => Err(AppError::NotFound("Item not found".to_string())),
            Some(current) => Err(AppError::Conflict(format!(
                "Item status changed concurrently (expected {}, now {})",
                expected, current.status
            ))),
        }
    }

    /// Flip between `active` and `recovered`. Feedback is stored when marking
    /// recovered and kept when flipping back.
    pub async fn toggle_recovered(&self, item: &Item, feedback: Option<String>) -> AppResult<Item> {
        let change = match item.status {
            ItemStatus::Active => StatusChange {
                status: ItemStatus::Recovered,
                feedback,
                police_case: None,
            },
            ItemStatus::Recovered => StatusChange {
                status: ItemStatus::Active,
                feedback: None,
                police_case: None,
            },
            other => {
                return Err(AppError::FailedPrecondition(format!(
                    "Cannot toggle recovered on a {} item",
                    other
                )))
            }
        };

        self.apply(item.id, item.status, change).await
    }

    /// Move an escalation-eligible report into the police queue.
    pub async fn escalate(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<Item> {
        let item = self.load(id).await?;
        if item.status != ItemStatus::Active || !self.policy.needs_escalation(&item, now) {
            return Err(AppError::FailedPrecondition(format!(
                "Item is not eligible for escalation (status {})",
                item.status
            )));
        }

        let change = StatusChange {
            status: ItemStatus::Escalated,
            feedback: None,
            police_case: None,
        };
        self.apply(id, ItemStatus::Active, change).await
    }

    /// Issue a case id and mark the item verified. One-way.
    pub async fn police_verify(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<Item> {
        let item = self.load(id).await?;

        if item.status == ItemStatus::Verified {
            return Err(AppError::FailedPrecondition(
                "Item is already verified".to_string(),
            ));
        }
        if !self.policy.needs_escalation(&item, now) {
            return Err(AppError::FailedPrecondition(format!(
                "Item is not eligible for police verification (status {})",
                item.status
            )));
        }

        let case_id = self.unique_case_id(now).await?;
        let change = StatusChange {
            status: ItemStatus::Verified,
            feedback: None,
            police_case: Some(PoliceCase {
                case_id,
                verified_at: now,
            }),
        };
        self.apply(id, item.status, change).await
    }

    async fn unique_case_id(&self, now: DateTime<Utc>) -> AppResult<String> {
        for _ in 0..CASE_ID_ATTEMPTS {
            let candidate = generate_case_id(now)?;
            if !self.store.case_id_exists(&candidate).await? {
                return Ok(candidate);
            }
            tracing::warn!("Case id collision, regenerating");
        }
        Err(AppError::Internal(
            "Could not allocate a unique case id".to_string(),
        ))
    }

    /// Permanent removal, outside the state machine.
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        if !self.store.delete(id).await? {
            return Err(AppError::NotFound("Item not found".to_string()));
        }
        tracing::info!("Item deleted: {}", id);
        Ok(())
    }
}
