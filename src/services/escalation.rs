use chrono::{DateTime, Duration, Utc};

use crate::models::{Item, ItemStatus, ItemType};

/// Decides which reports need police attention. Advisory only: applying the
/// policy never writes a status.
#[derive(Debug, Clone, Copy)]
pub struct EscalationPolicy {
    threshold: Duration,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self::new(Duration::hours(24))
    }
}

impl EscalationPolicy {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Latest creation time that is old enough to escalate at `now`.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.threshold
    }

    pub fn needs_escalation(&self, item: &Item, now: DateTime<Utc>) -> bool {
        match item.status {
            ItemStatus::Escalated => true,
            ItemStatus::Active => {
                item.item_type == ItemType::Lost && now - item.created_at >= self.threshold
            }
            ItemStatus::Recovered | ItemStatus::Verified => false,
        }
    }
}
