pub mod claim_verifier;
pub mod escalation;
pub mod health_service;
pub mod items_service;
pub mod lost_found;
pub mod matcher;
pub mod transitions;

pub use claim_verifier::{ClaimVerification, ClaimVerifier};
pub use escalation::EscalationPolicy;
pub use health_service::HealthServiceImpl;
pub use items_service::ItemsServiceImpl;
pub use lost_found::{LostFoundService, ServiceSettings};
pub use matcher::IdentifierMatcher;
pub use transitions::StatusTransitionManager;
