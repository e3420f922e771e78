//! Device identifier hashing.
//!
//! Identifiers such as IMEIs come from a small input space, so they are
//! stored as salted Argon2id PHC strings. Two hashes of the same identifier
//! differ; equality is only ever decided by [`IdentifierHasher::verify`].
//!
//! When a token secret is configured, an HMAC-SHA256 lookup token is stored
//! next to the hash so candidate pools can be narrowed with an index before
//! the slow verification runs.

use std::sync::LazyLock;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine as _};
use regex::Regex;
use ring::hmac;

use crate::error::{AppError, AppResult};

/// Accepted shape of a normalized identifier.
static RE_IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z0-9]{6,32}$").unwrap());

/// Strip everything but ASCII alphanumerics and lowercase the rest.
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Normalize and validate an identifier supplied at an entry point.
/// Returns `None` for input that normalizes to nothing.
pub fn parse_identifier(raw: &str) -> AppResult<Option<String>> {
    let normalized = normalize(raw);
    if normalized.is_empty() {
        return Ok(None);
    }
    if !RE_IDENTIFIER.is_match(&normalized) {
        return Err(AppError::InvalidInput(
            "identifier must contain 6 to 32 letters or digits".to_string(),
        ));
    }
    Ok(Some(normalized))
}

/// Argon2 cost parameters.
#[derive(Debug, Clone, Copy)]
pub struct HashCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Clone)]
pub struct IdentifierHasher {
    argon2: Argon2<'static>,
    token_key: Option<hmac::Key>,
}

impl IdentifierHasher {
    pub fn new(cost: HashCost, token_secret: Option<&str>) -> AppResult<Self> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(|e| AppError::InvalidInput(format!("Invalid argon2 parameters: {}", e)))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let token_key = token_secret.map(|s| hmac::Key::new(hmac::HMAC_SHA256, s.as_bytes()));
        Ok(Self { argon2, token_key })
    }

    /// Salted one-way hash of an already normalized identifier.
    pub fn hash(&self, normalized: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(normalized.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| AppError::Hashing(e.to_string()))
    }

    /// Re-derive with the stored salt and parameters. A mismatch is `Ok(false)`.
    pub fn verify(&self, normalized: &str, stored_hash: &str) -> AppResult<bool> {
        let parsed = PasswordHash::new(stored_hash)
            .map_err(|e| AppError::Hashing(format!("Invalid stored hash: {}", e)))?;
        match self.argon2.verify_password(normalized.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AppError::Hashing(e.to_string())),
        }
    }

    /// Deterministic keyed token for index lookups; `None` without a secret.
    pub fn lookup_token(&self, normalized: &str) -> Option<String> {
        self.token_key
            .as_ref()
            .map(|key| BASE64URL.encode(hmac::sign(key, normalized.as_bytes()).as_ref()))
    }

    /// [`hash`](Self::hash) on the blocking pool.
    pub async fn hash_blocking(&self, normalized: String) -> AppResult<String> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&normalized))
            .await
            .map_err(|e| AppError::Hashing(format!("Hash task failed: {}", e)))?
    }

    /// [`verify`](Self::verify) on the blocking pool.
    pub async fn verify_blocking(&self, normalized: String, stored_hash: String) -> AppResult<bool> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&normalized, &stored_hash))
            .await
            .map_err(|e| AppError::Hashing(format!("Verify task failed: {}", e)))?
    }
}

#[cfg(test)]
pub(crate) fn test_hasher(token_secret: Option<&str>) -> IdentifierHasher {
    IdentifierHasher::new(
        HashCost {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        },
        token_secret,
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_punctuation() {
        assert_eq!(normalize("123-456-789-012-345"), "123456789012345");
        assert_eq!(normalize(" AB:cd 12 "), "abcd12");
        assert_eq!(normalize("---"), "");
    }

    #[test]
    fn test_normalize_idempotent() {
        for s in ["35-209900-176148-1", "Ab C!d", "", "ÄÖÜ-99x"] {
            let once = normalize(s);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn test_parse_identifier() {
        assert_eq!(parse_identifier("  ").unwrap(), None);
        assert_eq!(
            parse_identifier("123-456-789-012-345").unwrap().as_deref(),
            Some("123456789012345")
        );
        assert!(parse_identifier("12-3").is_err());
        assert!(parse_identifier(&"9".repeat(33)).is_err());
    }

    #[test]
    fn test_hash_verify_roundtrip() {
        let hasher = test_hasher(None);
        let hash = hasher.hash("123456789012345").unwrap();
        assert!(!hash.contains("123456789012345"));
        assert!(hasher.verify("123456789012345", &hash).unwrap());
        assert!(!hasher.verify("123456789012346", &hash).unwrap());
    }

    #[test]
    fn test_hash_is_salted() {
        let hasher = test_hasher(None);
        let a = hasher.hash("123456789012345").unwrap();
        let b = hasher.hash("123456789012345").unwrap();
        assert_ne!(a, b);
        assert!(hasher.verify("123456789012345", &b).unwrap());
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        let hasher = test_hasher(None);
        assert!(matches!(
            hasher.verify("123456789012345", "not-a-phc-string"),
            Err(AppError::Hashing(_))
        ));
    }

    #[test]
    fn test_lookup_token() {
        assert!(test_hasher(None).lookup_token("abc123").is_none());

        let hasher = test_hasher(Some("server-secret"));
        let a = hasher.lookup_token("123456789012345").unwrap();
        assert_eq!(Some(a.clone()), hasher.lookup_token("123456789012345"));
        assert_ne!(Some(a.clone()), hasher.lookup_token("123456789012346"));
        assert_ne!(
            Some(a),
            test_hasher(Some("other-secret")).lookup_token("123456789012345")
        );
    }

    #[tokio::test]
    async fn test_blocking_helpers() {
        let hasher = test_hasher(None);
        let hash = hasher.hash_blocking("imei000111".to_string()).await.unwrap();
        assert!(hasher
            .verify_blocking("imei000111".to_string(), hash)
            .await
            .unwrap());
    }
}
