use std::fmt;
use std::str::FromStr;

use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tonic::metadata::MetadataMap;
use tonic::service::Interceptor;
use tonic::{Request, Status};

/// Role carried in the identity token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Student,
    Police,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Police => "police",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "police" => Ok(Role::Police),
            "admin" => Ok(Role::Admin),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity token issued by the campus identity provider.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Verified email of the caller.
    pub sub: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

#[cfg(test)]
impl Claims {
    pub fn new(email: &str, role: Role, ttl: chrono::Duration) -> Self {
        let now = chrono::Utc::now();
        Self {
            sub: email.to_string(),
            role: role.as_str().to_string(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        }
    }

    pub fn encode(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            self,
            &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
        )
    }
}

/// Authenticated caller injected into request extensions.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    /// Lowercased email.
    pub email: String,
    pub role: Role,
}

impl AuthenticatedUser {
    pub fn new(email: &str, role: Role) -> Self {
        Self {
            email: email.trim().to_lowercase(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_police(&self) -> Result<(), crate::AppError> {
        match self.role {
            Role::Police | Role::Admin => Ok(()),
            Role::Student => Err(crate::AppError::PermissionDenied(
                "Police or admin role required".to_string(),
            )),
        }
    }

    pub fn require_admin(&self) -> Result<(), crate::AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(crate::AppError::PermissionDenied(
                "Admin role required".to_string(),
            ))
        }
    }

    /// Reporter of the item, or an admin.
    pub fn require_owner(&self, reporter_email: &str) -> Result<(), crate::AppError> {
        if self.is_admin() || self.email == reporter_email {
            Ok(())
        } else {
            Err(crate::AppError::PermissionDenied(
                "Only the reporter can change this item".to_string(),
            ))
        }
    }
}

/// Decode the `authorization: Bearer <jwt>` metadata into a caller.
pub fn authenticate(metadata: &MetadataMap, jwt_secret: &str) -> Result<AuthenticatedUser, Status> {
    let token = metadata
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| Status::unauthenticated("Authentication required"))?;

    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!("Rejected token: {}", e);
        Status::unauthenticated("Invalid token")
    })?
    .claims;

    let role: Role = claims
        .role
        .parse()
        .map_err(|_| Status::unauthenticated("Unknown role"))?;

    if claims.sub.trim().is_empty() {
        return Err(Status::unauthenticated("Token has no subject"));
    }

    Ok(AuthenticatedUser::new(&claims.sub, role))
}

/// Rejects unauthenticated calls and injects [`AuthenticatedUser`].
#[derive(Clone)]
pub struct AuthInterceptor {
    jwt_secret: String,
}

impl AuthInterceptor {
    pub fn new(jwt_secret: String) -> Self {
        Self { jwt_secret }
    }
}

impl Interceptor for AuthInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let user = authenticate(request.metadata(), &self.jwt_secret)?;
        request.extensions_mut().insert(user);
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    const SECRET: &str = "test-jwt-secret";

    fn metadata_with(token: &str) -> MetadataMap {
        let mut metadata = MetadataMap::new();
        metadata.insert(
            "authorization",
            format!("Bearer {}", token).parse().unwrap(),
        );
        metadata
    }

    #[test]
    fn test_authenticate_valid_token() {
        let token = Claims::new("Student@Example.EDU", Role::Student, chrono::Duration::hours(1))
            .encode(SECRET)
            .unwrap();
        let user = authenticate(&metadata_with(&token), SECRET).unwrap();
        assert_eq!(user.email, "student@example.edu");
        assert_eq!(user.role, Role::Student);
    }

    #[test]
    fn test_authenticate_rejects_missing_and_forged() {
        let err = authenticate(&MetadataMap::new(), SECRET).unwrap_err();
        assert_eq!(err.code(), Code::Unauthenticated);

        let token = Claims::new("a@example.edu", Role::Admin, chrono::Duration::hours(1))
            .encode("another-secret")
            .unwrap();
        let err = authenticate(&metadata_with(&token), SECRET).unwrap_err();
        assert_eq!(err.code(), Code::Unauthenticated);
    }

    #[test]
    fn test_authenticate_rejects_expired() {
        let token = Claims::new("a@example.edu", Role::Police, chrono::Duration::hours(-2))
            .encode(SECRET)
            .unwrap();
        assert!(authenticate(&metadata_with(&token), SECRET).is_err());
    }

    #[test]
    fn test_interceptor_injects_user() {
        let token = Claims::new("cop@example.edu", Role::Police, chrono::Duration::hours(1))
            .encode(SECRET)
            .unwrap();
        let mut request = Request::new(());
        *request.metadata_mut() = metadata_with(&token);

        let request = AuthInterceptor::new(SECRET.to_string())
            .call(request)
            .unwrap();
        let user = request.extensions().get::<AuthenticatedUser>().unwrap();
        assert_eq!(user.role, Role::Police);
    }

    #[test]
    fn test_capabilities() {
        let student = AuthenticatedUser::new("s@example.edu", Role::Student);
        let police = AuthenticatedUser::new("p@example.edu", Role::Police);
        let admin = AuthenticatedUser::new("a@example.edu", Role::Admin);

        assert!(student.require_police().is_err());
        assert!(police.require_police().is_ok());
        assert!(admin.require_police().is_ok());
        assert!(police.require_admin().is_err());
        assert!(student.require_owner("s@example.edu").is_ok());
        assert!(student.require_owner("other@example.edu").is_err());
        assert!(admin.require_owner("other@example.edu").is_ok());
    }
}
