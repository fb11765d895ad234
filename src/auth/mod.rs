//! Authentication: argon2 password hashing, HS256 access tokens and the
//! [`AuthUser`] extractor that resolves a bearer token to a live user row.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    entities::{user, Role},
    errors::ServiceError,
    AppState,
};

pub mod roles;

const MAX_TOKEN_LIFETIME_SECS: i64 = 365 * 24 * 60 * 60;

/// Claim structure for JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub access_token_expiration: Duration,
}

impl AuthConfig {
    pub fn new(jwt_secret: String, jwt_issuer: String, access_token_expiration_secs: u64) -> Self {
        // chrono panics on out-of-range durations
        let secs = i64::try_from(access_token_expiration_secs)
            .unwrap_or(i64::MAX)
            .min(MAX_TOKEN_LIFETIME_SECS);
        Self {
            jwt_secret,
            jwt_issuer,
            access_token_expiration: Duration::seconds(secs),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing token")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("Password hashing failed: {0}")]
    Hash(String),
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => {
                ServiceError::BadRequest("Invalid email or password".to_string())
            }
            AuthError::TokenCreation(msg) => ServiceError::InternalError(msg),
            AuthError::Hash(msg) => ServiceError::HashError(msg),
            // Every other failure reads the same to the caller
            other => {
                debug!(reason = %other, "Authentication rejected");
                ServiceError::Unauthorized
            }
        }
    }
}

/// Authentication service that handles hashing, token issuance and validation
#[derive(Clone)]
pub struct AuthService {
    config: AuthConfig,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    pub fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::Hash(e.to_string()))
    }

    pub fn verify_password(&self, password: &str, stored_hash: &str) -> Result<(), AuthError> {
        let parsed = PasswordHash::new(stored_hash).map_err(|e| AuthError::Hash(e.to_string()))?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| AuthError::InvalidCredentials)
    }

    /// Issue an access token for a user
    pub fn generate_token(&self, user: &user::Model) -> Result<TokenResponse, AuthError> {
        let now = Utc::now();
        let exp = now + self.config.access_token_expiration;
        let claims = Claims {
            sub: user.id.to_string(),
            role: user.role,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: self.config.jwt_issuer.clone(),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))?;

        Ok(TokenResponse {
            access_token: token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_token_expiration.num_seconds(),
        })
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.config.jwt_issuer.as_str()]);

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })
    }

    /// Resolves a token to the current user row. Role and active flag come
    /// from the database, not the token, so changes apply immediately.
    pub async fn authenticate(
        &self,
        db: &DatabaseConnection,
        token: &str,
    ) -> Result<AuthUser, AuthError> {
        let claims = self.validate_token(token)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;

        let found = user::Entity::find_by_id(user_id)
            .one(db)
            .await
            .map_err(|e| {
                warn!(error = %e, "User lookup failed during authentication");
                AuthError::InvalidToken
            })?
            .ok_or(AuthError::InvalidToken)?;

        if !found.is_active {
            return Err(AuthError::AccountDisabled);
        }

        Ok(AuthUser {
            id: found.id,
            name: found.name,
            email: found.email,
            role: found.role,
        })
    }
}

/// The authenticated caller of a request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    pub fn has_any(&self, allowed: &[Role]) -> bool {
        allowed.contains(&self.role)
    }

    /// `Forbidden` unless the caller's role is in `allowed`
    pub fn require_any(&self, allowed: &[Role]) -> Result<(), ServiceError> {
        if self.has_any(allowed) {
            Ok(())
        } else {
            debug!(user_id = %self.id, role = %self.role, "Role not permitted");
            Err(ServiceError::Forbidden)
        }
    }

    pub fn is_staff(&self) -> bool {
        roles::is_staff(self.role)
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AuthError::MissingToken)?;
        let user = state.auth.authenticate(&state.db, token).await?;
        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::http::Request;

    fn service() -> AuthService {
        AuthService::new(AuthConfig::new(
            "unit_test_secret_that_is_long_enough_123".into(),
            "pharmacy-api".into(),
            3600,
        ))
    }

    fn sample_user(role: Role) -> user::Model {
        user::Model {
            id: Uuid::new_v4(),
            name: "Dana".into(),
            email: "dana@example.com".into(),
            password_hash: String::new(),
            role,
            phone: None,
            address: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn password_hash_round_trip() {
        let auth = service();
        let hash = auth.hash_password("correct horse battery").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(auth.verify_password("correct horse battery", &hash).is_ok());
        assert_matches!(
            auth.verify_password("wrong", &hash),
            Err(AuthError::InvalidCredentials)
        );
    }

    #[test]
    fn token_carries_subject_and_role() {
        let auth = service();
        let user = sample_user(Role::Pharmacist);
        let token = auth.generate_token(&user).unwrap();
        assert_eq!(token.token_type, "Bearer");

        let claims = auth.validate_token(&token.access_token).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.role, Role::Pharmacist);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let other = AuthService::new(AuthConfig::new(
            "a_completely_different_secret_value_456".into(),
            "pharmacy-api".into(),
            3600,
        ));
        let token = other.generate_token(&sample_user(Role::Admin)).unwrap();
        assert_matches!(
            service().validate_token(&token.access_token),
            Err(AuthError::InvalidToken)
        );
    }

    #[test]
    fn bearer_header_is_parsed() {
        let (parts, _) = Request::builder()
            .header(header::AUTHORIZATION, "Bearer abc.def")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(bearer_token(&parts), Some("abc.def"));

        let (parts, _) = Request::builder()
            .header(header::AUTHORIZATION, "Basic Zm9v")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(bearer_token(&parts), None);
    }

    #[test]
    fn require_any_maps_to_forbidden() {
        let caller = AuthUser {
            id: Uuid::new_v4(),
            name: "Cal".into(),
            email: "cal@example.com".into(),
            role: Role::Customer,
        };
        assert_matches!(
            caller.require_any(roles::INVENTORY),
            Err(ServiceError::Forbidden)
        );
        assert!(caller.require_any(&[Role::Customer]).is_ok());
    }

    #[test]
    fn auth_failures_collapse_to_unauthorized() {
        assert_matches!(
            ServiceError::from(AuthError::TokenExpired),
            ServiceError::Unauthorized
        );
        assert_matches!(
            ServiceError::from(AuthError::AccountDisabled),
            ServiceError::Unauthorized
        );
    }
}
