//! Authentication middleware.

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::{AppError, AppResult, JwtConfig};
use domain::Role;

use crate::state::AppState;

/// JWT claims payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub tenant_id: Uuid,
    pub role: String,
    pub exp: i64,
}

/// Verifies HS256 access tokens issued by the back office.
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(config: &JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = config.leeway_seconds;
        Self {
            key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> AppResult<Claims> {
        let token_data = decode::<Claims>(token, &self.key, &self.validation)?;
        Ok(token_data.claims)
    }
}

/// Current authenticated user extracted from JWT.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    /// Every fiscal operation is scoped to this tenant
    pub tenant_id: Uuid,
    pub role: Role,
}

impl CurrentUser {
    /// Check if user has admin role.
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

impl From<Claims> for CurrentUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            tenant_id: claims.tenant_id,
            role: Role::from(claims.role),
        }
    }
}

/// Check if user has admin privileges.
pub fn require_admin(user: &CurrentUser) -> AppResult<()> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

/// Authentication middleware that validates JWT tokens.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(&request)?;
    let current_user = CurrentUser::from(state.tokens.verify(token)?);

    request.extensions_mut().insert(current_user);

    Ok(next.run(request).await)
}

/// Extract bearer token from Authorization header.
fn extract_token(request: &Request<Body>) -> AppResult<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
        .ok_or(AppError::Unauthorized)
}

/// Token minting for tests.
#[cfg(test)]
pub mod testing {
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};

    use super::*;

    pub const SECRET: &str = "test-secret";

    pub fn token(tenant_id: Uuid, role: &str, ttl: Duration) -> String {
        let claims = Claims {
            sub: Uuid::new_v4(),
            tenant_id,
            role: role.to_string(),
            exp: (Utc::now() + ttl).timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{token, SECRET};
    use super::*;
    use chrono::Duration;

    fn verifier() -> TokenVerifier {
        TokenVerifier::new(&JwtConfig {
            secret: SECRET.to_string(),
            leeway_seconds: 0,
        })
    }

    #[test]
    fn test_verify_carries_tenant_and_role() {
        let tenant = Uuid::new_v4();
        let user = CurrentUser::from(verifier().verify(&token(tenant, "admin", Duration::hours(1))).unwrap());
        assert_eq!(user.tenant_id, tenant);
        assert!(user.is_admin());
        assert!(require_admin(&user).is_ok());
    }

    #[test]
    fn test_operator_is_not_admin() {
        let user = CurrentUser::from(
            verifier()
                .verify(&token(Uuid::new_v4(), "operator", Duration::hours(1)))
                .unwrap(),
        );
        assert!(matches!(require_admin(&user), Err(AppError::Forbidden)));
    }

    #[test]
    fn test_expired_and_foreign_tokens_rejected() {
        let expired = token(Uuid::new_v4(), "admin", Duration::hours(-1));
        assert!(matches!(verifier().verify(&expired), Err(AppError::Jwt(_))));

        let other = TokenVerifier::new(&JwtConfig {
            secret: "another-secret".to_string(),
            leeway_seconds: 0,
        });
        let valid = token(Uuid::new_v4(), "admin", Duration::hours(1));
        assert!(other.verify(&valid).is_err());
    }
}
