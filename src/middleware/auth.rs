use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Entrant id; attempts are owned by this value.
    pub sub: String,
    pub exp: usize,
    pub role: Option<String>,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role
            .as_deref()
            .is_some_and(|r| r.eq_ignore_ascii_case(ADMIN_ROLE))
    }
}

/// HS256 signing secret shared by the middleware and token issuance.
#[derive(Clone)]
pub struct AuthKeys {
    secret: Arc<Vec<u8>>,
}

impl AuthKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: Arc::new(secret.as_bytes().to_vec()),
        }
    }

    pub fn issue(&self, sub: &str, role: Option<&str>, ttl: Duration) -> Result<String> {
        let claims = Claims {
            sub: sub.to_string(),
            exp: (Utc::now() + ttl).timestamp().max(0) as usize,
            role: role.map(str::to_string),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| Error::Internal(format!("Failed to sign token: {}", e)))
    }

    fn verify(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation)
            .map(|data| data.claims)
            .map_err(|_| Error::Unauthorized("invalid_token".into()))
    }

    fn authenticate(&self, req: &Request) -> Result<Claims> {
        let header = req
            .headers()
            .get(axum::http::header::AUTHORIZATION)
            .ok_or_else(|| Error::Unauthorized("missing_authorization".into()))?;
        let value = header
            .to_str()
            .map_err(|_| Error::Unauthorized("bad_authorization".into()))?;
        let token = value
            .strip_prefix("Bearer ")
            .ok_or_else(|| Error::Unauthorized("unsupported_scheme".into()))?;
        self.verify(token)
    }
}

pub async fn require_user(State(keys): State<AuthKeys>, mut req: Request, next: Next) -> Response {
    match keys.authenticate(&req) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}

pub async fn require_admin(State(keys): State<AuthKeys>, mut req: Request, next: Next) -> Response {
    match keys.authenticate(&req) {
        Ok(claims) if claims.is_admin() => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Ok(claims) => {
            tracing::warn!(user_id = %claims.sub, "Admin route refused");
            Error::AccessDenied("admin role required".into()).into_response()
        }
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies() {
        let keys = AuthKeys::new("unit-secret");
        let token = keys.issue("u1", Some("Admin"), Duration::minutes(5)).unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.sub, "u1");
        assert!(claims.is_admin());
    }

    #[test]
    fn foreign_secret_is_rejected() {
        let token = AuthKeys::new("one")
            .issue("u1", None, Duration::minutes(5))
            .unwrap();
        let err = AuthKeys::new("two").verify(&token).unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }
}
