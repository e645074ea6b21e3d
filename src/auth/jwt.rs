//! HS256 access and refresh tokens

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::models::types::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Registered claims plus the username
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: i64,
    pub username: String,
    pub typ: TokenType,
    /// Unique token id, used for revocation
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    /// Time left before expiry (zero once expired)
    pub fn remaining(&self) -> Duration {
        let left = self.exp - Utc::now().timestamp();
        Duration::from_secs(left.max(0) as u64)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn issue_pair(&self, user: &User) -> AppResult<TokenPair> {
        Ok(TokenPair {
            access: self.issue(user, TokenType::Access)?,
            refresh: self.issue(user, TokenType::Refresh)?,
        })
    }

    pub fn issue(&self, user: &User, typ: TokenType) -> AppResult<String> {
        let ttl = match typ {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        };
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.id,
            username: user.username.clone(),
            typ,
            jti: Uuid::new_v4().simple().to_string(),
            iat: now,
            exp: now + ttl.as_secs() as i64,
        };
        self.encode_claims(&claims)
    }

    fn encode_claims(&self, claims: &Claims) -> AppResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AppError::with_source(ErrorCode::ApiInternalError, "Token signing failed", e))
    }

    /// Decode and check signature, expiry and token type
    pub fn verify(&self, token: &str, expected: TokenType) -> AppResult<Claims> {
        let claims = decode::<Claims>(token, &self.decoding, &self.validation)?.claims;
        if claims.typ != expected {
            return Err(AppError::invalid_token("Token has wrong type."));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: 42,
            username: "kofi".into(),
            password_hash: String::new(),
            is_staff: false,
            is_active: true,
            date_joined: Utc::now(),
        }
    }

    fn service() -> TokenService {
        TokenService::new("test-secret", Duration::from_secs(3600), Duration::from_secs(86_400))
    }

    #[test]
    fn test_pair_round_trip() {
        let svc = service();
        let pair = svc.issue_pair(&user()).unwrap();

        let access = svc.verify(&pair.access, TokenType::Access).unwrap();
        assert_eq!(access.sub, 42);
        assert_eq!(access.username, "kofi");
        assert!(access.exp - access.iat == 3600);

        let refresh = svc.verify(&pair.refresh, TokenType::Refresh).unwrap();
        assert_ne!(access.jti, refresh.jti);
        assert!(refresh.remaining() > Duration::from_secs(86_000));
    }

    #[test]
    fn test_wrong_type_rejected() {
        let svc = service();
        let pair = svc.issue_pair(&user()).unwrap();
        let err = svc.verify(&pair.refresh, TokenType::Access).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidToken);
    }

    #[test]
    fn test_expired_and_forged() {
        let svc = service();
        let now = Utc::now().timestamp();
        let expired = svc
            .encode_claims(&Claims {
                sub: 1,
                username: "kofi".into(),
                typ: TokenType::Access,
                jti: "j".into(),
                iat: now - 7200,
                exp: now - 3600,
            })
            .unwrap();
        assert_eq!(
            svc.verify(&expired, TokenType::Access).unwrap_err().code,
            ErrorCode::TokenExpired
        );

        let other = TokenService::new("other-secret", Duration::from_secs(60), Duration::from_secs(60));
        let forged = other.issue(&user(), TokenType::Access).unwrap();
        assert_eq!(
            svc.verify(&forged, TokenType::Access).unwrap_err().code,
            ErrorCode::InvalidToken
        );
    }
}
