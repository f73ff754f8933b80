use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AuthError;
use crate::models::{Role, User};

/// Represents the claims encoded within an access token.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject of the token: the username.
    pub sub: String,
    pub role: Role,
    /// Expiration timestamp (seconds since epoch).
    pub exp: i64,
    /// Issued-at timestamp (seconds since epoch).
    pub iat: i64,
    /// Unique per token, so two logins in the same second still yield distinct tokens.
    pub jti: String,
}

impl Claims {
    pub fn is_expired(&self) -> bool {
        self.exp <= Utc::now().timestamp()
    }
}

/// Signs and decodes HS256 bearer tokens with the process-wide secret.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    default_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, default_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn issue(&self, user: &User, ttl: Duration) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.username.clone(),
            role: user.role,
            exp: now + ttl.num_seconds(),
            iat: now,
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("Failed to generate token: {}", e)))
    }

    /// Checks the signature and returns the claims. Expiry is left to the caller so that a
    /// zero TTL can be reported as `Expired` rather than rejected by leeway rules.
    pub fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                log::debug!("Rejected token: {}", e);
                AuthError::Malformed
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> User {
        User {
            id: 1,
            username: "alice".into(),
            email: "a@x.com".into(),
            password_hash: "hash".into(),
            role: Role::User,
        }
    }

    #[test]
    fn test_token_generation_and_decoding() {
        let tokens = TokenService::new("test_secret", Duration::minutes(30));
        let token = tokens.issue(&alice(), tokens.default_ttl()).unwrap();

        let claims = tokens.decode(&token).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.role, Role::User);
        assert_eq!(claims.exp - claims.iat, 30 * 60);
        assert!(!claims.is_expired());
    }

    #[test]
    fn test_zero_ttl_is_expired_immediately() {
        let tokens = TokenService::new("test_secret", Duration::minutes(30));
        let token = tokens.issue(&alice(), Duration::zero()).unwrap();
        assert!(tokens.decode(&token).unwrap().is_expired());
    }

    #[test]
    fn test_tokens_are_unique() {
        let tokens = TokenService::new("test_secret", Duration::minutes(30));
        let first = tokens.issue(&alice(), Duration::minutes(5)).unwrap();
        let second = tokens.issue(&alice(), Duration::minutes(5)).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_invalid_token_signature() {
        let issuer = TokenService::new("one_secret", Duration::minutes(30));
        let verifier = TokenService::new("a_completely_different_secret", Duration::minutes(30));
        let token = issuer.issue(&alice(), Duration::minutes(5)).unwrap();

        assert_eq!(verifier.decode(&token), Err(AuthError::Malformed));
        assert_eq!(verifier.decode("not.a.token"), Err(AuthError::Malformed));
    }
}
