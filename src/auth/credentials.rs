//! Registration, authentication and token lifecycle.

use std::sync::Arc;

use chrono::Duration;
use lazy_static::lazy_static;
use regex::Regex;

use super::password::{hash_password, verify_password};
use super::{AuthError, RegistrationError, RevocationSet, TokenService};
use crate::models::{NewUser, Role, User};
use crate::store::Store;

lazy_static! {
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

pub struct CredentialService {
    store: Arc<dyn Store>,
    tokens: TokenService,
    revoked: RevocationSet,
    bcrypt_cost: u32,
}

impl CredentialService {
    pub fn new(store: Arc<dyn Store>, tokens: TokenService, bcrypt_cost: u32) -> Self {
        Self {
            store,
            tokens,
            revoked: RevocationSet::new(),
            bcrypt_cost,
        }
    }

    /// Creates a `user`-role account.
    ///
    /// Checks run in order: username uniqueness, email format, email uniqueness. A
    /// concurrent registration that wins the race is caught by the store's unique
    /// constraints and reported the same way.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, RegistrationError> {
        let persistence = |e: crate::store::StoreError| RegistrationError::Persistence(e.to_string());

        if self
            .store
            .find_user_by_username(username)
            .await
            .map_err(persistence)?
            .is_some()
        {
            return Err(RegistrationError::NameTaken);
        }

        if !is_valid_email(email) {
            return Err(RegistrationError::InvalidEmail);
        }

        if self
            .store
            .find_user_by_email(email)
            .await
            .map_err(persistence)?
            .is_some()
        {
            return Err(RegistrationError::EmailTaken);
        }

        let password_hash = hash_password(password, self.bcrypt_cost)
            .map_err(|e| RegistrationError::Persistence(format!("hashing failed: {}", e)))?;

        let created = self
            .store
            .insert_user(NewUser {
                username: username.to_string(),
                email: email.to_string(),
                password_hash,
                role: Role::User,
            })
            .await;

        match created {
            Ok(user) => {
                log::info!("Registered user {} (id {})", user.username, user.id);
                Ok(user)
            }
            Err(e) if e.violates("username") => Err(RegistrationError::NameTaken),
            Err(e) if e.violates("email") => Err(RegistrationError::EmailTaken),
            Err(e) => {
                log::error!("Registration of {} failed: {}", username, e);
                Err(persistence(e))
            }
        }
    }

    /// Returns the stored record when `password` matches, `None` otherwise.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, AuthError> {
        let user = self
            .store
            .find_user_by_username(username)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        let Some(user) = user else {
            return Ok(None);
        };

        match verify_password(password, &user.password_hash) {
            Ok(true) => Ok(Some(user)),
            Ok(false) => Ok(None),
            Err(e) => {
                log::warn!("Stored hash for {} could not be verified: {}", username, e);
                Ok(None)
            }
        }
    }

    pub fn issue_token(&self, user: &User) -> Result<String, AuthError> {
        self.tokens.issue(user, self.tokens.default_ttl())
    }

    pub fn issue_token_with_ttl(&self, user: &User, ttl: Duration) -> Result<String, AuthError> {
        self.tokens.issue(user, ttl)
    }

    pub fn revoke(&self, token: &str) {
        if self.revoked.revoke(token) {
            log::debug!("{} tokens revoked", self.revoked.len());
        }
    }

    /// Resolves a bearer token to its user. Revocation and expiry are checked on every call.
    pub async fn validate(&self, token: &str) -> Result<User, AuthError> {
        let claims = self.tokens.decode(token)?;

        if self.revoked.is_revoked(token) {
            return Err(AuthError::Revoked);
        }
        if claims.is_expired() {
            return Err(AuthError::Expired);
        }

        self.store
            .find_user_by_username(&claims.sub)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?
            .ok_or(AuthError::Malformed)
    }

    pub fn require_role(&self, user: &User, role: Role) -> Result<(), AuthError> {
        if user.role == role {
            Ok(())
        } else {
            Err(AuthError::Forbidden)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    fn service_with(store: Arc<MemoryStore>) -> CredentialService {
        CredentialService::new(
            store,
            TokenService::new("test_secret", Duration::minutes(30)),
            4,
        )
    }

    fn service() -> CredentialService {
        service_with(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_email_format() {
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email("first.last+tag@mail.example.org"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("a@x"));
        assert!(!is_valid_email("a@x.c"));
    }

    #[tokio::test]
    async fn test_register_creates_user_role_account() {
        let credentials = service();
        let user = credentials.register("alice", "a@x.com", "secret1").await.unwrap();

        assert_eq!(user.id, 1);
        assert_eq!(user.role, Role::User);
        assert_ne!(user.password_hash, "secret1");
    }

    #[tokio::test]
    async fn test_registration_precedence() {
        let credentials = service();
        credentials.register("alice", "a@x.com", "secret1").await.unwrap();

        assert_eq!(
            credentials.register("alice", "other@x.com", "secret1").await,
            Err(RegistrationError::NameTaken)
        );
        // Taken name wins over a malformed email.
        assert_eq!(
            credentials.register("alice", "not-an-email", "secret1").await,
            Err(RegistrationError::NameTaken)
        );
        assert_eq!(
            credentials.register("bob", "a@x.com", "secret1").await,
            Err(RegistrationError::EmailTaken)
        );
        assert_eq!(
            credentials.register("bob", "not-an-email", "secret1").await,
            Err(RegistrationError::InvalidEmail)
        );
    }

    #[tokio::test]
    async fn test_registration_persistence_failure() {
        let store = Arc::new(MemoryStore::new());
        let credentials = service_with(store.clone());
        store.fail_writes(true);

        assert!(matches!(
            credentials.register("alice", "a@x.com", "secret1").await,
            Err(RegistrationError::Persistence(_))
        ));

        store.fail_writes(false);
        assert!(credentials.authenticate("alice", "secret1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_authenticate_returns_registered_record() {
        let credentials = service();
        let registered = credentials.register("alice", "a@x.com", "secret1").await.unwrap();

        let authenticated = credentials.authenticate("alice", "secret1").await.unwrap();
        assert_eq!(authenticated, Some(registered));

        assert_eq!(credentials.authenticate("alice", "secret2").await.unwrap(), None);
        assert_eq!(credentials.authenticate("nobody", "secret1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_token_lifecycle() {
        let credentials = service();
        let alice = credentials.register("alice", "a@x.com", "secret1").await.unwrap();

        let token = credentials.issue_token(&alice).unwrap();
        assert_eq!(credentials.validate(&token).await.unwrap().username, "alice");

        credentials.revoke(&token);
        assert_eq!(credentials.validate(&token).await, Err(AuthError::Revoked));

        let second = credentials.issue_token(&alice).unwrap();
        assert_ne!(second, token);
        assert!(credentials.validate(&second).await.is_ok());
    }

    #[tokio::test]
    async fn test_zero_ttl_token_is_expired() {
        let credentials = service();
        let alice = credentials.register("alice", "a@x.com", "secret1").await.unwrap();

        let token = credentials
            .issue_token_with_ttl(&alice, Duration::zero())
            .unwrap();
        assert_eq!(credentials.validate(&token).await, Err(AuthError::Expired));
    }

    #[tokio::test]
    async fn test_malformed_token() {
        let credentials = service();
        assert_eq!(
            credentials.validate("garbage").await,
            Err(AuthError::Malformed)
        );
    }

    #[tokio::test]
    async fn test_require_role() {
        let credentials = service();
        let alice = credentials.register("alice", "a@x.com", "secret1").await.unwrap();

        assert_eq!(
            credentials.require_role(&alice, Role::Admin),
            Err(AuthError::Forbidden)
        );
        assert!(credentials.require_role(&alice, Role::User).is_ok());
    }
}
