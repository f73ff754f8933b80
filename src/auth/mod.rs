pub mod credentials;
pub mod extractors;
pub mod middleware;
pub mod password;
pub mod revocation;
pub mod token;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

pub use credentials::CredentialService;
pub use extractors::{AdminAccess, AuthenticatedUser, BearerToken};
pub use middleware::AuthMiddleware;
pub use password::{hash_password, verify_password};
pub use revocation::RevocationSet;
pub use token::{Claims, TokenService};

/// Why a credential or token was rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Incorrect username or password")]
    InvalidCredentials,

    #[error("Missing bearer token")]
    MissingToken,

    #[error("Token has expired")]
    Expired,

    #[error("Token has been revoked")]
    Revoked,

    #[error("Could not validate credentials")]
    Malformed,

    #[error("Insufficient permissions")]
    Forbidden,

    #[error("authentication backend failure: {0}")]
    Internal(String),
}

/// Why a registration was refused. Checked in declaration order.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("Username is already taken")]
    NameTaken,

    #[error("Invalid email format")]
    InvalidEmail,

    #[error("Email is already registered")]
    EmailTaken,

    #[error("registration could not be stored: {0}")]
    Persistence(String),
}

/// Payload for `POST /api/users/register`.
///
/// The email format is not validated here: it is checked by the credential service after
/// the username uniqueness check.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    /// Between 3 and 50 characters.
    #[validate(length(min = 3, max = 50))]
    pub username: String,
    pub email: String,
    /// At least 6 characters.
    #[validate(length(min = 6))]
    pub password: String,
}

/// Payload for the login endpoints.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
}

/// Returned by a successful login.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

impl TokenResponse {
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
        }
    }
}
