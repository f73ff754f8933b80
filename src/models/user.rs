use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Role of a user account.
/// Corresponds to the `user_role` SQL enum.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular account; owns tasks.
    #[default]
    User,
    /// May use the admin endpoints.
    Admin,
}

/// A user record as stored in the `users` table.
///
/// The password hash is never serialized; responses use [`UserRead`].
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    #[sqlx(rename = "password")]
    pub password_hash: String,
    pub role: Role,
}

/// Fields required to insert a user. The password must already be hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// Public view of a user returned by the API.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UserRead {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub role: Role,
}

impl From<User> for UserRead {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_read_hides_password_hash() {
        let user = User {
            id: 7,
            username: "alice".into(),
            email: "a@x.com".into(),
            password_hash: "$2b$04$abcdefghijklmnopqrstuv".into(),
            role: Role::User,
        };

        let json = serde_json::to_value(UserRead::from(user)).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["role"], "user");
        assert!(json.get("password").is_none());
        assert!(json.get("password_hash").is_none());
    }
}
