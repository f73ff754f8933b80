use bcrypt::{hash, verify, BcryptError};

/// One-way hashes `password` with the given bcrypt cost.
pub fn hash_password(password: &str, cost: u32) -> Result<String, BcryptError> {
    hash(password, cost)
}

/// A hash that bcrypt cannot parse is reported as an error rather than a mismatch.
pub fn verify_password(password: &str, hashed_password: &str) -> Result<bool, BcryptError> {
    verify(password, hashed_password)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hashing_and_verification() {
        let hashed = hash_password("secret1", bcrypt::DEFAULT_COST).unwrap();

        assert_ne!(hashed, "secret1");
        assert!(verify_password("secret1", &hashed).unwrap());
        assert!(!verify_password("secret2", &hashed).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        let first = hash_password("secret1", 4).unwrap();
        let second = hash_password("secret1", 4).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_verify_with_invalid_hash() {
        assert!(verify_password("secret1", "invalidhashformat").is_err());
    }
}
