use dashmap::DashSet;

/// Tokens invalidated by logout, shared by every request in the process.
///
/// Entries are never evicted, so the set grows with the number of logouts for the
/// lifetime of the process.
#[derive(Debug, Default)]
pub struct RevocationSet {
    tokens: DashSet<String>,
}

impl RevocationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the token was already revoked.
    pub fn revoke(&self, token: &str) -> bool {
        self.tokens.insert(token.to_string())
    }

    pub fn is_revoked(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }

    pub(crate) fn len(&self) -> usize {
        self.tokens.len()
    }
}
