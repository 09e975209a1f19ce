use std::collections::HashMap;

use anyhow::anyhow;

use crate::error::{LibError, Result};
use crate::models::Identity;
use crate::roles::Role;

/// Resolves an opaque request credential to the caller's identity.
///
/// Token issuance and verification live outside this crate; implementations
/// only hand back the verified `{id, role}` claim.
pub trait IdentityProvider: Send + Sync {
    fn resolve(&self, credential: &str) -> Option<Identity>;
}

/// Fixed credential table for tests and local development.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityProvider {
    tokens: HashMap<String, Identity>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.tokens.insert(token.into(), identity);
        self
    }

    /// Parses `token:user_id:role` entries separated by commas.
    pub fn parse(entries: &str) -> Result<Self> {
        let mut provider = Self::new();
        for entry in entries.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            let mut parts = entry.splitn(3, ':');
            let (Some(token), Some(raw_id), Some(raw_role)) =
                (parts.next(), parts.next(), parts.next())
            else {
                return Err(LibError::invalid_with_code(
                    "invalid_config",
                    "Identity entries must look like token:user_id:role",
                    anyhow!("malformed identity entry '{}'", entry),
                ));
            };
            let id = raw_id.trim().parse::<i64>().map_err(|err| {
                LibError::invalid_with_code(
                    "invalid_config",
                    "Identity user id must be an integer",
                    anyhow!("bad user id in '{}': {}", entry, err),
                )
            })?;
            provider = provider.with_token(token.trim(), Identity::new(id, Role::parse_lenient(raw_role)));
        }
        Ok(provider)
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn resolve(&self, credential: &str) -> Option<Identity> {
        self.tokens.get(credential.trim()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserId;

    #[test]
    fn parses_token_table() {
        let provider = StaticIdentityProvider::parse("alice:1:owner, bob:2:editor,eve:3:hacker")
            .expect("token table should parse");
        assert_eq!(
            provider.resolve("alice"),
            Some(Identity {
                id: UserId(1),
                role: Role::Owner
            })
        );
        assert_eq!(
            provider.resolve("bob").map(|identity| identity.role),
            Some(Role::Contributor)
        );
        assert_eq!(
            provider.resolve("eve").map(|identity| identity.role),
            Some(Role::Viewer)
        );
        assert_eq!(provider.resolve("mallory"), None);
    }

    #[test]
    fn rejects_malformed_entries() {
        let err = StaticIdentityProvider::parse("alice:owner").expect_err("missing field");
        assert_eq!(err.public, "Identity entries must look like token:user_id:role");

        let err = StaticIdentityProvider::parse("alice:x:owner").expect_err("bad id");
        assert_eq!(err.public, "Identity user id must be an integer");
    }
}
