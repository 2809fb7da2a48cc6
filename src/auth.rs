//! Caller identity.
//!
//! The relay does not own accounts. An [`Authenticator`] turns a bearer
//! token into a [`Principal`] carrying the caller's id and credit balance,
//! and the rest of the service trusts that as given.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ConfigError;

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub principal_id: String,
    pub credit_balance: i64,
}

/// Resolves bearer tokens to principals.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// `None` when the token is unknown.
    async fn authenticate(&self, token: &str) -> Option<Principal>;
}

/// Fixed token table, loaded from configuration.
#[derive(Debug, Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, Principal>,
}

impl StaticTokenAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse comma-separated `token:principal_id:credits` entries.
    pub fn parse(entries: &str) -> Result<Self, ConfigError> {
        let mut auth = Self::new();
        for entry in entries.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let mut parts = entry.splitn(3, ':');
            let (Some(token), Some(principal_id), Some(credits)) =
                (parts.next(), parts.next(), parts.next())
            else {
                return Err(invalid("expected token:principal_id:credits"));
            };
            if token.is_empty() || principal_id.is_empty() {
                return Err(invalid("token and principal_id must not be empty"));
            }
            let credit_balance = credits
                .trim()
                .parse::<i64>()
                .map_err(|e| invalid(&format!("credits for {principal_id}: {e}")))?;
            auth = auth.with_token(token, principal_id, credit_balance);
        }
        Ok(auth)
    }

    pub fn with_token(
        mut self,
        token: impl Into<String>,
        principal_id: impl Into<String>,
        credit_balance: i64,
    ) -> Self {
        self.tokens.insert(
            token.into(),
            Principal {
                principal_id: principal_id.into(),
                credit_balance,
            },
        );
        self
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: "RELAY_API_TOKENS".to_string(),
        message: message.to_string(),
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, token: &str) -> Option<Principal> {
        self.tokens.get(token).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_entries() {
        let auth = StaticTokenAuthenticator::parse("tok-a:alice:100, tok-b:bob:0,").unwrap();
        assert_eq!(auth.len(), 2);
        assert_eq!(
            auth.authenticate("tok-a").await,
            Some(Principal {
                principal_id: "alice".into(),
                credit_balance: 100
            })
        );
        assert_eq!(auth.authenticate("tok-b").await.unwrap().credit_balance, 0);
        assert!(auth.authenticate("nope").await.is_none());
    }

    #[test]
    fn empty_config_is_empty() {
        assert!(StaticTokenAuthenticator::parse("").unwrap().is_empty());
    }

    #[test]
    fn malformed_entries_rejected() {
        for bad in ["tok-a", "tok-a:alice", "tok-a:alice:lots", ":alice:5", "tok::5"] {
            assert!(
                StaticTokenAuthenticator::parse(bad).is_err(),
                "{bad:?} should be rejected"
            );
        }
    }
}
