use std::collections::HashMap;

use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;

use crate::config::TokenEntry;

/// Identity carried by a verified bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub subject: String,
    pub roles: Vec<String>,
}

impl Claims {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Identity-provider port.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// `None` for unknown, expired or malformed tokens.
    async fn verify(&self, token: &str) -> Option<Claims>;
}

/// Verifier backed by a fixed token table from the config file.
#[derive(Debug, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, Claims>,
}

impl StaticTokenVerifier {
    pub fn from_entries(entries: &[TokenEntry]) -> Self {
        let tokens = entries
            .iter()
            .filter(|e| !e.token.is_empty())
            .map(|e| {
                (
                    e.token.clone(),
                    Claims {
                        subject: e.subject.clone(),
                        roles: e.roles.clone(),
                    },
                )
            })
            .collect();
        Self { tokens }
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Option<Claims> {
        self.tokens.get(token).cloned()
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
