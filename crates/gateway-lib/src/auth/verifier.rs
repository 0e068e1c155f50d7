// ============================
// crates/gateway-lib/src/auth/verifier.rs
// ============================
//! Identity verification: opaque credential -> verified actor.
//!
//! Token issuance lives in a separate auth service; the gateway only ever
//! asks "who does this credential belong to".

use crate::error::AppError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::Path;
use ticketchat_common::ActorInfo;

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Verify an opaque credential, returning the actor it belongs to
    async fn verify(&self, token: &str) -> Result<ActorInfo, AppError>;
}

/// Verifier backed by a static token map. Suitable for development and
/// tests; production deployments plug in their auth service here.
#[derive(Default)]
pub struct StaticTokenVerifier {
    tokens: DashMap<String, ActorInfo>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a credential for an actor
    pub fn insert(&self, token: impl Into<String>, actor: ActorInfo) {
        self.tokens.insert(token.into(), actor);
    }

    /// Load a `{token: {id, name, role}}` JSON map from disk
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let parsed: std::collections::HashMap<String, ActorInfo> =
            serde_json::from_str(&content)?;

        let verifier = Self::new();
        for (token, actor) in parsed {
            verifier.insert(token, actor);
        }
        Ok(verifier)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl IdentityVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<ActorInfo, AppError> {
        self.tokens
            .get(token)
            .map(|entry| entry.clone())
            .ok_or_else(|| AppError::Auth("unknown or expired credential".to_string()))
    }
}
