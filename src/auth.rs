//! Actor identity resolution
//!
//! The workflow never trusts a claimed signer id on its own: the service
//! resolves the acting user from the request context through this trait and
//! compares. Real deployments back this with their identity provider.

use crate::error::WorkflowError;
use std::collections::HashMap;

/// Opaque per-request credential material, as extracted by the transport
/// layer (HTTP header, CLI session, ...).
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub token: String,
}

impl RequestContext {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

pub trait AuthorizationProvider: Send + Sync {
    /// Resolve the acting participant, or fail with `Forbidden` when the
    /// context carries no valid identity.
    fn current_actor(&self, ctx: &RequestContext) -> Result<String, WorkflowError>;
}

/// Fixed token-to-signer map for tests and demos.
#[derive(Debug, Default)]
pub struct StaticAuth {
    tokens: HashMap<String, String>,
}

impl StaticAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_actor(mut self, token: impl Into<String>, signer_id: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), signer_id.into());
        self
    }
}

impl AuthorizationProvider for StaticAuth {
    fn current_actor(&self, ctx: &RequestContext) -> Result<String, WorkflowError> {
        self.tokens
            .get(&ctx.token)
            .cloned()
            .ok_or(WorkflowError::Forbidden)
    }
}
