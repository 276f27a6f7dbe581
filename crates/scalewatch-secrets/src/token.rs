//! Bearer tokens backed by the secret resolver.

use std::sync::Arc;

use scalewatch_core::{BoxFuture, TokenSource};

use crate::resolver::SecretResolver;

/// A token given as a config value: either a literal or `secret://KEY`.
///
/// Invalidation drops the resolver's cache so a rotated credential is
/// picked up on the next request.
pub struct SecretToken {
    resolver: Arc<SecretResolver>,
    reference: String,
}

impl SecretToken {
    pub fn new(resolver: Arc<SecretResolver>, reference: impl Into<String>) -> Self {
        Self {
            resolver,
            reference: reference.into(),
        }
    }
}

impl TokenSource for SecretToken {
    fn token(&self) -> BoxFuture<'_, Result<String, String>> {
        Box::pin(async move {
            self.resolver
                .resolve(&self.reference)
                .await
                .map_err(|e| e.to_string())
        })
    }

    fn invalidate(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move { self.resolver.invalidate().await })
    }
}
