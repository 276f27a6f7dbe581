//! Secret resolution errors.

use scalewatch_core::CycleError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret not found: {0}")]
    NotFound(String),

    #[error("secret backend {0} is read-only")]
    ReadOnly(&'static str),

    #[error("secret backend error: {0}")]
    Backend(String),
}

impl From<scalewatch_state::StateError> for SecretError {
    fn from(e: scalewatch_state::StateError) -> Self {
        Self::Backend(e.to_string())
    }
}

impl From<SecretError> for CycleError {
    fn from(e: SecretError) -> Self {
        match e {
            SecretError::NotFound(key) => CycleError::SecretNotFound(key),
            other => CycleError::SecretNotFound(other.to_string()),
        }
    }
}
