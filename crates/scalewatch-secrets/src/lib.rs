//! scalewatch-secrets — named credentials for collaborator adapters.
//!
//! # Architecture
//!
//! ```text
//! SecretResolver (cached snapshot, tokio RwLock)
//!   └── SecretBackend
//!       ├── EnvBackend    (prefixed environment variables, read-only)
//!       ├── StoreBackend  (local redb secrets table)
//!       └── MemoryBackend (tests, tooling)
//!
//! SecretToken ── TokenSource for JsonClient, re-resolves after a 401
//! ```
//!
//! The resolver loads the backend's full key set once and serves reads
//! from an immutable snapshot. A write (`set`, `delete`) or an explicit
//! `invalidate` drops the snapshot; the next read reloads it under the
//! write lock, so rotation never races with concurrent readers.
//!
//! Lookups fail closed: a missing key is `SecretError::NotFound`, never an
//! empty string.

pub mod backend;
pub mod error;
pub mod resolver;
pub mod token;

pub use backend::{EnvBackend, MemoryBackend, SecretBackend, StoreBackend};
pub use error::SecretError;
pub use resolver::SecretResolver;
pub use token::SecretToken;
