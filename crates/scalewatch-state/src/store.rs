//! redb-backed persistence for standalone scalewatch.
//!
//! Typed operations over desired counts and secrets. The store supports
//! both on-disk and in-memory backends (the latter for testing).

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

fn open_err(e: impl Display) -> StateError {
    StateError::Open(e.to_string())
}

fn txn_err(e: impl Display) -> StateError {
    StateError::Transaction(e.to_string())
}

fn in_table<E: Display>(table: &'static str) -> impl Fn(E) -> StateError {
    move |e| StateError::Table {
        table,
        reason: e.to_string(),
    }
}

fn encode<T: Serialize>(table: &'static str, key: &str, record: &T) -> StateResult<Vec<u8>> {
    serde_json::to_vec(record).map_err(|e| StateError::Encode {
        table,
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn decode<T: DeserializeOwned>(table: &'static str, key: &str, bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(|e| StateError::Corrupt {
        table,
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(open_err)?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(open_err)?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(txn_err)?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(DESIRED_COUNTS)
            .map_err(in_table(DESIRED_COUNTS_TABLE))?;
        txn.open_table(SECRETS).map_err(in_table(SECRETS_TABLE))?;
        txn.commit().map_err(txn_err)?;
        Ok(())
    }

    // ── Desired counts ─────────────────────────────────────────────

    /// Record the desired count for a service.
    pub fn put_desired_count(&self, service_id: &str, desired_count: u32) -> StateResult<()> {
        let record = DesiredCountRecord {
            service_id: service_id.to_string(),
            desired_count,
            updated_at: epoch_secs(),
        };
        let value = encode(DESIRED_COUNTS_TABLE, service_id, &record)?;
        let txn = self.db.begin_write().map_err(txn_err)?;
        {
            let mut table = txn
                .open_table(DESIRED_COUNTS)
                .map_err(in_table(DESIRED_COUNTS_TABLE))?;
            table
                .insert(service_id, value.as_slice())
                .map_err(in_table(DESIRED_COUNTS_TABLE))?;
        }
        txn.commit().map_err(txn_err)?;
        debug!(service = %service_id, desired_count, "desired count stored");
        Ok(())
    }

    /// Get the desired-count record for a service.
    pub fn get_desired_count(&self, service_id: &str) -> StateResult<Option<DesiredCountRecord>> {
        let txn = self.db.begin_read().map_err(txn_err)?;
        let table = txn
            .open_table(DESIRED_COUNTS)
            .map_err(in_table(DESIRED_COUNTS_TABLE))?;
        match table
            .get(service_id)
            .map_err(in_table(DESIRED_COUNTS_TABLE))?
        {
            Some(guard) => Ok(Some(decode(DESIRED_COUNTS_TABLE, service_id, guard.value())?)),
            None => Ok(None),
        }
    }

    /// List all desired-count records.
    pub fn list_desired_counts(&self) -> StateResult<Vec<DesiredCountRecord>> {
        let txn = self.db.begin_read().map_err(txn_err)?;
        let table = txn
            .open_table(DESIRED_COUNTS)
            .map_err(in_table(DESIRED_COUNTS_TABLE))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(in_table(DESIRED_COUNTS_TABLE))? {
            let (key, value) = entry.map_err(in_table(DESIRED_COUNTS_TABLE))?;
            results.push(decode(DESIRED_COUNTS_TABLE, key.value(), value.value())?);
        }
        Ok(results)
    }

    // ── Secrets ────────────────────────────────────────────────────

    /// Insert or update a secret.
    pub fn put_secret(&self, key: &str, value: &str) -> StateResult<()> {
        let record = SecretRecord {
            value: value.to_string(),
            updated_at: epoch_secs(),
        };
        let encoded = encode(SECRETS_TABLE, key, &record)?;
        let txn = self.db.begin_write().map_err(txn_err)?;
        {
            let mut table = txn.open_table(SECRETS).map_err(in_table(SECRETS_TABLE))?;
            table
                .insert(key, encoded.as_slice())
                .map_err(in_table(SECRETS_TABLE))?;
        }
        txn.commit().map_err(txn_err)?;
        debug!(%key, "secret stored");
        Ok(())
    }

    /// Get a secret value by key.
    pub fn get_secret(&self, key: &str) -> StateResult<Option<String>> {
        let txn = self.db.begin_read().map_err(txn_err)?;
        let table = txn.open_table(SECRETS).map_err(in_table(SECRETS_TABLE))?;
        match table.get(key).map_err(in_table(SECRETS_TABLE))? {
            Some(guard) => {
                let record: SecretRecord = decode(SECRETS_TABLE, key, guard.value())?;
                Ok(Some(record.value))
            }
            None => Ok(None),
        }
    }

    /// All secrets, keyed by name.
    pub fn list_secrets(&self) -> StateResult<BTreeMap<String, String>> {
        let txn = self.db.begin_read().map_err(txn_err)?;
        let table = txn.open_table(SECRETS).map_err(in_table(SECRETS_TABLE))?;
        let mut results = BTreeMap::new();
        for entry in table.iter().map_err(in_table(SECRETS_TABLE))? {
            let (key, value) = entry.map_err(in_table(SECRETS_TABLE))?;
            let record: SecretRecord = decode(SECRETS_TABLE, key.value(), value.value())?;
            results.insert(key.value().to_string(), record.value);
        }
        Ok(results)
    }

    /// Delete a secret by key. Returns true if it existed.
    pub fn delete_secret(&self, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(txn_err)?;
        let existed;
        {
            let mut table = txn.open_table(SECRETS).map_err(in_table(SECRETS_TABLE))?;
            existed = table
                .remove(key)
                .map_err(in_table(SECRETS_TABLE))?
                .is_some();
        }
        txn.commit().map_err(txn_err)?;
        debug!(%key, existed, "secret deleted");
        Ok(existed)
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Desired counts ─────────────────────────────────────────────

    #[test]
    fn desired_count_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_desired_count("checkout", 3).unwrap();

        let record = store.get_desired_count("checkout").unwrap().unwrap();
        assert_eq!(record.service_id, "checkout");
        assert_eq!(record.desired_count, 3);
        assert!(record.updated_at > 0);
    }

    #[test]
    fn desired_count_update_in_place() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_desired_count("checkout", 3).unwrap();
        store.put_desired_count("checkout", 6).unwrap();

        assert_eq!(store.get_desired_count("checkout").unwrap().unwrap().desired_count, 6);
        assert_eq!(store.list_desired_counts().unwrap().len(), 1);
    }

    #[test]
    fn desired_count_list_all() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_desired_count("a", 1).unwrap();
        store.put_desired_count("b", 2).unwrap();

        let all = store.list_desired_counts().unwrap();
        let ids: Vec<_> = all.iter().map(|r| r.service_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    // ── Secrets ────────────────────────────────────────────────────

    #[test]
    fn secret_put_get_delete() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_secret("SCORER_TOKEN", "t0k3n").unwrap();

        assert_eq!(store.get_secret("SCORER_TOKEN").unwrap().as_deref(), Some("t0k3n"));
        assert!(store.delete_secret("SCORER_TOKEN").unwrap());
        assert!(!store.delete_secret("SCORER_TOKEN").unwrap());
        assert_eq!(store.get_secret("SCORER_TOKEN").unwrap(), None);
    }

    #[test]
    fn secret_list_is_sorted_map() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_secret("B", "2").unwrap();
        store.put_secret("A", "1").unwrap();

        let all = store.list_secrets().unwrap();
        assert_eq!(all.keys().collect::<Vec<_>>(), vec!["A", "B"]);
        assert_eq!(all["A"], "1");
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.put_desired_count("api", 4).unwrap();
            store.put_secret("KEY", "value").unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        assert_eq!(store.get_desired_count("api").unwrap().unwrap().desired_count, 4);
        assert_eq!(store.get_secret("KEY").unwrap().as_deref(), Some("value"));
    }

    // ── Edge cases ─────────────────────────────────────────────────

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_desired_counts().unwrap().is_empty());
        assert!(store.list_secrets().unwrap().is_empty());
        assert_eq!(store.get_desired_count("nope").unwrap(), None);
        assert!(!store.delete_secret("nope").unwrap());
    }

    // ── Errors ─────────────────────────────────────────────────────

    fn write_raw(store: &StateStore, key: &str, bytes: &[u8]) {
        let txn = store.db.begin_write().unwrap();
        {
            let mut table = txn.open_table(DESIRED_COUNTS).unwrap();
            table.insert(key, bytes).unwrap();
        }
        txn.commit().unwrap();
    }

    #[test]
    fn corrupt_desired_count_names_table_and_key() {
        let store = StateStore::open_in_memory().unwrap();
        write_raw(&store, "checkout", b"not json");

        let err = store.get_desired_count("checkout").unwrap_err();
        assert!(
            matches!(&err, StateError::Corrupt { table: "desired_counts", key, .. } if key == "checkout"),
            "{err:?}"
        );
        assert_eq!(err.table(), Some("desired_counts"));
        assert!(err.to_string().starts_with("corrupt desired_counts record checkout:"));

        let err = store.list_desired_counts().unwrap_err();
        assert!(matches!(err, StateError::Corrupt { .. }), "{err:?}");
        // Secrets live in their own table and stay readable.
        assert!(store.list_secrets().unwrap().is_empty());
    }

    #[test]
    fn open_in_missing_directory_is_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = match StateStore::open(&dir.path().join("absent").join("state.redb")) {
            Ok(_) => panic!("open should fail"),
            Err(e) => e,
        };
        assert!(matches!(err, StateError::Open(_)), "{err:?}");
        assert_eq!(err.table(), None);
    }
}
