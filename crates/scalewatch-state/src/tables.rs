//! redb table definitions for the scalewatch state store.

use redb::TableDefinition;

pub const DESIRED_COUNTS_TABLE: &str = "desired_counts";
pub const SECRETS_TABLE: &str = "secrets";

/// Desired-count records keyed by service id.
pub const DESIRED_COUNTS: TableDefinition<&str, &[u8]> = TableDefinition::new(DESIRED_COUNTS_TABLE);

/// Secret values keyed by secret name.
pub const SECRETS: TableDefinition<&str, &[u8]> = TableDefinition::new(SECRETS_TABLE);
