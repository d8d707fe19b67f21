//! redb table definitions for the Bootgrid state store.

use redb::TableDefinition;

/// Node records keyed by `{node_id}`.
pub const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");

/// Node id keyed by normalised `{hwaddr}`.
pub const HWADDRS: TableDefinition<&str, &str> = TableDefinition::new("hwaddrs");

/// Status events keyed by a monotonically increasing sequence number.
pub const STATUS: TableDefinition<u64, &[u8]> = TableDefinition::new("status");
