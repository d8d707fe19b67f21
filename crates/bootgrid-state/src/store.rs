//! StateStore — redb-backed node registry and status log for Bootgrid.
//!
//! Provides typed CRUD over node records, hardware-address lookup with
//! atomic admission of unseen addresses, and an append-only status log.
//! All values are JSON-serialized into redb's `&[u8]` value columns. The
//! store supports both on-disk and in-memory backends (the latter for
//! testing).

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use boot_core::{Node, NodeRegistry, RegistryError, StatusError, StatusEvent, StatusSink};
use redb::{Database, ReadableDatabase, ReadableTable, Table};
use tracing::{debug, info, warn};

use crate::error::{StateError, StateResult};
use crate::tables::*;

/// Placeholder capacity when none is configured.
const DEFAULT_MAX_UNCONFIGURED: u32 = 256;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
    max_unconfigured: u32,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            max_unconfigured: DEFAULT_MAX_UNCONFIGURED,
        };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            max_unconfigured: DEFAULT_MAX_UNCONFIGURED,
        };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Limit the number of placeholder nodes admitted for unseen addresses.
    pub fn with_max_unconfigured(mut self, max: u32) -> Self {
        self.max_unconfigured = max;
        self
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(NODES).map_err(map_err!(Table))?;
        txn.open_table(HWADDRS).map_err(map_err!(Table))?;
        txn.open_table(STATUS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Nodes ──────────────────────────────────────────────────────

    /// Insert or update a node, re-indexing its hardware addresses.
    pub fn put_node(&self, node: &Node) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut nodes = txn.open_table(NODES).map_err(map_err!(Table))?;
            let mut index = txn.open_table(HWADDRS).map_err(map_err!(Table))?;
            write_node(&mut nodes, &mut index, node)?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(node = %node.id, "node stored");
        Ok(())
    }

    /// Store a node read from the definitions file.
    ///
    /// A discoverable definition that has already been claimed keeps the
    /// claimed address, so re-importing does not release the node.
    pub fn import_node(&self, node: &Node) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut nodes = txn.open_table(NODES).map_err(map_err!(Table))?;
            let mut index = txn.open_table(HWADDRS).map_err(map_err!(Table))?;
            let mut node = node.clone();
            if node.discoverable && node.hwaddrs().next().is_none() {
                let claimed = read_node(&nodes, &node.id)?
                    .filter(|stored| !stored.discoverable && stored.hwaddrs().next().is_some());
                if let Some(stored) = claimed {
                    keep_claim(&mut node, &stored);
                    debug!(node = %node.id, "claimed address kept on import");
                }
            }
            write_node(&mut nodes, &mut index, &node)?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(node = %node.id, "node imported");
        Ok(())
    }

    /// Get a node by ID.
    pub fn get_node(&self, node_id: &str) -> StateResult<Option<Node>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODES).map_err(map_err!(Table))?;
        read_node(&table, node_id)
    }

    /// List all nodes, ordered by ID.
    pub fn list_nodes(&self) -> StateResult<Vec<Node>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODES).map_err(map_err!(Table))?;
        read_all_nodes(&table)
    }

    /// Delete a node and its address bindings. Returns true if it existed.
    pub fn delete_node(&self, node_id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut nodes = txn.open_table(NODES).map_err(map_err!(Table))?;
            let mut index = txn.open_table(HWADDRS).map_err(map_err!(Table))?;
            match read_node(&nodes, node_id)? {
                Some(node) => {
                    unbind_hwaddrs(&mut index, &node)?;
                    nodes.remove(node_id).map_err(map_err!(Write))?;
                    existed = true;
                }
                None => existed = false,
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(node = %node_id, existed, "node deleted");
        Ok(existed)
    }

    /// Look up the node bound to a hardware address.
    pub fn node_by_hwaddr(&self, hwaddr: &str) -> StateResult<Option<Node>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let index = txn.open_table(HWADDRS).map_err(map_err!(Table))?;
        let node_id = index
            .get(hwaddr)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value().to_string());
        match node_id {
            Some(id) => {
                let nodes = txn.open_table(NODES).map_err(map_err!(Table))?;
                read_node(&nodes, &id)
            }
            None => Ok(None),
        }
    }

    /// Return the node bound to `hwaddr`, admitting the address if unseen.
    ///
    /// Unseen addresses first claim a configured `discoverable` node with
    /// no bound address; failing that a placeholder is created, up to the
    /// configured capacity. The miss path runs in one write transaction.
    pub fn admit(&self, hwaddr: &str) -> StateResult<Node> {
        if let Some(node) = self.node_by_hwaddr(hwaddr)? {
            return Ok(node);
        }

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let node = {
            let mut nodes = txn.open_table(NODES).map_err(map_err!(Table))?;
            let mut index = txn.open_table(HWADDRS).map_err(map_err!(Table))?;

            // Another writer may have admitted the address since the read above.
            let bound = index
                .get(hwaddr)
                .map_err(map_err!(Read))?
                .map(|guard| guard.value().to_string());
            let existing = match bound {
                Some(id) => read_node(&nodes, &id)?,
                None => None,
            };

            match existing {
                Some(node) => node,
                None => {
                    let all = read_all_nodes(&nodes)?;
                    let claimable = all
                        .iter()
                        .find(|n| n.discoverable && n.hwaddrs().next().is_none())
                        .cloned();
                    match claimable {
                        Some(mut node) => {
                            node.bind_hwaddr(hwaddr);
                            node.discoverable = false;
                            write_node(&mut nodes, &mut index, &node)?;
                            info!(%hwaddr, node = %node.id, "discoverable node claimed");
                            node
                        }
                        None => {
                            let placeholders = all.iter().filter(|n| !n.is_valid()).count();
                            if placeholders >= self.max_unconfigured as usize {
                                return Err(StateError::NoUnconfiguredSlot(hwaddr.to_string()));
                            }
                            let node = Node::placeholder(hwaddr);
                            write_node(&mut nodes, &mut index, &node)?;
                            info!(%hwaddr, "unconfigured node admitted");
                            node
                        }
                    }
                }
            }
        };
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(node)
    }

    // ── Status ─────────────────────────────────────────────────────

    /// Append a status event. Returns its sequence number.
    pub fn append_status(&self, event: &StatusEvent) -> StateResult<u64> {
        let value = serde_json::to_vec(event).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let seq;
        {
            let mut table = txn.open_table(STATUS).map_err(map_err!(Table))?;
            seq = table
                .last()
                .map_err(map_err!(Read))?
                .map(|(key, _)| key.value() + 1)
                .unwrap_or(0);
            table
                .insert(seq, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(seq)
    }

    /// List status events in append order, optionally for one node.
    pub fn list_status(&self, node_id: Option<&str>) -> StateResult<Vec<StatusEvent>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(STATUS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let event: StatusEvent =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if node_id.is_none_or(|id| id == event.node_id) {
                results.push(event);
            }
        }
        Ok(results)
    }

    /// Most recent status event per node.
    pub fn latest_status(&self) -> StateResult<BTreeMap<String, StatusEvent>> {
        let mut latest = BTreeMap::new();
        for event in self.list_status(None)? {
            latest.insert(event.node_id.clone(), event);
        }
        Ok(latest)
    }
}

impl NodeRegistry for StateStore {
    fn get_or_admit(&self, hwaddr: &str) -> Result<Node, RegistryError> {
        self.admit(hwaddr).map_err(|e| match e {
            StateError::NoUnconfiguredSlot(addr) => RegistryError::NoUnconfiguredSlot(addr),
            other => RegistryError::Backend(other.to_string()),
        })
    }
}

impl StatusSink for StateStore {
    fn append(&self, event: &StatusEvent) -> Result<(), StatusError> {
        self.append_status(event)
            .map(|_| ())
            .map_err(|e| StatusError(e.to_string()))
    }
}

fn read_node<T>(table: &T, node_id: &str) -> StateResult<Option<Node>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(node_id).map_err(map_err!(Read))? {
        Some(guard) => {
            let node: Node =
                serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
            Ok(Some(node))
        }
        None => Ok(None),
    }
}

fn read_all_nodes<T>(table: &T) -> StateResult<Vec<Node>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let mut results = Vec::new();
    for entry in table.iter().map_err(map_err!(Read))? {
        let (_, value) = entry.map_err(map_err!(Read))?;
        let node: Node = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
        results.push(node);
    }
    Ok(results)
}

/// Carry the addresses bound to `stored` over to `node`.
fn keep_claim(node: &mut Node, stored: &Node) {
    for (name, dev) in stored.netdevs.iter().filter(|(_, d)| !d.hwaddr.is_empty()) {
        let target = node.netdevs.entry(name.clone()).or_default();
        target.hwaddr = dev.hwaddr.clone();
        target.primary |= dev.primary;
    }
    node.discoverable = false;
}

/// Remove index entries that still point at `node`.
fn unbind_hwaddrs(index: &mut Table<'_, &'static str, &'static str>, node: &Node) -> StateResult<()> {
    for hwaddr in node.hwaddrs() {
        let owner = index
            .get(hwaddr)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value().to_string());
        if owner.as_deref() == Some(node.id.as_str()) {
            index.remove(hwaddr).map_err(map_err!(Write))?;
        }
    }
    Ok(())
}

fn write_node(
    nodes: &mut Table<'_, &'static str, &'static [u8]>,
    index: &mut Table<'_, &'static str, &'static str>,
    node: &Node,
) -> StateResult<()> {
    if let Some(previous) = read_node(&*nodes, &node.id)? {
        unbind_hwaddrs(index, &previous)?;
    }
    let value = serde_json::to_vec(node).map_err(map_err!(Serialize))?;
    nodes
        .insert(node.id.as_str(), value.as_slice())
        .map_err(map_err!(Write))?;
    for hwaddr in node.hwaddrs() {
        let previous_owner = index
            .insert(hwaddr, node.id.as_str())
            .map_err(map_err!(Write))?
            .map(|guard| guard.value().to_string());
        if let Some(owner) = previous_owner.filter(|owner| *owner != node.id) {
            warn!(%hwaddr, from = %owner, to = %node.id, "hardware address rebound");
            // A placeholder whose address now belongs to a configured node
            // would otherwise hold an unconfigured slot forever.
            if let Some(stale) = read_node(&*nodes, &owner)?.filter(|n| !n.is_valid()) {
                unbind_hwaddrs(index, &stale)?;
                nodes.remove(owner.as_str()).map_err(map_err!(Write))?;
                info!(node = %owner, "placeholder released");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use boot_core::NetDev;
    use std::collections::HashSet;

    fn test_node(id: &str, hwaddr: &str) -> Node {
        let mut node = Node {
            id: id.to_string(),
            container: "rocky-9".to_string(),
            ..Node::default()
        };
        node.netdevs.insert(
            "eth0".to_string(),
            NetDev {
                hwaddr: hwaddr.to_string(),
                ..NetDev::default()
            },
        );
        node
    }

    fn test_event(node_id: &str, sent: &str) -> StatusEvent {
        StatusEvent {
            node_id: node_id.to_string(),
            stage: "KERNEL".to_string(),
            sent: sent.to_string(),
            ipaddr: "10.0.0.5".to_string(),
            timestamp: 1000,
        }
    }

    // ── Node CRUD ──────────────────────────────────────────────────

    #[test]
    fn node_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let node = test_node("n0001", "de:ad:be:ef:00:01");

        store.put_node(&node).unwrap();
        assert_eq!(store.get_node("n0001").unwrap(), Some(node.clone()));
        assert_eq!(store.node_by_hwaddr("de:ad:be:ef:00:01").unwrap(), Some(node));
    }

    #[test]
    fn node_get_nonexistent_returns_none() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get_node("nope").unwrap().is_none());
        assert!(store.node_by_hwaddr("00:00:00:00:00:00").unwrap().is_none());
    }

    #[test]
    fn node_update_rebinds_hwaddr() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_node(&test_node("n0001", "de:ad:be:ef:00:01")).unwrap();
        store.put_node(&test_node("n0001", "de:ad:be:ef:00:02")).unwrap();

        assert!(store.node_by_hwaddr("de:ad:be:ef:00:01").unwrap().is_none());
        assert_eq!(
            store.node_by_hwaddr("de:ad:be:ef:00:02").unwrap().unwrap().id,
            "n0001"
        );
    }

    #[test]
    fn node_delete_removes_binding() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_node(&test_node("n0001", "de:ad:be:ef:00:01")).unwrap();

        assert!(store.delete_node("n0001").unwrap());
        assert!(!store.delete_node("n0001").unwrap());
        assert!(store.node_by_hwaddr("de:ad:be:ef:00:01").unwrap().is_none());
    }

    #[test]
    fn node_list_is_ordered() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_node(&test_node("n0002", "de:ad:be:ef:00:02")).unwrap();
        store.put_node(&test_node("n0001", "de:ad:be:ef:00:01")).unwrap();

        let ids: Vec<String> = store.list_nodes().unwrap().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["n0001", "n0002"]);
    }

    // ── Admission ──────────────────────────────────────────────────

    #[test]
    fn admit_returns_known_node() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_node(&test_node("n0001", "de:ad:be:ef:00:01")).unwrap();

        let node = store.admit("de:ad:be:ef:00:01").unwrap();
        assert_eq!(node.id, "n0001");
        assert!(node.is_valid());
    }

    #[test]
    fn admit_creates_placeholder_once() {
        let store = StateStore::open_in_memory().unwrap();
        let first = store.admit("de:ad:be:ef:00:01").unwrap();
        let second = store.admit("de:ad:be:ef:00:01").unwrap();

        assert!(!first.is_valid());
        assert_eq!(first, second);
        assert_eq!(store.list_nodes().unwrap().len(), 1);
    }

    #[test]
    fn admit_claims_discoverable_node() {
        let store = StateStore::open_in_memory().unwrap();
        let mut spare = test_node("n0009", "");
        spare.discoverable = true;
        store.put_node(&spare).unwrap();

        let node = store.admit("de:ad:be:ef:00:09").unwrap();
        assert_eq!(node.id, "n0009");
        assert!(node.is_valid());
        assert!(!node.discoverable);
        assert_eq!(node.netdevs["eth0"].hwaddr, "de:ad:be:ef:00:09");

        // The next unseen address no longer finds a discoverable node.
        let other = store.admit("de:ad:be:ef:00:10").unwrap();
        assert!(!other.is_valid());
    }

    #[test]
    fn admit_respects_capacity() {
        let store = StateStore::open_in_memory().unwrap().with_max_unconfigured(1);
        store.admit("de:ad:be:ef:00:01").unwrap();

        let err = store.admit("de:ad:be:ef:00:02").unwrap_err();
        assert!(matches!(err, StateError::NoUnconfiguredSlot(_)));
        // Already-admitted addresses still resolve.
        assert!(store.admit("de:ad:be:ef:00:01").is_ok());
    }

    #[test]
    fn configuring_placeholder_address_frees_its_slot() {
        let store = StateStore::open_in_memory().unwrap().with_max_unconfigured(1);
        store.admit("de:ad:be:ef:00:01").unwrap();
        store.put_node(&test_node("n0001", "de:ad:be:ef:00:01")).unwrap();

        let ids: Vec<String> = store.list_nodes().unwrap().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["n0001"]);
        assert_eq!(store.admit("de:ad:be:ef:00:01").unwrap().id, "n0001");

        let other = store.admit("de:ad:be:ef:00:02").unwrap();
        assert!(!other.is_valid());
    }

    #[test]
    fn rebinding_between_configured_nodes_keeps_both() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_node(&test_node("n0001", "de:ad:be:ef:00:01")).unwrap();
        store.put_node(&test_node("n0002", "de:ad:be:ef:00:01")).unwrap();

        assert_eq!(store.list_nodes().unwrap().len(), 2);
        assert_eq!(
            store.node_by_hwaddr("de:ad:be:ef:00:01").unwrap().unwrap().id,
            "n0002"
        );
    }

    #[test]
    fn import_keeps_claimed_discoverable_node() {
        let store = StateStore::open_in_memory().unwrap();
        let mut spare = test_node("n0009", "");
        spare.discoverable = true;
        store.import_node(&spare).unwrap();
        store.admit("de:ad:be:ef:00:09").unwrap();

        store.import_node(&spare).unwrap();
        let node = store.get_node("n0009").unwrap().unwrap();
        assert!(!node.discoverable);
        assert_eq!(node.netdevs["eth0"].hwaddr, "de:ad:be:ef:00:09");
        assert_eq!(store.admit("de:ad:be:ef:00:09").unwrap().id, "n0009");
        assert!(!store.admit("de:ad:be:ef:00:10").unwrap().is_valid());
    }

    #[test]
    fn import_overwrites_unclaimed_and_explicit_definitions() {
        let store = StateStore::open_in_memory().unwrap();
        store.import_node(&test_node("n0001", "de:ad:be:ef:00:01")).unwrap();
        store.import_node(&test_node("n0001", "de:ad:be:ef:00:02")).unwrap();

        assert!(store.node_by_hwaddr("de:ad:be:ef:00:01").unwrap().is_none());
        assert_eq!(
            store.node_by_hwaddr("de:ad:be:ef:00:02").unwrap().unwrap().id,
            "n0001"
        );
    }

    #[test]
    fn registry_maps_capacity_error() {
        let store = StateStore::open_in_memory().unwrap().with_max_unconfigured(0);
        let err = store.get_or_admit("de:ad:be:ef:00:01").unwrap_err();
        assert!(matches!(err, RegistryError::NoUnconfiguredSlot(_)));
    }

    #[test]
    fn concurrent_first_contact_yields_one_record() {
        let store = StateStore::open_in_memory().unwrap();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.get_or_admit("de:ad:be:ef:00:01").unwrap())
            })
            .collect();

        let ids: HashSet<String> = handles
            .into_iter()
            .map(|h| h.join().unwrap().id)
            .collect();
        assert_eq!(ids.len(), 1);
        assert_eq!(store.list_nodes().unwrap().len(), 1);
    }

    // ── Status ─────────────────────────────────────────────────────

    #[test]
    fn status_appends_in_order() {
        let store = StateStore::open_in_memory().unwrap();
        assert_eq!(store.append_status(&test_event("n0001", "vmlinuz")).unwrap(), 0);
        assert_eq!(store.append_status(&test_event("n0002", "NOT_FOUND")).unwrap(), 1);
        assert_eq!(store.append_status(&test_event("n0001", "kmods.img")).unwrap(), 2);

        let all = store.list_status(None).unwrap();
        assert_eq!(all.len(), 3);
        let n1: Vec<String> = store
            .list_status(Some("n0001"))
            .unwrap()
            .into_iter()
            .map(|e| e.sent)
            .collect();
        assert_eq!(n1, vec!["vmlinuz", "kmods.img"]);
    }

    #[test]
    fn latest_status_per_node() {
        let store = StateStore::open_in_memory().unwrap();
        store.append(&test_event("n0001", "vmlinuz")).unwrap();
        store.append(&test_event("n0001", "kmods.img")).unwrap();
        store.append(&test_event("n0002", "BAD_REQUEST")).unwrap();

        let latest = store.latest_status().unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest["n0001"].sent, "kmods.img");
        assert_eq!(latest["n0002"].sent, "BAD_REQUEST");
    }

    #[test]
    fn persistent_store_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bootgrid.redb");
        {
            let store = StateStore::open(&path).unwrap();
            store.put_node(&test_node("n0001", "de:ad:be:ef:00:01")).unwrap();
        }
        let store = StateStore::open(&path).unwrap();
        assert!(store.get_node("n0001").unwrap().is_some());
    }
}
