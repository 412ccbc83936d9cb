//! In-memory collaborators
//!
//! BTreeMap-based stores behind `parking_lot` locks.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use crate::error::Result;
use crate::types::{ContainerId, DatabaseId, PartitionId, RowId};

use super::{database_row_key, DataStore, DatabaseRow, LogManager, Lsn, UserRow, UserStore};

/// Database ids below this value are reserved for built-in databases
pub const DBID_RESERVED_RANGE: DatabaseId = 100;

// =============================================================================
// Rows
// =============================================================================

type RowKey = (PartitionId, ContainerId, Vec<u8>);

/// Row store backed by a single ordered map
#[derive(Debug, Default)]
pub struct MemoryDataStore {
    rows: RwLock<BTreeMap<RowKey, Vec<u8>>>,
}

impl MemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_count(&self) -> usize {
        self.rows.read().len()
    }
}

impl DataStore for MemoryDataStore {
    fn get_row(
        &self,
        pid: PartitionId,
        container: ContainerId,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>> {
        Ok(self.rows.read().get(&(pid, container, key.to_vec())).cloned())
    }

    fn put_row(
        &self,
        pid: PartitionId,
        container: ContainerId,
        key: Vec<u8>,
        value: Vec<u8>,
    ) -> Result<bool> {
        Ok(self.rows.write().insert((pid, container, key), value).is_some())
    }

    fn remove_row(&self, pid: PartitionId, container: ContainerId, key: &[u8]) -> Result<bool> {
        Ok(self
            .rows
            .write()
            .remove(&(pid, container, key.to_vec()))
            .is_some())
    }
}

// =============================================================================
// Log
// =============================================================================

/// Log that keeps every appended record in memory
#[derive(Debug, Default)]
pub struct MemoryLogManager {
    partitions: RwLock<HashMap<PartitionId, Vec<Vec<u8>>>>,
}

impl MemoryLogManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records appended to `pid`, oldest first
    pub fn records(&self, pid: PartitionId) -> Vec<Vec<u8>> {
        self.partitions
            .read()
            .get(&pid)
            .cloned()
            .unwrap_or_default()
    }
}

impl LogManager for MemoryLogManager {
    fn append(&self, pid: PartitionId, record: &[u8]) -> Result<Lsn> {
        let mut partitions = self.partitions.write();
        let log = partitions.entry(pid).or_default();
        log.push(record.to_vec());
        Ok(log.len() as Lsn)
    }

    fn last_lsn(&self, pid: PartitionId) -> Lsn {
        self.partitions
            .read()
            .get(&pid)
            .map(|log| log.len() as Lsn)
            .unwrap_or(0)
    }
}

// =============================================================================
// Users and databases
// =============================================================================

#[derive(Debug, Default)]
struct UserTables {
    users: BTreeMap<String, UserRow>,
    databases: BTreeMap<String, DatabaseRow>,
    next_row_id: RowId,
}

/// System tables held in memory
#[derive(Debug)]
pub struct MemoryUserStore {
    tables: RwLock<UserTables>,
    reserved_range: DatabaseId,
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::with_reserved_range(DBID_RESERVED_RANGE)
    }

    pub fn with_reserved_range(reserved_range: DatabaseId) -> Self {
        Self {
            tables: RwLock::new(UserTables::default()),
            reserved_range,
        }
    }

    pub fn put_user(&self, name: impl Into<String>, digest: impl Into<String>) {
        let name = name.into();
        let row = UserRow {
            name: name.clone(),
            digest: digest.into(),
        };
        self.tables.write().users.insert(name, row);
    }

    /// Grant `privilege` on `db_name` to `user_name`; returns the row id
    pub fn put_database_row(&self, db_name: &str, user_name: &str, privilege: &str) -> RowId {
        let key = database_row_key(db_name, user_name);
        let mut tables = self.tables.write();
        if let Some(row) = tables.databases.get_mut(&key) {
            row.privilege = privilege.to_string();
            return row.row_id;
        }

        let row_id = tables.next_row_id;
        tables.next_row_id += 1;
        tables.databases.insert(
            key.clone(),
            DatabaseRow {
                row_id,
                key,
                privilege: privilege.to_string(),
            },
        );
        row_id
    }
}

impl UserStore for MemoryUserStore {
    fn count_users(&self, predicate: &dyn Fn(&UserRow) -> bool) -> Result<u64> {
        Ok(self
            .tables
            .read()
            .users
            .values()
            .filter(|row| predicate(row))
            .count() as u64)
    }

    fn get_database_row(&self, key: &str) -> Result<Option<DatabaseRow>> {
        Ok(self.tables.read().databases.get(key).cloned())
    }

    fn reserved_range(&self) -> DatabaseId {
        self.reserved_range
    }
}
