//! Store Module
//!
//! Interfaces of the collaborators the request pipeline drives, plus
//! in-memory implementations used by the server binary and the tests.
//!
//! ## Collaborators
//! - [`DataStore`]: rows keyed by (partition, container, key)
//! - [`LogManager`]: per-partition append-only log with increasing sequence numbers
//! - [`UserStore`]: the users and databases system tables

mod log_record;
mod memory;

pub use log_record::{LogOperation, LogRecord};
pub use memory::{MemoryDataStore, MemoryLogManager, MemoryUserStore, DBID_RESERVED_RANGE};

use crate::error::Result;
use crate::types::{ContainerId, DatabaseId, PartitionId, RowId};

/// Log sequence number
pub type Lsn = u64;

/// Row engine
pub trait DataStore: Send + Sync {
    fn get_row(&self, pid: PartitionId, container: ContainerId, key: &[u8])
        -> Result<Option<Vec<u8>>>;

    /// Insert or replace; returns whether the row existed
    fn put_row(
        &self,
        pid: PartitionId,
        container: ContainerId,
        key: Vec<u8>,
        value: Vec<u8>,
    ) -> Result<bool>;

    /// Returns whether the row existed
    fn remove_row(&self, pid: PartitionId, container: ContainerId, key: &[u8]) -> Result<bool>;

    /// Redo a replicated record
    fn apply(&self, record: &LogRecord) -> Result<()> {
        match &record.operation {
            LogOperation::PutRow { key, value } => {
                self.put_row(
                    record.partition_id,
                    record.container_id,
                    key.clone(),
                    value.clone(),
                )?;
            }
            LogOperation::RemoveRow { key } => {
                self.remove_row(record.partition_id, record.container_id, key)?;
            }
            LogOperation::CommitTransaction | LogOperation::AbortTransaction => {}
        }
        Ok(())
    }
}

/// Write-ahead log producer
pub trait LogManager: Send + Sync {
    /// Append an encoded record; sequence numbers increase per partition
    fn append(&self, pid: PartitionId, record: &[u8]) -> Result<Lsn>;

    /// Last sequence number of `pid`, 0 when empty
    fn last_lsn(&self, pid: PartitionId) -> Lsn;
}

/// A row of the users table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub name: String,
    pub digest: String,
}

/// A row of the databases table, keyed by `"<db>:<user>"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseRow {
    pub row_id: RowId,
    pub key: String,
    pub privilege: String,
}

/// Key of a privilege row
pub fn database_row_key(db_name: &str, user_name: &str) -> String {
    format!("{}:{}", db_name, user_name)
}

/// Users and databases system tables
pub trait UserStore: Send + Sync {
    /// Number of users matching `predicate`
    fn count_users(&self, predicate: &dyn Fn(&UserRow) -> bool) -> Result<u64>;

    fn get_database_row(&self, key: &str) -> Result<Option<DatabaseRow>>;

    /// Offset added to a database row id to form a database id
    fn reserved_range(&self) -> DatabaseId;
}
