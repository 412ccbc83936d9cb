//! Configuration for txncore
//!
//! Centralized configuration with sensible defaults.

use crate::error::{Result, TxnError};
use crate::types::{NodeId, ReplicationMode};

/// Main configuration for a txncore node
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Node Configuration
    // -------------------------------------------------------------------------
    /// This node's id in the partition table
    pub node_id: NodeId,

    /// Number of partitions of the keyspace
    pub partition_count: u32,

    /// Number of partition groups, one worker each
    pub partition_group_count: u32,

    // -------------------------------------------------------------------------
    // Transaction Configuration
    // -------------------------------------------------------------------------
    /// Default transaction timeout (milliseconds)
    pub txn_timeout_interval_ms: u64,

    /// Backoff between lock-conflict retries (milliseconds)
    pub lock_retry_interval_ms: u64,

    /// Period of the CHECK_TIMEOUT sweep (milliseconds)
    pub check_timeout_interval_ms: u64,

    // -------------------------------------------------------------------------
    // Replication Configuration
    // -------------------------------------------------------------------------
    pub replication_mode: ReplicationMode,

    /// Bound on waiting for backup acks (milliseconds)
    pub replication_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Authentication Configuration
    // -------------------------------------------------------------------------
    /// Bound on a cross-node authentication (milliseconds)
    pub authentication_timeout_ms: u64,

    /// Authentication expiry (milliseconds), 0 disables
    pub reauthentication_interval_ms: u64,

    /// Administrators verified on the node that receives LOGIN
    pub admin_users: Vec<AdminUser>,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Connection read timeout (milliseconds), 0 disables
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds), 0 disables
    pub write_timeout_ms: u64,
}

/// A locally verified administrator account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminUser {
    pub name: String,
    pub digest: String,
}

impl AdminUser {
    pub fn new(name: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            digest: digest.into(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: 0,
            partition_count: 128,
            partition_group_count: 4,
            txn_timeout_interval_ms: 300_000,
            lock_retry_interval_ms: 10,
            check_timeout_interval_ms: 1000,
            replication_mode: ReplicationMode::Async,
            replication_timeout_ms: 10_000,
            authentication_timeout_ms: 5000,
            reauthentication_interval_ms: 0,
            admin_users: vec![AdminUser::new("admin", "admin")],
            listen_addr: "127.0.0.1:10001".to_string(),
            max_connections: 1024,
            read_timeout_ms: 0,
            write_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check values that would make the service unusable
    pub fn validate(&self) -> Result<()> {
        if self.partition_count == 0 {
            return Err(TxnError::Config("partition_count must be positive".into()));
        }
        if self.partition_group_count == 0 || self.partition_group_count > self.partition_count {
            return Err(TxnError::Config(format!(
                "partition_group_count must be in 1..={}",
                self.partition_count
            )));
        }
        if self.lock_retry_interval_ms == 0 {
            return Err(TxnError::Config(
                "lock_retry_interval_ms must be positive".into(),
            ));
        }
        if self.check_timeout_interval_ms == 0 {
            return Err(TxnError::Config(
                "check_timeout_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Admin entry for `name`, if any
    pub fn admin_user(&self, name: &str) -> Option<&AdminUser> {
        self.admin_users.iter().find(|u| u.name == name)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn node_id(mut self, id: NodeId) -> Self {
        self.config.node_id = id;
        self
    }

    pub fn partition_count(mut self, count: u32) -> Self {
        self.config.partition_count = count;
        self
    }

    pub fn partition_group_count(mut self, count: u32) -> Self {
        self.config.partition_group_count = count;
        self
    }

    /// Set the default transaction timeout (in milliseconds)
    pub fn txn_timeout_interval_ms(mut self, ms: u64) -> Self {
        self.config.txn_timeout_interval_ms = ms;
        self
    }

    pub fn lock_retry_interval_ms(mut self, ms: u64) -> Self {
        self.config.lock_retry_interval_ms = ms;
        self
    }

    pub fn check_timeout_interval_ms(mut self, ms: u64) -> Self {
        self.config.check_timeout_interval_ms = ms;
        self
    }

    pub fn replication_mode(mut self, mode: ReplicationMode) -> Self {
        self.config.replication_mode = mode;
        self
    }

    /// Set the replication ack-wait bound (in milliseconds)
    pub fn replication_timeout_ms(mut self, ms: u64) -> Self {
        self.config.replication_timeout_ms = ms;
        self
    }

    pub fn authentication_timeout_ms(mut self, ms: u64) -> Self {
        self.config.authentication_timeout_ms = ms;
        self
    }

    /// Set the authentication expiry (in milliseconds, 0 disables)
    pub fn reauthentication_interval_ms(mut self, ms: u64) -> Self {
        self.config.reauthentication_interval_ms = ms;
        self
    }

    /// Replace the list of locally verified administrators
    pub fn admin_users(mut self, users: Vec<AdminUser>) -> Self {
        self.config.admin_users = users;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
