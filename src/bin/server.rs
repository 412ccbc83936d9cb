//! txncore Server Binary
//!
//! Starts a single-node service with in-memory collaborators and a TCP
//! listener.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};
use txncore::cluster::StaticPartitionTable;
use txncore::config::AdminUser;
use txncore::network::Server;
use txncore::store::{MemoryDataStore, MemoryLogManager, MemoryUserStore};
use txncore::types::ReplicationMode;
use txncore::{Collaborators, Config, Node};

/// txncore Server
#[derive(Parser, Debug)]
#[command(name = "txncore-server")]
#[command(about = "Request-processing core of a partitioned, replicated database node")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:10001")]
    listen: String,

    /// Id of this node
    #[arg(short, long, default_value = "0")]
    node_id: i32,

    /// Number of partitions
    #[arg(short, long, default_value = "128")]
    partitions: u32,

    /// Number of partition groups (worker threads)
    #[arg(short, long, default_value = "4")]
    groups: u32,

    /// Wait for backup acks before replying
    #[arg(long)]
    sync_replication: bool,

    /// Default transaction timeout in milliseconds
    #[arg(long, default_value = "300000")]
    txn_timeout_ms: u64,

    /// Administrator user name
    #[arg(long, default_value = "admin")]
    admin_user: String,

    /// Administrator password digest
    #[arg(long, default_value = "admin")]
    admin_digest: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,txncore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("txncore Server v{}", txncore::VERSION);
    tracing::info!("Listen address: {}", args.listen);

    // Build config from args
    let config = Config::builder()
        .node_id(args.node_id)
        .listen_addr(&args.listen)
        .partition_count(args.partitions)
        .partition_group_count(args.groups)
        .replication_mode(if args.sync_replication {
            ReplicationMode::Sync
        } else {
            ReplicationMode::Async
        })
        .txn_timeout_interval_ms(args.txn_timeout_ms)
        .admin_users(vec![AdminUser::new(&args.admin_user, &args.admin_digest)])
        .max_connections(args.max_connections)
        .build();

    let collaborators = Collaborators {
        partitions: Arc::new(StaticPartitionTable::single_node(
            config.node_id,
            config.partition_count,
        )),
        data: Arc::new(MemoryDataStore::new()),
        log: Arc::new(MemoryLogManager::new()),
        users: Arc::new(MemoryUserStore::new()),
    };

    let node = match Node::start(config.clone(), collaborators) {
        Ok(node) => node,
        Err(e) => {
            tracing::error!("Failed to start node: {}", e);
            std::process::exit(1);
        }
    };

    let server = match Server::bind(config, node.router().clone()) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", args.listen, e);
            node.shutdown();
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
    }

    node.shutdown();
    tracing::info!("Server stopped");
}
