//! txncore CLI Client
//!
//! Connects, logs in and issues one row statement.

use clap::{Parser, Subcommand};
use txncore::client::{Client, Login};
use txncore::protocol::{ContextSource, EventType, Reply, StatusCode};
use txncore::types::ClientId;

/// txncore CLI
#[derive(Parser, Debug)]
#[command(name = "txncore-cli")]
#[command(about = "CLI for a txncore node")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:10001")]
    server: String,

    /// User name
    #[arg(short, long, default_value = "admin")]
    user: String,

    /// Password digest
    #[arg(short, long, default_value = "admin")]
    digest: String,

    /// Database name
    #[arg(long, default_value = "public")]
    db: String,

    /// Partition to address
    #[arg(short, long, default_value = "0")]
    partition: u32,

    /// Container to address
    #[arg(short, long, default_value = "1")]
    container: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a row by key
    Get {
        /// The key to get
        key: String,
    },

    /// Put a row
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Remove a row
    Remove {
        /// The key to remove
        key: String,
    },

    /// Connect and log in only
    Ping,
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> txncore::Result<()> {
    let mut client = Client::connect(&args.server)?;
    client.set_timeout(10_000)?;

    let reply = client.handshake(args.partition)?;
    ensure_success("connect", &reply)?;

    let login = Login::new(&args.user, &args.digest).db_name(&args.db);
    let reply = client.login(args.partition, &login)?;
    ensure_success("login", &reply)?;

    let mut src = ContextSource::new(EventType::GetRow);
    src.container_id = args.container;
    src.client_id = ClientId::new(*b"txncore-cli-0000", std::process::id() as u64);

    match &args.command {
        Commands::Get { key } => {
            let reply = client.get_row(args.partition, src, key.as_bytes())?;
            ensure_success("get", &reply)?;
            match reply.response.row {
                Some(value) => println!("{}", String::from_utf8_lossy(&value)),
                None => println!("(nil)"),
            }
        }
        Commands::Put { key, value } => {
            let reply = client.put_row(args.partition, src, key.as_bytes(), value.as_bytes())?;
            ensure_success("put", &reply)?;
            println!("OK");
        }
        Commands::Remove { key } => {
            let reply = client.remove_row(args.partition, src, key.as_bytes())?;
            ensure_success("remove", &reply)?;
            println!("{}", if reply.response.existing == Some(true) { "1" } else { "0" });
        }
        Commands::Ping => println!("PONG"),
    }
    Ok(())
}

fn ensure_success(what: &str, reply: &Reply) -> txncore::Result<()> {
    match (&reply.status, &reply.error) {
        (StatusCode::Success | StatusCode::SuccessButReplicationTimeout, _) => Ok(()),
        (status, Some(error)) => Err(txncore::TxnError::System(format!(
            "{} failed: {:?} [{}] {}",
            what, status, error.code, error.message
        ))),
        (status, None) => Err(txncore::TxnError::System(format!("{} failed: {:?}", what, status))),
    }
}
