//! dakv CLI Client
//!
//! Command-line interface for talking to a running dakv server.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use dakv::service::{RemoteStorageService, StorageService};
use dakv::StorageError;

/// dakv CLI
#[derive(Parser, Debug)]
#[command(name = "dakv-cli")]
#[command(about = "CLI for the dakv blob store")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:9876")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read a value by key
    Read {
        /// The key to read
        key: String,
    },

    /// Write a key-value pair
    Write {
        /// The key to write
        key: String,

        /// The value to write
        value: String,

        /// Retention in seconds (0 = server default)
        #[arg(short, long, default_value = "0")]
        timeout: u64,
    },

    /// Flush acknowledged writes to stable storage
    Sync,

    /// Show which backend the server exposes
    Identity,

    /// Ping the server
    Ping,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let client = RemoteStorageService::new(args.server);

    let result = match args.command {
        Commands::Read { key } => client
            .read(key.as_bytes())
            .map(|value| println!("{}", String::from_utf8_lossy(&value))),
        Commands::Write {
            key,
            value,
            timeout,
        } => client
            .write(key.as_bytes(), value.as_bytes(), timeout)
            .map(|_| println!("OK")),
        Commands::Sync => client.sync().map(|_| println!("OK")),
        Commands::Identity => client.remote_identity().map(|id| println!("{}", id)),
        Commands::Ping => client.ping().map(|_| println!("PONG")),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(StorageError::NotFound) => {
            eprintln!("(not found)");
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(2)
        }
    }
}
