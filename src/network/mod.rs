//! Network Module
//!
//! TCP server exposing a `StorageService` over the binary protocol.
//!
//! ## Architecture
//! - Single acceptor thread, polling so it notices cancellation
//! - One thread per connection, capped at `max_connections`
//! - Commands routed through any `Arc<dyn StorageService>`

mod connection;
mod server;

pub use connection::Connection;
pub use server::Server;
