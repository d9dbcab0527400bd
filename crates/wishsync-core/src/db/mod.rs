//! Database layer: connection management, migrations, and the durable
//! queue store.

mod connection;
mod migrations;
mod queue_store;

pub use connection::Database;
pub use queue_store::{ActionStore, SqliteActionStore};
