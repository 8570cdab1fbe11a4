//! Database access layer

mod init;

pub use init::{init_database, init_memory_database};
