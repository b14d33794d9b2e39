//! Database initialization, migrations and retry helpers

pub mod init;
pub mod migrations;
pub mod retry;

pub use init::*;
pub use migrations::*;
pub use retry::*;
