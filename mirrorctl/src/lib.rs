pub mod commands;
pub mod sqlitedir;

pub use commands::{run, Command};
pub use sqlitedir::SqliteDirectory;
