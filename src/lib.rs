pub mod cli;
pub mod config;
pub mod load_config;
pub mod synchronise;

pub use cli::{run, Cli, Commands};
pub use synchronise::{synchronise, LibrarySet, SyncReport};
