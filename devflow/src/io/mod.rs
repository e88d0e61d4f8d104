//! I/O helpers: documents, config, backends, oracles and run artifacts.

pub mod backend;
pub mod config;
pub mod graph_store;
pub mod oracle;
pub mod process;
pub mod prompt;
pub mod run_log;
