//! Fanout library
//!
//! Checksum-driven distribution of a directory tree to every node of a
//! cluster over SSH, in parallel, copying only new or changed files.

pub mod checksum;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod discovery;
pub mod error;
pub mod exec;
pub mod fs_enum;
pub mod log;
pub mod logger;
pub mod observer;
pub mod progress;
pub mod report;
pub mod transport;
pub mod worker;

pub use cli::Args;
pub use config::SyncConfig;
pub use coordinator::Distributor;
