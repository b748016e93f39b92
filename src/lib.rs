#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

//! progd library: the building blocks of the daemon, exposed for the binary
//! and for integration tests:
//! - `config`: configuration loading
//! - `store`: durable supervisor state
//! - `archive`: per-program run artifacts
//! - `shell`: executable resolution and command execution
//! - `supervisor`: program lifecycle and runners
//! - `protocol`: wire request type and framing
//! - `server`: TCP request dispatcher
//! - `shutdown`: signal handling
//! - `client`: control client

pub mod archive;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod shell;
pub mod shutdown;
pub mod store;
pub mod supervisor;

// Re-export key types at crate root for convenience.
pub use archive::OutputArchive;
pub use config::Config;
pub use error::SupervisorError;
pub use protocol::Request;
pub use store::{ProgramEntry, StateStore, SupervisorState};
pub use supervisor::Supervisor;
