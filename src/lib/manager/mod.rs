//! The submission boundary: job registry, periodic persistence and the HTTP
//! API in front of them.

pub mod api;
pub mod registry;
pub mod store;

pub use api::JobServer;
pub use registry::JobRegistry;
pub use store::{JobStore, JsonFileStore, LogStore, run_snapshots};
