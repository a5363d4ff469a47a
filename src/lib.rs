//! simplepage: a headless-browser control plane.
//!
//! A long-lived service owning a pool of browser pages. It exposes a REST +
//! WebSocket API to drive them, extracts normalized accessibility views for
//! element addressing, waits for network quiescence between steps, records
//! every action with synchronized page snapshots, and replays recorded
//! traces deterministically.

pub mod config;
pub mod errors;
pub mod events;
pub mod manager;
pub mod perception;
pub mod replay;
pub mod server;

pub use config::ServiceConfig;
pub use errors::{ControlError, ErrorKind};
pub use manager::PageManager;
