//! Router and manager: the per-platform meeting point.
//!
//! The router owns two bound sockets: a publish frontend where
//! subscribers connect, and a subscribe backend where publishers
//! connect, spliced into a fan-out proxy with per-subscriber
//! byte-prefix filters. The manager answers discovery requests with
//! the concrete connection parameters a portal must use, so portals
//! never need to know the router's bound ports, which may be
//! ephemeral.

mod listener;
pub mod manager;
pub mod router;

pub use manager::Manager;
pub use router::{Router, RouterPorts};
