//! Interprocess transport layer.
//!
//! # Mental model
//!
//! - An [`InterProcessPortal`] is a per-process facade with the same
//!   publish/subscribe contract as the interthread broker, extended
//!   across process boundaries through a router.
//! - The portal's main side never touches a socket: a dedicated reader
//!   thread owns the manager, publish, and subscribe streams, and the
//!   two sides exchange [`control`] messages over an in-process
//!   channel pair.
//! - Outgoing publications are serialized once, stamped with the
//!   `"/group/scheme/type/process/thread/"` identifier, and delivered
//!   locally through the inner transporter in parallel, so in-process
//!   subscribers get the shared handle rather than a re-parsed copy.
//! - Incoming frames dispatch to three tables: portal subscriptions
//!   (keyed by the process/thread-wildcard identifier), forwarder
//!   subscriptions (reference-counted on behalf of outer layers), and
//!   regex subscriptions (at most one invocation per owning thread per
//!   frame).
//! - Frames whose origin process matches the local portal are dropped
//!   unless echo is configured: local subscribers already saw the
//!   in-process delivery, and a forwarder must never be handed back
//!   its own publication.
//!
//! # Invariants
//!
//! 1. The reader holds a subscribe-socket filter for key K iff some
//!    portal or forwarder subscription for K exists.
//!    - Enforced in: `tables::SubTables`.
//!    - Tested by: `tables::tests::filter_refcounting_across_tables`.
//! 2. A forwarder key is installed at most once per owning thread;
//!    releasing the last owner releases the filter only when no local
//!    subscriber remains.
//!    - Enforced in: `SubTables::add_forwarder`,
//!      `SubTables::remove_forwarder`.
//!    - Tested by: `tables::tests::forwarder_keys_are_per_thread`.
//! 3. Publish-side failures surface synchronously to the publishing
//!    caller; receive-side failures are logged and dropped.
//!    - Enforced in: `InterProcessPortal::publish`,
//!      `InterProcessPortal::dispatch_frame`.

pub mod control;
pub mod error;
pub mod forwarder;
pub mod portal;
mod reader;
mod tables;

pub use error::PortalError;
pub use forwarder::InterProcessForwarder;
pub use portal::InterProcessPortal;
