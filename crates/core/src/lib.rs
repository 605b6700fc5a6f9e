//! Core primitives shared by every transport layer.
//!
//! The transport stack is three concentric layers: interthread (one
//! process), interprocess (one host), intervehicle (slow links between
//! platforms). This crate holds the vocabulary they all speak: named
//! topics ([`Group`]), wire family tags ([`MarshalScheme`]), routing
//! identifiers ([`Identifier`]), subscription records, the
//! [`Transporter`] seam between nested layers, and the poll/wake
//! primitives that let a subscriber thread sleep until data arrives.

pub mod config;
pub mod error;
pub mod forward;
pub mod group;
pub mod identifier;
pub mod poller;
pub mod scheme;
pub mod subscription;
pub mod thread_id;
pub mod transporter;

pub use config::{Endpoint, PortalConfig, RouterConfig, Transport, TransporterConfig};
pub use error::{ConfigurationError, MarshalError};
pub use forward::{FORWARD_GROUP, ForwardedPublication, ForwardedUnsubscribeAll};
pub use group::Group;
pub use identifier::Identifier;
pub use poller::PollWaiter;
pub use scheme::MarshalScheme;
pub use subscription::{RegexSubscription, SubscriptionAction, TypedSubscription};
pub use thread_id::current_thread_id;
pub use transporter::{NullTransporter, Transporter};
