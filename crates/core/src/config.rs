//! Transporter and daemon configuration.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Per-publish options.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransporterConfig {
	/// Deliver the publication back to the publishing thread if it is
	/// also a subscriber.
	pub echo: bool,
}

impl TransporterConfig {
	/// Config with echo enabled.
	#[must_use]
	pub const fn with_echo() -> Self {
		Self { echo: true }
	}
}

/// Socket carrier kinds.
///
/// `Ipc` and `Tcp` are connectable on stream sockets. The remaining
/// kinds are kept for wire compatibility with peers that speak the full
/// grammar; selecting one yields
/// [`ConfigurationError::UnsupportedTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transport {
	Inproc,
	Ipc,
	Tcp,
	Pgm,
	Epgm,
}

/// A resolved socket endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
	/// Unix domain socket path.
	Ipc(PathBuf),
	/// TCP host and port.
	Tcp(String, u16),
}

impl fmt::Display for Endpoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Ipc(path) => write!(f, "ipc://{}", path.display()),
			Self::Tcp(addr, port) => write!(f, "tcp://{addr}:{port}"),
		}
	}
}

/// Returns the directory for platform-derived ipc socket paths.
///
/// Resolution order:
///
/// 1. `NERITE_SOCKET_DIR` environment variable.
/// 2. System runtime directory (e.g. `$XDG_RUNTIME_DIR`), if writable.
/// 3. System temp directory.
#[must_use]
pub fn default_socket_dir() -> PathBuf {
	if let Ok(dir) = std::env::var("NERITE_SOCKET_DIR") {
		return PathBuf::from(dir);
	}

	dirs::runtime_dir()
		.filter(|dir| std::fs::create_dir_all(dir).is_ok())
		.unwrap_or_else(std::env::temp_dir)
}

fn socket_base(platform: &str, socket_name: Option<&str>, socket_dir: Option<&PathBuf>) -> PathBuf {
	let dir = socket_dir.cloned().unwrap_or_else(default_socket_dir);
	match socket_name {
		Some(name) => dir.join(name),
		None => dir.join(format!("nerite_{platform}")),
	}
}

/// Configuration for an interprocess portal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
	/// Platform identifier shared by every process in the group.
	pub platform: String,
	/// Carrier used to reach the manager.
	pub transport: Transport,
	/// Explicit ipc socket base name; derived from the platform when
	/// absent.
	pub socket_name: Option<String>,
	/// Directory for ipc sockets; resolved via [`default_socket_dir`]
	/// when absent.
	pub socket_dir: Option<PathBuf>,
	/// Manager address for tcp transports.
	pub address: String,
	/// Manager port for tcp transports.
	pub port: u16,
	/// Outgoing queue high-water mark.
	pub send_queue_size: usize,
	/// Incoming queue high-water mark. Frames past this mark are
	/// dropped with a warning, matching SUB-socket semantics.
	pub receive_queue_size: usize,
	/// How long portal construction waits for the manager handshake.
	pub manager_timeout: Duration,
	/// Overrides the emitting process id on the wire. Defaults to the
	/// OS pid; it only needs to be stable for the portal's life.
	pub process_id: Option<u32>,
	/// Dispatch frames whose origin process matches this portal.
	/// Normally off: local subscribers already receive the in-process
	/// shared handle, so the wire copy would be a duplicate.
	pub echo: bool,
}

impl Default for PortalConfig {
	fn default() -> Self {
		Self {
			platform: "default".to_string(),
			transport: Transport::Ipc,
			socket_name: None,
			socket_dir: None,
			address: "127.0.0.1".to_string(),
			port: 11144,
			send_queue_size: 1000,
			receive_queue_size: 1000,
			manager_timeout: Duration::from_secs(10),
			process_id: None,
			echo: false,
		}
	}
}

impl PortalConfig {
	/// The manager's request/reply endpoint.
	pub fn manager_endpoint(&self) -> Result<Endpoint, ConfigurationError> {
		match self.transport {
			Transport::Ipc => {
				let mut base = socket_base(
					&self.platform,
					self.socket_name.as_deref(),
					self.socket_dir.as_ref(),
				);
				base.as_mut_os_string().push(".manager");
				Ok(Endpoint::Ipc(base))
			}
			Transport::Tcp => Ok(Endpoint::Tcp(self.address.clone(), self.port)),
			other => Err(ConfigurationError::UnsupportedTransport(other)),
		}
	}

	/// The wire process id this portal stamps on publications.
	#[must_use]
	pub fn effective_process_id(&self) -> u32 {
		self.process_id.unwrap_or_else(std::process::id)
	}
}

/// Configuration for the router/manager daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
	pub platform: String,
	pub transport: Transport,
	pub socket_name: Option<String>,
	pub socket_dir: Option<PathBuf>,
	/// Manager bind port for tcp transports. The pub/sub sockets always
	/// bind ephemeral ports, reported back through the manager.
	pub tcp_port: u16,
	/// Per-subscriber fan-out queue depth; frames past it are dropped.
	pub subscriber_queue_size: usize,
}

impl Default for RouterConfig {
	fn default() -> Self {
		Self {
			platform: "default".to_string(),
			transport: Transport::Ipc,
			socket_name: None,
			socket_dir: None,
			tcp_port: 11144,
			subscriber_queue_size: 1000,
		}
	}
}

impl RouterConfig {
	fn base(&self) -> PathBuf {
		socket_base(&self.platform, self.socket_name.as_deref(), self.socket_dir.as_ref())
	}

	fn ipc_endpoint(&self, suffix: &str) -> Endpoint {
		let mut base = self.base();
		base.as_mut_os_string().push(suffix);
		Endpoint::Ipc(base)
	}

	/// Publish frontend bind endpoint (subscribers connect here).
	pub fn xpub_endpoint(&self) -> Result<Endpoint, ConfigurationError> {
		match self.transport {
			Transport::Ipc => Ok(self.ipc_endpoint(".xpub")),
			Transport::Tcp => Ok(Endpoint::Tcp("0.0.0.0".to_string(), 0)),
			other => Err(ConfigurationError::UnsupportedTransport(other)),
		}
	}

	/// Subscribe backend bind endpoint (publishers connect here).
	pub fn xsub_endpoint(&self) -> Result<Endpoint, ConfigurationError> {
		match self.transport {
			Transport::Ipc => Ok(self.ipc_endpoint(".xsub")),
			Transport::Tcp => Ok(Endpoint::Tcp("0.0.0.0".to_string(), 0)),
			other => Err(ConfigurationError::UnsupportedTransport(other)),
		}
	}

	/// Manager bind endpoint.
	pub fn manager_endpoint(&self) -> Result<Endpoint, ConfigurationError> {
		match self.transport {
			Transport::Ipc => Ok(self.ipc_endpoint(".manager")),
			Transport::Tcp => Ok(Endpoint::Tcp("0.0.0.0".to_string(), self.tcp_port)),
			other => Err(ConfigurationError::UnsupportedTransport(other)),
		}
	}
}
