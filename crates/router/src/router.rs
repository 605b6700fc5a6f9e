//! The fan-out proxy.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};

use nerite_core::{ConfigurationError, RouterConfig, Transport};
use nerite_proto::{NetStream, SubControl, parse_sub_control, read_frame, write_frame};

use crate::listener::Listener;

/// Bound port report for ephemeral tcp binds; zero means not yet
/// bound.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouterPorts {
	/// Publish frontend (subscribers connect here).
	pub pub_port: u16,
	/// Subscribe backend (publishers connect here).
	pub sub_port: u16,
}

impl RouterPorts {
	/// Whether both sockets are bound.
	#[must_use]
	pub fn ready(&self) -> bool {
		self.pub_port != 0 && self.sub_port != 0
	}
}

struct SubscriberEntry {
	tx: mpsc::Sender<Arc<[u8]>>,
	filters: HashSet<Vec<u8>>,
}

/// Shared proxy state: connected subscribers and their filters.
struct RouterCore {
	queue_depth: usize,
	next_id: AtomicU64,
	subscribers: Mutex<HashMap<u64, SubscriberEntry>>,
}

impl RouterCore {
	fn register(&self) -> (u64, mpsc::Receiver<Arc<[u8]>>) {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let (tx, rx) = mpsc::channel(self.queue_depth);
		self.subscribers.lock().unwrap().insert(
			id,
			SubscriberEntry {
				tx,
				filters: HashSet::new(),
			},
		);
		(id, rx)
	}

	fn deregister(&self, id: u64) {
		self.subscribers.lock().unwrap().remove(&id);
	}

	fn apply(&self, id: u64, control: SubControl<'_>) {
		let mut subscribers = self.subscribers.lock().unwrap();
		let Some(entry) = subscribers.get_mut(&id) else {
			return;
		};
		match control {
			SubControl::Subscribe(filter) => {
				tracing::debug!(id, filter = %String::from_utf8_lossy(filter), "subscribe");
				entry.filters.insert(filter.to_vec());
			}
			SubControl::Unsubscribe(filter) => {
				tracing::debug!(id, filter = %String::from_utf8_lossy(filter), "unsubscribe");
				entry.filters.remove(filter);
			}
		}
	}

	/// Copies one publisher frame to every subscriber holding a
	/// matching prefix filter. A subscriber past its high-water mark
	/// loses the frame.
	fn dispatch(&self, frame: &[u8]) {
		let frame: Arc<[u8]> = Arc::from(frame);
		let subscribers = self.subscribers.lock().unwrap();
		for (&id, entry) in subscribers.iter() {
			if !entry.filters.iter().any(|filter| frame.starts_with(filter)) {
				continue;
			}
			if entry.tx.try_send(Arc::clone(&frame)).is_err() {
				tracing::warn!(id, "subscriber at high-water mark, dropping frame");
			}
		}
	}
}

/// The per-platform fan-out proxy.
///
/// Runs until its future is dropped; bound tcp ports are reported
/// through the watch channel handed out by [`Router::new`].
pub struct Router {
	cfg: RouterConfig,
	ports_tx: watch::Sender<RouterPorts>,
}

impl Router {
	/// Builds a router and the port report channel the manager reads.
	#[must_use]
	pub fn new(cfg: RouterConfig) -> (Self, watch::Receiver<RouterPorts>) {
		let (ports_tx, ports_rx) = watch::channel(RouterPorts::default());
		(Self { cfg, ports_tx }, ports_rx)
	}

	/// Binds both sockets and runs the proxy loop forever.
	pub async fn run(self) -> Result<(), ConfigurationError> {
		let frontend = Listener::bind(&self.cfg.xpub_endpoint()?).await?;
		let backend = Listener::bind(&self.cfg.xsub_endpoint()?).await?;

		if self.cfg.transport == Transport::Tcp {
			let ports = RouterPorts {
				pub_port: frontend.local_port().unwrap_or(0),
				sub_port: backend.local_port().unwrap_or(0),
			};
			tracing::info!(pub_port = ports.pub_port, sub_port = ports.sub_port, "router bound");
			let _ = self.ports_tx.send(ports);
		} else {
			tracing::info!(platform = %self.cfg.platform, "router bound on ipc sockets");
		}

		let core = Arc::new(RouterCore {
			queue_depth: self.cfg.subscriber_queue_size,
			next_id: AtomicU64::new(1),
			subscribers: Mutex::new(HashMap::new()),
		});

		let subscribers = accept_loop(frontend, Arc::clone(&core), serve_subscriber);
		let publishers = accept_loop(backend, core, serve_publisher);
		tokio::join!(subscribers, publishers);
		Ok(())
	}
}

async fn accept_loop<F, Fut>(listener: Listener, core: Arc<RouterCore>, serve: F)
where
	F: Fn(Arc<RouterCore>, NetStream) -> Fut + Copy + Send + 'static,
	Fut: std::future::Future<Output = ()> + Send + 'static,
{
	loop {
		match listener.accept().await {
			Ok(stream) => {
				tokio::spawn(serve(Arc::clone(&core), stream));
			}
			Err(error) => {
				tracing::error!(%error, "accept failed");
			}
		}
	}
}

/// One subscriber connection: control frames in, publications out.
async fn serve_subscriber(core: Arc<RouterCore>, stream: NetStream) {
	let (id, mut rx) = core.register();
	tracing::debug!(id, "subscriber connected");
	let (mut read, mut write) = tokio::io::split(stream);

	let writer = async {
		while let Some(frame) = rx.recv().await {
			if write_frame(&mut write, &frame).await.is_err() {
				break;
			}
		}
	};
	let reader = async {
		loop {
			match read_frame(&mut read).await {
				Ok(body) => match parse_sub_control(&body) {
					Some(control) => core.apply(id, control),
					None => tracing::warn!(id, "ignoring malformed control frame"),
				},
				Err(_) => break,
			}
		}
	};

	tokio::select! {
		() = writer => {}
		() = reader => {}
	}
	core.deregister(id);
	tracing::debug!(id, "subscriber disconnected");
}

/// One publisher connection: every frame fans out.
async fn serve_publisher(core: Arc<RouterCore>, stream: NetStream) {
	tracing::debug!("publisher connected");
	let mut stream = stream;
	loop {
		match read_frame(&mut stream).await {
			Ok(frame) => core.dispatch(&frame),
			Err(error) => {
				if !nerite_proto::is_disconnect(&error) {
					tracing::warn!(%error, "publisher connection failed");
				}
				break;
			}
		}
	}
	tracing::debug!("publisher disconnected");
}
