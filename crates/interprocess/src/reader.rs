//! The portal's reader thread.
//!
//! One OS thread owns every external socket: the manager request
//! socket during startup, then the publish and subscribe streams. It
//! runs a current-thread async runtime so the blocking poll loop never
//! interrupts the portal's main side.

use std::sync::Arc;
use std::sync::mpsc::{SyncSender, TrySendError};

use tokio::sync::mpsc::UnboundedReceiver;

use nerite_core::{Endpoint, PollWaiter, PortalConfig, Transport};
use nerite_proto::{
	ManagerRequest, NetStream, SocketDescriptor, encode_manager_request, encode_subscribe,
	encode_unsubscribe, read_frame, write_frame,
};
use nerite_proto::{decode_manager_response, is_disconnect};

use crate::control::ControlMsg;

/// Reader lifecycle, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
	Unconfigured,
	AwaitManagerReply,
	Running,
	Shutdown,
}

pub(crate) struct Reader {
	cfg: PortalConfig,
	ctrl: UnboundedReceiver<ControlMsg>,
	to_main: SyncSender<ControlMsg>,
	waiter: Arc<PollWaiter>,
	state: ReaderState,
}

enum Startup {
	Streams(NetStream, NetStream),
	ShutdownRequested,
	Failed(String),
}

/// Spawns the reader thread.
pub(crate) fn spawn(
	cfg: PortalConfig,
	ctrl: UnboundedReceiver<ControlMsg>,
	to_main: SyncSender<ControlMsg>,
	waiter: Arc<PollWaiter>,
) -> std::io::Result<std::thread::JoinHandle<()>> {
	std::thread::Builder::new()
		.name("nerite-portal-reader".to_string())
		.spawn(move || {
			let runtime = match tokio::runtime::Builder::new_current_thread()
				.enable_io()
				.enable_time()
				.build()
			{
				Ok(runtime) => runtime,
				Err(error) => {
					let _ = to_main.try_send(ControlMsg::Error {
						message: format!("reader runtime: {error}"),
					});
					waiter.notify();
					return;
				}
			};

			let reader = Reader {
				cfg,
				ctrl,
				to_main,
				waiter,
				state: ReaderState::Unconfigured,
			};
			runtime.block_on(reader.run());
		})
}

/// Fills in the portal's configured manager address when a tcp
/// descriptor leaves it implicit.
fn resolve(descriptor: &SocketDescriptor, cfg: &PortalConfig) -> Result<Endpoint, String> {
	let mut endpoint = descriptor.endpoint().map_err(|e| e.to_string())?;
	if descriptor.transport == Transport::Tcp && descriptor.address.is_none() {
		if let Endpoint::Tcp(addr, _) = &mut endpoint {
			*addr = cfg.address.clone();
		}
	}
	Ok(endpoint)
}

async fn handshake(cfg: &PortalConfig) -> Result<(SocketDescriptor, SocketDescriptor), String> {
	let endpoint = cfg.manager_endpoint().map_err(|e| e.to_string())?;
	tracing::debug!(%endpoint, "requesting pub/sub sockets from manager");

	let mut stream = NetStream::connect(&endpoint).await.map_err(|e| e.to_string())?;
	let request = encode_manager_request(&ManagerRequest::ProvidePubSubSockets)
		.map_err(|e| e.to_string())?;
	write_frame(&mut stream, &request).await.map_err(|e| e.to_string())?;

	let reply = read_frame(&mut stream).await.map_err(|e| e.to_string())?;
	let response = decode_manager_response(&reply).map_err(|e| e.to_string())?;
	Ok((response.publish_socket, response.subscribe_socket))
}

impl Reader {
	fn transition(&mut self, next: ReaderState) {
		tracing::debug!(from = ?self.state, to = ?next, "reader state");
		self.state = next;
	}

	async fn run(mut self) {
		match self.startup().await {
			Startup::Streams(publish, subscribe) => {
				self.transition(ReaderState::Running);
				self.running(publish, subscribe).await;
			}
			Startup::ShutdownRequested => {}
			Startup::Failed(message) => {
				tracing::error!(%message, "reader startup failed");
				let _ = self.to_main.try_send(ControlMsg::Error { message });
				self.waiter.notify();
			}
		}
		self.transition(ReaderState::Shutdown);
	}

	/// Manager handshake and socket connection. Until the handshake
	/// completes, only the manager socket and the control channel are
	/// serviced; the handshake is never retried.
	async fn startup(&mut self) -> Startup {
		self.transition(ReaderState::AwaitManagerReply);
		let deadline = tokio::time::Instant::now() + self.cfg.manager_timeout;

		let handshake = handshake(&self.cfg);
		tokio::pin!(handshake);

		let (publish_desc, subscribe_desc) = loop {
			tokio::select! {
				outcome = tokio::time::timeout_at(deadline, &mut handshake) => {
					match outcome {
						Err(_) => {
							return Startup::Failed(format!(
								"manager did not reply within {:?}",
								self.cfg.manager_timeout
							));
						}
						Ok(Err(message)) => return Startup::Failed(message),
						Ok(Ok(descriptors)) => break descriptors,
					}
				}
				msg = self.ctrl.recv() => match msg {
					Some(ControlMsg::Shutdown) | None => return Startup::ShutdownRequested,
					// Nothing else is valid before configuration.
					Some(_) => continue,
				},
			}
		};

		let publish_endpoint = match resolve(&publish_desc, &self.cfg) {
			Ok(endpoint) => endpoint,
			Err(message) => return Startup::Failed(message),
		};
		let subscribe_endpoint = match resolve(&subscribe_desc, &self.cfg) {
			Ok(endpoint) => endpoint,
			Err(message) => return Startup::Failed(message),
		};

		let publish = match NetStream::connect(&publish_endpoint).await {
			Ok(stream) => stream,
			Err(error) => return Startup::Failed(error.to_string()),
		};
		let subscribe = match NetStream::connect(&subscribe_endpoint).await {
			Ok(stream) => stream,
			Err(error) => return Startup::Failed(error.to_string()),
		};

		let _ = self.to_main.try_send(ControlMsg::PubConfiguration {
			publish: publish_desc,
			subscribe: subscribe_desc,
		});
		self.waiter.notify();
		Startup::Streams(publish, subscribe)
	}

	async fn running(&mut self, mut publish: NetStream, subscribe: NetStream) {
		let (mut sub_read, mut sub_write) = tokio::io::split(subscribe);
		let to_main = self.to_main.clone();
		let waiter = Arc::clone(&self.waiter);

		// The incoming loop lives in one pinned future polled across
		// select iterations, so a control message can never cancel a
		// partially-read frame.
		let incoming = async move {
			loop {
				match read_frame(&mut sub_read).await {
					Ok(frame) => post_receive(&to_main, &waiter, frame),
					Err(error) => break error,
				}
			}
		};
		tokio::pin!(incoming);

		loop {
			tokio::select! {
				msg = self.ctrl.recv() => match msg {
					Some(ControlMsg::Publish { frame }) => {
						if let Err(error) = write_frame(&mut publish, &frame).await {
							self.report(format!("publish socket: {error}"));
							break;
						}
					}
					Some(ControlMsg::Subscribe { filter }) => {
						tracing::debug!(filter = %String::from_utf8_lossy(&filter), "applying filter");
						if let Err(error) = write_frame(&mut sub_write, &encode_subscribe(&filter)).await {
							self.report(format!("subscribe socket: {error}"));
							break;
						}
					}
					Some(ControlMsg::Unsubscribe { filter }) => {
						tracing::debug!(filter = %String::from_utf8_lossy(&filter), "releasing filter");
						if let Err(error) = write_frame(&mut sub_write, &encode_unsubscribe(&filter)).await {
							self.report(format!("subscribe socket: {error}"));
							break;
						}
					}
					Some(ControlMsg::Shutdown) | None => break,
					Some(_) => {}
				},
				error = &mut incoming => {
					if is_disconnect(&error) {
						self.report("subscribe socket closed by router".to_string());
					} else {
						self.report(format!("subscribe socket: {error}"));
					}
					break;
				},
			}
		}
	}

	fn report(&self, message: String) {
		tracing::error!(%message, "reader socket failure");
		let _ = self.to_main.try_send(ControlMsg::Error { message });
		self.waiter.notify();
	}
}

fn post_receive(to_main: &SyncSender<ControlMsg>, waiter: &PollWaiter, frame: Vec<u8>) {
	match to_main.try_send(ControlMsg::Receive { frame }) {
		Ok(()) => waiter.notify(),
		Err(TrySendError::Full(_)) => {
			tracing::warn!("receive queue at high-water mark, dropping frame");
		}
		Err(TrySendError::Disconnected(_)) => {}
	}
}
