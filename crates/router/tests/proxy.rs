//! Router and manager behavior at the frame level.

use std::time::Duration;

use nerite_core::{RouterConfig, Transport};
use nerite_proto::{
	ManagerRequest, NetStream, encode_manager_request, encode_publication, encode_subscribe,
	encode_unsubscribe, read_frame, split_publication, write_frame,
};
use nerite_router::{Manager, Router};

fn router_cfg(platform: &str, dir: &tempfile::TempDir) -> RouterConfig {
	RouterConfig {
		platform: platform.to_string(),
		transport: Transport::Ipc,
		socket_dir: Some(dir.path().to_path_buf()),
		..RouterConfig::default()
	}
}

async fn start(cfg: &RouterConfig) {
	let (router, ports) = Router::new(cfg.clone());
	let manager = Manager::new(cfg.clone(), ports);
	tokio::spawn(router.run());
	tokio::spawn(manager.run());

	let manager_path = match cfg.manager_endpoint().unwrap() {
		nerite_core::Endpoint::Ipc(path) => path,
		other => panic!("expected ipc endpoint, got {other}"),
	};
	for _ in 0..100 {
		if manager_path.exists() {
			return;
		}
		tokio::time::sleep(Duration::from_millis(20)).await;
	}
	panic!("manager socket never appeared");
}

async fn connect(endpoint: &nerite_core::Endpoint) -> NetStream {
	NetStream::connect(endpoint).await.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn manager_names_the_router_sockets() {
	let dir = tempfile::tempdir().unwrap();
	let cfg = router_cfg("mgr", &dir);
	start(&cfg).await;

	let mut stream = connect(&cfg.manager_endpoint().unwrap()).await;
	let request = encode_manager_request(&ManagerRequest::ProvidePubSubSockets).unwrap();
	write_frame(&mut stream, &request).await.unwrap();

	let reply = read_frame(&mut stream).await.unwrap();
	let response = nerite_proto::decode_manager_response(&reply).unwrap();

	assert_eq!(
		response.publish_socket.endpoint().unwrap(),
		cfg.xsub_endpoint().unwrap()
	);
	assert_eq!(
		response.subscribe_socket.endpoint().unwrap(),
		cfg.xpub_endpoint().unwrap()
	);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn frames_fan_out_only_to_matching_filters() {
	let dir = tempfile::tempdir().unwrap();
	let cfg = router_cfg("fanout", &dir);
	start(&cfg).await;

	let mut subscriber = connect(&cfg.xpub_endpoint().unwrap()).await;
	write_frame(&mut subscriber, &encode_subscribe(b"/depth/")).await.unwrap();
	// Let the filter land before publishing.
	tokio::time::sleep(Duration::from_millis(200)).await;

	let mut publisher = connect(&cfg.xsub_endpoint().unwrap()).await;
	let ignored = encode_publication("/speed/1/T/1/2/", b"skip");
	let wanted = encode_publication("/depth/1/T/1/2/", b"take");
	write_frame(&mut publisher, &ignored).await.unwrap();
	write_frame(&mut publisher, &wanted).await.unwrap();

	let frame = tokio::time::timeout(Duration::from_secs(5), read_frame(&mut subscriber))
		.await
		.expect("timed out waiting for matching frame")
		.unwrap();
	let (identifier, payload) = split_publication(&frame).unwrap();
	assert_eq!(identifier, "/depth/1/T/1/2/");
	assert_eq!(payload, b"take");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unsubscribe_stops_delivery() {
	let dir = tempfile::tempdir().unwrap();
	let cfg = router_cfg("unsub", &dir);
	start(&cfg).await;

	let mut subscriber = connect(&cfg.xpub_endpoint().unwrap()).await;
	write_frame(&mut subscriber, &encode_subscribe(b"/a/")).await.unwrap();
	tokio::time::sleep(Duration::from_millis(200)).await;

	let mut publisher = connect(&cfg.xsub_endpoint().unwrap()).await;
	write_frame(&mut publisher, &encode_publication("/a/1/T/1/2/", b"one"))
		.await
		.unwrap();
	let frame = read_frame(&mut subscriber).await.unwrap();
	assert_eq!(split_publication(&frame).unwrap().1, b"one");

	write_frame(&mut subscriber, &encode_unsubscribe(b"/a/")).await.unwrap();
	tokio::time::sleep(Duration::from_millis(200)).await;

	write_frame(&mut publisher, &encode_publication("/a/1/T/1/2/", b"two"))
		.await
		.unwrap();
	let outcome =
		tokio::time::timeout(Duration::from_millis(500), read_frame(&mut subscriber)).await;
	assert!(outcome.is_err(), "frame delivered after unsubscribe");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tcp_router_reports_ephemeral_ports() {
	let cfg = RouterConfig {
		platform: "tcp".to_string(),
		transport: Transport::Tcp,
		tcp_port: 0,
		..RouterConfig::default()
	};
	let (router, mut ports) = Router::new(cfg.clone());
	tokio::spawn(router.run());

	tokio::time::timeout(Duration::from_secs(5), ports.wait_for(|p| p.ready()))
		.await
		.expect("timed out waiting for bound ports")
		.unwrap();
	let bound = *ports.borrow();
	assert_ne!(bound.pub_port, 0);
	assert_ne!(bound.sub_port, 0);
	assert_ne!(bound.pub_port, bound.sub_port);
}
