//! End-to-end portal scenarios against a live router and manager.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use nerite_core::{
	Endpoint, FORWARD_GROUP, ForwardedUnsubscribeAll, Group, MarshalScheme, NullTransporter,
	PortalConfig, RouterConfig, SubscriptionAction, Transport, Transporter, TransporterConfig,
};
use nerite_interprocess::{InterProcessPortal, PortalError};
use nerite_interthread::{Hub, InterThreadTransporter};
use nerite_marshal::Marshallable;
use nerite_router::{Manager, Router};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Sample {
	a: i32,
}

impl Marshallable for Sample {
	const TYPE_NAME: &'static str = "Sample";
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Widget {
	b: i32,
}

impl Marshallable for Widget {
	const TYPE_NAME: &'static str = "Widget";
}

fn runtime() -> tokio::runtime::Runtime {
	tokio::runtime::Builder::new_multi_thread()
		.worker_threads(2)
		.enable_all()
		.build()
		.unwrap()
}

fn router_cfg(platform: &str, dir: &tempfile::TempDir) -> RouterConfig {
	RouterConfig {
		platform: platform.to_string(),
		transport: Transport::Ipc,
		socket_dir: Some(dir.path().to_path_buf()),
		..RouterConfig::default()
	}
}

fn portal_cfg(router: &RouterConfig, process_id: u32) -> PortalConfig {
	PortalConfig {
		platform: router.platform.clone(),
		transport: router.transport,
		socket_dir: router.socket_dir.clone(),
		manager_timeout: Duration::from_secs(5),
		process_id: Some(process_id),
		..PortalConfig::default()
	}
}

fn start_router(rt: &tokio::runtime::Runtime, cfg: RouterConfig) {
	let (router, ports) = Router::new(cfg.clone());
	let manager = Manager::new(cfg.clone(), ports);
	rt.spawn(router.run());
	rt.spawn(manager.run());

	let Ok(Endpoint::Ipc(path)) = cfg.manager_endpoint() else {
		panic!("expected ipc manager endpoint");
	};
	let deadline = Instant::now() + Duration::from_secs(5);
	while !path.exists() {
		assert!(Instant::now() < deadline, "manager socket never appeared");
		std::thread::sleep(Duration::from_millis(20));
	}
}

/// Give subscription filters time to travel portal -> reader -> router.
fn settle() {
	std::thread::sleep(Duration::from_millis(300));
}

fn poll_until(
	portal: &InterProcessPortal,
	target: usize,
	overall: Duration,
) -> usize {
	let deadline = Instant::now() + overall;
	let mut total = 0;
	while total < target && Instant::now() < deadline {
		total += portal.poll(Some(Duration::from_millis(200))).unwrap();
	}
	total
}

#[test]
fn s3_cross_portal_delivery_preserves_publish_order() {
	let rt = runtime();
	let dir = tempfile::tempdir().unwrap();
	let cfg = router_cfg("s3", &dir);
	start_router(&rt, cfg.clone());

	let publisher = InterProcessPortal::with_hub(Hub::new(), portal_cfg(&cfg, 1)).unwrap();
	let subscriber = InterProcessPortal::with_hub(Hub::new(), portal_cfg(&cfg, 2)).unwrap();

	let group = Group::new("Sample1");
	let seen = Arc::new(Mutex::new(Vec::new()));
	{
		let seen = Arc::clone(&seen);
		subscriber
			.subscribe::<Sample, _>(&group, move |sample| {
				seen.lock().unwrap().push(sample.a);
			})
			.unwrap();
	}
	settle();

	for a in 0..100 {
		publisher
			.publish(Sample { a }, &group, &TransporterConfig::default())
			.unwrap();
	}

	assert_eq!(poll_until(&subscriber, 100, Duration::from_secs(10)), 100);
	assert_eq!(*seen.lock().unwrap(), (0..100).collect::<Vec<_>>());
}

#[test]
fn s4_regex_subscription_selects_by_scheme_type_and_group() {
	let rt = runtime();
	let dir = tempfile::tempdir().unwrap();
	let cfg = router_cfg("s4", &dir);
	start_router(&rt, cfg.clone());

	let publisher = InterProcessPortal::with_hub(Hub::new(), portal_cfg(&cfg, 1)).unwrap();
	let subscriber = InterProcessPortal::with_hub(Hub::new(), portal_cfg(&cfg, 2)).unwrap();

	let seen = Arc::new(Mutex::new(Vec::new()));
	{
		let seen = Arc::clone(&seen);
		subscriber
			.subscribe_regex(
				vec![MarshalScheme::Structured],
				"Sample",
				"Sample1|Sample2",
				move |_, _, type_name, group| {
					seen.lock().unwrap().push((group.to_string(), type_name.to_string()));
				},
			)
			.unwrap();
	}
	settle();

	let cfg_pub = TransporterConfig::default();
	publisher.publish(Sample { a: 1 }, &Group::new("Sample1"), &cfg_pub).unwrap();
	publisher.publish(Sample { a: 2 }, &Group::new("Sample2"), &cfg_pub).unwrap();
	publisher.publish(Widget { b: 3 }, &Group::new("Widget"), &cfg_pub).unwrap();

	assert_eq!(poll_until(&subscriber, 2, Duration::from_secs(10)), 2);
	// The Widget frame arrived on the catch-all filter but matched no
	// subscription; give it a moment to prove it stays silent.
	assert_eq!(subscriber.poll(Some(Duration::from_millis(300))).unwrap(), 0);
	assert_eq!(
		*seen.lock().unwrap(),
		vec![
			("Sample1".to_string(), "Sample".to_string()),
			("Sample2".to_string(), "Sample".to_string()),
		]
	);
}

#[test]
fn s5_forwarder_unsubscribe_releases_the_filter() {
	let rt = runtime();
	let dir = tempfile::tempdir().unwrap();
	let cfg = router_cfg("s5", &dir);
	start_router(&rt, cfg.clone());

	let hub = Hub::new();
	let portal = InterProcessPortal::with_hub(Arc::clone(&hub), portal_cfg(&cfg, 1)).unwrap();
	let publisher = InterProcessPortal::with_hub(Hub::new(), portal_cfg(&cfg, 2)).unwrap();

	let group = Group::new("K");
	let hits = Arc::new(AtomicUsize::new(0));

	// An outer thread forwards its subscription through the inner
	// channel instead of calling the portal directly.
	let forwarder_thread = {
		let hub = Arc::clone(&hub);
		let hits = Arc::clone(&hits);
		let group = group.clone();
		std::thread::spawn(move || {
			let inner = InterThreadTransporter::on(hub);
			let record = nerite_marshal::typed_subscription::<Sample, _>(
				group,
				SubscriptionAction::Subscribe,
				move |_| {
					hits.fetch_add(1, Ordering::SeqCst);
				},
			);
			let thread = record.thread;
			inner.publish(record, &FORWARD_GROUP, &TransporterConfig::default());
			thread
		})
	};
	let forwarder_id = forwarder_thread.join().unwrap();

	// Process the forwarded record, then let the filter reach the
	// router.
	assert!(portal.poll(Some(Duration::from_secs(2))).unwrap() > 0);
	settle();

	publisher
		.publish(Sample { a: 1 }, &group, &TransporterConfig::default())
		.unwrap();
	assert_eq!(poll_until(&portal, 1, Duration::from_secs(10)), 1);
	assert_eq!(hits.load(Ordering::SeqCst), 1);

	// Drop every key the forwarder thread held. Publishing the record
	// from the portal's own thread needs echo for self-delivery.
	let control = InterThreadTransporter::on(Arc::clone(&hub));
	control.publish(
		ForwardedUnsubscribeAll {
			thread: forwarder_id,
		},
		&FORWARD_GROUP,
		&TransporterConfig::with_echo(),
	);
	assert!(portal.poll(Some(Duration::from_secs(2))).unwrap() > 0);
	settle();

	publisher
		.publish(Sample { a: 2 }, &group, &TransporterConfig::default())
		.unwrap();
	assert_eq!(portal.poll(Some(Duration::from_millis(500))).unwrap(), 0);
	assert_eq!(hits.load(Ordering::SeqCst), 1);

	// The filter is gone: a fresh regex subscription sees the next
	// publication through the catch-all path only.
	let regex_hits = Arc::new(AtomicUsize::new(0));
	{
		let regex_hits = Arc::clone(&regex_hits);
		portal
			.subscribe_regex(
				vec![MarshalScheme::AllSchemes],
				".*",
				".*",
				move |_, _, _, _| {
					regex_hits.fetch_add(1, Ordering::SeqCst);
				},
			)
			.unwrap();
	}
	settle();

	publisher
		.publish(Sample { a: 3 }, &group, &TransporterConfig::default())
		.unwrap();
	assert_eq!(poll_until(&portal, 1, Duration::from_secs(10)), 1);
	assert_eq!(regex_hits.load(Ordering::SeqCst), 1);
	assert_eq!(hits.load(Ordering::SeqCst), 1, "typed handler fired after unsubscribe");
}

#[test]
fn s6_manager_timeout_fails_construction_quickly() {
	// A bound-then-dropped listener yields a port nobody listens on.
	let port = {
		let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
		listener.local_addr().unwrap().port()
	};

	let cfg = PortalConfig {
		platform: "s6".to_string(),
		transport: Transport::Tcp,
		address: "127.0.0.1".to_string(),
		port,
		manager_timeout: Duration::from_secs(1),
		process_id: Some(1),
		..PortalConfig::default()
	};

	let start = Instant::now();
	let outcome = InterProcessPortal::with_hub(Hub::new(), cfg);
	let elapsed = start.elapsed();

	assert!(matches!(outcome, Err(PortalError::Configuration(_))));
	assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
}

#[test]
fn same_process_frames_are_dropped_without_echo() {
	let rt = runtime();
	let dir = tempfile::tempdir().unwrap();
	let cfg = router_cfg("origin", &dir);
	start_router(&rt, cfg.clone());

	// Same process id on both portals: the wire copy must be dropped.
	let publisher = InterProcessPortal::with_hub(Hub::new(), portal_cfg(&cfg, 7)).unwrap();
	let subscriber = InterProcessPortal::with_hub(Hub::new(), portal_cfg(&cfg, 7)).unwrap();

	let group = Group::new("loop");
	let hits = Arc::new(AtomicUsize::new(0));
	{
		let hits = Arc::clone(&hits);
		subscriber
			.subscribe::<Sample, _>(&group, move |_| {
				hits.fetch_add(1, Ordering::SeqCst);
			})
			.unwrap();
	}
	settle();

	publisher
		.publish(Sample { a: 1 }, &group, &TransporterConfig::default())
		.unwrap();
	assert_eq!(subscriber.poll(Some(Duration::from_millis(500))).unwrap(), 0);
	assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn tcp_transport_end_to_end() {
	let rt = runtime();
	let manager_port = {
		let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
		listener.local_addr().unwrap().port()
	};

	let cfg = RouterConfig {
		platform: "tcp".to_string(),
		transport: Transport::Tcp,
		tcp_port: manager_port,
		..RouterConfig::default()
	};
	let (router, ports) = Router::new(cfg.clone());
	let manager = Manager::new(cfg.clone(), ports);
	rt.spawn(router.run());
	rt.spawn(manager.run());

	// Wait for the manager to listen.
	let deadline = Instant::now() + Duration::from_secs(5);
	loop {
		if std::net::TcpStream::connect(("127.0.0.1", manager_port)).is_ok() {
			break;
		}
		assert!(Instant::now() < deadline, "manager never listened");
		std::thread::sleep(Duration::from_millis(20));
	}

	let portal_cfg = |process_id| PortalConfig {
		platform: "tcp".to_string(),
		transport: Transport::Tcp,
		address: "127.0.0.1".to_string(),
		port: manager_port,
		manager_timeout: Duration::from_secs(5),
		process_id: Some(process_id),
		..PortalConfig::default()
	};
	// A publish-only portal needs no local delivery at all.
	let publisher = InterProcessPortal::with_inner(NullTransporter, portal_cfg(1)).unwrap();
	let subscriber = InterProcessPortal::with_hub(Hub::new(), portal_cfg(2)).unwrap();

	let group = Group::new("depth");
	let seen = Arc::new(Mutex::new(Vec::new()));
	{
		let seen = Arc::clone(&seen);
		subscriber
			.subscribe::<Sample, _>(&group, move |sample| {
				seen.lock().unwrap().push(sample.a);
			})
			.unwrap();
	}
	settle();

	for a in 0..10 {
		publisher
			.publish(Sample { a }, &group, &TransporterConfig::default())
			.unwrap();
	}
	assert_eq!(poll_until(&subscriber, 10, Duration::from_secs(10)), 10);
	assert_eq!(*seen.lock().unwrap(), (0..10).collect::<Vec<_>>());
}

#[test]
fn forwarder_bridges_an_outer_thread() {
	let rt = runtime();
	let dir = tempfile::tempdir().unwrap();
	let cfg = router_cfg("fwd", &dir);
	start_router(&rt, cfg.clone());

	let hub = Hub::new();
	let portal = InterProcessPortal::with_hub(Arc::clone(&hub), portal_cfg(&cfg, 1)).unwrap();
	let remote = InterProcessPortal::with_hub(Hub::new(), portal_cfg(&cfg, 2)).unwrap();

	let group = Group::new("deep");
	let remote_seen = Arc::new(Mutex::new(Vec::new()));
	{
		let remote_seen = Arc::clone(&remote_seen);
		remote
			.subscribe::<Sample, _>(&group, move |sample| {
				remote_seen.lock().unwrap().push(sample.a);
			})
			.unwrap();
	}

	let (subscribed_tx, subscribed_rx) = std::sync::mpsc::channel();
	let outer = {
		let hub = Arc::clone(&hub);
		let group = group.clone();
		std::thread::spawn(move || {
			let forwarder = nerite_interprocess::InterProcessForwarder::on(hub);
			let seen = Arc::new(Mutex::new(Vec::new()));
			{
				let seen = Arc::clone(&seen);
				forwarder.subscribe::<Sample, _>(&group, move |sample| {
					seen.lock().unwrap().push(sample.a);
				});
			}
			subscribed_tx.send(()).unwrap();

			// Wait for the remote publication to come back through the
			// portal and the hub.
			let deadline = Instant::now() + Duration::from_secs(10);
			while seen.lock().unwrap().is_empty() && Instant::now() < deadline {
				forwarder.poll(Some(Duration::from_millis(200)));
			}

			// Answer outward through the same channel.
			forwarder
				.publish(Sample { a: 42 }, &group, &TransporterConfig::default())
				.unwrap();
			Arc::clone(&seen)
		})
	};
	subscribed_rx.recv().unwrap();

	// Process the forwarded subscription record and let the filter
	// land.
	assert!(portal.poll(Some(Duration::from_secs(2))).unwrap() > 0);
	settle();

	remote
		.publish(Sample { a: 7 }, &group, &TransporterConfig::default())
		.unwrap();

	// Drive the portal through the incoming frame (re-published onto
	// the hub for the forwarder), the forwarder's outgoing publication
	// record, and its teardown record.
	assert!(poll_until(&portal, 2, Duration::from_secs(10)) >= 2);

	let seen = outer.join().unwrap();
	assert_eq!(*seen.lock().unwrap(), vec![7]);

	let deadline = Instant::now() + Duration::from_secs(10);
	while remote_seen.lock().unwrap().is_empty() && Instant::now() < deadline {
		remote.poll(Some(Duration::from_millis(200))).unwrap();
	}
	assert_eq!(*remote_seen.lock().unwrap(), vec![42]);
}

#[test]
fn dynamic_publications_reach_typed_subscribers() {
	let rt = runtime();
	let dir = tempfile::tempdir().unwrap();
	let cfg = router_cfg("dynamic", &dir);
	start_router(&rt, cfg.clone());

	let publisher = InterProcessPortal::with_hub(Hub::new(), portal_cfg(&cfg, 1)).unwrap();
	let subscriber = InterProcessPortal::with_hub(Hub::new(), portal_cfg(&cfg, 2)).unwrap();

	let group = Group::new("dyn");
	let seen = Arc::new(Mutex::new(Vec::new()));
	{
		let seen = Arc::clone(&seen);
		subscriber
			.subscribe::<Sample, _>(&group, move |sample| {
				seen.lock().unwrap().push(sample.a);
			})
			.unwrap();
	}
	settle();

	nerite_marshal::pool::register::<Sample>();
	let message = nerite_marshal::pool::parse_dynamic(
		"Sample",
		&Sample { a: 5 }.to_bytes().unwrap(),
	)
	.unwrap();
	publisher.publish_dynamic(&message, &group).unwrap();

	assert_eq!(poll_until(&subscriber, 1, Duration::from_secs(10)), 1);
	assert_eq!(*seen.lock().unwrap(), vec![5]);
}

#[test]
fn operations_after_shutdown_are_refused() {
	let rt = runtime();
	let dir = tempfile::tempdir().unwrap();
	let cfg = router_cfg("shutdown", &dir);
	start_router(&rt, cfg.clone());

	let portal = InterProcessPortal::with_hub(Hub::new(), portal_cfg(&cfg, 1)).unwrap();
	portal.shutdown();

	let group = Group::new("g");
	assert!(matches!(
		portal.publish(Sample { a: 1 }, &group, &TransporterConfig::default()),
		Err(PortalError::ShutdownInProgress)
	));
	assert!(matches!(
		portal.poll(Some(Duration::ZERO)),
		Err(PortalError::ShutdownInProgress)
	));
}
