//! Nerite router daemon.
//!
//! Runs the per-platform router (fan-out proxy) and manager
//! (discovery endpoint) until interrupted. Every portal in the
//! platform group connects through this process.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::info;

use nerite_core::{RouterConfig, Transport};
use nerite_router::{Manager, Router};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TransportArg {
	Ipc,
	Tcp,
}

impl From<TransportArg> for Transport {
	fn from(arg: TransportArg) -> Self {
		match arg {
			TransportArg::Ipc => Self::Ipc,
			TransportArg::Tcp => Self::Tcp,
		}
	}
}

/// Router command line arguments.
#[derive(Parser, Debug)]
#[command(name = "nerite-router")]
#[command(about = "Nerite interprocess router and manager")]
struct Args {
	/// Platform identifier shared by every process in the group
	#[arg(short, long, default_value = "default")]
	platform: String,

	/// Transport for the bound sockets
	#[arg(short, long, value_enum, default_value_t = TransportArg::Ipc)]
	transport: TransportArg,

	/// Manager bind port (tcp transport)
	#[arg(long, default_value_t = 11144)]
	port: u16,

	/// Directory for ipc sockets
	#[arg(long, value_name = "DIR")]
	socket_dir: Option<PathBuf>,

	/// Explicit ipc socket base name
	#[arg(long)]
	socket_name: Option<String>,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	setup_tracing(args.verbose);

	let cfg = RouterConfig {
		platform: args.platform,
		transport: args.transport.into(),
		socket_name: args.socket_name,
		socket_dir: args.socket_dir,
		tcp_port: args.port,
		..RouterConfig::default()
	};

	info!(platform = %cfg.platform, transport = ?cfg.transport, "starting nerite-router");

	let (router, ports) = Router::new(cfg.clone());
	let manager = Manager::new(cfg, ports);

	let router_task = tokio::spawn(router.run());
	let manager_task = tokio::spawn(manager.run());

	tokio::select! {
		outcome = router_task => outcome??,
		outcome = manager_task => outcome??,
		result = tokio::signal::ctrl_c() => {
			result?;
			info!("interrupted, shutting down");
		}
	}

	Ok(())
}

fn setup_tracing(verbose: bool) {
	use tracing_subscriber::EnvFilter;

	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
		if verbose {
			EnvFilter::new("nerite_router=debug,info")
		} else {
			EnvFilter::new("info")
		}
	});

	tracing_subscriber::fmt().with_env_filter(filter).init();
}
