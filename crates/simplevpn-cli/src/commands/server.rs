// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use clap::Args;
use console::style;
use ipnet::{IpNet, Ipv4Net};
use simplevpn_daemon::{shutdown_signal, ServerConfig, ServerPeerConfig, StaticRoute, TunnelLifecycle};
use simplevpn_netctl::platform_controller;
use simplevpn_wgtunnel_common::parse_subnet;
use simplevpn_wgtunnel_engine::{UserspaceLauncher, DEFAULT_ENGINE_BINARY};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use tracing::{info, instrument};

/// Unset flags fall back to the config file, then to built-in defaults.
#[derive(Debug, Clone, Args)]
pub struct ServerArgs {
	/// Directory holding server_private.key and server_public.key
	#[arg(long, env = "SIMPLEVPN_KEY_DIR")]
	pub key_dir: Option<PathBuf>,

	/// Tunnel subnet; the server takes its first usable address
	#[arg(long, env = "SIMPLEVPN_SUBNET", value_parser = parse_subnet)]
	pub subnet: Option<Ipv4Net>,

	/// UDP port the engine listens on
	#[arg(short = 'p', long, env = "SIMPLEVPN_LISTEN_PORT")]
	pub listen_port: Option<u16>,

	/// Requested tunnel interface name
	#[arg(long, env = "SIMPLEVPN_INTERFACE")]
	pub interface: Option<String>,

	/// Interface NAT traffic leaves through; detected from the default route if unset
	#[arg(long, env = "SIMPLEVPN_EGRESS_INTERFACE")]
	pub egress_interface: Option<String>,

	/// Public key (base64) of the client allowed to connect
	#[arg(long, env = "SIMPLEVPN_PEER_PUBLIC_KEY")]
	pub peer_public_key: Option<String>,

	/// Ranges routed to the client peer; defaults to the tunnel subnet
	#[arg(long, value_delimiter = ',', requires = "peer_public_key")]
	pub allowed_ips: Vec<IpNet>,

	/// Extra route installed at startup, best effort
	#[arg(long, requires = "static_gateway")]
	pub static_route: Option<Ipv4Net>,

	/// Gateway for --static-route
	#[arg(long, requires = "static_route")]
	pub static_gateway: Option<Ipv4Addr>,

	/// Userspace WireGuard engine to launch
	#[arg(long, env = "SIMPLEVPN_ENGINE", default_value = DEFAULT_ENGINE_BINARY)]
	pub engine: PathBuf,
}

impl ServerArgs {
	pub fn apply(&self, mut config: ServerConfig) -> ServerConfig {
		if let Some(dir) = &self.key_dir {
			config.key_dir = Some(dir.clone());
		}
		if let Some(subnet) = self.subnet {
			config.subnet = subnet;
		}
		if let Some(port) = self.listen_port {
			config.listen_port = port;
		}
		if let Some(name) = &self.interface {
			config.interface_name = name.clone();
		}
		if let Some(egress) = &self.egress_interface {
			config.egress_interface = Some(egress.clone());
		}
		if let Some(key) = &self.peer_public_key {
			config.peer = Some(ServerPeerConfig {
				public_key: key.clone(),
				allowed_ips: self.allowed_ips.clone(),
			});
		}
		if let (Some(destination), Some(gateway)) = (self.static_route, self.static_gateway) {
			config.static_route = Some(StaticRoute {
				destination,
				gateway,
			});
		}
		config
	}
}

#[instrument(skip_all)]
pub async fn handle_server(args: ServerArgs, file: ServerConfig) -> anyhow::Result<()> {
	let config = args.apply(file);
	info!(
		subnet = %config.subnet,
		listen_port = config.listen_port,
		interface = %config.interface_name,
		"starting server"
	);

	let controller = platform_controller()?;
	let launcher = UserspaceLauncher::new(&args.engine);
	let mut lifecycle =
		TunnelLifecycle::new(launcher, controller).on_notice(super::print_notice);

	println!(
		"{} Listening on UDP {} for subnet {}. Press Ctrl+C to stop.",
		style("→").cyan(),
		style(config.listen_port).bold(),
		style(config.subnet).bold()
	);
	let reason = lifecycle.run_server(&config, shutdown_signal()).await?;

	println!(
		"{} Server stopped ({reason}), host networking restored",
		style("✓").green().bold()
	);
	Ok(())
}
