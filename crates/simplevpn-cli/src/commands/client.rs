// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use clap::{Args, ValueEnum};
use console::style;
use ipnet::{IpNet, Ipv4Net};
use simplevpn_daemon::{
	generate_client_config, shutdown_signal, write_config_file, ClientConfig, TunnelLifecycle,
};
use simplevpn_netctl::platform_controller;
use simplevpn_wgtunnel_common::parse_subnet;
use simplevpn_wgtunnel_engine::{UserspaceLauncher, DEFAULT_ENGINE_BINARY};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ClientMode {
	/// Print a wg-quick config with a fresh keypair
	Config,
	/// Bring the tunnel up in this process
	Embedded,
}

#[derive(Debug, Clone, Args)]
pub struct ClientArgs {
	#[arg(long, value_enum, default_value_t = ClientMode::Embedded, env = "SIMPLEVPN_CLIENT_MODE")]
	pub mode: ClientMode,

	/// Server hostname or IP
	#[arg(long, env = "SIMPLEVPN_SERVER_ADDRESS")]
	pub server_address: Option<String>,

	#[arg(long, env = "SIMPLEVPN_SERVER_PORT")]
	pub server_port: Option<u16>,

	/// Server public key (base64), as printed by `simplevpn keys show`
	#[arg(long, env = "SIMPLEVPN_SERVER_PUBLIC_KEY")]
	pub server_public_key: Option<String>,

	/// This client's address inside the tunnel
	#[arg(long, env = "SIMPLEVPN_CLIENT_IP")]
	pub client_ip: Option<Ipv4Addr>,

	#[arg(long, env = "SIMPLEVPN_SUBNET", value_parser = parse_subnet)]
	pub subnet: Option<Ipv4Net>,

	/// Ranges sent through the tunnel
	#[arg(long, value_delimiter = ',', env = "SIMPLEVPN_ALLOWED_IPS")]
	pub allowed_ips: Vec<IpNet>,

	/// Keepalive interval in seconds
	#[arg(long)]
	pub keepalive: Option<u16>,

	/// DNS server written into generated configs
	#[arg(long)]
	pub dns: Option<IpAddr>,

	/// Requested tunnel interface name (embedded mode)
	#[arg(long, env = "SIMPLEVPN_INTERFACE")]
	pub interface: Option<String>,

	/// Userspace WireGuard engine to launch (embedded mode)
	#[arg(long, env = "SIMPLEVPN_ENGINE", default_value = DEFAULT_ENGINE_BINARY)]
	pub engine: PathBuf,

	/// Write the generated config here instead of stdout (config mode)
	#[arg(short, long)]
	pub output: Option<PathBuf>,
}

impl ClientArgs {
	pub fn apply(&self, mut config: ClientConfig) -> ClientConfig {
		if let Some(address) = &self.server_address {
			config.server_address = address.clone();
		}
		if let Some(port) = self.server_port {
			config.server_port = port;
		}
		if let Some(key) = &self.server_public_key {
			config.server_public_key = key.clone();
		}
		if let Some(ip) = self.client_ip {
			config.client_ip = ip;
		}
		if let Some(subnet) = self.subnet {
			config.subnet = subnet;
		}
		if !self.allowed_ips.is_empty() {
			config.allowed_ips = self.allowed_ips.clone();
		}
		if let Some(keepalive) = self.keepalive {
			config.persistent_keepalive = keepalive;
		}
		if let Some(dns) = self.dns {
			config.dns = dns;
		}
		if let Some(name) = &self.interface {
			config.interface_name = name.clone();
		}
		config
	}
}

pub async fn handle_client(args: ClientArgs, file: ClientConfig) -> anyhow::Result<()> {
	let config = args.apply(file);
	match args.mode {
		ClientMode::Config => emit_config(&config, args.output.as_deref()).await,
		ClientMode::Embedded => run_embedded(&config, &args.engine).await,
	}
}

#[instrument(skip_all)]
async fn emit_config(config: &ClientConfig, output: Option<&Path>) -> anyhow::Result<()> {
	let (keypair, document) = generate_client_config(config)?;
	let text = document.render();

	let Some(path) = output else {
		print!("{}", text.as_str());
		eprintln!(
			"{} Register this client on the server with --peer-public-key {}",
			style("→").cyan(),
			keypair.public_key()
		);
		return Ok(());
	};

	write_config_file(path, &text).await?;
	println!(
		"{} Wrote client config to {}",
		style("✓").green().bold(),
		style(path.display()).cyan()
	);
	println!("  Client public key: {}", style(keypair.public_key()).bold());
	println!();
	println!("  Register the key on the server:");
	println!(
		"    simplevpn server --peer-public-key {}",
		keypair.public_key()
	);
	println!("  Then bring the tunnel up:");
	println!("    sudo wg-quick up {}", path.display());
	println!("  And down again:");
	println!("    sudo wg-quick down {}", path.display());
	Ok(())
}

#[instrument(skip_all)]
async fn run_embedded(config: &ClientConfig, engine: &Path) -> anyhow::Result<()> {
	info!(
		server = %config.server_address,
		port = config.server_port,
		client_ip = %config.client_ip,
		"starting embedded client"
	);

	let controller = platform_controller()?;
	let mut lifecycle = TunnelLifecycle::new(UserspaceLauncher::new(engine), controller)
		.on_notice(super::print_notice);

	println!(
		"{} Connecting to {}:{}. Press Ctrl+C to disconnect.",
		style("→").cyan(),
		style(&config.server_address).bold(),
		config.server_port
	);
	let reason = lifecycle.run_client(config, shutdown_signal()).await?;

	println!(
		"{} Disconnected ({reason}), routes restored",
		style("✓").green().bold()
	);
	Ok(())
}
