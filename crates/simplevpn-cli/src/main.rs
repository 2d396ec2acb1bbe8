// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! simplevpn - point-to-point WireGuard tunnels
//!
//! Runs a tunnel server, runs or configures a client, and manages the
//! server identity. The tunnel itself is driven through a userspace
//! WireGuard engine.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use simplevpn_daemon::SimpleVpnConfig;

mod commands;

use commands::{ClientArgs, KeysCommands, ServerArgs};

#[derive(Parser, Debug)]
#[command(name = "simplevpn", version, about, long_about = None)]
struct Args {
	/// TOML file with defaults for the server and client sections
	#[arg(short, long, global = true, env = "SIMPLEVPN_CONFIG")]
	config: Option<PathBuf>,

	/// Log level used when RUST_LOG is unset
	#[arg(short, long, global = true, default_value = "info", env = "SIMPLEVPN_LOG_LEVEL")]
	log_level: tracing::Level,

	/// Log output format
	#[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
	log_format: LogFormat,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Run the tunnel server until interrupted
	Server(ServerArgs),
	/// Generate a client config or run an embedded client
	Client(ClientArgs),
	/// Server identity and key utilities
	Keys {
		#[command(subcommand)]
		command: KeysCommands,
	},
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
	Pretty,
	Compact,
	Json,
}

// stdout is reserved for keys and generated configs.
fn init_tracing(level: tracing::Level, format: LogFormat) {
	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(format!("simplevpn={level}")));

	match format {
		LogFormat::Json => {
			tracing_subscriber::registry()
				.with(filter)
				.with(fmt::layer().json().with_writer(std::io::stderr))
				.init();
		}
		LogFormat::Compact => {
			tracing_subscriber::registry()
				.with(filter)
				.with(fmt::layer().compact().with_writer(std::io::stderr))
				.init();
		}
		LogFormat::Pretty => {
			tracing_subscriber::registry()
				.with(filter)
				.with(fmt::layer().with_writer(std::io::stderr))
				.init();
		}
	}
}

async fn load_file_config(path: Option<&PathBuf>) -> Result<SimpleVpnConfig> {
	match path {
		Some(path) => SimpleVpnConfig::load(path)
			.await
			.with_context(|| format!("failed to load {}", path.display())),
		None => Ok(SimpleVpnConfig::default()),
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	let args = Args::parse();
	init_tracing(args.log_level, args.log_format);

	let file = load_file_config(args.config.as_ref()).await?;
	debug!(config = ?args.config, "configuration loaded");

	match args.command {
		Command::Server(server) => commands::server::handle_server(server, file.server).await,
		Command::Client(client) => commands::client::handle_client(client, file.client).await,
		Command::Keys { command } => commands::keys::handle_keys(command, file.server).await,
	}
}
