// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::engine::{EngineLauncher, TunnelEngine};
use crate::error::{EngineError, Result};
use crate::uapi::{socket_path, ExpectedDevice, UapiClient, DEFAULT_SOCKET_DIR};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::fs;
use tokio::process::{Child, Command};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_ENGINE_BINARY: &str = "wireguard-go";
const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Launches a userspace WireGuard implementation in the foreground and talks
/// to it over its UAPI socket.
#[derive(Debug, Clone)]
pub struct UserspaceLauncher {
	binary: PathBuf,
	socket_dir: PathBuf,
	startup_timeout: Duration,
}

impl Default for UserspaceLauncher {
	fn default() -> Self {
		Self {
			binary: PathBuf::from(DEFAULT_ENGINE_BINARY),
			socket_dir: PathBuf::from(DEFAULT_SOCKET_DIR),
			startup_timeout: DEFAULT_STARTUP_TIMEOUT,
		}
	}
}

impl UserspaceLauncher {
	pub fn new(binary: impl Into<PathBuf>) -> Self {
		Self {
			binary: binary.into(),
			..Self::default()
		}
	}

	pub fn with_socket_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.socket_dir = dir.into();
		self
	}

	pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
		self.startup_timeout = timeout;
		self
	}

	fn name_file(requested: &str) -> PathBuf {
		std::env::temp_dir().join(format!("simplevpn-{}-{requested}.name", std::process::id()))
	}

	/// Polls until the engine has published its interface name (macOS
	/// `utun` picks the next free unit) and its control socket exists.
	async fn wait_ready(&self, child: &mut Child, requested: &str, name_file: &Path) -> Result<String> {
		let deadline = Instant::now() + self.startup_timeout;
		loop {
			if let Some(status) = child.try_wait()? {
				return Err(EngineError::InterfaceCreation(format!(
					"{} exited during startup with {status}",
					self.binary.display()
				)));
			}

			let name = match fs::read_to_string(name_file).await {
				Ok(s) if !s.trim().is_empty() => s.trim().to_string(),
				_ => requested.to_string(),
			};
			let socket = socket_path(&self.socket_dir, &name);
			if fs::metadata(&socket).await.is_ok() {
				return Ok(name);
			}

			if Instant::now() >= deadline {
				return Err(EngineError::StartupTimeout(socket));
			}
			sleep(POLL_INTERVAL).await;
		}
	}
}

#[async_trait]
impl EngineLauncher for UserspaceLauncher {
	type Engine = UserspaceEngine;

	#[instrument(skip(self), fields(binary = %self.binary.display()))]
	async fn create_interface(&self, requested_name: &str) -> Result<UserspaceEngine> {
		let name_file = Self::name_file(requested_name);
		let _ = fs::remove_file(&name_file).await;

		let mut child = Command::new(&self.binary)
			.arg("-f")
			.arg(requested_name)
			.env("WG_TUN_NAME_FILE", &name_file)
			.stdin(Stdio::null())
			.stdout(Stdio::null())
			.kill_on_drop(true)
			.spawn()
			.map_err(|e| {
				EngineError::InterfaceCreation(format!("failed to spawn {}: {e}", self.binary.display()))
			})?;

		let interface = match self.wait_ready(&mut child, requested_name, &name_file).await {
			Ok(name) => name,
			Err(e) => {
				let _ = child.start_kill();
				let _ = child.wait().await;
				let _ = fs::remove_file(&name_file).await;
				return Err(e);
			}
		};

		let uapi = UapiClient::new(socket_path(&self.socket_dir, &interface));
		info!(%interface, "tunnel interface created");
		Ok(UserspaceEngine {
			interface,
			uapi,
			child: Some(child),
			name_file,
			expected: ExpectedDevice::default(),
		})
	}
}

#[derive(Debug)]
pub struct UserspaceEngine {
	interface: String,
	uapi: UapiClient,
	child: Option<Child>,
	name_file: PathBuf,
	expected: ExpectedDevice,
}

#[async_trait]
impl TunnelEngine for UserspaceEngine {
	fn interface_name(&self) -> &str {
		&self.interface
	}

	#[instrument(skip_all, fields(interface = %self.interface))]
	async fn configure(&mut self, config: &str) -> Result<()> {
		if self.child.is_none() {
			return Err(EngineError::NotRunning);
		}
		self.uapi.set(config).await?;
		self.expected = ExpectedDevice::from_set_body(config);
		Ok(())
	}

	/// The device comes up with its link; this confirms the engine is
	/// answering and holds the port and peers that were configured.
	#[instrument(skip_all, fields(interface = %self.interface))]
	async fn up(&mut self) -> Result<()> {
		if self.child.is_none() {
			return Err(EngineError::NotRunning);
		}
		let state = self.uapi.get().await?;
		self.expected.verify(&state)?;
		info!(
			listen_port = ?self.expected.listen_port,
			peers = self.expected.peers,
			"tunnel engine up"
		);
		Ok(())
	}

	#[instrument(skip_all, fields(interface = %self.interface))]
	async fn close(&mut self) -> Result<()> {
		let Some(mut child) = self.child.take() else {
			return Err(EngineError::NotRunning);
		};
		if let Err(e) = child.start_kill() {
			warn!(error = %e, "failed to signal tunnel engine");
		}
		let status = child.wait().await?;
		debug!(%status, "tunnel engine exited");

		let _ = fs::remove_file(self.uapi.socket()).await;
		let _ = fs::remove_file(&self.name_file).await;
		info!("tunnel engine closed");
		Ok(())
	}
}
