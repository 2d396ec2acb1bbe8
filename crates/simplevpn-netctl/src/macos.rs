// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::controller::NetworkController;
use crate::error::{NetError, Result};
use crate::plan::{FirewallBackup, GatewaySnapshot, NatInstall, NatRule, RouteEntry};
use crate::runner::CommandRunner;
use async_trait::async_trait;
use ipnet::Ipv4Net;
use std::io;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_PF_CONF: &str = "/etc/pf.conf";
const FORWARDING_SYSCTL: &str = "net.inet.ip.forwarding";

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> NetError + '_ {
	move |source| NetError::Io {
		path: path.display().to_string(),
		source,
	}
}

/// `ifconfig`, `route`, `sysctl` and `pfctl`, with NAT rules kept in pf.conf.
pub struct MacosController<R> {
	runner: R,
	pf_conf: PathBuf,
}

impl<R: CommandRunner> MacosController<R> {
	pub fn new(runner: R) -> Self {
		Self {
			runner,
			pf_conf: PathBuf::from(DEFAULT_PF_CONF),
		}
	}

	pub fn with_pf_conf(mut self, path: impl Into<PathBuf>) -> Self {
		self.pf_conf = path.into();
		self
	}

	fn backup_path(&self) -> PathBuf {
		let mut name = self.pf_conf.clone().into_os_string();
		name.push(".bak");
		PathBuf::from(name)
	}

	async fn read_pf_conf(&self) -> Result<String> {
		match fs::read_to_string(&self.pf_conf).await {
			Ok(content) => Ok(content),
			Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
			Err(e) => Err(io_err(&self.pf_conf)(e)),
		}
	}

	async fn reload_pf(&self) -> Result<()> {
		let conf = self.pf_conf.display().to_string();
		self.runner.run("pfctl", &["-f", conf.as_str()]).await?;
		Ok(())
	}

	async fn enable_pf(&self) -> Result<()> {
		let out = self.runner.output("pfctl", &["-e"]).await?;
		if out.success() || out.stderr.contains("already enabled") {
			return Ok(());
		}
		Err(NetError::CommandFailed {
			command: "pfctl -e".to_string(),
			status: out.status,
			stderr: out.stderr.trim().to_string(),
		})
	}

	fn route_args(verb: &'static str, route: &RouteEntry) -> Vec<String> {
		let mut args = vec![
			"-n".to_string(),
			verb.to_string(),
			"-net".to_string(),
			route.destination.to_string(),
		];
		match (route.gateway, &route.interface) {
			(Some(gw), _) => args.push(gw.to_string()),
			(None, Some(iface)) => {
				args.push("-interface".to_string());
				args.push(iface.clone());
			}
			(None, None) => {}
		}
		args
	}

	async fn route_cmd(&self, verb: &'static str, route: &RouteEntry) -> Result<()> {
		let args = Self::route_args(verb, route);
		let args: Vec<&str> = args.iter().map(String::as_str).collect();
		self.runner.run("route", &args).await?;
		Ok(())
	}
}

/// Parses the `gateway:` and `interface:` lines of `route -n get default`.
pub(crate) fn parse_route_get(output: &str) -> Option<GatewaySnapshot> {
	let mut gateway = None;
	let mut interface = None;
	for line in output.lines() {
		match line.trim().split_once(':') {
			Some(("gateway", value)) => gateway = value.trim().parse::<Ipv4Addr>().ok(),
			Some(("interface", value)) => interface = Some(value.trim().to_string()),
			_ => {}
		}
	}
	Some(GatewaySnapshot::new(gateway?, interface))
}

fn contains_rule(conf: &str, line: &str) -> bool {
	conf.lines().any(|l| l.trim() == line)
}

#[async_trait]
impl<R: CommandRunner> NetworkController for MacosController<R> {
	fn platform(&self) -> &'static str {
		"macos"
	}

	#[instrument(skip_all, fields(%interface, %address))]
	async fn assign_address(&self, interface: &str, address: Ipv4Net) -> Result<()> {
		let ip = address.addr().to_string();
		let mask = address.netmask().to_string();
		self.runner
			.run(
				"ifconfig",
				&[
					interface,
					"inet",
					ip.as_str(),
					ip.as_str(),
					"netmask",
					mask.as_str(),
					"up",
				],
			)
			.await?;
		info!("interface addressed and up");
		Ok(())
	}

	#[instrument(skip_all, fields(route = %route))]
	async fn install_route(&self, route: &RouteEntry) -> Result<()> {
		self.route_cmd("add", route).await
	}

	#[instrument(skip_all, fields(route = %route))]
	async fn remove_route(&self, route: &RouteEntry) -> Result<()> {
		self.route_cmd("delete", route).await
	}

	async fn forwarding_state(&self) -> Result<bool> {
		let out = self.runner.run("sysctl", &["-n", FORWARDING_SYSCTL]).await?;
		match out.trim() {
			"1" => Ok(true),
			"0" => Ok(false),
			other => Err(NetError::UnexpectedOutput {
				command: format!("sysctl -n {FORWARDING_SYSCTL}"),
				output: other.to_string(),
			}),
		}
	}

	#[instrument(skip(self))]
	async fn set_forwarding(&self, enabled: bool) -> Result<()> {
		let assignment = format!("{FORWARDING_SYSCTL}={}", u8::from(enabled));
		self.runner.run("sysctl", &["-w", assignment.as_str()]).await?;
		Ok(())
	}

	#[instrument(skip_all, fields(rule = %rule))]
	async fn install_nat_rule(&self, rule: &NatRule) -> Result<NatInstall> {
		let line = rule.pf_line();
		let original = self.read_pf_conf().await?;
		if contains_rule(&original, &line) {
			debug!("pf nat rule already present");
			self.enable_pf().await?;
			return Ok(NatInstall::AlreadyPresent);
		}

		let backup = FirewallBackup {
			original: self.pf_conf.clone(),
			backup: self.backup_path(),
		};
		fs::write(&backup.backup, &original)
			.await
			.map_err(io_err(&backup.backup))?;

		let mut updated = original.clone();
		if !updated.is_empty() && !updated.ends_with('\n') {
			updated.push('\n');
		}
		updated.push_str(&line);
		updated.push('\n');
		fs::write(&self.pf_conf, updated)
			.await
			.map_err(io_err(&self.pf_conf))?;

		let applied = match self.reload_pf().await {
			Ok(()) => self.enable_pf().await,
			Err(e) => Err(e),
		};
		if let Err(e) = applied {
			// Put the file back so a failed install leaves nothing behind.
			if let Err(restore) = fs::write(&self.pf_conf, &original).await {
				warn!(error = %restore, "failed to roll back pf.conf");
			}
			if let Err(remove) = fs::remove_file(&backup.backup).await {
				debug!(error = %remove, "could not remove pf.conf backup");
			}
			return Err(e);
		}

		info!("pf nat rule added");
		Ok(NatInstall::Added {
			firewall_backup: Some(backup),
		})
	}

	#[instrument(skip_all, fields(rule = %rule))]
	async fn remove_nat_rule(&self, rule: &NatRule) -> Result<()> {
		let line = rule.pf_line();
		let conf = self.read_pf_conf().await?;
		if !contains_rule(&conf, &line) {
			debug!("pf nat rule already absent");
			return Ok(());
		}

		let mut kept: String = conf
			.lines()
			.filter(|l| l.trim() != line)
			.collect::<Vec<_>>()
			.join("\n");
		kept.push('\n');
		fs::write(&self.pf_conf, kept)
			.await
			.map_err(io_err(&self.pf_conf))?;
		self.reload_pf().await
	}

	#[instrument(skip_all, fields(original = %backup.original.display()))]
	async fn restore_firewall_config(&self, backup: &FirewallBackup) -> Result<()> {
		fs::copy(&backup.backup, &backup.original)
			.await
			.map_err(io_err(&backup.original))?;
		if let Err(e) = fs::remove_file(&backup.backup).await {
			debug!(error = %e, "could not remove pf.conf backup");
		}
		let conf = backup.original.display().to_string();
		self.runner.run("pfctl", &["-f", conf.as_str()]).await?;
		Ok(())
	}

	async fn default_gateway(&self) -> Result<Option<GatewaySnapshot>> {
		let out = self.runner.run("route", &["-n", "get", "default"]).await?;
		Ok(parse_route_get(&out))
	}

	#[instrument(skip(self))]
	async fn replace_default_gateway(
		&self,
		gateway: Ipv4Addr,
		_interface: Option<&str>,
	) -> Result<()> {
		let gw = gateway.to_string();
		self.runner
			.run("route", &["-n", "change", "default", gw.as_str()])
			.await?;
		Ok(())
	}
}
