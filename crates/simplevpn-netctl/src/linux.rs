// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::controller::NetworkController;
use crate::error::{NetError, Result};
use crate::plan::{FirewallBackup, GatewaySnapshot, NatInstall, NatRule, RouteEntry};
use crate::runner::CommandRunner;
use async_trait::async_trait;
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;
use tracing::{debug, info, instrument};

const FORWARDING_SYSCTL: &str = "net.ipv4.ip_forward";

/// `ip`, `sysctl` and `iptables`.
pub struct LinuxController<R> {
	runner: R,
}

impl<R: CommandRunner> LinuxController<R> {
	pub fn new(runner: R) -> Self {
		Self { runner }
	}

	fn route_args(route: &RouteEntry) -> Vec<String> {
		let mut args = vec![route.destination.to_string()];
		if let Some(gw) = route.gateway {
			args.push("via".to_string());
			args.push(gw.to_string());
		}
		if let Some(iface) = &route.interface {
			args.push("dev".to_string());
			args.push(iface.clone());
		}
		args
	}

	async fn ip_route(&self, verb: &str, route: &RouteEntry) -> Result<()> {
		let tail = Self::route_args(route);
		let mut args = vec!["route", verb];
		args.extend(tail.iter().map(String::as_str));
		self.runner.run("ip", &args).await?;
		Ok(())
	}

	async fn iptables_nat(&self, action: &str, rule: &NatRule) -> Result<String> {
		let source = rule.source.to_string();
		self.runner
			.run(
				"iptables",
				&[
					"-t",
					"nat",
					action,
					"POSTROUTING",
					"-s",
					source.as_str(),
					"-o",
					rule.egress_interface.as_str(),
					"-j",
					"MASQUERADE",
				],
			)
			.await
	}
}

/// Parses `default via 192.168.1.1 dev eth0 proto dhcp metric 100`.
pub(crate) fn parse_ip_route_default(output: &str) -> Option<GatewaySnapshot> {
	let line = output.lines().find(|l| l.trim_start().starts_with("default"))?;
	let mut gateway = None;
	let mut interface = None;
	let mut metric = None;
	let mut words = line.split_whitespace();
	while let Some(word) = words.next() {
		match word {
			"via" => gateway = words.next().and_then(|w| w.parse::<Ipv4Addr>().ok()),
			"dev" => interface = words.next().map(str::to_string),
			"metric" => metric = words.next().and_then(|w| w.parse::<u32>().ok()),
			_ => {}
		}
	}
	Some(GatewaySnapshot {
		gateway: gateway?,
		interface,
		metric,
	})
}

#[async_trait]
impl<R: CommandRunner> NetworkController for LinuxController<R> {
	fn platform(&self) -> &'static str {
		"linux"
	}

	#[instrument(skip_all, fields(%interface, %address))]
	async fn assign_address(&self, interface: &str, address: Ipv4Net) -> Result<()> {
		let addr = address.to_string();
		self.runner
			.run("ip", &["addr", "add", addr.as_str(), "dev", interface])
			.await?;
		self.runner
			.run("ip", &["link", "set", "up", "dev", interface])
			.await?;
		info!("interface addressed and up");
		Ok(())
	}

	#[instrument(skip_all, fields(route = %route))]
	async fn install_route(&self, route: &RouteEntry) -> Result<()> {
		self.ip_route("add", route).await
	}

	#[instrument(skip_all, fields(route = %route))]
	async fn remove_route(&self, route: &RouteEntry) -> Result<()> {
		self.ip_route("del", route).await
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
		if self.iptables_nat("-C", rule).await.is_ok() {
			debug!("masquerade rule already present");
			return Ok(NatInstall::AlreadyPresent);
		}
		self.iptables_nat("-A", rule).await?;
		info!("masquerade rule added");
		Ok(NatInstall::Added {
			firewall_backup: None,
		})
	}

	#[instrument(skip_all, fields(rule = %rule))]
	async fn remove_nat_rule(&self, rule: &NatRule) -> Result<()> {
		self.iptables_nat("-D", rule).await?;
		Ok(())
	}

	async fn restore_firewall_config(&self, backup: &FirewallBackup) -> Result<()> {
		// iptables rules are never file-backed here
		debug!(backup = %backup.backup.display(), "no firewall file to restore");
		Ok(())
	}

	async fn default_gateway(&self) -> Result<Option<GatewaySnapshot>> {
		let out = self.runner.run("ip", &["-4", "route", "show", "default"]).await?;
		Ok(parse_ip_route_default(&out))
	}

	#[instrument(skip(self))]
	async fn replace_default_gateway(
		&self,
		gateway: Ipv4Addr,
		interface: Option<&str>,
	) -> Result<()> {
		let gw = gateway.to_string();
		let mut args = vec!["route", "replace", "default", "via", gw.as_str()];
		if let Some(iface) = interface {
			args.push("dev");
			args.push(iface);
		}
		self.runner.run("ip", &args).await?;
		Ok(())
	}

	/// `replace default via <server>` writes a metric 0 route. If the old
	/// default had another metric it was never touched, so the added route is
	/// deleted instead of written over.
	#[instrument(skip_all, fields(previous = %previous, %replaced))]
	async fn restore_default_gateway(
		&self,
		previous: &GatewaySnapshot,
		replaced: Ipv4Addr,
	) -> Result<()> {
		if previous.metric.unwrap_or(0) != 0 {
			let gw = replaced.to_string();
			self.runner
				.run("ip", &["route", "del", "default", "via", gw.as_str()])
				.await?;
			return Ok(());
		}

		let gw = previous.gateway.to_string();
		let mut args = vec!["route", "replace", "default", "via", gw.as_str()];
		if let Some(iface) = previous.interface.as_deref() {
			args.push("dev");
			args.push(iface);
		}
		self.runner.run("ip", &args).await?;
		Ok(())
	}
}
