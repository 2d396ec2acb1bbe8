// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::error::{NetError, Result};
use crate::linux::LinuxController;
use crate::macos::MacosController;
use crate::plan::{FirewallBackup, GatewaySnapshot, NatInstall, NatRule, RouteEntry};
use crate::runner::SystemRunner;
use async_trait::async_trait;
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

/// Host networking operations for one OS family. Every call is awaited to
/// completion before the caller issues the next.
#[async_trait]
pub trait NetworkController: Send + Sync {
	fn platform(&self) -> &'static str;

	/// Assigns `address` (with its prefix) to the interface and brings it up.
	async fn assign_address(&self, interface: &str, address: Ipv4Net) -> Result<()>;

	async fn install_route(&self, route: &RouteEntry) -> Result<()>;

	async fn remove_route(&self, route: &RouteEntry) -> Result<()>;

	async fn forwarding_state(&self) -> Result<bool>;

	async fn set_forwarding(&self, enabled: bool) -> Result<()>;

	/// Installs the masquerade rule unless an identical one is already active.
	async fn install_nat_rule(&self, rule: &NatRule) -> Result<NatInstall>;

	async fn remove_nat_rule(&self, rule: &NatRule) -> Result<()>;

	async fn restore_firewall_config(&self, backup: &FirewallBackup) -> Result<()>;

	async fn default_gateway(&self) -> Result<Option<GatewaySnapshot>>;

	async fn replace_default_gateway(&self, gateway: Ipv4Addr, interface: Option<&str>)
		-> Result<()>;

	/// Undoes `replace_default_gateway(replaced, None)`, putting `previous`
	/// back. Platforms whose replace is in place just replace again.
	async fn restore_default_gateway(
		&self,
		previous: &GatewaySnapshot,
		replaced: Ipv4Addr,
	) -> Result<()> {
		let _ = replaced;
		self.replace_default_gateway(previous.gateway, previous.interface.as_deref())
			.await
	}

	/// Interface carrying the default route.
	async fn primary_interface(&self) -> Result<String> {
		self.default_gateway()
			.await?
			.and_then(|gw| gw.interface)
			.ok_or(NetError::NoDefaultRoute)
	}
}

/// Picks the controller for the compile target.
pub fn platform_controller() -> Result<Box<dyn NetworkController>> {
	if cfg!(target_os = "linux") {
		Ok(Box::new(LinuxController::new(SystemRunner)))
	} else if cfg!(target_os = "macos") {
		Ok(Box::new(MacosController::new(SystemRunner)))
	} else {
		Err(NetError::UnsupportedPlatform(std::env::consts::OS))
	}
}
