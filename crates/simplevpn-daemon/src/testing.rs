// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory engine and host doubles. Every call lands in one shared log so
//! tests can assert ordering across both.

use async_trait::async_trait;
use ipnet::Ipv4Net;
use simplevpn_netctl::{
	FirewallBackup, GatewaySnapshot, NatInstall, NatRule, NetError, NetworkController, RouteEntry,
};
use simplevpn_wgtunnel_engine::{EngineError, EngineLauncher, TunnelEngine};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct HostState {
	pub calls: Vec<String>,
	pub failing: Vec<&'static str>,
	pub forwarding: bool,
	pub nat_rules: Vec<NatRule>,
	pub routes: Vec<RouteEntry>,
	pub addresses: Vec<(String, Ipv4Net)>,
	pub default_gateway: Option<GatewaySnapshot>,
	pub engine_config: Option<String>,
	pub engine_open: bool,
	pub configure_errno: Option<i32>,
	/// Handed back by `install_nat_rule`, as a file-backed firewall would.
	pub firewall_backup: Option<FirewallBackup>,
}

pub type SharedHost = Arc<Mutex<HostState>>;

pub fn shared_host() -> SharedHost {
	Arc::new(Mutex::new(HostState::default()))
}

fn record(host: &SharedHost, op: &'static str, detail: String) -> bool {
	let mut state = host.lock().unwrap();
	let entry = if detail.is_empty() {
		op.to_string()
	} else {
		format!("{op} {detail}")
	};
	state.calls.push(entry);
	!state.failing.contains(&op)
}

fn simulated(op: &'static str) -> NetError {
	NetError::CommandFailed {
		command: op.to_string(),
		status: Some(1),
		stderr: "simulated failure".to_string(),
	}
}

#[derive(Clone)]
pub struct FakeController {
	host: SharedHost,
}

impl FakeController {
	pub fn new(host: SharedHost) -> Self {
		Self { host }
	}

	fn op(&self, op: &'static str, detail: String) -> Result<(), NetError> {
		if record(&self.host, op, detail) {
			Ok(())
		} else {
			Err(simulated(op))
		}
	}
}

#[async_trait]
impl NetworkController for FakeController {
	fn platform(&self) -> &'static str {
		"fake"
	}

	async fn assign_address(&self, interface: &str, address: Ipv4Net) -> Result<(), NetError> {
		self.op("assign_address", format!("{interface} {address}"))?;
		self.host
			.lock()
			.unwrap()
			.addresses
			.push((interface.to_string(), address));
		Ok(())
	}

	async fn install_route(&self, route: &RouteEntry) -> Result<(), NetError> {
		self.op("install_route", route.to_string())?;
		self.host.lock().unwrap().routes.push(route.clone());
		Ok(())
	}

	async fn remove_route(&self, route: &RouteEntry) -> Result<(), NetError> {
		self.op("remove_route", route.to_string())?;
		self.host.lock().unwrap().routes.retain(|r| r != route);
		Ok(())
	}

	async fn forwarding_state(&self) -> Result<bool, NetError> {
		self.op("forwarding_state", String::new())?;
		Ok(self.host.lock().unwrap().forwarding)
	}

	async fn set_forwarding(&self, enabled: bool) -> Result<(), NetError> {
		self.op("set_forwarding", enabled.to_string())?;
		self.host.lock().unwrap().forwarding = enabled;
		Ok(())
	}

	async fn install_nat_rule(&self, rule: &NatRule) -> Result<NatInstall, NetError> {
		self.op("install_nat_rule", rule.to_string())?;
		let mut state = self.host.lock().unwrap();
		if state.nat_rules.contains(rule) {
			return Ok(NatInstall::AlreadyPresent);
		}
		state.nat_rules.push(rule.clone());
		Ok(NatInstall::Added {
			firewall_backup: state.firewall_backup.clone(),
		})
	}

	async fn remove_nat_rule(&self, rule: &NatRule) -> Result<(), NetError> {
		self.op("remove_nat_rule", rule.to_string())?;
		self.host.lock().unwrap().nat_rules.retain(|r| r != rule);
		Ok(())
	}

	async fn restore_firewall_config(&self, backup: &FirewallBackup) -> Result<(), NetError> {
		self.op(
			"restore_firewall_config",
			backup.original.display().to_string(),
		)
	}

	async fn default_gateway(&self) -> Result<Option<GatewaySnapshot>, NetError> {
		self.op("default_gateway", String::new())?;
		Ok(self.host.lock().unwrap().default_gateway.clone())
	}

	async fn replace_default_gateway(
		&self,
		gateway: Ipv4Addr,
		interface: Option<&str>,
	) -> Result<(), NetError> {
		self.op("replace_default_gateway", gateway.to_string())?;
		self.host.lock().unwrap().default_gateway =
			Some(GatewaySnapshot::new(gateway, interface.map(str::to_string)));
		Ok(())
	}
}

pub struct FakeLauncher {
	host: SharedHost,
	assigned_name: Option<String>,
}

impl FakeLauncher {
	pub fn new(host: SharedHost) -> Self {
		Self {
			host,
			assigned_name: None,
		}
	}

	/// Pretend the OS picked a different name, as macOS does for `utun`.
	pub fn assigning(mut self, name: &str) -> Self {
		self.assigned_name = Some(name.to_string());
		self
	}
}

#[async_trait]
impl EngineLauncher for FakeLauncher {
	type Engine = FakeEngine;

	async fn create_interface(&self, requested_name: &str) -> Result<FakeEngine, EngineError> {
		if !record(&self.host, "create_interface", requested_name.to_string()) {
			return Err(EngineError::InterfaceCreation("simulated failure".to_string()));
		}
		self.host.lock().unwrap().engine_open = true;
		Ok(FakeEngine {
			host: self.host.clone(),
			interface: self
				.assigned_name
				.clone()
				.unwrap_or_else(|| requested_name.to_string()),
		})
	}
}

pub struct FakeEngine {
	host: SharedHost,
	interface: String,
}

#[async_trait]
impl TunnelEngine for FakeEngine {
	fn interface_name(&self) -> &str {
		&self.interface
	}

	async fn configure(&mut self, config: &str) -> Result<(), EngineError> {
		record(&self.host, "configure", String::new());
		let mut state = self.host.lock().unwrap();
		if let Some(errno) = state.configure_errno {
			return Err(EngineError::Configuration { errno });
		}
		state.engine_config = Some(config.to_string());
		Ok(())
	}

	async fn up(&mut self) -> Result<(), EngineError> {
		record(&self.host, "up", String::new());
		Ok(())
	}

	async fn close(&mut self) -> Result<(), EngineError> {
		record(&self.host, "close", String::new());
		self.host.lock().unwrap().engine_open = false;
		Ok(())
	}
}
