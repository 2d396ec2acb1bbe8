// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::config::{ClientConfig, ServerConfig};
use crate::error::{ConfigError, LifecycleError, Result};
use crate::signal::ShutdownReason;
use ipnet::{IpNet, Ipv4Net};
use simplevpn_netctl::{
	GatewaySnapshot, NatInstall, NatRule, NetworkController, NetworkPlan, RestoreAction,
	RestoreLedger, RouteEntry,
};
use simplevpn_wgtunnel_common::{
	default_identity_dir, encode_device_config, ensure_identity, first_usable, host_in_subnet,
	DeviceConfig, Endpoint, PeerDescriptor, ServerIdentity, WgKeyPair, WgPublicKey,
	SPLIT_DEFAULT_ROUTES,
};
use simplevpn_wgtunnel_engine::{EngineLauncher, TunnelEngine};
use std::fmt;
use std::future::Future;
use std::net::IpAddr;
use tracing::{debug, info, instrument, warn};
use zeroize::Zeroizing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
	Start,
	IdentityReady,
	InterfaceCreated,
	AddressAssigned,
	RoutesInstalled,
	ForwardingAndNatEnabled,
	EngineConfigured,
	Up,
	Running,
	SignalReceived,
	Restoring,
	EngineClosed,
	Terminated,
	Failed,
}

impl fmt::Display for LifecycleState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(self, f)
	}
}

/// Things the operator has to see, handed to the presentation layer.
#[derive(Debug)]
pub enum Notice<'a> {
	ServerIdentity {
		identity: &'a ServerIdentity,
		created: bool,
	},
	ClientKey {
		public_key: &'a WgPublicKey,
	},
}

type NoticeHook = Box<dyn Fn(Notice<'_>) + Send + Sync>;

/// Drives one tunnel from startup to teardown: identity, interface, host
/// networking, engine configuration, the wait for a shutdown signal and the
/// restore of everything recorded along the way.
pub struct TunnelLifecycle<L, N: ?Sized> {
	launcher: L,
	controller: Box<N>,
	notice: Option<NoticeHook>,
	state: LifecycleState,
	history: Vec<LifecycleState>,
	plan: Option<NetworkPlan>,
}

impl<L, N> TunnelLifecycle<L, N>
where
	L: EngineLauncher,
	N: NetworkController + ?Sized,
{
	pub fn new(launcher: L, controller: Box<N>) -> Self {
		Self {
			launcher,
			controller,
			notice: None,
			state: LifecycleState::Start,
			history: vec![LifecycleState::Start],
			plan: None,
		}
	}

	pub fn on_notice(mut self, hook: impl Fn(Notice<'_>) + Send + Sync + 'static) -> Self {
		self.notice = Some(Box::new(hook));
		self
	}

	pub fn state(&self) -> LifecycleState {
		self.state
	}

	pub fn history(&self) -> &[LifecycleState] {
		&self.history
	}

	pub fn plan(&self) -> Option<&NetworkPlan> {
		self.plan.as_ref()
	}

	fn transition(&mut self, state: LifecycleState) {
		self.state = state;
		self.history.push(state);
		info!(%state, "lifecycle transition");
	}

	fn reset(&mut self) {
		self.state = LifecycleState::Start;
		self.history = vec![LifecycleState::Start];
		self.plan = None;
	}

	fn notify(&self, notice: Notice<'_>) {
		if let Some(hook) = &self.notice {
			hook(notice);
		}
	}

	/// Runs the server role until `shutdown` resolves.
	#[instrument(skip_all, fields(subnet = %config.subnet, listen_port = config.listen_port))]
	pub async fn run_server<F>(&mut self, config: &ServerConfig, shutdown: F) -> Result<ShutdownReason>
	where
		F: Future<Output = ShutdownReason>,
	{
		self.reset();
		let result = self.server_sequence(config, shutdown).await;
		if let Err(e) = &result {
			warn!(error = %e, "server lifecycle aborted");
			self.transition(LifecycleState::Failed);
		}
		result
	}

	/// Runs the embedded client role until `shutdown` resolves.
	#[instrument(skip_all, fields(server = %config.server_address, port = config.server_port))]
	pub async fn run_client<F>(&mut self, config: &ClientConfig, shutdown: F) -> Result<ShutdownReason>
	where
		F: Future<Output = ShutdownReason>,
	{
		self.reset();
		let result = self.client_sequence(config, shutdown).await;
		if let Err(e) = &result {
			warn!(error = %e, "client lifecycle aborted");
			self.transition(LifecycleState::Failed);
		}
		result
	}

	async fn server_sequence<F>(&mut self, config: &ServerConfig, shutdown: F) -> Result<ShutdownReason>
	where
		F: Future<Output = ShutdownReason>,
	{
		let key_dir = match &config.key_dir {
			Some(dir) => dir.clone(),
			None => default_identity_dir()?,
		};
		let (identity, created) = ensure_identity(&key_dir).await?;
		if created {
			warn!(
				public_key = identity.public_key_base64(),
				dir = %key_dir.display(),
				"created a new server identity; back up the private key, it cannot be recovered"
			);
		}
		self.notify(Notice::ServerIdentity {
			identity: &identity,
			created,
		});
		self.transition(LifecycleState::IdentityReady);

		let device = Zeroizing::new(encode_device_config(&server_device_config(
			config, &identity,
		))?);

		let mut engine = self.create_engine(&config.interface_name).await?;
		let mut ledger = RestoreLedger::new();
		match self
			.start_server(&mut engine, &mut ledger, config, &device)
			.await
		{
			Ok(()) => Ok(self.run_until_shutdown(engine, ledger, shutdown).await),
			Err(e) => {
				self.restore(engine, ledger).await;
				Err(e)
			}
		}
	}

	async fn client_sequence<F>(&mut self, config: &ClientConfig, shutdown: F) -> Result<ShutdownReason>
	where
		F: Future<Output = ShutdownReason>,
	{
		config.validate()?;

		let keypair = WgKeyPair::generate().map_err(LifecycleError::KeyGeneration)?;
		info!(public_key = %keypair.public_key(), "generated ephemeral client key");
		self.notify(Notice::ClientKey {
			public_key: keypair.public_key(),
		});
		self.transition(LifecycleState::IdentityReady);

		let server_ip = resolve_server(&config.server_address, config.server_port).await?;
		let device = Zeroizing::new(encode_device_config(&client_device_config(
			config, &keypair, server_ip,
		))?);

		let mut engine = self.create_engine(&config.interface_name).await?;
		let mut ledger = RestoreLedger::new();
		match self
			.start_client(&mut engine, &mut ledger, config, server_ip, &device)
			.await
		{
			Ok(()) => Ok(self.run_until_shutdown(engine, ledger, shutdown).await),
			Err(e) => {
				self.restore(engine, ledger).await;
				Err(e)
			}
		}
	}

	async fn create_engine(&mut self, requested_name: &str) -> Result<L::Engine> {
		let engine = self
			.launcher
			.create_interface(requested_name)
			.await
			.map_err(LifecycleError::InterfaceCreation)?;
		info!(interface = engine.interface_name(), "tunnel interface ready");
		self.transition(LifecycleState::InterfaceCreated);
		Ok(engine)
	}

	async fn start_server(
		&mut self,
		engine: &mut L::Engine,
		ledger: &mut RestoreLedger,
		config: &ServerConfig,
		device: &str,
	) -> Result<()> {
		let interface = engine.interface_name().to_string();
		let server_ip =
			first_usable(config.subnet).map_err(|e| ConfigError::Invalid(e.to_string()))?;
		let local = host_in_subnet(server_ip, config.subnet);
		let mut plan = NetworkPlan::new(config.subnet, local);

		self.controller
			.assign_address(&interface, local)
			.await
			.map_err(LifecycleError::AddressAssignment)?;
		self.transition(LifecycleState::AddressAssigned);

		if let Some(route) = &config.static_route {
			let entry = RouteEntry::via_gateway(route.destination, route.gateway);
			self.install_route(ledger, entry.clone()).await;
			plan.routes.push(entry);
		}
		self.transition(LifecycleState::RoutesInstalled);

		let egress = match &config.egress_interface {
			Some(iface) => iface.clone(),
			None => self
				.controller
				.primary_interface()
				.await
				.map_err(LifecycleError::ForwardingOrNat)?,
		};
		let rule = NatRule::masquerade(config.subnet, egress);
		plan.forwarding_original = Some(self.enable_forwarding_and_nat(ledger, &rule).await?);
		plan.nat = Some(rule);
		self.plan = Some(plan);
		self.transition(LifecycleState::ForwardingAndNatEnabled);

		self.configure_and_up(engine, device).await
	}

	async fn start_client(
		&mut self,
		engine: &mut L::Engine,
		ledger: &mut RestoreLedger,
		config: &ClientConfig,
		server_ip: IpAddr,
		device: &str,
	) -> Result<()> {
		let interface = engine.interface_name().to_string();
		let local = host_in_subnet(config.client_ip, config.subnet);
		let mut plan = NetworkPlan::new(config.subnet, local);

		self.controller
			.assign_address(&interface, local)
			.await
			.map_err(LifecycleError::AddressAssignment)?;
		self.transition(LifecycleState::AddressAssigned);

		// Taken before any route changes so it reflects the real uplink.
		let snapshot = match self.controller.default_gateway().await {
			Ok(snapshot) => snapshot,
			Err(e) => {
				let e = LifecycleError::RouteConfiguration(e);
				warn!(error = %e, "could not read default gateway");
				None
			}
		};
		if snapshot.is_none() {
			warn!("no default gateway; skipping routes that depend on it");
		}

		let server_v4 = match server_ip {
			IpAddr::V4(v4) => Some(v4),
			IpAddr::V6(_) => None,
		};

		if let (Some(gw), Some(server)) = (&snapshot, server_v4) {
			let pin = uplink_route(Ipv4Net::from(server), gw);
			self.install_route(ledger, pin.clone()).await;
			plan.routes.push(pin);
		}

		for half in SPLIT_DEFAULT_ROUTES
			.iter()
			.filter_map(|s| s.parse::<Ipv4Net>().ok())
		{
			let entry = RouteEntry::via_interface(half, interface.clone());
			self.install_route(ledger, entry.clone()).await;
			plan.routes.push(entry);
		}

		if let Some(server) = server_v4 {
			match self.controller.replace_default_gateway(server, None).await {
				Ok(()) => match &snapshot {
					Some(previous) => ledger.record(RestoreAction::RestoreDefaultGateway {
						previous: previous.clone(),
						replaced: server,
					}),
					None => debug!("no prior default gateway to restore"),
				},
				Err(e) => {
					let e = LifecycleError::RouteConfiguration(e);
					warn!(error = %e, "default gateway not overridden; continuing");
				}
			}
		}

		if let Some(gw) = &snapshot {
			let entry = uplink_route(config.subnet, gw);
			self.install_route(ledger, entry.clone()).await;
			plan.routes.push(entry);
		}

		self.plan = Some(plan);
		self.transition(LifecycleState::RoutesInstalled);

		self.configure_and_up(engine, device).await
	}

	/// Best effort: a failed route is logged and skipped.
	async fn install_route(&self, ledger: &mut RestoreLedger, route: RouteEntry) -> bool {
		match self.controller.install_route(&route).await {
			Ok(()) => {
				ledger.record(RestoreAction::RemoveRoute(route));
				true
			}
			Err(e) => {
				let e = LifecycleError::RouteConfiguration(e);
				warn!(%route, error = %e, "route not installed; continuing");
				false
			}
		}
	}

	/// Returns the forwarding flag as it was before. Each change is recorded
	/// as soon as it succeeds so an abort can undo it.
	async fn enable_forwarding_and_nat(
		&self,
		ledger: &mut RestoreLedger,
		rule: &NatRule,
	) -> Result<bool> {
		let previous = self
			.controller
			.forwarding_state()
			.await
			.map_err(LifecycleError::ForwardingOrNat)?;
		self.controller
			.set_forwarding(true)
			.await
			.map_err(LifecycleError::ForwardingOrNat)?;
		ledger.record(RestoreAction::RestoreForwarding { previous });

		match self
			.controller
			.install_nat_rule(rule)
			.await
			.map_err(LifecycleError::ForwardingOrNat)?
		{
			NatInstall::Added { firewall_backup } => {
				if let Some(backup) = firewall_backup {
					ledger.record(RestoreAction::RestoreFirewallConfig(backup));
				}
				ledger.record(RestoreAction::RemoveNatRule(rule.clone()));
			}
			NatInstall::AlreadyPresent => {
				info!(%rule, "nat rule already present; it will be left in place");
			}
		}
		Ok(previous)
	}

	async fn configure_and_up(&mut self, engine: &mut L::Engine, device: &str) -> Result<()> {
		engine
			.configure(device)
			.await
			.map_err(LifecycleError::EngineConfiguration)?;
		self.transition(LifecycleState::EngineConfigured);

		engine
			.up()
			.await
			.map_err(LifecycleError::EngineConfiguration)?;
		self.transition(LifecycleState::Up);
		Ok(())
	}

	async fn run_until_shutdown<F>(
		&mut self,
		engine: L::Engine,
		ledger: RestoreLedger,
		shutdown: F,
	) -> ShutdownReason
	where
		F: Future<Output = ShutdownReason>,
	{
		self.transition(LifecycleState::Running);
		info!(interface = engine.interface_name(), "tunnel running");

		let reason = shutdown.await;
		info!(%reason, "shutdown requested");
		self.transition(LifecycleState::SignalReceived);

		self.restore(engine, ledger).await;
		self.transition(LifecycleState::Terminated);
		reason
	}

	/// Unwinds the ledger and closes the engine. Failures are logged only.
	async fn restore(&mut self, mut engine: L::Engine, mut ledger: RestoreLedger) {
		self.transition(LifecycleState::Restoring);
		let failures = ledger.unwind(&*self.controller).await;
		if !failures.is_empty() {
			warn!(
				count = failures.len(),
				"some host changes could not be restored"
			);
		}
		if let Err(e) = engine.close().await {
			warn!(error = %e, "failed to close tunnel engine");
		}
		self.transition(LifecycleState::EngineClosed);
	}
}

/// A route through the gateway that was the default before startup.
fn uplink_route(destination: Ipv4Net, uplink: &GatewaySnapshot) -> RouteEntry {
	let route = RouteEntry::via_gateway(destination, uplink.gateway);
	match &uplink.interface {
		Some(iface) => route.with_interface(iface.clone()),
		None => route,
	}
}

fn server_device_config(config: &ServerConfig, identity: &ServerIdentity) -> DeviceConfig {
	let mut device = DeviceConfig::new()
		.with_private_key(identity.private_key_base64())
		.with_listen_port(config.listen_port);
	if let Some(peer) = &config.peer {
		let allowed = if peer.allowed_ips.is_empty() {
			vec![IpNet::V4(config.subnet)]
		} else {
			peer.allowed_ips.clone()
		};
		device = device.with_peer(PeerDescriptor::new(peer.public_key.trim()).with_allowed_ips(allowed));
	}
	device
}

fn client_device_config(config: &ClientConfig, keypair: &WgKeyPair, server_ip: IpAddr) -> DeviceConfig {
	let allowed = if config.allowed_ips.is_empty() {
		vec![IpNet::V4(Ipv4Net::default())]
	} else {
		config.allowed_ips.clone()
	};
	DeviceConfig::new()
		.with_private_key(&keypair.private_key().to_base64())
		.with_peer(
			PeerDescriptor::new(config.server_public_key.trim())
				.with_endpoint(Endpoint::new(server_ip.to_string(), config.server_port))
				.with_allowed_ips(allowed)
				.with_persistent_keepalive(config.persistent_keepalive),
		)
}

/// The engine wants a literal address in `endpoint=`; hostnames are resolved
/// here once, preferring IPv4.
async fn resolve_server(host: &str, port: u16) -> Result<IpAddr> {
	if let Ok(ip) = host.parse::<IpAddr>() {
		return Ok(ip);
	}
	let addrs: Vec<_> = tokio::net::lookup_host((host, port))
		.await
		.map_err(|_| LifecycleError::ServerAddress(host.to_string()))?
		.collect();
	addrs
		.iter()
		.find(|a| a.is_ipv4())
		.or_else(|| addrs.first())
		.map(|a| a.ip())
		.ok_or_else(|| LifecycleError::ServerAddress(host.to_string()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::{ServerPeerConfig, StaticRoute};
	use crate::testing::{shared_host, FakeController, FakeLauncher, SharedHost};
	use simplevpn_netctl::FirewallBackup;
	use std::net::Ipv4Addr;
	use std::sync::{Arc, Mutex};
	use tempfile::TempDir;

	const PEER_HEX: &str = "8520f0098930a754748b7ddcb43ef75a0dbf3a0d26381af4eba4a98eaa9b4e6a";

	fn peer_b64() -> String {
		WgPublicKey::from_hex(PEER_HEX).unwrap().to_base64()
	}

	fn lifecycle(host: &SharedHost) -> TunnelLifecycle<FakeLauncher, FakeController> {
		TunnelLifecycle::new(
			FakeLauncher::new(host.clone()),
			Box::new(FakeController::new(host.clone())),
		)
	}

	fn server_config(dir: &TempDir) -> ServerConfig {
		ServerConfig {
			key_dir: Some(dir.path().to_path_buf()),
			interface_name: "svpn0".to_string(),
			egress_interface: Some("eth0".to_string()),
			..ServerConfig::default()
		}
	}

	fn client_config() -> ClientConfig {
		ClientConfig {
			server_address: "203.0.113.7".to_string(),
			server_public_key: peer_b64(),
			interface_name: "utun".to_string(),
			..ClientConfig::default()
		}
	}

	fn calls(host: &SharedHost) -> Vec<String> {
		host.lock().unwrap().calls.clone()
	}

	async fn terminate() -> ShutdownReason {
		ShutdownReason::Terminate
	}

	#[tokio::test]
	async fn server_runs_steps_in_order_and_restores_in_reverse() {
		let dir = TempDir::new().unwrap();
		let host = shared_host();
		let mut lc = lifecycle(&host);

		let reason = lc.run_server(&server_config(&dir), terminate()).await.unwrap();

		assert_eq!(reason, ShutdownReason::Terminate);
		assert_eq!(
			calls(&host),
			vec![
				"create_interface svpn0",
				"assign_address svpn0 10.0.0.1/24",
				"forwarding_state",
				"set_forwarding true",
				"install_nat_rule masquerade 10.0.0.0/24 out eth0",
				"configure",
				"up",
				"remove_nat_rule masquerade 10.0.0.0/24 out eth0",
				"set_forwarding false",
				"close",
			]
		);

		let state = host.lock().unwrap();
		assert!(!state.forwarding);
		assert!(state.nat_rules.is_empty());
		assert!(!state.engine_open);
	}

	#[tokio::test]
	async fn server_walks_every_state() {
		let dir = TempDir::new().unwrap();
		let host = shared_host();
		let mut lc = lifecycle(&host);

		lc.run_server(&server_config(&dir), terminate()).await.unwrap();

		use LifecycleState::*;
		assert_eq!(
			lc.history(),
			&[
				Start,
				IdentityReady,
				InterfaceCreated,
				AddressAssigned,
				RoutesInstalled,
				ForwardingAndNatEnabled,
				EngineConfigured,
				Up,
				Running,
				SignalReceived,
				Restoring,
				EngineClosed,
				Terminated,
			]
		);
		let plan = lc.plan().unwrap();
		assert_eq!(plan.local_address.to_string(), "10.0.0.1/24");
		assert_eq!(plan.forwarding_original, Some(false));
	}

	#[tokio::test]
	async fn server_engine_config_carries_hex_keys() {
		let dir = TempDir::new().unwrap();
		let host = shared_host();
		let mut config = server_config(&dir);
		config.peer = Some(ServerPeerConfig {
			public_key: peer_b64(),
			allowed_ips: Vec::new(),
		});

		lifecycle(&host).run_server(&config, terminate()).await.unwrap();

		let text = host.lock().unwrap().engine_config.clone().unwrap();
		let lines: Vec<&str> = text.lines().collect();
		assert!(lines[0].starts_with("private_key="));
		assert_eq!(lines[0].len(), "private_key=".len() + 64);
		assert_eq!(lines[1], "listen_port=51820");
		assert_eq!(lines[2], format!("public_key={PEER_HEX}"));
		assert_eq!(lines[3], "allowed_ip=10.0.0.0/24");
	}

	#[tokio::test]
	async fn failed_static_route_is_only_a_warning() {
		let dir = TempDir::new().unwrap();
		let host = shared_host();
		host.lock().unwrap().failing.push("install_route");
		let mut config = server_config(&dir);
		config.static_route = Some(StaticRoute {
			destination: "192.168.50.0/24".parse().unwrap(),
			gateway: Ipv4Addr::new(10, 0, 0, 254),
		});

		let result = lifecycle(&host).run_server(&config, terminate()).await;

		assert!(result.is_ok());
		let state = host.lock().unwrap();
		assert!(state
			.calls
			.contains(&"install_route 192.168.50.0/24 via 10.0.0.254".to_string()));
		assert!(!state.forwarding);
		assert!(state.nat_rules.is_empty());
	}

	#[tokio::test]
	async fn nat_failure_aborts_after_restoring_forwarding() {
		let dir = TempDir::new().unwrap();
		let host = shared_host();
		host.lock().unwrap().failing.push("install_nat_rule");
		let mut lc = lifecycle(&host);

		let err = lc.run_server(&server_config(&dir), terminate()).await.unwrap_err();

		assert!(matches!(err, LifecycleError::ForwardingOrNat(_)));
		assert_eq!(lc.state(), LifecycleState::Failed);
		let calls = calls(&host);
		assert!(!calls.contains(&"configure".to_string()));
		assert_eq!(
			&calls[calls.len() - 2..],
			&["set_forwarding false".to_string(), "close".to_string()]
		);
		assert!(!host.lock().unwrap().forwarding);
	}

	#[tokio::test]
	async fn address_failure_is_fatal() {
		let dir = TempDir::new().unwrap();
		let host = shared_host();
		host.lock().unwrap().failing.push("assign_address");

		let err = lifecycle(&host)
			.run_server(&server_config(&dir), terminate())
			.await
			.unwrap_err();

		assert!(matches!(err, LifecycleError::AddressAssignment(_)));
		assert_eq!(
			calls(&host),
			vec!["create_interface svpn0", "assign_address svpn0 10.0.0.1/24", "close"]
		);
	}

	#[tokio::test]
	async fn interface_failure_touches_nothing() {
		let dir = TempDir::new().unwrap();
		let host = shared_host();
		host.lock().unwrap().failing.push("create_interface");

		let err = lifecycle(&host)
			.run_server(&server_config(&dir), terminate())
			.await
			.unwrap_err();

		assert!(matches!(err, LifecycleError::InterfaceCreation(_)));
		assert_eq!(calls(&host), vec!["create_interface svpn0"]);
	}

	#[tokio::test]
	async fn invalid_peer_key_fails_before_any_host_change() {
		let dir = TempDir::new().unwrap();
		let host = shared_host();
		let mut config = server_config(&dir);
		config.peer = Some(ServerPeerConfig {
			public_key: "not-a-key".to_string(),
			allowed_ips: Vec::new(),
		});

		let err = lifecycle(&host).run_server(&config, terminate()).await.unwrap_err();

		assert!(matches!(err, LifecycleError::InvalidPeerKey(_)));
		assert!(calls(&host).is_empty());
	}

	#[tokio::test]
	async fn engine_rejection_unwinds_nat_and_forwarding() {
		let dir = TempDir::new().unwrap();
		let host = shared_host();
		host.lock().unwrap().configure_errno = Some(22);

		let err = lifecycle(&host)
			.run_server(&server_config(&dir), terminate())
			.await
			.unwrap_err();

		assert!(matches!(err, LifecycleError::EngineConfiguration(_)));
		let state = host.lock().unwrap();
		assert!(state.nat_rules.is_empty());
		assert!(!state.forwarding);
		assert!(!state.engine_open);
	}

	#[tokio::test]
	async fn file_backed_nat_unwinds_rule_then_file_then_forwarding() {
		let dir = TempDir::new().unwrap();
		let host = shared_host();
		host.lock().unwrap().firewall_backup = Some(FirewallBackup {
			original: "/etc/pf.conf".into(),
			backup: "/etc/pf.conf.bak".into(),
		});

		lifecycle(&host)
			.run_server(&server_config(&dir), terminate())
			.await
			.unwrap();

		let calls = calls(&host);
		assert_eq!(
			calls[calls.len() - 4..].to_vec(),
			vec![
				"remove_nat_rule masquerade 10.0.0.0/24 out eth0",
				"restore_firewall_config /etc/pf.conf",
				"set_forwarding false",
				"close",
			]
		);
	}

	#[tokio::test]
	async fn restore_undoes_nat_and_forwarding_whatever_routes_did() {
		for (routes_fail, forwarding_before) in
			[(false, false), (false, true), (true, false), (true, true)]
		{
			let host = shared_host();
			{
				let mut state = host.lock().unwrap();
				state.forwarding = forwarding_before;
				if routes_fail {
					state.failing.push("install_route");
				}
			}
			let mut lc = lifecycle(&host);
			let engine = lc.launcher.create_interface("svpn0").await.unwrap();
			let mut ledger = RestoreLedger::new();
			let rule = NatRule::masquerade("10.0.0.0/24".parse().unwrap(), "eth0");

			let previous = lc.enable_forwarding_and_nat(&mut ledger, &rule).await.unwrap();
			assert_eq!(previous, forwarding_before);
			for destination in ["192.168.50.0/24", "172.16.0.0/12"] {
				let route = RouteEntry::via_gateway(
					destination.parse().unwrap(),
					Ipv4Addr::new(10, 0, 0, 254),
				);
				assert_eq!(lc.install_route(&mut ledger, route).await, !routes_fail);
			}
			lc.restore(engine, ledger).await;

			let state = host.lock().unwrap();
			assert_eq!(state.forwarding, forwarding_before);
			assert!(state.nat_rules.is_empty());
			assert!(state.routes.is_empty());
			assert!(!state.engine_open);
		}
	}

	#[tokio::test]
	async fn preexisting_nat_rule_is_left_in_place() {
		let dir = TempDir::new().unwrap();
		let host = shared_host();
		let rule = NatRule::masquerade("10.0.0.0/24".parse().unwrap(), "eth0");
		host.lock().unwrap().nat_rules.push(rule.clone());

		lifecycle(&host)
			.run_server(&server_config(&dir), terminate())
			.await
			.unwrap();

		let state = host.lock().unwrap();
		assert_eq!(state.nat_rules, vec![rule]);
		assert!(!state.calls.iter().any(|c| c.starts_with("remove_nat_rule")));
	}

	#[tokio::test]
	async fn egress_interface_is_detected_when_unset() {
		let dir = TempDir::new().unwrap();
		let host = shared_host();
		host.lock().unwrap().default_gateway = Some(GatewaySnapshot::new(
			Ipv4Addr::new(10, 1, 0, 1),
			Some("ens5".to_string()),
		));
		let mut config = server_config(&dir);
		config.egress_interface = None;

		lifecycle(&host).run_server(&config, terminate()).await.unwrap();

		assert!(calls(&host).contains(&"install_nat_rule masquerade 10.0.0.0/24 out ens5".to_string()));
	}

	#[tokio::test]
	async fn identity_notice_reports_creation_once() {
		let dir = TempDir::new().unwrap();
		let host = shared_host();
		let seen = Arc::new(Mutex::new(Vec::new()));
		let sink = seen.clone();
		let mut lc = lifecycle(&host).on_notice(move |notice| {
			if let Notice::ServerIdentity { identity, created } = notice {
				sink.lock()
					.unwrap()
					.push((identity.public_key_base64().to_string(), created));
			}
		});

		lc.run_server(&server_config(&dir), terminate()).await.unwrap();
		lc.run_server(&server_config(&dir), terminate()).await.unwrap();

		let seen = seen.lock().unwrap();
		assert_eq!(seen.len(), 2);
		assert!(seen[0].1);
		assert!(!seen[1].1);
		assert_eq!(seen[0].0, seen[1].0);
	}

	#[tokio::test]
	async fn client_snapshots_gateway_then_routes_and_restores() {
		let host = shared_host();
		let uplink = GatewaySnapshot::new(Ipv4Addr::new(192, 168, 1, 1), Some("en0".to_string()));
		host.lock().unwrap().default_gateway = Some(uplink.clone());
		let mut lc = TunnelLifecycle::new(
			FakeLauncher::new(host.clone()).assigning("utun4"),
			Box::new(FakeController::new(host.clone())),
		);

		lc.run_client(&client_config(), terminate()).await.unwrap();

		assert_eq!(
			calls(&host),
			vec![
				"create_interface utun",
				"assign_address utun4 10.0.0.2/24",
				"default_gateway",
				"install_route 203.0.113.7/32 via 192.168.1.1 dev en0",
				"install_route 0.0.0.0/1 dev utun4",
				"install_route 128.0.0.0/1 dev utun4",
				"replace_default_gateway 203.0.113.7",
				"install_route 10.0.0.0/24 via 192.168.1.1 dev en0",
				"configure",
				"up",
				"remove_route 10.0.0.0/24 via 192.168.1.1 dev en0",
				"replace_default_gateway 192.168.1.1",
				"remove_route 128.0.0.0/1 dev utun4",
				"remove_route 0.0.0.0/1 dev utun4",
				"remove_route 203.0.113.7/32 via 192.168.1.1 dev en0",
				"close",
			]
		);
		let state = host.lock().unwrap();
		assert!(state.routes.is_empty());
		assert_eq!(state.default_gateway, Some(uplink));
	}

	#[tokio::test]
	async fn client_engine_config_targets_server() {
		let host = shared_host();
		lifecycle(&host)
			.run_client(&client_config(), terminate())
			.await
			.unwrap();

		let text = host.lock().unwrap().engine_config.clone().unwrap();
		assert!(text.starts_with("private_key="));
		assert!(!text.contains("listen_port="));
		assert!(text.contains(&format!("public_key={PEER_HEX}\n")));
		assert!(text.contains("endpoint=203.0.113.7:51820\n"));
		assert!(text.contains("persistent_keepalive_interval=25\n"));
		assert!(text.ends_with("allowed_ip=0.0.0.0/0\n"));
	}

	#[tokio::test]
	async fn client_route_failures_degrade_without_aborting() {
		let host = shared_host();
		{
			let mut state = host.lock().unwrap();
			state.default_gateway = Some(GatewaySnapshot::new(Ipv4Addr::new(192, 168, 1, 1), None));
			state.failing.push("install_route");
			state.failing.push("replace_default_gateway");
		}
		let mut lc = lifecycle(&host);

		let result = lc.run_client(&client_config(), terminate()).await;

		assert!(result.is_ok());
		assert_eq!(lc.state(), LifecycleState::Terminated);
		let calls = calls(&host);
		assert!(!calls.iter().any(|c| c.starts_with("remove_route")));
		assert_eq!(calls.last().map(String::as_str), Some("close"));
	}

	#[tokio::test]
	async fn client_without_gateway_still_captures_traffic() {
		let host = shared_host();
		lifecycle(&host)
			.run_client(&client_config(), terminate())
			.await
			.unwrap();

		let calls = calls(&host);
		assert!(calls.contains(&"install_route 0.0.0.0/1 dev utun".to_string()));
		assert!(!calls.iter().any(|c| c.contains("via")));
	}

	#[tokio::test]
	async fn client_rejects_bad_server_key() {
		let host = shared_host();
		let mut config = client_config();
		config.server_public_key = "short".to_string();

		let err = lifecycle(&host).run_client(&config, terminate()).await.unwrap_err();

		assert!(matches!(err, LifecycleError::InvalidPeerKey(_)));
		assert!(calls(&host).is_empty());
	}

	#[tokio::test]
	async fn client_requires_server_key() {
		let host = shared_host();
		let mut config = client_config();
		config.server_public_key = String::new();

		let err = lifecycle(&host).run_client(&config, terminate()).await.unwrap_err();
		assert!(matches!(err, LifecycleError::Config(_)));
	}

	#[tokio::test]
	async fn shutdown_reason_is_returned() {
		let host = shared_host();
		let reason = lifecycle(&host)
			.run_client(&client_config(), async { ShutdownReason::Interrupt })
			.await
			.unwrap();
		assert_eq!(reason, ShutdownReason::Interrupt);
	}
}
