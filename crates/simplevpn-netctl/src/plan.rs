// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use ipnet::Ipv4Net;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
	pub destination: Ipv4Net,
	pub gateway: Option<Ipv4Addr>,
	pub interface: Option<String>,
}

impl RouteEntry {
	pub fn via_gateway(destination: Ipv4Net, gateway: Ipv4Addr) -> Self {
		Self {
			destination,
			gateway: Some(gateway),
			interface: None,
		}
	}

	pub fn via_interface(destination: Ipv4Net, interface: impl Into<String>) -> Self {
		Self {
			destination,
			gateway: None,
			interface: Some(interface.into()),
		}
	}

	pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
		self.interface = Some(interface.into());
		self
	}
}

impl fmt::Display for RouteEntry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.destination)?;
		if let Some(gw) = self.gateway {
			write!(f, " via {gw}")?;
		}
		if let Some(iface) = &self.interface {
			write!(f, " dev {iface}")?;
		}
		Ok(())
	}
}

/// Source-NAT (masquerade) of the tunnel subnet out of the egress interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NatRule {
	pub source: Ipv4Net,
	pub egress_interface: String,
}

impl NatRule {
	pub fn masquerade(source: Ipv4Net, egress_interface: impl Into<String>) -> Self {
		Self {
			source,
			egress_interface: egress_interface.into(),
		}
	}

	/// The rule as a pf.conf line.
	pub fn pf_line(&self) -> String {
		format!(
			"nat on {iface} from {src} to any -> ({iface})",
			iface = self.egress_interface,
			src = self.source
		)
	}
}

impl fmt::Display for NatRule {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"masquerade {} out {}",
			self.source, self.egress_interface
		)
	}
}

/// A copy of a firewall configuration file taken before it was edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallBackup {
	pub original: PathBuf,
	pub backup: PathBuf,
}

/// What `install_nat_rule` actually did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NatInstall {
	Added {
		firewall_backup: Option<FirewallBackup>,
	},
	AlreadyPresent,
}

/// The host's default gateway as seen before any tunnel routes went in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySnapshot {
	pub gateway: Ipv4Addr,
	pub interface: Option<String>,
	/// Route metric when the OS reports one; absent means 0.
	pub metric: Option<u32>,
}

impl GatewaySnapshot {
	pub fn new(gateway: Ipv4Addr, interface: Option<String>) -> Self {
		Self {
			gateway,
			interface,
			metric: None,
		}
	}

	pub fn with_metric(mut self, metric: u32) -> Self {
		self.metric = Some(metric);
		self
	}
}

impl fmt::Display for GatewaySnapshot {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.gateway)?;
		if let Some(iface) = &self.interface {
			write!(f, " dev {iface}")?;
		}
		if let Some(metric) = self.metric {
			write!(f, " metric {metric}")?;
		}
		Ok(())
	}
}

/// The host networking a lifecycle intends to apply. Filled in as startup
/// progresses; the ledger holds what was actually applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkPlan {
	pub subnet: Ipv4Net,
	pub local_address: Ipv4Net,
	pub routes: Vec<RouteEntry>,
	pub nat: Option<NatRule>,
	pub forwarding_original: Option<bool>,
}

impl NetworkPlan {
	pub fn new(subnet: Ipv4Net, local_address: Ipv4Net) -> Self {
		Self {
			subnet,
			local_address,
			routes: Vec::new(),
			nat: None,
			forwarding_original: None,
		}
	}
}
