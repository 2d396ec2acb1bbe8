// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::controller::NetworkController;
use crate::error::NetError;
use crate::plan::{FirewallBackup, GatewaySnapshot, NatRule, RouteEntry};
use std::fmt;
use std::net::Ipv4Addr;
use tracing::{debug, info, warn};

/// The inverse of one applied host mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreAction {
	RestoreForwarding { previous: bool },
	RemoveNatRule(NatRule),
	RestoreFirewallConfig(FirewallBackup),
	RemoveRoute(RouteEntry),
	RestoreDefaultGateway {
		previous: GatewaySnapshot,
		replaced: Ipv4Addr,
	},
}

impl fmt::Display for RestoreAction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::RestoreForwarding { previous } => {
				write!(f, "restore ip forwarding to {}", u8::from(*previous))
			}
			Self::RemoveNatRule(rule) => write!(f, "remove nat rule ({rule})"),
			Self::RestoreFirewallConfig(backup) => write!(
				f,
				"restore {} from {}",
				backup.original.display(),
				backup.backup.display()
			),
			Self::RemoveRoute(route) => write!(f, "remove route {route}"),
			Self::RestoreDefaultGateway { previous, replaced } => {
				write!(f, "restore default gateway {previous} (replacing {replaced})")
			}
		}
	}
}

impl RestoreAction {
	async fn apply<C: NetworkController + ?Sized>(&self, controller: &C) -> Result<(), NetError> {
		match self {
			Self::RestoreForwarding { previous } => controller.set_forwarding(*previous).await,
			Self::RemoveNatRule(rule) => controller.remove_nat_rule(rule).await,
			Self::RestoreFirewallConfig(backup) => controller.restore_firewall_config(backup).await,
			Self::RemoveRoute(route) => controller.remove_route(route).await,
			Self::RestoreDefaultGateway { previous, replaced } => {
				controller.restore_default_gateway(previous, *replaced).await
			}
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
	pub description: String,
	pub action: RestoreAction,
}

#[derive(Debug)]
pub struct RestoreFailure {
	pub description: String,
	pub error: NetError,
}

impl fmt::Display for RestoreFailure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}: {}", self.description, self.error)
	}
}

/// Ordered record of applied host mutations, undone last-in first-out.
#[derive(Debug, Default)]
pub struct RestoreLedger {
	entries: Vec<LedgerEntry>,
}

impl RestoreLedger {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn record(&mut self, action: RestoreAction) {
		let description = action.to_string();
		debug!(%description, "recorded restore action");
		self.entries.push(LedgerEntry {
			description,
			action,
		});
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn entries(&self) -> &[LedgerEntry] {
		&self.entries
	}

	/// Runs every inverse in reverse order and empties the ledger. A failing
	/// step is logged and collected; the walk always continues.
	pub async fn unwind<C: NetworkController + ?Sized>(
		&mut self,
		controller: &C,
	) -> Vec<RestoreFailure> {
		let mut failures = Vec::new();
		while let Some(entry) = self.entries.pop() {
			match entry.action.apply(controller).await {
				Ok(()) => info!(action = %entry.description, "restored"),
				Err(error) => {
					warn!(action = %entry.description, error = %error, "restore step failed");
					failures.push(RestoreFailure {
						description: entry.description,
						error,
					});
				}
			}
		}
		failures
	}
}
