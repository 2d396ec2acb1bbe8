// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::keys::WgKeyPair;
use crate::peer::{Endpoint, DEFAULT_KEEPALIVE_SECS};
use ipnet::IpNet;
use std::fmt::Write;
use std::net::{IpAddr, Ipv4Addr};
use zeroize::Zeroizing;

pub const DEFAULT_DNS: IpAddr = IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1));

/// A wg-quick style configuration handed to an external bring-up tool.
#[derive(Clone)]
pub struct ClientConfigDocument {
	pub private_key: Zeroizing<String>,
	pub address: Ipv4Addr,
	pub dns: IpAddr,
	pub server_public_key: String,
	pub endpoint: Endpoint,
	pub allowed_ips: Vec<IpNet>,
	pub persistent_keepalive: u16,
}

impl ClientConfigDocument {
	pub fn new(
		keypair: &WgKeyPair,
		address: Ipv4Addr,
		server_public_key: impl Into<String>,
		endpoint: Endpoint,
	) -> Self {
		Self {
			private_key: keypair.private_key().to_base64(),
			address,
			dns: DEFAULT_DNS,
			server_public_key: server_public_key.into(),
			endpoint,
			allowed_ips: vec![IpNet::V4(ipnet::Ipv4Net::default())],
			persistent_keepalive: DEFAULT_KEEPALIVE_SECS,
		}
	}

	pub fn with_allowed_ips(mut self, ips: Vec<IpNet>) -> Self {
		if !ips.is_empty() {
			self.allowed_ips = ips;
		}
		self
	}

	pub fn with_dns(mut self, dns: IpAddr) -> Self {
		self.dns = dns;
		self
	}

	pub fn with_persistent_keepalive(mut self, seconds: u16) -> Self {
		self.persistent_keepalive = seconds;
		self
	}

	/// Renders the document. The result holds the private key.
	pub fn render(&self) -> Zeroizing<String> {
		let allowed = self
			.allowed_ips
			.iter()
			.map(ToString::to_string)
			.collect::<Vec<_>>()
			.join(", ");

		let mut out = Zeroizing::new(String::new());
		let _ = writeln!(out, "[Interface]");
		let _ = writeln!(out, "PrivateKey = {}", self.private_key.as_str());
		let _ = writeln!(out, "Address = {}/32", self.address);
		let _ = writeln!(out, "DNS = {}", self.dns);
		let _ = writeln!(out);
		let _ = writeln!(out, "[Peer]");
		let _ = writeln!(out, "PublicKey = {}", self.server_public_key);
		let _ = writeln!(out, "Endpoint = {}", self.endpoint);
		let _ = writeln!(out, "AllowedIPs = {allowed}");
		let _ = writeln!(out, "PersistentKeepalive = {}", self.persistent_keepalive);
		out
	}
}
