// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_KEEPALIVE_SECS: u16 = 25;

/// Remote address of a peer. The host is not resolved here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
	pub host: String,
	pub port: u16,
}

impl Endpoint {
	pub fn new(host: impl Into<String>, port: u16) -> Self {
		Self {
			host: host.into(),
			port,
		}
	}
}

impl fmt::Display for Endpoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.host.contains(':') {
			write!(f, "[{}]:{}", self.host, self.port)
		} else {
			write!(f, "{}:{}", self.host, self.port)
		}
	}
}

/// The single remote party a run tunnels to. The public key stays in its
/// base64 form until the encoder validates and converts it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerDescriptor {
	pub public_key: String,
	pub endpoint: Option<Endpoint>,
	pub allowed_ips: Vec<IpNet>,
	pub persistent_keepalive: Option<u16>,
}

impl PeerDescriptor {
	pub fn new(public_key: impl Into<String>) -> Self {
		Self {
			public_key: public_key.into(),
			endpoint: None,
			allowed_ips: Vec::new(),
			persistent_keepalive: None,
		}
	}

	pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
		self.endpoint = Some(endpoint);
		self
	}

	pub fn with_allowed_ip(mut self, ip: IpNet) -> Self {
		self.allowed_ips.push(ip);
		self
	}

	pub fn with_allowed_ips(mut self, ips: Vec<IpNet>) -> Self {
		self.allowed_ips = ips;
		self
	}

	pub fn with_persistent_keepalive(mut self, seconds: u16) -> Self {
		self.persistent_keepalive = Some(seconds);
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_endpoint_display() {
		assert_eq!(
			Endpoint::new("203.0.113.7", 51820).to_string(),
			"203.0.113.7:51820"
		);
		assert_eq!(
			Endpoint::new("vpn.example.com", 443).to_string(),
			"vpn.example.com:443"
		);
	}

	#[test]
	fn test_endpoint_ipv6_brackets() {
		assert_eq!(
			Endpoint::new("2001:db8::1", 51820).to_string(),
			"[2001:db8::1]:51820"
		);
	}

	#[test]
	fn test_peer_builder() {
		let peer = PeerDescriptor::new("key")
			.with_endpoint(Endpoint::new("10.1.1.1", 51820))
			.with_allowed_ip("0.0.0.0/0".parse().unwrap())
			.with_allowed_ip("10.0.0.0/24".parse().unwrap())
			.with_persistent_keepalive(DEFAULT_KEEPALIVE_SECS);

		assert_eq!(peer.allowed_ips.len(), 2);
		assert_eq!(peer.persistent_keepalive, Some(25));
		assert!(peer.endpoint.is_some());
	}
}
