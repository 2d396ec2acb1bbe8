// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use ipnet::Ipv4Net;
use std::net::Ipv4Addr;
use thiserror::Error;

pub const DEFAULT_SUBNET: &str = "10.0.0.0/24";

/// The two half-space routes that capture all IPv4 traffic without
/// replacing the literal default route.
pub const SPLIT_DEFAULT_ROUTES: [&str; 2] = ["0.0.0.0/1", "128.0.0.0/1"];

#[derive(Error, Debug)]
pub enum SubnetError {
	#[error("invalid subnet: {0}")]
	InvalidSubnet(String),

	#[error("subnet {0} has no usable host address")]
	NoUsableAddress(Ipv4Net),
}

pub type Result<T> = std::result::Result<T, SubnetError>;

pub fn parse_subnet(s: &str) -> Result<Ipv4Net> {
	s.trim()
		.parse::<Ipv4Net>()
		.map(|net| net.trunc())
		.map_err(|_| SubnetError::InvalidSubnet(s.to_string()))
}

/// First host address of the subnet, the server's tunnel address.
/// Point-to-point (/31) and host (/32) prefixes have no reserved network
/// address, so the network address itself is returned.
pub fn first_usable(subnet: Ipv4Net) -> Result<Ipv4Addr> {
	let network = u32::from(subnet.network());
	match subnet.prefix_len() {
		31 | 32 => Ok(subnet.network()),
		_ => {
			let candidate = network
				.checked_add(1)
				.ok_or(SubnetError::NoUsableAddress(subnet))?;
			Ok(Ipv4Addr::from(candidate))
		}
	}
}

/// An interface address carrying the subnet's prefix length, e.g. `10.0.0.2/24`.
pub fn host_in_subnet(addr: Ipv4Addr, subnet: Ipv4Net) -> Ipv4Net {
	// prefix_len of an existing Ipv4Net is always <= 32
	Ipv4Net::new(addr, subnet.prefix_len()).unwrap_or(subnet)
}
