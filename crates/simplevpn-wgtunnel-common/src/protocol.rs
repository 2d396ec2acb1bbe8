// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Encoder for the line-oriented `key=value` device configuration consumed by
//! the tunnel engine. Keys are stored and displayed as base64 but cross this
//! boundary as lowercase hex.

use crate::keys::{base64_key_to_hex, KeyError};
use crate::peer::PeerDescriptor;
use std::fmt::{self, Write};
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Error, Debug)]
pub enum ProtocolError {
	#[error("invalid peer public key {key:?}: {source}")]
	InvalidPeerKey {
		key: String,
		#[source]
		source: KeyError,
	},

	#[error("invalid private key: {0}")]
	InvalidPrivateKey(#[source] KeyError),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Clone, Default)]
pub struct DeviceConfig {
	pub listen_port: Option<u16>,
	pub private_key: Option<Zeroizing<String>>,
	pub peers: Vec<PeerDescriptor>,
}

impl DeviceConfig {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_listen_port(mut self, port: u16) -> Self {
		self.listen_port = Some(port);
		self
	}

	pub fn with_private_key(mut self, base64_key: &str) -> Self {
		self.private_key = Some(Zeroizing::new(base64_key.to_string()));
		self
	}

	pub fn with_peer(mut self, peer: PeerDescriptor) -> Self {
		self.peers.push(peer);
		self
	}
}

impl fmt::Debug for DeviceConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DeviceConfig")
			.field("listen_port", &self.listen_port)
			.field("private_key", &self.private_key.as_ref().map(|_| "[REDACTED]"))
			.field("peers", &self.peers)
			.finish()
	}
}

/// Hex-encodes a peer's base64 public key.
pub fn encode_peer_key(base64_key: &str) -> Result<String> {
	base64_key_to_hex(base64_key).map_err(|source| ProtocolError::InvalidPeerKey {
		key: base64_key.to_string(),
		source,
	})
}

/// Encodes the whole device configuration. All keys are converted before any
/// text is produced, so a bad key yields an error and no partial output.
pub fn encode_device_config(config: &DeviceConfig) -> Result<String> {
	let private_hex = config
		.private_key
		.as_ref()
		.map(|k| base64_key_to_hex(k).map(Zeroizing::new))
		.transpose()
		.map_err(ProtocolError::InvalidPrivateKey)?;

	let peer_hexes = config
		.peers
		.iter()
		.map(|p| encode_peer_key(&p.public_key))
		.collect::<Result<Vec<_>>>()?;

	let mut out = String::new();
	if let Some(hex) = private_hex {
		let _ = writeln!(out, "private_key={}", hex.as_str());
	}
	if let Some(port) = config.listen_port {
		let _ = writeln!(out, "listen_port={port}");
	}
	for (peer, hex) in config.peers.iter().zip(peer_hexes) {
		write_peer(&mut out, peer, &hex);
	}
	Ok(out)
}

fn write_peer(out: &mut String, peer: &PeerDescriptor, key_hex: &str) {
	let _ = writeln!(out, "public_key={key_hex}");
	if let Some(endpoint) = &peer.endpoint {
		let _ = writeln!(out, "endpoint={endpoint}");
	}
	if let Some(keepalive) = peer.persistent_keepalive {
		let _ = writeln!(out, "persistent_keepalive_interval={keepalive}");
	}
	for ip in &peer.allowed_ips {
		let _ = writeln!(out, "allowed_ip={ip}");
	}
}
