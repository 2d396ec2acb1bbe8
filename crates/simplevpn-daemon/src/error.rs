// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use simplevpn_netctl::NetError;
use simplevpn_wgtunnel_common::{IdentityError, KeyError, ProtocolError};
use simplevpn_wgtunnel_engine::EngineError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
	#[error("key generation failed: {0}")]
	KeyGeneration(#[source] KeyError),

	#[error("key persistence failed: {0}")]
	KeyPersistence(#[source] IdentityError),

	#[error("stored private key is unusable: {0}")]
	InvalidIdentity(#[source] ProtocolError),

	#[error("invalid peer key: {0}")]
	InvalidPeerKey(#[source] ProtocolError),

	#[error("could not resolve server address {0:?}")]
	ServerAddress(String),

	#[error("interface creation failed: {0}")]
	InterfaceCreation(#[source] EngineError),

	#[error("address assignment failed: {0}")]
	AddressAssignment(#[source] NetError),

	#[error("route configuration failed: {0}")]
	RouteConfiguration(#[source] NetError),

	#[error("forwarding or NAT setup failed: {0}")]
	ForwardingOrNat(#[source] NetError),

	#[error("engine configuration failed: {0}")]
	EngineConfiguration(#[source] EngineError),

	#[error("failed to write {}: {source}", .path.display())]
	Output {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("configuration error: {0}")]
	Config(#[from] ConfigError),
}

impl From<IdentityError> for LifecycleError {
	fn from(e: IdentityError) -> Self {
		match e {
			IdentityError::KeyGeneration(key) => Self::KeyGeneration(key),
			other => Self::KeyPersistence(other),
		}
	}
}

impl From<ProtocolError> for LifecycleError {
	fn from(e: ProtocolError) -> Self {
		match e {
			ProtocolError::InvalidPrivateKey(_) => Self::InvalidIdentity(e),
			ProtocolError::InvalidPeerKey { .. } => Self::InvalidPeerKey(e),
		}
	}
}

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read config file {}: {source}", .path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse config file: {0}")]
	Parse(#[from] toml::de::Error),

	#[error("invalid configuration: {0}")]
	Invalid(String),
}

pub type Result<T> = std::result::Result<T, LifecycleError>;
