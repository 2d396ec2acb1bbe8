// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::error::ConfigError;
use ipnet::{IpNet, Ipv4Net};
use serde::{Deserialize, Serialize};
use simplevpn_wgtunnel_common::{parse_subnet, DEFAULT_DNS, DEFAULT_KEEPALIVE_SECS, DEFAULT_SUBNET};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

pub const DEFAULT_LISTEN_PORT: u16 = 51820;
pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_CLIENT_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

pub fn default_interface_name() -> String {
	if cfg!(target_os = "macos") {
		"utun".to_string()
	} else {
		"svpn0".to_string()
	}
}

fn default_subnet() -> Ipv4Net {
	parse_subnet(DEFAULT_SUBNET).unwrap_or_default()
}

fn default_allowed_ips() -> Vec<IpNet> {
	vec![IpNet::V4(Ipv4Net::default())]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticRoute {
	pub destination: Ipv4Net,
	pub gateway: Ipv4Addr,
}

/// A client the server accepts traffic from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerPeerConfig {
	pub public_key: String,
	#[serde(default)]
	pub allowed_ips: Vec<IpNet>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
	/// Where the identity lives; `$HOME/.simplevpn` when unset.
	pub key_dir: Option<PathBuf>,
	pub subnet: Ipv4Net,
	pub listen_port: u16,
	pub interface_name: String,
	/// Detected from the default route when unset.
	pub egress_interface: Option<String>,
	pub static_route: Option<StaticRoute>,
	pub peer: Option<ServerPeerConfig>,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self {
			key_dir: None,
			subnet: default_subnet(),
			listen_port: DEFAULT_LISTEN_PORT,
			interface_name: default_interface_name(),
			egress_interface: None,
			static_route: None,
			peer: None,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
	pub server_address: String,
	pub server_port: u16,
	pub server_public_key: String,
	pub client_ip: Ipv4Addr,
	pub subnet: Ipv4Net,
	pub allowed_ips: Vec<IpNet>,
	pub persistent_keepalive: u16,
	pub dns: IpAddr,
	pub interface_name: String,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			server_address: DEFAULT_SERVER_ADDRESS.to_string(),
			server_port: DEFAULT_LISTEN_PORT,
			server_public_key: String::new(),
			client_ip: DEFAULT_CLIENT_IP,
			subnet: default_subnet(),
			allowed_ips: default_allowed_ips(),
			persistent_keepalive: DEFAULT_KEEPALIVE_SECS,
			dns: DEFAULT_DNS,
			interface_name: default_interface_name(),
		}
	}
}

impl ClientConfig {
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.server_public_key.trim().is_empty() {
			return Err(ConfigError::Invalid(
				"server public key is required".to_string(),
			));
		}
		if !self.subnet.contains(&self.client_ip) {
			return Err(ConfigError::Invalid(format!(
				"client IP {} is outside subnet {}",
				self.client_ip, self.subnet
			)));
		}
		Ok(())
	}
}

/// The optional TOML file given with `--config`. Flags override its values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimpleVpnConfig {
	pub server: ServerConfig,
	pub client: ClientConfig,
}

impl SimpleVpnConfig {
	pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(text)?)
	}

	pub async fn load(path: &Path) -> Result<Self, ConfigError> {
		let text = tokio::fs::read_to_string(path)
			.await
			.map_err(|source| ConfigError::Read {
				path: path.to_path_buf(),
				source,
			})?;
		Self::from_toml(&text)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let server = ServerConfig::default();
		assert_eq!(server.subnet.to_string(), "10.0.0.0/24");
		assert_eq!(server.listen_port, 51820);

		let client = ClientConfig::default();
		assert_eq!(client.server_address, "127.0.0.1");
		assert_eq!(client.client_ip, Ipv4Addr::new(10, 0, 0, 2));
		assert_eq!(client.persistent_keepalive, 25);
		assert_eq!(client.allowed_ips, vec!["0.0.0.0/0".parse::<IpNet>().unwrap()]);
	}

	#[test]
	fn test_empty_file_is_all_defaults() {
		assert_eq!(
			SimpleVpnConfig::from_toml("").unwrap(),
			SimpleVpnConfig::default()
		);
	}

	#[test]
	fn test_partial_file() {
		let config = SimpleVpnConfig::from_toml(
			r#"
[server]
subnet = "192.168.5.0/28"
listen_port = 443
egress_interface = "ens5"

[server.peer]
public_key = "abc="

[client]
server_address = "vpn.example.com"
allowed_ips = ["10.0.0.0/24", "192.168.1.0/24"]
"#,
		)
		.unwrap();

		assert_eq!(config.server.subnet.to_string(), "192.168.5.0/28");
		assert_eq!(config.server.listen_port, 443);
		assert_eq!(config.server.egress_interface.as_deref(), Some("ens5"));
		assert_eq!(config.server.peer.unwrap().allowed_ips.len(), 0);
		assert_eq!(config.client.server_address, "vpn.example.com");
		assert_eq!(config.client.allowed_ips.len(), 2);
		assert_eq!(config.client.server_port, 51820);
	}

	#[test]
	fn test_bad_toml() {
		assert!(matches!(
			SimpleVpnConfig::from_toml("[server]\nlisten_port = \"x\""),
			Err(ConfigError::Parse(_))
		));
	}

	#[test]
	fn test_client_validation() {
		let mut client = ClientConfig::default();
		assert!(client.validate().is_err());

		client.server_public_key = "key".to_string();
		assert!(client.validate().is_ok());

		client.client_ip = Ipv4Addr::new(172, 16, 0, 2);
		assert!(matches!(client.validate(), Err(ConfigError::Invalid(_))));
	}

	#[tokio::test]
	async fn test_load_missing_file() {
		let dir = tempfile::TempDir::new().unwrap();
		let err = SimpleVpnConfig::load(&dir.path().join("nope.toml"))
			.await
			.unwrap_err();
		assert!(matches!(err, ConfigError::Read { .. }));
	}
}
