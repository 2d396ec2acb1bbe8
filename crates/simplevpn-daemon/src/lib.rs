// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tunnel lifecycle for simplevpn.
//!
//! [`TunnelLifecycle`] walks a server or embedded client from identity setup
//! to a running tunnel and back. Every host change goes through a
//! [`NetworkController`](simplevpn_netctl::NetworkController) and is recorded
//! in a restore ledger, so an abort at any step and a normal shutdown both
//! leave the host as they found it.
//!
//! ```ignore
//! use simplevpn_daemon::{shutdown_signal, ServerConfig, TunnelLifecycle};
//! use simplevpn_netctl::platform_controller;
//! use simplevpn_wgtunnel_engine::{UserspaceLauncher, DEFAULT_ENGINE_BINARY};
//!
//! let mut lifecycle = TunnelLifecycle::new(
//!     UserspaceLauncher::new(DEFAULT_ENGINE_BINARY),
//!     platform_controller()?,
//! );
//! let reason = lifecycle.run_server(&ServerConfig::default(), shutdown_signal()).await?;
//! ```

pub mod config;
pub mod error;
pub mod generate;
pub mod lifecycle;
pub mod signal;

#[cfg(test)]
mod testing;

pub use config::{
	default_interface_name, ClientConfig, ServerConfig, ServerPeerConfig, SimpleVpnConfig,
	StaticRoute, DEFAULT_CLIENT_IP, DEFAULT_LISTEN_PORT, DEFAULT_SERVER_ADDRESS,
};
pub use error::{ConfigError, LifecycleError, Result};
pub use generate::{generate_client_config, write_config_file};
pub use lifecycle::{LifecycleState, Notice, TunnelLifecycle};
pub use signal::{shutdown_signal, ShutdownReason};
