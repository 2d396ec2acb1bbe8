// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::error::Result;
use async_trait::async_trait;

/// A running tunnel engine bound to one OS interface. Each verb is called at
/// most once per lifecycle.
#[async_trait]
pub trait TunnelEngine: Send {
	/// The OS-level name of the tunnel interface, e.g. `utun4`.
	fn interface_name(&self) -> &str;

	/// Applies encoded control-protocol lines.
	async fn configure(&mut self, config: &str) -> Result<()>;

	async fn up(&mut self) -> Result<()>;

	async fn close(&mut self) -> Result<()>;
}

/// Creates the tunnel interface and the engine that drives it.
#[async_trait]
pub trait EngineLauncher: Send + Sync {
	type Engine: TunnelEngine;

	async fn create_interface(&self, requested_name: &str) -> Result<Self::Engine>;
}
