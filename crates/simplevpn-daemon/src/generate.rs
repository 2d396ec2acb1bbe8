// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Config mode: mint a client keypair and a wg-quick document for it. Nothing
//! on the host changes.

use crate::config::ClientConfig;
use crate::error::{LifecycleError, Result};
use simplevpn_wgtunnel_common::{encode_peer_key, ClientConfigDocument, Endpoint, WgKeyPair};
use std::path::Path;
use tracing::{info, instrument};

const OUTPUT_MODE: u32 = 0o600;

/// Builds the client document. The server key is checked up front so a typo
/// fails here rather than inside wg-quick.
#[instrument(skip_all, fields(server = %config.server_address, port = config.server_port))]
pub fn generate_client_config(config: &ClientConfig) -> Result<(WgKeyPair, ClientConfigDocument)> {
	config.validate()?;
	let server_key = config.server_public_key.trim();
	encode_peer_key(server_key)?;

	let keypair = WgKeyPair::generate().map_err(LifecycleError::KeyGeneration)?;
	let document = ClientConfigDocument::new(
		&keypair,
		config.client_ip,
		server_key,
		Endpoint::new(config.server_address.clone(), config.server_port),
	)
	.with_allowed_ips(config.allowed_ips.clone())
	.with_dns(config.dns)
	.with_persistent_keepalive(config.persistent_keepalive);

	info!(public_key = %keypair.public_key(), "generated client configuration");
	Ok((keypair, document))
}

/// Writes `text` to `path`, readable by the owner only.
pub async fn write_config_file(path: &Path, text: &str) -> Result<()> {
	let output = |source| LifecycleError::Output {
		path: path.to_path_buf(),
		source,
	};

	#[cfg(unix)]
	{
		use std::os::unix::fs::PermissionsExt;
		use tokio::io::AsyncWriteExt;

		let mut file = tokio::fs::OpenOptions::new()
			.write(true)
			.create(true)
			.truncate(true)
			.mode(OUTPUT_MODE)
			.open(path)
			.await
			.map_err(output)?;
		file.write_all(text.as_bytes()).await.map_err(output)?;
		file.flush().await.map_err(output)?;
		tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(OUTPUT_MODE))
			.await
			.map_err(output)?;
	}

	#[cfg(not(unix))]
	{
		let _ = OUTPUT_MODE;
		tokio::fs::write(path, text).await.map_err(output)?;
	}

	info!(path = %path.display(), "wrote client configuration");
	Ok(())
}
