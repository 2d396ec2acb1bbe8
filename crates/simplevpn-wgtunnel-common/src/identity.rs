// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::keys::{KeyError, WgKeyPair};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, instrument};
use zeroize::Zeroizing;

pub const PRIVATE_KEY_FILE: &str = "server_private.key";
pub const PUBLIC_KEY_FILE: &str = "server_public.key";

const DIR_MODE: u32 = 0o700;
const PRIVATE_MODE: u32 = 0o600;
const PUBLIC_MODE: u32 = 0o644;

#[derive(Error, Debug)]
pub enum IdentityError {
	#[error("failed to persist key file {path}: {source}")]
	KeyPersistence {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("failed to generate key: {0}")]
	KeyGeneration(#[from] KeyError),

	#[error("failed to get home directory")]
	NoHomeDir,
}

pub type Result<T> = std::result::Result<T, IdentityError>;

fn persistence(path: &Path) -> impl FnOnce(io::Error) -> IdentityError + '_ {
	move |source| IdentityError::KeyPersistence {
		path: path.to_path_buf(),
		source,
	}
}

/// The server's long-term key pair as stored on disk, base64 text.
#[derive(Clone)]
pub struct ServerIdentity {
	private_key: Zeroizing<String>,
	public_key: String,
}

impl ServerIdentity {
	fn from_keypair(keypair: &WgKeyPair) -> Self {
		Self {
			private_key: keypair.private_key().to_base64(),
			public_key: keypair.public_key().to_base64(),
		}
	}

	pub fn private_key_base64(&self) -> &str {
		&self.private_key
	}

	pub fn public_key_base64(&self) -> &str {
		&self.public_key
	}
}

impl PartialEq for ServerIdentity {
	fn eq(&self, other: &Self) -> bool {
		*self.private_key == *other.private_key && self.public_key == other.public_key
	}
}

impl Eq for ServerIdentity {}

impl fmt::Debug for ServerIdentity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ServerIdentity")
			.field("private_key", &"[REDACTED]")
			.field("public_key", &self.public_key)
			.finish()
	}
}

/// Loads the identity from `dir`, or creates and persists a fresh one when
/// either file is missing. The boolean is `true` only when keys were written.
#[instrument(skip_all, fields(dir = %dir.as_ref().display()))]
pub async fn ensure_identity(dir: impl AsRef<Path>) -> Result<(ServerIdentity, bool)> {
	let dir = dir.as_ref();
	let private_path = dir.join(PRIVATE_KEY_FILE);
	let public_path = dir.join(PUBLIC_KEY_FILE);

	if let Some(identity) = load_identity(&private_path, &public_path).await {
		debug!("loaded existing server identity");
		return Ok((identity, false));
	}

	let keypair = WgKeyPair::generate()?;
	let identity = ServerIdentity::from_keypair(&keypair);

	create_key_dir(dir).await?;
	write_key_file(&private_path, &identity.private_key, PRIVATE_MODE).await?;
	write_key_file(&public_path, &identity.public_key, PUBLIC_MODE).await?;

	info!(public_key = %identity.public_key, "created new server identity");
	Ok((identity, true))
}

async fn load_identity(private_path: &Path, public_path: &Path) -> Option<ServerIdentity> {
	let private_key = Zeroizing::new(fs::read_to_string(private_path).await.ok()?);
	let public_key = fs::read_to_string(public_path).await.ok()?;
	Some(ServerIdentity {
		private_key: Zeroizing::new(private_key.trim().to_string()),
		public_key: public_key.trim().to_string(),
	})
}

async fn create_key_dir(dir: &Path) -> Result<()> {
	if fs::metadata(dir).await.is_ok() {
		return Ok(());
	}

	let mut builder = fs::DirBuilder::new();
	builder.recursive(true);
	#[cfg(unix)]
	builder.mode(DIR_MODE);
	builder.create(dir).await.map_err(persistence(dir))
}

async fn write_key_file(path: &Path, content: &str, mode: u32) -> Result<()> {
	#[cfg(unix)]
	{
		use std::os::unix::fs::PermissionsExt;
		use tokio::fs::OpenOptions;
		use tokio::io::AsyncWriteExt;

		let mut file = OpenOptions::new()
			.write(true)
			.create(true)
			.truncate(true)
			.mode(mode)
			.open(path)
			.await
			.map_err(persistence(path))?;
		file.write_all(content.as_bytes())
			.await
			.map_err(persistence(path))?;
		file.flush().await.map_err(persistence(path))?;
		// open() honours the umask and leaves pre-existing files untouched
		fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
			.await
			.map_err(persistence(path))?;
	}

	#[cfg(not(unix))]
	{
		let _ = mode;
		fs::write(path, content)
			.await
			.map_err(persistence(path))?;
	}

	Ok(())
}

pub fn default_identity_dir() -> Result<PathBuf> {
	dirs::home_dir()
		.map(|h| h.join(".simplevpn"))
		.ok_or(IdentityError::NoHomeDir)
}
