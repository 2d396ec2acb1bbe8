// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use clap::Subcommand;
use console::style;
use simplevpn_daemon::ServerConfig;
use simplevpn_wgtunnel_common::{default_identity_dir, ensure_identity, ServerIdentity, WgKeyPair};
use std::path::{Path, PathBuf};
use tracing::instrument;

#[derive(Debug, Clone, Subcommand)]
pub enum KeysCommands {
	/// Print the server public key, creating the identity if needed
	Show {
		#[arg(long, env = "SIMPLEVPN_KEY_DIR")]
		key_dir: Option<PathBuf>,
	},
	/// Print a fresh keypair without saving it
	Generate,
}

pub async fn handle_keys(command: KeysCommands, file: ServerConfig) -> anyhow::Result<()> {
	match command {
		KeysCommands::Show { key_dir } => {
			let dir = match key_dir.or(file.key_dir) {
				Some(dir) => dir,
				None => default_identity_dir()?,
			};
			let (identity, created) = show_identity(&dir).await?;
			if created {
				super::print_new_identity_warning();
			}
			println!("{}", identity.public_key_base64());
		}
		KeysCommands::Generate => {
			let keypair = WgKeyPair::generate()?;
			println!(
				"{} {}",
				style("private_key").dim(),
				keypair.private_key().to_base64().as_str()
			);
			println!("{} {}", style("public_key ").dim(), keypair.public_key());
		}
	}
	Ok(())
}

#[instrument(skip_all, fields(dir = %dir.display()))]
async fn show_identity(dir: &Path) -> anyhow::Result<(ServerIdentity, bool)> {
	Ok(ensure_identity(dir).await?)
}

#[cfg(test)]
mod tests {
	use super::*;
	use clap::Parser;
	use tempfile::TempDir;

	#[derive(Parser)]
	struct TestCli {
		#[command(subcommand)]
		cmd: KeysCommands,
	}

	#[test]
	fn test_show_parses_key_dir() {
		let cli = TestCli::parse_from(["test", "show", "--key-dir", "/srv/vpn"]);
		match cli.cmd {
			KeysCommands::Show { key_dir } => {
				assert_eq!(key_dir, Some(PathBuf::from("/srv/vpn")));
			}
			_ => panic!("expected Show command"),
		}
	}

	#[tokio::test]
	async fn test_show_is_stable() {
		let dir = TempDir::new().unwrap();

		let (first, created) = show_identity(dir.path()).await.unwrap();
		assert!(created);
		let (second, created) = show_identity(dir.path()).await.unwrap();
		assert!(!created);
		assert_eq!(first, second);
	}

	#[tokio::test]
	async fn test_show_uses_config_key_dir() {
		let dir = TempDir::new().unwrap();
		let file = ServerConfig {
			key_dir: Some(dir.path().to_path_buf()),
			..ServerConfig::default()
		};

		handle_keys(KeysCommands::Show { key_dir: None }, file)
			.await
			.unwrap();

		assert!(dir.path().join("server_public.key").exists());
	}
}
