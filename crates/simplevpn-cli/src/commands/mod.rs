// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

pub mod client;
pub mod keys;
pub mod server;

pub use client::ClientArgs;
pub use keys::KeysCommands;
pub use server::ServerArgs;

use console::style;
use simplevpn_daemon::Notice;
use simplevpn_wgtunnel_common::PRIVATE_KEY_FILE;

/// Prints what the operator must act on. Hooked into the lifecycle.
pub fn print_notice(notice: Notice<'_>) {
	match notice {
		Notice::ServerIdentity { identity, created } => {
			if created {
				print_new_identity_warning();
			}
			println!(
				"{} Server public key: {}",
				style("→").cyan(),
				style(identity.public_key_base64()).bold()
			);
		}
		Notice::ClientKey { public_key } => {
			println!(
				"{} Client public key: {}",
				style("→").cyan(),
				style(public_key).bold()
			);
			println!("  Add it as a peer on the server before traffic will flow.");
		}
	}
}

pub fn print_new_identity_warning() {
	println!(
		"{} A new server identity was created.",
		style("!").yellow().bold()
	);
	println!(
		"  Back up {} now. It cannot be recovered, and losing it",
		style(PRIVATE_KEY_FILE).bold()
	);
	println!("  means every client has to be reconfigured.");
}
