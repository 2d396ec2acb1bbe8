// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetError {
	#[error("failed to run {command}: {source}")]
	Spawn {
		command: String,
		#[source]
		source: std::io::Error,
	},

	#[error("{command} failed (exit status {status:?}): {stderr}")]
	CommandFailed {
		command: String,
		status: Option<i32>,
		stderr: String,
	},

	#[error("I/O error on {path}: {source}")]
	Io {
		path: String,
		#[source]
		source: std::io::Error,
	},

	#[error("unexpected output from {command}: {output:?}")]
	UnexpectedOutput { command: String, output: String },

	#[error("no default route found")]
	NoDefaultRoute,

	#[error("unsupported platform: {0}")]
	UnsupportedPlatform(&'static str),
}

pub type Result<T> = std::result::Result<T, NetError>;
