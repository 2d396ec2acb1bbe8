// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("failed to create tunnel interface: {0}")]
	InterfaceCreation(String),

	#[error("timed out waiting for control socket {}", .0.display())]
	StartupTimeout(PathBuf),

	#[error("engine rejected configuration (errno={errno})")]
	Configuration { errno: i32 },

	#[error("malformed control protocol reply: {0:?}")]
	Protocol(String),

	#[error("engine state does not match configuration: {0}")]
	StateMismatch(String),

	#[error("engine is not running")]
	NotRunning,
}

pub type Result<T> = std::result::Result<T, EngineError>;
