// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fmt;
use tracing::warn;

/// Why the running tunnel was asked to stop. Not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
	Interrupt,
	Terminate,
}

impl fmt::Display for ShutdownReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Interrupt => f.write_str("interrupt"),
			Self::Terminate => f.write_str("terminate"),
		}
	}
}

/// Resolves once on SIGINT or SIGTERM.
pub async fn shutdown_signal() -> ShutdownReason {
	#[cfg(unix)]
	{
		use tokio::signal::unix::{signal, SignalKind};

		let mut terminate = match signal(SignalKind::terminate()) {
			Ok(s) => s,
			Err(e) => {
				warn!(error = %e, "failed to install SIGTERM handler");
				return interrupt().await;
			}
		};

		tokio::select! {
			reason = interrupt() => reason,
			_ = terminate.recv() => ShutdownReason::Terminate,
		}
	}

	#[cfg(not(unix))]
	{
		interrupt().await
	}
}

async fn interrupt() -> ShutdownReason {
	if let Err(e) = tokio::signal::ctrl_c().await {
		warn!(error = %e, "failed to listen for interrupt");
		std::future::pending::<()>().await;
	}
	ShutdownReason::Interrupt
}
