// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::error::{NetError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
	pub status: Option<i32>,
	pub stdout: String,
	pub stderr: String,
}

impl CommandOutput {
	pub fn success(&self) -> bool {
		self.status == Some(0)
	}
}

pub(crate) fn render_command(program: &str, args: &[&str]) -> String {
	let mut rendered = program.to_string();
	for arg in args {
		rendered.push(' ');
		rendered.push_str(arg);
	}
	rendered
}

/// Issues external commands on behalf of a platform controller.
#[async_trait]
pub trait CommandRunner: Send + Sync {
	/// Runs the command to completion and returns its output regardless of
	/// exit status.
	async fn output(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;

	/// Runs the command and fails on a non-zero exit, carrying stderr.
	async fn run(&self, program: &str, args: &[&str]) -> Result<String> {
		let out = self.output(program, args).await?;
		if !out.success() {
			return Err(NetError::CommandFailed {
				command: render_command(program, args),
				status: out.status,
				stderr: out.stderr.trim().to_string(),
			});
		}
		Ok(out.stdout)
	}
}

/// Spawns real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
	#[instrument(skip(self, args), fields(command = %render_command(program, args)))]
	async fn output(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
		let output = Command::new(program)
			.args(args)
			.stdin(Stdio::null())
			.output()
			.await
			.map_err(|source| NetError::Spawn {
				command: render_command(program, args),
				source,
			})?;

		let result = CommandOutput {
			status: output.status.code(),
			stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
			stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
		};
		debug!(status = ?result.status, "command finished");
		Ok(result)
	}
}

#[cfg(test)]
pub(crate) mod fake {
	use super::*;
	use std::sync::{Arc, Mutex};

	/// Records every command and answers from a list of (prefix, output)
	/// rules. Unmatched commands succeed with empty output.
	#[derive(Clone, Default)]
	pub struct ScriptedRunner {
		rules: Arc<Mutex<Vec<(String, CommandOutput)>>>,
		calls: Arc<Mutex<Vec<String>>>,
	}

	impl ScriptedRunner {
		pub fn new() -> Self {
			Self::default()
		}

		pub fn respond(&self, prefix: &str, status: i32, stdout: &str) -> &Self {
			self.rules.lock().unwrap().push((
				prefix.to_string(),
				CommandOutput {
					status: Some(status),
					stdout: stdout.to_string(),
					stderr: if status == 0 {
						String::new()
					} else {
						"scripted failure".to_string()
					},
				},
			));
			self
		}

		pub fn calls(&self) -> Vec<String> {
			self.calls.lock().unwrap().clone()
		}
	}

	#[async_trait]
	impl CommandRunner for ScriptedRunner {
		async fn output(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
			let command = render_command(program, args);
			self.calls.lock().unwrap().push(command.clone());
			let rules = self.rules.lock().unwrap();
			Ok(rules
				.iter()
				.find(|(prefix, _)| command.starts_with(prefix.as_str()))
				.map(|(_, out)| out.clone())
				.unwrap_or(CommandOutput {
					status: Some(0),
					..Default::default()
				}))
		}
	}
}
