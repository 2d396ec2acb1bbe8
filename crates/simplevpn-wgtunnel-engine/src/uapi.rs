// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client for the WireGuard cross-platform userspace API: a unix socket
//! speaking `set=1` / `get=1` transactions terminated by a blank line and
//! answered with `errno=N`.

use crate::error::{EngineError, Result};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::{debug, instrument, trace};

pub const DEFAULT_SOCKET_DIR: &str = "/var/run/wireguard";

pub fn socket_path(dir: &Path, interface: &str) -> PathBuf {
	dir.join(format!("{interface}.sock"))
}

/// Wraps encoded configuration lines in a set transaction.
pub fn set_request(body: &str) -> String {
	let mut request = String::with_capacity(body.len() + 8);
	request.push_str("set=1\n");
	request.push_str(body);
	if !body.is_empty() && !body.ends_with('\n') {
		request.push('\n');
	}
	request.push('\n');
	request
}

pub const GET_REQUEST: &str = "get=1\n\n";

/// Extracts the `errno=` value from a reply.
pub fn parse_errno(reply: &str) -> Result<i32> {
	reply
		.lines()
		.rev()
		.find_map(|l| l.strip_prefix("errno="))
		.ok_or_else(|| EngineError::Protocol(reply.to_string()))?
		.trim()
		.parse::<i32>()
		.map_err(|_| EngineError::Protocol(reply.to_string()))
}

/// Writes one request and reads the reply up to its terminating blank line.
async fn exchange<S>(mut stream: S, request: &str) -> Result<String>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	stream.write_all(request.as_bytes()).await?;
	stream.flush().await?;

	let mut reader = BufReader::new(stream);
	let mut reply = String::new();
	loop {
		let mut line = String::new();
		let n = reader.read_line(&mut line).await?;
		if n == 0 || line == "\n" {
			break;
		}
		trace!(line = line.trim_end(), "uapi reply line");
		reply.push_str(&line);
	}
	Ok(reply)
}

/// The parts of a `set` body that a later `get` must echo back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpectedDevice {
	pub listen_port: Option<u16>,
	pub peers: usize,
}

impl ExpectedDevice {
	pub fn from_set_body(body: &str) -> Self {
		let mut expected = Self::default();
		for (key, value) in body.lines().filter_map(|l| l.split_once('=')) {
			match key {
				"listen_port" => expected.listen_port = value.trim().parse().ok(),
				"public_key" => expected.peers += 1,
				_ => {}
			}
		}
		expected
	}

	pub fn verify(&self, state: &[(String, String)]) -> Result<()> {
		if let Some(port) = self.listen_port {
			let reported = state
				.iter()
				.find(|(k, _)| k == "listen_port")
				.and_then(|(_, v)| v.parse::<u16>().ok());
			if reported != Some(port) {
				return Err(EngineError::StateMismatch(format!(
					"listen_port {port} configured, engine reports {reported:?}"
				)));
			}
		}
		let peers = state.iter().filter(|(k, _)| k == "public_key").count();
		if peers != self.peers {
			return Err(EngineError::StateMismatch(format!(
				"{} peer(s) configured, engine reports {peers}",
				self.peers
			)));
		}
		Ok(())
	}
}

#[derive(Debug, Clone)]
pub struct UapiClient {
	socket: PathBuf,
}

impl UapiClient {
	pub fn new(socket: impl Into<PathBuf>) -> Self {
		Self {
			socket: socket.into(),
		}
	}

	pub fn socket(&self) -> &Path {
		&self.socket
	}

	async fn transact(&self, request: &str) -> Result<String> {
		let stream = UnixStream::connect(&self.socket).await?;
		exchange(stream, request).await
	}

	/// Applies a configuration body; a non-zero errno is an error.
	#[instrument(skip_all, fields(socket = %self.socket.display()))]
	pub async fn set(&self, body: &str) -> Result<()> {
		let reply = self.transact(&set_request(body)).await?;
		match parse_errno(&reply)? {
			0 => {
				debug!("configuration applied");
				Ok(())
			}
			errno => Err(EngineError::Configuration { errno }),
		}
	}

	/// Reads the device state as `key=value` pairs, excluding the errno line.
	#[instrument(skip_all, fields(socket = %self.socket.display()))]
	pub async fn get(&self) -> Result<Vec<(String, String)>> {
		let reply = self.transact(GET_REQUEST).await?;
		let errno = parse_errno(&reply)?;
		if errno != 0 {
			return Err(EngineError::Configuration { errno });
		}
		Ok(reply
			.lines()
			.filter_map(|l| l.split_once('='))
			.filter(|(k, _)| *k != "errno")
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect())
	}
}
