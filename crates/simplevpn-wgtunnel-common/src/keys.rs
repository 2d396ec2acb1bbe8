// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;
use x25519_dalek::{x25519, X25519_BASEPOINT_BYTES};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

pub const KEY_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum KeyError {
	#[error("invalid key length: expected 32 bytes, got {0}")]
	InvalidLength(usize),

	#[error("invalid base64 encoding: {0}")]
	InvalidBase64(#[from] base64::DecodeError),

	#[error("invalid hex encoding: {0}")]
	InvalidHex(#[from] hex::FromHexError),

	#[error("random source failed: {0}")]
	RandomSource(#[from] rand::Error),
}

pub type Result<T> = std::result::Result<T, KeyError>;

/// Applies the Curve25519 scalar clamp in place.
pub fn clamp(bytes: &mut [u8; KEY_LEN]) {
	bytes[0] &= 248;
	bytes[31] = (bytes[31] & 127) | 64;
}

fn to_key_bytes(mut decoded: Vec<u8>) -> Result<[u8; KEY_LEN]> {
	if decoded.len() != KEY_LEN {
		let len = decoded.len();
		decoded.zeroize();
		return Err(KeyError::InvalidLength(len));
	}
	let mut arr = [0u8; KEY_LEN];
	arr.copy_from_slice(&decoded);
	decoded.zeroize();
	Ok(arr)
}

/// Decodes standard (padded) base64 into exactly 32 bytes.
pub fn decode_base64_key(s: &str) -> Result<[u8; KEY_LEN]> {
	to_key_bytes(STANDARD.decode(s.trim())?)
}

/// Re-encodes a base64 key as lowercase hex, the form the control protocol expects.
pub fn base64_key_to_hex(s: &str) -> Result<String> {
	let mut bytes = decode_base64_key(s)?;
	let hex = hex::encode(bytes);
	bytes.zeroize();
	Ok(hex)
}

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct WgPrivateKey {
	bytes: [u8; KEY_LEN],
}

impl WgPrivateKey {
	/// Draws a fresh clamped scalar from the OS entropy source.
	pub fn generate() -> Result<Self> {
		let mut bytes = [0u8; KEY_LEN];
		OsRng.try_fill_bytes(&mut bytes)?;
		clamp(&mut bytes);
		Ok(Self { bytes })
	}

	pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
		Self { bytes }
	}

	pub fn from_base64(s: &str) -> Result<Self> {
		Ok(Self {
			bytes: decode_base64_key(s)?,
		})
	}

	pub fn from_hex(s: &str) -> Result<Self> {
		Ok(Self {
			bytes: to_key_bytes(hex::decode(s.trim())?)?,
		})
	}

	pub fn to_base64(&self) -> Zeroizing<String> {
		Zeroizing::new(STANDARD.encode(self.bytes))
	}

	pub fn to_hex(&self) -> Zeroizing<String> {
		Zeroizing::new(hex::encode(self.bytes))
	}

	pub fn public_key(&self) -> WgPublicKey {
		WgPublicKey {
			bytes: x25519(self.bytes, X25519_BASEPOINT_BYTES),
		}
	}

	pub fn is_clamped(&self) -> bool {
		self.bytes[0] & 7 == 0 && self.bytes[31] & 128 == 0 && self.bytes[31] & 64 == 64
	}

	pub fn expose_bytes(&self) -> &[u8; KEY_LEN] {
		&self.bytes
	}
}

impl fmt::Debug for WgPrivateKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WgPrivateKey")
			.field("bytes", &"[REDACTED]")
			.finish()
	}
}

impl fmt::Display for WgPrivateKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("[REDACTED]")
	}
}

impl Serialize for WgPrivateKey {
	fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str("[REDACTED]")
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct WgPublicKey {
	bytes: [u8; KEY_LEN],
}

impl WgPublicKey {
	pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
		Self { bytes }
	}

	pub fn from_base64(s: &str) -> Result<Self> {
		Ok(Self {
			bytes: decode_base64_key(s)?,
		})
	}

	pub fn from_hex(s: &str) -> Result<Self> {
		Ok(Self {
			bytes: to_key_bytes(hex::decode(s.trim())?)?,
		})
	}

	pub fn to_base64(&self) -> String {
		STANDARD.encode(self.bytes)
	}

	pub fn to_hex(&self) -> String {
		hex::encode(self.bytes)
	}

	pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
		&self.bytes
	}
}

impl fmt::Debug for WgPublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let b64 = self.to_base64();
		f.debug_struct("WgPublicKey")
			.field("prefix", &format!("{}...", &b64[..8]))
			.finish()
	}
}

impl fmt::Display for WgPublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_base64())
	}
}

impl Serialize for WgPublicKey {
	fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.to_base64())
	}
}

impl<'de> Deserialize<'de> for WgPublicKey {
	fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		Self::from_base64(&s).map_err(serde::de::Error::custom)
	}
}

/// A private key together with its derived public key. The two are never
/// constructed independently.
#[derive(Clone)]
pub struct WgKeyPair {
	private: WgPrivateKey,
	public: WgPublicKey,
}

impl WgKeyPair {
	/// Ephemeral pair held in memory only.
	pub fn generate() -> Result<Self> {
		Ok(Self::from_private_key(WgPrivateKey::generate()?))
	}

	pub fn from_private_key(private: WgPrivateKey) -> Self {
		let public = private.public_key();
		Self { private, public }
	}

	pub fn from_base64(private_key_base64: &str) -> Result<Self> {
		Ok(Self::from_private_key(WgPrivateKey::from_base64(
			private_key_base64,
		)?))
	}

	pub fn private_key(&self) -> &WgPrivateKey {
		&self.private
	}

	pub fn public_key(&self) -> &WgPublicKey {
		&self.public
	}
}

impl fmt::Debug for WgKeyPair {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WgKeyPair")
			.field("private", &self.private)
			.field("public", &self.public)
			.finish()
	}
}
