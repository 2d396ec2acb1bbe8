// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

pub mod client_config;
pub mod identity;
pub mod keys;
pub mod peer;
pub mod protocol;
pub mod subnet;

pub use client_config::{ClientConfigDocument, DEFAULT_DNS};
pub use identity::{
	default_identity_dir, ensure_identity, IdentityError, ServerIdentity, PRIVATE_KEY_FILE,
	PUBLIC_KEY_FILE,
};
pub use keys::{base64_key_to_hex, clamp, KeyError, WgKeyPair, WgPrivateKey, WgPublicKey};
pub use peer::{Endpoint, PeerDescriptor, DEFAULT_KEEPALIVE_SECS};
pub use protocol::{encode_device_config, encode_peer_key, DeviceConfig, ProtocolError};
pub use subnet::{
	first_usable, host_in_subnet, parse_subnet, SubnetError, DEFAULT_SUBNET, SPLIT_DEFAULT_ROUTES,
};
