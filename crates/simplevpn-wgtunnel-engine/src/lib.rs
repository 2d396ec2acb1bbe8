// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

pub mod engine;
pub mod error;
#[cfg(unix)]
pub mod uapi;
#[cfg(unix)]
pub mod userspace;

pub use engine::{EngineLauncher, TunnelEngine};
pub use error::{EngineError, Result};
#[cfg(unix)]
pub use uapi::{UapiClient, DEFAULT_SOCKET_DIR};
#[cfg(unix)]
pub use userspace::{UserspaceEngine, UserspaceLauncher, DEFAULT_ENGINE_BINARY};
