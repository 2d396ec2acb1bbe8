// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Host network topology control for the simplevpn tunnel.
//!
//! A [`NetworkController`] applies address, route, forwarding and NAT
//! changes for one OS family. Each applied change is paired with a
//! [`RestoreAction`] in a [`RestoreLedger`], which is unwound in reverse on
//! shutdown.
//!
//! ```ignore
//! let controller = platform_controller()?;
//! let mut ledger = RestoreLedger::new();
//!
//! let previous = controller.forwarding_state().await?;
//! controller.set_forwarding(true).await?;
//! ledger.record(RestoreAction::RestoreForwarding { previous });
//!
//! // ... later
//! for failure in ledger.unwind(controller.as_ref()).await {
//!     eprintln!("{failure}");
//! }
//! ```

pub mod controller;
pub mod error;
pub mod ledger;
pub mod linux;
pub mod macos;
pub mod plan;
pub mod runner;

pub use controller::{platform_controller, NetworkController};
pub use error::{NetError, Result};
pub use ledger::{LedgerEntry, RestoreAction, RestoreFailure, RestoreLedger};
pub use linux::LinuxController;
pub use macos::{MacosController, DEFAULT_PF_CONF};
pub use plan::{FirewallBackup, GatewaySnapshot, NatInstall, NatRule, NetworkPlan, RouteEntry};
pub use runner::{CommandOutput, CommandRunner, SystemRunner};
