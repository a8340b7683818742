// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Reconciliation of client directories with the secret service.

pub mod drift;
pub mod entry;
pub mod manager;
pub mod state;

pub use drift::Drift;
pub use entry::{ClientEntry, SyncSummary};
pub use manager::{randomize, Syncer};
pub use state::{SecretState, VerifiedState};
