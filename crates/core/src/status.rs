// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transaction status vocabulary (spec.md §3 action metadata, §4.1 StatusOutput).

use serde::{Deserialize, Serialize};

/// The `status` field persisted in action metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Running,
    Success,
    Failure,
    /// The worker's process is gone but no exitcode file was ever written
    /// (spec.md §4.5 status derivation table, row 3).
    Undetermined,
    /// Nothing useful could be determined (no pid, no output, no live worker).
    Unknown,
}

crate::simple_display! {
    TransactionStatus {
        Running => "running",
        Success => "success",
        Failure => "failure",
        Undetermined => "undetermined",
        Unknown => "unknown",
    }
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Running)
    }
}

/// Derive the client-facing status for a `StatusOutput` response (spec.md §4.1).
///
/// `results_are_valid` and `exitcode` are only meaningful when `stored` is
/// `Success` or `Failure` — the happy path where the metadata was finalized
/// with an attached exit code.
///
/// TODO(compat): spec.md's Open Questions flags that legacy wire behavior
/// sometimes collapsed `undetermined` into `unknown`. We pass `undetermined`
/// through unchanged per the explicit instruction in §9 ("Implementers MUST
/// pass it through"); revisit if a broker is found that still expects the
/// collapsed form.
pub fn derive_client_status(
    stored: TransactionStatus,
    results_are_valid: bool,
    exitcode: Option<i32>,
) -> TransactionStatus {
    match stored {
        TransactionStatus::Running => TransactionStatus::Running,
        TransactionStatus::Undetermined => TransactionStatus::Undetermined,
        TransactionStatus::Unknown => TransactionStatus::Unknown,
        TransactionStatus::Success | TransactionStatus::Failure => {
            if !results_are_valid || exitcode.unwrap_or(0) != 0 {
                TransactionStatus::Failure
            } else {
                TransactionStatus::Success
            }
        }
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
