// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PID-file liveness predicate, factored out of per-call-site checks
//! (spec.md §4.5 status path point 2).

use std::path::Path;

/// Outcome of reading and checking a transaction's `pid` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidStatus {
    /// File present, integer parsed, process still running.
    Live(i32),
    /// File present, integer parsed, process no longer running.
    Stale(i32),
    /// File does not exist.
    Absent,
    /// File exists but is empty or not a valid integer.
    Unreadable,
}

/// Read `<dir>/pid` and check whether the named process is alive.
pub fn check(dir: &Path) -> PidStatus {
    let path = dir.join("pid");
    let Ok(text) = std::fs::read_to_string(&path) else {
        return PidStatus::Absent;
    };
    let Ok(pid) = text.trim().parse::<i32>() else {
        tracing::error!(path = %path.display(), contents = %text, "pid file is empty or not an integer");
        return PidStatus::Unreadable;
    };
    if process_exists(pid) {
        PidStatus::Live(pid)
    } else {
        PidStatus::Stale(pid)
    }
}

fn process_exists(pid: i32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(test)]
#[path = "pid_tests.rs"]
mod tests;
