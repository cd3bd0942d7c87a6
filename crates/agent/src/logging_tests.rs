// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn resolve_file_sink_splits_directory_and_name() {
    let (dir, name) = resolve_file_sink(Path::new("/var/log/pxp-agent/pxp-agent.log"));
    assert_eq!(dir, PathBuf::from("/var/log/pxp-agent"));
    assert_eq!(name, "pxp-agent.log");
}

#[test]
fn resolve_file_sink_falls_back_for_bare_filename() {
    let (dir, name) = resolve_file_sink(Path::new("pxp-agent.log"));
    assert_eq!(dir, PathBuf::from("."));
    assert_eq!(name, "pxp-agent.log");
}
