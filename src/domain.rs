// SPDX-FileCopyrightText: 2025-2026 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Filesystem layout of a domain directory (`spec.md` §3, §6).
//!
//! ```text
//! <domain>/<uuid>.mxl-flow/
//!     data          # binary, sized per §4.D, mapped by all participants
//!     <uuid>.json   # parsed externally, opaque to core
//!     access        # empty; mtime touched on every reader acquisition
//! ```

use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const FLOW_DIR_SUFFIX: &str = ".mxl-flow";
pub const DATA_FILE: &str = "data";
pub const ACCESS_FILE: &str = "access";

pub fn flow_dir(domain: &Path, id: Uuid) -> PathBuf {
    domain.join(format!("{id}{FLOW_DIR_SUFFIX}"))
}

pub fn data_path(flow_dir: &Path) -> PathBuf {
    flow_dir.join(DATA_FILE)
}

pub fn json_path(flow_dir: &Path, id: Uuid) -> PathBuf {
    flow_dir.join(format!("{id}.json"))
}

pub fn access_path(flow_dir: &Path) -> PathBuf {
    flow_dir.join(ACCESS_FILE)
}

/// Touches the `access` sentinel's mtime, creating it if absent. Called on
/// every successful reader acquisition (`spec.md` §3 invariant 6).
pub fn touch_access(flow_dir: &Path) -> std::io::Result<()> {
    let path = access_path(flow_dir);
    let now = std::time::SystemTime::now();
    match std::fs::File::open(&path) {
        Ok(file) => {
            file.set_modified(now)?;
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            std::fs::File::create(&path)?;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Parses a directory name of the form `<uuid>.mxl-flow` back into the
/// flow's identifier. Returns `None` for anything else found in the domain.
pub fn parse_flow_dir_name(name: &str) -> Option<Uuid> {
    let stem = name.strip_suffix(FLOW_DIR_SUFFIX)?;
    Uuid::parse_str(stem).ok()
}

/// Lists every `<uuid>.mxl-flow` entry directly under `domain`.
pub fn list_flow_dirs(domain: &Path) -> std::io::Result<Vec<(Uuid, PathBuf)>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(domain)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(id) = parse_flow_dir_name(name) {
            out.push((id, entry.path()));
        }
    }
    Ok(out)
}
