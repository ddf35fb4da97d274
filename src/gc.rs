// SPDX-FileCopyrightText: 2025-2026 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Domain garbage collection (`spec.md` §4.H).
//!
//! A flow is collectible once no writer has it attached
//! (`writer_ref_count == 0`) and its `access` sentinel has not been
//! touched within `idle_window`. Collection is rename-then-unlink so a
//! reader racing to open the flow either succeeds against the pre-rename
//! name (and `Segment::revalidate` later reports it stale) or fails
//! `NotFound` cleanly; it never observes a half-removed directory.

use std::path::Path;
use std::time::Duration;

use crate::domain;
use crate::error::{Error, Result};
use crate::layout::FlowHeader;
use crate::segment::Segment;

/// Scans `domain` for flows idle longer than `idle_window` with no
/// attached writer, and removes them. Returns the number of flows removed.
pub fn garbage_collect(domain: &Path, idle_window: Duration) -> Result<usize> {
    let mut removed = 0;
    for (id, dir) in domain::list_flow_dirs(domain).map_err(Error::Io)? {
        match collect_one(&dir, idle_window) {
            Ok(true) => removed += 1,
            Ok(false) => {}
            Err(e) => tracing::warn!(flow = %id, error = %e, "skipping flow during garbage collection"),
        }
    }
    Ok(removed)
}

fn collect_one(dir: &Path, idle_window: Duration) -> Result<bool> {
    let data_path = domain::data_path(dir);
    let segment = match Segment::open_ro(&data_path) {
        Ok(s) => s,
        Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    let header = unsafe { FlowHeader::from_ptr(segment.as_ptr()) };
    header.validate()?;
    if header
        .writer_ref_count
        .load(std::sync::atomic::Ordering::Acquire)
        != 0
    {
        return Ok(false);
    }

    let access_path = domain::access_path(dir);
    let mtime = std::fs::metadata(&access_path).and_then(|m| m.modified()).map_err(Error::Io)?;
    let age = std::time::SystemTime::now()
        .duration_since(mtime)
        .unwrap_or_default();
    if age < idle_window {
        return Ok(false);
    }

    drop(segment);

    let mut trash_name = dir.file_name().unwrap_or_default().to_os_string();
    trash_name.push(".deleting");
    let trash_path = dir.with_file_name(trash_name);
    match std::fs::rename(dir, &trash_path) {
        Ok(()) => {}
        // Another instance's GC won the race; nothing left for us to do.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(Error::Io(e)),
    }
    std::fs::remove_dir_all(&trash_path).map_err(Error::Io)?;
    Ok(true)
}
