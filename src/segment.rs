// SPDX-FileCopyrightText: 2025-2026 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Size-then-map shared memory segments with inode-based staleness checks.
//!
//! A [`Segment`] is a memory mapping of a fixed-size file, page-aligned,
//! with `MAP_SHARED` semantics so every process that maps the same file
//! observes the same bytes. Segments never reallocate: size is fixed at
//! creation.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use crate::error::{Error, Result};

fn page_size() -> usize {
    let sz = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if sz <= 0 { 4096 } else { sz as usize }
}

fn page_align(size: usize) -> usize {
    let page = page_size();
    size.div_ceil(page) * page
}

/// Identifies the file backing a mapping, for staleness detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Identity {
    dev: u64,
    ino: u64,
}

fn stat_identity(file: &File) -> io::Result<Identity> {
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::fstat(file.as_raw_fd(), &mut st) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(Identity {
        dev: st.st_dev as u64,
        ino: st.st_ino as u64,
    })
}

/// A mapped shared-memory segment backed by a regular file.
///
/// Dropping the segment unmaps the memory; the backing file is left in
/// place (its lifecycle is owned by the flow manager / GC, not by the
/// mapping).
pub struct Segment {
    ptr: NonNull<u8>,
    len: usize,
    writable: bool,
    path: PathBuf,
    identity: Identity,
}

// SAFETY: the mapping is `MAP_SHARED`; concurrent access across threads and
// processes is the entire point of this type. All internal mutation goes
// through atomics placed by the caller (see `layout`).
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

impl Segment {
    /// Creates a new segment file, truncated to `size` bytes (rounded up to
    /// a page), and maps it read-write. Fails with [`Error::AlreadyExists`]
    /// if the file exists and `exclusive` is true.
    pub fn create(path: &Path, size: usize, exclusive: bool, prefer_huge_pages: bool) -> Result<Self> {
        let mapped_len = page_align(size.max(1));
        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true);
        if exclusive {
            options.custom_flags(libc::O_EXCL);
        }
        let file = options.open(path).map_err(Error::Io)?;
        file.set_len(mapped_len as u64).map_err(Error::Io)?;
        Self::map(file, path, mapped_len, true, prefer_huge_pages)
    }

    /// Opens an existing segment read-only.
    pub fn open_ro(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).open(path).map_err(Error::Io)?;
        let len = file.metadata().map_err(Error::Io)?.len() as usize;
        Self::map(file, path, len, false, false)
    }

    /// Opens an existing segment read-write.
    pub fn open_rw(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(Error::Io)?;
        let len = file.metadata().map_err(Error::Io)?.len() as usize;
        Self::map(file, path, len, true, false)
    }

    fn map(file: File, path: &Path, len: usize, writable: bool, prefer_huge_pages: bool) -> Result<Self> {
        let identity = stat_identity(&file).map_err(Error::Io)?;
        let prot = if writable {
            libc::PROT_READ | libc::PROT_WRITE
        } else {
            libc::PROT_READ
        };
        // Huge pages are an optimization only; fall back to a regular
        // mapping whenever the hugetlbfs request fails.
        let mut addr = if prefer_huge_pages {
            try_mmap(&file, len, prot, true)
        } else {
            libc::MAP_FAILED
        };
        if addr == libc::MAP_FAILED {
            addr = try_mmap(&file, len, prot, false);
        }
        if addr == libc::MAP_FAILED {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        let ptr = NonNull::new(addr as *mut u8)
            .ok_or_else(|| Error::internal("mmap returned a null pointer"))?;
        Ok(Self {
            ptr,
            len,
            writable,
            path: path.to_path_buf(),
            identity,
        })
    }

    /// Re-stats the backing path; returns an error if the file is gone or
    /// has been recreated (different inode) since this segment was mapped.
    pub fn revalidate(&self) -> Result<()> {
        let file = File::open(&self.path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                Error::Stale(self.path.display().to_string())
            } else {
                Error::Io(e)
            }
        })?;
        let identity = stat_identity(&file).map_err(Error::Io)?;
        if identity != self.identity {
            return Err(Error::Stale(self.path.display().to_string()));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw pointer to the start of the mapping.
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Raw mutable pointer to the start of the mapping. Caller must ensure
    /// the segment was mapped read-write.
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

fn try_mmap(file: &File, len: usize, prot: libc::c_int, huge: bool) -> *mut libc::c_void {
    let mut flags = libc::MAP_SHARED;
    if huge {
        flags |= libc::MAP_HUGETLB;
    }
    unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            prot,
            flags,
            file.as_raw_fd(),
            0,
        )
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("mxl_segment_test_{name}_{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn create_then_open_rw_round_trips_bytes() {
        let path = temp_path("create_open");
        let seg = Segment::create(&path, 256, true, false).unwrap();
        assert!(seg.len() >= 256);
        unsafe {
            *seg.as_mut_ptr() = 0xAB;
        }
        drop(seg);

        let reopened = Segment::open_rw(&path).unwrap();
        assert_eq!(unsafe { *reopened.as_ptr() }, 0xAB);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn exclusive_create_fails_on_existing_file() {
        let path = temp_path("exclusive");
        let _first = Segment::create(&path, 64, true, false).unwrap();
        let second = Segment::create(&path, 64, true, false);
        assert!(second.is_err());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn revalidate_detects_recreation() {
        let path = temp_path("revalidate");
        let seg = Segment::create(&path, 64, true, false).unwrap();
        seg.revalidate().unwrap();

        std::fs::remove_file(&path).unwrap();
        Segment::create(&path, 64, true, false).unwrap();

        assert!(matches!(seg.revalidate(), Err(Error::Stale(_))));
        std::fs::remove_file(&path).unwrap();
    }
}
