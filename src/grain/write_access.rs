// SPDX-FileCopyrightText: 2025-2026 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! RAII write session for a single grain (`spec.md` §4.E, §9).
//!
//! Exclusively owns the right to mutate one ring cell until [`commit`] or
//! [`cancel`]. Dropping without an explicit commit cancels the write:
//! readers never observe the partial bytes (`spec.md` §9 "RAII write
//! sessions").
//!
//! [`commit`]: GrainWriteAccess::commit
//! [`cancel`]: GrainWriteAccess::cancel

use std::cell::Cell;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::error::Result;
use crate::layout::{CellHeader, NO_HEAD};
use crate::manager::FlowState;
use crate::wait;

/// Parameters for [`GrainWriteAccess::commit`], mirroring the commit
/// payload in `spec.md` §4.E.
#[derive(Debug, Clone, Copy)]
pub struct CommitInfo {
    pub committed_size: usize,
    pub valid_slices: u32,
    pub total_slices: u32,
    pub flags: u32,
}

impl CommitInfo {
    /// A commit that completes the grain in a single slice.
    pub fn complete(committed_size: usize) -> Self {
        Self {
            committed_size,
            valid_slices: 1,
            total_slices: 1,
            flags: 0,
        }
    }
}

pub struct GrainWriteAccess {
    flow: Arc<FlowState>,
    grain_index: u64,
    cell_index: u64,
    grain_size: usize,
    committed: Cell<bool>,
}

impl GrainWriteAccess {
    pub(crate) fn new(flow: Arc<FlowState>, grain_index: u64, cell_index: u64, grain_size: usize) -> Self {
        Self {
            flow,
            grain_index,
            cell_index,
            grain_size,
            committed: Cell::new(false),
        }
    }

    pub fn grain_index(&self) -> u64 {
        self.grain_index
    }

    /// Total payload capacity of this cell.
    pub fn grain_size(&self) -> usize {
        self.grain_size
    }

    fn cell(&self) -> &CellHeader {
        unsafe { CellHeader::from_ptr(self.flow.cell_ptr(self.cell_index)) }
    }

    /// Mutable access to the cell's payload bytes, `[0, grain_size)`.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let ptr = unsafe {
            self.flow
                .cell_mut_ptr(self.cell_index)
                .add(crate::layout::CELL_HEADER_SIZE)
        };
        unsafe { std::slice::from_raw_parts_mut(ptr, self.grain_size) }
    }

    /// The number of slices the caller most recently declared as the total
    /// for this grain (0 until a partial commit has named one).
    pub fn total_slices(&self) -> u32 {
        self.cell().total_slices.load(Ordering::Relaxed)
    }

    /// Publishes `info` for this cell. Writes metadata with release
    /// ordering, then advances `head_index` (only if this commit completes
    /// the grain: `valid_slices >= total_slices`), then bumps `wait_word`
    /// and wakes every waiter (`spec.md` §4.E, §4.C).
    ///
    /// A commit with `valid_slices < total_slices` is a *partial* commit:
    /// waiters wake and observe the new `committed_size`/`valid_slices`,
    /// but `head_index` is not advanced. The next commit on the same index
    /// completes it.
    pub fn commit(self, info: CommitInfo) -> Result<()> {
        let header = self.flow.header();
        let cell = self.cell();

        cell.committed_size
            .store(info.committed_size as u32, Ordering::Release);
        cell.valid_slices.store(info.valid_slices, Ordering::Release);
        cell.total_slices.store(info.total_slices, Ordering::Release);
        cell.flags.store(info.flags, Ordering::Release);

        header
            .last_write_time
            .store(crate::clock::now(), Ordering::Release);

        if info.total_slices > 0 && info.valid_slices >= info.total_slices {
            let mut current = header.head_index.load(Ordering::Acquire);
            loop {
                if current != NO_HEAD && self.grain_index <= current {
                    break;
                }
                match header.head_index.compare_exchange_weak(
                    current,
                    self.grain_index,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => break,
                    Err(actual) => current = actual,
                }
            }
        }

        header.wait_word.fetch_add(1, Ordering::Release);
        wait::wake_all(&header.wait_word);

        self.committed.set(true);
        Ok(())
    }

    /// Convenience for a full, single-slice commit of `committed_size`
    /// bytes.
    pub fn commit_complete(self, committed_size: usize) -> Result<()> {
        self.commit(CommitInfo::complete(committed_size))
    }

    /// Discards this session without publishing. Readers never observe
    /// partial writes made through it. Equivalent to dropping the session.
    pub fn cancel(self) {
        drop(self)
    }
}

impl Drop for GrainWriteAccess {
    fn drop(&mut self) {
        if !self.committed.get() {
            tracing::debug!(grain_index = self.grain_index, "grain write session cancelled");
        }
    }
}
