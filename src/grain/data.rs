// SPDX-FileCopyrightText: 2025-2026 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Zero-copy and owned views of grain payloads.

use std::sync::Arc;

use crate::layout::CellHeader;
use crate::manager::FlowState;

/// A zero-copy view of one committed (or partially committed) grain.
///
/// Borrows directly from the flow's shared mapping; valid for as long as
/// the view is held, independent of the [`crate::GrainReader`] that
/// produced it (it holds its own clone of the mapping).
pub struct GrainView {
    flow: Arc<FlowState>,
    cell_index: u64,
    grain_index: u64,
    grain_timestamp: u64,
    committed_size: u32,
    valid_slices: u32,
    total_slices: u32,
    flags: u32,
    payload_location: u32,
    device_index: i32,
}

impl GrainView {
    pub(crate) fn new(
        flow: Arc<FlowState>,
        cell_index: u64,
        grain_index: u64,
        cell: &CellHeader,
    ) -> Self {
        use std::sync::atomic::Ordering;
        Self {
            flow,
            cell_index,
            grain_index,
            grain_timestamp: cell.grain_timestamp.load(Ordering::Acquire),
            committed_size: cell.committed_size.load(Ordering::Acquire),
            valid_slices: cell.valid_slices.load(Ordering::Acquire),
            total_slices: cell.total_slices.load(Ordering::Acquire),
            flags: cell.flags.load(Ordering::Acquire),
            payload_location: cell.payload_location.load(Ordering::Acquire),
            device_index: cell.device_index.load(Ordering::Acquire),
        }
    }

    pub fn grain_index(&self) -> u64 {
        self.grain_index
    }

    pub fn grain_timestamp(&self) -> u64 {
        self.grain_timestamp
    }

    pub fn committed_size(&self) -> usize {
        self.committed_size as usize
    }

    pub fn valid_slices(&self) -> u32 {
        self.valid_slices
    }

    pub fn total_slices(&self) -> u32 {
        self.total_slices
    }

    pub fn is_complete(&self) -> bool {
        self.total_slices > 0 && self.valid_slices >= self.total_slices
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn payload_location(&self) -> u32 {
        self.payload_location
    }

    pub fn device_index(&self) -> i32 {
        self.device_index
    }

    /// The payload bytes written so far, `[0, committed_size)`.
    pub fn payload(&self) -> &[u8] {
        let ptr = unsafe {
            self.flow
                .cell_ptr(self.cell_index)
                .add(crate::layout::CELL_HEADER_SIZE)
        };
        unsafe { std::slice::from_raw_parts(ptr, self.committed_size as usize) }
    }
}

/// An owned copy of a [`GrainView`], detached from the shared mapping.
#[derive(Debug, Clone)]
pub struct OwnedGrainData {
    pub grain_index: u64,
    pub grain_timestamp: u64,
    pub valid_slices: u32,
    pub total_slices: u32,
    pub flags: u32,
    pub payload: Vec<u8>,
}

impl From<GrainView> for OwnedGrainData {
    fn from(view: GrainView) -> Self {
        Self {
            grain_index: view.grain_index,
            grain_timestamp: view.grain_timestamp,
            valid_slices: view.valid_slices,
            total_slices: view.total_slices,
            flags: view.flags,
            payload: view.payload().to_vec(),
        }
    }
}
