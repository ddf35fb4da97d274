// SPDX-FileCopyrightText: 2025-2026 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Discrete flow writer: opens, fills, and commits grains (`spec.md` §4.E).

use std::cell::Cell;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::error::{Error, Result};
use crate::grain::write_access::GrainWriteAccess;
use crate::instance::InstanceContext;
use crate::layout::{CellHeader, FlowKind, NO_HEAD};
use crate::manager::FlowState;

pub struct GrainWriter {
    context: Arc<InstanceContext>,
    flow: Arc<FlowState>,
    released: Cell<bool>,
}

impl GrainWriter {
    pub(crate) fn new(context: Arc<InstanceContext>, flow: Arc<FlowState>) -> Self {
        Self {
            context,
            flow,
            released: Cell::new(false),
        }
    }

    pub fn id(&self) -> uuid::Uuid {
        self.flow.id
    }

    fn ring_size(&self) -> u64 {
        match self.flow.header().kind() {
            FlowKind::Discrete(geom) => geom.ring_size,
            FlowKind::Continuous(_) => unreachable!("FlowWriter::to_grain_writer checked this"),
        }
    }

    fn grain_size(&self) -> usize {
        match self.flow.header().kind() {
            FlowKind::Discrete(geom) => geom.grain_size as usize,
            FlowKind::Continuous(_) => unreachable!("FlowWriter::to_grain_writer checked this"),
        }
    }

    /// Opens a write session for `index`.
    ///
    /// Requires `index == head_index + 1` (the next grain in sequence) or
    /// `index` to already be the cell's in-progress (partially committed)
    /// index, so a writer can resume a partial commit. Any other value is
    /// rejected: an index behind `head_index` would require overwriting
    /// data a reader may still observe (`OutOfRangeTooLate`); an index
    /// further ahead than one past `head_index` would skip grains
    /// (`OutOfRangeTooEarly`).
    ///
    /// Before any grain has ever been committed (`head_index == NO_HEAD`),
    /// any starting index is accepted: a writer begins a flow wherever its
    /// clock-derived index lands, not necessarily at zero.
    pub fn open_grain(&self, index: u64) -> Result<GrainWriteAccess> {
        let ring_size = self.ring_size();
        let grain_size = self.grain_size();
        let header = self.flow.header();
        let head = header.head_index.load(Ordering::Acquire);
        let cell_index = index % ring_size;
        let cell = unsafe { CellHeader::from_ptr(self.flow.cell_ptr(cell_index)) };

        let resuming_partial = {
            let existing_index = cell.grain_index.load(Ordering::Acquire);
            let committed = cell.committed_size.load(Ordering::Acquire);
            existing_index == index && (committed as usize) < grain_size
        };

        if head != NO_HEAD && index != head + 1 && !resuming_partial {
            if index <= head {
                return Err(Error::OutOfRangeTooLate);
            }
            return Err(Error::OutOfRangeTooEarly);
        }

        if !resuming_partial {
            cell.grain_timestamp
                .store(crate::clock::timestamp(index, header.rate())?, Ordering::Relaxed);
            cell.committed_size.store(0, Ordering::Relaxed);
            cell.valid_slices.store(0, Ordering::Relaxed);
            cell.total_slices.store(0, Ordering::Relaxed);
            cell.flags.store(0, Ordering::Relaxed);
            // Published last with release ordering: once a reader observes
            // `grain_index == index` via acquire, every other field above
            // is visible (`spec.md` §3 invariant 3, aliasing detection).
            cell.grain_index.store(index, Ordering::Release);
        }

        Ok(GrainWriteAccess::new(
            self.flow.clone(),
            index,
            cell_index,
            grain_size,
        ))
    }

    pub fn get_runtime_info(&self) -> crate::flow::FlowRuntimeInfo {
        crate::flow::FlowRuntimeInfo::snapshot(&self.flow)
    }

    /// Explicitly releases this writer (`spec.md` §6 `Writer: ..., release`).
    /// A no-op if already released.
    pub fn release(&self) -> Result<()> {
        if self.released.replace(true) {
            return Ok(());
        }
        self.context.manager.release_flow_writer(self.flow.id)
    }
}

impl Drop for GrainWriter {
    fn drop(&mut self) {
        if !self.released.get()
            && let Err(e) = self.context.manager.release_flow_writer(self.flow.id)
        {
            tracing::error!(error = %e, "failed to release grain writer on drop");
        }
    }
}
