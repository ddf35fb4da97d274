// SPDX-FileCopyrightText: 2025-2026 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Continuous flow writer: opens, fills, and commits sample batches
//! (`spec.md` §4.F).

use std::cell::Cell;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::error::{Error, Result};
use crate::instance::InstanceContext;
use crate::layout::{ContinuousGeom, FlowKind, NO_HEAD};
use crate::manager::FlowState;
use crate::samples::write_access::SamplesWriteAccess;

pub struct SamplesWriter {
    context: Arc<InstanceContext>,
    flow: Arc<FlowState>,
    released: Cell<bool>,
}

impl SamplesWriter {
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

    fn geom(&self) -> ContinuousGeom {
        match self.flow.header().kind() {
            FlowKind::Continuous(geom) => geom,
            FlowKind::Discrete(_) => unreachable!("FlowWriter::to_samples_writer checked this"),
        }
    }

    /// Opens a write session for `sample_count` samples starting at
    /// `start_index`, across every channel.
    ///
    /// Before the first batch is ever committed (`head_index == NO_HEAD`),
    /// any `start_index` is accepted. After that, `start_index` must equal
    /// the flow's current aggregate head (the next batch in sequence): an
    /// earlier index would overwrite bytes a reader may still observe
    /// (`OutOfRangeTooLate`), a later one would leave a gap
    /// (`OutOfRangeTooEarly`). `sample_count` must not exceed the channel
    /// buffer's capacity.
    pub fn open_samples(&self, start_index: u64, sample_count: u64) -> Result<SamplesWriteAccess> {
        let geom = self.geom();
        if sample_count == 0 || sample_count > geom.buffer_length {
            return Err(Error::invalid_argument(format!(
                "sample_count {sample_count} must be in (0, buffer_length={}]",
                geom.buffer_length
            )));
        }

        let header = self.flow.header();
        let head = header.head_index.load(Ordering::Acquire);
        if head != NO_HEAD && start_index != head {
            if start_index < head {
                return Err(Error::OutOfRangeTooLate);
            }
            return Err(Error::OutOfRangeTooEarly);
        }

        // Overwrite-before-consume is a warning, not a hard error
        // (`spec.md` §4.F): the protocol tolerates it, but a lagging reader
        // will see `OutOfRangeTooLate` once it catches up.
        if head != NO_HEAD {
            let window_start = (start_index + sample_count).saturating_sub(geom.buffer_length);
            if window_start > head {
                tracing::warn!(
                    start_index,
                    sample_count,
                    buffer_length = geom.buffer_length,
                    "batch overwrites samples not yet consumed by any reader"
                );
            }
        }

        Ok(SamplesWriteAccess::new(self.flow.clone(), start_index, sample_count, geom))
    }

    pub fn get_runtime_info(&self) -> crate::flow::FlowRuntimeInfo {
        crate::flow::FlowRuntimeInfo::snapshot(&self.flow)
    }

    /// Explicitly releases this writer. A no-op if already released.
    pub fn release(&self) -> Result<()> {
        if self.released.replace(true) {
            return Ok(());
        }
        self.context.manager.release_flow_writer(self.flow.id)
    }
}

impl Drop for SamplesWriter {
    fn drop(&mut self) {
        if !self.released.get()
            && let Err(e) = self.context.manager.release_flow_writer(self.flow.id)
        {
            tracing::error!(error = %e, "failed to release samples writer on drop");
        }
    }
}
