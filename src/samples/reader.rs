// SPDX-FileCopyrightText: 2025-2026 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Continuous flow reader: waits for and inspects committed sample batches
//! (`spec.md` §4.F).

use std::cell::Cell;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::instance::InstanceContext;
use crate::layout::{ContinuousGeom, FlowKind, NO_HEAD};
use crate::manager::FlowState;
use crate::samples::data::SamplesView;
use crate::wait::{self, WaitResult};

pub struct SamplesReader {
    context: Arc<InstanceContext>,
    flow: Arc<FlowState>,
    released: Cell<bool>,
}

impl SamplesReader {
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
            FlowKind::Discrete(_) => unreachable!("FlowReader::to_samples_reader checked this"),
        }
    }

    /// Non-blocking lookup of a batch `[start_index, start_index +
    /// sample_count)` (`spec.md` §4.F `try_get_samples`). Same `TooLate` /
    /// `TooEarly` / `NotReady` semantics as [`crate::GrainReader::try_get_grain`].
    pub fn try_get_samples(&self, start_index: u64, sample_count: u64) -> Result<SamplesView> {
        self.flow.segment.revalidate()?;
        let geom = self.geom();
        if sample_count == 0 || sample_count > geom.buffer_length {
            return Err(Error::invalid_argument(format!(
                "sample_count {sample_count} must be in (0, buffer_length={}]",
                geom.buffer_length
            )));
        }

        let header = self.flow.header();
        let options = self.context.manager.options();
        let head = header.head_index.load(Ordering::Acquire);
        if head == NO_HEAD {
            return Err(Error::NotReady);
        }
        let end = start_index + sample_count;

        let retained_from = head.saturating_sub(geom.buffer_length.saturating_sub(options.slack));
        if head >= geom.buffer_length && start_index < retained_from {
            return Err(Error::OutOfRangeTooLate);
        }
        if start_index > head + options.lookahead {
            return Err(Error::OutOfRangeTooEarly);
        }
        if end > head {
            return Err(Error::NotReady);
        }

        let view = SamplesView::new(self.flow.clone(), start_index, sample_count);
        if let Err(e) = crate::domain::touch_access(&self.flow.dir) {
            tracing::warn!(error = %e, "failed to touch access sentinel");
        }
        Ok(view)
    }

    /// Blocking lookup of a batch, waiting up to `timeout` for it to become
    /// fully committed (`spec.md` §4.F `get_samples`).
    pub fn get_samples(&self, start_index: u64, sample_count: u64, timeout: Duration) -> Result<SamplesView> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.try_get_samples(start_index, sample_count) {
                Ok(view) => return Ok(view),
                Err(Error::NotReady) => {}
                Err(e) => return Err(e),
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout);
            }

            let header = self.flow.header();
            let word_before = header.wait_word.load(Ordering::Acquire);
            let head = header.head_index.load(Ordering::Acquire);
            if head != NO_HEAD && head >= start_index + sample_count {
                continue;
            }
            match wait::wait(&header.wait_word, word_before, remaining) {
                WaitResult::Timeout => return Err(Error::Timeout),
                WaitResult::Interrupted => return Err(Error::Interrupted),
                WaitResult::Woken => {}
            }
        }
    }

    pub fn get_runtime_info(&self) -> crate::flow::FlowRuntimeInfo {
        crate::flow::FlowRuntimeInfo::snapshot(&self.flow)
    }

    /// Explicitly releases this reader. A no-op if already released.
    pub fn release(&self) -> Result<()> {
        if self.released.replace(true) {
            return Ok(());
        }
        self.context.manager.release_flow_reader(self.flow.id)
    }
}

impl Drop for SamplesReader {
    fn drop(&mut self) {
        if !self.released.get()
            && let Err(e) = self.context.manager.release_flow_reader(self.flow.id)
        {
            tracing::error!(error = %e, "failed to release samples reader on drop");
        }
    }
}
