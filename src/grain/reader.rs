// SPDX-FileCopyrightText: 2025-2026 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Discrete flow reader: waits for and inspects committed grains
//! (`spec.md` §4.E, §4.F).

use std::cell::Cell;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::grain::data::GrainView;
use crate::instance::InstanceContext;
use crate::layout::{CellHeader, FlowKind, NO_HEAD};
use crate::manager::FlowState;
use crate::wait::{self, WaitResult};

pub struct GrainReader {
    context: Arc<InstanceContext>,
    flow: Arc<FlowState>,
    released: Cell<bool>,
}

impl GrainReader {
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
            FlowKind::Continuous(_) => unreachable!("FlowReader::to_grain_reader checked this"),
        }
    }

    /// Non-blocking lookup of grain `index` (`spec.md` §4.E `try_get_grain`).
    ///
    /// - `OutOfRangeTooLate` if `index` has already been overwritten (it
    ///   falls outside the ring's retained window given
    ///   `InstanceOptions::slack`).
    /// - `OutOfRangeTooEarly` if `index` is further ahead of `head_index`
    ///   than `InstanceOptions::lookahead` allows.
    /// - `NotReady` if `index` is within range but not yet committed.
    pub fn try_get_grain(&self, index: u64) -> Result<GrainView> {
        self.flow.segment.revalidate()?;
        let ring_size = self.ring_size();
        let header = self.flow.header();
        let options = self.context.manager.options();
        let cell_index = index % ring_size;
        let cell = unsafe { CellHeader::from_ptr(self.flow.cell_ptr(cell_index)) };

        // A cell already claimed for `index` (fully or partially committed)
        // is observable regardless of where `head_index` sits: a partial
        // commit never advances `head`, so gating on `head` first would make
        // an in-progress grain unobservable (`spec.md` §4.E, §8 scenario 2).
        let observed_index = cell.grain_index.load(Ordering::Acquire);
        if observed_index == index {
            let total_slices = cell.total_slices.load(Ordering::Acquire);
            if total_slices == 0 {
                // Opened but nothing committed yet.
                return Err(Error::NotReady);
            }
            if cell.grain_index.load(Ordering::Acquire) != index {
                return Err(Error::Stale(format!(
                    "grain {index} was overwritten while reading"
                )));
            }
            let view = GrainView::new(self.flow.clone(), cell_index, index, cell);
            if let Err(e) = crate::domain::touch_access(&self.flow.dir) {
                tracing::warn!(error = %e, "failed to touch access sentinel");
            }
            return Ok(view);
        }

        let head = header.head_index.load(Ordering::Acquire);
        if head == NO_HEAD {
            return Err(Error::NotReady);
        }
        let retained_from = head.saturating_sub(ring_size.saturating_sub(options.slack));
        if head >= ring_size && index < retained_from {
            return Err(Error::OutOfRangeTooLate);
        }
        if index > head + options.lookahead {
            return Err(Error::OutOfRangeTooEarly);
        }

        // Cell doesn't hold `index` yet, and it's within range: aliasing or
        // simply not written yet.
        Err(Error::NotReady)
    }

    /// Blocking lookup of grain `index`, waiting up to `timeout` for it to
    /// become ready (`spec.md` §4.E `get_grain`).
    pub fn get_grain(&self, index: u64, timeout: Duration) -> Result<GrainView> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.try_get_grain(index) {
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
            if head != NO_HEAD && head >= index {
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

    /// Explicitly releases this reader (`spec.md` §6 `Reader: ..., release`).
    /// A no-op if already released.
    pub fn release(&self) -> Result<()> {
        if self.released.replace(true) {
            return Ok(());
        }
        self.context.manager.release_flow_reader(self.flow.id)
    }
}

impl Drop for GrainReader {
    fn drop(&mut self) {
        if !self.released.get()
            && let Err(e) = self.context.manager.release_flow_reader(self.flow.id)
        {
            tracing::error!(error = %e, "failed to release grain reader on drop");
        }
    }
}
