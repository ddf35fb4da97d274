// SPDX-FileCopyrightText: 2025-2026 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Generic flow handles and metadata.
//!
//! [`FlowWriter`] and [`FlowReader`] are the type-erased handles returned by
//! [`crate::Instance::create_flow_writer`]/[`crate::Instance::create_flow_reader`].
//! Callers convert them to a typed writer/reader ([`crate::GrainWriter`] /
//! [`crate::SamplesWriter`] or their reader counterparts) once the flow's
//! [`DataFormat`] is known, mirroring the `FlowKind` tagged-variant design
//! note in `spec.md` §9 rather than a polymorphic class hierarchy.

pub use crate::layout::DataFormat;

use std::cell::Cell;
use std::sync::Arc;

use crate::clock::Rational;
use crate::error::{Error, Result};
use crate::grain::{reader::GrainReader, writer::GrainWriter};
use crate::instance::InstanceContext;
use crate::layout::FlowKind;
use crate::manager::FlowState;
use crate::samples::{reader::SamplesReader, writer::SamplesWriter};

/// Static configuration of a flow, fixed at creation time (`spec.md` §3).
pub struct FlowConfigInfo {
    pub(crate) flow: Arc<FlowState>,
}

impl FlowConfigInfo {
    pub fn id(&self) -> uuid::Uuid {
        self.flow.id
    }

    pub fn data_format(&self) -> DataFormat {
        self.flow.header().data_format()
    }

    pub fn is_discrete_flow(&self) -> bool {
        self.flow.header().kind().is_discrete()
    }

    /// Grain rate (discrete) or sample rate (continuous).
    pub fn rate(&self) -> Rational {
        self.flow.header().rate()
    }

    pub fn grain_rate(&self) -> Result<Rational> {
        if !self.is_discrete_flow() {
            return Err(Error::invalid_argument(
                "grain rate is only relevant for discrete flows",
            ));
        }
        Ok(self.rate())
    }

    pub fn sample_rate(&self) -> Result<Rational> {
        if self.is_discrete_flow() {
            return Err(Error::invalid_argument(
                "sample rate is only relevant for continuous flows",
            ));
        }
        Ok(self.rate())
    }

    pub fn kind(&self) -> FlowKind {
        self.flow.header().kind()
    }
}

/// Dynamic runtime state of a flow: what changes as data is written and
/// read (`spec.md` §3, §4.G `[ADD] get_runtime_info`).
pub struct FlowRuntimeInfo {
    /// The flow's most recently completed index, or
    /// [`crate::layout::NO_HEAD`] if nothing has been committed yet.
    pub head_index: u64,
    pub last_write_time: u64,
    pub writer_ref_count: u32,
}

impl FlowRuntimeInfo {
    pub(crate) fn snapshot(flow: &FlowState) -> Self {
        use std::sync::atomic::Ordering;
        let header = flow.header();
        Self {
            head_index: header.head_index.load(Ordering::Acquire),
            last_write_time: header.last_write_time.load(Ordering::Acquire),
            writer_ref_count: header.writer_ref_count.load(Ordering::Acquire),
        }
    }
}

/// Type-erased writer handle, convertible to [`GrainWriter`] or
/// [`SamplesWriter`] once the caller knows (or checks) the flow's format.
pub struct FlowWriter {
    pub(crate) context: Arc<InstanceContext>,
    pub(crate) flow: Arc<FlowState>,
    released: Cell<bool>,
}

impl FlowWriter {
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

    pub fn is_discrete_flow(&self) -> bool {
        self.flow.header().kind().is_discrete()
    }

    /// Converts to a [`GrainWriter`] for video/data flows.
    ///
    /// This attach is handed off to the typed writer, which releases it on
    /// its own drop; marking `released` here stops this handle's `Drop`
    /// from also releasing it.
    pub fn to_grain_writer(self) -> Result<GrainWriter> {
        if !self.is_discrete_flow() {
            return Err(Error::IncompatibleFlow(
                "flow is continuous, use to_samples_writer".into(),
            ));
        }
        self.released.set(true);
        Ok(GrainWriter::new(self.context.clone(), self.flow.clone()))
    }

    /// Converts to a [`SamplesWriter`] for audio flows.
    pub fn to_samples_writer(self) -> Result<SamplesWriter> {
        if self.is_discrete_flow() {
            return Err(Error::IncompatibleFlow(
                "flow is discrete, use to_grain_writer".into(),
            ));
        }
        self.released.set(true);
        Ok(SamplesWriter::new(self.context.clone(), self.flow.clone()))
    }

    pub fn get_runtime_info(&self) -> FlowRuntimeInfo {
        FlowRuntimeInfo::snapshot(&self.flow)
    }

    /// Explicitly releases this handle (`spec.md` §6: `Writer: ..., release`).
    /// A no-op if this id was already released by every outstanding handle.
    pub fn release(&self) -> Result<()> {
        if self.released.replace(true) {
            return Ok(());
        }
        self.context.manager.release_flow_writer(self.flow.id)
    }
}

impl Drop for FlowWriter {
    fn drop(&mut self) {
        if !self.released.get()
            && let Err(e) = self.context.manager.release_flow_writer(self.flow.id)
        {
            tracing::error!(error = %e, "failed to release flow writer on drop");
        }
    }
}

/// Type-erased reader handle, convertible to [`GrainReader`] or
/// [`SamplesReader`].
pub struct FlowReader {
    pub(crate) context: Arc<InstanceContext>,
    pub(crate) flow: Arc<FlowState>,
    released: Cell<bool>,
}

impl FlowReader {
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

    pub fn is_discrete_flow(&self) -> bool {
        self.flow.header().kind().is_discrete()
    }

    pub fn to_grain_reader(self) -> Result<GrainReader> {
        if !self.is_discrete_flow() {
            return Err(Error::IncompatibleFlow(
                "flow is continuous, use to_samples_reader".into(),
            ));
        }
        self.released.set(true);
        Ok(GrainReader::new(self.context.clone(), self.flow.clone()))
    }

    pub fn to_samples_reader(self) -> Result<SamplesReader> {
        if self.is_discrete_flow() {
            return Err(Error::IncompatibleFlow(
                "flow is discrete, use to_grain_reader".into(),
            ));
        }
        self.released.set(true);
        Ok(SamplesReader::new(self.context.clone(), self.flow.clone()))
    }

    pub fn get_runtime_info(&self) -> FlowRuntimeInfo {
        FlowRuntimeInfo::snapshot(&self.flow)
    }

    pub fn release(&self) -> Result<()> {
        if self.released.replace(true) {
            return Ok(());
        }
        self.context.manager.release_flow_reader(self.flow.id)
    }
}

impl Drop for FlowReader {
    fn drop(&mut self) {
        if !self.released.get()
            && let Err(e) = self.context.manager.release_flow_reader(self.flow.id)
        {
            tracing::error!(error = %e, "failed to release flow reader on drop");
        }
    }
}
