// SPDX-FileCopyrightText: 2025-2026 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Instance: binds a domain directory to the flow manager and exposes the
//! public operations surface (`spec.md` §4.I, §6).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::clock::Rational;
use crate::config::InstanceOptions;
use crate::error::Result;
use crate::flow::{FlowConfigInfo, FlowReader, FlowWriter};
use crate::manager::FlowManager;

/// Shared state behind an [`Instance`], cloned into every handle it hands
/// out so a flow's mapping outlives the `Instance` that created it for as
/// long as any writer/reader handle is still alive.
pub(crate) struct InstanceContext {
    pub(crate) manager: FlowManager,
}

impl Drop for InstanceContext {
    fn drop(&mut self) {
        // `spec.md` §4.G: "on instance destruction, implicitly release all
        // outstanding handles." Handles hold their own `Arc<InstanceContext>`
        // clone, so this only runs once every writer/reader has also been
        // dropped; release_all is therefore a no-op safety net rather than
        // the primary release path in the common case.
        self.manager.release_all();
    }
}

/// A client's binding to one domain directory.
///
/// Cheap to clone (an `Arc` around the flow manager and cache); every writer
/// and reader handle it creates keeps the instance's shared memory mappings
/// alive until the handle itself is dropped, even if the `Instance` value
/// goes out of scope first.
#[derive(Clone)]
pub struct Instance(Arc<InstanceContext>);

impl Instance {
    /// Binds a domain directory, creating it if it does not already exist.
    pub fn new(domain_path: impl AsRef<Path>, options: InstanceOptions) -> Result<Self> {
        let domain_path: PathBuf = domain_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&domain_path).map_err(crate::error::Error::Io)?;
        tracing::debug!(domain = %domain_path.display(), "opened mxl instance");
        Ok(Self(Arc::new(InstanceContext {
            manager: FlowManager::new(domain_path, options),
        })))
    }

    pub fn domain(&self) -> &Path {
        self.0.manager.domain()
    }

    /// `spec.md` §6 `create_flow_writer`. Returns the writer handle, its
    /// static configuration, and whether this call created the flow on
    /// disk (`false` if an existing, matching flow was attached instead).
    pub fn create_flow_writer(&self, descriptor_json: &str) -> Result<(FlowWriter, FlowConfigInfo, bool)> {
        let (flow, _descriptor, created) = self.0.manager.create_flow_writer(descriptor_json)?;
        let config = FlowConfigInfo { flow: flow.clone() };
        let writer = FlowWriter::new(self.0.clone(), flow);
        Ok((writer, config, created))
    }

    /// `spec.md` §6 `create_flow_reader`.
    pub fn create_flow_reader(&self, flow_id: Uuid) -> Result<(FlowReader, FlowConfigInfo)> {
        let flow = self.0.manager.create_flow_reader(flow_id)?;
        let config = FlowConfigInfo { flow: flow.clone() };
        let reader = FlowReader::new(self.0.clone(), flow);
        Ok((reader, config))
    }

    /// Returns the raw descriptor JSON persisted for `flow_id` at creation
    /// time (`SPEC_FULL.md` §4.G `get_flow_def`).
    pub fn get_flow_def(&self, flow_id: Uuid) -> Result<String> {
        self.0.manager.get_flow_def(flow_id)
    }

    /// `spec.md` §6 `Instance: garbage_collect(idle_window)`. Scans this
    /// instance's domain and removes flows with no attached writer whose
    /// `access` sentinel has been untouched longer than `idle_window`.
    /// Returns the number of flows removed.
    pub fn garbage_collect(&self, idle_window: Duration) -> Result<usize> {
        crate::gc::garbage_collect(self.0.manager.domain(), idle_window)
    }

    /// Current TAI time in nanoseconds (`spec.md` §6 `now()`).
    pub fn now(&self) -> u64 {
        crate::clock::now()
    }

    /// `spec.md` §6 `index(rate, t)`.
    pub fn index(&self, timestamp_ns: u64, rate: Rational) -> Result<u64> {
        crate::clock::index(timestamp_ns, rate)
    }

    /// `spec.md` §6 `timestamp(rate, i)`.
    pub fn timestamp(&self, index: u64, rate: Rational) -> Result<u64> {
        crate::clock::timestamp(index, rate)
    }

    /// `spec.md` §6 `ns_until(i, rate)`.
    pub fn ns_until(&self, target_index: u64, rate: Rational) -> Result<u64> {
        crate::clock::ns_until(target_index, rate)
    }

    /// `spec.md` §6 `sleep_for_ns(n)`.
    pub fn sleep_for_ns(&self, ns: u64) {
        crate::clock::sleep_for_ns(ns)
    }

    /// Sleeps until `target_index` is current at `rate`.
    pub fn sleep_until_index(&self, target_index: u64, rate: Rational) -> Result<()> {
        crate::clock::sleep_until_index(target_index, rate)
    }
}
