// SPDX-FileCopyrightText: 2025-2026 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Per-instance flow cache and reference counting (`spec.md` §4.G).
//!
//! A [`FlowManager`] caches at most one writer handle and one reader handle
//! per flow id per instance. Repeated `create_flow_writer`/`create_flow_reader`
//! calls for the same id return the cached handle and bump an intra-process
//! counter; only the first attach and the last release touch the shared,
//! cross-process `writer_ref_count` in the flow header.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::Ordering;

use uuid::Uuid;

use crate::config::InstanceOptions;
use crate::domain;
use crate::error::{Error, Result};
use crate::flowdef::{Descriptor, FlowDef};
use crate::layout::{FlowHeader, FlowKind};
use crate::segment::Segment;

/// Shared, mapped state for one flow. Every writer/reader handle for a given
/// id (within this process) holds an `Arc<FlowState>` pointing at the same
/// mapping.
pub(crate) struct FlowState {
    pub id: Uuid,
    pub dir: PathBuf,
    pub segment: Segment,
}

impl FlowState {
    pub fn header(&self) -> &FlowHeader {
        unsafe { FlowHeader::from_ptr(self.segment.as_ptr()) }
    }

    /// Pointer to the start of cell `cell_index` in a discrete flow's ring.
    pub fn cell_ptr(&self, cell_index: u64) -> *const u8 {
        let header = self.header();
        let offset = header.payload_offset() + cell_index as usize * header.cell_stride();
        unsafe { self.segment.as_ptr().add(offset) }
    }

    pub fn cell_mut_ptr(&self, cell_index: u64) -> *mut u8 {
        self.cell_ptr(cell_index) as *mut u8
    }

    /// Pointer to the start of channel `channel`'s region in a continuous
    /// flow (channel header followed by its circular sample buffer).
    pub fn channel_ptr(&self, channel: u64) -> *const u8 {
        let header = self.header();
        let offset = header.payload_offset() + channel as usize * header.cell_stride();
        unsafe { self.segment.as_ptr().add(offset) }
    }

    pub fn channel_mut_ptr(&self, channel: u64) -> *mut u8 {
        self.channel_ptr(channel) as *mut u8
    }
}

struct WriterSlot {
    flow: std::sync::Arc<FlowState>,
    local_count: u32,
}

struct ReaderSlot {
    flow: std::sync::Arc<FlowState>,
    local_count: u32,
}

#[derive(Default)]
struct State {
    writers: HashMap<Uuid, WriterSlot>,
    readers: HashMap<Uuid, ReaderSlot>,
}

pub(crate) struct FlowManager {
    domain: PathBuf,
    options: InstanceOptions,
    state: Mutex<State>,
}

impl FlowManager {
    pub fn new(domain: PathBuf, options: InstanceOptions) -> Self {
        Self {
            domain,
            options,
            state: Mutex::new(State::default()),
        }
    }

    pub fn domain(&self) -> &Path {
        &self.domain
    }

    pub fn options(&self) -> &InstanceOptions {
        &self.options
    }

    /// `spec.md` §4.G `create_flow_writer`. Returns the flow state, the
    /// parsed descriptor, and whether this call created the flow on disk.
    pub fn create_flow_writer(
        &self,
        descriptor_json: &str,
    ) -> Result<(std::sync::Arc<FlowState>, Descriptor, bool)> {
        let def = FlowDef::parse(descriptor_json)?;
        let descriptor = def.resolve(self.options.default_ring_size)?;

        let mut state = self.state.lock().unwrap();
        if let Some(slot) = state.writers.get_mut(&descriptor.id) {
            // Repeated requests for the same id from this instance share one
            // attach to the shared `writer_ref_count`; only the intra-process
            // counter grows (`spec.md` §4.G).
            slot.local_count += 1;
            return Ok((slot.flow.clone(), descriptor, false));
        }

        let dir = domain::flow_dir(&self.domain, descriptor.id);
        let data_path = domain::data_path(&dir);

        let created_dir = match std::fs::create_dir(&dir) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => false,
            Err(e) => return Err(Error::Io(e)),
        };

        let (segment, created) = if created_dir {
            let size = match descriptor.kind {
                FlowKind::Discrete(geom) => crate::layout::discrete_file_size(geom),
                FlowKind::Continuous(geom) => crate::layout::continuous_file_size(geom),
            };
            let segment = Segment::create(&data_path, size, true, self.options.prefer_huge_pages)?;
            unsafe {
                FlowHeader::initialize(
                    segment.as_mut_ptr(),
                    descriptor.data_format,
                    descriptor.rate,
                    descriptor.kind,
                );
            }
            std::fs::write(domain::json_path(&dir, descriptor.id), descriptor_json)
                .map_err(Error::Io)?;
            domain::touch_access(&dir).map_err(Error::Io)?;
            (segment, true)
        } else {
            let segment = Segment::open_rw(&data_path)?;
            let header = unsafe { FlowHeader::from_ptr(segment.as_ptr()) };
            header.validate()?;
            validate_matches(header, &descriptor)?;
            header.writer_ref_count.fetch_add(1, Ordering::AcqRel);
            (segment, false)
        };

        let flow = std::sync::Arc::new(FlowState {
            id: descriptor.id,
            dir,
            segment,
        });
        state.writers.insert(
            descriptor.id,
            WriterSlot {
                flow: flow.clone(),
                local_count: 1,
            },
        );
        Ok((flow, descriptor, created))
    }

    /// `spec.md` §4.G `create_flow_reader`.
    pub fn create_flow_reader(&self, flow_id: Uuid) -> Result<std::sync::Arc<FlowState>> {
        let mut state = self.state.lock().unwrap();
        if let Some(slot) = state.readers.get_mut(&flow_id) {
            slot.local_count += 1;
            let flow = slot.flow.clone();
            drop(state);
            domain::touch_access(&flow.dir).map_err(Error::Io)?;
            return Ok(flow);
        }

        let dir = domain::flow_dir(&self.domain, flow_id);
        if !dir.is_dir() {
            return Err(Error::NotFound(flow_id.to_string()));
        }
        let data_path = domain::data_path(&dir);
        let segment = Segment::open_ro(&data_path)?;
        let header = unsafe { FlowHeader::from_ptr(segment.as_ptr()) };
        header.validate()?;

        let flow = std::sync::Arc::new(FlowState {
            id: flow_id,
            dir: dir.clone(),
            segment,
        });
        state.readers.insert(
            flow_id,
            ReaderSlot {
                flow: flow.clone(),
                local_count: 1,
            },
        );
        drop(state);
        domain::touch_access(&dir).map_err(Error::Io)?;
        Ok(flow)
    }

    /// Reads back the `<uuid>.json` sidecar persisted at creation time.
    /// `spec.md` §4.D/§6 lists it as part of the domain layout; exposed for
    /// tooling and tests even though it sits outside the hot path.
    pub fn get_flow_def(&self, flow_id: Uuid) -> Result<String> {
        let dir = domain::flow_dir(&self.domain, flow_id);
        let path = domain::json_path(&dir, flow_id);
        std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(flow_id.to_string())
            } else {
                Error::Io(e)
            }
        })
    }

    pub fn release_flow_writer(&self, flow_id: Uuid) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let Some(slot) = state.writers.get_mut(&flow_id) else {
            return Ok(());
        };
        slot.local_count = slot.local_count.saturating_sub(1);
        if slot.local_count == 0 {
            let slot = state.writers.remove(&flow_id).unwrap();
            slot.flow.header().writer_ref_count.fetch_sub(1, Ordering::AcqRel);
        }
        Ok(())
    }

    pub fn release_flow_reader(&self, flow_id: Uuid) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let Some(slot) = state.readers.get_mut(&flow_id) else {
            return Ok(());
        };
        slot.local_count = slot.local_count.saturating_sub(1);
        if slot.local_count == 0 {
            state.readers.remove(&flow_id);
        }
        Ok(())
    }

    /// Releases every outstanding handle. Called from `Instance::drop`
    /// (`spec.md` §4.G: "on instance destruction, implicitly release all
    /// outstanding handles").
    pub fn release_all(&self) {
        let mut state = self.state.lock().unwrap();
        for (_, slot) in state.writers.drain() {
            slot.flow.header().writer_ref_count.fetch_sub(1, Ordering::AcqRel);
        }
        state.readers.clear();
    }
}

fn validate_matches(header: &FlowHeader, descriptor: &Descriptor) -> Result<()> {
    if header.data_format() != descriptor.data_format {
        return Err(Error::AlreadyExists(format!(
            "flow {} exists with format {:?}, requested {:?}",
            descriptor.id,
            header.data_format(),
            descriptor.data_format
        )));
    }
    if header.kind() != descriptor.kind {
        return Err(Error::AlreadyExists(format!(
            "flow {} exists with a different geometry than requested",
            descriptor.id
        )));
    }
    Ok(())
}
