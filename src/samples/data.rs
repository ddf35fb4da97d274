// SPDX-FileCopyrightText: 2025-2026 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Zero-copy and owned views of a batch of committed samples.

use std::sync::Arc;

use crate::error::Result;
use crate::manager::FlowState;

/// A zero-copy view of one committed batch of samples, across every
/// channel of a continuous flow.
///
/// Each channel's bytes may wrap the circular buffer, so access comes back
/// as a `(head, tail)` fragment pair: `head` holds the leading bytes up to
/// the buffer's end, `tail` (possibly empty) holds the bytes that wrapped
/// around to the start (`spec.md` §4.F).
pub struct SamplesView {
    flow: Arc<FlowState>,
    start_index: u64,
    sample_count: u64,
}

impl SamplesView {
    pub(crate) fn new(flow: Arc<FlowState>, start_index: u64, sample_count: u64) -> Self {
        Self {
            flow,
            start_index,
            sample_count,
        }
    }

    pub fn start_index(&self) -> u64 {
        self.start_index
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    pub fn channel_count(&self) -> u64 {
        match self.flow.header().kind() {
            crate::layout::FlowKind::Continuous(geom) => geom.channel_count,
            crate::layout::FlowKind::Discrete(_) => unreachable!("continuous flow checked at conversion"),
        }
    }

    fn geom(&self) -> crate::layout::ContinuousGeom {
        match self.flow.header().kind() {
            crate::layout::FlowKind::Continuous(geom) => geom,
            crate::layout::FlowKind::Discrete(_) => unreachable!("continuous flow checked at conversion"),
        }
    }

    /// The bytes of `channel`'s samples `[start_index, start_index +
    /// sample_count)`, split into the pre-wrap and post-wrap fragments of
    /// the channel's circular buffer.
    pub fn channel_data(&self, channel: u64) -> Result<(&[u8], &[u8])> {
        let geom = self.geom();
        if channel >= geom.channel_count {
            return Err(crate::error::Error::invalid_argument(format!(
                "channel {channel} out of range (channel_count {})",
                geom.channel_count
            )));
        }
        let width = geom.sample_width as usize;
        let capacity = geom.buffer_length;
        let base = unsafe {
            self.flow
                .channel_ptr(channel)
                .add(crate::layout::CHANNEL_HEADER_SIZE)
        };

        let start = self.start_index % capacity;
        let count = self.sample_count;
        let until_wrap = (capacity - start).min(count);
        let after_wrap = count - until_wrap;

        let head = unsafe { std::slice::from_raw_parts(base.add(start as usize * width), until_wrap as usize * width) };
        let tail = unsafe { std::slice::from_raw_parts(base, after_wrap as usize * width) };
        Ok((head, tail))
    }
}

/// An owned copy of a [`SamplesView`], one contiguous buffer per channel,
/// detached from the shared mapping.
#[derive(Debug, Clone)]
pub struct OwnedSamplesData {
    pub start_index: u64,
    pub sample_count: u64,
    pub channels: Vec<Vec<u8>>,
}

impl TryFrom<SamplesView> for OwnedSamplesData {
    type Error = crate::error::Error;

    fn try_from(view: SamplesView) -> Result<Self> {
        let mut channels = Vec::with_capacity(view.channel_count() as usize);
        for ch in 0..view.channel_count() {
            let (head, tail) = view.channel_data(ch)?;
            let mut buf = Vec::with_capacity(head.len() + tail.len());
            buf.extend_from_slice(head);
            buf.extend_from_slice(tail);
            channels.push(buf);
        }
        Ok(Self {
            start_index: view.start_index,
            sample_count: view.sample_count,
            channels,
        })
    }
}
