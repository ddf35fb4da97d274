// SPDX-FileCopyrightText: 2025-2026 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! RAII write session for one sample batch (`spec.md` §4.F, §9).
//!
//! Exclusively owns the right to mutate every channel's pre-wrap/post-wrap
//! fragment for `[start_index, start_index + sample_count)` until
//! [`commit`] or [`cancel`]. Dropping without an explicit commit cancels
//! the write: readers never observe the partially written bytes.
//!
//! [`commit`]: SamplesWriteAccess::commit
//! [`cancel`]: SamplesWriteAccess::cancel

use std::cell::Cell;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::error::{Error, Result};
use crate::layout::{CHANNEL_HEADER_SIZE, ChannelHeader, ContinuousGeom, FlowKind};
use crate::manager::FlowState;
use crate::wait;

pub struct SamplesWriteAccess {
    flow: Arc<FlowState>,
    start_index: u64,
    sample_count: u64,
    geom: ContinuousGeom,
    committed: Cell<bool>,
}

impl SamplesWriteAccess {
    pub(crate) fn new(flow: Arc<FlowState>, start_index: u64, sample_count: u64, geom: ContinuousGeom) -> Self {
        Self {
            flow,
            start_index,
            sample_count,
            geom,
            committed: Cell::new(false),
        }
    }

    pub fn start_index(&self) -> u64 {
        self.start_index
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    pub fn channel_count(&self) -> u64 {
        self.geom.channel_count
    }

    fn fragment_lengths(&self) -> (u64, u64) {
        let capacity = self.geom.buffer_length;
        let start = self.start_index % capacity;
        let until_wrap = (capacity - start).min(self.sample_count);
        (until_wrap, self.sample_count - until_wrap)
    }

    /// Mutable pre-wrap/post-wrap fragments for `channel`'s bytes in this
    /// batch. The second slice is empty unless the batch wraps the buffer.
    pub fn channel_mut(&mut self, channel: u64) -> Result<(&mut [u8], &mut [u8])> {
        if channel >= self.geom.channel_count {
            return Err(Error::invalid_argument(format!(
                "channel {channel} out of range (channel_count {})",
                self.geom.channel_count
            )));
        }
        let width = self.geom.sample_width as usize;
        let capacity = self.geom.buffer_length;
        let start = self.start_index % capacity;
        let (until_wrap, after_wrap) = self.fragment_lengths();

        let base = unsafe { self.flow.channel_mut_ptr(channel).add(CHANNEL_HEADER_SIZE) };
        let head = unsafe {
            std::slice::from_raw_parts_mut(base.add(start as usize * width), until_wrap as usize * width)
        };
        let tail = unsafe { std::slice::from_raw_parts_mut(base, after_wrap as usize * width) };
        Ok((head, tail))
    }

    /// Publishes this batch: stores `head_sample_index = start_index +
    /// sample_count` with release ordering on every channel, advances the
    /// flow's aggregate `head_index`, then bumps `wait_word` and wakes every
    /// waiter (`spec.md` §4.F `commit`).
    pub fn commit(self) -> Result<()> {
        let new_head = self.start_index + self.sample_count;
        for channel in 0..self.geom.channel_count {
            let header = unsafe { ChannelHeader::from_ptr(self.flow.channel_ptr(channel)) };
            header.head_sample_index.store(new_head, Ordering::Release);
        }

        let flow_header = self.flow.header();
        debug_assert!(matches!(flow_header.kind(), FlowKind::Continuous(_)));

        let mut current = flow_header.head_index.load(Ordering::Acquire);
        loop {
            if current != crate::layout::NO_HEAD && new_head <= current {
                break;
            }
            match flow_header.head_index.compare_exchange_weak(
                current,
                new_head,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        flow_header
            .last_write_time
            .store(crate::clock::now(), Ordering::Release);
        flow_header.wait_word.fetch_add(1, Ordering::Release);
        wait::wake_all(&flow_header.wait_word);

        self.committed.set(true);
        Ok(())
    }

    /// Discards this session without publishing. Equivalent to dropping it.
    pub fn cancel(self) {
        drop(self)
    }
}

impl Drop for SamplesWriteAccess {
    fn drop(&mut self) {
        if !self.committed.get() {
            tracing::debug!(
                start_index = self.start_index,
                sample_count = self.sample_count,
                "samples write session cancelled"
            );
        }
    }
}
