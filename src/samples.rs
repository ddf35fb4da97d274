// SPDX-FileCopyrightText: 2025-2026 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Continuous media sample handling (audio streams).
//!
//! A continuous flow is a fixed number of channels, each a circular buffer
//! of fixed-width samples addressed by a shared, monotonically increasing
//! sample index (`spec.md` §3, §4.F). Batches may wrap the buffer, so
//! access to a batch's bytes comes back as a pre-wrap/post-wrap fragment
//! pair rather than a single contiguous slice.
//!
//! # Key Types
//!
//! - [`writer::SamplesWriter`] opens, fills, and commits a batch of samples.
//! - [`write_access::SamplesWriteAccess`] is the RAII write session for one
//!   batch: dropping it without an explicit commit cancels the write.
//! - [`reader::SamplesReader`] waits for and inspects committed batches.
//! - [`data::SamplesView`] is a zero-copy view of one batch's payload.

pub mod data;
pub mod reader;
pub mod write_access;
pub mod writer;
