// SPDX-FileCopyrightText: 2025-2026 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! # MXL — Media eXchange Layer
//!
//! An inter-process media transport that exchanges video frames, audio
//! sample batches, and ancillary data between producer ("writer") and
//! consumer ("reader") processes on a single host, through memory-mapped
//! ring buffers backed by files in a shared *domain* directory (typically
//! on tmpfs).
//!
//! Unlike a binding crate, this is a native implementation: there is no C
//! library underneath. `mmap`, the wait/wake futex word, and TAI time all
//! go through `libc` directly.
//!
//! ### Key Concepts
//!
//! - **Domain**: a directory containing the shared memory for a set of flows.
//! - **Instance** ([`Instance`]): a connection to a domain.
//! - **Flow**: a unidirectional ring buffer for media data, either discrete
//!   (grains: video, ancillary data) or continuous (samples: audio).
//! - **Grain** ([`GrainReader`]/[`GrainWriter`]): a discrete unit of media.
//! - **Samples** ([`SamplesReader`]/[`SamplesWriter`]): continuous,
//!   multi-channel audio delivered in batches.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐
//! │ Instance │  (bound to a domain directory)
//! └────┬─────┘
//!      │
//!      ├─► FlowWriter ──► GrainWriter    (video/data)
//!      │              └─► SamplesWriter  (audio)
//!      │
//!      └─► FlowReader ──► GrainReader    (video/data)
//!                     └─► SamplesReader  (audio)
//! ```
//!
//! ## Example: write and read a video grain
//!
//! ```no_run
//! use mxl::{Instance, InstanceOptions};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), mxl::Error> {
//! let instance = Instance::new("/dev/shm/my_domain", InstanceOptions::default())?;
//!
//! let flow_def = r#"{
//!     "id": "3b7b6a2c-9c4d-4e8e-8f2d-4a0b6f1a5d63",
//!     "format": "urn:x-nmos:format:video",
//!     "grain_rate": {"numerator": 30000, "denominator": 1001},
//!     "grain_size": 4147200
//! }"#;
//! let (writer, config, _created) = instance.create_flow_writer(flow_def)?;
//! let mut grain_writer = writer.to_grain_writer()?;
//!
//! let index = instance.index(instance.now(), config.grain_rate()?)?;
//! let mut access = grain_writer.open_grain(index)?;
//! access.payload_mut().fill(42);
//! let size = access.grain_size();
//! access.commit_complete(size)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! [`Instance`] is `Send + Sync` and cheap to clone; readers and writers
//! are `Send` but intended for single-threaded use per handle (one
//! producer per flow, per `spec.md` §5).

mod clock;
mod config;
mod domain;
mod error;
mod flow;
mod flowdef;
mod gc;
mod grain;
mod instance;
mod layout;
mod manager;
mod samples;
mod segment;
mod wait;

pub use clock::Rational;
pub use config::InstanceOptions;
pub use error::{Error, Result};
pub use flow::{DataFormat, FlowConfigInfo, FlowReader, FlowRuntimeInfo, FlowWriter};
pub use grain::data::{GrainView, OwnedGrainData};
pub use grain::reader::GrainReader;
pub use grain::write_access::{CommitInfo, GrainWriteAccess};
pub use grain::writer::GrainWriter;
pub use instance::Instance;
pub use samples::data::{OwnedSamplesData, SamplesView};
pub use samples::reader::SamplesReader;
pub use samples::write_access::SamplesWriteAccess;
pub use samples::writer::SamplesWriter;

/// Current TAI time in nanoseconds since the SMPTE ST 2059 epoch.
pub fn now() -> u64 {
    clock::now()
}
