// SPDX-FileCopyrightText: 2025-2026 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Binary layout of a flow's `data` file: header, discrete ring cells, and
//! continuous per-channel buffers.
//!
//! Every multi-byte field is native-endian (§4.D: flows are single-host
//! only). All offsets below are measured from the start of the `data` file.
//! The header is 256 bytes, comfortably meeting the ≥256-byte / 64-byte
//! alignment requirement for its atomic fields.

use std::sync::atomic::{AtomicU32, AtomicU64};

use crate::clock::Rational;
use crate::error::{Error, Result};

/// Identifies an MXL v1 flow (`"MXL1"` read as a little-endian u32).
pub const MAGIC: u32 = 0x314C584D;
pub const LAYOUT_VERSION: u32 = 1;

pub const FLAG_CONTINUOUS: u32 = 1 << 0;

pub const FORMAT_UNSPECIFIED: u32 = 0;
pub const FORMAT_VIDEO: u32 = 1;
pub const FORMAT_AUDIO: u32 = 2;
pub const FORMAT_DATA: u32 = 3;

/// Sentinel `head_index` meaning "no grain/batch has ever been committed".
/// Distinct from `0`, which is itself a valid first index: a writer may
/// begin a flow at whatever index its clock produces, not only at zero
/// (`spec.md` §8 scenario 2 opens a fresh flow directly at grain index 5).
pub const NO_HEAD: u64 = u64::MAX;

pub const HEADER_SIZE: usize = 256;
pub const CELL_HEADER_SIZE: usize = 64;
pub const CHANNEL_HEADER_SIZE: usize = 64;

fn align_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

/// Media data format classification for a flow, mirroring `spec.md` §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Unspecified,
    Video,
    Audio,
    Data,
}

impl DataFormat {
    pub(crate) fn from_raw(value: u32) -> Self {
        match value {
            FORMAT_VIDEO => DataFormat::Video,
            FORMAT_AUDIO => DataFormat::Audio,
            FORMAT_DATA => DataFormat::Data,
            _ => DataFormat::Unspecified,
        }
    }

    pub(crate) fn to_raw(self) -> u32 {
        match self {
            DataFormat::Unspecified => FORMAT_UNSPECIFIED,
            DataFormat::Video => FORMAT_VIDEO,
            DataFormat::Audio => FORMAT_AUDIO,
            DataFormat::Data => FORMAT_DATA,
        }
    }

    /// Video and generic data flows are discrete (grain-based); audio is
    /// continuous (sample-based). Corresponds to the C API's inline
    /// `mxlIsDiscreteDataFormat` helper referenced in `spec.md` §9.
    pub fn is_discrete(self) -> bool {
        matches!(self, DataFormat::Video | DataFormat::Data)
    }
}

/// Geometry specific to discrete (grain-based) flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscreteGeom {
    pub ring_size: u64,
    pub grain_size: u64,
}

/// Geometry specific to continuous (sample-based) flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContinuousGeom {
    pub channel_count: u64,
    pub sample_width: u64,
    pub buffer_length: u64,
}

/// Tagged variant over a flow's geometry, per the `FlowKind` design note in
/// `spec.md` §9: runtime dispatch between discrete and continuous flow data
/// is a plain enum, not a polymorphic class hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    Discrete(DiscreteGeom),
    Continuous(ContinuousGeom),
}

impl FlowKind {
    pub fn is_discrete(&self) -> bool {
        matches!(self, FlowKind::Discrete(_))
    }
}

/// Overlay for the fixed-size flow header at offset 0 of `data`.
///
/// Fields used for cross-process coordination (`head_index`, `wait_word`,
/// `writer_ref_count`) are atomics; everything else is immutable after the
/// flow is created and is read/written with plain loads/stores.
#[repr(C)]
pub struct FlowHeader {
    pub magic: AtomicU32,
    pub version: AtomicU32,
    pub flags: AtomicU32,
    pub format: AtomicU32,
    pub grain_rate_num: AtomicU64,
    pub grain_rate_den: AtomicU64,
    pub ring_size: AtomicU64,
    pub grain_size: AtomicU64,
    pub channel_count: AtomicU64,
    pub sample_width: AtomicU64,
    pub buffer_length: AtomicU64,
    pub cell_stride: AtomicU64,
    pub payload_offset: AtomicU64,
    /// Pads the header out to the `head_index` offset (byte 200) declared
    /// in `spec.md` §4.D.
    _reserved: [u8; 112],
    pub head_index: AtomicU64,
    pub last_write_time: AtomicU64,
    pub wait_word: AtomicU32,
    pub writer_ref_count: AtomicU32,
    /// Pads the header out to `HEADER_SIZE` (256 bytes).
    _tail_reserved: [u8; 32],
}

const _: () = assert!(std::mem::size_of::<FlowHeader>() == HEADER_SIZE);

impl FlowHeader {
    /// Reinterprets a mapped segment's base pointer as a flow header.
    ///
    /// # Safety
    /// `ptr` must point to at least `HEADER_SIZE` bytes, valid for the
    /// lifetime `'a`, and 64-byte aligned (guaranteed by `mmap`, which
    /// always returns page-aligned addresses).
    pub unsafe fn from_ptr<'a>(ptr: *const u8) -> &'a FlowHeader {
        unsafe { &*(ptr as *const FlowHeader) }
    }

    /// Writes a freshly-initialized header for a newly created flow.
    ///
    /// # Safety
    /// `ptr` must point to a writable mapping of at least `total_size(kind)`
    /// bytes that no other process is concurrently reading.
    pub unsafe fn initialize(ptr: *mut u8, format: DataFormat, rate: Rational, kind: FlowKind) {
        let header = unsafe { &mut *(ptr as *mut FlowHeader) };
        header.magic.store(MAGIC, std::sync::atomic::Ordering::Relaxed);
        header
            .version
            .store(LAYOUT_VERSION, std::sync::atomic::Ordering::Relaxed);
        let flags = if kind.is_discrete() { 0 } else { FLAG_CONTINUOUS };
        header.flags.store(flags, std::sync::atomic::Ordering::Relaxed);
        header
            .format
            .store(format.to_raw(), std::sync::atomic::Ordering::Relaxed);
        header
            .grain_rate_num
            .store(rate.numerator, std::sync::atomic::Ordering::Relaxed);
        header
            .grain_rate_den
            .store(rate.denominator, std::sync::atomic::Ordering::Relaxed);

        match kind {
            FlowKind::Discrete(geom) => {
                header
                    .ring_size
                    .store(geom.ring_size, std::sync::atomic::Ordering::Relaxed);
                header
                    .grain_size
                    .store(geom.grain_size, std::sync::atomic::Ordering::Relaxed);
                header.channel_count.store(0, std::sync::atomic::Ordering::Relaxed);
                header.sample_width.store(0, std::sync::atomic::Ordering::Relaxed);
                header.buffer_length.store(0, std::sync::atomic::Ordering::Relaxed);
                let stride = cell_stride(geom.grain_size);
                header
                    .cell_stride
                    .store(stride as u64, std::sync::atomic::Ordering::Relaxed);
                header
                    .payload_offset
                    .store(HEADER_SIZE as u64, std::sync::atomic::Ordering::Relaxed);
            }
            FlowKind::Continuous(geom) => {
                header.ring_size.store(0, std::sync::atomic::Ordering::Relaxed);
                header.grain_size.store(0, std::sync::atomic::Ordering::Relaxed);
                header
                    .channel_count
                    .store(geom.channel_count, std::sync::atomic::Ordering::Relaxed);
                header
                    .sample_width
                    .store(geom.sample_width, std::sync::atomic::Ordering::Relaxed);
                header
                    .buffer_length
                    .store(geom.buffer_length, std::sync::atomic::Ordering::Relaxed);
                let stride = channel_stride(geom.sample_width, geom.buffer_length);
                header
                    .cell_stride
                    .store(stride as u64, std::sync::atomic::Ordering::Relaxed);
                header
                    .payload_offset
                    .store(HEADER_SIZE as u64, std::sync::atomic::Ordering::Relaxed);
            }
        }

        header.head_index.store(NO_HEAD, std::sync::atomic::Ordering::Relaxed);
        header
            .last_write_time
            .store(0, std::sync::atomic::Ordering::Relaxed);
        header.wait_word.store(0, std::sync::atomic::Ordering::Relaxed);
        header.writer_ref_count.store(1, std::sync::atomic::Ordering::Release);
    }

    pub fn rate(&self) -> Rational {
        Rational::new(
            self.grain_rate_num.load(std::sync::atomic::Ordering::Relaxed),
            self.grain_rate_den.load(std::sync::atomic::Ordering::Relaxed),
        )
    }

    pub fn data_format(&self) -> DataFormat {
        DataFormat::from_raw(self.format.load(std::sync::atomic::Ordering::Relaxed))
    }

    pub fn kind(&self) -> FlowKind {
        if self.flags.load(std::sync::atomic::Ordering::Relaxed) & FLAG_CONTINUOUS != 0 {
            FlowKind::Continuous(ContinuousGeom {
                channel_count: self.channel_count.load(std::sync::atomic::Ordering::Relaxed),
                sample_width: self.sample_width.load(std::sync::atomic::Ordering::Relaxed),
                buffer_length: self.buffer_length.load(std::sync::atomic::Ordering::Relaxed),
            })
        } else {
            FlowKind::Discrete(DiscreteGeom {
                ring_size: self.ring_size.load(std::sync::atomic::Ordering::Relaxed),
                grain_size: self.grain_size.load(std::sync::atomic::Ordering::Relaxed),
            })
        }
    }

    pub fn payload_offset(&self) -> usize {
        self.payload_offset.load(std::sync::atomic::Ordering::Relaxed) as usize
    }

    pub fn cell_stride(&self) -> usize {
        self.cell_stride.load(std::sync::atomic::Ordering::Relaxed) as usize
    }

    /// Validates `magic`/`version` against what this crate expects.
    pub fn validate(&self) -> Result<()> {
        let magic = self.magic.load(std::sync::atomic::Ordering::Acquire);
        if magic != MAGIC {
            return Err(Error::IncompatibleFlow(format!(
                "bad magic 0x{magic:08x}, expected 0x{MAGIC:08x}"
            )));
        }
        let version = self.version.load(std::sync::atomic::Ordering::Acquire);
        if version != LAYOUT_VERSION {
            return Err(Error::IncompatibleFlow(format!(
                "unsupported layout version {version}, expected {LAYOUT_VERSION}"
            )));
        }
        Ok(())
    }
}

/// Metadata header for one discrete ring cell, 64-byte aligned, immediately
/// followed by `grain_size` bytes of payload.
#[repr(C)]
pub struct CellHeader {
    pub grain_index: AtomicU64,
    pub grain_timestamp: AtomicU64,
    pub grain_size: AtomicU32,
    pub committed_size: AtomicU32,
    pub valid_slices: AtomicU32,
    pub total_slices: AtomicU32,
    pub flags: AtomicU32,
    pub payload_location: AtomicU32,
    pub device_index: std::sync::atomic::AtomicI32,
    _reserved: [u8; CELL_HEADER_SIZE - 44],
}

const _: () = assert!(std::mem::size_of::<CellHeader>() == CELL_HEADER_SIZE);

impl CellHeader {
    /// # Safety
    /// `ptr` must point to a valid, 64-byte aligned `CellHeader` for the
    /// lifetime `'a`.
    pub unsafe fn from_ptr<'a>(ptr: *const u8) -> &'a CellHeader {
        unsafe { &*(ptr as *const CellHeader) }
    }
}

/// Metadata header for one continuous flow's channel ring, 64-byte aligned,
/// immediately followed by `buffer_length * sample_width` bytes of
/// circularly-addressed sample payload.
#[repr(C)]
pub struct ChannelHeader {
    pub head_sample_index: AtomicU64,
    _reserved: [u8; CHANNEL_HEADER_SIZE - 8],
}

const _: () = assert!(std::mem::size_of::<ChannelHeader>() == CHANNEL_HEADER_SIZE);

impl ChannelHeader {
    /// # Safety
    /// `ptr` must point to a valid, 64-byte aligned `ChannelHeader` for the
    /// lifetime `'a`.
    pub unsafe fn from_ptr<'a>(ptr: *const u8) -> &'a ChannelHeader {
        unsafe { &*(ptr as *const ChannelHeader) }
    }
}

/// Bytes from the start of one discrete ring cell to the next.
pub fn cell_stride(grain_size: u64) -> usize {
    align_up(CELL_HEADER_SIZE + grain_size as usize, 64)
}

/// Bytes from the start of one continuous channel region to the next.
pub fn channel_stride(sample_width: u64, buffer_length: u64) -> usize {
    align_up(CHANNEL_HEADER_SIZE + (sample_width * buffer_length) as usize, 64)
}

/// Total `data` file size required for a discrete flow with the given
/// geometry, including the header.
pub fn discrete_file_size(geom: DiscreteGeom) -> usize {
    HEADER_SIZE + geom.ring_size as usize * cell_stride(geom.grain_size)
}

/// Total `data` file size required for a continuous flow with the given
/// geometry, including the header.
pub fn continuous_file_size(geom: ContinuousGeom) -> usize {
    HEADER_SIZE + geom.channel_count as usize * channel_stride(geom.sample_width, geom.buffer_length)
}

/// Validates that `ring_size` is a non-zero power of two, as required by
/// `spec.md` §3 (`Ring`) for the `index mod ring_size` cell mapping.
pub fn validate_ring_size(ring_size: u64) -> Result<()> {
    if ring_size == 0 || !ring_size.is_power_of_two() {
        return Err(Error::invalid_argument(format!(
            "ring_size {ring_size} must be a non-zero power of two"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_size_is_256_bytes() {
        assert_eq!(std::mem::size_of::<FlowHeader>(), 256);
    }

    #[test]
    fn cell_header_is_64_bytes() {
        assert_eq!(std::mem::size_of::<CellHeader>(), 64);
    }

    #[test]
    fn channel_header_is_64_bytes() {
        assert_eq!(std::mem::size_of::<ChannelHeader>(), 64);
    }

    #[test]
    fn cell_stride_is_64_byte_aligned() {
        assert_eq!(cell_stride(100) % 64, 0);
        assert_eq!(cell_stride(0) % 64, 0);
    }

    #[test]
    fn ring_size_validation() {
        assert!(validate_ring_size(8).is_ok());
        assert!(validate_ring_size(0).is_err());
        assert!(validate_ring_size(7).is_err());
    }

    #[test]
    fn initialize_and_read_back_discrete_header() {
        let mut buf = vec![0u8; discrete_file_size(DiscreteGeom { ring_size: 8, grain_size: 128 })];
        let geom = DiscreteGeom { ring_size: 8, grain_size: 128 };
        unsafe {
            FlowHeader::initialize(
                buf.as_mut_ptr(),
                DataFormat::Video,
                Rational::new(30000, 1001),
                FlowKind::Discrete(geom),
            );
        }
        let header = unsafe { FlowHeader::from_ptr(buf.as_ptr()) };
        header.validate().unwrap();
        assert_eq!(header.data_format(), DataFormat::Video);
        assert_eq!(header.kind(), FlowKind::Discrete(geom));
        assert_eq!(header.rate(), Rational::new(30000, 1001));
    }
}
