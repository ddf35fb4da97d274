// SPDX-FileCopyrightText: 2025-2026 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Instance-level configuration.
//!
//! The core has no external config loader to defer to (that's CLI/service
//! territory, out of scope per `spec.md` §1), so options are a typed struct
//! with sensible defaults rather than the teacher's opaque `options: &str`
//! passthrough to a C API.

use std::time::Duration;

/// Options controlling an [`crate::Instance`]'s local policy choices: none
/// of these affect the wire layout, so two instances with different
/// options can safely share a domain.
#[derive(Debug, Clone)]
pub struct InstanceOptions {
    /// How long a flow may go without reader activity (and with no open
    /// writer) before [`crate::Instance::garbage_collect`] considers it
    /// collectible (`spec.md` §3, §4.H).
    pub idle_window: Duration,
    /// Default ring size for discrete flows whose descriptor doesn't name
    /// one explicitly.
    pub default_ring_size: u64,
    /// How many cells beyond `head_index` a reader may request before
    /// `try_get_grain`/`try_get_samples` returns `OutOfRangeTooEarly`.
    pub lookahead: u64,
    /// How many cells of slack below `ring_size` are kept reserved as an
    /// overwrite margin (`spec.md` §3 invariant 5): a reader may request
    /// indices down to `head_index - (ring_size - slack)`.
    pub slack: u64,
    /// Whether new segments should attempt a `MAP_HUGETLB` mapping before
    /// falling back to a regular page mapping.
    pub prefer_huge_pages: bool,
}

impl Default for InstanceOptions {
    fn default() -> Self {
        Self {
            idle_window: Duration::from_secs(30),
            default_ring_size: 256,
            lookahead: 1,
            slack: 1,
            prefer_huge_pages: true,
        }
    }
}
