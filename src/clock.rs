// SPDX-FileCopyrightText: 2025-2026 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! TAI clock and rate/index conversions.
//!
//! MXL indexes grains and sample batches by a monotonically increasing
//! integer derived from a TAI timestamp and the flow's rate. This module is
//! the leaf dependency of every other component: nothing here touches
//! shared memory.

use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};

/// As of the 2017 leap second, TAI runs 37 seconds ahead of UTC. Used only
/// as a fallback on platforms without `CLOCK_TAI` (the kernel clock already
/// accounts for leap seconds on Linux, so this is not used there).
const TAI_UTC_OFFSET_SECONDS: i64 = 37;

/// A rational frame or sample rate (e.g. 30000/1001 for 29.97 fps).
///
/// Mirrors the rate representation used throughout the flow header and the
/// flow descriptor JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub numerator: u64,
    pub denominator: u64,
}

impl Rational {
    pub const fn new(numerator: u64, denominator: u64) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    fn validate(self) -> Result<Self> {
        if self.numerator == 0 || self.denominator == 0 {
            return Err(Error::invalid_argument(format!(
                "rate {}/{} has a zero numerator or denominator",
                self.numerator, self.denominator
            )));
        }
        Ok(self)
    }
}

/// Returns the current TAI time in nanoseconds since the SMPTE ST 2059
/// epoch (1970-01-01 00:00:00 TAI).
pub fn now() -> u64 {
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    {
        tai_now_linux()
    }
    #[cfg(not(all(target_os = "linux", target_env = "gnu")))]
    {
        tai_now_fallback()
    }
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
fn tai_now_linux() -> u64 {
    // CLOCK_TAI is maintained by the kernel NTP discipline and already
    // accounts for leap seconds; no manual offset is needed.
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_TAI, &mut ts) };
    if rc != 0 {
        return tai_now_fallback();
    }
    (ts.tv_sec as u64) * 1_000_000_000 + ts.tv_nsec as u64
}

fn tai_now_fallback() -> u64 {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let tai_seconds = now.as_secs() as i64 + TAI_UTC_OFFSET_SECONDS;
    (tai_seconds.max(0) as u64) * 1_000_000_000 + now.subsec_nanos() as u64
}

/// Converts a TAI timestamp (nanoseconds) to an index at the given rate.
///
/// `index(t) = round(t * n / (d * 1e9))`
pub fn index(timestamp_ns: u64, rate: Rational) -> Result<u64> {
    let rate = rate.validate()?;
    let numerator = (timestamp_ns as u128) * (rate.numerator as u128);
    let denominator = (rate.denominator as u128) * 1_000_000_000u128;
    Ok(round_div(numerator, denominator) as u64)
}

/// Converts an index to a TAI timestamp (nanoseconds) at the given rate.
///
/// `timestamp(i) = round(i * d * 1e9 / n)`
pub fn timestamp(index: u64, rate: Rational) -> Result<u64> {
    let rate = rate.validate()?;
    let numerator = (index as u128) * (rate.denominator as u128) * 1_000_000_000u128;
    let denominator = rate.numerator as u128;
    Ok(round_div(numerator, denominator) as u64)
}

fn round_div(numerator: u128, denominator: u128) -> u128 {
    (numerator + denominator / 2) / denominator
}

/// Nanoseconds from now until `index` becomes current at `rate`. A negative
/// delta (the index is already in the past) is clamped to zero.
pub fn ns_until(target_index: u64, rate: Rational) -> Result<u64> {
    let target_ns = timestamp(target_index, rate)?;
    let now_ns = now();
    Ok(target_ns.saturating_sub(now_ns))
}

/// Sleeps until `index` is current at `rate`. Returns immediately if the
/// index is already in the past.
pub fn sleep_until_index(target_index: u64, rate: Rational) -> Result<()> {
    let delay_ns = ns_until(target_index, rate)?;
    sleep_for_ns(delay_ns);
    Ok(())
}

/// Sleeps for the given number of nanoseconds.
pub fn sleep_for_ns(ns: u64) {
    if ns > 0 {
        thread::sleep(Duration::from_nanos(ns));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_rates() {
        assert!(index(0, Rational::new(0, 1)).is_err());
        assert!(index(0, Rational::new(1, 0)).is_err());
    }

    #[test]
    fn roundtrip_30000_1001() {
        let rate = Rational::new(30000, 1001);
        for i in 0..2_000_000u64 {
            let ts = timestamp(i, rate).unwrap();
            let back = index(ts, rate).unwrap();
            assert_eq!(back, i, "roundtrip failed at index {i} (ts={ts})");
        }
    }

    #[test]
    fn roundtrip_48000_1() {
        let rate = Rational::new(48000, 1);
        for i in 0..500_000u64 {
            let ts = timestamp(i, rate).unwrap();
            let back = index(ts, rate).unwrap();
            assert_eq!(back, i);
        }
    }

    #[test]
    fn ns_until_clamps_past_indices() {
        let rate = Rational::new(60, 1);
        // Index 0 is always in the past relative to "now" (a TAI epoch well
        // before 1970 would be required otherwise).
        let delay = ns_until(0, rate).unwrap();
        assert_eq!(delay, 0);
    }
}
