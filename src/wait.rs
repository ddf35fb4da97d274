// SPDX-FileCopyrightText: 2025-2026 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Kernel-backed wait/wake on a 32-bit memory word (Linux `futex(2)`).
//!
//! Writers bump the flow header's `wait_word` after publishing `head_index`
//! and wake every waiter. Readers follow the classic seqlock double-check:
//! sample `head_index`, and only if insufficient, sample `wait_word`,
//! re-check `head_index`, then block.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Outcome of a [`wait`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// Woken by a matching [`wake_all`] call (or a spurious wakeup — callers
    /// must re-check their condition regardless).
    Woken,
    /// The timeout elapsed before a wakeup arrived.
    Timeout,
    /// A signal interrupted the wait.
    Interrupted,
}

/// Blocks while `*word == expected`, for at most `timeout`. Returns
/// immediately without blocking if the value has already changed.
pub fn wait(word: &AtomicU32, expected: u32, timeout: Duration) -> WaitResult {
    if word.load(Ordering::Acquire) != expected {
        return WaitResult::Woken;
    }

    let ts = libc::timespec {
        tv_sec: timeout.as_secs() as libc::time_t,
        tv_nsec: timeout.subsec_nanos() as i64,
    };

    let rc = unsafe {
        libc::syscall(
            libc::SYS_futex,
            word as *const AtomicU32 as *const u32,
            libc::FUTEX_WAIT,
            expected,
            &ts as *const libc::timespec,
            std::ptr::null::<u32>(),
            0,
        )
    };

    if rc == 0 {
        WaitResult::Woken
    } else {
        match unsafe { *libc::__errno_location() } {
            libc::ETIMEDOUT => WaitResult::Timeout,
            libc::EAGAIN => WaitResult::Woken, // value changed between our load and the syscall
            libc::EINTR => WaitResult::Interrupted,
            _ => WaitResult::Woken,
        }
    }
}

/// Wakes every thread currently blocked in [`wait`] on `word`.
pub fn wake_all(word: &AtomicU32) {
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word as *const AtomicU32 as *const u32,
            libc::FUTEX_WAKE,
            i32::MAX,
            std::ptr::null::<libc::timespec>(),
            std::ptr::null::<u32>(),
            0,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn wait_times_out_when_nobody_wakes() {
        let word = AtomicU32::new(0);
        let start = Instant::now();
        let result = wait(&word, 0, Duration::from_millis(50));
        assert_eq!(result, WaitResult::Timeout);
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn wait_returns_immediately_if_value_already_changed() {
        let word = AtomicU32::new(1);
        let result = wait(&word, 0, Duration::from_secs(5));
        assert_eq!(result, WaitResult::Woken);
    }

    #[test]
    fn wake_all_unblocks_a_waiting_thread() {
        let word = Arc::new(AtomicU32::new(0));
        let waiter_word = word.clone();
        let handle = thread::spawn(move || {
            wait(&waiter_word, 0, Duration::from_secs(5))
        });

        thread::sleep(Duration::from_millis(20));
        word.store(1, Ordering::Release);
        wake_all(&word);

        let result = handle.join().unwrap();
        assert_eq!(result, WaitResult::Woken);
    }
}
