// SPDX-FileCopyrightText: 2025-2026 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for MXL operations.
//!
//! Unlike a binding crate, there is no C status code to translate: errors
//! originate directly from filesystem/mmap syscalls or from protocol-level
//! checks (range, staleness, timeout) performed against shared memory.

/// Convenience result type using [`Error`] as the error variant.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors that can occur when using the MXL API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Null/ill-formed input, or a rate with a zero numerator/denominator.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The flow id or domain entry does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// `create_flow_writer` found an existing flow directory that does not
    /// match the requested descriptor.
    #[error("flow already exists with an incompatible definition: {0}")]
    AlreadyExists(String),

    /// Magic/version mismatch, or the descriptor doesn't match the flow on
    /// disk.
    #[error("incompatible flow: {0}")]
    IncompatibleFlow(String),

    /// Requested index has already been evicted from the ring.
    #[error("out of range: too late")]
    OutOfRangeTooLate,

    /// Requested index is further ahead than the writer has produced.
    #[error("out of range: too early")]
    OutOfRangeTooEarly,

    /// Cell under construction or aliasing detected; caller may retry.
    #[error("not ready")]
    NotReady,

    /// A blocking operation exceeded its deadline.
    #[error("timeout")]
    Timeout,

    /// A signal interrupted a blocking call before it could complete.
    #[error("interrupted")]
    Interrupted,

    /// The flow directory/inode changed underneath a mapping; reopen it.
    #[error("stale mapping: {0}")]
    Stale(String),

    /// An underlying filesystem or mapping syscall failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Descriptor JSON failed to parse or was missing a required field.
    #[error("invalid flow descriptor: {0}")]
    InvalidDescriptor(#[from] serde_json::Error),

    /// An unexpected invariant was violated; indicates a bug rather than
    /// caller misuse.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub(crate) fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }
}
