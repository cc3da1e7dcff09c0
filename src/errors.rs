//! Error handling for routing-table construction.

use std::fmt;

/// Error type for routing-table construction and stride-plan validation.
///
/// Operations on a constructed table do not fail: duplicate inserts and
/// missing routes are ordinary results, and invariant violations are
/// programmer errors that panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    EmptyStridePlan,
    ZeroStride,
    StrideTooLong,
    StrideSumMismatch,
    AddrTooLong,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EmptyStridePlan => write!(f, "stride plan is empty"),
            Error::ZeroStride => write!(f, "stride length must be at least one bit"),
            Error::StrideTooLong => write!(f, "stride length exceeds 24 bits"),
            Error::StrideSumMismatch => {
                write!(f, "stride lengths do not sum to the address length")
            }
            Error::AddrTooLong => write!(f, "address length must be between 1 and 128 bits"),
        }
    }
}

impl std::error::Error for Error {}
