//! Error taxonomy and C status codes
//!
//! Only construction-time operations fail. The marshaler and decoder run on
//! a CIF that was validated when it was built and never report errors.

use thiserror::Error;

/// Failure while building a CIF or a closure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FfiError {
    #[error("unsupported ABI {abi}: {reason}")]
    BadAbi { abi: u32, reason: &'static str },

    #[error("bad type definition: {0}")]
    BadTypedef(&'static str),

    #[error("argument {index} has an unusable type")]
    BadArgType { index: usize },
}

impl FfiError {
    /// Status code reported across the C boundary
    #[inline]
    pub const fn status(&self) -> Status {
        match self {
            Self::BadAbi { .. } => Status::BadAbi,
            Self::BadTypedef(_) => Status::BadTypedef,
            Self::BadArgType { .. } => Status::BadArgType,
        }
    }
}

/// C status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Status {
    Ok = 0,
    BadTypedef = 1,
    BadAbi = 2,
    BadArgType = 3,
}

impl<T> From<&Result<T, FfiError>> for Status {
    fn from(result: &Result<T, FfiError>) -> Self {
        match result {
            Ok(_) => Status::Ok,
            Err(e) => e.status(),
        }
    }
}
