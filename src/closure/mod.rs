//! Closures - foreign-callable entry points backed by a Rust/C callback
//!
//! Design: A closure record starts with its trampoline so the record's
//! address is the code address. The trampoline loads that address into
//! `t2` and jumps to the assembly entry, which saves the argument
//! registers and calls `rvffi_closure_inner`.
//!
//! - `trampoline.rs` - short/long RV64 encodings
//! - `icache.rs` - per-platform instruction cache synchronization

pub mod icache;
mod trampoline;


pub use trampoline::{Encoding, Trampoline, TRAMPOLINE_SIZE, TRAMPOLINE_WORDS};

use core::ffi::c_void;
use core::ptr;

use crate::cif::Cif;
use crate::error::FfiError;
use crate::logging::{log_abi_error, log_closure_prepared, log_invariant_violation};

/// Callback invoked with decoded arguments
///
/// `args` holds one pointer per argument; `rvalue` is the return storage.
pub type ClosureFn = unsafe extern "C" fn(
    cif: *const Cif,
    rvalue: *mut c_void,
    args: *mut *mut c_void,
    user_data: *mut c_void,
);

/// Address of the assembly closure entry the trampoline jumps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct ClosureEntry(pub usize);

/// Closure record; lives in memory that is both writable and executable
#[repr(C)]
pub struct Closure {
    tramp: [u32; TRAMPOLINE_WORDS],
    cif: *const Cif,
    fun: Option<ClosureFn>,
    user_data: *mut c_void,
}

impl Closure {
    pub const fn new() -> Self {
        Self {
            tramp: [0; TRAMPOLINE_WORDS],
            cif: ptr::null(),
            fun: None,
            user_data: ptr::null_mut(),
        }
    }

    /// Trampoline words as written by `prep_closure_loc`
    #[inline]
    pub fn trampoline(&self) -> &[u32; TRAMPOLINE_WORDS] {
        &self.tramp
    }

    #[inline]
    pub fn is_prepared(&self) -> bool {
        self.fun.is_some()
    }

    #[inline]
    pub fn cif_ptr(&self) -> *const Cif {
        self.cif
    }

    #[inline]
    pub fn fun(&self) -> Option<ClosureFn> {
        self.fun
    }

    #[inline]
    pub fn user_data(&self) -> *mut c_void {
        self.user_data
    }

    #[inline]
    fn address(&self) -> usize {
        self as *const Self as usize
    }
}

impl Default for Closure {
    fn default() -> Self {
        Self::new()
    }
}

/// Install `fun` behind a trampoline at `codeloc`
///
/// `codeloc` must be the closure's own address. The CIF must outlive every
/// call through the closure.
pub fn prep_closure_loc(
    closure: &mut Closure,
    cif: &Cif,
    fun: ClosureFn,
    user_data: *mut c_void,
    codeloc: *mut c_void,
    entry: ClosureEntry,
) -> Result<(), FfiError> {
    let abi = cif.abi();
    if !abi.supports_closures() {
        let err = FfiError::BadAbi {
            abi: abi.code(),
            reason: "closures need a 64-bit ABI",
        };
        log_abi_error("prep_closure_loc", &err);
        return Err(err);
    }

    if codeloc as usize != closure.address() {
        log_invariant_violation("closure code location is not the closure address");
        std::process::abort();
    }

    let tramp = Trampoline::encode(codeloc as u64, entry.0 as u64);
    closure.tramp = tramp.words();
    closure.cif = cif;
    closure.fun = Some(fun);
    closure.user_data = user_data;

    icache::flush(codeloc, TRAMPOLINE_SIZE);
    log_closure_prepared(abi, codeloc as usize, tramp.encoding() == Encoding::Long);
    Ok(())
}
