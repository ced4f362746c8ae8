//! C entry points called from the assembly glue
//!
//! Exposes:
//! - `rvffi_prep_args` - fills the outgoing argument area during a call
//! - `rvffi_closure_inner` - decodes and dispatches a closure invocation
//! - `rvffi_init` - logging setup from the environment

use core::ffi::c_void;
use core::slice;

use crate::closure::Closure;
use crate::decode::{closure_inner, SavedRegisters};
use crate::marshal::{prep_args, ExtendedCif};

/// Fill `bytes` of stack at `stack` with the call described by `ecif`
///
/// # Safety
///
/// `ecif` points at a live `ExtendedCif` whose CIF reports `bytes`, and
/// `stack` is writable for `bytes` bytes.
#[no_mangle]
pub unsafe extern "C" fn rvffi_prep_args(
    stack: *mut u8,
    ecif: *const ExtendedCif,
    bytes: usize,
    _flags: u32,
) {
    let ecif = &*ecif;
    let cif = &*ecif.cif;

    let avalue: &[*const c_void] = if cif.nargs() == 0 {
        &[]
    } else {
        slice::from_raw_parts(ecif.avalue, cif.nargs())
    };
    let image = slice::from_raw_parts_mut(stack, bytes);

    prep_args(cif, avalue, ecif.rvalue, image);
}

/// Run a closure invoked through its trampoline
///
/// `ar` is the saved `a0..a7` followed by the caller's stack arguments,
/// `fpr` the saved `fa0..fa7`. Returns the return flags for the glue
/// epilogue.
///
/// # Safety
///
/// `closure` was prepared by `prep_closure_loc`; `ar` covers the CIF's
/// full image and `fpr` eight 8-byte registers.
#[no_mangle]
pub unsafe extern "C" fn rvffi_closure_inner(
    closure: *const Closure,
    rvalue: *mut c_void,
    ar: *mut u8,
    fpr: *mut u8,
) -> u32 {
    let closure = &*closure;
    let image_len = closure.cif_ptr().as_ref().map_or(0, |cif| cif.bytes());
    let regs = SavedRegisters::from_raw(ar, image_len, fpr);

    closure_inner(closure, rvalue, &regs)
}

/// Install the logging subscriber described by the environment
#[no_mangle]
pub extern "C" fn rvffi_init() {
    crate::logging::init();
}
