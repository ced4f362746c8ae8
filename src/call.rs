//! Call driver - hands a prepared call to the assembly glue
//!
//! The glue reserves `bytes` of stack, calls back into `rvffi_prep_args`
//! to fill it, loads the argument registers, calls the target and stores
//! the return registers according to the return flags.

use core::ffi::c_void;

use crate::cif::Cif;
use crate::ffi::rvffi_prep_args;
use crate::logging::log_ffi_call;
use crate::marshal::ExtendedCif;
use crate::types::TypeKind;

/// Signature of the marshaling callback the glue invokes
pub type PrepArgsFn =
    unsafe extern "C" fn(stack: *mut u8, ecif: *const ExtendedCif, bytes: usize, flags: u32);

/// Low-level call glue, one entry per word size
pub trait CallGlue {
    /// # Safety
    ///
    /// `ecif` describes a valid call and `fun` has the CIF's signature.
    unsafe fn call_rv32(
        &self,
        prep: PrepArgsFn,
        ecif: &ExtendedCif,
        bytes: usize,
        flags: u32,
        rvalue: *mut c_void,
        fun: *const c_void,
    );

    /// # Safety
    ///
    /// Same contract as `call_rv32`.
    unsafe fn call_rv64(
        &self,
        prep: PrepArgsFn,
        ecif: &ExtendedCif,
        bytes: usize,
        flags: u32,
        rvalue: *mut c_void,
        fun: *const c_void,
    );
}

/// Call `fun` through `glue` with the arguments in `avalue`
///
/// A struct return with a null `rvalue` gets temporary storage that is
/// dropped after the call.
///
/// # Safety
///
/// `avalue` holds one valid pointer per CIF argument, `rvalue` (when not
/// null) is large enough for the return value, and `fun` matches the CIF.
pub unsafe fn call<G: CallGlue + ?Sized>(
    cif: &Cif,
    glue: &G,
    fun: *const c_void,
    rvalue: *mut c_void,
    avalue: &[*const c_void],
) {
    let mut struct_storage: Vec<u64> = Vec::new();
    let rvalue = if rvalue.is_null() && matches!(cif.rtype().kind(), TypeKind::Struct(_)) {
        struct_storage.resize(cif.rtype().size().div_ceil(8), 0);
        struct_storage.as_mut_ptr().cast()
    } else {
        rvalue
    };

    let ecif = ExtendedCif::new(cif, avalue, rvalue);
    log_ffi_call(cif.abi(), cif.nargs(), cif.bytes());

    if cif.abi().is_64bit() {
        glue.call_rv64(rvffi_prep_args, &ecif, cif.bytes(), cif.flags(), rvalue, fun);
    } else {
        glue.call_rv32(rvffi_prep_args, &ecif, cif.bytes(), cif.flags(), rvalue, fun);
    }
}
