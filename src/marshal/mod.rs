//! Forward marshaler - caller values into the outgoing argument image
//!
//! Design: The same slot walk as the classifier, driving a bounds-checked
//! writer over the ring-mapped image (see `image.rs`). Values no wider than
//! a slot are widened per their declared type; wider values are copied
//! verbatim at natural size.

mod image;

pub use image::{ImageLayout, ImageWriter};

use core::ffi::c_void;
use core::ptr;

use crate::abi::Abi;
use crate::cif::Cif;
use crate::logging::log_args_marshaled;
use crate::types::TypeKind;

/// Call context handed to the glue and back to `rvffi_prep_args`
#[repr(C)]
#[derive(Debug)]
pub struct ExtendedCif {
    pub cif: *const Cif,
    pub avalue: *const *const c_void,
    pub rvalue: *mut c_void,
}

impl ExtendedCif {
    pub fn new(cif: &Cif, avalue: &[*const c_void], rvalue: *mut c_void) -> Self {
        Self {
            cif,
            avalue: avalue.as_ptr(),
            rvalue,
        }
    }
}

#[inline(always)]
unsafe fn read<T: Copy>(value: *const c_void) -> T {
    ptr::read_unaligned(value.cast::<T>())
}

/// Host address as the callee sees it, zero-extended from the ABI's pointer width
#[inline]
fn abi_address(abi: Abi, addr: usize) -> u64 {
    let addr = addr as u64;
    debug_assert!(
        abi.is_64bit() || addr <= u64::from(u32::MAX),
        "address {addr:#x} does not fit an {abi} pointer"
    );
    if abi.pointer_width() < 8 {
        addr & u64::from(u32::MAX)
    } else {
        addr
    }
}

/// Fill `image` with the arguments of one call
///
/// `image` must be exactly `cif.bytes()` long; it is zeroed first. A
/// hidden-pointer CIF gets `rvalue` in slot 0.
///
/// # Safety
///
/// `avalue` holds at least `cif.nargs()` pointers, each valid for reads of
/// its argument type's size. Under the RV32 ABIs every address, `rvalue`
/// included, fits in 32 bits.
pub unsafe fn prep_args(
    cif: &Cif,
    avalue: &[*const c_void],
    rvalue: *mut c_void,
    image: &mut [u8],
) {
    assert!(avalue.len() >= cif.nargs(), "missing argument values");
    image.fill(0);

    let abi = cif.abi();
    let word = abi.word_size();
    let mut w = ImageWriter::new(image, ImageLayout::for_cif(cif), word);

    if cif.returns_via_hidden_pointer() {
        w.write_word(abi_address(abi, rvalue as usize));
    }

    for (ty, &value) in cif.arg_types().iter().zip(avalue) {
        let size = ty.abi_size(abi);
        w.align(ty.abi_alignment(abi).max(word));

        if size > word {
            w.write(core::slice::from_raw_parts(value.cast::<u8>(), size));
            w.align(word);
            continue;
        }

        let bits = match ty.kind() {
            TypeKind::I8 => read::<i8>(value) as i64 as u64,
            TypeKind::U8 => read::<u8>(value) as u64,
            TypeKind::I16 => read::<i16>(value) as i64 as u64,
            TypeKind::U16 => read::<u16>(value) as u64,
            TypeKind::I32 => read::<i32>(value) as i64 as u64,
            TypeKind::U32 => read::<u32>(value) as u64,
            // Raw single bits; the glue NaN-boxes register copies
            TypeKind::Float => read::<u32>(value) as u64,
            TypeKind::Pointer => abi_address(abi, read::<usize>(value)),
            TypeKind::U64 | TypeKind::I64 | TypeKind::Double => read::<u64>(value),
            TypeKind::Struct(_) | TypeKind::LongDouble => {
                w.write(core::slice::from_raw_parts(value.cast::<u8>(), size));
                w.align(word);
                continue;
            }
            TypeKind::Void => unreachable!("void arguments are rejected by prep_cif"),
        };
        w.write_word(bits);
    }

    log_args_marshaled(cif.nargs(), cif.bytes());
}
