//! Reverse decoder - saved registers back into per-argument pointers
//!
//! Design: Repeats the classifier's slot walk over what the closure entry
//! saved: the integer image (`a0..a7` followed by the caller's stack
//! arguments) and the float register file. Values that already sit in
//! their natural form are aliased in place; everything else is rebuilt in
//! `DecodeScratch`.

mod scratch;


pub use scratch::DecodeScratch;

use core::cell::Cell;
use core::ffi::c_void;
use core::marker::PhantomData;
use core::ptr;

use crate::abi::{ARG_REGISTERS, FLOAT_REGISTER_SIZE};
use crate::cif::{Cif, SlotTag, RETURN_SHIFT};
use crate::closure::Closure;
use crate::logging::{log_args_decoded, log_invariant_violation};
use crate::types::{align_up, slots_for, TypeDescriptor, TypeKind};

/// Bytes of the saved float register file
pub const FLOAT_FILE_SIZE: usize = ARG_REGISTERS * FLOAT_REGISTER_SIZE;

/// Register state saved by the closure entry
pub struct SavedRegisters<'a> {
    ar: *mut u8,
    ar_len: usize,
    fpr: *mut u8,
    _marker: PhantomData<&'a mut [u8]>,
}

impl<'a> SavedRegisters<'a> {
    pub fn new(ar: &'a mut [u8], fpr: &'a mut [u8; FLOAT_FILE_SIZE]) -> Self {
        Self {
            ar: ar.as_mut_ptr(),
            ar_len: ar.len(),
            fpr: fpr.as_mut_ptr(),
            _marker: PhantomData,
        }
    }

    /// # Safety
    ///
    /// `ar` is valid for `ar_len` bytes and `fpr` for `FLOAT_FILE_SIZE`
    /// bytes, both for reads and writes, for `'a`.
    pub unsafe fn from_raw(ar: *mut u8, ar_len: usize, fpr: *mut u8) -> Self {
        Self {
            ar,
            ar_len,
            fpr,
            _marker: PhantomData,
        }
    }

    /// Address of `len` bytes at byte `offset` of the integer image
    #[inline]
    fn int_at(&self, offset: usize, len: usize) -> *mut u8 {
        assert!(offset + len <= self.ar_len, "read past the saved argument image");
        unsafe { self.ar.add(offset) }
    }

    #[inline]
    fn float_at(&self, reg: usize) -> *mut u8 {
        assert!(reg < ARG_REGISTERS, "float register out of range");
        unsafe { self.fpr.add(reg * FLOAT_REGISTER_SIZE) }
    }

    /// Zero-extended integer slot
    #[inline]
    fn word(&self, slot: usize, word: usize) -> u64 {
        let mut bytes = [0u8; 8];
        let src = self.int_at(slot * word, word);
        unsafe { ptr::copy_nonoverlapping(src, bytes.as_mut_ptr(), word) };
        u64::from_le_bytes(bytes)
    }
}

/// Decode every argument of `cif` into `scratch.args()`
///
/// Returns the return storage: `rvalue`, or the address passed in slot 0
/// for hidden-pointer CIFs.
///
/// # Safety
///
/// `regs` must hold the registers saved for a call through `cif`. The
/// pointers left in `scratch` alias `regs` and `scratch` itself.
pub unsafe fn decode_args(
    cif: &Cif,
    rvalue: *mut c_void,
    regs: &SavedRegisters<'_>,
    scratch: &mut DecodeScratch,
) -> *mut c_void {
    let abi = cif.abi();
    let word = abi.word_size();
    let hard_float = abi.has_fp_registers();
    scratch.reset(cif);

    let mut argn = 0usize;
    let rvalue = if cif.returns_via_hidden_pointer() {
        argn = 1;
        regs.word(0, word) as usize as *mut c_void
    } else {
        rvalue
    };

    for (index, ty) in cif.arg_types().iter().enumerate() {
        let (size, alignment) = (ty.abi_size(abi), ty.abi_alignment(abi));
        if alignment > word {
            argn = align_up(argn, alignment / word);
        }

        let arg = match ty.kind() {
            TypeKind::Float | TypeKind::Double if hard_float && argn < ARG_REGISTERS => {
                debug_assert_ne!(cif.slot_tag(argn), SlotTag::Int);
                regs.float_at(argn)
            }
            TypeKind::Pointer => {
                // RV32 addresses are unsigned; `word` zero-extends
                let dst = scratch.word(index);
                ptr::write(dst.cast::<usize>(), regs.word(argn, word) as usize);
                dst
            }
            TypeKind::Float if !hard_float => {
                let dst = scratch.word(index);
                ptr::copy_nonoverlapping(regs.int_at(argn * word, 4), dst, 4);
                dst
            }
            TypeKind::U8
            | TypeKind::I8
            | TypeKind::U16
            | TypeKind::I16
            | TypeKind::U32
            | TypeKind::I32
                if size < word =>
            {
                let dst = scratch.word(index);
                ptr::write(dst.cast::<u64>(), widen(ty.kind(), regs.word(argn, word)));
                dst
            }
            TypeKind::Struct(_) if argn < ARG_REGISTERS => {
                let dst = scratch.alloc(size, alignment);
                copy_struct(dst, argn, ty, regs, word, hard_float);
                dst
            }
            _ => regs.int_at(argn * word, size),
        };

        scratch.push_arg(arg);
        argn += slots_for(size, word);
    }

    log_args_decoded(cif.nargs(), cif.flags() >> RETURN_SHIFT);
    rvalue
}

/// Sign- or zero-extend a narrow integer slot per its declared type
#[inline]
fn widen(kind: &TypeKind, slot: u64) -> u64 {
    match kind {
        TypeKind::I8 => slot as i8 as i64 as u64,
        TypeKind::U8 => slot as u8 as u64,
        TypeKind::I16 => slot as i16 as i64 as u64,
        TypeKind::U16 => slot as u16 as u64,
        TypeKind::I32 => slot as i32 as i64 as u64,
        TypeKind::U32 => slot as u32 as u64,
        _ => slot,
    }
}

/// Reassemble a struct that starts in the register area
///
/// Double members still inside the register file come from the float
/// registers under hard-float; every other byte comes from the integer
/// image, which may run on into the stack arguments.
unsafe fn copy_struct(
    dst: *mut u8,
    first_slot: usize,
    ty: &TypeDescriptor,
    regs: &SavedRegisters<'_>,
    word: usize,
    hard_float: bool,
) {
    let base = first_slot * word;
    for (member, offset) in ty.members().iter().zip(ty.member_offsets()) {
        let slot = first_slot + offset / word;
        let src = if hard_float && *member.kind() == TypeKind::Double && slot < ARG_REGISTERS {
            regs.float_at(slot)
        } else {
            regs.int_at(base + offset, member.size())
        };
        ptr::copy_nonoverlapping(src, dst.add(offset), member.size());
    }
}

thread_local! {
    static SCRATCH: Cell<Option<Box<DecodeScratch>>> = const { Cell::new(None) };
}

/// Decode, run the closure's callback, and hand back the return flags
///
/// Scratch storage is cached per thread; a nested invocation on the same
/// thread gets its own.
///
/// # Safety
///
/// `closure` was prepared by `prep_closure_loc` and its CIF is still
/// alive. `regs` holds the registers saved for this invocation.
pub unsafe fn closure_inner(
    closure: &Closure,
    rvalue: *mut c_void,
    regs: &SavedRegisters<'_>,
) -> u32 {
    let (cif, fun) = match (closure.cif_ptr().as_ref(), closure.fun()) {
        (Some(cif), Some(fun)) => (cif, fun),
        _ => {
            log_invariant_violation("closure invoked before prep_closure_loc");
            std::process::abort();
        }
    };

    let mut scratch = SCRATCH.with(Cell::take).unwrap_or_default();
    let rvalue = decode_args(cif, rvalue, regs, &mut scratch);
    fun(cif, rvalue, scratch.args_mut_ptr(), closure.user_data());
    SCRATCH.with(|cell| cell.set(Some(scratch)));

    cif.flags() >> RETURN_SHIFT
}
