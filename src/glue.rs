//! Software model of the assembly call/closure glue
//!
//! Design: Mirrors what the glue does around a call so the marshaler and
//! decoder can be exercised end to end on any host:
//! - `CallFrame` - registers loaded from an outgoing image
//! - `ReturnRegisters` - `a0/a1/fa0/fa1` after the callee returns
//! - `store_return`/`load_return` - the glue epilogues for calls and closures

use core::ffi::c_void;
use core::ptr;

use crate::abi::{Abi, ARG_REGISTERS, FLOAT_REGISTER_SIZE};
use crate::cif::{Cif, ReturnFlags, SlotTag, SMALL_STRUCT, SMALL_STRUCT2};
use crate::decode::FLOAT_FILE_SIZE;
use crate::marshal::ImageLayout;
use crate::types::{code, TypeDescriptor};

const NAN_BOX: u64 = 0xffff_ffff_0000_0000;

/// Box a single into a 64-bit float register
#[inline]
pub const fn nan_box(bits: u32) -> u64 {
    NAN_BOX | bits as u64
}

/// Registers and stack as the callee sees them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFrame {
    abi: Abi,
    /// `a0..a7`, zero-extended to 64 bits
    pub a: [u64; ARG_REGISTERS],
    /// `fa0..fa7`; untouched registers stay zero
    pub fa: [u64; ARG_REGISTERS],
    logical: Vec<u8>,
}

impl CallFrame {
    /// Load registers from a physical outgoing image the way the glue does
    pub fn from_call_image(cif: &Cif, image: &[u8]) -> Self {
        let abi = cif.abi();
        let word = abi.word_size();
        let logical = ImageLayout::for_cif(cif).linearize(image);

        let mut a = [0u64; ARG_REGISTERS];
        for (slot, reg) in a.iter_mut().enumerate() {
            *reg = read_le(&logical[slot * word..(slot + 1) * word]);
        }

        let mut fa = [0u64; ARG_REGISTERS];
        if abi.has_fp_registers() {
            let mut slot = 0;
            while slot < ARG_REGISTERS {
                match cif.slot_tag(slot) {
                    SlotTag::Int => {}
                    SlotTag::Float => fa[slot] = nan_box(a[slot] as u32),
                    SlotTag::Double if word == 8 => fa[slot] = a[slot],
                    SlotTag::Double => {
                        fa[slot] = read_le(&logical[slot * word..slot * word + 8]);
                        // Second half of the pair
                        slot += 1;
                    }
                }
                slot += 1;
            }
        }

        Self {
            abi,
            a,
            fa,
            logical,
        }
    }

    #[inline]
    pub fn abi(&self) -> Abi {
        self.abi
    }

    /// `a0..a7` stored contiguously, then the stack arguments
    #[inline]
    pub fn logical_image(&self) -> &[u8] {
        &self.logical
    }

    /// Stack arguments at the callee's `sp`
    #[inline]
    pub fn stack(&self) -> &[u8] {
        &self.logical[self.abi.register_area()..]
    }

    /// Float registers as the closure entry saves them
    pub fn float_file(&self) -> [u8; FLOAT_FILE_SIZE] {
        let mut file = [0u8; FLOAT_FILE_SIZE];
        for (chunk, reg) in file.chunks_exact_mut(FLOAT_REGISTER_SIZE).zip(self.fa) {
            chunk.copy_from_slice(&reg.to_le_bytes());
        }
        file
    }
}

/// Return registers after a call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReturnRegisters {
    pub a0: u64,
    pub a1: u64,
    pub fa0: u64,
    pub fa1: u64,
}

#[inline]
fn read_le(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

/// `a0` and `a1` at word width, back to back
fn packed_pair(regs: &ReturnRegisters, word: usize) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[..word].copy_from_slice(&regs.a0.to_le_bytes()[..word]);
    out[word..2 * word].copy_from_slice(&regs.a1.to_le_bytes()[..word]);
    out
}

fn unpack_pair(bytes: &[u8; 16], word: usize) -> (u64, u64) {
    (read_le(&bytes[..word]), read_le(&bytes[word..2 * word]))
}

/// Offsets of the first two members of a float-returned struct
fn float_member_offsets(rtype: &TypeDescriptor) -> (usize, Option<usize>) {
    let offsets = rtype.member_offsets();
    (offsets.first().copied().unwrap_or(0), offsets.get(1).copied())
}

/// Struct returned in `a0:a1` rather than float registers
#[inline]
fn returns_packed(cif: &Cif, ret: ReturnFlags) -> bool {
    let c = ret.struct_code();
    c == SMALL_STRUCT || c == SMALL_STRUCT2 || ret.is_soft_struct() || cif.abi().is_soft_float()
}

/// Write a float register at the width of `tag`
#[inline]
unsafe fn store_float(reg: u64, tag: SlotTag, dst: *mut u8) {
    let width = if tag == SlotTag::Float { 4 } else { 8 };
    ptr::copy_nonoverlapping(reg.to_le_bytes().as_ptr(), dst, width);
}

/// Move the callee's return registers into `rvalue`
///
/// # Safety
///
/// `rvalue` is valid for writes of the return type's size, widened to one
/// word for integer returns. Pointers are written at host width.
pub unsafe fn store_return(cif: &Cif, regs: &ReturnRegisters, rvalue: *mut c_void) {
    let word = cif.abi().word_size();
    let ret = cif.return_flags();
    let rtype = cif.rtype();
    let dst = rvalue.cast::<u8>();

    match ret.tag() {
        code::VOID => {}
        code::INT => ptr::copy_nonoverlapping(regs.a0.to_le_bytes().as_ptr(), dst, word),
        code::POINTER => {
            let addr = read_le(&regs.a0.to_le_bytes()[..cif.abi().pointer_width()]) as usize;
            ptr::write_unaligned(dst.cast::<usize>(), addr);
        }
        code::UINT64 | code::LONGDOUBLE => {
            let bytes = packed_pair(regs, word);
            ptr::copy_nonoverlapping(bytes.as_ptr(), dst, rtype.size().min(2 * word));
        }
        code::FLOAT => ptr::copy_nonoverlapping(regs.fa0.to_le_bytes().as_ptr(), dst, 4),
        code::DOUBLE => ptr::copy_nonoverlapping(regs.fa0.to_le_bytes().as_ptr(), dst, 8),
        code::STRUCT => match ret.struct_code() {
            0 => {}
            _ if returns_packed(cif, ret) => {
                let bytes = packed_pair(regs, word);
                ptr::copy_nonoverlapping(bytes.as_ptr(), dst, rtype.size());
            }
            _ => {
                let (first, second) = float_member_offsets(rtype);
                store_float(regs.fa0, ret.member_tag(0), dst.add(first));
                if let (Some(offset), t1) = (second, ret.member_tag(1)) {
                    if t1 != SlotTag::Int {
                        store_float(regs.fa1, t1, dst.add(offset));
                    }
                }
            }
        },
        _ => unreachable!("return tag is always a type code"),
    }
}

/// Load the return registers from a closure's return storage
///
/// # Safety
///
/// `rvalue` is valid for reads of the size `store_return` would write.
pub unsafe fn load_return(cif: &Cif, rvalue: *const c_void) -> ReturnRegisters {
    let word = cif.abi().word_size();
    let ret = cif.return_flags();
    let rtype = cif.rtype();
    let src = rvalue.cast::<u8>();
    let mut regs = ReturnRegisters::default();

    let read = |offset: usize, len: usize| -> u64 {
        let mut buf = [0u8; 8];
        ptr::copy_nonoverlapping(src.add(offset), buf.as_mut_ptr(), len);
        u64::from_le_bytes(buf)
    };

    let read_packed = |len: usize| -> (u64, u64) {
        let mut bytes = [0u8; 16];
        ptr::copy_nonoverlapping(src, bytes.as_mut_ptr(), len);
        unpack_pair(&bytes, word)
    };

    match ret.tag() {
        code::VOID => {}
        code::INT | code::POINTER => regs.a0 = read(0, word),
        code::UINT64 | code::LONGDOUBLE => {
            (regs.a0, regs.a1) = read_packed(rtype.size().min(2 * word));
        }
        code::FLOAT => regs.fa0 = nan_box(read(0, 4) as u32),
        code::DOUBLE => regs.fa0 = read(0, 8),
        code::STRUCT => match ret.struct_code() {
            0 => {}
            _ if returns_packed(cif, ret) => {
                (regs.a0, regs.a1) = read_packed(rtype.size());
            }
            _ => {
                let (first, second) = float_member_offsets(rtype);
                let load = |tag: SlotTag, offset: usize| match tag {
                    SlotTag::Float => nan_box(read(offset, 4) as u32),
                    _ => read(offset, 8),
                };
                regs.fa0 = load(ret.member_tag(0), first);
                if let Some(offset) = second {
                    if ret.member_tag(1) != SlotTag::Int {
                        regs.fa1 = load(ret.member_tag(1), offset);
                    }
                }
            }
        },
        _ => unreachable!("return tag is always a type code"),
    }

    regs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cif::prep_cif;
    use crate::marshal::prep_args;
    use crate::types::TypeDescriptor as T;

    fn frame(cif: &Cif, avalue: &[*const c_void]) -> CallFrame {
        let mut image = vec![0u8; cif.bytes()];
        unsafe { prep_args(cif, avalue, ptr::null_mut(), &mut image) };
        CallFrame::from_call_image(cif, &image)
    }

    #[test]
    fn test_float_registers_follow_tags() {
        let args = vec![T::sint32(), T::float(), T::double()];
        let cif = prep_cif(Abi::Rv64, T::void(), args).unwrap();
        let (i, f, d) = (3i32, 1.0f32, 2.0f64);
        let avalue: [*const c_void; 3] =
            [(&i as *const i32).cast(), (&f as *const f32).cast(), (&d as *const f64).cast()];
        let frame = frame(&cif, &avalue);

        assert_eq!(frame.a[0], 3);
        assert_eq!(frame.fa[0], 0);
        assert_eq!(frame.fa[1], nan_box(f.to_bits()));
        assert_eq!(frame.fa[2], d.to_bits());
    }

    #[test]
    fn test_rv32_double_pair_fills_one_register() {
        let cif = prep_cif(Abi::Rv32, T::void(), vec![T::double()]).unwrap();
        let d = -3.5f64;
        let frame = frame(&cif, &[(&d as *const f64).cast()]);

        assert_eq!(frame.fa[0], d.to_bits());
        assert_eq!(frame.fa[1], 0);
        assert_eq!(frame.a[0], d.to_bits() & 0xffff_ffff);
        assert_eq!(frame.a[1], d.to_bits() >> 32);
    }

    #[test]
    fn test_soft_float_leaves_float_file_empty() {
        let cif = prep_cif(Abi::Rv64SoftFloat, T::void(), vec![T::double()]).unwrap();
        let d = 1.25f64;
        let frame = frame(&cif, &[(&d as *const f64).cast()]);
        assert_eq!(frame.fa, [0; ARG_REGISTERS]);
        assert_eq!(frame.a[0], d.to_bits());
    }

    #[test]
    fn test_stack_view() {
        let cif = prep_cif(Abi::Rv64, T::void(), vec![T::sint64(); 9]).unwrap();
        let values: Vec<i64> = (10..19).collect();
        let avalue: Vec<*const c_void> = values.iter().map(|v| (v as *const i64).cast()).collect();
        let frame = frame(&cif, &avalue);

        assert_eq!(frame.a[7], 17);
        assert_eq!(&frame.stack()[..8], &18i64.to_le_bytes());
        assert_eq!(frame.logical_image().len(), cif.bytes());
    }

    #[test]
    fn test_store_float_pair_struct() {
        let s = T::structure(vec![T::float(), T::double()]).unwrap();
        let cif = prep_cif(Abi::Rv64, s, vec![]).unwrap();
        let regs = ReturnRegisters {
            fa0: nan_box(1.5f32.to_bits()),
            fa1: 9.0f64.to_bits(),
            ..Default::default()
        };

        #[repr(C)]
        #[derive(Default)]
        struct FloatDouble {
            f: f32,
            d: f64,
        }

        let mut out = FloatDouble::default();
        unsafe { store_return(&cif, &regs, (&mut out as *mut FloatDouble).cast()) };
        assert_eq!(out.f, 1.5);
        assert_eq!(out.d, 9.0);

        let back = unsafe { load_return(&cif, (&out as *const FloatDouble).cast()) };
        assert_eq!(back, regs);
    }

    #[test]
    fn test_store_packed_struct_rv32() {
        let s = T::structure(vec![T::sint32(), T::sint32()]).unwrap();
        let cif = prep_cif(Abi::Rv32, s, vec![]).unwrap();
        let regs = ReturnRegisters {
            a0: 7,
            a1: 0xffff_fffe,
            ..Default::default()
        };

        let mut out = [0i32; 2];
        unsafe { store_return(&cif, &regs, out.as_mut_ptr().cast()) };
        assert_eq!(out, [7, -2]);
        assert_eq!(unsafe { load_return(&cif, out.as_ptr().cast()) }, regs);
    }

    #[test]
    fn test_store_scalars() {
        let cif = prep_cif(Abi::Rv32, T::uint64(), vec![]).unwrap();
        let regs = ReturnRegisters {
            a0: 0x5566_7788,
            a1: 0x1122_3344,
            ..Default::default()
        };
        let mut out = 0u64;
        unsafe { store_return(&cif, &regs, (&mut out as *mut u64).cast()) };
        assert_eq!(out, 0x1122_3344_5566_7788);

        let cif = prep_cif(Abi::Rv64, T::float(), vec![]).unwrap();
        let mut f = 0f32;
        let regs = ReturnRegisters {
            fa0: nan_box(2.5f32.to_bits()),
            ..Default::default()
        };
        unsafe { store_return(&cif, &regs, (&mut f as *mut f32).cast()) };
        assert_eq!(f, 2.5);
    }

    #[test]
    fn test_rv32_pointer_return_is_zero_extended() {
        let cif = prep_cif(Abi::Rv32, T::pointer(), vec![]).unwrap();
        let regs = ReturnRegisters {
            a0: 0xffff_ffff_8000_1230,
            ..Default::default()
        };

        let mut out = usize::MAX;
        unsafe { store_return(&cif, &regs, (&mut out as *mut usize).cast()) };
        assert_eq!(out, 0x8000_1230);

        let back = unsafe { load_return(&cif, (&out as *const usize).cast()) };
        assert_eq!(back.a0, 0x8000_1230);
    }
}
