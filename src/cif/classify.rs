//! Signature classification
//!
//! One left-to-right walk over the arguments assigns every value a slot
//! cursor position. The marshaler and decoder repeat the same walk, so the
//! alignment rule below is the contract between all three:
//! an argument aligned beyond the word size first moves the cursor to a
//! multiple of its alignment, then consumes `ceil(size / word)` slots.

use super::{
    SlotTag, FLAG_BITS, RETURN_SHIFT, SMALL_STRUCT, SMALL_STRUCT2, STRUCT_CODE_SHIFT, STRUCT_SOFT,
};
use crate::abi::{Abi, ARG_REGISTERS, STACK_ALIGN};
use crate::types::{align_up, code, slots_for, TypeDescriptor, TypeKind, TypeRef};

/// Result of classifying one signature
pub(super) struct Classification {
    pub flags: u32,
    pub bytes: usize,
    pub arg_bytes: usize,
    pub hidden_return: bool,
    pub scratch_bytes: usize,
}

pub(super) fn classify(abi: Abi, rtype: &TypeDescriptor, arg_types: &[TypeRef]) -> Classification {
    let (return_flags, hidden_return) = classify_return(abi, rtype);

    // A hidden return pointer owns slot 0
    let mut walk = SlotWalk::new(abi, usize::from(hidden_return));
    for ty in arg_types {
        walk.push(ty);
    }

    let register_area = abi.register_area();
    let arg_bytes = walk.cursor * abi.word_size();
    let bytes = register_area + align_up(arg_bytes.saturating_sub(register_area), STACK_ALIGN);

    let scratch_bytes = arg_types
        .iter()
        .filter(|t| t.is_struct())
        .map(|t| t.size() + t.alignment())
        .sum();

    Classification {
        flags: walk.flags | (return_flags << RETURN_SHIFT),
        bytes,
        arg_bytes,
        hidden_return,
        scratch_bytes,
    }
}

/// Slot cursor plus the tags recorded so far
struct SlotWalk {
    abi: Abi,
    word: usize,
    cursor: usize,
    flags: u32,
}

impl SlotWalk {
    #[inline]
    fn new(abi: Abi, first_slot: usize) -> Self {
        Self {
            abi,
            word: abi.word_size(),
            cursor: first_slot,
            flags: 0,
        }
    }

    #[inline]
    fn tag(&mut self, slot: usize, tag: SlotTag) {
        if slot < ARG_REGISTERS {
            self.flags |= (tag as u32) << (FLAG_BITS * slot as u32);
        }
    }

    /// Place one argument and advance past it
    fn push(&mut self, ty: &TypeDescriptor) {
        let (size, alignment) = (ty.abi_size(self.abi), ty.abi_alignment(self.abi));
        if alignment > self.word {
            self.cursor = align_up(self.cursor, alignment / self.word);
        }

        if self.abi.has_fp_registers() {
            match ty.kind() {
                TypeKind::Float => self.tag(self.cursor, SlotTag::Float),
                TypeKind::Double => {
                    self.tag(self.cursor, SlotTag::Double);
                    // On RV32 the double covers an even slot pair
                    if self.word < 8 {
                        self.tag(self.cursor + 1, SlotTag::Double);
                    }
                }
                TypeKind::Struct(members) => self.tag_struct_doubles(members),
                _ => {}
            }
        }

        self.cursor += slots_for(size, self.word);
    }

    /// Double members still inside the register file go in float registers
    fn tag_struct_doubles(&mut self, members: &[TypeRef]) {
        let mut loc = self.cursor * self.word;
        for member in members {
            loc = align_up(loc, member.alignment());
            if *member.kind() == TypeKind::Double {
                self.tag(loc / self.word, SlotTag::Double);
            }
            loc += member.size();
        }
    }
}

/// Return tag plus whether the value comes back through a hidden pointer
fn classify_return(abi: Abi, rtype: &TypeDescriptor) -> (u32, bool) {
    let soft = abi.is_soft_float();
    match rtype.kind() {
        TypeKind::Struct(_) => {
            let struct_code = return_struct_code(abi, rtype);
            if struct_code == 0 {
                (code::STRUCT, true)
            } else {
                (code::STRUCT | (struct_code << STRUCT_CODE_SHIFT), false)
            }
        }
        TypeKind::Void => (code::VOID, false),
        TypeKind::Pointer => (code::POINTER, false),
        TypeKind::LongDouble => (code::LONGDOUBLE, false),
        TypeKind::Float if soft => (code::INT, false),
        TypeKind::Float => (code::FLOAT, false),
        TypeKind::Double if soft => (code::UINT64, false),
        TypeKind::Double => (code::DOUBLE, false),
        TypeKind::U64 | TypeKind::I64 => (code::UINT64, false),
        TypeKind::U8
        | TypeKind::I8
        | TypeKind::U16
        | TypeKind::I16
        | TypeKind::U32
        | TypeKind::I32 => (code::INT, false),
    }
}

/// Register-return code for a struct; zero sends it through a hidden pointer
///
/// One or two leading float/double members are returned in float
/// registers. Any other shape of at most two words is packed into integer
/// registers. Three members led by two floating ones also fall back to the
/// packed code.
pub(crate) fn return_struct_code(abi: Abi, ty: &TypeDescriptor) -> u32 {
    let word = abi.word_size();
    if ty.size() > 2 * word {
        return 0;
    }

    let packed = if ty.size() > word { SMALL_STRUCT2 } else { SMALL_STRUCT };
    let members = ty.members();

    let Some(first) = members.first().and_then(|m| float_tag(m)) else {
        return packed;
    };
    let mut struct_code = first;

    if let Some(second) = members.get(1) {
        match float_tag(second) {
            Some(tag) => struct_code |= tag << FLAG_BITS,
            None => return packed,
        }

        if members.len() > 2 {
            return packed;
        }

        if abi.is_soft_float() {
            struct_code |= STRUCT_SOFT;
        }
    }

    struct_code
}

#[inline]
fn float_tag(ty: &TypeDescriptor) -> Option<u32> {
    match ty.kind() {
        TypeKind::Float => Some(code::FLOAT),
        TypeKind::Double => Some(code::DOUBLE),
        _ => None,
    }
}
