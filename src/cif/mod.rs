//! Call interfaces - classified, immutable function signatures
//!
//! Design: A `Cif` is built once by a pure classifier and shared read-only
//! by every call that uses it:
//! - `classify.rs` - register-class walk and return-struct policy
//! - `cache.rs` - concurrent signature -> `Arc<Cif>` cache
//!
//! Flags word layout:
//! - bits `2i..2i+1`, `i < 8`: slot tag of argument slot `i`
//! - bits `16..19`: return tag (a type code)
//! - bits `20..`: return struct code

mod classify;
mod cache;


pub use cache::{CacheStats, CifCache};

use crate::abi::{Abi, ARG_REGISTERS};
use crate::error::FfiError;
use crate::logging::log_cif_prepared;
use crate::types::{code, TypeKind, TypeRef};

/// Bits per argument slot in the flags word
pub const FLAG_BITS: u32 = 2;

/// Shift of the return flags inside the flags word
pub const RETURN_SHIFT: u32 = FLAG_BITS * ARG_REGISTERS as u32;

/// Shift of the struct code inside the return flags
pub const STRUCT_CODE_SHIFT: u32 = 4;

/// Generic packed struct of at most one word
pub const SMALL_STRUCT: u32 = code::UINT8;

/// Generic packed struct of two words
pub const SMALL_STRUCT2: u32 = code::SINT8;

/// Two floating members returned under a soft-float ABI
pub const STRUCT_SOFT: u32 = 16;

/// Register class of one argument slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SlotTag {
    /// Integer register (or nothing special)
    Int = 0,
    /// Single in the matching float register
    Float = code::FLOAT,
    /// Double in the matching float register
    Double = code::DOUBLE,
}

impl SlotTag {
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            2 => Self::Float,
            3 => Self::Double,
            _ => Self::Int,
        }
    }
}

/// Return half of the flags word, handed back to the glue after a closure runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct ReturnFlags(u32);

impl ReturnFlags {
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Return type tag
    #[inline]
    pub const fn tag(self) -> u32 {
        self.0 & 0xf
    }

    /// Struct return code; zero means the hidden-pointer path
    #[inline]
    pub const fn struct_code(self) -> u32 {
        self.0 >> STRUCT_CODE_SHIFT
    }

    /// Tag of struct member `i` (0 or 1) for a floating return code
    #[inline]
    pub const fn member_tag(self, i: u32) -> SlotTag {
        SlotTag::from_bits(self.struct_code() >> (FLAG_BITS * i))
    }

    #[inline]
    pub const fn is_soft_struct(self) -> bool {
        self.struct_code() & STRUCT_SOFT != 0
    }
}

/// Classified call interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cif {
    abi: Abi,
    rtype: TypeRef,
    arg_types: Vec<TypeRef>,
    bytes: usize,
    arg_bytes: usize,
    flags: u32,
    hidden_return: bool,
    scratch_bytes: usize,
}

impl Cif {
    #[inline]
    pub fn abi(&self) -> Abi {
        self.abi
    }

    #[inline]
    pub fn rtype(&self) -> &TypeRef {
        &self.rtype
    }

    #[inline]
    pub fn arg_types(&self) -> &[TypeRef] {
        &self.arg_types
    }

    #[inline]
    pub fn nargs(&self) -> usize {
        self.arg_types.len()
    }

    /// Physical size of the outgoing image (register area + stack area)
    #[inline]
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Logical bytes the arguments occupy, hidden pointer included
    #[inline]
    pub fn arg_bytes(&self) -> usize {
        self.arg_bytes
    }

    #[inline]
    pub fn flags(&self) -> u32 {
        self.flags
    }

    #[inline]
    pub fn returns_via_hidden_pointer(&self) -> bool {
        self.hidden_return
    }

    /// Decoder scratch needed for struct arguments
    #[inline]
    pub fn scratch_bytes(&self) -> usize {
        self.scratch_bytes
    }

    /// Tag of argument slot `slot`; slots past the register file are plain
    #[inline]
    pub fn slot_tag(&self, slot: usize) -> SlotTag {
        if slot >= ARG_REGISTERS {
            return SlotTag::Int;
        }
        SlotTag::from_bits(self.flags >> (FLAG_BITS * slot as u32))
    }

    #[inline]
    pub fn return_flags(&self) -> ReturnFlags {
        ReturnFlags(self.flags >> RETURN_SHIFT)
    }
}

/// Classify a signature
///
/// Rejects `void` arguments; struct typedefs were validated when built.
pub fn prep_cif(abi: Abi, rtype: TypeRef, arg_types: Vec<TypeRef>) -> Result<Cif, FfiError> {
    if let Some(index) = arg_types.iter().position(|t| *t.kind() == TypeKind::Void) {
        return Err(FfiError::BadArgType { index });
    }

    let c = classify::classify(abi, &rtype, &arg_types);
    let cif = Cif {
        abi,
        rtype,
        arg_types,
        bytes: c.bytes,
        arg_bytes: c.arg_bytes,
        flags: c.flags,
        hidden_return: c.hidden_return,
        scratch_bytes: c.scratch_bytes,
    };

    log_cif_prepared(abi, cif.nargs(), cif.flags, cif.bytes);
    Ok(cif)
}

/// Classify a signature given a C ABI code
pub fn prep_cif_code(abi: u32, rtype: TypeRef, arg_types: Vec<TypeRef>) -> Result<Cif, FfiError> {
    prep_cif(Abi::from_code(abi)?, rtype, arg_types)
}

/// Classify a signature for the configured default ABI
pub fn prep_cif_default(rtype: TypeRef, arg_types: Vec<TypeRef>) -> Result<Cif, FfiError> {
    prep_cif(crate::config::runtime_config().default_abi, rtype, arg_types)
}
