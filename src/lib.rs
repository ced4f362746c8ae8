//! rvffi - RISC-V foreign function interface core
//!
//! Classifies C signatures for the RV32/RV64 calling conventions, lays
//! argument values out for the call glue, decodes incoming closure
//! arguments and writes closure trampolines.

pub mod abi;
pub mod call;
pub mod cif;
pub mod closure;
pub mod config;
pub mod decode;
pub mod error;
pub mod ffi;
pub mod glue;
pub mod logging;
pub mod marshal;
pub mod types;

// Re-export commonly used items
pub use abi::Abi;
pub use call::{call, CallGlue, PrepArgsFn};
pub use cif::{
    prep_cif, prep_cif_code, prep_cif_default, CacheStats, Cif, CifCache, ReturnFlags, SlotTag,
};
pub use closure::{prep_closure_loc, Closure, ClosureEntry, ClosureFn};
pub use config::{runtime_config, RuntimeConfig};
pub use decode::{closure_inner, decode_args, DecodeScratch, SavedRegisters};
pub use error::{FfiError, Status};
pub use marshal::{prep_args, ExtendedCif};
pub use types::{TypeDescriptor, TypeKind, TypeRef};
