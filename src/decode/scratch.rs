//! Per-call scratch storage for decoded arguments
//!
//! Design: One word per argument for narrowed scalars plus a bump arena for
//! reassembled structs. Both are sized in `reset` from the CIF and never
//! grow mid-call, so every pointer handed out stays valid until the next
//! reset.

use core::ffi::c_void;

use crate::cif::Cif;
use crate::types::align_up;

const CHUNK: usize = 16;

/// Arena granule; its alignment covers every member type
#[derive(Clone, Copy)]
#[repr(C, align(16))]
struct Chunk([u8; CHUNK]);

/// Scratch storage reused across closure invocations
pub struct DecodeScratch {
    words: Vec<u64>,
    arena: Vec<Chunk>,
    used: usize,
    args: Vec<*mut c_void>,
}

impl DecodeScratch {
    pub const fn new() -> Self {
        Self {
            words: Vec::new(),
            arena: Vec::new(),
            used: 0,
            args: Vec::new(),
        }
    }

    /// Size everything for one call through `cif`
    pub fn reset(&mut self, cif: &Cif) {
        self.words.clear();
        self.words.resize(cif.nargs(), 0);

        self.arena.clear();
        self.arena.resize(cif.scratch_bytes().div_ceil(CHUNK), Chunk([0; CHUNK]));
        self.used = 0;

        self.args.clear();
        self.args.reserve(cif.nargs());
    }

    /// Zeroed word for argument `index`
    #[inline]
    pub(super) fn word(&mut self, index: usize) -> *mut u8 {
        assert!(index < self.words.len(), "scratch word out of range");
        unsafe { self.words.as_mut_ptr().add(index).cast() }
    }

    /// Bump-allocate `size` bytes at `align` (at most 16)
    pub(super) fn alloc(&mut self, size: usize, align: usize) -> *mut u8 {
        debug_assert!(align.is_power_of_two() && align <= CHUNK);

        let offset = align_up(self.used, align);
        assert!(offset + size <= self.arena.len() * CHUNK, "decode scratch exhausted");
        self.used = offset + size;

        unsafe { self.arena.as_mut_ptr().cast::<u8>().add(offset) }
    }

    #[inline]
    pub(super) fn push_arg(&mut self, arg: *mut u8) {
        self.args.push(arg.cast());
    }

    /// Decoded argument pointers, in declaration order
    #[inline]
    pub fn args(&self) -> &[*mut c_void] {
        &self.args
    }

    #[inline]
    pub(super) fn args_mut_ptr(&mut self) -> *mut *mut c_void {
        self.args.as_mut_ptr()
    }

    /// Arena bytes handed out since the last reset
    #[inline]
    pub fn arena_used(&self) -> usize {
        self.used
    }
}

impl Default for DecodeScratch {
    fn default() -> Self {
        Self::new()
    }
}
