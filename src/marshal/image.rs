//! Ring-mapped argument image
//!
//! The glue calls with `sp` at the buffer base and loads the argument
//! registers from the buffer tail. Logically the image is the register area
//! followed by the stack overflow area; physically the register area sits
//! at the end, so logical offset `L` lives at `(L + bytes - reg_area) % bytes`.

use crate::cif::Cif;
use crate::types::align_up;

/// Logical to physical offset mapping of one image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLayout {
    bytes: usize,
    reg_area: usize,
}

impl ImageLayout {
    #[inline]
    pub fn for_cif(cif: &Cif) -> Self {
        Self::new(cif.bytes(), cif.abi().register_area())
    }

    #[inline]
    pub fn new(bytes: usize, reg_area: usize) -> Self {
        assert!(reg_area <= bytes, "image smaller than the register area");
        Self { bytes, reg_area }
    }

    #[inline]
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    #[inline]
    pub fn register_area(&self) -> usize {
        self.reg_area
    }

    /// Physical offset of logical offset `logical`
    #[inline(always)]
    pub fn physical(&self, logical: usize) -> usize {
        debug_assert!(logical < self.bytes);
        if logical < self.reg_area {
            logical + self.bytes - self.reg_area
        } else {
            logical - self.reg_area
        }
    }

    /// Contiguous logical view of a physical image: `a0..a7`, then the stack
    pub fn linearize(&self, physical: &[u8]) -> Vec<u8> {
        assert_eq!(physical.len(), self.bytes);
        let stack_area = self.bytes - self.reg_area;
        let mut logical = Vec::with_capacity(self.bytes);
        logical.extend_from_slice(&physical[stack_area..]);
        logical.extend_from_slice(&physical[..stack_area]);
        logical
    }
}

/// Bounds-checked cursor over a physical image
pub struct ImageWriter<'a> {
    buf: &'a mut [u8],
    layout: ImageLayout,
    word: usize,
    cursor: usize,
}

impl<'a> ImageWriter<'a> {
    pub fn new(buf: &'a mut [u8], layout: ImageLayout, word: usize) -> Self {
        assert_eq!(buf.len(), layout.bytes(), "image buffer does not match the CIF");
        Self {
            buf,
            layout,
            word,
            cursor: 0,
        }
    }

    /// Logical write position
    #[inline]
    pub fn position(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub fn align(&mut self, align: usize) {
        self.cursor = align_up(self.cursor, align);
    }

    #[inline]
    pub fn skip(&mut self, len: usize) {
        self.cursor += len;
    }

    /// Copy `src` at the cursor, splitting at the end of the register area
    pub fn write(&mut self, src: &[u8]) {
        let end = self.cursor + src.len();
        assert!(end <= self.layout.bytes(), "argument image overflow");

        let reg_area = self.layout.register_area();
        let split = if self.cursor < reg_area {
            (reg_area - self.cursor).min(src.len())
        } else {
            0
        };
        let (head, tail) = src.split_at(split);

        if !head.is_empty() {
            let at = self.layout.physical(self.cursor);
            self.buf[at..at + head.len()].copy_from_slice(head);
        }
        if !tail.is_empty() {
            let at = self.layout.physical(self.cursor + split);
            self.buf[at..at + tail.len()].copy_from_slice(tail);
        }

        self.cursor = end;
    }

    /// One full slot holding the low bytes of `value`
    #[inline]
    pub fn write_word(&mut self, value: u64) {
        let word = self.word;
        self.write(&value.to_le_bytes()[..word]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_physical_mapping() {
        // rv32: 32-byte register area, 16 bytes of stack
        let layout = ImageLayout::new(48, 32);
        assert_eq!(layout.physical(0), 16);
        assert_eq!(layout.physical(31), 47);
        assert_eq!(layout.physical(32), 0);
        assert_eq!(layout.physical(47), 15);
    }

    #[test]
    fn test_registers_only_is_identity() {
        let layout = ImageLayout::new(64, 64);
        assert_eq!(layout.physical(0), 0);
        assert_eq!(layout.physical(63), 63);
    }

    #[test]
    fn test_split_write_wraps_to_base() {
        let layout = ImageLayout::new(48, 32);
        let mut buf = vec![0u8; 48];
        let mut w = ImageWriter::new(&mut buf, layout, 4);

        w.skip(28);
        w.write(&[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(w.position(), 36);

        assert_eq!(&buf[44..48], &[1, 2, 3, 4]);
        assert_eq!(&buf[0..4], &[5, 6, 7, 8]);
        assert_eq!(layout.linearize(&buf)[28..36], [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_write_word_truncates_to_slot() {
        let layout = ImageLayout::new(32, 32);
        let mut buf = vec![0u8; 32];
        let mut w = ImageWriter::new(&mut buf, layout, 4);
        w.write_word(0x1122_3344_5566_7788);
        assert_eq!(&buf[..4], &[0x88, 0x77, 0x66, 0x55]);
        assert_eq!(&buf[4..8], &[0; 4]);
    }

    #[test]
    #[should_panic(expected = "argument image overflow")]
    fn test_overflow_panics() {
        let layout = ImageLayout::new(32, 32);
        let mut buf = vec![0u8; 32];
        let mut w = ImageWriter::new(&mut buf, layout, 4);
        w.skip(30);
        w.write_word(1);
    }
}
