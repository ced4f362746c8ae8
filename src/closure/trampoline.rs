//! RV64 trampoline encoding
//!
//! Both forms load the closure address into `t2` first so the glue entry
//! can find the closure record.

/// Bytes reserved for the trampoline at the head of a closure
pub const TRAMPOLINE_SIZE: usize = 24;

/// Instruction words in a trampoline
pub const TRAMPOLINE_WORDS: usize = TRAMPOLINE_SIZE / 4;

const T1: u32 = 6;
const T2: u32 = 7;

const NOP: u32 = 0x0000_0013;

const OPCODE_AUIPC: u32 = 0x17;
const OPCODE_JALR: u32 = 0x67;
const OPCODE_LOAD: u32 = 0x03;
const FUNCT3_LD: u32 = 3;

#[inline]
const fn auipc(rd: u32, imm20: u32) -> u32 {
    OPCODE_AUIPC | (rd << 7) | ((imm20 & 0xfffff) << 12)
}

#[inline]
const fn jalr(rd: u32, rs1: u32, imm12: u32) -> u32 {
    OPCODE_JALR | (rd << 7) | (rs1 << 15) | ((imm12 & 0xfff) << 20)
}

#[inline]
const fn ld(rd: u32, rs1: u32, imm12: u32) -> u32 {
    OPCODE_LOAD | (rd << 7) | (FUNCT3_LD << 12) | (rs1 << 15) | ((imm12 & 0xfff) << 20)
}

/// Which sequence reaches the entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// PC-relative `auipc` + `jalr`, entry within +-2 GiB
    Short,
    /// Absolute entry stored after the code and loaded with `ld`
    Long,
}

/// Encoded trampoline words
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trampoline {
    words: [u32; TRAMPOLINE_WORDS],
    encoding: Encoding,
}

impl Trampoline {
    /// Encode a jump from `codeloc` to `entry`
    pub fn encode(codeloc: u64, entry: u64) -> Self {
        // Offset from the second instruction, the one doing the auipc
        let offset = entry.wrapping_sub(codeloc.wrapping_add(4)) as i64;
        let hi = offset.wrapping_add(0x800) >> 12;

        if (-(1i64 << 19)..(1i64 << 19)).contains(&hi) {
            let lo = offset - (hi << 12);
            return Self {
                words: [
                    auipc(T2, 0),
                    auipc(T1, hi as u32),
                    jalr(0, T1, lo as u32),
                    NOP,
                    NOP,
                    NOP,
                ],
                encoding: Encoding::Short,
            };
        }

        Self {
            words: [
                auipc(T2, 0),
                ld(T1, T2, 16),
                NOP,
                jalr(0, T1, 0),
                entry as u32,
                (entry >> 32) as u32,
            ],
            encoding: Encoding::Long,
        }
    }

    #[inline]
    pub fn words(&self) -> [u32; TRAMPOLINE_WORDS] {
        self.words
    }

    #[inline]
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Little-endian byte image
    pub fn to_bytes(&self) -> [u8; TRAMPOLINE_SIZE] {
        let mut bytes = [0u8; TRAMPOLINE_SIZE];
        for (chunk, word) in bytes.chunks_exact_mut(4).zip(self.words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        bytes
    }

    /// Jump target of trampoline words placed at `codeloc`
    pub fn target(words: &[u32; TRAMPOLINE_WORDS], codeloc: u64) -> u64 {
        if words[1] & 0x7f == OPCODE_AUIPC {
            let hi = ((words[1] & 0xffff_f000) as i32) as i64;
            let lo = ((words[2] as i32) >> 20) as i64;
            codeloc.wrapping_add(4).wrapping_add((hi + lo) as u64)
        } else {
            (words[4] as u64) | ((words[5] as u64) << 32)
        }
    }
}
