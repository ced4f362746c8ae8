//! ABI variants of the RISC-V calling convention
//!
//! Word size and float handling are the only axes: the register file layout
//! (eight argument registers, eight float argument registers) is shared.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FfiError;

/// Argument registers per register file (`a0..a7`, `fa0..fa7`)
pub const ARG_REGISTERS: usize = 8;

/// Width of one saved float register (D extension)
pub const FLOAT_REGISTER_SIZE: usize = 8;

/// Outgoing stack area alignment
pub const STACK_ALIGN: usize = 16;

/// First/last sentinels bracketing the valid ABI codes
pub const FIRST_ABI: u32 = 0;
pub const LAST_ABI: u32 = 5;

/// Calling convention flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u32)]
pub enum Abi {
    /// RV32 with hardware floating point
    Rv32 = 1,
    /// RV32, floats travel in integer registers
    Rv32SoftFloat = 2,
    /// RV64 with hardware floating point
    Rv64 = 3,
    /// RV64, floats travel in integer registers
    Rv64SoftFloat = 4,
}

impl Abi {
    /// Get platform default
    #[inline]
    pub const fn default_for_target() -> Self {
        #[cfg(all(target_arch = "riscv64", target_feature = "d"))]
        return Self::Rv64;

        #[cfg(all(target_arch = "riscv64", not(target_feature = "d")))]
        return Self::Rv64SoftFloat;

        #[cfg(all(target_arch = "riscv32", target_feature = "d"))]
        return Self::Rv32;

        #[cfg(all(target_arch = "riscv32", not(target_feature = "d")))]
        return Self::Rv32SoftFloat;

        #[cfg(not(any(target_arch = "riscv64", target_arch = "riscv32")))]
        return Self::Rv64;
    }

    /// Decode a C ABI code
    pub fn from_code(code: u32) -> Result<Self, FfiError> {
        match code {
            1 => Ok(Self::Rv32),
            2 => Ok(Self::Rv32SoftFloat),
            3 => Ok(Self::Rv64),
            4 => Ok(Self::Rv64SoftFloat),
            _ => Err(FfiError::BadAbi {
                abi: code,
                reason: "outside the supported range",
            }),
        }
    }

    #[inline]
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Bytes per argument slot (`FFI_SIZEOF_ARG`)
    #[inline]
    pub const fn word_size(self) -> usize {
        match self {
            Self::Rv32 | Self::Rv32SoftFloat => 4,
            Self::Rv64 | Self::Rv64SoftFloat => 8,
        }
    }

    /// Pointer width seen by the callee
    #[inline]
    pub const fn pointer_width(self) -> usize {
        self.word_size()
    }

    #[inline]
    pub const fn is_64bit(self) -> bool {
        matches!(self, Self::Rv64 | Self::Rv64SoftFloat)
    }

    #[inline]
    pub const fn is_soft_float(self) -> bool {
        matches!(self, Self::Rv32SoftFloat | Self::Rv64SoftFloat)
    }

    /// Check if floating-point args use separate registers
    #[inline]
    pub const fn has_fp_registers(self) -> bool {
        !self.is_soft_float()
    }

    /// Closure trampolines exist for the 64-bit variants only
    #[inline]
    pub const fn supports_closures(self) -> bool {
        self.is_64bit()
    }

    /// Bytes of the spilled argument-register area
    #[inline]
    pub const fn register_area(self) -> usize {
        ARG_REGISTERS * self.word_size()
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Rv32 => "rv32",
            Self::Rv32SoftFloat => "rv32-soft-float",
            Self::Rv64 => "rv64",
            Self::Rv64SoftFloat => "rv64-soft-float",
        }
    }

    pub const ALL: [Abi; 4] = [Self::Rv32, Self::Rv32SoftFloat, Self::Rv64, Self::Rv64SoftFloat];
}

impl Default for Abi {
    #[inline]
    fn default() -> Self {
        Self::default_for_target()
    }
}

impl FromStr for Abi {
    type Err = FfiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rv32" => Ok(Self::Rv32),
            "rv32-soft-float" | "rv32-soft" => Ok(Self::Rv32SoftFloat),
            "rv64" => Ok(Self::Rv64),
            "rv64-soft-float" | "rv64-soft" => Ok(Self::Rv64SoftFloat),
            _ => Err(FfiError::BadAbi {
                abi: FIRST_ABI,
                reason: "unknown ABI name",
            }),
        }
    }
}

impl core::fmt::Display for Abi {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}
