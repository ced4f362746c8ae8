//! Instruction cache synchronization after writing trampoline code
//!
//! Linux flushes every hart through `riscv_flush_icache`. Elsewhere on
//! RISC-V `fence.i` only covers the calling hart; an embedder running
//! closures on other harts registers a remote fence (an SBI
//! `remote_fence_i` call, for example) with `set_remote_fence`.

use core::ffi::c_void;

use once_cell::sync::OnceCell;

/// Cross-hart fence over `len` bytes at `start`
pub type RemoteFence = fn(start: *const c_void, len: usize);

static REMOTE_FENCE: OnceCell<RemoteFence> = OnceCell::new();

/// Install the remote fence; only the first registration sticks
pub fn set_remote_fence(fence: RemoteFence) -> bool {
    REMOTE_FENCE.set(fence).is_ok()
}

#[inline]
pub fn remote_fence() -> Option<RemoteFence> {
    REMOTE_FENCE.get().copied()
}

/// Make `len` freshly written bytes at `start` visible to instruction fetch
#[inline]
pub fn flush(start: *const c_void, len: usize) {
    flush_impl(start, len);
}

#[cfg(all(target_os = "linux", any(target_arch = "riscv64", target_arch = "riscv32")))]
fn flush_impl(start: *const c_void, len: usize) {
    let end = (start as usize).wrapping_add(len);
    // All harts, not only the calling thread
    unsafe {
        libc::syscall(libc::SYS_riscv_flush_icache, start as usize, end, 0usize);
    }
}

#[cfg(all(
    not(target_os = "linux"),
    any(target_arch = "riscv64", target_arch = "riscv32")
))]
fn flush_impl(start: *const c_void, len: usize) {
    unsafe {
        core::arch::asm!("fence.i", options(nostack, preserves_flags));
    }
    if let Some(fence) = remote_fence() {
        fence(start, len);
    }
}

#[cfg(all(windows, not(any(target_arch = "riscv64", target_arch = "riscv32"))))]
fn flush_impl(start: *const c_void, len: usize) {
    use winapi::um::processthreadsapi::{FlushInstructionCache, GetCurrentProcess};

    unsafe {
        FlushInstructionCache(GetCurrentProcess(), start.cast(), len);
    }
}

#[cfg(not(any(windows, target_arch = "riscv64", target_arch = "riscv32")))]
fn flush_impl(_start: *const c_void, _len: usize) {
    // Coherent instruction fetch; ordering the stores is enough
    core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
}
