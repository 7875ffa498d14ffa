//! x86_64 cache maintenance and kernel entry

use core::arch::asm;

use x86_64::instructions::interrupts;
use x86_64::registers::control::{Cr0, Cr0Flags};

/// Write back and invalidate all caches
pub fn flush_caches() {
    // SAFETY: `wbinvd` only affects cache state.
    unsafe { asm!("wbinvd", options(nostack, preserves_flags)) };
}

/// Disable caching and flush what is cached
pub fn disable_dcache() {
    // SAFETY: the loader is the only code running; caches are written back
    // right after.
    unsafe { Cr0::update(|flags| flags.insert(Cr0Flags::CACHE_DISABLE)) };
    flush_caches();
}

/// Jump to the kernel with `arg` in rdi
///
/// # Safety
///
/// `entry` must be a placed kernel entry point.
pub unsafe fn enter_kernel(entry: u64, arg: u64) -> ! {
    interrupts::disable();
    flush_caches();

    // SAFETY: forwarded to the caller.
    unsafe {
        asm!(
            "jmp {entry}",
            entry = in(reg) entry,
            in("rdi") arg,
            options(noreturn)
        )
    }
}
