//! AArch64 cache maintenance and kernel entry

use core::arch::asm;

use aarch64_cpu::asm::barrier;
use aarch64_cpu::registers::*;

/// SCTLR_ELx.C
const SCTLR_C: u64 = 1 << 2;

/// Current exception level
fn current_el() -> u64 {
    CurrentEL.read(CurrentEL::EL)
}

/// Smallest data cache line, from CTR_EL0.DminLine
fn dcache_line_size() -> u64 {
    let ctr: u64;
    // SAFETY: reading CTR_EL0 has no side effects.
    unsafe { asm!("mrs {}, ctr_el0", out(reg) ctr, options(nomem, nostack, preserves_flags)) };
    4 << ((ctr >> 16) & 0xf)
}

/// Clean and invalidate `start..start + len` to the point of coherency
pub fn clean_dcache_range(start: u64, len: u64) {
    let line = dcache_line_size();
    let end = start.saturating_add(len);
    let mut addr = start & !(line - 1);

    while addr < end {
        // SAFETY: cache maintenance by VA on memory the loader owns.
        unsafe { asm!("dc civac, {}", in(reg) addr, options(nostack, preserves_flags)) };
        addr += line;
    }
    barrier::dsb(barrier::SY);
}

/// Turn the data cache off at the current exception level
pub fn disable_dcache() {
    if current_el() == 2 {
        // SAFETY: caches were cleaned over everything the kernel reads.
        unsafe {
            asm!(
                "mrs {tmp}, sctlr_el2",
                "bic {tmp}, {tmp}, {c}",
                "msr sctlr_el2, {tmp}",
                tmp = out(reg) _,
                c = in(reg) SCTLR_C,
                options(nostack, preserves_flags)
            )
        };
    } else {
        SCTLR_EL1.modify(SCTLR_EL1::C::NonCacheable);
    }
    barrier::isb(barrier::SY);
}

/// Enter the kernel with `arg` in x0.
///
/// From EL2 the kernel is started at EL1h; from EL1 it is branched to.
///
/// # Safety
///
/// `entry` must be a placed kernel entry point.
pub unsafe fn enter_kernel(entry: u64, arg: u64) -> ! {
    if current_el() == 2 {
        // SAFETY: forwarded to the caller.
        unsafe { drop_to_el1(entry, arg) }
    }

    // SAFETY: forwarded to the caller.
    unsafe {
        asm!(
            "msr daifset, #0xf",
            "br {entry}",
            entry = in(reg) entry,
            in("x0") arg,
            options(noreturn)
        )
    }
}

/// Return from EL2 into the kernel at EL1h
unsafe fn drop_to_el1(entry: u64, arg: u64) -> ! {
    // EL1 physical timer and counter access
    CNTHCTL_EL2.write(CNTHCTL_EL2::EL1PCEN::SET + CNTHCTL_EL2::EL1PCTEN::SET);
    CNTVOFF_EL2.set(0);

    HCR_EL2.write(HCR_EL2::RW::EL1IsAarch64);
    SCTLR_EL1.modify(SCTLR_EL1::M::Disable + SCTLR_EL1::C::NonCacheable + SCTLR_EL1::I::NonCacheable);

    SPSR_EL2.write(
        SPSR_EL2::D::Masked
            + SPSR_EL2::A::Masked
            + SPSR_EL2::I::Masked
            + SPSR_EL2::F::Masked
            + SPSR_EL2::M::EL1h,
    );
    ELR_EL2.set(entry);

    // Keep running on the current stack after the return
    let sp: u64;
    // SAFETY: reads the stack pointer only.
    unsafe { asm!("mov {}, sp", out(reg) sp, options(nomem, nostack, preserves_flags)) };
    SP_EL1.set(sp);

    // SAFETY: ELR_EL2/SPSR_EL2 describe the kernel entry at EL1h.
    unsafe { asm!("eret", in("x0") arg, options(noreturn)) }
}
