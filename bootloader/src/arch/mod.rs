//! Architecture support
//!
//! [`NativeCpu`] is the control-transfer collaborator for the CPU the loader
//! runs on. Bare-metal AArch64 and x86_64 get real cache maintenance and
//! entry code; anywhere else the transfer fails with
//! [`BootError::UnsupportedArchitecture`](crate::error::BootError::UnsupportedArchitecture).

use core::convert::Infallible;

use crate::error::Result;
use crate::utils::boot_traits::ControlTransfer;

#[cfg(all(target_os = "none", target_arch = "aarch64"))]
pub mod aarch64;
#[cfg(all(target_os = "none", target_arch = "x86_64"))]
pub mod x86_64;

/// Architecture name, for diagnostics
pub const fn name() -> &'static str {
    if cfg!(target_arch = "aarch64") {
        "AArch64"
    } else if cfg!(target_arch = "x86_64") {
        "x86_64"
    } else {
        "unknown"
    }
}

/// The CPU the loader is running on
#[derive(Debug, Default)]
pub struct NativeCpu;

impl ControlTransfer for NativeCpu {
    fn clean_dcache_range(&mut self, start: u64, len: u64) {
        #[cfg(all(target_os = "none", target_arch = "aarch64"))]
        aarch64::clean_dcache_range(start, len);

        #[cfg(all(target_os = "none", target_arch = "x86_64"))]
        {
            let _ = (start, len);
            x86_64::flush_caches();
        }

        #[cfg(not(all(target_os = "none", any(target_arch = "aarch64", target_arch = "x86_64"))))]
        log::debug!("No cache maintenance for {:#x}+{:#x} on {}", start, len, name());
    }

    fn disable_dcache(&mut self) {
        #[cfg(all(target_os = "none", target_arch = "aarch64"))]
        aarch64::disable_dcache();

        #[cfg(all(target_os = "none", target_arch = "x86_64"))]
        x86_64::disable_dcache();
    }

    unsafe fn enter(&mut self, entry: u64, arg: u64) -> Result<Infallible> {
        #[cfg(all(target_os = "none", target_arch = "aarch64"))]
        {
            // SAFETY: forwarded to the caller.
            unsafe { aarch64::enter_kernel(entry, arg) }
        }

        #[cfg(all(target_os = "none", target_arch = "x86_64"))]
        {
            // SAFETY: forwarded to the caller.
            unsafe { x86_64::enter_kernel(entry, arg) }
        }

        #[cfg(not(all(target_os = "none", any(target_arch = "aarch64", target_arch = "x86_64"))))]
        {
            log::error!(
                "Cannot enter {:#x} (arg {:#x}): no kernel entry for {}",
                entry,
                arg,
                name()
            );
            Err(crate::error::BootError::UnsupportedArchitecture)
        }
    }
}
