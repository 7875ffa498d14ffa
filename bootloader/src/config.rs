//! Loader configuration
//!
//! Board constants are generated by `build.rs`; [`BootConfig`] gathers
//! everything the loader derives from them at run time.

use xnu_api::BootFlags;

use crate::kernel_if::macho::WordSize;

/// Board constants generated at build time
pub mod board {
    include!(concat!(env!("OUT_DIR"), "/board.rs"));
}

/// Offset of the kernel load base above the firmware scratch address
pub const XNU_LOAD_OFFSET: u64 = 0x4000;

/// Alignment of `phys_end` after the appended device tree
pub const PHYS_END_ALIGN: u64 = 0x10000;

/// Deepest device-tree nesting accepted; the root is depth 1
pub const DEVICE_TREE_MAX_DEPTH: usize = 64;

/// Largest device tree accepted
pub const DEVICE_TREE_MAX_LEN: usize = 0x0100_0000;

/// Runtime loader configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootConfig {
    /// Physical address segments are placed at
    pub load_addr: u64,
    /// Memory size reported to the kernel
    pub mem_size: u64,
    /// First physical address of RAM
    pub sdram_base: u64,
    /// One past the last address the loader may write
    pub window_end: u64,
    /// Alignment of `phys_end`
    pub phys_end_align: u64,
    /// Mach-O word size accepted
    pub word_size: WordSize,
    /// Boot flags passed to the kernel
    pub boot_flags: BootFlags,
    pub device_tree_max_depth: usize,
    pub device_tree_max_len: usize,
}

impl BootConfig {
    /// Configuration of the board this loader was built for
    pub const fn board() -> Self {
        Self {
            load_addr: board::SYS_LOAD_ADDR + XNU_LOAD_OFFSET,
            mem_size: board::SDRAM_SIZE,
            sdram_base: board::SDRAM_BASE,
            window_end: board::SDRAM_BASE + board::SDRAM_SIZE,
            phys_end_align: PHYS_END_ALIGN,
            word_size: WordSize::NATIVE,
            boot_flags: BootFlags::empty(),
            device_tree_max_depth: DEVICE_TREE_MAX_DEPTH,
            device_tree_max_len: DEVICE_TREE_MAX_LEN,
        }
    }

    /// Size of the writable window `[load_addr, window_end)`
    pub fn window_len(&self) -> usize {
        self.window_end.saturating_sub(self.load_addr) as usize
    }

    /// Bytes of RAM readable from `addr` up to the window end.
    ///
    /// Zero for addresses outside RAM.
    pub fn readable_from(&self, addr: u64) -> usize {
        if addr < self.sdram_base || addr >= self.window_end {
            return 0;
        }
        (self.window_end - addr) as usize
    }
}

impl Default for BootConfig {
    fn default() -> Self {
        Self::board()
    }
}
