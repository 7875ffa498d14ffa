//! Boot arguments block
//!
//! The loader writes one `BootArgs` immediately after the loaded kernel image
//! and passes its physical address as the kernel's only argument. The layout
//! is a stable ABI: field order, sizes and the command-line capacity may only
//! change together with `revision`/`version`.
//!
//! Every gap the C layout would pad is an explicit reserved field, so the
//! structure has no implicit padding and can be viewed as plain bytes.

use core::fmt;
use core::mem::{offset_of, size_of};

use bitflags::bitflags;
use static_assertions::const_assert_eq;

/// Boot arguments revision understood by the kernel
pub const BOOT_ARGS_REVISION: u16 = 2;

/// Boot arguments version understood by the kernel
pub const BOOT_ARGS_VERSION: u16 = 2;

/// Capacity of `command_line`, including the terminating NUL
pub const CMDLINE_CAPACITY: usize = 608;

/// Physical address as seen by the guest (`uintptr_t` on its side)
#[cfg(not(feature = "phys32"))]
pub type PhysAddr = u64;

/// Physical address as seen by the guest (`uintptr_t` on its side)
#[cfg(feature = "phys32")]
pub type PhysAddr = u32;

/// Framebuffer description embedded in the boot arguments.
///
/// All zero (and `display == 0`) means no display is available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct VideoInformation {
    /// Physical base of the framebuffer
    pub base_addr: u64,
    /// Non-zero when a display is present
    pub display: u64,
    /// Row stride in bytes
    pub bytes_per_row: u64,
    /// Width in pixels
    pub width: u64,
    /// Height in pixels
    pub height: u64,
    /// Bits per pixel
    pub depth: u64,
}

impl VideoInformation {
    /// No display attached
    pub const NONE: Self = Self {
        base_addr: 0,
        display: 0,
        bytes_per_row: 0,
        width: 0,
        height: 0,
        depth: 0,
    };

    /// Check if a display is present
    pub fn is_present(&self) -> bool {
        self.display != 0
    }
}

bitflags! {
    /// Boot flag bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BootFlags: u64 {
        /// Boot without showing anything on the display
        const DARK_BOOT = 1 << 0;
    }
}

/// Boot arguments handed to the kernel
#[derive(Clone, Copy)]
#[repr(C)]
pub struct BootArgs {
    pub revision: u16,
    pub version: u16,
    _reserved0: [u8; 4],

    /// Virtual address the kernel was linked at
    pub virt_base: u64,
    /// Physical address the kernel was loaded at
    pub phys_base: u64,
    /// Usable memory size
    pub mem_size: u64,
    /// First free physical address after boot args and device tree
    pub phys_end: u64,

    pub video: VideoInformation,

    pub machine_type: u32,
    #[cfg(not(feature = "phys32"))]
    _reserved1: [u8; 4],

    /// Physical address of the flattened Apple device tree
    pub afdt: PhysAddr,
    /// Length of the device tree in bytes
    pub afdt_length: u32,

    /// NUL-terminated kernel command line
    pub command_line: [u8; CMDLINE_CAPACITY],
    _reserved2: [u8; 4],

    /// Raw `BootFlags` bits
    pub boot_flags: u64,
    /// Actual physical memory size
    pub mem_size_actual: u64,
}

#[cfg(not(feature = "phys32"))]
const_assert_eq!(size_of::<BootArgs>(), 736);
#[cfg(not(feature = "phys32"))]
const_assert_eq!(offset_of!(BootArgs, afdt), 96);
#[cfg(not(feature = "phys32"))]
const_assert_eq!(offset_of!(BootArgs, command_line), 108);
#[cfg(not(feature = "phys32"))]
const_assert_eq!(offset_of!(BootArgs, boot_flags), 720);

#[cfg(feature = "phys32")]
const_assert_eq!(size_of::<BootArgs>(), 728);
#[cfg(feature = "phys32")]
const_assert_eq!(offset_of!(BootArgs, afdt), 92);
#[cfg(feature = "phys32")]
const_assert_eq!(offset_of!(BootArgs, command_line), 100);
#[cfg(feature = "phys32")]
const_assert_eq!(offset_of!(BootArgs, boot_flags), 712);

const_assert_eq!(size_of::<VideoInformation>(), 48);
const_assert_eq!(offset_of!(BootArgs, virt_base), 8);
const_assert_eq!(offset_of!(BootArgs, phys_end), 32);
const_assert_eq!(offset_of!(BootArgs, video), 40);
const_assert_eq!(offset_of!(BootArgs, machine_type), 88);

impl BootArgs {
    /// Size of the block in guest memory
    pub const SIZE: usize = size_of::<Self>();

    /// All-zero boot arguments
    pub const fn zeroed() -> Self {
        Self {
            revision: 0,
            version: 0,
            _reserved0: [0; 4],
            virt_base: 0,
            phys_base: 0,
            mem_size: 0,
            phys_end: 0,
            video: VideoInformation::NONE,
            machine_type: 0,
            #[cfg(not(feature = "phys32"))]
            _reserved1: [0; 4],
            afdt: 0,
            afdt_length: 0,
            command_line: [0; CMDLINE_CAPACITY],
            _reserved2: [0; 4],
            boot_flags: 0,
            mem_size_actual: 0,
        }
    }

    /// Zeroed boot arguments stamped with the current revision and version
    pub const fn new() -> Self {
        let mut args = Self::zeroed();
        args.revision = BOOT_ARGS_REVISION;
        args.version = BOOT_ARGS_VERSION;
        args
    }

    /// Set kernel command line.
    ///
    /// Copies at most `CMDLINE_CAPACITY - 1` bytes, cut back to a character
    /// boundary, and always leaves a terminating NUL. Returns the number of
    /// bytes copied.
    pub fn set_command_line(&mut self, cmdline: &str) -> usize {
        let mut len = cmdline.len().min(CMDLINE_CAPACITY - 1);
        while !cmdline.is_char_boundary(len) {
            len -= 1;
        }

        self.command_line = [0; CMDLINE_CAPACITY];
        self.command_line[..len].copy_from_slice(&cmdline.as_bytes()[..len]);
        len
    }

    /// Command line bytes up to the terminating NUL
    pub fn command_line_bytes(&self) -> &[u8] {
        let len = self
            .command_line
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(CMDLINE_CAPACITY);
        &self.command_line[..len]
    }

    /// Command line as a string, if it is valid UTF-8
    pub fn command_line(&self) -> Option<&str> {
        core::str::from_utf8(self.command_line_bytes()).ok()
    }

    /// Get boot flags
    pub fn flags(&self) -> BootFlags {
        BootFlags::from_bits_retain(self.boot_flags)
    }

    /// Set boot flags
    pub fn set_flags(&mut self, flags: BootFlags) {
        self.boot_flags = flags.bits();
    }

    /// Check revision and version against what this crate describes
    pub fn is_current(&self) -> bool {
        self.revision == BOOT_ARGS_REVISION && self.version == BOOT_ARGS_VERSION
    }

    /// View the block as the bytes the guest will see
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: `BootArgs` is `repr(C)` with every gap spelled out as a
        // reserved field, so all `SIZE` bytes are initialized.
        unsafe { core::slice::from_raw_parts((self as *const Self).cast::<u8>(), Self::SIZE) }
    }

    /// Read a block back from guest memory
    pub fn read_from(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        // SAFETY: length checked above; every bit pattern is a valid
        // `BootArgs` since all fields are integers or integer arrays.
        Some(unsafe { bytes.as_ptr().cast::<Self>().read_unaligned() })
    }
}

impl Default for BootArgs {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BootArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootArgs")
            .field("revision", &self.revision)
            .field("version", &self.version)
            .field("virt_base", &format_args!("{:#x}", self.virt_base))
            .field("phys_base", &format_args!("{:#x}", self.phys_base))
            .field("mem_size", &format_args!("{:#x}", self.mem_size))
            .field("phys_end", &format_args!("{:#x}", self.phys_end))
            .field("video", &self.video)
            .field("machine_type", &self.machine_type)
            .field("afdt", &format_args!("{:#x}", self.afdt))
            .field("afdt_length", &self.afdt_length)
            .field("command_line", &self.command_line())
            .field("boot_flags", &self.flags())
            .field("mem_size_actual", &format_args!("{:#x}", self.mem_size_actual))
            .finish()
    }
}
