//! Collaborator traits
//!
//! The loader only talks to the outside world through these: environment
//! lookup for the kernel command line, display discovery for the video
//! record, and the CPU for cache maintenance and the final jump. Firmware
//! glue implements them; tests substitute their own.

use core::convert::Infallible;

use crate::error::Result;

/// Framebuffer reported by the display collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framebuffer {
    /// Physical base address
    pub base: u64,
    /// Width in pixels
    pub xsize: u32,
    /// Height in pixels
    pub ysize: u32,
    /// log2 of bits per pixel
    pub bpix: u8,
}

impl Framebuffer {
    /// Bits per pixel
    pub fn depth(&self) -> u64 {
        1u64.checked_shl(u32::from(self.bpix)).unwrap_or(0)
    }

    /// Row stride: whole bytes per pixel times width
    pub fn bytes_per_row(&self) -> u64 {
        self.depth().div_ceil(8) * u64::from(self.xsize)
    }
}

/// Environment variable storage
pub trait EnvStore {
    /// Value of `key`, if set
    fn get(&self, key: &str) -> Option<&str>;
}

/// Display discovery
#[cfg_attr(test, mockall::automock)]
pub trait DisplayProvider {
    /// Framebuffer of the first available display device
    fn first_display(&self) -> Option<Framebuffer>;
}

/// Cache maintenance and the final control transfer
pub trait ControlTransfer {
    /// Clean and invalidate the data cache over `start..start + len`
    fn clean_dcache_range(&mut self, start: u64, len: u64);

    /// Turn the data cache off
    fn disable_dcache(&mut self);

    /// Jump to `entry` with `arg` as the first argument.
    ///
    /// Only returns on failure; `Ok` is uninhabited.
    ///
    /// # Safety
    ///
    /// `entry` must be the entry point of a fully placed kernel and `arg` the
    /// physical address of its boot arguments. The caller's context is gone
    /// once this succeeds.
    unsafe fn enter(&mut self, entry: u64, arg: u64) -> Result<Infallible>;
}

/// Environment with nothing set
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyEnv;

impl EnvStore for EmptyEnv {
    fn get(&self, _key: &str) -> Option<&str> {
        None
    }
}

/// Environment backed by `(name, value)` pairs; the first match wins
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvPairs<'a>(pub &'a [(&'a str, &'a str)]);

impl EnvStore for EnvPairs<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(name, _)| *name == key).map(|(_, value)| *value)
    }
}

/// No display device present
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDisplay;

impl DisplayProvider for NoDisplay {
    fn first_display(&self) -> Option<Framebuffer> {
        None
    }
}

/// The collaborators a handoff reads from
#[derive(Clone, Copy)]
pub struct BootServices<'a> {
    pub env: &'a dyn EnvStore,
    pub display: &'a dyn DisplayProvider,
}

impl<'a> BootServices<'a> {
    pub fn new(env: &'a dyn EnvStore, display: &'a dyn DisplayProvider) -> Self {
        Self { env, display }
    }
}

impl Default for BootServices<'_> {
    fn default() -> Self {
        Self {
            env: &EmptyEnv,
            display: &NoDisplay,
        }
    }
}
