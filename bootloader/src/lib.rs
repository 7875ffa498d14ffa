//! machboot - Mach-O kernel loader and XNU handoff
//!
//! Loads a Mach-O kernel image at a fixed physical address, writes the XNU
//! boot arguments and the Apple device tree after it, and transfers control
//! to the kernel.
//!
//! Module layout:
//! - `kernel_if`: Mach-O parsing and loading, device tree, boot arguments, handoff
//! - `memory`: bounds-checked physical memory window
//! - `arch`: cache maintenance and kernel entry per architecture
//! - `application`: the `bootxnu` command and its C ABI
//! - `utils`: logging, argument parsing, collaborator traits

#![cfg_attr(not(test), no_std)]

/// Application layer - the bootxnu command
pub mod application;

/// Architecture support - cache maintenance and kernel entry
pub mod arch;

/// Board constants and runtime configuration
pub mod config;

/// Error types
pub mod error;

/// Kernel interface - loading and handoff
pub mod kernel_if;

/// Physical memory window
pub mod memory;

/// Utility library - logging, memory helpers, argument parsing
pub mod utils;

pub use application::{boot_image, do_bootxnu, machboot_bootxnu, run_bootxnu};
pub use arch::NativeCpu;
pub use config::BootConfig;
pub use error::{BootError, Result};
pub use kernel_if::{
    DeviceTree, KernelHandoff, LoadInfo, MachImage, WordSize, build_and_transfer, load_mach_o,
    prepare_handoff,
};
pub use memory::PhysWindow;
pub use utils::boot_traits::{
    BootServices, ControlTransfer, DisplayProvider, EnvPairs, EnvStore, Framebuffer,
};
