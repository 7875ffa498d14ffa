//! Application Layer - the bootxnu command
//!
//! Wires argument parsing, the loader and the handoff together, and exposes
//! the command to a firmware shell over a C ABI.

pub mod bootxnu;
pub mod ffi;

pub use bootxnu::{boot_image, do_bootxnu, run_bootxnu};
pub use ffi::{FramebufferDesc, HostServices, machboot_bootxnu};
