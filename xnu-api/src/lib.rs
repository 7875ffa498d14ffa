//! XNU boot ABI
//!
//! Types shared between the loader and the guest kernel. Everything here is
//! `#[repr(C)]` and laid out byte-for-byte the way the kernel expects it.

#![cfg_attr(not(test), no_std)]

pub mod boot_args;

pub use boot_args::{
    BOOT_ARGS_REVISION, BOOT_ARGS_VERSION, BootArgs, BootFlags, CMDLINE_CAPACITY, PhysAddr,
    VideoInformation,
};
