//! Kernel Interface - Mach-O loading, device tree, boot arguments, handoff

pub mod adt;
pub mod boot_args_builder;
pub mod kernel_handoff;
pub mod macho;
pub mod macho_loader;

#[cfg(test)]
pub(crate) mod test_image;

pub use adt::DeviceTree;
pub use kernel_handoff::{KernelHandoff, build_and_transfer, check_sources, prepare_handoff};
pub use macho::{MachImage, WordSize};
pub use macho_loader::{LoadInfo, load_mach_o, load_span};
