//! Boot-time memory
//!
//! The loader never allocates: every placement is an address computed inside
//! the physical range reserved for the kernel, see [`PhysWindow`].

pub mod phys_window;

pub use phys_window::PhysWindow;
