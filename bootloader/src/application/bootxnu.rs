//! bootxnu command - load a Mach-O kernel and start it
//!
//! `bootxnu kernel_addr fdt_addr`: the kernel image and the Apple device
//! tree are read where they lie in memory; the kernel is placed at the
//! board load address with its boot arguments and the device tree after it.

use core::convert::Infallible;

use crate::config::BootConfig;
use crate::error::{BootError, Result};
use crate::kernel_if::{
    DeviceTree, MachImage, build_and_transfer, check_sources, load_mach_o, load_span,
};
use crate::memory::PhysWindow;
use crate::utils::boot_traits::{BootServices, ControlTransfer};
use crate::utils::cmdline::BootxnuArgs;

/// Load `image` into `window` and start it.
///
/// The image and the device tree may live inside the window, but not where
/// the kernel or its boot arguments are placed.
///
/// Only returns on failure.
pub fn boot_image(
    image: &MachImage<'_>,
    device_tree: &DeviceTree<'_>,
    window: &mut PhysWindow<'_>,
    config: &BootConfig,
    services: &BootServices<'_>,
    cpu: &mut dyn ControlTransfer,
) -> Result<Infallible> {
    check_sources(image, device_tree, window, config.load_addr)?;

    let info = load_mach_o(image, window, config.load_addr)?;
    if info.is_empty() {
        return Err(BootError::NotAnImage);
    }
    build_and_transfer(&info, device_tree, window, config, services, cpu)
}

/// Run `bootxnu` against identity-mapped physical memory.
///
/// # Safety
///
/// RAM from `config.sdram_base` to `config.window_end` must be identity
/// mapped, and `config.load_addr..config.window_end` must be free for the
/// loader to overwrite.
pub unsafe fn do_bootxnu(
    argv: &[&str],
    config: &BootConfig,
    services: &BootServices<'_>,
    cpu: &mut dyn ControlTransfer,
) -> Result<Infallible> {
    let args = BootxnuArgs::parse(argv)?;
    let no_image = |err| {
        log::error!("No Mach-O image at address {:#x}", args.kernel_addr);
        err
    };

    // SAFETY: the view stays inside RAM per the caller's contract.
    let image = unsafe {
        MachImage::from_raw(
            args.kernel_addr,
            config.word_size,
            config.readable_from(args.kernel_addr),
        )
    }
    .map_err(|err| match err {
        BootError::NotAnImage | BootError::HeaderTruncated => no_image(err),
        err => err,
    })?;

    if load_span(&image)?.is_empty() {
        return Err(no_image(BootError::NotAnImage));
    }

    // Measured before anything is loaded over it
    let limit = config
        .readable_from(args.fdt_addr)
        .min(config.device_tree_max_len);
    // SAFETY: the view stays inside RAM per the caller's contract.
    let device_tree = unsafe { DeviceTree::from_raw(args.fdt_addr, limit, config.device_tree_max_depth) }?;
    log::info!(
        "Device tree at {:#x}: {} bytes",
        args.fdt_addr,
        device_tree.len()
    );

    // SAFETY: the window is free RAM per the caller's contract.
    let mut window = unsafe { PhysWindow::from_raw(config.load_addr, config.window_len()) };

    boot_image(&image, &device_tree, &mut window, config, services, cpu)
}

/// Run `bootxnu` and turn the outcome into a shell status
///
/// # Safety
///
/// Same contract as [`do_bootxnu`].
pub unsafe fn run_bootxnu(
    argv: &[&str],
    config: &BootConfig,
    services: &BootServices<'_>,
    cpu: &mut dyn ControlTransfer,
) -> i32 {
    // SAFETY: forwarded to the caller.
    match unsafe { do_bootxnu(argv, config, services, cpu) } {
        Ok(never) => match never {},
        Err(BootError::Usage(usage)) => {
            log::error!("{}", usage);
            1
        }
        Err(err) => {
            log::error!("bootxnu: {}", err);
            err.exit_status()
        }
    }
}
