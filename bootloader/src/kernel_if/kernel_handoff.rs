/// Loader → XNU Handoff
///
/// Places the boot arguments and the device tree after the loaded kernel
/// and jumps to the kernel entry point with the boot arguments address as
/// its only argument.

use core::convert::Infallible;

use xnu_api::BootArgs;

use crate::config::BootConfig;
use crate::error::{BootError, Result};
use crate::memory::PhysWindow;
use crate::utils::boot_traits::{BootServices, ControlTransfer};
use crate::utils::mem_util::align_up;

use super::adt::DeviceTree;
use super::boot_args_builder::{BOOTARGS_ENV, BootArgsBuilder};
use super::macho::MachImage;
use super::macho_loader::{LoadInfo, load_span};

/// Everything placed and ready for the jump
#[derive(Clone, Copy)]
pub struct KernelHandoff {
    entry: u64,
    boot_args_addr: u64,
    device_tree_addr: u64,
    flush_start: u64,
    flush_end: u64,
    boot_args: BootArgs,
}

impl KernelHandoff {
    /// Physical entry point
    pub fn entry(&self) -> u64 {
        self.entry
    }

    /// Physical address of the boot arguments
    pub fn boot_args_addr(&self) -> u64 {
        self.boot_args_addr
    }

    /// Physical address of the appended device tree
    pub fn device_tree_addr(&self) -> u64 {
        self.device_tree_addr
    }

    /// The boot arguments as written
    pub fn boot_args(&self) -> &BootArgs {
        &self.boot_args
    }

    /// Physical range written by the loader
    pub fn written_range(&self) -> (u64, u64) {
        (self.flush_start, self.flush_end)
    }

    /// Check the entry point lies in the placed image
    pub fn validate(&self) -> Result<()> {
        if self.entry < self.flush_start || self.entry >= self.boot_args_addr {
            return Err(BootError::EntryOutsideImage);
        }
        Ok(())
    }

    /// Clean caches and transfer control to the kernel.
    ///
    /// Consumes the handoff; it only comes back on failure.
    pub fn execute<C: ControlTransfer + ?Sized>(self, cpu: &mut C) -> Result<Infallible> {
        self.validate()?;

        log::info!(
            "Starting kernel at {:#x}, boot args at {:#x}",
            self.entry,
            self.boot_args_addr
        );

        cpu.clean_dcache_range(self.flush_start, self.flush_end - self.flush_start);
        cpu.disable_dcache();

        // SAFETY: the kernel is placed and validated, and the boot arguments
        // are written at `boot_args_addr`.
        unsafe { cpu.enter(self.entry, self.boot_args_addr) }
    }
}

/// Bytes written from `load_addr` up for a kernel spanning `span` bytes
/// followed by its boot arguments and a `tree_len` byte device tree
pub fn written_len(span: u64, tree_len: usize) -> u64 {
    span.saturating_add(BootArgs::SIZE as u64).saturating_add(tree_len as u64)
}

/// Refuse sources that the load or the handoff would overwrite.
///
/// Must run before anything is written: the kernel image and the device
/// tree are both read after the window writes have started.
pub fn check_sources(
    image: &MachImage<'_>,
    device_tree: &DeviceTree<'_>,
    window: &PhysWindow<'_>,
    load_addr: u64,
) -> Result<()> {
    let span = load_span(image)?;
    let written = written_len(span.span(), device_tree.len())
        .min(window.end().saturating_sub(load_addr));

    if window.overlaps(load_addr, written, image.bytes()) {
        log::error!("Kernel image overlaps {:#x}+{:#x}", load_addr, written);
        return Err(BootError::OverlappingSource);
    }
    if window.overlaps(load_addr, written, device_tree.as_bytes()) {
        log::error!("Device tree overlaps {:#x}+{:#x}", load_addr, written);
        return Err(BootError::OverlappingSource);
    }
    Ok(())
}

/// Write the boot arguments and the device tree after the loaded image.
pub fn prepare_handoff(
    info: &LoadInfo,
    device_tree: &DeviceTree<'_>,
    window: &mut PhysWindow<'_>,
    config: &BootConfig,
    services: &BootServices<'_>,
) -> Result<KernelHandoff> {
    if info.is_empty() {
        return Err(BootError::NotAnImage);
    }

    let entry = info.to_physical(info.entry, config.load_addr);
    let boot_args_addr = info.to_physical(info.end, config.load_addr);
    let device_tree_addr = boot_args_addr + BootArgs::SIZE as u64;
    let tree_end = device_tree_addr + device_tree.len() as u64;
    let phys_end = align_up(tree_end, config.phys_end_align).ok_or(BootError::OutOfWindow)?;

    if !window.contains(boot_args_addr, phys_end - boot_args_addr) {
        return Err(BootError::OutOfWindow);
    }
    // The tree is copied last, so its source must miss the kernel and the
    // boot arguments as well as its own destination.
    if window.overlaps(config.load_addr, tree_end - config.load_addr, device_tree.as_bytes()) {
        return Err(BootError::OverlappingSource);
    }

    log::debug!(
        "Boot args at {:#x}, device tree at {:#x} ({} bytes)",
        boot_args_addr,
        device_tree_addr,
        device_tree.len()
    );

    let mut builder = BootArgsBuilder::new(info, config);
    builder
        .command_line(services.env.get(BOOTARGS_ENV))
        .video(services.display.first_display())
        .phys_end(phys_end)
        .device_tree(device_tree_addr, device_tree.len())?;
    let boot_args = builder.build();

    window.copy_from(boot_args_addr, boot_args.as_bytes())?;
    window.copy_from(device_tree_addr, device_tree.as_bytes())?;

    Ok(KernelHandoff {
        entry,
        boot_args_addr,
        device_tree_addr,
        flush_start: config.load_addr,
        flush_end: tree_end,
        boot_args,
    })
}

/// Prepare the handoff and transfer control.
///
/// Only returns on failure.
pub fn build_and_transfer(
    info: &LoadInfo,
    device_tree: &DeviceTree<'_>,
    window: &mut PhysWindow<'_>,
    config: &BootConfig,
    services: &BootServices<'_>,
    cpu: &mut dyn ControlTransfer,
) -> Result<Infallible> {
    prepare_handoff(info, device_tree, window, config, services)?.execute(cpu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel_if::test_image::NodeBuilder;
    use crate::utils::boot_traits::{EmptyEnv, EnvPairs, Framebuffer, MockDisplayProvider, NoDisplay};
    use xnu_api::VideoInformation;

    const V: u64 = 0xffff_fff0_0700_4000;

    #[derive(Default)]
    struct RecordingCpu {
        cleaned: Option<(u64, u64)>,
        dcache_off: bool,
        entered: Option<(u64, u64)>,
    }

    impl ControlTransfer for RecordingCpu {
        fn clean_dcache_range(&mut self, start: u64, len: u64) {
            self.cleaned = Some((start, len));
        }

        fn disable_dcache(&mut self) {
            assert!(self.cleaned.is_some(), "cache disabled before clean");
            self.dcache_off = true;
        }

        unsafe fn enter(&mut self, entry: u64, arg: u64) -> Result<Infallible> {
            self.entered = Some((entry, arg));
            Err(BootError::KernelReturned)
        }
    }

    fn config(memory: &[u8]) -> BootConfig {
        let mut config = BootConfig::board();
        config.window_end = config.load_addr + memory.len() as u64;
        config
    }

    fn loaded(span: u64) -> LoadInfo {
        LoadInfo {
            base: V,
            entry: V + 0x40,
            end: V + span,
            thread: None,
        }
    }

    #[test]
    fn test_block_and_tree_follow_the_image() {
        let tree_bytes = NodeBuilder::new().property(b"arm-io").child(NodeBuilder::new()).build();
        let tree = DeviceTree::parse(&tree_bytes, 64).unwrap();
        let mut memory = vec![0xEEu8; 0x20000];
        let config = config(&memory);
        let mut window = PhysWindow::new(config.load_addr, &mut memory);

        let handoff = prepare_handoff(&loaded(0x1000), &tree, &mut window, &config, &BootServices::default()).unwrap();

        let load = config.load_addr;
        let args_addr = load + 0x1000;
        let tree_addr = args_addr + BootArgs::SIZE as u64;
        assert_eq!(handoff.entry(), load + 0x40);
        assert_eq!(handoff.boot_args_addr(), args_addr);
        assert_eq!(handoff.device_tree_addr(), tree_addr);

        let written = BootArgs::read_from(window.bytes(args_addr, BootArgs::SIZE as u64).unwrap()).unwrap();
        assert_eq!(written.virt_base, V);
        assert_eq!(written.phys_base, load);
        assert_eq!(written.afdt as u64, tree_addr);
        assert_eq!(written.afdt_length as usize, tree_bytes.len());
        assert_eq!(written.phys_end % 0x10000, 0);
        assert!(written.phys_end >= tree_addr + tree_bytes.len() as u64);
        assert_eq!(
            window.bytes(tree_addr, tree_bytes.len() as u64).unwrap(),
            &tree_bytes[..]
        );
        assert_eq!(handoff.written_range(), (load, tree_addr + tree_bytes.len() as u64));
    }

    #[test]
    fn test_no_display_gives_zero_video() {
        let tree_bytes = NodeBuilder::new().build();
        let tree = DeviceTree::parse(&tree_bytes, 64).unwrap();
        let mut memory = vec![0u8; 0x20000];
        let config = config(&memory);
        let mut window = PhysWindow::new(config.load_addr, &mut memory);
        let services = BootServices::new(&EmptyEnv, &NoDisplay);

        let handoff = prepare_handoff(&loaded(0x1000), &tree, &mut window, &config, &services).unwrap();
        assert_eq!(handoff.boot_args().video, VideoInformation::NONE);
        assert_eq!(handoff.boot_args().afdt_length, 8);
    }

    #[test]
    fn test_display_and_command_line_are_queried_once() {
        let tree_bytes = NodeBuilder::new().build();
        let tree = DeviceTree::parse(&tree_bytes, 64).unwrap();
        let mut memory = vec![0u8; 0x20000];
        let config = config(&memory);
        let mut window = PhysWindow::new(config.load_addr, &mut memory);

        let mut display = MockDisplayProvider::new();
        display.expect_first_display().times(1).return_const(Some(Framebuffer {
            base: 0x9e00_0000,
            xsize: 640,
            ysize: 480,
            bpix: 5,
        }));
        let env = EnvPairs(&[("bootargs", "-v serial=3")]);
        let services = BootServices::new(&env, &display);

        let handoff = prepare_handoff(&loaded(0x1000), &tree, &mut window, &config, &services).unwrap();
        let args = handoff.boot_args();
        assert_eq!(args.command_line(), Some("-v serial=3"));
        assert_eq!(args.video.display, 1);
        assert_eq!(args.video.bytes_per_row, 640 * 4);
    }

    #[test]
    fn test_tree_past_window_end() {
        let tree_bytes = NodeBuilder::new().property(&[0; 0x100]).build();
        let tree = DeviceTree::parse(&tree_bytes, 64).unwrap();
        let mut memory = vec![0u8; 0x1100];
        let config = config(&memory);
        let mut window = PhysWindow::new(config.load_addr, &mut memory);

        assert_eq!(
            prepare_handoff(&loaded(0x1000), &tree, &mut window, &config, &BootServices::default()).err(),
            Some(BootError::OutOfWindow)
        );
    }

    #[test]
    fn test_empty_load_is_refused() {
        let tree_bytes = NodeBuilder::new().build();
        let tree = DeviceTree::parse(&tree_bytes, 64).unwrap();
        let mut memory = vec![0u8; 0x100];
        let config = config(&memory);
        let mut window = PhysWindow::new(config.load_addr, &mut memory);

        assert_eq!(
            prepare_handoff(&LoadInfo::EMPTY, &tree, &mut window, &config, &BootServices::default()).err(),
            Some(BootError::NotAnImage)
        );
    }

    /// Tree bytes stored inside `memory` at `offset`, viewed in place
    fn tree_in_window(memory: &mut [u8], offset: usize, tree_bytes: &[u8]) -> DeviceTree<'static> {
        memory[offset..offset + tree_bytes.len()].copy_from_slice(tree_bytes);
        let addr = memory[offset..].as_ptr() as u64;
        // SAFETY: `memory` outlives the tree in every caller.
        unsafe { DeviceTree::from_raw(addr, tree_bytes.len(), 64) }.unwrap()
    }

    #[test]
    fn test_tree_inside_boot_args_is_refused() {
        let tree_bytes = NodeBuilder::new().property(b"product").build();
        let mut memory = vec![0u8; 0x20000];
        let config = config(&memory);
        let tree = tree_in_window(&mut memory, 0x1100, &tree_bytes);

        let ptr = memory.as_mut_ptr();
        // SAFETY: `memory` outlives the window; the handoff is refused
        // before anything is written.
        let mut window = unsafe { PhysWindow::from_raw_parts(config.load_addr, ptr, memory.len()) };
        let long = "A".repeat(600);
        let pairs = [("bootargs", long.as_str())];
        let env = EnvPairs(&pairs);
        let services = BootServices::new(&env, &NoDisplay);

        assert_eq!(
            prepare_handoff(&loaded(0x1000), &tree, &mut window, &config, &services).err(),
            Some(BootError::OverlappingSource)
        );
        assert_eq!(&memory[0x1100..0x1100 + tree_bytes.len()], &tree_bytes[..]);
    }

    #[test]
    fn test_tree_inside_kernel_is_refused() {
        let tree_bytes = NodeBuilder::new().child(NodeBuilder::new()).build();
        let mut memory = vec![0u8; 0x20000];
        let config = config(&memory);
        let tree = tree_in_window(&mut memory, 0x200, &tree_bytes);

        let ptr = memory.as_mut_ptr();
        // SAFETY: as above.
        let mut window = unsafe { PhysWindow::from_raw_parts(config.load_addr, ptr, memory.len()) };

        assert_eq!(
            prepare_handoff(&loaded(0x1000), &tree, &mut window, &config, &BootServices::default()).err(),
            Some(BootError::OverlappingSource)
        );
    }

    #[test]
    fn test_check_sources_before_load() {
        use crate::kernel_if::test_image::ImageBuilder;
        use crate::kernel_if::macho::WordSize;

        let image_bytes = ImageBuilder::new(WordSize::Bits64)
            .segment("__TEXT", V, 0x2000, 0, 0x100)
            .thread_pc(V)
            .padding(0x100)
            .build();
        let image = MachImage::parse(&image_bytes, WordSize::Bits64).unwrap();
        let tree_bytes = NodeBuilder::new().property(b"serial-number").build();

        let mut memory = vec![0u8; 0x20000];
        let config = config(&memory);

        // Inside the kernel span
        let tree = tree_in_window(&mut memory, 0x1800, &tree_bytes);
        let ptr = memory.as_mut_ptr();
        // SAFETY: the window is only read by the check.
        let window = unsafe { PhysWindow::from_raw_parts(config.load_addr, ptr, memory.len()) };
        assert_eq!(
            check_sources(&image, &tree, &window, config.load_addr),
            Err(BootError::OverlappingSource)
        );

        // Inside the boot arguments that follow the span
        let tree = tree_in_window(&mut memory, 0x2000 + 0x10, &tree_bytes);
        let ptr = memory.as_mut_ptr();
        // SAFETY: as above.
        let window = unsafe { PhysWindow::from_raw_parts(config.load_addr, ptr, memory.len()) };
        assert_eq!(
            check_sources(&image, &tree, &window, config.load_addr),
            Err(BootError::OverlappingSource)
        );

        // Past everything that is written
        let past = (written_len(0x2000, tree_bytes.len()) as usize).next_multiple_of(0x1000);
        let tree = tree_in_window(&mut memory, past, &tree_bytes);
        let ptr = memory.as_mut_ptr();
        // SAFETY: as above.
        let window = unsafe { PhysWindow::from_raw_parts(config.load_addr, ptr, memory.len()) };
        assert_eq!(check_sources(&image, &tree, &window, config.load_addr), Ok(()));
    }

    #[test]
    fn test_execute_cleans_then_enters() {
        let tree_bytes = NodeBuilder::new().build();
        let tree = DeviceTree::parse(&tree_bytes, 64).unwrap();
        let mut memory = vec![0u8; 0x20000];
        let config = config(&memory);
        let mut window = PhysWindow::new(config.load_addr, &mut memory);
        let mut cpu = RecordingCpu::default();

        let result = build_and_transfer(
            &loaded(0x1000),
            &tree,
            &mut window,
            &config,
            &BootServices::default(),
            &mut cpu,
        );

        let load = config.load_addr;
        let args_addr = load + 0x1000;
        assert_eq!(result.err(), Some(BootError::KernelReturned));
        assert_eq!(
            cpu.cleaned,
            Some((load, 0x1000 + BootArgs::SIZE as u64 + 8))
        );
        assert!(cpu.dcache_off);
        assert_eq!(cpu.entered, Some((load + 0x40, args_addr)));
    }
}
