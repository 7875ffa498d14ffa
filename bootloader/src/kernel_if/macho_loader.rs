//! Mach-O segment loader
//!
//! Places the segments of a [`MachImage`] contiguously at a physical load
//! address. The lowest segment destination lands exactly at the load address
//! and the rest keep their relative offsets. Two walks over the load
//! commands are needed: the first finds the span, the second copies.

use crate::error::{BootError, Result};
use crate::memory::PhysWindow;

use super::macho::{LoadCommand, MachImage, SegmentCommand, ThreadState};

/// Result of loading an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadInfo {
    /// Lowest segment destination (kernel virtual address)
    pub base: u64,
    /// Program counter of the unified-thread command
    pub entry: u64,
    /// One past the highest segment destination
    pub end: u64,
    /// Full initial thread state
    pub thread: Option<ThreadState>,
}

impl LoadInfo {
    /// Descriptor of an image with no segments
    pub const EMPTY: Self = Self {
        base: u64::MAX,
        entry: 0,
        end: 0,
        thread: None,
    };

    /// Check if no segment was found
    pub fn is_empty(&self) -> bool {
        self.base > self.end
    }

    /// Bytes covered by the segments
    pub fn span(&self) -> u64 {
        self.end.saturating_sub(self.base)
    }

    /// Physical address of kernel virtual `addr` when `base` sits at `load_addr`
    pub fn to_physical(&self, addr: u64, load_addr: u64) -> u64 {
        addr.wrapping_sub(self.base).wrapping_add(load_addr)
    }
}

impl Default for LoadInfo {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// First pass: fold the segment destinations into `base..end`
pub fn load_span(image: &MachImage<'_>) -> Result<LoadInfo> {
    let mut info = LoadInfo::EMPTY;

    for (index, command) in image.commands().enumerate() {
        if let LoadCommand::Segment(segment) = command? {
            let end = segment
                .dst_end()
                .ok_or(BootError::MalformedLoadCommand(index as u32))?;
            info.base = info.base.min(segment.dst);
            info.end = info.end.max(end);
        }
    }

    Ok(info)
}

/// Load `image` into `window` with its lowest segment at `load_addr`.
///
/// An image without segments yields [`LoadInfo::EMPTY`] and writes nothing.
pub fn load_mach_o(image: &MachImage<'_>, window: &mut PhysWindow<'_>, load_addr: u64) -> Result<LoadInfo> {
    let mut info = load_span(image)?;
    if info.is_empty() {
        log::warn!("Mach-O image has no segments");
        return Ok(info);
    }

    log::debug!(
        "Load span {:#x}..{:#x} -> {:#x}",
        info.base,
        info.end,
        load_addr
    );

    if !window.contains(load_addr, info.span()) {
        return Err(BootError::OutOfWindow);
    }
    if window.overlaps(load_addr, info.span(), image.bytes()) {
        return Err(BootError::OverlappingSource);
    }

    for command in image.commands() {
        match command? {
            LoadCommand::Segment(segment) => {
                let dst = info.to_physical(segment.dst, load_addr);
                place_segment(image, window, &segment, dst)?;
            }
            LoadCommand::UnixThread(thread) => {
                log::debug!("Thread state: pc {:#x}", thread.pc);
                info.entry = thread.pc;
                info.thread = Some(thread);
            }
            LoadCommand::Other { command, size } => {
                log::trace!("Skipping load command {:#x} ({} bytes)", command, size);
            }
        }
    }

    if info.thread.is_none() {
        return Err(BootError::NoEntryPoint);
    }
    if info.entry < info.base || info.entry >= info.end {
        return Err(BootError::EntryOutsideImage);
    }

    log::info!(
        "Loaded Mach-O: base {:#x} end {:#x} entry {:#x}",
        info.base,
        info.end,
        info.entry
    );
    Ok(info)
}

/// Copy one segment's payload to `dst` and zero the rest of it
fn place_segment(
    image: &MachImage<'_>,
    window: &mut PhysWindow<'_>,
    segment: &SegmentCommand,
    dst: u64,
) -> Result<()> {
    if segment.dst_len == 0 {
        log::trace!("Segment {} is empty", segment.name());
        return Ok(());
    }
    if segment.src_len > segment.dst_len {
        return Err(BootError::InvalidSegmentSize);
    }

    log::debug!(
        "Segment {:<16} {:#x} ({:#x} bytes, {:#x} from file) -> {:#x}",
        segment.name(),
        segment.dst,
        segment.dst_len,
        segment.src_len,
        dst
    );

    if segment.src_len > 0 {
        window.copy_from(dst, image.segment_data(segment)?)?;
    }

    // Trailing fill (bss)
    let fill = segment.dst_len - segment.src_len;
    if fill > 0 {
        window.zero(dst + segment.src_len, fill)?;
    }
    Ok(())
}
