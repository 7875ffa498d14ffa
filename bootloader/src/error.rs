//! Bootloader error handling
//!
//! This module defines the error types used throughout the loader
//! for consistent error reporting and handling.

use core::fmt;

/// Bootloader error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    /// Missing or unparsable command arguments
    Usage(&'static str),

    /// No Mach-O executable of the configured word size at the address
    NotAnImage,

    /// Image too short to hold its own header or command list
    HeaderTruncated,

    /// Load command with a bad size or running past the command list
    MalformedLoadCommand(u32),

    /// Segment payload reaches past the end of the image
    SegmentSourceOutOfBounds,

    /// Segment declares more source bytes than destination space
    InvalidSegmentSize,

    /// Segment image has no unified-thread command
    NoEntryPoint,

    /// Entry point lies outside the loaded span
    EntryOutsideImage,

    /// Placement falls outside the reserved physical window
    OutOfWindow,

    /// Source bytes overlap the destination they would be copied to
    OverlappingSource,

    /// Device tree runs past its view or has inconsistent counts
    DeviceTreeTruncated,

    /// Device tree nests deeper than the walker allows
    DeviceTreeTooDeep,

    /// No control transfer for this architecture
    UnsupportedArchitecture,

    /// Kernel unexpectedly returned
    KernelReturned,
}

impl BootError {
    /// Convert to an error code suitable for passing to firmware/OS
    pub fn as_error_code(&self) -> u32 {
        match self {
            BootError::Usage(_) => 0x1000,
            BootError::NotAnImage => 0x9000,
            BootError::HeaderTruncated => 0x9001,
            BootError::MalformedLoadCommand(index) => 0x9100 + (*index).min(0xff),
            BootError::SegmentSourceOutOfBounds => 0x9002,
            BootError::InvalidSegmentSize => 0x9003,
            BootError::NoEntryPoint => 0x9004,
            BootError::EntryOutsideImage => 0x9005,
            BootError::OutOfWindow => 0x2000,
            BootError::OverlappingSource => 0x2001,
            BootError::DeviceTreeTruncated => 0x7000,
            BootError::DeviceTreeTooDeep => 0x7001,
            BootError::UnsupportedArchitecture => 0xB000,
            BootError::KernelReturned => 0xF000,
        }
    }

    /// Get a human-readable description of the error
    pub fn description(&self) -> &'static str {
        match self {
            BootError::Usage(msg) => msg,
            BootError::NotAnImage => "No Mach-O image",
            BootError::HeaderTruncated => "Mach-O header truncated",
            BootError::MalformedLoadCommand(_) => "Malformed load command",
            BootError::SegmentSourceOutOfBounds => "Segment data exceeds image bounds",
            BootError::InvalidSegmentSize => "Segment file size exceeds memory size",
            BootError::NoEntryPoint => "No thread command with an entry point",
            BootError::EntryOutsideImage => "Entry point outside loaded segments",
            BootError::OutOfWindow => "Placement outside reserved memory",
            BootError::OverlappingSource => "Source overlaps load destination",
            BootError::DeviceTreeTruncated => "Device tree truncated",
            BootError::DeviceTreeTooDeep => "Device tree nested too deeply",
            BootError::UnsupportedArchitecture => "Unsupported architecture",
            BootError::KernelReturned => "Kernel unexpectedly returned",
        }
    }

    /// Status returned to the command shell
    ///
    /// 1 for usage errors, 3 when control came back from the kernel,
    /// 2 for everything that means "nothing bootable at that address".
    pub fn exit_status(&self) -> i32 {
        match self {
            BootError::Usage(_) => 1,
            BootError::KernelReturned => 3,
            _ => 2,
        }
    }

    /// Check if the failure comes from the image contents
    pub fn is_image_error(&self) -> bool {
        matches!(
            self,
            BootError::NotAnImage
                | BootError::HeaderTruncated
                | BootError::MalformedLoadCommand(_)
                | BootError::SegmentSourceOutOfBounds
                | BootError::InvalidSegmentSize
                | BootError::NoEntryPoint
                | BootError::EntryOutsideImage
        )
    }
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootError::MalformedLoadCommand(index) => write!(
                f,
                "BootError: {} #{} (code: {:#x})",
                self.description(),
                index,
                self.as_error_code()
            ),
            _ => write!(f, "BootError: {} (code: {:#x})", self.description(), self.as_error_code()),
        }
    }
}

/// Result type used throughout the loader
pub type Result<T = ()> = core::result::Result<T, BootError>;
