//! Mach-O format support
//!
//! Header and load-command decoding for Mach-O executables. Everything is
//! read out of a byte view with checked offsets; the image is never cast to
//! a structure, so a short or corrupt image yields an error rather than an
//! out-of-bounds read.

use bitflags::bitflags;

use crate::error::{BootError, Result};
use crate::utils::mem_util::{fixed_str, read_u32, read_u64};

/// 32-bit Mach-O magic
pub const MH_MAGIC: u32 = 0xfeed_face;
/// 64-bit Mach-O magic
pub const MH_MAGIC_64: u32 = 0xfeed_facf;

/// Executable file type
pub const MH_EXECUTE: u32 = 0x2;

/// Load command kinds
pub const LC_SEGMENT: u32 = 0x1;
pub const LC_UNIXTHREAD: u32 = 0x5;
pub const LC_SEGMENT_64: u32 = 0x19;

/// CPU types
pub const CPU_ARCH_ABI64: u32 = 0x0100_0000;
pub const CPU_TYPE_ARM: u32 = 12;
pub const CPU_TYPE_ARM64: u32 = CPU_TYPE_ARM | CPU_ARCH_ABI64;

/// Header fields shared by both word sizes
pub const COMMON_HEADER_SIZE: usize = 28;

/// `{command, command_size}` prefix of every load command
pub const LOAD_COMMAND_PREFIX: usize = 8;

/// Offset of the register state inside a thread command
const THREAD_STATE_OFFSET: usize = 16;

/// Offsets into `arm_thread_state64`
const ARM64_SP: usize = 248;
const ARM64_PC: usize = 256;
const ARM64_CPSR: usize = 264;

/// Offsets into `arm_thread_state`
const ARM_SP: usize = 52;
const ARM_PC: usize = 60;
const ARM_CPSR: usize = 64;

/// Mach-O word size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordSize {
    Bits32,
    Bits64,
}

impl WordSize {
    /// Word size the loader accepts by default
    pub const NATIVE: Self = if cfg!(feature = "phys32") {
        WordSize::Bits32
    } else {
        WordSize::Bits64
    };

    /// Header magic for this word size
    pub const fn magic(self) -> u32 {
        match self {
            WordSize::Bits32 => MH_MAGIC,
            WordSize::Bits64 => MH_MAGIC_64,
        }
    }

    /// Header size in bytes
    pub const fn header_size(self) -> usize {
        match self {
            WordSize::Bits32 => 28,
            WordSize::Bits64 => 32,
        }
    }

    /// Segment load command kind
    pub const fn segment_command(self) -> u32 {
        match self {
            WordSize::Bits32 => LC_SEGMENT,
            WordSize::Bits64 => LC_SEGMENT_64,
        }
    }

    /// Size of an address-sized field
    pub const fn word_bytes(self) -> usize {
        match self {
            WordSize::Bits32 => 4,
            WordSize::Bits64 => 8,
        }
    }

    /// Size of a segment command without its sections
    pub const fn segment_command_size(self) -> usize {
        LOAD_COMMAND_PREFIX + SEGMENT_NAME_LEN + 4 * self.word_bytes() + 16
    }

    fn read_word(self, bytes: &[u8], offset: usize) -> Option<u64> {
        match self {
            WordSize::Bits32 => read_u32(bytes, offset).map(u64::from),
            WordSize::Bits64 => read_u64(bytes, offset),
        }
    }
}

/// Length of a segment name
pub const SEGMENT_NAME_LEN: usize = 16;

bitflags! {
    /// VM protection bits of a segment
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct VmProt: u32 {
        const READ = 0x1;
        const WRITE = 0x2;
        const EXECUTE = 0x4;
    }
}

/// Mach-O header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachHeader {
    pub magic: u32,
    pub cpu_type: u32,
    pub cpu_subtype: u32,
    pub file_type: u32,
    /// Number of load commands
    pub commands_nb: u32,
    /// Total byte length of the load commands
    pub commands_len: u32,
    pub flags: u32,
}

impl MachHeader {
    /// Decode the fields shared by both word sizes
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let field = |index: usize| read_u32(bytes, index * 4).ok_or(BootError::HeaderTruncated);

        Ok(Self {
            magic: field(0)?,
            cpu_type: field(1)?,
            cpu_subtype: field(2)?,
            file_type: field(3)?,
            commands_nb: field(4)?,
            commands_len: field(5)?,
            flags: field(6)?,
        })
    }

    /// Check if this is an executable of word size `word`
    pub fn is_executable(&self, word: WordSize) -> bool {
        self.magic == word.magic() && self.file_type == MH_EXECUTE
    }
}

/// Segment load command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentCommand {
    pub name: [u8; SEGMENT_NAME_LEN],
    /// Destination (virtual) address
    pub dst: u64,
    /// Destination length
    pub dst_len: u64,
    /// Offset of the payload in the image
    pub src_offset: u64,
    /// Payload length
    pub src_len: u64,
    pub max_prot: VmProt,
    pub init_prot: VmProt,
    pub sections_nb: u32,
    pub flags: u32,
}

impl SegmentCommand {
    fn parse(body: &[u8], word: WordSize) -> Option<Self> {
        let mut name = [0u8; SEGMENT_NAME_LEN];
        name.copy_from_slice(body.get(LOAD_COMMAND_PREFIX..LOAD_COMMAND_PREFIX + SEGMENT_NAME_LEN)?);

        let words = LOAD_COMMAND_PREFIX + SEGMENT_NAME_LEN;
        let w = word.word_bytes();
        let tail = words + 4 * w;

        Some(Self {
            name,
            dst: word.read_word(body, words)?,
            dst_len: word.read_word(body, words + w)?,
            src_offset: word.read_word(body, words + 2 * w)?,
            src_len: word.read_word(body, words + 3 * w)?,
            max_prot: VmProt::from_bits_retain(read_u32(body, tail)?),
            init_prot: VmProt::from_bits_retain(read_u32(body, tail + 4)?),
            sections_nb: read_u32(body, tail + 8)?,
            flags: read_u32(body, tail + 12)?,
        })
    }

    /// Segment name
    pub fn name(&self) -> &str {
        fixed_str(&self.name)
    }

    /// One past the last destination address
    pub fn dst_end(&self) -> Option<u64> {
        self.dst.checked_add(self.dst_len)
    }
}

/// Initial register state from a unified-thread command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadState {
    pub flavor: u32,
    /// Program counter
    pub pc: u64,
    /// Stack pointer, when the CPU type defines where it is
    pub sp: Option<u64>,
    /// Program status, when the CPU type defines where it is
    pub cpsr: Option<u32>,
}

impl ThreadState {
    fn parse(body: &[u8], cpu_type: u32) -> Option<Self> {
        let flavor = read_u32(body, LOAD_COMMAND_PREFIX)?;
        let state = body.get(THREAD_STATE_OFFSET..)?;

        let thread = match cpu_type {
            CPU_TYPE_ARM64 => Self {
                flavor,
                pc: read_u64(state, ARM64_PC)?,
                sp: read_u64(state, ARM64_SP),
                cpsr: read_u32(state, ARM64_CPSR),
            },
            CPU_TYPE_ARM => Self {
                flavor,
                pc: u64::from(read_u32(state, ARM_PC)?),
                sp: read_u32(state, ARM_SP).map(u64::from),
                cpsr: read_u32(state, ARM_CPSR),
            },
            _ => Self {
                flavor,
                pc: read_u64(state, 0)?,
                sp: None,
                cpsr: None,
            },
        };
        Some(thread)
    }
}

/// Decoded load command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadCommand {
    /// Segment of the configured word size
    Segment(SegmentCommand),
    /// Unified thread
    UnixThread(ThreadState),
    /// Anything else, skipped by the loader
    Other { command: u32, size: u32 },
}

/// Mach-O executable in memory
#[derive(Debug, Clone, Copy)]
pub struct MachImage<'a> {
    bytes: &'a [u8],
    header: MachHeader,
    word: WordSize,
}

impl<'a> MachImage<'a> {
    /// Validate the header of `bytes` as an executable of word size `word`
    pub fn parse(bytes: &'a [u8], word: WordSize) -> Result<Self> {
        let header = MachHeader::parse(bytes)?;
        if !header.is_executable(word) {
            return Err(BootError::NotAnImage);
        }
        if bytes.len() < word.header_size() {
            return Err(BootError::HeaderTruncated);
        }

        let commands_end = word
            .header_size()
            .checked_add(header.commands_len as usize)
            .ok_or(BootError::HeaderTruncated)?;
        if bytes.len() < commands_end {
            return Err(BootError::HeaderTruncated);
        }

        Ok(Self {
            bytes,
            header,
            word,
        })
    }

    /// Image at physical `addr`, sized from its own header and segments.
    ///
    /// At most `limit` bytes are ever viewed.
    ///
    /// # Safety
    ///
    /// `addr..addr + limit` must be identity-mapped readable memory that is
    /// not written while the image is in use.
    pub unsafe fn from_raw(addr: u64, word: WordSize, limit: usize) -> Result<MachImage<'static>> {
        let view = |len: usize| -> Result<&'static [u8]> {
            if addr == 0 || len > limit {
                return Err(BootError::HeaderTruncated);
            }
            // SAFETY: `len <= limit`, readable per the caller's contract.
            Ok(unsafe { core::slice::from_raw_parts(addr as usize as *const u8, len) })
        };

        let header = MachHeader::parse(view(COMMON_HEADER_SIZE)?)?;
        if !header.is_executable(word) {
            return Err(BootError::NotAnImage);
        }

        let commands_end = word.header_size() + header.commands_len as usize;
        let commands = MachImage::parse(view(commands_end)?, word)?;
        let extent = commands.extent()?;
        if extent > limit {
            return Err(BootError::SegmentSourceOutOfBounds);
        }

        MachImage::parse(view(extent)?, word)
    }

    /// Decoded header
    pub fn header(&self) -> &MachHeader {
        &self.header
    }

    /// Word size of the image
    pub fn word_size(&self) -> WordSize {
        self.word
    }

    /// The whole image view
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Fresh walk over the load commands
    pub fn commands(&self) -> LoadCommands<'a> {
        let start = self.word.header_size();
        let end = start + self.header.commands_len as usize;

        LoadCommands {
            commands: &self.bytes[start..end],
            cursor: 0,
            index: 0,
            count: self.header.commands_nb,
            word: self.word,
            cpu_type: self.header.cpu_type,
            failed: false,
        }
    }

    /// Payload of `segment`
    pub fn segment_data(&self, segment: &SegmentCommand) -> Result<&'a [u8]> {
        let start = usize::try_from(segment.src_offset).map_err(|_| BootError::SegmentSourceOutOfBounds)?;
        let len = usize::try_from(segment.src_len).map_err(|_| BootError::SegmentSourceOutOfBounds)?;
        let end = start.checked_add(len).ok_or(BootError::SegmentSourceOutOfBounds)?;

        self.bytes.get(start..end).ok_or(BootError::SegmentSourceOutOfBounds)
    }

    /// Bytes the image occupies: header, commands and every payload the
    /// loader copies. Segments with no destination are never read.
    pub fn extent(&self) -> Result<usize> {
        let mut extent = self.word.header_size() + self.header.commands_len as usize;

        for command in self.commands() {
            let LoadCommand::Segment(segment) = command? else {
                continue;
            };
            if segment.dst_len == 0 {
                continue;
            }
            let end = segment
                .src_offset
                .checked_add(segment.src_len)
                .and_then(|end| usize::try_from(end).ok())
                .ok_or(BootError::SegmentSourceOutOfBounds)?;
            extent = extent.max(end);
        }
        Ok(extent)
    }
}

/// Iterator over the load commands of an image.
///
/// Stops after `commands_nb` commands or at the first malformed one, which is
/// yielded as an error.
#[derive(Debug, Clone)]
pub struct LoadCommands<'a> {
    commands: &'a [u8],
    cursor: usize,
    index: u32,
    count: u32,
    word: WordSize,
    cpu_type: u32,
    failed: bool,
}

impl LoadCommands<'_> {
    fn decode(&mut self, index: u32) -> Result<LoadCommand> {
        let malformed = BootError::MalformedLoadCommand(index);

        let rest = self.commands.get(self.cursor..).ok_or(malformed)?;
        let command = read_u32(rest, 0).ok_or(malformed)?;
        let size = read_u32(rest, 4).ok_or(malformed)?;
        let len = size as usize;
        if len < LOAD_COMMAND_PREFIX || len > rest.len() {
            return Err(malformed);
        }

        let body = &rest[..len];
        self.cursor += len;

        let decoded = if command == self.word.segment_command() {
            LoadCommand::Segment(SegmentCommand::parse(body, self.word).ok_or(malformed)?)
        } else if command == LC_UNIXTHREAD {
            LoadCommand::UnixThread(ThreadState::parse(body, self.cpu_type).ok_or(malformed)?)
        } else {
            LoadCommand::Other { command, size }
        };
        Ok(decoded)
    }
}

impl Iterator for LoadCommands<'_> {
    type Item = Result<LoadCommand>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.index >= self.count {
            return None;
        }

        let index = self.index;
        self.index += 1;

        let decoded = self.decode(index);
        if decoded.is_err() {
            self.failed = true;
        }
        Some(decoded)
    }
}

impl core::iter::FusedIterator for LoadCommands<'_> {}
