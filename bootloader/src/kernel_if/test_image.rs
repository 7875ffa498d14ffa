//! Mach-O and device-tree fixtures for unit tests

use std::vec::Vec;

use super::macho::{
    CPU_TYPE_ARM, CPU_TYPE_ARM64, LC_UNIXTHREAD, MH_EXECUTE, SEGMENT_NAME_LEN, WordSize,
};

enum Command {
    Segment {
        name: &'static str,
        dst: u64,
        dst_len: u64,
        src_offset: u64,
        src_len: u64,
    },
    Thread {
        pc: u64,
        sp: u64,
        cpsr: u32,
    },
    Raw {
        command: u32,
        size: Option<u32>,
        body: Vec<u8>,
    },
}

/// Builds Mach-O images in native byte order
pub(crate) struct ImageBuilder {
    word: WordSize,
    cpu_type: u32,
    file_type: u32,
    commands_nb: Option<u32>,
    commands: Vec<Command>,
    payloads: Vec<(usize, Vec<u8>)>,
    padding: usize,
}

impl ImageBuilder {
    pub(crate) fn new(word: WordSize) -> Self {
        Self {
            word,
            cpu_type: match word {
                WordSize::Bits32 => CPU_TYPE_ARM,
                WordSize::Bits64 => CPU_TYPE_ARM64,
            },
            file_type: MH_EXECUTE,
            commands_nb: None,
            commands: Vec::new(),
            payloads: Vec::new(),
            padding: 0,
        }
    }

    pub(crate) fn cpu_type(mut self, cpu_type: u32) -> Self {
        self.cpu_type = cpu_type;
        self
    }

    pub(crate) fn file_type(mut self, file_type: u32) -> Self {
        self.file_type = file_type;
        self
    }

    /// Override the header's command count
    pub(crate) fn commands_nb(mut self, count: u32) -> Self {
        self.commands_nb = Some(count);
        self
    }

    pub(crate) fn segment(
        mut self,
        name: &'static str,
        dst: u64,
        dst_len: u64,
        src_offset: u64,
        src_len: u64,
    ) -> Self {
        self.commands.push(Command::Segment {
            name,
            dst,
            dst_len,
            src_offset,
            src_len,
        });
        self
    }

    pub(crate) fn thread_pc(self, pc: u64) -> Self {
        self.thread(pc, 0, 0)
    }

    /// Thread command laid out for the builder's CPU type
    pub(crate) fn thread(mut self, pc: u64, sp: u64, cpsr: u32) -> Self {
        self.commands.push(Command::Thread { pc, sp, cpsr });
        self
    }

    pub(crate) fn raw_command(mut self, command: u32, body: &[u8]) -> Self {
        self.commands.push(Command::Raw {
            command,
            size: None,
            body: body.to_vec(),
        });
        self
    }

    /// Command whose size field is `size` regardless of `body`
    pub(crate) fn raw_sized_command(mut self, command: u32, size: u32, body: &[u8]) -> Self {
        self.commands.push(Command::Raw {
            command,
            size: Some(size),
            body: body.to_vec(),
        });
        self
    }

    /// Bytes to place at `offset` in the image
    pub(crate) fn payload(mut self, offset: usize, bytes: &[u8]) -> Self {
        self.payloads.push((offset, bytes.to_vec()));
        self
    }

    /// Trailing zero bytes after everything else
    pub(crate) fn padding(mut self, len: usize) -> Self {
        self.padding = len;
        self
    }

    fn encode(&self, command: &Command, out: &mut Vec<u8>) {
        let start = out.len();
        match command {
            Command::Segment {
                name,
                dst,
                dst_len,
                src_offset,
                src_len,
            } => {
                put_u32(out, self.word.segment_command());
                put_u32(out, self.word.segment_command_size() as u32);
                let mut raw_name = [0u8; SEGMENT_NAME_LEN];
                raw_name[..name.len()].copy_from_slice(name.as_bytes());
                out.extend_from_slice(&raw_name);
                for value in [*dst, *dst_len, *src_offset, *src_len] {
                    self.put_word(out, value);
                }
                let init_prot = if *name == "__TEXT" { 0x5 } else { 0x3 };
                put_u32(out, 0x7);
                put_u32(out, init_prot);
                put_u32(out, 0);
                put_u32(out, 0);
            }
            Command::Thread { pc, sp, cpsr } => {
                put_u32(out, LC_UNIXTHREAD);
                put_u32(out, 0);
                let mut state = Vec::new();
                match self.cpu_type {
                    CPU_TYPE_ARM64 => {
                        state.resize(272, 0);
                        state[248..256].copy_from_slice(&sp.to_ne_bytes());
                        state[256..264].copy_from_slice(&pc.to_ne_bytes());
                        state[264..268].copy_from_slice(&cpsr.to_ne_bytes());
                    }
                    CPU_TYPE_ARM => {
                        state.resize(68, 0);
                        state[52..56].copy_from_slice(&(*sp as u32).to_ne_bytes());
                        state[60..64].copy_from_slice(&(*pc as u32).to_ne_bytes());
                        state[64..68].copy_from_slice(&cpsr.to_ne_bytes());
                    }
                    _ => state.extend_from_slice(&pc.to_ne_bytes()),
                }
                put_u32(out, 1);
                put_u32(out, (state.len() / 4) as u32);
                out.extend_from_slice(&state);
            }
            Command::Raw {
                command,
                size,
                body,
            } => {
                put_u32(out, *command);
                put_u32(out, size.unwrap_or((body.len() + 8) as u32));
                out.extend_from_slice(body);
            }
        }

        if !matches!(command, Command::Raw { .. }) {
            let len = (out.len() - start) as u32;
            out[start + 4..start + 8].copy_from_slice(&len.to_ne_bytes());
        }
    }

    fn put_word(&self, out: &mut Vec<u8>, value: u64) {
        match self.word {
            WordSize::Bits32 => put_u32(out, value as u32),
            WordSize::Bits64 => out.extend_from_slice(&value.to_ne_bytes()),
        }
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let mut commands = Vec::new();
        for command in &self.commands {
            self.encode(command, &mut commands);
        }

        let mut image = Vec::new();
        put_u32(&mut image, self.word.magic());
        put_u32(&mut image, self.cpu_type);
        put_u32(&mut image, 0);
        put_u32(&mut image, self.file_type);
        put_u32(&mut image, self.commands_nb.unwrap_or(self.commands.len() as u32));
        put_u32(&mut image, commands.len() as u32);
        put_u32(&mut image, 0);
        if self.word == WordSize::Bits64 {
            put_u32(&mut image, 0);
        }
        image.extend_from_slice(&commands);

        for (offset, bytes) in &self.payloads {
            let end = offset + bytes.len();
            if image.len() < end {
                image.resize(end, 0);
            }
            image[*offset..end].copy_from_slice(bytes);
        }
        image.resize(image.len() + self.padding, 0);
        image
    }
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_ne_bytes());
}

/// Builds Apple device-tree nodes
pub(crate) struct NodeBuilder {
    properties: Vec<(u32, Vec<u8>)>,
    children: Vec<NodeBuilder>,
}

impl NodeBuilder {
    pub(crate) fn new() -> Self {
        Self {
            properties: Vec::new(),
            children: Vec::new(),
        }
    }

    pub(crate) fn property(mut self, value: &[u8]) -> Self {
        self.properties.push((value.len() as u32, value.to_vec()));
        self
    }

    /// Property whose length field carries the placeholder bit
    pub(crate) fn placeholder(mut self, value: &[u8]) -> Self {
        self.properties
            .push((value.len() as u32 | 0x8000_0000, value.to_vec()));
        self
    }

    pub(crate) fn child(mut self, child: NodeBuilder) -> Self {
        self.children.push(child);
        self
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }

    fn encode(&self, out: &mut Vec<u8>) {
        put_u32(out, self.properties.len() as u32);
        put_u32(out, self.children.len() as u32);
        for (index, (length, value)) in self.properties.iter().enumerate() {
            let mut name = [0u8; 32];
            let label = std::format!("prop{}", index);
            name[..label.len()].copy_from_slice(label.as_bytes());
            out.extend_from_slice(&name);
            put_u32(out, *length);
            out.extend_from_slice(value);
            out.resize(out.len() + value.len().next_multiple_of(4) - value.len(), 0);
        }
        for child in &self.children {
            child.encode(out);
        }
    }
}
