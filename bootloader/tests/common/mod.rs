//! Shared fixtures: 64-bit ARM64 Mach-O images and Apple device trees

#![allow(dead_code)]

pub const MH_MAGIC_64: u32 = 0xfeed_facf;
pub const MH_EXECUTE: u32 = 0x2;
pub const LC_SEGMENT_64: u32 = 0x19;
pub const LC_UNIXTHREAD: u32 = 0x5;
pub const CPU_TYPE_ARM64: u32 = 0x0100_000c;

/// Segment as declared in the image
#[derive(Debug, Clone, Copy)]
pub struct Segment {
    pub dst: u64,
    pub dst_len: u64,
    pub src_offset: u64,
    pub src_len: u64,
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_ne_bytes());
}

fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_ne_bytes());
}

fn segment_command(out: &mut Vec<u8>, segment: &Segment) {
    put_u32(out, LC_SEGMENT_64);
    put_u32(out, 72);
    out.extend_from_slice(b"__SEG\0\0\0\0\0\0\0\0\0\0\0");
    put_u64(out, segment.dst);
    put_u64(out, segment.dst_len);
    put_u64(out, segment.src_offset);
    put_u64(out, segment.src_len);
    put_u32(out, 7);
    put_u32(out, 5);
    put_u32(out, 0);
    put_u32(out, 0);
}

fn thread_command(out: &mut Vec<u8>, pc: u64) {
    put_u32(out, LC_UNIXTHREAD);
    put_u32(out, 16 + 272);
    put_u32(out, 6);
    put_u32(out, 68);
    let mut state = [0u8; 272];
    state[256..264].copy_from_slice(&pc.to_ne_bytes());
    out.extend_from_slice(&state);
}

/// Image with `segments`, an optional thread at `pc`, and `len` bytes total.
///
/// Payload bytes are a position-dependent pattern so copies can be checked.
pub fn macho_image(segments: &[Segment], pc: Option<u64>, len: usize) -> Vec<u8> {
    let mut commands = Vec::new();
    for segment in segments {
        segment_command(&mut commands, segment);
    }
    if let Some(pc) = pc {
        thread_command(&mut commands, pc);
    }

    let mut image = Vec::new();
    put_u32(&mut image, MH_MAGIC_64);
    put_u32(&mut image, CPU_TYPE_ARM64);
    put_u32(&mut image, 0);
    put_u32(&mut image, MH_EXECUTE);
    put_u32(&mut image, (segments.len() + pc.is_some() as usize) as u32);
    put_u32(&mut image, commands.len() as u32);
    put_u32(&mut image, 0);
    put_u32(&mut image, 0);
    image.extend_from_slice(&commands);

    let header_len = image.len();
    image.resize(len.max(header_len), 0);
    for (index, byte) in image.iter_mut().enumerate().skip(header_len) {
        *byte = (index % 251) as u8;
    }
    image
}

/// Device-tree node with `properties` values and `children` nodes
pub fn adt_node(properties: &[&[u8]], children: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    put_u32(&mut out, properties.len() as u32);
    put_u32(&mut out, children.len() as u32);
    for value in properties {
        out.extend_from_slice(&[b'p'; 32]);
        put_u32(&mut out, value.len() as u32);
        out.extend_from_slice(value);
        out.resize(out.len() + (4 - value.len() % 4) % 4, 0);
    }
    for child in children {
        out.extend_from_slice(child);
    }
    out
}
