// Memory utility functions for the loader
//
// Bounds-checked native-endian reads out of byte views. Mach-O headers,
// load commands and the device tree are all read through these, so a short
// buffer yields `None` instead of an out-of-bounds access.

/// Read a native-endian `u32` at `offset`
#[inline]
pub fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let end = offset.checked_add(4)?;
    let raw = bytes.get(offset..end)?;
    Some(u32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

/// Read a native-endian `u64` at `offset`
#[inline]
pub fn read_u64(bytes: &[u8], offset: usize) -> Option<u64> {
    let end = offset.checked_add(8)?;
    let raw: [u8; 8] = bytes.get(offset..end)?.try_into().ok()?;
    Some(u64::from_ne_bytes(raw))
}

/// Round `value` up to a multiple of `align` (a power of two)
#[inline]
pub const fn align_up(value: u64, align: u64) -> Option<u64> {
    debug_assert!(align.is_power_of_two());
    match value.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}

/// Text of a fixed-size, NUL-padded name field
pub fn fixed_str(bytes: &[u8]) -> &str {
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    core::str::from_utf8(&bytes[..len]).unwrap_or("<non-utf8>")
}
