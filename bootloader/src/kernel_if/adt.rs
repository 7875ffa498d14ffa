//! Apple device tree
//!
//! The loader never interprets the tree; it only needs its byte length,
//! which is not stored anywhere and has to be found by walking the nodes.

use crate::error::{BootError, Result};
use crate::utils::mem_util::read_u32;

/// `{properties_nb, children_nb}`
pub const NODE_HEADER_SIZE: usize = 8;

/// Fixed-size property name
pub const PROPERTY_NAME_LEN: usize = 32;

/// Name plus length word
pub const PROPERTY_HEADER_SIZE: usize = PROPERTY_NAME_LEN + 4;

/// Placeholder flag carried in a property's length word
pub const PROPERTY_PLACEHOLDER: u32 = 0x8000_0000;

/// Measured device tree
#[derive(Debug, Clone, Copy)]
pub struct DeviceTree<'a> {
    bytes: &'a [u8],
}

impl<'a> DeviceTree<'a> {
    /// Measure the tree at the start of `bytes`; the view is cut to its length
    pub fn parse(bytes: &'a [u8], max_depth: usize) -> Result<Self> {
        let len = node_length(bytes, max_depth)?;
        Ok(Self {
            bytes: &bytes[..len],
        })
    }

    /// Tree at physical `addr`, no longer than `limit` bytes
    ///
    /// # Safety
    ///
    /// `addr..addr + limit` must be identity-mapped readable memory that is
    /// not written while the tree is in use.
    pub unsafe fn from_raw(addr: u64, limit: usize, max_depth: usize) -> Result<DeviceTree<'static>> {
        if addr == 0 || limit < NODE_HEADER_SIZE {
            return Err(BootError::DeviceTreeTruncated);
        }
        // SAFETY: forwarded to the caller.
        let bytes = unsafe { core::slice::from_raw_parts(addr as usize as *const u8, limit) };
        DeviceTree::parse(bytes, max_depth)
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// A tree always has at least its root header
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Number of properties on the root node
    pub fn root_properties(&self) -> u32 {
        read_u32(self.bytes, 0).unwrap_or(0)
    }

    /// Number of children of the root node
    pub fn root_children(&self) -> u32 {
        read_u32(self.bytes, 4).unwrap_or(0)
    }
}

/// Byte length of the node at the start of `bytes`, children included.
///
/// The root counts as depth 1; nesting beyond `max_depth` is refused.
pub fn node_length(bytes: &[u8], max_depth: usize) -> Result<usize> {
    measure(bytes, 0, max_depth)
}

fn measure(bytes: &[u8], offset: usize, depth_left: usize) -> Result<usize> {
    if depth_left == 0 {
        return Err(BootError::DeviceTreeTooDeep);
    }

    let properties = read_u32(bytes, offset).ok_or(BootError::DeviceTreeTruncated)?;
    let children = read_u32(bytes, offset + 4).ok_or(BootError::DeviceTreeTruncated)?;
    let mut cursor = offset + NODE_HEADER_SIZE;

    for _ in 0..properties {
        let length = read_u32(bytes, cursor + PROPERTY_NAME_LEN).ok_or(BootError::DeviceTreeTruncated)?;
        let value = ((length & !PROPERTY_PLACEHOLDER) as usize).next_multiple_of(4);

        cursor = cursor
            .checked_add(PROPERTY_HEADER_SIZE + value)
            .filter(|&end| end <= bytes.len())
            .ok_or(BootError::DeviceTreeTruncated)?;
    }

    for _ in 0..children {
        cursor += measure(bytes, cursor, depth_left - 1)?;
    }

    Ok(cursor - offset)
}
