// Command-line argument parsing for the bootxnu command
//
// Features:
// - Hexadecimal addresses with or without a 0x prefix
// - Surrounding whitespace ignored
// - Anything unparsable is a usage error, never address 0

use crate::error::{BootError, Result};

/// Usage line printed on bad arguments
pub const USAGE: &str = "Usage: bootxnu kernel_addr fdt_addr";

/// Parse a base-16 physical address
pub fn parse_hex_addr(arg: &str) -> Option<u64> {
    let arg = arg.trim();
    let digits = arg
        .strip_prefix("0x")
        .or_else(|| arg.strip_prefix("0X"))
        .unwrap_or(arg);
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

/// Arguments of `bootxnu kernel_addr fdt_addr`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootxnuArgs {
    /// Physical address of the Mach-O kernel image
    pub kernel_addr: u64,
    /// Physical address of the Apple device tree
    pub fdt_addr: u64,
}

impl BootxnuArgs {
    /// Parse `argv`, where `argv[0]` is the command name
    pub fn parse(argv: &[&str]) -> Result<Self> {
        if argv.len() < 3 {
            return Err(BootError::Usage(USAGE));
        }

        let kernel_addr = parse_hex_addr(argv[1]).ok_or(BootError::Usage(USAGE))?;
        let fdt_addr = parse_hex_addr(argv[2]).ok_or(BootError::Usage(USAGE))?;

        Ok(Self {
            kernel_addr,
            fdt_addr,
        })
    }
}
