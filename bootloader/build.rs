//! machboot build script
//!
//! Generates the board constants (load address, memory window) from
//! `MACHBOOT_*` environment variables, falling back to the board defaults.

use std::env;
use std::fs;
use std::path::PathBuf;

const DEFAULT_SYS_LOAD_ADDR: u64 = 0x4200_0000;
const DEFAULT_SDRAM_BASE: u64 = 0x4000_0000;
const DEFAULT_SDRAM_SIZE: u64 = 0x4000_0000;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let sys_load_addr = board_value("MACHBOOT_SYS_LOAD_ADDR", DEFAULT_SYS_LOAD_ADDR);
    let sdram_base = board_value("MACHBOOT_SDRAM_BASE", DEFAULT_SDRAM_BASE);
    let sdram_size = board_value("MACHBOOT_SDRAM_SIZE", DEFAULT_SDRAM_SIZE);

    if sys_load_addr < sdram_base || sys_load_addr >= sdram_base + sdram_size {
        panic!(
            "MACHBOOT_SYS_LOAD_ADDR {:#x} lies outside SDRAM [{:#x}, {:#x})",
            sys_load_addr,
            sdram_base,
            sdram_base + sdram_size
        );
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    let board = format!(
        "/// Firmware scratch load address\n\
         pub const SYS_LOAD_ADDR: u64 = {sys_load_addr:#x};\n\
         /// First byte of SDRAM\n\
         pub const SDRAM_BASE: u64 = {sdram_base:#x};\n\
         /// SDRAM size in bytes\n\
         pub const SDRAM_SIZE: u64 = {sdram_size:#x};\n"
    );

    fs::write(out_dir.join("board.rs"), board).unwrap_or_else(|e| {
        panic!("Failed to write board constants: {}", e);
    });
}

fn board_value(name: &str, default: u64) -> u64 {
    println!("cargo:rerun-if-env-changed={}", name);

    match env::var(name) {
        Ok(value) => {
            let digits = value.trim().trim_start_matches("0x").trim_start_matches("0X");
            u64::from_str_radix(digits, 16)
                .unwrap_or_else(|e| panic!("{} is not a hex number ({:?}): {}", name, value, e))
        }
        Err(_) => default,
    }
}
