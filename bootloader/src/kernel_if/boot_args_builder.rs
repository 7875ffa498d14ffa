/// Boot Arguments Builder
///
/// Fills the boot arguments block from the load result, the board
/// configuration and what the firmware collaborators report.

use xnu_api::{BootArgs, PhysAddr, VideoInformation};

use crate::config::BootConfig;
use crate::error::{BootError, Result};
use crate::utils::boot_traits::Framebuffer;

use super::macho_loader::LoadInfo;

/// Environment variable holding the kernel command line
pub const BOOTARGS_ENV: &str = "bootargs";

/// Video record for `framebuffer`
pub fn video_information(framebuffer: &Framebuffer) -> VideoInformation {
    VideoInformation {
        base_addr: framebuffer.base,
        display: 1,
        bytes_per_row: framebuffer.bytes_per_row(),
        width: u64::from(framebuffer.xsize),
        height: u64::from(framebuffer.ysize),
        depth: framebuffer.depth(),
    }
}

/// Boot arguments builder
pub struct BootArgsBuilder {
    args: BootArgs,
}

impl BootArgsBuilder {
    /// Start from the fields fixed by the load and the board
    pub fn new(info: &LoadInfo, config: &BootConfig) -> Self {
        let mut args = BootArgs::new();
        args.virt_base = info.base;
        args.phys_base = config.load_addr;
        args.mem_size = config.mem_size;
        args.mem_size_actual = config.mem_size;
        args.machine_type = 0;
        args.set_flags(config.boot_flags);

        Self { args }
    }

    /// Set the command line, truncated to the block's capacity
    pub fn command_line(&mut self, cmdline: Option<&str>) -> &mut Self {
        let Some(cmdline) = cmdline else {
            log::debug!("No {} set", BOOTARGS_ENV);
            return self;
        };

        let copied = self.args.set_command_line(cmdline);
        if copied < cmdline.len() {
            log::warn!(
                "Command line truncated from {} to {} bytes",
                cmdline.len(),
                copied
            );
        }
        self
    }

    /// Describe the display, or leave the record zero without one
    pub fn video(&mut self, framebuffer: Option<Framebuffer>) -> &mut Self {
        self.args.video = match framebuffer {
            Some(framebuffer) => {
                log::debug!(
                    "Display {}x{} at {:#x}",
                    framebuffer.xsize,
                    framebuffer.ysize,
                    framebuffer.base
                );
                video_information(&framebuffer)
            }
            None => VideoInformation::NONE,
        };
        self
    }

    /// Record the appended device tree
    pub fn device_tree(&mut self, addr: u64, len: usize) -> Result<&mut Self> {
        self.args.afdt = PhysAddr::try_from(addr).map_err(|_| BootError::OutOfWindow)?;
        self.args.afdt_length = u32::try_from(len).map_err(|_| BootError::DeviceTreeTruncated)?;
        Ok(self)
    }

    /// Physical end of everything the loader placed
    pub fn phys_end(&mut self, phys_end: u64) -> &mut Self {
        self.args.phys_end = phys_end;
        self
    }

    pub fn build(&self) -> BootArgs {
        self.args
    }
}
