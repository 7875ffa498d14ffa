//! Utility Library - logging, memory helpers, argument parsing, collaborator traits

pub mod boot_traits;
pub mod cmdline;
pub mod logger;
pub mod mem_util;
