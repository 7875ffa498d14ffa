//! C ABI for firmware shells
//!
//! A shell registers `bootxnu` by calling [`machboot_bootxnu`] with its argv
//! and a table of host callbacks. Every callback is optional.

use core::ffi::{CStr, c_char, c_int};

use arrayvec::{ArrayString, ArrayVec};
use spin::Once;

use crate::arch::NativeCpu;
use crate::config::BootConfig;
use crate::utils::boot_traits::{BootServices, DisplayProvider, EnvStore, Framebuffer};
use crate::utils::cmdline::USAGE;
use crate::utils::logger::{self, Console};

use super::bootxnu::run_bootxnu;

/// Most arguments passed on to the command
pub const MAX_ARGS: usize = 8;

/// Longest environment variable name
const ENV_KEY_MAX: usize = 64;

/// Bytes per `puts` call, NUL included
const PUTS_CHUNK: usize = 128;

/// Framebuffer as the host reports it
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct FramebufferDesc {
    pub base: u64,
    pub xsize: u32,
    pub ysize: u32,
    /// log2 of bits per pixel
    pub bpix: u32,
}

/// Host callbacks
#[repr(C)]
#[derive(Clone, Copy)]
pub struct HostServices {
    /// Value of a NUL-terminated variable name, or null
    pub env_get: Option<unsafe extern "C" fn(key: *const c_char) -> *const c_char>,
    /// Fill `out` from the first display; 0 on success
    pub first_display: Option<unsafe extern "C" fn(out: *mut FramebufferDesc) -> c_int>,
    /// Print a NUL-terminated string without adding a newline
    pub puts: Option<unsafe extern "C" fn(s: *const c_char)>,
}

// Layouts shared with C hosts
static_assertions::const_assert_eq!(core::mem::size_of::<FramebufferDesc>(), 24);
static_assertions::assert_eq_size!(HostServices, [usize; 3]);

struct HostConsole {
    puts: unsafe extern "C" fn(*const c_char),
}

impl HostConsole {
    fn flush(&self, chunk: &mut ArrayString<PUTS_CHUNK>) {
        if chunk.is_empty() || chunk.try_push('\0').is_err() {
            return;
        }
        // SAFETY: `chunk` is NUL-terminated and outlives the call.
        unsafe { (self.puts)(chunk.as_ptr().cast()) };
        chunk.clear();
    }
}

impl Console for HostConsole {
    fn write_str(&self, s: &str) {
        let mut chunk = ArrayString::<PUTS_CHUNK>::new();
        for ch in s.chars().filter(|&ch| ch != '\0') {
            if chunk.remaining_capacity() < ch.len_utf8() + 1 {
                self.flush(&mut chunk);
            }
            let _ = chunk.try_push(ch);
        }
        self.flush(&mut chunk);
    }
}

static HOST_CONSOLE: Once<HostConsole> = Once::new();

struct HostEnv<'a> {
    host: Option<&'a HostServices>,
}

impl EnvStore for HostEnv<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        let env_get = self.host?.env_get?;

        let mut name = ArrayString::<ENV_KEY_MAX>::new();
        name.try_push_str(key).ok()?;
        name.try_push('\0').ok()?;

        // SAFETY: `name` is NUL-terminated; the host returns null or a
        // NUL-terminated string that stays valid while the command runs.
        unsafe {
            let value = env_get(name.as_ptr().cast());
            if value.is_null() {
                return None;
            }
            CStr::from_ptr(value).to_str().ok()
        }
    }
}

struct HostDisplay<'a> {
    host: Option<&'a HostServices>,
}

impl DisplayProvider for HostDisplay<'_> {
    fn first_display(&self) -> Option<Framebuffer> {
        let first_display = self.host?.first_display?;

        let mut desc = FramebufferDesc::default();
        // SAFETY: `desc` is a valid, writable descriptor.
        if unsafe { first_display(&mut desc) } != 0 {
            return None;
        }

        Some(Framebuffer {
            base: desc.base,
            xsize: desc.xsize,
            ysize: desc.ysize,
            bpix: u8::try_from(desc.bpix).ok()?,
        })
    }
}

/// `bootxnu` entry point for C callers. Returns the shell status.
///
/// # Safety
///
/// `argv` must hold `argc` NUL-terminated strings (or be null), `host` must
/// be null or point to a valid table, and the board memory contract of
/// [`do_bootxnu`](super::bootxnu::do_bootxnu) applies.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn machboot_bootxnu(
    argc: c_int,
    argv: *const *const c_char,
    host: *const HostServices,
) -> c_int {
    // SAFETY: null or valid per the caller's contract.
    let host = unsafe { host.as_ref() };

    if let Some(puts) = host.and_then(|host| host.puts) {
        logger::init(HOST_CONSOLE.call_once(|| HostConsole { puts }));
    }

    let mut args: ArrayVec<&str, MAX_ARGS> = ArrayVec::new();
    if !argv.is_null() {
        for index in 0..usize::try_from(argc).unwrap_or(0).min(MAX_ARGS) {
            // SAFETY: `index < argc`.
            let arg = unsafe { *argv.add(index) };
            if arg.is_null() {
                break;
            }
            // SAFETY: NUL-terminated per the caller's contract.
            match unsafe { CStr::from_ptr(arg) }.to_str() {
                Ok(arg) => args.push(arg),
                Err(_) => {
                    log::error!("{}", USAGE);
                    return 1;
                }
            }
        }
    }

    let env = HostEnv { host };
    let display = HostDisplay { host };
    let services = BootServices::new(&env, &display);
    let config = BootConfig::board();
    let mut cpu = NativeCpu;

    // SAFETY: forwarded to the caller.
    unsafe { run_bootxnu(&args, &config, &services, &mut cpu) }
}
