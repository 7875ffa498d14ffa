//! Logging support.
//!
//! Implements the `log` facade over whatever console the firmware provides.
//! Records are serialized with a spin lock so a record is always printed in
//! one piece.

use core::fmt::{self, Write};

use log::{LevelFilter, Metadata, Record};
use spin::{Mutex, Once};

/// Byte sink the logger prints to
pub trait Console: Sync {
    fn write_str(&self, s: &str);
}

struct ConsoleWriter<'a>(&'a dyn Console);

impl fmt::Write for ConsoleWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_str(s);
        Ok(())
    }
}

static CONSOLE: Once<&'static dyn Console> = Once::new();
static RECORD_LOCK: Mutex<()> = Mutex::new(());
static LOGGER: Logger = Logger;

struct Logger;

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let Some(console) = CONSOLE.get() else {
            return;
        };

        let _lock = RECORD_LOCK.lock();
        write_record(*console, record);
    }

    fn flush(&self) {}
}

/// Print one record as a single `[LEVEL] message` line
fn write_record(console: &dyn Console, record: &Record) {
    let mut writer = ConsoleWriter(console);
    let _ = writeln!(writer, "[{:<5}] {}", record.level(), record.args());
}

/// Level used unless `verbose_logging` is enabled
pub fn default_level() -> LevelFilter {
    if cfg!(feature = "verbose_logging") {
        LevelFilter::Trace
    } else {
        LevelFilter::Info
    }
}

/// Install the logger printing to `console`.
///
/// The first console wins; later calls only reset the level.
pub fn init(console: &'static dyn Console) {
    CONSOLE.call_once(|| console);
    log::set_max_level(default_level());
    // Already installed by an earlier command run.
    let _ = log::set_logger(&LOGGER);
}
