//! Console Logger
//!
//! Backend for the `log` facade. Records are formatted onto any
//! `core::fmt::Write` sink (usually the board UART) with `\n` expanded to
//! `\r\n` for serial terminals.
//!
//! The sink sits behind a spin lock that is only ever *tried*: a record
//! logged from an interrupt handler while a task holds the console is
//! dropped instead of spinning forever on the single core.

use core::fmt::{self, Write};

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::Mutex;

use crate::config::DEFAULT_LOG_LEVEL;

/// Writer that expands `\n` into `\r\n`.
pub struct Console<W: Write> {
    sink: W,
}

impl<W: Write> Console<W> {
    /// Wrap a raw sink.
    pub const fn new(sink: W) -> Self {
        Self { sink }
    }

    /// The wrapped sink.
    pub fn sink(&self) -> &W {
        &self.sink
    }
}

impl<W: Write> Write for Console<W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let mut lines = s.split('\n');
        if let Some(first) = lines.next() {
            self.sink.write_str(first)?;
        }
        for line in lines {
            self.sink.write_str("\r\n")?;
            self.sink.write_str(line)?;
        }
        Ok(())
    }
}

/// `log` backend writing to a [`Console`].
pub struct KernelLogger<W: Write + Send> {
    console: Mutex<Console<W>>,
    level: LevelFilter,
}

impl<W: Write + Send> KernelLogger<W> {
    /// Logger at [`DEFAULT_LOG_LEVEL`].
    pub const fn new(sink: W) -> Self {
        Self::with_level(sink, DEFAULT_LOG_LEVEL)
    }

    /// Logger that drops records above `level`.
    pub const fn with_level(sink: W, level: LevelFilter) -> Self {
        Self {
            console: Mutex::new(Console::new(sink)),
            level,
        }
    }

    /// Run `f` on the console, if it is free.
    pub fn with_console<R>(&self, f: impl FnOnce(&mut Console<W>) -> R) -> Option<R> {
        self.console.try_lock().map(|mut console| f(&mut console))
    }
}

impl<W: Write + Send> Log for KernelLogger<W> {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.with_console(|console| {
            let _ = writeln!(console, "{:<5} {}", record.level(), record.args());
        });
    }

    fn flush(&self) {}
}

/// Install `logger` as the global `log` backend.
pub fn init<W: Write + Send>(logger: &'static KernelLogger<W>) -> Result<(), SetLoggerError> {
    log::set_logger(logger)?;
    log::set_max_level(logger.level);
    Ok(())
}
