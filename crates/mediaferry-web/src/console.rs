//! Route `tracing` output to the browser console.
//!
//! Each formatted event is buffered and written as one console call
//! when the writer is dropped, so multi-part lines stay together.

use std::io;

use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;
use wasm_bindgen::JsValue;

/// Console method an event is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sink {
    Log,
    Warn,
    Error,
}

impl From<Level> for Sink {
    fn from(level: Level) -> Self {
        match level {
            Level::ERROR => Self::Error,
            Level::WARN => Self::Warn,
            _ => Self::Log,
        }
    }
}

/// Writer for one formatted event.
pub struct ConsoleWriter {
    sink: Sink,
    buffer: Vec<u8>,
}

impl io::Write for ConsoleWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ConsoleWriter {
    fn drop(&mut self) {
        let text = String::from_utf8_lossy(&self.buffer);
        let line = text.trim_end();
        if line.is_empty() {
            return;
        }
        let value = JsValue::from_str(line);
        match self.sink {
            Sink::Log => web_sys::console::log_1(&value),
            Sink::Warn => web_sys::console::warn_1(&value),
            Sink::Error => web_sys::console::error_1(&value),
        }
    }
}

/// [`MakeWriter`] that sends each event to the console method matching
/// its level.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleMakeWriter;

impl<'a> MakeWriter<'a> for ConsoleMakeWriter {
    type Writer = ConsoleWriter;

    fn make_writer(&'a self) -> Self::Writer {
        ConsoleWriter {
            sink: Sink::Log,
            buffer: Vec::new(),
        }
    }

    fn make_writer_for(&'a self, meta: &tracing::Metadata<'_>) -> Self::Writer {
        ConsoleWriter {
            sink: Sink::from(*meta.level()),
            buffer: Vec::new(),
        }
    }
}

/// Install a global subscriber that logs to the browser console.
///
/// Timestamps and ANSI colors are disabled. Returns `false` if a global
/// subscriber was already installed.
pub fn init_logging(max_level: Level) -> bool {
    tracing_subscriber::fmt()
        .with_writer(ConsoleMakeWriter)
        .with_max_level(max_level)
        .with_ansi(false)
        .without_time()
        .try_init()
        .is_ok()
}
