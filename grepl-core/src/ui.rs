//! Line-oriented output sinks for the REPL.
//!
//! The REPL writes command results to a standard sink and diagnostics to an
//! error sink. Both are cloneable handles so that a concurrently running
//! receiver task (bidirectional streaming) can print responses while the main
//! task is blocked on user input.

use std::io::Write;
use std::sync::{Arc, Mutex};

type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

/// A pair of shared write sinks: standard output and error output.
#[derive(Clone)]
pub struct Ui {
    out: Sink,
    err: Sink,
}

impl Ui {
    /// Creates a `Ui` from arbitrary sinks.
    pub fn new(out: Box<dyn Write + Send>, err: Box<dyn Write + Send>) -> Self {
        Self {
            out: Arc::new(Mutex::new(out)),
            err: Arc::new(Mutex::new(err)),
        }
    }

    /// A `Ui` backed by the process stdout/stderr.
    pub fn stdio() -> Self {
        Self::new(Box::new(std::io::stdout()), Box::new(std::io::stderr()))
    }

    /// A `Ui` backed by in-memory buffers, returned alongside handles for
    /// inspecting what was written. Used by tests and scripted sessions.
    pub fn buffered() -> (Self, SharedBuffer, SharedBuffer) {
        let out = SharedBuffer::default();
        let err = SharedBuffer::default();
        let ui = Self::new(Box::new(out.clone()), Box::new(err.clone()));
        (ui, out, err)
    }

    /// Writes one line to the standard sink.
    pub fn write(&self, text: &str) {
        Self::emit(&self.out, text);
    }

    /// Writes one line to the error sink.
    pub fn ewrite(&self, text: &str) {
        Self::emit(&self.err, text);
    }

    fn emit(sink: &Sink, text: &str) {
        let Ok(mut w) = sink.lock() else { return };
        let _ = writeln!(w, "{text}");
        let _ = w.flush();
    }
}

/// A cloneable in-memory buffer implementing [`Write`].
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    /// Returns everything written so far, lossily decoded as UTF-8.
    pub fn contents(&self) -> String {
        let Ok(buf) = self.0.lock() else {
            return String::new();
        };
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        let Ok(mut buf) = self.0.lock() else {
            return Ok(data.len());
        };
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
