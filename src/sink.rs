use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use crossterm::style::Print;
use crossterm::QueueableCommand;

/// Where the printer's output goes.
#[derive(Clone, Default)]
pub enum Sink {
    #[default]
    Stdout,
    Stderr,
    /// An in-memory buffer, handy for capturing output.
    Memory(MemorySink),
    /// Any other writer. The printer locks it for the duration of each write.
    Writer(Arc<Mutex<dyn Write + Send>>),
}

impl Sink {
    pub fn writer(writer: impl Write + Send + 'static) -> Self {
        Sink::Writer(Arc::new(Mutex::new(writer)))
    }

    /// Writes `text` as is, flushing afterwards if asked to.
    pub(crate) fn write_str(&self, text: &str, flush: bool) -> io::Result<()> {
        match self {
            Sink::Stdout => emit(&mut io::stdout().lock(), text, flush),
            Sink::Stderr => emit(&mut io::stderr().lock(), text, flush),
            Sink::Memory(memory) => emit(&mut memory.clone(), text, flush),
            Sink::Writer(writer) => {
                let mut writer = writer.lock().unwrap_or_else(PoisonError::into_inner);
                emit(&mut *writer, text, flush)
            }
        }
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sink::Stdout => f.write_str("Stdout"),
            Sink::Stderr => f.write_str("Stderr"),
            Sink::Memory(memory) => f.debug_tuple("Memory").field(memory).finish(),
            Sink::Writer(_) => f.write_str("Writer(..)"),
        }
    }
}

fn emit<W: Write + ?Sized>(writer: &mut W, text: &str, flush: bool) -> io::Result<()> {
    writer.queue(Print(text))?;
    if flush {
        writer.flush()?;
    }
    Ok(())
}

/// A shared, growable byte buffer. Clones write to the same buffer.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes()).into_owned()
    }
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
