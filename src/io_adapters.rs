use std::io::{self, Result as IoResult, Write};

fn broken_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "stream is closed")
}

/// Output adapter for in-process commands.
///
/// Once a write to the wrapped writer fails (typically because the next pipeline stage
/// stopped reading), the writer is never touched again and every further write fails
/// with [`io::ErrorKind::BrokenPipe`]. A command copying its input therefore stops at
/// the next write instead of consuming its input forever.
pub struct OutputGuard<W: Write> {
    inner: W,
    broken: bool,
}

impl<W: Write> OutputGuard<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            broken: false,
        }
    }

    /// Whether a write to the wrapped writer has failed.
    pub fn is_broken(&self) -> bool {
        self.broken
    }
}

impl<W: Write> Write for OutputGuard<W> {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        if self.broken {
            return Err(broken_pipe());
        }
        match self.inner.write_all(data) {
            Ok(()) => Ok(data.len()),
            Err(e) => {
                self.broken = true;
                Err(e)
            }
        }
    }

    fn flush(&mut self) -> IoResult<()> {
        if self.broken {
            return Ok(());
        }
        self.inner.flush().inspect_err(|_| self.broken = true)
    }
}

/// Input sink of a command that could not be launched: every write fails.
pub struct RejectingWriter;

impl Write for RejectingWriter {
    fn write(&mut self, _data: &[u8]) -> IoResult<usize> {
        Err(broken_pipe())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}
