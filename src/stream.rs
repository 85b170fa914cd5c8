/*!
Adapters between byte streams and the CSV engines.

A [`Source`] produces one byte at a time for a reader, and a [`Sink`]
consumes one byte at a time from a writer. [`IoSource`] and [`IoSink`] are
the buffered implementations over `std::io`; anything else (sockets with
custom retry rules, in-memory queues, ...) can implement the traits
directly and be passed to
[`ReaderBuilder::from_source`](crate::ReaderBuilder::from_source) or
[`WriterBuilder::from_sink`](crate::WriterBuilder::from_sink).
*/

use std::io::{self, BufWriter, Read, Write};

use log::trace;

/// The default capacity of the buffers used by `IoSource` and `IoSink`.
pub(crate) const DEFAULT_BUFFER_CAPACITY: usize = 8 * (1 << 10);

/// What a [`Source`] produced when asked for the next byte.
#[derive(Debug)]
pub enum Signal {
    /// The next byte of input.
    Char(u8),
    /// The end of the input.
    Eof,
    /// The input could not be read.
    Error(io::Error),
}

/// A byte-at-a-time input for a [`Reader`](crate::Reader).
pub trait Source {
    /// Return the next byte of input.
    ///
    /// Once this returns `Signal::Eof` it is not called again until the
    /// reader is reused, so implementations need not be fused. A reader
    /// that receives a NUL byte stops with an `InvalidData` error.
    fn next_char(&mut self) -> Signal;

    /// Release the underlying stream.
    ///
    /// This may be called more than once. The default does nothing.
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a, S: Source + ?Sized> Source for &'a mut S {
    fn next_char(&mut self) -> Signal {
        (**self).next_char()
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// A byte-at-a-time output for a [`Writer`](crate::Writer).
pub trait Sink {
    /// Write a single byte.
    fn write_char(&mut self, c: u8) -> io::Result<()>;

    /// Flush any buffered bytes to the underlying stream. The default does
    /// nothing.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Flush and release the underlying stream.
    ///
    /// This may be called more than once. The default flushes.
    fn close(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl<'a, S: Sink + ?Sized> Sink for &'a mut S {
    fn write_char(&mut self, c: u8) -> io::Result<()> {
        (**self).write_char(c)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

impl Sink for Vec<u8> {
    fn write_char(&mut self, c: u8) -> io::Result<()> {
        self.push(c);
        Ok(())
    }
}

/// A buffered [`Source`] over any `io::Read`.
///
/// Interrupted reads are retried. Closing the source drops the reader, which
/// closes files and sockets.
#[derive(Debug)]
pub struct IoSource<R> {
    rdr: Option<R>,
    buf: Vec<u8>,
    pos: usize,
    len: usize,
}

impl<R: io::Read> IoSource<R> {
    /// Create a source with a buffer of the default capacity.
    pub fn new(rdr: R) -> IoSource<R> {
        IoSource::with_capacity(DEFAULT_BUFFER_CAPACITY, rdr)
    }

    /// Create a source with a buffer of the given capacity.
    ///
    /// A capacity of zero is treated as one.
    pub fn with_capacity(capacity: usize, rdr: R) -> IoSource<R> {
        IoSource { rdr: Some(rdr), buf: vec![0; capacity.max(1)], pos: 0, len: 0 }
    }

    /// Return a reference to the underlying reader, unless it was closed.
    pub fn get_ref(&self) -> Option<&R> {
        self.rdr.as_ref()
    }

    /// Unwrap the underlying reader, unless it was closed.
    ///
    /// Any bytes that were buffered but not yet consumed are lost.
    pub fn into_inner(self) -> Option<R> {
        self.rdr
    }

    fn fill(&mut self) -> Option<io::Result<()>> {
        let rdr = self.rdr.as_mut()?;
        loop {
            match rdr.read(&mut self.buf) {
                Ok(n) => {
                    trace!("filled source buffer with {} bytes", n);
                    self.pos = 0;
                    self.len = n;
                    return Some(Ok(()));
                }
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

impl<R: io::Read> Source for IoSource<R> {
    fn next_char(&mut self) -> Signal {
        if self.pos >= self.len {
            match self.fill() {
                None => return Signal::Eof,
                Some(Err(err)) => return Signal::Error(err),
                Some(Ok(())) if self.len == 0 => return Signal::Eof,
                Some(Ok(())) => {}
            }
        }
        let c = self.buf[self.pos];
        self.pos += 1;
        Signal::Char(c)
    }

    fn close(&mut self) -> io::Result<()> {
        self.rdr = None;
        self.pos = 0;
        self.len = 0;
        Ok(())
    }
}

/// A buffered [`Sink`] over any `io::Write`.
///
/// Closing the sink flushes and drops the writer, which closes files and
/// sockets.
#[derive(Debug)]
pub struct IoSink<W: io::Write> {
    wtr: Option<BufWriter<W>>,
}

impl<W: io::Write> IoSink<W> {
    /// Create a sink with a buffer of the default capacity.
    pub fn new(wtr: W) -> IoSink<W> {
        IoSink::with_capacity(DEFAULT_BUFFER_CAPACITY, wtr)
    }

    /// Create a sink with a buffer of the given capacity.
    pub fn with_capacity(capacity: usize, wtr: W) -> IoSink<W> {
        IoSink { wtr: Some(BufWriter::with_capacity(capacity, wtr)) }
    }

    /// Return a reference to the underlying writer, unless it was closed.
    pub fn get_ref(&self) -> Option<&W> {
        self.wtr.as_ref().map(|wtr| wtr.get_ref())
    }

    /// Flush the buffer and unwrap the underlying writer.
    ///
    /// If flushing fails, or the sink was closed, the error is returned
    /// along with this sink.
    pub fn into_inner(self) -> Result<W, (io::Error, IoSink<W>)> {
        match self.wtr {
            Some(wtr) => wtr.into_inner().map_err(|err| {
                let (err, wtr) = err.into_parts();
                (err, IoSink { wtr: Some(wtr) })
            }),
            None => Err((closed_sink(), IoSink { wtr: None })),
        }
    }
}

impl<W: io::Write> Sink for IoSink<W> {
    fn write_char(&mut self, c: u8) -> io::Result<()> {
        match self.wtr {
            Some(ref mut wtr) => wtr.write_all(&[c]),
            None => Err(closed_sink()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.wtr {
            Some(ref mut wtr) => wtr.flush(),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        match self.wtr.take() {
            Some(wtr) => wtr.into_inner().map(drop).map_err(|err| err.into_error()),
            None => Ok(()),
        }
    }
}

fn closed_sink() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "sink is closed")
}
