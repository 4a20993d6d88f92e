//! Composable byte sinks for the transmit path.
//!
//! A frame is shipped by pushing payload bytes through a chain of sinks:
//! [CrcSink] folds a running checksum and appends the trailer,
//! [EscapeSink] stuffs reserved bytes and brackets the frame in markers,
//! and the innermost sink owns the transmit buffer. The chain is fixed
//! at construction; each stage wraps the next by value.

use super::crc::{Crc32Engine, CRC32_INIT};
use super::framing::should_escape;
use super::{ESCAPE_XOR, FRAME_ESC, FRAME_MARK};

/// A byte consumer with an explicit end-of-frame signal.
pub trait ByteSink {
    type Error;

    /// Consume one byte.
    fn put(&mut self, byte: u8) -> Result<(), Self::Error>;

    /// The frame is finished: emit any trailer and flush downstream.
    fn end(&mut self) -> Result<(), Self::Error>;
}

impl<S> ByteSink for &mut S
where
    S: ByteSink,
{
    type Error = S::Error;

    fn put(&mut self, byte: u8) -> Result<(), Self::Error> {
        (*self).put(byte)
    }

    fn end(&mut self) -> Result<(), Self::Error> {
        (*self).end()
    }
}

/// Drive a whole payload, then end-of-frame, through a sink.
pub fn put_all<S>(sink: &mut S, payload: &[u8]) -> Result<(), S::Error>
where
    S: ByteSink,
{
    for &b in payload {
        sink.put(b)?;
    }
    sink.end()
}

/// Folds every byte into a running CRC and forwards it unchanged; at end
/// of frame, emits the register MSB first and re-seeds it.
pub struct CrcSink<C, S> {
    engine: C,
    crc: u32,
    inner: S,
}

impl<C, S> CrcSink<C, S>
where
    C: Crc32Engine,
    S: ByteSink,
{
    pub fn new(engine: C, inner: S) -> Self {
        Self {
            engine,
            crc: CRC32_INIT,
            inner,
        }
    }

    /// Release the inner sink.
    pub fn done(self) -> S {
        self.inner
    }
}

impl<C, S> ByteSink for CrcSink<C, S>
where
    C: Crc32Engine,
    S: ByteSink,
{
    type Error = S::Error;

    fn put(&mut self, byte: u8) -> Result<(), Self::Error> {
        self.crc = self.engine.accumulate(self.crc, byte);
        self.inner.put(byte)
    }

    fn end(&mut self) -> Result<(), Self::Error> {
        for b in self.crc.to_be_bytes() {
            self.inner.put(b)?;
        }
        // re-seed even though nothing was put; the next frame starts fresh
        self.crc = CRC32_INIT;
        self.inner.end()
    }
}

/// Stuffs reserved bytes and brackets each frame in markers.
pub struct EscapeSink<S> {
    armed: bool,
    inner: S,
}

impl<S> EscapeSink<S>
where
    S: ByteSink,
{
    pub fn new(inner: S) -> Self {
        Self { armed: true, inner }
    }

    /// Release the inner sink.
    pub fn done(self) -> S {
        self.inner
    }

    fn open(&mut self) -> Result<(), S::Error> {
        if self.armed {
            self.armed = false;
            self.inner.put(FRAME_MARK)?;
        }
        Ok(())
    }
}

impl<S> ByteSink for EscapeSink<S>
where
    S: ByteSink,
{
    type Error = S::Error;

    fn put(&mut self, byte: u8) -> Result<(), Self::Error> {
        self.open()?;
        if should_escape(byte) {
            self.inner.put(FRAME_ESC)?;
            self.inner.put(byte ^ ESCAPE_XOR)
        } else {
            self.inner.put(byte)
        }
    }

    fn end(&mut self) -> Result<(), Self::Error> {
        self.open()?;
        self.inner.put(FRAME_MARK)?;
        self.armed = true;
        self.inner.end()
    }
}
