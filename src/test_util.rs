//! Test doubles shared by the unit tests.

use core::convert::Infallible;

/// An in-memory port: reads from a preloaded buffer, records writes.
#[derive(Default)]
pub(crate) struct LoopPort {
    pub(crate) incoming: Vec<u8>,
    pub(crate) cursor: usize,
    pub(crate) written: Vec<u8>,
}

impl LoopPort {
    pub(crate) fn preloaded(data: &[u8]) -> Self {
        Self {
            incoming: data.to_vec(),
            cursor: 0,
            written: Vec::new(),
        }
    }
}

impl embedded_io::ErrorType for LoopPort {
    type Error = Infallible;
}

impl embedded_io::Read for LoopPort {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Infallible> {
        let rest = &self.incoming[self.cursor..];
        let amt = rest.len().min(buf.len());
        buf[..amt].copy_from_slice(&rest[..amt]);
        self.cursor += amt;
        Ok(amt)
    }
}

impl embedded_io::Write for LoopPort {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Infallible> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}
