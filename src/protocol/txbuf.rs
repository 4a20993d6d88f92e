//! Double-buffered transmit queue.
//!
//! Escaped bytes accumulate in one buffer while the other drains through
//! the asynchronous port; a full (or flushed) buffer is handed off and
//! the roles swap. This is what lets the next frame be framed while the
//! previous one is still physically on the wire.

use core::convert::Infallible;

use super::stream::ByteSink;
use crate::transport::TxPort;

/// How many polls of a busy port count as "stuck". Completion is
/// guaranteed by hardware in finite time; the deployment watchdog, not
/// this bound, is the last line of defense.
pub const DEFAULT_SPIN_LIMIT: u32 = 1_000_000;

/// A [ByteSink] feeding an asynchronous transmit channel through two
/// fixed buffers.
///
/// `put` never touches a buffer that is in flight; the completion
/// callbacks release it. Transmit faults are counted and never block
/// the next frame.
pub struct DmaTxBuffer<T, const N: usize> {
    port: T,
    bufs: [[u8; N]; 2],
    active: usize,
    len: usize,
    in_flight: Option<usize>,
    spin_limit: u32,
    errors: u32,
}

impl<T, const N: usize> DmaTxBuffer<T, N>
where
    T: TxPort,
{
    pub fn new(port: T) -> Self {
        Self {
            port,
            bufs: [[0; N]; 2],
            active: 0,
            len: 0,
            in_flight: None,
            spin_limit: DEFAULT_SPIN_LIMIT,
            errors: 0,
        }
    }

    /// Replace the busy-wait bound used before starting a transfer.
    pub fn set_spin_limit(&mut self, limit: u32) {
        self.spin_limit = limit;
    }

    /// The port is still draining a buffer.
    pub fn is_transmitting(&self) -> bool {
        self.port.is_busy()
    }

    /// Bytes accumulated in the active buffer.
    pub fn pending(&self) -> usize {
        self.len
    }

    /// Transmit faults and stuck-transfer timeouts seen so far.
    pub fn error_count(&self) -> u32 {
        self.errors
    }

    pub fn port(&self) -> &T {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut T {
        &mut self.port
    }

    /// The port finished draining; the handed-off buffer may be reused.
    /// Called from the transmit-complete interrupt.
    pub fn on_tx_complete(&mut self) {
        self.in_flight = None;
    }

    /// Line fault. The frame is gone; count it and move on.
    pub fn on_tx_error(&mut self) {
        self.in_flight = None;
        self.errors += 1;
    }

    fn flush(&mut self) {
        if self.len == 0 {
            return;
        }
        // bounded spin for the previous transfer to leave the channel
        let mut spins = 0u32;
        while self.port.is_busy() {
            spins += 1;
            if spins >= self.spin_limit {
                self.port.stop();
                self.in_flight = None;
                self.errors += 1;
                break;
            }
        }
        debug_assert_ne!(self.in_flight, Some(self.active));
        if self.port.try_start(&self.bufs[self.active][..self.len]) {
            self.in_flight = Some(self.active);
        } else {
            self.errors += 1;
        }
        self.active ^= 1;
        self.len = 0;
    }
}

impl<T, const N: usize> ByteSink for DmaTxBuffer<T, N>
where
    T: TxPort,
{
    type Error = Infallible;

    fn put(&mut self, byte: u8) -> Result<(), Infallible> {
        debug_assert_ne!(self.in_flight, Some(self.active));
        self.bufs[self.active][self.len] = byte;
        self.len += 1;
        if self.len >= N {
            self.flush();
        }
        Ok(())
    }

    fn end(&mut self) -> Result<(), Infallible> {
        self.flush();
        Ok(())
    }
}
