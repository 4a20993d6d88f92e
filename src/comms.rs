//! Controller-side link: paced status transmission, frame reception.
//!
//! The main loop calls [Comms::poll_tx] with the freshly serialized
//! status payload and [Comms::poll_rx] with the payload decoder; the
//! UART and DMA interrupt handlers call [Comms::rx_event],
//! [Comms::tx_complete] and [Comms::tx_error]. A dropped frame only
//! means this cycle's status is not refreshed — the consumer keeps the
//! last known value.

use crate::protocol::crc::Crc32Engine;
use crate::protocol::detector::FrameDetector;
use crate::protocol::framing::{decode_frame, FrameError};
use crate::protocol::stream::{put_all, CrcSink, EscapeSink};
use crate::protocol::txbuf::DmaTxBuffer;
use crate::transport::{RxEvent, RxTransport, TxPort};

/// Minimum quiet time between outgoing status frames.
pub const DEFAULT_TX_INTERVAL_MS: u64 = 30;

/// Monotonic milliseconds, provided by the platform.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

impl<K> Clock for &K
where
    K: Clock,
{
    fn now_ms(&self) -> u64 {
        (*self).now_ms()
    }
}

/// Receive-side decode outcome counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkStats {
    pub framing_errors: u32,
    pub checksum_errors: u32,
    pub payload_errors: u32,
}

impl LinkStats {
    pub(crate) fn record(&mut self, error: FrameError) {
        match error {
            FrameError::Framing => self.framing_errors += 1,
            FrameError::Checksum => self.checksum_errors += 1,
            FrameError::Payload => self.payload_errors += 1,
        }
    }
}

/// One controller end of the link.
///
/// Owns the CRC engine, the transmit double buffer, the frame detector,
/// and the pacing clock. The payload encoder and decoder stay outside:
/// this layer moves opaque bytes.
pub struct Comms<C, T, R, K, const TXN: usize, const RXN: usize> {
    crc: C,
    tx: DmaTxBuffer<T, TXN>,
    detector: FrameDetector<R, RXN>,
    clock: K,
    interval_ms: u64,
    // must start invalid: starting at 0 would suppress the boot-time
    // frame whenever the clock also starts at 0
    last_tx: Option<u64>,
    last_rx: Option<u64>,
    stats: LinkStats,
}

impl<C, T, R, K, const TXN: usize, const RXN: usize> Comms<C, T, R, K, TXN, RXN>
where
    C: Crc32Engine,
    T: TxPort,
    R: RxTransport,
    K: Clock,
{
    pub fn new(crc: C, tx_port: T, rx: R, clock: K) -> Self {
        Self {
            crc,
            tx: DmaTxBuffer::new(tx_port),
            detector: FrameDetector::new(rx),
            clock,
            interval_ms: DEFAULT_TX_INTERVAL_MS,
            last_tx: None,
            last_rx: None,
            stats: LinkStats::default(),
        }
    }

    /// Override the minimum quiet time between frames.
    pub fn set_tx_interval_ms(&mut self, interval_ms: u64) {
        self.interval_ms = interval_ms;
    }

    /// Start listening.
    pub fn begin(&mut self) {
        self.detector.begin();
    }

    fn is_time_to_transmit(&self) -> bool {
        match self.last_tx {
            None => true,
            Some(at) => self.clock.now_ms() - at > self.interval_ms,
        }
    }

    /// A previous frame is still draining out the port.
    pub fn is_transmitting(&self) -> bool {
        self.tx.is_transmitting()
    }

    /// Ship the already-serialized status payload, provided the port is
    /// idle and the pacing interval has elapsed.
    ///
    /// Returns true if a frame was queued.
    pub fn poll_tx(&mut self, payload: &[u8]) -> bool {
        if self.is_transmitting() || !self.is_time_to_transmit() {
            return false;
        }
        let mut sink = CrcSink::new(&mut self.crc, EscapeSink::new(&mut self.tx));
        match put_all(&mut sink, payload) {
            Ok(()) => {}
            Err(e) => match e {},
        }
        self.last_tx = Some(self.clock.now_ms());
        true
    }

    /// Decode the next received frame, if one is waiting.
    ///
    /// `parse` is the external payload decoder. Failures are counted in
    /// [Comms::stats] and yield [None]; the caller keeps its last value.
    pub fn poll_rx<V, P>(&mut self, parse: P) -> Option<V>
    where
        P: FnOnce(&[u8]) -> Option<V>,
    {
        let Self {
            crc,
            detector,
            clock,
            last_rx,
            stats,
            ..
        } = self;
        let frame = detector.take_frame()?;
        match decode_frame(crc, frame, parse) {
            Ok(value) => {
                *last_rx = Some(clock.now_ms());
                Some(value)
            }
            Err(e) => {
                stats.record(e);
                None
            }
        }
    }

    /// Entry point for the UART character-match / receive interrupts.
    pub fn rx_event(&mut self, event: RxEvent) {
        self.detector.handle(event);
    }

    /// Entry point for the DMA transmit-complete interrupt.
    pub fn tx_complete(&mut self) {
        self.tx.on_tx_complete();
    }

    /// Entry point for the DMA transmit-error interrupt.
    pub fn tx_error(&mut self) {
        self.tx.on_tx_error();
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// When the last good frame arrived, if any.
    pub fn last_rx_ms(&self) -> Option<u64> {
        self.last_rx
    }

    pub fn detector(&self) -> &FrameDetector<R, RXN> {
        &self.detector
    }

    pub fn detector_mut(&mut self) -> &mut FrameDetector<R, RXN> {
        &mut self.detector
    }

    pub fn tx_buffer(&self) -> &DmaTxBuffer<T, TXN> {
        &self.tx
    }

    pub fn tx_buffer_mut(&mut self) -> &mut DmaTxBuffer<T, TXN> {
        &mut self.tx
    }
}
