//! The companion-device end of the link, over a plain byte stream.
//!
//! The GUI side has no character-match hardware; it reads the port like
//! any other stream and runs every byte through the same frame detector
//! the controller uses, via a software receive window.

use crate::protocol::crc::{Crc32Engine, SoftCrc32};
use crate::protocol::detector::FrameDetector;
use crate::protocol::framing::{decode_frame, encode_frame};
use crate::protocol::{FRAME_MARK, MAX_FRAME_SIZE};
use crate::transport::SoftRxBuffer;
use crate::LinkStats;

/// Re-export to allow using [HostClient] with [std::io] streams.
#[cfg(feature = "std")]
pub use embedded_io_adapters::std::FromStd;

/// An error type for [HostClient].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HostError<E> {
    /// EOF in the underlying stream.
    UnexpectedEof,
    /// The payload does not fit a frame buffer.
    FrameTooLong,
    /// Other IO error in the underlying stream.
    Io(E),
}

#[cfg(feature = "std")]
impl<E> std::error::Error for HostError<E> where E: core::fmt::Debug {}

impl<E> core::fmt::Display for HostError<E>
where
    E: core::fmt::Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected eof"),
            Self::FrameTooLong => write!(f, "payload too long for a frame"),
            Self::Io(e) => write!(f, "io error: {:?}", e),
        }
    }
}

impl<E> From<E> for HostError<E> {
    fn from(other: E) -> Self {
        Self::Io(other)
    }
}

/// A host client for the controller link.
///
/// Generic over the port, the CRC engine, and the frame buffer size;
/// the defaults fit the standard status messages.
pub struct HostClient<F, C = SoftCrc32, const N: usize = MAX_FRAME_SIZE> {
    port: F,
    crc: C,
    detector: FrameDetector<SoftRxBuffer<N>, N>,
    stats: LinkStats,
}

impl<F> HostClient<F> {
    /// Create a host client with the software CRC engine.
    pub fn new(port: F) -> Self {
        Self::new_crc(SoftCrc32::new(), port)
    }
}

#[cfg(feature = "std")]
impl<F> HostClient<FromStd<F>> {
    /// Create a host client over an [std::io] stream.
    pub fn new_std(port: F) -> Self {
        Self::new(FromStd::new(port))
    }
}

impl<F, C, const N: usize> HostClient<F, C, N>
where
    C: Crc32Engine,
{
    /// Create a host client with the provided CRC engine.
    pub fn new_crc(crc: C, port: F) -> Self {
        let mut detector = FrameDetector::new(SoftRxBuffer::new(FRAME_MARK));
        detector.begin();
        Self {
            port,
            crc,
            detector,
            stats: LinkStats::default(),
        }
    }

    /// Release the port.
    pub fn free(self) -> F {
        self.port
    }

    pub fn port(&self) -> &F {
        &self.port
    }

    /// Get the underlying port, mutably.
    ///
    /// Reading from it yourself will lose frames.
    pub fn port_mut(&mut self) -> &mut F {
        &mut self.port
    }

    /// Decode outcome counters.
    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Desyncs and overruns seen by the frame detector.
    pub fn link_errors(&self) -> u32 {
        self.detector.error_count()
    }

    /// Read whatever the port has and run it through the frame
    /// detector. Blocks if the port blocks; returns the number of bytes
    /// consumed.
    pub fn poll(&mut self) -> Result<usize, HostError<F::Error>>
    where
        F: embedded_io::Read,
    {
        let mut chunk = [0u8; 64];
        let amt = self.port.read(&mut chunk)?;
        if amt == 0 {
            // end of file is an error
            return Err(HostError::UnexpectedEof);
        }
        for &b in &chunk[..amt] {
            self.detector.push_byte(b);
        }
        Ok(amt)
    }

    /// Decode the next received frame, if one is waiting.
    ///
    /// `parse` is the external payload decoder. Failures are counted in
    /// [HostClient::stats] and yield [None].
    pub fn receive<V, P>(&mut self, parse: P) -> Option<V>
    where
        P: FnOnce(&[u8]) -> Option<V>,
    {
        let Self {
            crc,
            detector,
            stats,
            ..
        } = self;
        let frame = detector.take_frame()?;
        match decode_frame(crc, frame, parse) {
            Ok(value) => Some(value),
            Err(e) => {
                stats.record(e);
                None
            }
        }
    }

    /// Frame one payload and write it out the port.
    pub fn send(&mut self, payload: &[u8]) -> Result<(), HostError<F::Error>>
    where
        F: embedded_io::Write,
    {
        let mut wire = [0u8; MAX_FRAME_SIZE];
        let len = encode_frame(&mut self.crc, payload, &mut wire)
            .ok_or(HostError::FrameTooLong)?;
        self.port.write_all(&wire[..len])?;
        self.port.flush()?;
        Ok(())
    }
}
