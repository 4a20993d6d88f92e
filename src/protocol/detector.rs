//! Frame boundary detection.
//!
//! The UART gives no framing help, so the receive side watches marker
//! events from the transport and decides which stretches of bytes are
//! complete frames. After noise, loss, or an overrun it falls back to
//! [DetectorState::Lost] and resynchronizes on the next marker.

use crate::transport::{RxError, RxEvent, RxTransport, SoftRxBuffer};

/// Where the detector believes it is relative to frame boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DetectorState {
    /// Byte boundaries cannot be trusted until a marker is seen.
    Lost,
    /// A frame just closed; the next marker opens a new one.
    WaitingForStart,
    /// Between markers, accumulating a frame.
    ReceivingFrame,
}

/// The receive-side state machine.
///
/// Event handlers are called from wherever the transport delivers its
/// interrupts; each call is one atomic step (see [crate::sync::Shared]
/// when the caller is an ISR). A completed frame is copied out of the
/// transport window and handed to the application exactly once via
/// [FrameDetector::take_frame].
pub struct FrameDetector<R, const N: usize> {
    rx: R,
    state: DetectorState,
    error_counter: u32,
    frame_available: bool,
    frame: [u8; N],
    frame_len: usize,
}

impl<R, const N: usize> FrameDetector<R, N>
where
    R: RxTransport,
{
    pub fn new(rx: R) -> Self {
        Self {
            rx,
            state: DetectorState::Lost,
            error_counter: 0,
            frame_available: false,
            frame: [0; N],
            frame_len: 0,
        }
    }

    /// Start (or reset) reception. The detector assumes nothing about
    /// the wire and waits for a marker.
    pub fn begin(&mut self) {
        self.state = DetectorState::Lost;
        self.frame_available = false;
        self.rx.begin();
    }

    /// Dispatch one transport event.
    pub fn handle(&mut self, event: RxEvent) {
        match event {
            RxEvent::CharacterMatch => self.on_character_match(),
            RxEvent::Complete => self.on_rx_complete(),
            RxEvent::Error(e) => self.on_rx_error(e),
        }
    }

    /// A marker byte arrived.
    pub fn on_character_match(&mut self) {
        let received = self.rx.received_len();
        match self.state {
            DetectorState::Lost => {
                if received > 1 {
                    // bytes came before this marker: the tail of a frame
                    // whose start we never saw
                    self.state = DetectorState::WaitingForStart;
                } else if received == 1 {
                    // we got lost during interframe silence, so this
                    // marker opens a frame
                    self.state = DetectorState::ReceivingFrame;
                } else {
                    // a match with an empty window: the transport under
                    // us is not storing bytes
                    self.error_counter += 1;
                }
            }
            DetectorState::WaitingForStart => {
                if received == 1 {
                    self.state = DetectorState::ReceivingFrame;
                } else {
                    // junk where only silence belongs
                    self.error_counter += 1;
                    self.state = DetectorState::Lost;
                }
            }
            DetectorState::ReceivingFrame => {
                if received > 1 {
                    self.extract_frame();
                    self.state = DetectorState::WaitingForStart;
                }
                // a bare repeated marker is noise between frames; stay
            }
        }
        self.rx.restart();
    }

    /// The receive window filled without a marker in it: nobody is
    /// framing this stream.
    pub fn on_rx_complete(&mut self) {
        self.error_counter += 1;
        self.state = DetectorState::Lost;
        self.rx.restart();
    }

    /// The transport reported a hardware fault.
    pub fn on_rx_error(&mut self, _error: RxError) {
        match self.state {
            // already pessimistic
            DetectorState::Lost => {}
            DetectorState::WaitingForStart | DetectorState::ReceivingFrame => {
                self.state = DetectorState::Lost;
            }
        }
        self.error_counter += 1;
        self.rx.restart();
    }

    fn extract_frame(&mut self) {
        // strip the closing marker; the opening one never reached the
        // window because reception restarts on every marker
        let len = self.rx.received_len() - 1;
        if len > N {
            // a frame our own buffer cannot hold; drop it
            self.error_counter += 1;
            return;
        }
        self.frame[..len].copy_from_slice(&self.rx.data()[..len]);
        self.frame_len = len;
        self.frame_available = true;
    }

    /// A completed frame is waiting in [FrameDetector::take_frame].
    pub fn is_frame_available(&self) -> bool {
        self.frame_available
    }

    /// The completed frame, handed out once and then consumed. Mutable
    /// so the caller can unescape it in place.
    pub fn take_frame(&mut self) -> Option<&mut [u8]> {
        if self.frame_available {
            self.frame_available = false;
            Some(&mut self.frame[..self.frame_len])
        } else {
            None
        }
    }

    /// Anomalies seen since construction: desyncs, overruns, faults.
    pub fn error_count(&self) -> u32 {
        self.error_counter
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn transport(&self) -> &R {
        &self.rx
    }

    pub fn transport_mut(&mut self) -> &mut R {
        &mut self.rx
    }
}

impl<const N: usize> FrameDetector<SoftRxBuffer<N>, N> {
    /// Feed one raw byte through the software receive window.
    pub fn push_byte(&mut self, byte: u8) {
        if let Some(event) = self.rx.put(byte) {
            self.handle(event);
        }
    }
}

#[cfg(test)]
#[cfg(feature = "std")]
mod test {
    use super::super::crc::SoftCrc32;
    use super::super::framing::{decode_frame, encode_frame};
    use super::super::FRAME_MARK;
    use super::*;

    fn detector() -> FrameDetector<SoftRxBuffer<16>, 16> {
        let mut d = FrameDetector::new(SoftRxBuffer::new(FRAME_MARK));
        d.begin();
        d
    }

    #[test]
    fn starts_lost() {
        let d = detector();
        assert_eq!(d.state(), DetectorState::Lost);
        assert!(!d.is_frame_available());
    }

    #[test]
    fn markerless_stream_overruns_and_stays_lost() {
        let mut d = detector();
        for b in 0..32u8 {
            d.push_byte(b.wrapping_add(1));
        }
        assert_eq!(d.state(), DetectorState::Lost);
        assert_eq!(d.error_count(), 2);
        assert!(!d.is_frame_available());
    }

    #[test]
    fn lucky_marker_in_silence_opens_a_frame() {
        let mut d = detector();
        d.push_byte(FRAME_MARK);
        assert_eq!(d.state(), DetectorState::ReceivingFrame);
    }

    #[test]
    fn delimited_bytes_become_exactly_one_frame() {
        let mut d = detector();
        d.push_byte(FRAME_MARK);
        for b in [0x01, 0x02, 0x03] {
            d.push_byte(b);
        }
        d.push_byte(FRAME_MARK);
        assert_eq!(d.state(), DetectorState::WaitingForStart);
        assert!(d.is_frame_available());
        assert_eq!(d.take_frame().unwrap(), &[0x01, 0x02, 0x03]);
        // handed out exactly once
        assert!(d.take_frame().is_none());
        assert_eq!(d.error_count(), 0);
    }

    #[test]
    fn repeated_marker_is_not_a_frame() {
        let mut d = detector();
        d.push_byte(FRAME_MARK);
        assert_eq!(d.state(), DetectorState::ReceivingFrame);
        d.push_byte(FRAME_MARK);
        assert_eq!(d.state(), DetectorState::ReceivingFrame);
        assert!(!d.is_frame_available());
    }

    #[test]
    fn tail_of_unseen_frame_waits_for_start() {
        let mut d = detector();
        d.push_byte(0x55);
        d.push_byte(0x56);
        d.push_byte(FRAME_MARK);
        assert_eq!(d.state(), DetectorState::WaitingForStart);
        assert!(!d.is_frame_available());
    }

    #[test]
    fn junk_while_waiting_for_start_goes_lost() {
        let mut d = detector();
        d.push_byte(0x55);
        d.push_byte(FRAME_MARK);
        assert_eq!(d.state(), DetectorState::WaitingForStart);
        d.push_byte(0x99);
        d.push_byte(FRAME_MARK);
        assert_eq!(d.state(), DetectorState::Lost);
        assert_eq!(d.error_count(), 1);
    }

    #[test]
    fn rx_error_mid_frame_goes_lost() {
        let mut d = detector();
        d.push_byte(FRAME_MARK);
        d.push_byte(0x01);
        d.on_rx_error(RxError::Overrun);
        assert_eq!(d.state(), DetectorState::Lost);
        assert_eq!(d.error_count(), 1);
        assert!(!d.is_frame_available());
    }

    #[test]
    fn rx_error_while_lost_stays_lost() {
        let mut d = detector();
        d.on_rx_error(RxError::Timeout);
        assert_eq!(d.state(), DetectorState::Lost);
        assert_eq!(d.error_count(), 1);
    }

    #[test]
    fn rx_error_while_waiting_goes_lost() {
        let mut d = detector();
        d.push_byte(0x55);
        d.push_byte(FRAME_MARK);
        d.on_rx_error(RxError::Framing);
        assert_eq!(d.state(), DetectorState::Lost);
        assert_eq!(d.error_count(), 1);
    }

    #[test]
    fn resynchronizes_after_noise() {
        let mut d = detector();
        // noise, then a clean frame
        for b in [0x13, 0x37, FRAME_MARK] {
            d.push_byte(b);
        }
        assert_eq!(d.state(), DetectorState::WaitingForStart);
        d.push_byte(FRAME_MARK);
        for b in [0xAA, 0xBB] {
            d.push_byte(b);
        }
        d.push_byte(FRAME_MARK);
        assert_eq!(d.take_frame().unwrap(), &[0xAA, 0xBB]);
    }

    #[test]
    fn back_to_back_frames_both_come_through() {
        let mut d = detector();
        d.push_byte(FRAME_MARK);
        for b in [0x01, 0x02] {
            d.push_byte(b);
        }
        // one marker: end of the first frame...
        d.push_byte(FRAME_MARK);
        assert_eq!(d.take_frame().unwrap(), &[0x01, 0x02]);
        // ...and the next one reopens
        d.push_byte(FRAME_MARK);
        assert_eq!(d.state(), DetectorState::ReceivingFrame);
        for b in [0x03, 0x04] {
            d.push_byte(b);
        }
        d.push_byte(FRAME_MARK);
        assert_eq!(d.take_frame().unwrap(), &[0x03, 0x04]);
    }

    #[test]
    fn detected_frame_decodes() {
        let mut crc = SoftCrc32::new();
        let mut wire = [0u8; 16];
        let len = encode_frame(&mut crc, &[0x2A, 0x0B], &mut wire).unwrap();

        let mut d = detector();
        // line noise first: the frame right after it is sacrificed to
        // resynchronization, the one after that comes through
        d.push_byte(0x07);
        for &b in &wire[..len] {
            d.push_byte(b);
        }
        assert!(d.take_frame().is_none());
        for &b in &wire[..len] {
            d.push_byte(b);
        }
        let frame = d.take_frame().unwrap();
        let decoded = decode_frame(&mut crc, frame, |p| Some(p.to_vec()));
        assert_eq!(decoded, Ok(vec![0x2A, 0x0B]));
    }
}
