//! Session driver: idle search, ATN tracking and byte dispatch.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::decoder::{ByteOutcome, decode_byte};
use super::frame::{BusLine, BusPhase, Frame, FrameKind, Marker, Violation};
use super::idle::find_bus_start;
use super::lines::BusLines;
use super::timing::{IDLE_WINDOW_US, SampleClock};
use crate::sink::FrameSink;
use crate::source::{ChannelId, ChannelReader, Level, ReaderError};

/// Lowest capture rate the decoder's timing gates are meaningful at.
pub const MINIMUM_SAMPLE_RATE_HZ: u32 = 1_000_000;
/// A single pass over the capture is sufficient.
pub const NEEDS_RERUN: bool = false;

/// Host-side cancellation flag, checked before every cursor move.
///
/// # Examples
/// ```
/// use iecshark_core::CancelToken;
///
/// let token = CancelToken::new();
/// let handle = token.clone();
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Counters gathered over one decode run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeSummary {
    pub command_starts: u64,
    pub eoi_frames: u64,
    pub command_bytes: u64,
    pub data_bytes: u64,
    /// Byte cycles cut short by an ATN change.
    pub aborted_bytes: u64,
    pub violations: u64,
    /// Furthest sample the decoder reached.
    pub last_sample: u64,
}

/// ATN bookkeeping shared between the driver and the byte decoder.
#[derive(Debug)]
pub(crate) struct Attention {
    asserted: bool,
    start_sample: u64,
    command_start_emitted: bool,
    last_level: Level,
}

impl Attention {
    pub fn new() -> Self {
        Self {
            asserted: false,
            start_sample: 0,
            command_start_emitted: false,
            last_level: Level::High,
        }
    }

    pub fn is_asserted(&self) -> bool {
        self.asserted
    }

    /// Forget any interval in progress. ATN is taken as released, so a
    /// low level on the next observation counts as a fresh fall.
    pub fn prime(&mut self) {
        self.asserted = false;
        self.last_level = Level::High;
    }

    /// Feed the ATN level at `sample`. Returns a violation when ATN was
    /// released before any byte of its command phase got going.
    pub fn observe(&mut self, level: Level, sample: u64) -> Option<Violation> {
        if level == self.last_level {
            return None;
        }
        self.last_level = level;
        match level {
            Level::Low => {
                self.asserted = true;
                self.start_sample = sample;
                self.command_start_emitted = false;
                None
            }
            Level::High => {
                let premature = self.asserted && !self.command_start_emitted;
                self.asserted = false;
                premature.then_some(Violation::AtnDiscipline)
            }
        }
    }

    /// The `CommandStart` frame for the current interval, once.
    pub fn take_command_start(&mut self, ready: u64) -> Option<Frame> {
        if !self.asserted || self.command_start_emitted {
            return None;
        }
        self.command_start_emitted = true;
        let end = ready.saturating_sub(1).max(self.start_sample);
        Some(Frame::command_start(self.start_sample, end))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriverState {
    IdleSearch,
    Tracking,
    InByte,
}

/// Forwards to the host sink while counting what goes through.
struct Tally<'a, S: ?Sized> {
    sink: &'a mut S,
    summary: &'a mut DecodeSummary,
}

impl<S: FrameSink + ?Sized> FrameSink for Tally<'_, S> {
    fn bind_data_channel(&mut self, channel: ChannelId) {
        self.sink.bind_data_channel(channel);
    }

    fn add_frame(&mut self, frame: Frame) {
        match (frame.kind, frame.phase) {
            (FrameKind::CommandStart, _) => self.summary.command_starts += 1,
            (FrameKind::Eoi, _) => self.summary.eoi_frames += 1,
            (FrameKind::Data, Some(BusPhase::Command)) => self.summary.command_bytes += 1,
            (FrameKind::Data, _) => self.summary.data_bytes += 1,
            (FrameKind::Default, _) => {}
        }
        self.sink.add_frame(frame);
    }

    fn add_marker(&mut self, marker: Marker) {
        self.sink.add_marker(marker);
    }

    fn add_violation(&mut self, violation: Violation, sample: u64) {
        self.summary.violations += 1;
        self.sink.add_violation(violation, sample);
    }

    fn commit(&mut self) {
        self.sink.commit();
    }

    fn progress(&mut self, upto_sample: u64) {
        self.sink.progress(upto_sample);
    }
}

/// IEC serial bus decoder over three channel readers.
///
/// # Examples
/// ```
/// use iecshark_core::{EdgeChannel, FrameLog, IecDecoder, Level};
///
/// // A quiet bus decodes to nothing.
/// let idle = EdgeChannel::new(Level::High, vec![], 5_000).unwrap();
/// let mut log = FrameLog::default();
/// let decoder = IecDecoder::new(1_000_000);
/// decoder.setup(&mut log, 2);
/// let summary = decoder
///     .run(idle.cursor(), idle.cursor(), idle.cursor(), &mut log)
///     .unwrap();
/// assert!(log.frames.is_empty());
/// assert_eq!(log.data_channel, Some(2));
/// assert_eq!(summary.violations, 0);
/// ```
#[derive(Debug, Clone)]
pub struct IecDecoder {
    clock: SampleClock,
    cancel: CancelToken,
}

impl IecDecoder {
    pub fn new(sample_rate_hz: u32) -> Self {
        Self {
            clock: SampleClock::new(sample_rate_hz),
            cancel: CancelToken::new(),
        }
    }

    /// Use a host-provided cancellation token.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.clock.sample_rate_hz()
    }

    /// Tell the sink which channel carries byte and bit markers.
    pub fn setup<S: FrameSink + ?Sized>(&self, sink: &mut S, data_channel: ChannelId) {
        sink.bind_data_channel(data_channel);
    }

    /// Decode until the readers run out of samples.
    ///
    /// End of stream is a normal finish. Cancellation and reader failures
    /// are returned as errors; whatever was emitted before stays in the sink.
    pub fn run<R, S>(
        &self,
        atn: R,
        clk: R,
        data: R,
        sink: &mut S,
    ) -> Result<DecodeSummary, ReaderError>
    where
        R: ChannelReader,
        S: FrameSink + ?Sized,
    {
        info!(
            sample_rate_hz = self.clock.sample_rate_hz(),
            "decoding IEC bus"
        );
        let mut summary = DecodeSummary::default();
        let mut lines = BusLines::new(atn, clk, data, self.cancel.clone())?;

        let result = {
            let mut tally = Tally {
                sink,
                summary: &mut summary,
            };
            self.drive(&mut lines, &mut tally)
        };
        summary.last_sample = lines.now();

        match result {
            Ok(()) | Err(ReaderError::EndOfStream) => {
                info!(
                    frames = summary.command_starts
                        + summary.eoi_frames
                        + summary.command_bytes
                        + summary.data_bytes,
                    violations = summary.violations,
                    last_sample = summary.last_sample,
                    "decode finished"
                );
                Ok(summary)
            }
            Err(err) => Err(err),
        }
    }

    fn drive<R, S>(
        &self,
        lines: &mut BusLines<R>,
        tally: &mut Tally<'_, S>,
    ) -> Result<(), ReaderError>
    where
        R: ChannelReader,
        S: FrameSink + ?Sized,
    {
        let window = self.clock.samples_for_micros(IDLE_WINDOW_US);
        let mut attention = Attention::new();
        let mut state = DriverState::IdleSearch;

        loop {
            state = match state {
                DriverState::IdleSearch => {
                    find_bus_start(lines, window)?;
                    attention.prime();
                    DriverState::Tracking
                }
                DriverState::Tracking => {
                    let now = lines.now();
                    if let Some(violation) = attention.observe(lines.level(BusLine::Atn), now) {
                        debug!(id = violation.id(), sample = now, "{}", violation.message());
                        tally.add_violation(violation, now);
                    }
                    let levels = lines.levels();
                    if levels.clk.is_low() && levels.data.is_low() {
                        DriverState::InByte
                    } else {
                        lines.step()?;
                        DriverState::Tracking
                    }
                }
                DriverState::InByte => {
                    match decode_byte(lines, &self.clock, &mut attention, tally)? {
                        ByteOutcome::Complete(_) => DriverState::Tracking,
                        ByteOutcome::Interrupted => {
                            tally.summary.aborted_bytes += 1;
                            DriverState::Tracking
                        }
                        ByteOutcome::Violation(_) => DriverState::IdleSearch,
                    }
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Attention, CancelToken, IecDecoder};
    use crate::bus::frame::Violation;
    use crate::sink::FrameLog;
    use crate::source::{ChannelReader, EdgeChannel, Level, ReaderError};

    #[test]
    fn one_command_start_per_interval() {
        let mut attention = Attention::new();
        assert_eq!(attention.observe(Level::Low, 100), None);
        let frame = attention.take_command_start(150).unwrap();
        assert_eq!((frame.start_sample, frame.end_sample), (100, 149));
        assert!(attention.take_command_start(400).is_none());
        assert_eq!(attention.observe(Level::High, 900), None);
        assert!(attention.take_command_start(950).is_none());
    }

    #[test]
    fn releasing_atn_before_any_byte_is_flagged() {
        let mut attention = Attention::new();
        attention.observe(Level::Low, 10);
        assert_eq!(
            attention.observe(Level::High, 50),
            Some(Violation::AtnDiscipline)
        );
    }

    #[test]
    fn primed_state_sees_low_atn_as_a_fall() {
        let mut attention = Attention::new();
        attention.observe(Level::Low, 10);
        attention.prime();
        assert!(!attention.is_asserted());
        attention.observe(Level::Low, 70);
        assert!(attention.is_asserted());
        let frame = attention.take_command_start(90).unwrap();
        assert_eq!(frame.start_sample, 70);
    }

    #[test]
    fn cancelled_run_reports_cancellation() {
        let line = EdgeChannel::new(Level::High, vec![10, 20], 100).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let decoder = IecDecoder::new(1_000_000).with_cancel(cancel);
        let mut log = FrameLog::default();
        let result = decoder.run(line.cursor(), line.cursor(), line.cursor(), &mut log);
        assert_eq!(result, Err(ReaderError::Cancelled));
    }

    #[test]
    fn token_handed_out_by_the_decoder_cancels_it() {
        let line = EdgeChannel::new(Level::High, vec![10, 20], 100).unwrap();
        let decoder = IecDecoder::new(2_000_000);
        assert_eq!(decoder.sample_rate_hz(), 2_000_000);
        decoder.cancel_token().cancel();
        let mut log = FrameLog::default();
        let result = decoder.run(line.cursor(), line.cursor(), line.cursor(), &mut log);
        assert_eq!(result, Err(ReaderError::Cancelled));
    }

    struct FailingPeek;

    impl ChannelReader for FailingPeek {
        fn level(&self) -> Level {
            Level::High
        }

        fn sample(&self) -> u64 {
            0
        }

        fn advance_to(&mut self, _sample: u64) -> Result<(), ReaderError> {
            Ok(())
        }

        fn next_edge_sample(&self) -> Result<u64, ReaderError> {
            Err(ReaderError::Unavailable("device gone".to_string()))
        }
    }

    #[test]
    fn reader_failure_is_not_a_clean_finish() {
        let decoder = IecDecoder::new(1_000_000);
        let mut log = FrameLog::default();
        let result = decoder.run(FailingPeek, FailingPeek, FailingPeek, &mut log);
        assert_eq!(
            result,
            Err(ReaderError::Unavailable("device gone".to_string()))
        );
        assert!(log.frames.is_empty());
    }
}
