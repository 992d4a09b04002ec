//! One IEC byte handshake, from "talker ready" to "listener acknowledged".
//!
//! Steps:
//! - A: wait for CLK and DATA to be released (ready to send / ready for data).
//! - B: decide EOI by which line falls first, or by ready-phase length.
//! - C: EOI acknowledge pulse from the listener.
//! - D: eight bit cells, sampled on the CLK rising edge, LSB first.
//! - E: listener pulls DATA low to acknowledge the byte.
//!
//! ATN changes during A to C abort the byte. During D and E an ATN fall
//! aborts the byte; an ATN rise inside a command byte is a violation.

use tracing::{debug, trace};

use super::frame::{BusLine, BusPhase, Frame, Marker, MarkerKind, Violation};
use super::lines::{BusLevels, BusLines, Wait};
use super::session::Attention;
use super::timing::{EOI_ACK_MIN_US, EOI_THRESHOLD_US, SampleClock};
use crate::sink::FrameSink;
use crate::source::{ChannelReader, ReaderError};

/// How a byte cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ByteOutcome {
    /// A `Data` frame was emitted.
    Complete(BusPhase),
    /// ATN changed before the byte finished; no frame.
    Interrupted,
    /// A protocol violation was recorded; the caller must resynchronize.
    Violation(Violation),
}

enum Abort {
    Stream(ReaderError),
    Outcome(ByteOutcome),
}

impl From<ReaderError> for Abort {
    fn from(err: ReaderError) -> Self {
        Abort::Stream(err)
    }
}

/// Decode one byte starting from a coherent CLK-low, DATA-low state.
///
/// Reader errors (including end of stream) are returned unchanged; no
/// partial frame is emitted for a byte cut off by the end of the capture.
pub(crate) fn decode_byte<R, S>(
    lines: &mut BusLines<R>,
    clock: &SampleClock,
    attention: &mut Attention,
    sink: &mut S,
) -> Result<ByteOutcome, ReaderError>
where
    R: ChannelReader,
    S: FrameSink + ?Sized,
{
    let phase = if attention.is_asserted() {
        BusPhase::Command
    } else {
        BusPhase::Data
    };
    let mut cycle = ByteCycle {
        lines,
        clock: *clock,
        sink,
        phase,
    };
    match cycle.run(attention) {
        Ok(()) => Ok(ByteOutcome::Complete(phase)),
        Err(Abort::Outcome(outcome)) => Ok(outcome),
        Err(Abort::Stream(err)) => Err(err),
    }
}

struct ByteCycle<'a, R, S: ?Sized> {
    lines: &'a mut BusLines<R>,
    clock: SampleClock,
    sink: &'a mut S,
    phase: BusPhase,
}

impl<R, S> ByteCycle<'_, R, S>
where
    R: ChannelReader,
    S: FrameSink + ?Sized,
{
    fn run(&mut self, attention: &mut Attention) -> Result<(), Abort> {
        let ready = self.wait_ready()?;
        if let Some(frame) = attention.take_command_start(ready) {
            self.emit(frame);
        }
        let data_start = self.eoi_window(ready)?;
        let value = self.receive_bits(data_start)?;
        let ack = self.listener_ack()?;
        self.sink
            .add_marker(Marker::new(ack, MarkerKind::ByteEnd, BusLine::Data));
        self.emit(Frame::data(self.phase, value, data_start, ack));
        Ok(())
    }

    // Step A.
    fn wait_ready(&mut self) -> Result<u64, Abort> {
        self.wait_handshake(|lv| lv.clk.is_high() && lv.data.is_high())?;
        let ready = self.lines.now();
        trace!(sample = ready, "ready to send");
        Ok(ready)
    }

    // Step B. Returns the CLK fall that opens the bit phase.
    fn eoi_window(&mut self, ready: u64) -> Result<u64, Abort> {
        let levels = self.wait_handshake(|lv| lv.clk.is_low() || lv.data.is_low())?;
        let now = self.lines.now();

        if levels.clk.is_low() {
            if self.clock.at_least_micros(ready, now, EOI_THRESHOLD_US) {
                // Talker held off for an EOI but nobody acknowledged it.
                let violation = match self.phase {
                    BusPhase::Command => Violation::EoiInCommand,
                    BusPhase::Data => Violation::MalformedEoi,
                };
                return Err(self.violation(violation));
            }
            return Ok(now);
        }

        if self.phase == BusPhase::Command {
            return Err(self.violation(Violation::EoiInCommand));
        }
        self.eoi_handshake(ready)
    }

    // Step C.
    fn eoi_handshake(&mut self, ready: u64) -> Result<u64, Abort> {
        let ack_start = self.lines.now();
        let levels = self.wait_handshake(|lv| lv.data.is_high() || lv.clk.is_low())?;
        if levels.data.is_low() {
            return Err(self.violation(Violation::MalformedEoi));
        }
        if !self
            .clock
            .at_least_micros(ack_start, self.lines.now(), EOI_ACK_MIN_US)
        {
            return Err(self.violation(Violation::MalformedEoi));
        }

        let levels = self.wait_handshake(|lv| lv.clk.is_low() || lv.data.is_low())?;
        if levels.data.is_low() {
            return Err(self.violation(Violation::MalformedEoi));
        }
        let clk_fall = self.lines.now();
        self.emit(Frame::eoi(ready, clk_fall.saturating_sub(1)));
        Ok(clk_fall)
    }

    // Step D.
    fn receive_bits(&mut self, data_start: u64) -> Result<u8, Abort> {
        self.sink
            .add_marker(Marker::new(data_start, MarkerKind::ByteStart, BusLine::Data));

        let mut value = 0u8;
        for bit in 0..8 {
            let levels = self.wait_clocked(|lv| lv.clk.is_high())?;
            let sample = self.lines.now();
            let one = levels.data.is_high();
            trace!(bit, one, sample, "bit");
            let kind = if one { MarkerKind::One } else { MarkerKind::Zero };
            self.sink.add_marker(Marker::new(sample, kind, BusLine::Data));
            value = (value >> 1) | (u8::from(one) << 7);
            self.wait_clocked(|lv| lv.clk.is_low())?;
        }
        Ok(value)
    }

    // Step E. Returns the acknowledge sample.
    fn listener_ack(&mut self) -> Result<u64, Abort> {
        let levels = self.wait_clocked(|lv| lv.data.is_high() || lv.clk.is_high())?;
        if levels.clk.is_high() {
            return Err(self.violation(Violation::ListenerAck));
        }
        let levels = self.wait_clocked(|lv| lv.data.is_low() || lv.clk.is_high())?;
        if levels.clk.is_high() {
            return Err(self.violation(Violation::ListenerAck));
        }
        Ok(self.lines.now())
    }

    /// Wait during the handshake steps, where any ATN change aborts.
    fn wait_handshake<F>(&mut self, done: F) -> Result<BusLevels, Abort>
    where
        F: Fn(BusLevels) -> bool,
    {
        match self.lines.wait_until(done)? {
            Wait::Reached => Ok(self.lines.levels()),
            Wait::AtnChanged => Err(self.interrupted()),
        }
    }

    /// Wait once bits are flowing. Releasing ATN here breaks a command byte.
    fn wait_clocked<F>(&mut self, done: F) -> Result<BusLevels, Abort>
    where
        F: Fn(BusLevels) -> bool,
    {
        match self.lines.wait_until(done)? {
            Wait::Reached => Ok(self.lines.levels()),
            Wait::AtnChanged
                if self.phase == BusPhase::Command && self.lines.level(BusLine::Atn).is_high() =>
            {
                Err(self.violation(Violation::AtnDiscipline))
            }
            Wait::AtnChanged => Err(self.interrupted()),
        }
    }

    fn interrupted(&mut self) -> Abort {
        let now = self.lines.now();
        debug!(sample = now, "byte interrupted by ATN");
        self.sink
            .add_marker(Marker::new(now, MarkerKind::ByteEnd, BusLine::Data));
        Abort::Outcome(ByteOutcome::Interrupted)
    }

    fn violation(&mut self, violation: Violation) -> Abort {
        let now = self.lines.now();
        debug!(id = violation.id(), sample = now, "{}", violation.message());
        self.sink.add_violation(violation, now);
        Abort::Outcome(ByteOutcome::Violation(violation))
    }

    fn emit(&mut self, frame: Frame) {
        debug!(
            start = frame.start_sample,
            end = frame.end_sample,
            "frame {}",
            frame.label()
        );
        self.sink.add_frame(frame);
        self.sink.commit();
        self.sink.progress(frame.end_sample);
    }
}
