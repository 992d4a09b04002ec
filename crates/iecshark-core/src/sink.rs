use crate::bus::{Frame, Marker, MarkerKind, Violation};
use crate::source::ChannelId;

/// Receiver of decoder output, supplied by the host.
///
/// Only `add_frame` and `add_marker` are required; the remaining hooks
/// exist for hosts that render incrementally.
pub trait FrameSink {
    /// Called once before decoding with the channel that carries byte and
    /// bit markers.
    fn bind_data_channel(&mut self, _channel: ChannelId) {}

    fn add_frame(&mut self, frame: Frame);

    fn add_marker(&mut self, marker: Marker);

    /// Record a protocol violation. The default places an `ErrorX` marker
    /// on the line responsible.
    fn add_violation(&mut self, violation: Violation, sample: u64) {
        self.add_marker(Marker::new(sample, MarkerKind::ErrorX, violation.line()));
    }

    fn commit(&mut self) {}

    fn progress(&mut self, _upto_sample: u64) {}
}

/// A sink that keeps everything in memory.
///
/// # Examples
/// ```
/// use iecshark_core::{BusPhase, Frame, FrameLog, FrameSink};
///
/// let mut log = FrameLog::default();
/// log.add_frame(Frame::data(BusPhase::Data, 0x41, 10, 90));
/// log.progress(90);
/// assert_eq!(log.frames.len(), 1);
/// assert_eq!(log.progress, 90);
/// ```
#[derive(Debug, Default, Clone)]
pub struct FrameLog {
    pub data_channel: Option<ChannelId>,
    pub frames: Vec<Frame>,
    pub markers: Vec<Marker>,
    /// Violations with the sample they were detected at, in detection order.
    pub violations: Vec<(Violation, u64)>,
    pub commits: u64,
    pub progress: u64,
}

impl FrameSink for FrameLog {
    fn bind_data_channel(&mut self, channel: ChannelId) {
        self.data_channel = Some(channel);
    }

    fn add_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    fn add_marker(&mut self, marker: Marker) {
        self.markers.push(marker);
    }

    fn add_violation(&mut self, violation: Violation, sample: u64) {
        self.violations.push((violation, sample));
        self.add_marker(Marker::new(sample, MarkerKind::ErrorX, violation.line()));
    }

    fn commit(&mut self) {
        self.commits += 1;
    }

    fn progress(&mut self, upto_sample: u64) {
        self.progress = self.progress.max(upto_sample);
    }
}

#[cfg(test)]
mod tests {
    use super::{FrameLog, FrameSink};
    use crate::bus::{BusLine, MarkerKind, Violation};

    #[test]
    fn violation_adds_error_marker_on_its_line() {
        let mut log = FrameLog::default();
        log.add_violation(Violation::ListenerAck, 42);
        assert_eq!(log.violations, vec![(Violation::ListenerAck, 42)]);
        assert_eq!(log.markers.len(), 1);
        assert_eq!(log.markers[0].kind, MarkerKind::ErrorX);
        assert_eq!(log.markers[0].line, BusLine::Clk);
        assert_eq!(log.markers[0].sample, 42);
    }

    #[test]
    fn progress_is_monotonic() {
        let mut log = FrameLog::default();
        log.progress(100);
        log.progress(50);
        assert_eq!(log.progress, 100);
    }
}
