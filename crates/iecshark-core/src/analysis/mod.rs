use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};

use crate::bus::{
    BusLine, CancelToken, DecodeSummary, IecDecoder, MINIMUM_SAMPLE_RATE_HZ, SampleClock,
};
use crate::settings::{ChannelSettings, ResolvedChannels, SettingsError};
use crate::sink::FrameLog;
use crate::source::{Capture, ChannelId, EdgeChannel, ReaderError, SourceError, open_capture};
use crate::{CaptureSummary, FrameRecord, MarkerRecord, Report, make_stub_report};

mod violations;

use violations::summarize_violations;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Source error: {0}")]
    Source(#[from] SourceError),
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
    #[error("sample rate {rate} Hz is below the decoder minimum of {minimum} Hz")]
    SampleRateTooLow { rate: u32, minimum: u32 },
    #[error("Decode error: {0}")]
    Decode(#[from] ReaderError),
}

/// Output of one decoder pass over an in-memory capture.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub channels: ResolvedChannels,
    pub summary: DecodeSummary,
    pub log: FrameLog,
}

/// Load a capture file, decode it and build the report.
///
/// Lines left unassigned in `settings` are looked up by channel name.
pub fn analyze_capture_file(
    path: &Path,
    settings: &ChannelSettings,
    sample_rate_override: Option<u32>,
) -> Result<Report, AnalysisError> {
    let capture = open_capture(path, sample_rate_override)?;
    let decoded = decode_capture(&capture, settings)?;
    let mut report = make_stub_report(&path.display().to_string(), path.metadata()?.len());
    fill_report(&mut report, &capture, &decoded);
    Ok(report)
}

/// Run the decoder over a capture already in memory.
pub fn decode_capture(
    capture: &Capture,
    settings: &ChannelSettings,
) -> Result<Decoded, AnalysisError> {
    decode_capture_with_cancel(capture, settings, CancelToken::new())
}

/// Like [`decode_capture`], stopping early once `cancel` is set.
pub fn decode_capture_with_cancel(
    capture: &Capture,
    settings: &ChannelSettings,
    cancel: CancelToken,
) -> Result<Decoded, AnalysisError> {
    if capture.sample_rate_hz < MINIMUM_SAMPLE_RATE_HZ {
        return Err(AnalysisError::SampleRateTooLow {
            rate: capture.sample_rate_hz,
            minimum: MINIMUM_SAMPLE_RATE_HZ,
        });
    }

    let settings = settings.or(ChannelSettings::from_capture_names(capture));
    let channels = settings.resolve(capture)?;
    debug!(
        atn = channels.atn,
        clk = channels.clk,
        data = channels.data,
        "channels resolved"
    );
    let atn = channel_edges(capture, BusLine::Atn, channels.atn)?;
    let clk = channel_edges(capture, BusLine::Clk, channels.clk)?;
    let data = channel_edges(capture, BusLine::Data, channels.data)?;

    let decoder = IecDecoder::new(capture.sample_rate_hz).with_cancel(cancel);
    let mut log = FrameLog::default();
    decoder.setup(&mut log, channels.data);
    let summary = decoder.run(atn.cursor(), clk.cursor(), data.cursor(), &mut log)?;
    info!(
        frames = log.frames.len(),
        violations = log.violations.len(),
        "capture decoded"
    );

    Ok(Decoded {
        channels,
        summary,
        log,
    })
}

fn channel_edges(
    capture: &Capture,
    line: BusLine,
    channel: ChannelId,
) -> Result<&EdgeChannel, AnalysisError> {
    capture
        .channel(channel)
        .map(|found| &found.edges)
        .ok_or(AnalysisError::Settings(SettingsError::Missing { line, channel }))
}

/// Populate a stub report from a decode pass.
pub fn fill_report(report: &mut Report, capture: &Capture, decoded: &Decoded) {
    let clock = SampleClock::new(capture.sample_rate_hz);
    let channels = decoded.channels;

    report.capture_summary = Some(CaptureSummary {
        sample_rate_hz: capture.sample_rate_hz,
        samples_total: capture.samples,
        duration_us: clock.micros_at(capture.samples),
        channels_total: capture.channels.len() as u64,
    });
    report.channels = Some(channels);
    report.decode_summary = Some(decoded.summary.clone());

    report.frames = decoded
        .log
        .frames
        .iter()
        .map(|frame| FrameRecord {
            kind: frame.kind,
            label: frame.label(),
            phase: frame.phase,
            payload: frame.payload,
            start_sample: frame.start_sample,
            end_sample: frame.end_sample,
            start_us: clock.micros_at(frame.start_sample),
            end_us: clock.micros_at(frame.end_sample),
        })
        .collect();

    let data_channel = decoded.log.data_channel.unwrap_or(channels.data);
    report.markers = decoded
        .log
        .markers
        .iter()
        .map(|marker| MarkerRecord {
            sample: marker.sample,
            kind: marker.kind,
            line: marker.line,
            channel: match marker.line {
                BusLine::Atn => channels.atn,
                BusLine::Clk => channels.clk,
                BusLine::Data => data_channel,
            },
        })
        .collect();

    report.violations = summarize_violations(&decoded.log.violations);
}
