//! IecShark core library for offline analysis of Commodore IEC serial bus
//! captures.
//!
//! Captured ATN/CLK/DATA channels are loaded by `source`, turned into
//! per-channel readers and handed to the bus decoder, which follows the
//! byte handshake edge by edge and pushes frames, point markers and protocol
//! violations into a [`FrameSink`]. The analysis layer collects those into a
//! deterministic [`Report`]. All file I/O stays in `source`; the decoder
//! only ever sees [`ChannelReader`]s.
//!
//! Invariants:
//! - Frames never overlap and come out in increasing sample order.
//! - At most one `CommandStart` frame per ATN-low interval.
//! - Every `Data` frame holds exactly eight bit markers, LSB first.
//! - Protocol violations are reported, never fatal.
//!
//! # Examples
//! ```no_run
//! use std::path::Path;
//!
//! use iecshark_core::{ChannelSettings, analyze_capture_file};
//!
//! let report = analyze_capture_file(
//!     Path::new("capture.json"),
//!     &ChannelSettings::default(),
//!     None,
//! )?;
//! for frame in &report.frames {
//!     println!("{} {}", frame.start_sample, frame.label);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use serde::{Deserialize, Serialize};

mod analysis;
mod bus;
mod export;
mod settings;
mod sink;
mod source;

pub use analysis::{
    AnalysisError, Decoded, analyze_capture_file, decode_capture, decode_capture_with_cancel,
    fill_report,
};
pub use bus::{
    BusLine, BusPhase, CancelToken, DecodeSummary, EOI_ACK_MIN_US, EOI_THRESHOLD_US, Frame,
    FrameKind, IDLE_WINDOW_US, IecDecoder, MINIMUM_SAMPLE_RATE_HZ, Marker, MarkerKind,
    NEEDS_RERUN, SampleClock, Violation,
};
pub use export::{CSV_HEADER, write_frames_csv};
pub use settings::{ChannelSettings, ResolvedChannels, SettingsError};
pub use sink::{FrameLog, FrameSink};
pub use source::{
    Capture, CaptureChannel, ChannelId, ChannelReader, EdgeChannel, EdgeCursor, EdgeError, Level,
    ReaderError, SourceError, open_capture,
};

/// Current report schema version.
pub const REPORT_VERSION: u32 = 1;

/// Decode report with deterministic ordering.
///
/// # Examples
/// ```
/// use iecshark_core::make_stub_report;
///
/// let report = make_stub_report("capture.json", 512);
/// assert_eq!(report.report_version, iecshark_core::REPORT_VERSION);
/// assert!(report.frames.is_empty());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Report schema version (not the binary version).
    pub report_version: u32,
    pub tool: ToolInfo,
    pub input: InputInfo,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_summary: Option<CaptureSummary>,
    /// Channel ids the bus lines were decoded from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<ResolvedChannels>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decode_summary: Option<DecodeSummary>,

    /// Frames in sample order.
    pub frames: Vec<FrameRecord>,
    /// Point markers in emission order.
    pub markers: Vec<MarkerRecord>,
    /// Violations aggregated per id, sorted by id.
    pub violations: Vec<ViolationSummary>,
}

/// Tool metadata embedded in reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    /// Tool version (semver).
    pub version: String,
}

/// Input capture metadata embedded in reports.
///
/// # Examples
/// ```
/// use iecshark_core::InputInfo;
///
/// let input = InputInfo {
///     path: "capture.csv".to_string(),
///     bytes: 1024,
/// };
/// assert_eq!(input.bytes, 1024);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputInfo {
    /// Input path as provided to the analyzer.
    pub path: String,
    /// Input size in bytes.
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSummary {
    pub sample_rate_hz: u32,
    pub samples_total: u64,
    /// Capture length in microseconds.
    pub duration_us: f64,
    pub channels_total: u64,
}

/// One decoded frame, with sample range and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameRecord {
    pub kind: FrameKind,
    /// Display label (`ATN`, `EOI`, `CMD 0x28`, `0x41`).
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<BusPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<u8>,
    pub start_sample: u64,
    /// Inclusive.
    pub end_sample: u64,
    pub start_us: f64,
    pub end_us: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerRecord {
    pub sample: u64,
    pub kind: MarkerKind,
    pub line: BusLine,
    /// Capture channel the marker is drawn on.
    pub channel: ChannelId,
}

/// Aggregated protocol violation.
///
/// # Examples
/// ```
/// use iecshark_core::{BusLine, ViolationSummary};
///
/// let violation = ViolationSummary {
///     id: "IEC-LISTENER-ACK".to_string(),
///     line: BusLine::Clk,
///     message: "CLK released before listener acknowledged byte".to_string(),
///     count: 1,
///     examples: vec![48_211],
/// };
/// assert_eq!(violation.count, 1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationSummary {
    /// Stable violation identifier (e.g., `IEC-EOI-HANDSHAKE`).
    pub id: String,
    /// Line the error marker sits on.
    pub line: BusLine,
    pub message: String,
    /// Number of occurrences aggregated into this violation.
    pub count: u64,
    /// Sample indices of the first occurrences, at most three.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<u64>,
}

/// Build a stub report with base fields filled and empty aggregates.
pub fn make_stub_report(input_path: &str, input_bytes: u64) -> Report {
    Report {
        report_version: REPORT_VERSION,
        tool: ToolInfo {
            name: "iecshark".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        input: InputInfo {
            path: input_path.to_string(),
            bytes: input_bytes,
        },
        capture_summary: None,
        channels: None,
        decode_summary: None,
        frames: vec![],
        markers: vec![],
        violations: vec![],
    }
}
