//! Text/CSV export of decoded frames.

use std::io::{self, Write};

use crate::bus::{BusPhase, FrameKind};
use crate::{FrameRecord, Report};

pub const CSV_HEADER: &str = "Time [s],Type,Value,Start Sample,End Sample";

/// Write one CSV row per frame of `report`.
///
/// # Examples
/// ```
/// use iecshark_core::{CSV_HEADER, make_stub_report, write_frames_csv};
///
/// let mut out = Vec::new();
/// write_frames_csv(&make_stub_report("capture.json", 0), &mut out).unwrap();
/// assert_eq!(String::from_utf8(out).unwrap().trim_end(), CSV_HEADER);
/// ```
pub fn write_frames_csv<W: Write>(report: &Report, mut writer: W) -> io::Result<()> {
    writeln!(writer, "{CSV_HEADER}")?;
    for frame in &report.frames {
        let (kind, value) = type_and_value(frame);
        writeln!(
            writer,
            "{:.9},{},{},{},{}",
            frame.start_us / 1_000_000.0,
            kind,
            value,
            frame.start_sample,
            frame.end_sample
        )?;
    }
    writer.flush()
}

fn type_and_value(frame: &FrameRecord) -> (&'static str, String) {
    let value = frame
        .payload
        .map(|byte| format!("0x{byte:02X}"))
        .unwrap_or_default();
    let kind = match (frame.kind, frame.phase) {
        (FrameKind::CommandStart, _) => "ATN",
        (FrameKind::Eoi, _) => "EOI",
        (FrameKind::Data, Some(BusPhase::Command)) => "CMD",
        (FrameKind::Data, _) => "DATA",
        (FrameKind::Default, _) => "",
    };
    (kind, value)
}
