use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use super::error::CaptureError;
use super::layout;
use super::reader::{
    extension_of, parse_level, parse_sample_rate_comment, seconds_to_sample, split_fields,
};
use crate::source::{Capture, CaptureChannel, ChannelId, EdgeChannel, Level, SourceError};

#[derive(Debug, Deserialize)]
struct CaptureDocument {
    sample_rate_hz: u32,
    samples: u64,
    channels: Vec<ChannelDocument>,
}

#[derive(Debug, Deserialize)]
struct ChannelDocument {
    id: ChannelId,
    #[serde(default)]
    name: Option<String>,
    initial: u8,
    #[serde(default)]
    edges: Vec<u64>,
}

/// Load a capture file, choosing the format from the extension.
///
/// `sample_rate_override` replaces the rate stored in the file; CSV files
/// without a `# sample_rate_hz=` comment require it.
pub fn open_capture(path: &Path, sample_rate_override: Option<u32>) -> Result<Capture, SourceError> {
    let ext = extension_of(path);
    let text = fs::read_to_string(path)?;
    let capture = match ext.as_str() {
        layout::JSON_EXTENSION => parse_json_capture(&text, sample_rate_override)?,
        layout::CSV_EXTENSION => parse_csv_capture(&text, sample_rate_override)?,
        _ => return Err(SourceError::UnsupportedFormat(path.display().to_string())),
    };
    debug!(
        "loaded {} ({} channels, {} samples @ {} Hz)",
        path.display(),
        capture.channels.len(),
        capture.samples,
        capture.sample_rate_hz
    );
    Ok(capture)
}

pub fn parse_json_capture(
    text: &str,
    sample_rate_override: Option<u32>,
) -> Result<Capture, CaptureError> {
    let document: CaptureDocument = serde_json::from_str(text)
        .map_err(|e| CaptureError::parse("json document", e.to_string()))?;
    let sample_rate_hz = sample_rate_override.unwrap_or(document.sample_rate_hz);
    if sample_rate_hz == 0 {
        return Err(CaptureError::parse("json document", "sample rate must be non-zero"));
    }
    if document.channels.is_empty() {
        return Err(CaptureError::parse("json document", "capture has no channels"));
    }

    let mut seen = HashSet::new();
    let mut channels = Vec::with_capacity(document.channels.len());
    for channel in document.channels {
        if !seen.insert(channel.id) {
            return Err(CaptureError::parse(
                "json channel",
                format!("duplicate channel id {}", channel.id),
            ));
        }
        let initial = match channel.initial {
            0 => Level::Low,
            1 => Level::High,
            other => {
                return Err(CaptureError::parse(
                    "json channel",
                    format!("channel {}: initial level must be 0 or 1, got {other}", channel.id),
                ));
            }
        };
        let edges = EdgeChannel::new(initial, channel.edges, document.samples).map_err(|e| {
            CaptureError::parse("json channel", format!("channel {}: {e}", channel.id))
        })?;
        channels.push(CaptureChannel {
            id: channel.id,
            name: channel.name.unwrap_or_else(|| default_name(channel.id)),
            edges,
        });
    }

    Ok(Capture {
        sample_rate_hz,
        samples: document.samples,
        channels,
    })
}

pub fn parse_csv_capture(
    text: &str,
    sample_rate_override: Option<u32>,
) -> Result<Capture, CaptureError> {
    let mut comment_rate = None;
    let mut names: Option<Vec<String>> = None;
    let mut rows: Vec<(f64, Vec<Level>)> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with(layout::CSV_COMMENT) {
            if let Some(rate) = parse_sample_rate_comment(line)? {
                comment_rate = Some(rate);
            }
            continue;
        }
        let fields = split_fields(line);
        let columns = names.as_ref().map(Vec::len);
        match columns {
            None => names = Some(parse_header(&fields)?),
            Some(columns) => rows.push(parse_row(&fields, columns)?),
        }
    }

    let names = names.ok_or_else(|| CaptureError::parse("csv header", "missing header row"))?;
    let sample_rate_hz = sample_rate_override.or(comment_rate).ok_or_else(|| {
        CaptureError::parse(
            "csv sample rate",
            "no sample rate in file; pass one explicitly",
        )
    })?;
    if sample_rate_hz == 0 {
        return Err(CaptureError::parse("csv sample rate", "sample rate must be non-zero"));
    }
    let Some((origin, _)) = rows.first() else {
        return Err(CaptureError::parse("csv rows", "capture has no rows"));
    };
    let origin = *origin;

    let mut initial = Vec::with_capacity(names.len());
    let mut current = Vec::with_capacity(names.len());
    let mut edges: Vec<Vec<u64>> = vec![Vec::new(); names.len()];
    let mut last_sample = 0u64;
    for (index, (time, levels)) in rows.iter().enumerate() {
        if index == 0 {
            initial.clone_from(levels);
            current.clone_from(levels);
            continue;
        }
        if *time < origin {
            return Err(CaptureError::parse(
                "csv rows",
                format!("row {} goes back in time ({time} s)", index + 1),
            ));
        }
        let sample = seconds_to_sample(time - origin, sample_rate_hz)?;
        if sample < last_sample {
            return Err(CaptureError::parse(
                "csv rows",
                format!("row {} goes back in time ({time} s)", index + 1),
            ));
        }
        for (channel, level) in levels.iter().enumerate() {
            if *level != current[channel] {
                edges[channel].push(sample);
                current[channel] = *level;
            }
        }
        last_sample = sample;
    }

    let samples = last_sample
        .checked_add(1)
        .ok_or_else(|| CaptureError::parse("csv rows", "capture is too long"))?;
    let mut channels = Vec::with_capacity(names.len());
    for (index, (name, edges)) in names.into_iter().zip(edges).enumerate() {
        let id = ChannelId::try_from(index)
            .map_err(|_| CaptureError::parse("csv header", "too many channels"))?;
        let edges = EdgeChannel::new(initial[index], edges, samples)
            .map_err(|e| CaptureError::parse("csv rows", format!("channel '{name}': {e}")))?;
        channels.push(CaptureChannel { id, name, edges });
    }

    Ok(Capture {
        sample_rate_hz,
        samples,
        channels,
    })
}

fn parse_header(fields: &[&str]) -> Result<Vec<String>, CaptureError> {
    let (time, names) = fields
        .split_first()
        .ok_or_else(|| CaptureError::parse("csv header", "empty header"))?;
    if !time.eq_ignore_ascii_case(layout::CSV_TIME_COLUMN) {
        return Err(CaptureError::parse(
            "csv header",
            format!("first column must be '{}', got '{time}'", layout::CSV_TIME_COLUMN),
        ));
    }
    if names.is_empty() {
        return Err(CaptureError::parse("csv header", "no channel columns"));
    }
    Ok(names.iter().map(|name| name.to_string()).collect())
}

fn parse_row(fields: &[&str], channels: usize) -> Result<(f64, Vec<Level>), CaptureError> {
    if fields.len() != channels + 1 {
        return Err(CaptureError::parse(
            "csv rows",
            format!("expected {} fields, got {}", channels + 1, fields.len()),
        ));
    }
    let time = fields[0]
        .parse::<f64>()
        .map_err(|e| CaptureError::parse("csv time", format!("'{}': {e}", fields[0])))?;
    let levels = fields[1..]
        .iter()
        .map(|field| parse_level(field))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((time, levels))
}

fn default_name(id: ChannelId) -> String {
    format!("Channel {id}")
}
