//! Channel assignment for the three bus lines.
//!
//! Settings persist as a text archive of three whitespace-separated channel
//! ids in the order DATA, CLK, ATN. An unassigned line is written as `-`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bus::BusLine;
use crate::source::{Capture, ChannelId};

const UNASSIGNED: &str = "-";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("{} channel is not assigned", .0.name())]
    Unassigned(BusLine),
    #[error("channel {channel} is assigned to both {} and {}", .first.name(), .second.name())]
    Duplicate {
        channel: ChannelId,
        first: BusLine,
        second: BusLine,
    },
    #[error("{} channel {channel} is not present in the capture", .line.name())]
    Missing { line: BusLine, channel: ChannelId },
    #[error("invalid settings archive: {0}")]
    Archive(String),
}

/// Channel ids for ATN, CLK and DATA; any of them may still be unassigned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSettings {
    pub atn: Option<ChannelId>,
    pub clk: Option<ChannelId>,
    pub data: Option<ChannelId>,
}

/// A validated assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedChannels {
    pub atn: ChannelId,
    pub clk: ChannelId,
    pub data: ChannelId,
}

impl ChannelSettings {
    pub fn new(atn: ChannelId, clk: ChannelId, data: ChannelId) -> Self {
        Self {
            atn: Some(atn),
            clk: Some(clk),
            data: Some(data),
        }
    }

    /// Parse a settings archive (`DATA CLK ATN`).
    ///
    /// # Examples
    /// ```
    /// use iecshark_core::ChannelSettings;
    ///
    /// let settings = ChannelSettings::load_archive("2 1 0").unwrap();
    /// assert_eq!(settings, ChannelSettings::new(0, 1, 2));
    /// assert_eq!(settings.save_archive(), "2 1 0");
    /// ```
    pub fn load_archive(text: &str) -> Result<Self, SettingsError> {
        let fields: Vec<&str> = text.split_whitespace().collect();
        let [data, clk, atn] = fields.as_slice() else {
            return Err(SettingsError::Archive(format!(
                "expected 3 channel ids (DATA CLK ATN), found {}",
                fields.len()
            )));
        };
        Ok(Self {
            atn: parse_id(atn)?,
            clk: parse_id(clk)?,
            data: parse_id(data)?,
        })
    }

    pub fn save_archive(&self) -> String {
        [self.data, self.clk, self.atn]
            .iter()
            .map(|id| id.map_or_else(|| UNASSIGNED.to_string(), |id| id.to_string()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Guess the assignment from channels named `ATN`, `CLK` and `DATA`.
    pub fn from_capture_names(capture: &Capture) -> Self {
        let find = |name: &str| capture.channel_named(name).map(|channel| channel.id);
        Self {
            atn: find("ATN"),
            clk: find("CLK"),
            data: find("DATA"),
        }
    }

    /// Fill lines left unassigned here from `fallback`.
    pub fn or(self, fallback: ChannelSettings) -> Self {
        Self {
            atn: self.atn.or(fallback.atn),
            clk: self.clk.or(fallback.clk),
            data: self.data.or(fallback.data),
        }
    }

    pub fn get(&self, line: BusLine) -> Option<ChannelId> {
        match line {
            BusLine::Atn => self.atn,
            BusLine::Clk => self.clk,
            BusLine::Data => self.data,
        }
    }

    /// Check that all three lines are assigned to distinct channels.
    pub fn validate(&self) -> Result<ResolvedChannels, SettingsError> {
        let assigned = |line| self.get(line).ok_or(SettingsError::Unassigned(line));
        let resolved = ResolvedChannels {
            atn: assigned(BusLine::Atn)?,
            clk: assigned(BusLine::Clk)?,
            data: assigned(BusLine::Data)?,
        };
        let pairs = [
            (BusLine::Atn, resolved.atn, BusLine::Clk, resolved.clk),
            (BusLine::Atn, resolved.atn, BusLine::Data, resolved.data),
            (BusLine::Clk, resolved.clk, BusLine::Data, resolved.data),
        ];
        for (first, channel, second, other) in pairs {
            if channel == other {
                return Err(SettingsError::Duplicate {
                    channel,
                    first,
                    second,
                });
            }
        }
        Ok(resolved)
    }

    /// Validate and check every channel exists in `capture`.
    pub fn resolve(&self, capture: &Capture) -> Result<ResolvedChannels, SettingsError> {
        let resolved = self.validate()?;
        for (line, channel) in [
            (BusLine::Atn, resolved.atn),
            (BusLine::Clk, resolved.clk),
            (BusLine::Data, resolved.data),
        ] {
            if capture.channel(channel).is_none() {
                return Err(SettingsError::Missing { line, channel });
            }
        }
        Ok(resolved)
    }
}

fn parse_id(field: &str) -> Result<Option<ChannelId>, SettingsError> {
    if field == UNASSIGNED {
        return Ok(None);
    }
    field
        .parse::<ChannelId>()
        .map(Some)
        .map_err(|_| SettingsError::Archive(format!("'{field}' is not a channel id")))
}

#[cfg(test)]
mod tests {
    use super::{ChannelSettings, SettingsError};
    use crate::bus::BusLine;
    use crate::source::{Capture, CaptureChannel, EdgeChannel, Level};

    fn capture(names: &[&str]) -> Capture {
        let channels = names
            .iter()
            .enumerate()
            .map(|(id, name)| CaptureChannel {
                id: id as u16,
                name: name.to_string(),
                edges: EdgeChannel::new(Level::High, vec![], 10).unwrap(),
            })
            .collect();
        Capture {
            sample_rate_hz: 1_000_000,
            samples: 10,
            channels,
        }
    }

    #[test]
    fn archive_order_is_data_clk_atn() {
        let settings = ChannelSettings::load_archive(" 5\t3 \n1 ").unwrap();
        assert_eq!(settings.data, Some(5));
        assert_eq!(settings.clk, Some(3));
        assert_eq!(settings.atn, Some(1));
    }

    #[test]
    fn unassigned_lines_survive_the_archive() {
        let settings = ChannelSettings {
            atn: None,
            clk: Some(4),
            data: None,
        };
        let text = settings.save_archive();
        assert_eq!(text, "- 4 -");
        assert_eq!(ChannelSettings::load_archive(&text).unwrap(), settings);
    }

    #[test]
    fn rejects_malformed_archives() {
        assert!(matches!(
            ChannelSettings::load_archive("1 2"),
            Err(SettingsError::Archive(_))
        ));
        assert!(matches!(
            ChannelSettings::load_archive("1 2 x"),
            Err(SettingsError::Archive(_))
        ));
    }

    #[test]
    fn validation_requires_distinct_assigned_channels() {
        assert_eq!(
            ChannelSettings::default().validate(),
            Err(SettingsError::Unassigned(BusLine::Atn))
        );
        assert_eq!(
            ChannelSettings::new(0, 1, 1).validate(),
            Err(SettingsError::Duplicate {
                channel: 1,
                first: BusLine::Clk,
                second: BusLine::Data,
            })
        );
        assert!(ChannelSettings::new(0, 1, 2).validate().is_ok());
    }

    #[test]
    fn infers_channels_by_name() {
        let capture = capture(&["clk", "Data", "ATN"]);
        let settings = ChannelSettings::from_capture_names(&capture);
        assert_eq!(settings, ChannelSettings::new(2, 0, 1));
        assert!(settings.resolve(&capture).is_ok());
    }

    #[test]
    fn explicit_channels_take_precedence() {
        let inferred = ChannelSettings::new(2, 0, 1);
        let explicit = ChannelSettings {
            atn: Some(7),
            ..ChannelSettings::default()
        };
        assert_eq!(explicit.or(inferred), ChannelSettings::new(7, 0, 1));
    }

    #[test]
    fn resolve_reports_missing_channels() {
        let capture = capture(&["a", "b", "c"]);
        assert_eq!(
            ChannelSettings::new(0, 1, 9).resolve(&capture),
            Err(SettingsError::Missing {
                line: BusLine::Data,
                channel: 9,
            })
        );
    }
}
