use serde::{Deserialize, Serialize};

/// The three IEC bus lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusLine {
    Atn,
    Clk,
    Data,
}

impl BusLine {
    pub fn name(self) -> &'static str {
        match self {
            BusLine::Atn => "ATN",
            BusLine::Clk => "CLK",
            BusLine::Data => "DATA",
        }
    }
}

/// Frame type, with the numeric ids used in persisted captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    Default,
    CommandStart,
    Eoi,
    Data,
}

impl FrameKind {
    pub fn wire_id(self) -> u8 {
        match self {
            FrameKind::Default => 0,
            FrameKind::CommandStart => 1,
            FrameKind::Eoi => 2,
            FrameKind::Data => 3,
        }
    }

    pub fn from_wire(id: u8) -> Option<Self> {
        match id {
            0 => Some(FrameKind::Default),
            1 => Some(FrameKind::CommandStart),
            2 => Some(FrameKind::Eoi),
            3 => Some(FrameKind::Data),
            _ => None,
        }
    }
}

/// Whether a byte travelled under ATN (a bus command) or as plain data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusPhase {
    Command,
    Data,
}

/// A decoded frame covering the inclusive range `start_sample..=end_sample`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    /// Set for `Data` frames only.
    pub phase: Option<BusPhase>,
    /// Set for `Data` frames only.
    pub payload: Option<u8>,
    pub start_sample: u64,
    pub end_sample: u64,
}

impl Frame {
    pub fn command_start(start_sample: u64, end_sample: u64) -> Self {
        Self {
            kind: FrameKind::CommandStart,
            phase: None,
            payload: None,
            start_sample,
            end_sample,
        }
    }

    pub fn eoi(start_sample: u64, end_sample: u64) -> Self {
        Self {
            kind: FrameKind::Eoi,
            phase: None,
            payload: None,
            start_sample,
            end_sample,
        }
    }

    pub fn data(phase: BusPhase, value: u8, start_sample: u64, end_sample: u64) -> Self {
        Self {
            kind: FrameKind::Data,
            phase: Some(phase),
            payload: Some(value),
            start_sample,
            end_sample,
        }
    }

    /// Short display label, e.g. `ATN`, `EOI`, `CMD 0x28`, `0x41`.
    pub fn label(&self) -> String {
        match (self.kind, self.payload) {
            (FrameKind::CommandStart, _) => "ATN".to_string(),
            (FrameKind::Eoi, _) => "EOI".to_string(),
            (FrameKind::Data, Some(value)) if self.phase == Some(BusPhase::Command) => {
                format!("CMD 0x{value:02X}")
            }
            (FrameKind::Data, Some(value)) => format!("0x{value:02X}"),
            _ => String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    One,
    Zero,
    ByteStart,
    ByteEnd,
    ErrorX,
}

/// Single-sample annotation on one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub sample: u64,
    pub kind: MarkerKind,
    pub line: BusLine,
}

impl Marker {
    pub fn new(sample: u64, kind: MarkerKind, line: BusLine) -> Self {
        Self { sample, kind, line }
    }
}

/// Protocol violations the decoder reports instead of aborting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Violation {
    /// ATN released while a command phase still required it.
    AtnDiscipline,
    /// EOI signalled while ATN was asserted.
    EoiInCommand,
    /// EOI acknowledge missing, too short, or overlapping the talker.
    MalformedEoi,
    /// CLK released while waiting for the listener to acknowledge a byte.
    ListenerAck,
}

impl Violation {
    /// Stable identifier used in reports.
    pub fn id(self) -> &'static str {
        match self {
            Violation::AtnDiscipline => "IEC-ATN-DISCIPLINE",
            Violation::EoiInCommand => "IEC-EOI-IN-COMMAND",
            Violation::MalformedEoi => "IEC-EOI-HANDSHAKE",
            Violation::ListenerAck => "IEC-LISTENER-ACK",
        }
    }

    /// The line the violation is marked on.
    pub fn line(self) -> BusLine {
        match self {
            Violation::AtnDiscipline => BusLine::Atn,
            Violation::EoiInCommand => BusLine::Clk,
            Violation::MalformedEoi => BusLine::Data,
            Violation::ListenerAck => BusLine::Clk,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Violation::AtnDiscipline => "ATN released during command phase",
            Violation::EoiInCommand => "EOI signalled while ATN is asserted",
            Violation::MalformedEoi => "malformed EOI acknowledge handshake",
            Violation::ListenerAck => "CLK released before listener acknowledged byte",
        }
    }
}
