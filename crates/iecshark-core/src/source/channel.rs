use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Logic level of one bus line.
///
/// IEC lines are open collector and active low: `High` is the released
/// (idle) state, `Low` means some device pulls the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn is_low(self) -> bool {
        self == Level::Low
    }

    pub fn is_high(self) -> bool {
        self == Level::High
    }

    /// The opposite level.
    pub fn toggled(self) -> Self {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }

    pub fn from_bit(bit: bool) -> Self {
        if bit { Level::High } else { Level::Low }
    }
}

/// Why a channel reader stopped moving.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReaderError {
    #[error("end of sample stream")]
    EndOfStream,
    #[error("decode cancelled by host")]
    Cancelled,
    #[error("channel unavailable: {0}")]
    Unavailable(String),
}

/// Sample access to a single captured channel.
///
/// Readers own an independent cursor. Callers decoding several channels
/// together are responsible for keeping the cursors aligned.
///
/// # Examples
/// ```
/// use iecshark_core::{ChannelReader, EdgeChannel, Level};
///
/// let channel = EdgeChannel::new(Level::High, vec![10, 20], 30).unwrap();
/// let mut cursor = channel.cursor();
/// assert!(cursor.would_transition_by(10));
/// cursor.advance_to_next_edge().unwrap();
/// assert_eq!(cursor.sample(), 10);
/// assert_eq!(cursor.level(), Level::Low);
/// ```
pub trait ChannelReader {
    /// Level at the cursor.
    fn level(&self) -> Level;

    /// Current cursor position.
    fn sample(&self) -> u64;

    /// Move the cursor to the absolute sample `sample`.
    ///
    /// Positions behind the cursor are ignored. Moving past the last
    /// available sample fails with [`ReaderError::EndOfStream`].
    fn advance_to(&mut self, sample: u64) -> Result<(), ReaderError>;

    /// Sample of the next transition after the cursor, without moving.
    fn next_edge_sample(&self) -> Result<u64, ReaderError>;

    /// Move the cursor forward by `count` samples.
    fn advance(&mut self, count: u64) -> Result<(), ReaderError> {
        self.advance_to(self.sample().saturating_add(count))
    }

    /// Move the cursor onto the next transition; the level flips.
    fn advance_to_next_edge(&mut self) -> Result<(), ReaderError> {
        let edge = self.next_edge_sample()?;
        self.advance_to(edge)
    }

    /// True iff a transition lies in `(cursor, sample]`.
    fn would_transition_by(&self, sample: u64) -> bool {
        self.next_edge_sample()
            .map(|edge| edge <= sample)
            .unwrap_or(false)
    }
}
