use thiserror::Error;

use super::channel::{ChannelReader, Level, ReaderError};

/// Run-length representation of one captured channel.
///
/// The channel starts at `initial` on sample 0 and toggles at every sample
/// listed in `edges`. Valid sample indices are `0..len`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeChannel {
    initial: Level,
    edges: Vec<u64>,
    len: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EdgeError {
    #[error("capture has no samples")]
    Empty,
    #[error("edge at sample {sample} is not after the previous edge")]
    Unordered { sample: u64 },
    #[error("edge at sample {sample} is outside the capture (0..{len})")]
    OutOfRange { sample: u64, len: u64 },
}

impl EdgeChannel {
    /// Build a channel, validating that edges are strictly increasing and
    /// lie inside the capture. An edge at sample 0 is rejected: the level at
    /// sample 0 is `initial` by definition.
    pub fn new(initial: Level, edges: Vec<u64>, len: u64) -> Result<Self, EdgeError> {
        if len == 0 {
            return Err(EdgeError::Empty);
        }
        let mut previous = 0u64;
        for &sample in &edges {
            if sample <= previous {
                return Err(EdgeError::Unordered { sample });
            }
            if sample >= len {
                return Err(EdgeError::OutOfRange { sample, len });
            }
            previous = sample;
        }
        Ok(Self {
            initial,
            edges,
            len,
        })
    }

    /// Build a channel from per-sample levels, keeping only the transitions.
    pub fn from_levels<I>(levels: I) -> Result<Self, EdgeError>
    where
        I: IntoIterator<Item = Level>,
    {
        let mut iter = levels.into_iter();
        let initial = iter.next().ok_or(EdgeError::Empty)?;
        let mut edges = Vec::new();
        let mut current = initial;
        let mut len = 1u64;
        for level in iter {
            if level != current {
                edges.push(len);
                current = level;
            }
            len += 1;
        }
        Self::new(initial, edges, len)
    }

    pub fn initial(&self) -> Level {
        self.initial
    }

    pub fn edges(&self) -> &[u64] {
        &self.edges
    }

    /// Number of samples in the channel.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Level at an arbitrary sample (clamped to the last sample).
    pub fn level_at(&self, sample: u64) -> Level {
        let toggles = self.edges.partition_point(|&edge| edge <= sample);
        level_after(self.initial, toggles)
    }

    /// A reader positioned on sample 0.
    pub fn cursor(&self) -> EdgeCursor<'_> {
        EdgeCursor {
            channel: self,
            position: 0,
            passed: 0,
        }
    }
}

fn level_after(initial: Level, toggles: usize) -> Level {
    if toggles % 2 == 0 {
        initial
    } else {
        initial.toggled()
    }
}

/// Cursor over an [`EdgeChannel`].
#[derive(Debug, Clone)]
pub struct EdgeCursor<'a> {
    channel: &'a EdgeChannel,
    position: u64,
    /// Number of edges at or before `position`.
    passed: usize,
}

impl ChannelReader for EdgeCursor<'_> {
    fn level(&self) -> Level {
        level_after(self.channel.initial, self.passed)
    }

    fn sample(&self) -> u64 {
        self.position
    }

    fn advance_to(&mut self, sample: u64) -> Result<(), ReaderError> {
        if sample <= self.position {
            return Ok(());
        }
        if sample >= self.channel.len {
            return Err(ReaderError::EndOfStream);
        }
        let edges = &self.channel.edges;
        while self.passed < edges.len() && edges[self.passed] <= sample {
            self.passed += 1;
        }
        self.position = sample;
        Ok(())
    }

    fn next_edge_sample(&self) -> Result<u64, ReaderError> {
        self.channel
            .edges
            .get(self.passed)
            .copied()
            .ok_or(ReaderError::EndOfStream)
    }
}
