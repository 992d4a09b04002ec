//! Lockstep view over the three bus lines.
//!
//! Each [`ChannelReader`] owns its own cursor. `BusLines` keeps them on a
//! common sample: every move goes through [`BusLines::sync`], which advances
//! any reader that is behind. Levels only change on edges, so stepping from
//! edge to edge observes exactly what a per-sample tick would.

use tracing::trace;

use super::frame::BusLine;
use super::session::CancelToken;
use crate::source::{ChannelReader, Level, ReaderError};

/// Levels of all three lines at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BusLevels {
    pub atn: Level,
    pub clk: Level,
    pub data: Level,
}

/// Result of [`BusLines::wait_until`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wait {
    /// The predicate holds at the current sample.
    Reached,
    /// ATN changed level before the predicate held.
    AtnChanged,
}

pub(crate) struct BusLines<R> {
    atn: R,
    clk: R,
    data: R,
    now: u64,
    cancel: CancelToken,
}

impl<R: ChannelReader> BusLines<R> {
    pub fn new(atn: R, clk: R, data: R, cancel: CancelToken) -> Result<Self, ReaderError> {
        let now = atn.sample().max(clk.sample()).max(data.sample());
        let mut lines = Self {
            atn,
            clk,
            data,
            now,
            cancel,
        };
        lines.sync(now)?;
        Ok(lines)
    }

    /// The common cursor.
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn level(&self, line: BusLine) -> Level {
        self.reader(line).level()
    }

    pub fn levels(&self) -> BusLevels {
        BusLevels {
            atn: self.atn.level(),
            clk: self.clk.level(),
            data: self.data.level(),
        }
    }

    fn reader(&self, line: BusLine) -> &R {
        match line {
            BusLine::Atn => &self.atn,
            BusLine::Clk => &self.clk,
            BusLine::Data => &self.data,
        }
    }

    /// Bring every reader that is behind `sample` up to it.
    pub fn sync(&mut self, sample: u64) -> Result<(), ReaderError> {
        if self.cancel.is_cancelled() {
            return Err(ReaderError::Cancelled);
        }
        for reader in [&mut self.atn, &mut self.clk, &mut self.data] {
            if reader.sample() < sample {
                reader.advance_to(sample)?;
            }
        }
        self.now = self.now.max(sample);
        Ok(())
    }

    /// Earliest upcoming transition on any line, `None` once every line
    /// has run out of edges. Other reader failures are passed through.
    fn upcoming_edge(&self) -> Result<Option<u64>, ReaderError> {
        let mut earliest = None;
        for reader in [&self.atn, &self.clk, &self.data] {
            match reader.next_edge_sample() {
                Ok(edge) => earliest = Some(earliest.map_or(edge, |e: u64| e.min(edge))),
                Err(ReaderError::EndOfStream) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(earliest)
    }

    fn next_edge(&self) -> Result<u64, ReaderError> {
        self.upcoming_edge()?.ok_or(ReaderError::EndOfStream)
    }

    /// Move all lines to the next transition on any of them.
    pub fn step(&mut self) -> Result<BusLevels, ReaderError> {
        let edge = self.next_edge()?;
        self.sync(edge)?;
        Ok(self.levels())
    }

    /// Move ATN onto its own next edge, dragging the other lines along.
    pub fn skip_atn_level(&mut self) -> Result<(), ReaderError> {
        self.atn.advance_to_next_edge()?;
        let sample = self.atn.sample();
        self.sync(sample)
    }

    /// Earliest transition in `(now, horizon]` on any line, if one exists.
    pub fn transition_within(&self, horizon: u64) -> Result<Option<u64>, ReaderError> {
        Ok(self.upcoming_edge()?.filter(|&edge| edge <= horizon))
    }

    /// Step edge by edge until `done` holds, watching ATN.
    ///
    /// An ATN change is reported before `done` is evaluated on the same
    /// sample, so callers can treat it as an interruption.
    pub fn wait_until<F>(&mut self, done: F) -> Result<Wait, ReaderError>
    where
        F: Fn(BusLevels) -> bool,
    {
        let atn = self.atn.level();
        let mut levels = self.levels();
        loop {
            if levels.atn != atn {
                trace!("ATN changed at sample {}", self.now);
                return Ok(Wait::AtnChanged);
            }
            if done(levels) {
                return Ok(Wait::Reached);
            }
            levels = self.step()?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BusLines, Wait};
    use crate::bus::frame::BusLine;
    use crate::bus::session::CancelToken;
    use crate::source::{ChannelReader, EdgeChannel, Level, ReaderError};

    fn channels() -> [EdgeChannel; 3] {
        [
            EdgeChannel::new(Level::High, vec![50], 100).unwrap(),
            EdgeChannel::new(Level::High, vec![10, 30], 100).unwrap(),
            EdgeChannel::new(Level::High, vec![20, 40], 100).unwrap(),
        ]
    }

    #[test]
    fn step_visits_every_edge_in_order() {
        let [atn, clk, data] = channels();
        let mut lines =
            BusLines::new(atn.cursor(), clk.cursor(), data.cursor(), CancelToken::new()).unwrap();
        let mut visited = Vec::new();
        while lines.step().is_ok() {
            visited.push(lines.now());
        }
        assert_eq!(visited, vec![10, 20, 30, 40, 50]);
    }

    #[test]
    fn wait_until_reports_levels_coherently() {
        let [atn, clk, data] = channels();
        let mut lines =
            BusLines::new(atn.cursor(), clk.cursor(), data.cursor(), CancelToken::new()).unwrap();
        let wait = lines
            .wait_until(|lv| lv.clk.is_low() && lv.data.is_low())
            .unwrap();
        assert_eq!(wait, Wait::Reached);
        assert_eq!(lines.now(), 20);
        assert_eq!(lines.level(BusLine::Clk), Level::Low);
    }

    #[test]
    fn wait_until_is_interrupted_by_atn() {
        let [atn, clk, data] = channels();
        let mut lines =
            BusLines::new(atn.cursor(), clk.cursor(), data.cursor(), CancelToken::new()).unwrap();
        let wait = lines.wait_until(|_| false).unwrap();
        assert_eq!(wait, Wait::AtnChanged);
        assert_eq!(lines.now(), 50);
    }

    #[test]
    fn wait_until_ends_with_the_stream() {
        let [atn, clk, data] = channels();
        let mut lines =
            BusLines::new(atn.cursor(), clk.cursor(), data.cursor(), CancelToken::new()).unwrap();
        lines.sync(60).unwrap();
        assert_eq!(lines.wait_until(|_| false), Err(ReaderError::EndOfStream));
    }

    #[test]
    fn transition_within_picks_the_earliest_line() {
        let [atn, clk, data] = channels();
        let lines =
            BusLines::new(atn.cursor(), clk.cursor(), data.cursor(), CancelToken::new()).unwrap();
        assert_eq!(lines.transition_within(9), Ok(None));
        assert_eq!(lines.transition_within(25), Ok(Some(10)));
    }

    /// Reader whose peek fails like a disconnected host source.
    struct Unplugged;

    impl ChannelReader for Unplugged {
        fn level(&self) -> Level {
            Level::High
        }

        fn sample(&self) -> u64 {
            0
        }

        fn advance_to(&mut self, _sample: u64) -> Result<(), ReaderError> {
            Ok(())
        }

        fn next_edge_sample(&self) -> Result<u64, ReaderError> {
            Err(ReaderError::Unavailable("source disconnected".to_string()))
        }
    }

    #[test]
    fn peek_failures_are_not_end_of_stream() {
        let mut lines = BusLines::new(Unplugged, Unplugged, Unplugged, CancelToken::new()).unwrap();
        assert!(matches!(
            lines.transition_within(100),
            Err(ReaderError::Unavailable(_))
        ));
        assert!(matches!(lines.step(), Err(ReaderError::Unavailable(_))));
        assert!(matches!(
            lines.wait_until(|_| false),
            Err(ReaderError::Unavailable(_))
        ));
    }

    #[test]
    fn cancellation_stops_movement() {
        let [atn, clk, data] = channels();
        let cancel = CancelToken::new();
        let mut lines =
            BusLines::new(atn.cursor(), clk.cursor(), data.cursor(), cancel.clone()).unwrap();
        cancel.cancel();
        assert_eq!(lines.step(), Err(ReaderError::Cancelled));
    }
}
