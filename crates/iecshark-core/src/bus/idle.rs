use tracing::debug;

use super::frame::BusLine;
use super::lines::BusLines;
use crate::source::{ChannelReader, ReaderError};

/// Fast-forward to a point where decoding can safely start.
///
/// Returns either on an idle bus (all lines high for `window` samples) or
/// on the falling edge of ATN. An ATN-low interval already in progress is
/// skipped, since its command bytes cannot be framed.
pub(crate) fn find_bus_start<R: ChannelReader>(
    lines: &mut BusLines<R>,
    window: u64,
) -> Result<(), ReaderError> {
    if lines.level(BusLine::Atn).is_low() {
        lines.skip_atn_level()?;
    }

    while lines.level(BusLine::Atn).is_high() {
        let levels = lines.levels();
        if levels.clk.is_high() && levels.data.is_high() {
            let horizon = lines.now().saturating_add(window);
            match lines.transition_within(horizon)? {
                None => {
                    debug!("bus idle from sample {}", lines.now());
                    return Ok(());
                }
                Some(edge) => lines.sync(edge)?,
            }
        } else {
            lines.step()?;
        }
    }

    debug!("ATN asserted at sample {}", lines.now());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::find_bus_start;
    use crate::bus::lines::BusLines;
    use crate::bus::session::CancelToken;
    use crate::source::{EdgeChannel, Level};

    fn run(atn: EdgeChannel, clk: EdgeChannel, data: EdgeChannel, window: u64) -> u64 {
        let mut lines =
            BusLines::new(atn.cursor(), clk.cursor(), data.cursor(), CancelToken::new()).unwrap();
        find_bus_start(&mut lines, window).unwrap();
        lines.now()
    }

    #[test]
    fn quiet_start_is_idle_immediately() {
        let atn = EdgeChannel::new(Level::High, vec![500], 1_000).unwrap();
        let clk = EdgeChannel::new(Level::High, vec![], 1_000).unwrap();
        let data = EdgeChannel::new(Level::High, vec![], 1_000).unwrap();
        assert_eq!(run(atn, clk, data, 100), 0);
    }

    #[test]
    fn skips_activity_until_a_full_window() {
        let atn = EdgeChannel::new(Level::High, vec![], 1_000).unwrap();
        let clk = EdgeChannel::new(Level::Low, vec![20, 40, 60, 300, 320], 1_000).unwrap();
        let data = EdgeChannel::new(Level::Low, vec![30, 250, 280], 1_000).unwrap();
        // All-high stretches at 30, 60 and 280 are each cut short.
        assert_eq!(run(atn, clk, data, 300), 320);
    }

    #[test]
    fn stops_on_atn_fall() {
        let atn = EdgeChannel::new(Level::High, vec![70], 1_000).unwrap();
        let clk = EdgeChannel::new(Level::Low, vec![], 1_000).unwrap();
        let data = EdgeChannel::new(Level::Low, vec![], 1_000).unwrap();
        assert_eq!(run(atn, clk, data, 100), 70);
    }

    #[test]
    fn skips_atn_interval_in_progress() {
        let atn = EdgeChannel::new(Level::Low, vec![100], 1_000).unwrap();
        let clk = EdgeChannel::new(Level::Low, vec![90], 1_000).unwrap();
        let data = EdgeChannel::new(Level::Low, vec![95], 1_000).unwrap();
        assert_eq!(run(atn, clk, data, 50), 100);
    }
}
