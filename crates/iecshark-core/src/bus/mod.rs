//! IEC serial bus decoding.
//!
//! The bus has three open-collector lines, all active low:
//! - ATN: the controller pulls it to send commands (LISTEN, TALK, ...).
//! - CLK: driven by the talker; each rising edge strobes one bit.
//! - DATA: bit values from the talker, ready/acknowledge from the listener.
//!
//! Bytes go LSB first. A talker flags the last byte of a transfer (EOI) by
//! holding the ready phase for 200 µs or more, which the listener answers
//! with a DATA pulse of at least 60 µs.
//!
//! Layout: `lines` keeps three readers in lockstep, `idle` finds a safe
//! starting point, `decoder` handles one byte, `session` runs the loop.

mod decoder;
mod frame;
mod idle;
mod lines;
mod session;
mod timing;

pub use frame::{BusLine, BusPhase, Frame, FrameKind, Marker, MarkerKind, Violation};
pub use session::{CancelToken, DecodeSummary, IecDecoder, MINIMUM_SAMPLE_RATE_HZ, NEEDS_RERUN};
pub use timing::{EOI_ACK_MIN_US, EOI_THRESHOLD_US, IDLE_WINDOW_US, SampleClock};
