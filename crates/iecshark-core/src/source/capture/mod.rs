//! Capture file sources.
//!
//! Two on-disk formats are accepted: a JSON edge list (the native format)
//! and the transition CSV written by logic analyzer "digital export". Both
//! are loaded fully into [`EdgeChannel`](crate::EdgeChannel)s; decoding never
//! touches the file again.

pub mod error;
pub mod layout;
pub mod parser;
pub mod reader;

pub use parser::open_capture;
