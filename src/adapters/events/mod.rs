//! Run-completion event adapters.

pub mod log_sink;

pub use log_sink::{CaptureEventSink, LogEventSink};
