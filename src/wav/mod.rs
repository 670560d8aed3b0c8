//! Output back ends for recorded channels.
//!
//! Logged channels are text streams of `time value` lines. [`merge_logs`]
//! replays several of them in time order into a [`SampleSink`]; the sinks
//! write WAV ([`WavSink`], usually behind an [`Aggregator`]), VCD
//! ([`VcdWriter`]) or sampled tables ([`TabWriter`]).

mod aggregator;
mod logfile;
mod tab;
mod vcd;
mod writer;

pub use aggregator::Aggregator;
pub use logfile::{merge_logs, write_log};
pub use tab::TabWriter;
pub use vcd::{VcdFormat, VcdWriter};
pub use writer::{WavSink, WavWriter};

use crate::error::Result;

/// Receives samples as `(channel, time in seconds, value)`.
pub trait SampleSink {
    fn process(&mut self, chan: usize, time: f64, value: f64) -> Result<()>;
}
