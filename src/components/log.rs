//! Recorders. Every change of the observed net becomes a `(time, value)`
//! sample in the device's channel, see [`NetlistState::logs`](crate::circuit::NetlistState::logs).

use super::{Device, DeviceBuilder};
use crate::circuit::{AnalogInput, Context, Handler};
use crate::error::Result;

#[derive(Debug)]
pub struct Log {
    input: AnalogInput,
    channel: usize,
}

impl Log {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        Ok(Self {
            input: b.analog_input("I", Handler::DEFAULT),
            channel: b.log_channel(),
        })
    }
}

impl Device for Log {
    fn update(&mut self, ctx: &mut Context<'_>, _handler: Handler) {
        let v = ctx.analog(self.input);
        ctx.log_sample(self.channel, v);
    }
}

/// Records the difference `I - I2`.
#[derive(Debug)]
pub struct LogD {
    input: AnalogInput,
    input2: AnalogInput,
    channel: usize,
}

impl LogD {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        Ok(Self {
            input: b.analog_input("I", Handler::DEFAULT),
            input2: b.analog_input("I2", Handler::DEFAULT),
            channel: b.log_channel(),
        })
    }
}

impl Device for LogD {
    fn update(&mut self, ctx: &mut Context<'_>, _handler: Handler) {
        let v = ctx.analog(self.input) - ctx.analog(self.input2);
        ctx.log_sample(self.channel, v);
    }
}
