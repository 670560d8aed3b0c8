//! 74174 hex D flip-flop with common clear.

use super::{Device, DeviceBuilder};
use crate::circuit::{AnalogInput, Context, Handler, LogicInput, LogicOutput, TerminalState};
use crate::error::Result;
use crate::time::NetlistTime;

const DATA: Handler = Handler(0);
const CLOCK: Handler = Handler(1);

const CLEAR_DELAY: NetlistTime = NetlistTime::from_nsec(40);
const CLOCK_DELAY: NetlistTime = NetlistTime::from_nsec(25);

/// `D1`..`D6` are stored into `Q1`..`Q6` on the rising edge of `CLK`.
/// `CLRQ` low clears all outputs.
///
/// The clock input is only listened to while the data differs from what
/// was last stored.
#[derive(Debug)]
pub struct Ttl74174 {
    clk: LogicInput,
    d: [LogicInput; 6],
    clrq: LogicInput,
    q: [LogicOutput; 6],
    _vcc: AnalogInput,
    _gnd: AnalogInput,
    cleared: bool,
    data: u32,
}

impl Ttl74174 {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        let clk = b.logic_input("CLK", CLOCK);
        let q = ["Q1", "Q2", "Q3", "Q4", "Q5", "Q6"].map(|pin| b.logic_output(pin));
        let d = ["D1", "D2", "D3", "D4", "D5", "D6"].map(|pin| b.logic_input(pin, DATA));
        let clrq = b.logic_input("CLRQ", DATA);
        Ok(Self {
            clk,
            d,
            clrq,
            q,
            _vcc: b.analog_input_passive("VCC"),
            _gnd: b.analog_input_passive("GND"),
            cleared: true,
            data: 0xff,
        })
    }
}

impl Device for Ttl74174 {
    fn reset(&mut self, ctx: &mut Context<'_>) {
        ctx.set_state(self.clk, TerminalState::InputLh);
        self.cleared = true;
        self.data = 0xff;
    }

    fn update(&mut self, ctx: &mut Context<'_>, handler: Handler) {
        if handler == CLOCK {
            if !self.cleared {
                for (i, q) in self.q.iter().enumerate() {
                    ctx.push(*q, (self.data >> i) & 1, CLOCK_DELAY);
                }
                ctx.inactivate(self.clk);
            }
            return;
        }
        let d = self
            .d
            .iter()
            .enumerate()
            .fold(0, |acc, (i, &d)| acc | ctx.input(d) << i);
        self.cleared = ctx.input(self.clrq) == 0;
        if self.cleared {
            for q in &self.q {
                ctx.push(*q, 0, CLEAR_DELAY);
            }
            self.data = 0;
        } else if d != self.data {
            self.data = d;
            ctx.activate_lh(self.clk);
        }
    }
}
