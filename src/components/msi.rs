//! 7483 four bit adder and 9322 quad two input multiplexer.

use super::{Device, DeviceBuilder};
use crate::circuit::{AnalogInput, Context, Handler, LogicInput, LogicOutput};
use crate::error::Result;
use crate::time::NetlistTime;

const CARRY: Handler = Handler(0);
const OPERAND_A: Handler = Handler(1);
const OPERAND_B: Handler = Handler(2);

const SUM_DELAY: NetlistTime = NetlistTime::from_nsec(23);

fn nibble(ctx: &Context<'_>, inputs: &[LogicInput; 4]) -> u32 {
    inputs
        .iter()
        .enumerate()
        .fold(0, |acc, (i, &inp)| acc | ctx.input(inp) << i)
}

/// Adds `A1`..`A4`, `B1`..`B4` and the carry `C0` into `S1`..`S4` and `C4`.
#[derive(Debug)]
pub struct Ttl7483 {
    a: [LogicInput; 4],
    b: [LogicInput; 4],
    c0: LogicInput,
    s: [LogicOutput; 4],
    c4: LogicOutput,
    _vcc: AnalogInput,
    _gnd: AnalogInput,
    lra: u32,
    lrb: u32,
    litc0: u32,
    last: Option<u32>,
}

impl Ttl7483 {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        let a = ["A1", "A2", "A3", "A4"].map(|pin| b.logic_input(pin, OPERAND_A));
        let bb = ["B1", "B2", "B3", "B4"].map(|pin| b.logic_input(pin, OPERAND_B));
        let c0 = b.logic_input("C0", CARRY);
        let s = ["S1", "S2", "S3", "S4"].map(|pin| b.logic_output(pin));
        Ok(Self {
            a,
            b: bb,
            c0,
            s,
            c4: b.logic_output("C4"),
            _vcc: b.analog_input_passive("VCC"),
            _gnd: b.analog_input_passive("GND"),
            lra: 0,
            lrb: 0,
            litc0: 0,
            last: None,
        })
    }
}

impl Device for Ttl7483 {
    fn reset(&mut self, _ctx: &mut Context<'_>) {
        self.lra = 0;
        self.lrb = 0;
        self.litc0 = 0;
        self.last = None;
    }

    fn update(&mut self, ctx: &mut Context<'_>, handler: Handler) {
        match handler {
            CARRY => self.litc0 = ctx.input(self.c0),
            OPERAND_A => self.lra = nibble(ctx, &self.a),
            _ => self.lrb = nibble(ctx, &self.b),
        }
        let r = self.lra + self.lrb + self.litc0;
        if self.last == Some(r) {
            return;
        }
        self.last = Some(r);
        for (i, s) in self.s.iter().enumerate() {
            ctx.push(*s, (r >> i) & 1, SUM_DELAY);
        }
        ctx.push(self.c4, (r >> 4) & 1, SUM_DELAY);
    }
}

const SELECT_DELAY: NetlistTime = NetlistTime::from_nsec(14);
const STROBE_DELAY: NetlistTime = NetlistTime::from_nsec(21);

/// Four two input multiplexers sharing `SELECT` and `STROBE`.
///
/// `SELECT` high routes `Bn` to `Yn`, low routes `An`. `STROBE` high forces
/// every output low.
#[derive(Debug)]
pub struct Ttl9322 {
    a: [LogicInput; 4],
    b: [LogicInput; 4],
    select: LogicInput,
    strobe: LogicInput,
    y: [LogicOutput; 4],
    _vcc: AnalogInput,
    _gnd: AnalogInput,
}

impl Ttl9322 {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        let select = b.logic_input("SELECT", Handler::DEFAULT);
        let strobe = b.logic_input("STROBE", Handler::DEFAULT);
        let a = ["A1", "A2", "A3", "A4"].map(|pin| b.logic_input(pin, Handler::DEFAULT));
        let bb = ["B1", "B2", "B3", "B4"].map(|pin| b.logic_input(pin, Handler::DEFAULT));
        let y = ["Y1", "Y2", "Y3", "Y4"].map(|pin| b.logic_output(pin));
        Ok(Self {
            a,
            b: bb,
            select,
            strobe,
            y,
            _vcc: b.analog_input_passive("VCC"),
            _gnd: b.analog_input_passive("GND"),
        })
    }
}

impl Device for Ttl9322 {
    fn update(&mut self, ctx: &mut Context<'_>, _handler: Handler) {
        if ctx.input(self.strobe) != 0 {
            for y in &self.y {
                ctx.push(*y, 0, STROBE_DELAY);
            }
            return;
        }
        let sources = if ctx.input(self.select) != 0 { &self.b } else { &self.a };
        for (y, &src) in self.y.iter().zip(sources) {
            let v = ctx.input(src);
            ctx.push(*y, v, SELECT_DELAY);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::load;
    use crate::netlist::Netlist;

    fn read(nl: &Netlist, pins: &[&str]) -> u32 {
        pins.iter()
            .enumerate()
            .map(|(i, p)| nl.logic_value(&format!("U1.{}", p)).unwrap() << i)
            .sum()
    }

    fn set(nl: &mut Netlist, input: &str, v: u32) {
        nl.set_param(&format!("{}.IN", input), &v.to_string()).unwrap();
        nl.process_queue(NetlistTime::from_usec(1));
    }

    #[test]
    fn test_7483_adds_with_carry() {
        let mut nl = load(
            "TTL_INPUT(A1, 0)
             TTL_INPUT(A2, 0)
             TTL_INPUT(A3, 0)
             TTL_INPUT(A4, 0)
             TTL_INPUT(B1, 0)
             TTL_INPUT(B4, 0)
             TTL_INPUT(LO, 0)
             TTL_INPUT(C0, 0)
             TTL_7483(U1, A1, A2, A3, A4, B1, LO, LO, B4, C0)",
            None,
        )
        .unwrap();
        nl.reset();
        nl.process_queue(NetlistTime::from_usec(1));
        let sum = |nl: &Netlist| read(nl, &["S1", "S2", "S3", "S4", "C4"]);
        assert_eq!(sum(&nl), 0);

        // 7 + 1
        for a in ["A1", "A2", "A3"] {
            set(&mut nl, a, 1);
        }
        set(&mut nl, "B1", 1);
        assert_eq!(sum(&nl), 8);

        // 15 + 9 + 1 overflows into C4
        set(&mut nl, "A4", 1);
        set(&mut nl, "B4", 1);
        set(&mut nl, "C0", 1);
        assert_eq!(sum(&nl), 25);
    }

    #[test]
    fn test_9322_selects_and_strobes() {
        let mut nl = load(
            "TTL_INPUT(SEL, 0)
             TTL_INPUT(STB, 0)
             TTL_INPUT(HI, 1)
             TTL_INPUT(LO, 0)
             TTL_9322(U1, SEL, HI, LO, LO, HI, HI, HI, LO, LO, STB)",
            None,
        )
        .unwrap();
        nl.reset();
        nl.process_queue(NetlistTime::from_usec(1));
        let y = |nl: &Netlist| read(nl, &["Y1", "Y2", "Y3", "Y4"]);
        assert_eq!(y(&nl), 0b0101);

        set(&mut nl, "SEL", 1);
        assert_eq!(y(&nl), 0b0110);

        set(&mut nl, "STB", 1);
        assert_eq!(y(&nl), 0);
        set(&mut nl, "STB", 0);
        assert_eq!(y(&nl), 0b0110);
    }
}
