//! Counters.
//!
//! - CD4020 / CD4024 ripple carry binary counters. The counter advances on
//!   the falling edge of `IP`. `RESET` high clears it and stops listening
//!   to `IP` until released.
//! - 7490 decade, 7492 divide by twelve and 7493 binary ripple counters,
//!   falling edge clocked.
//! - 74193 synchronous up/down counter with load, clear, carry and borrow.

use super::{Device, DeviceBuilder};
use crate::circuit::{AnalogInput, Context, Handler, LogicInput, LogicOutput, Signal, TerminalState};
use crate::error::Result;
use crate::time::NetlistTime;

const INPUT_PULSE: Handler = Handler(0);
const RESET: Handler = Handler(1);

const RESET_DELAY: NetlistTime = NetlistTime::from_nsec(140);

/// Delay of output `i`: every stage adds 100 ns to the ripple.
fn stage_delay(i: usize) -> NetlistTime {
    NetlistTime::from_nsec(180 + 100 * i as i64)
}

#[derive(Debug)]
pub struct Cd4020 {
    ip: LogicInput,
    reset: LogicInput,
    /// Only stages present on the package have an output
    q: Vec<Option<LogicOutput>>,
    _vdd: AnalogInput,
    _vss: AnalogInput,
    cnt: u32,
}

impl Cd4020 {
    /// 14 stages, Q2 and Q3 are not bonded out.
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        Self::with_stages(b, 14, 0x3ff9)
    }

    /// 7 stages, all bonded out.
    pub fn cd4024(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        Self::with_stages(b, 7, 0x7f)
    }

    fn with_stages(b: &mut DeviceBuilder<'_>, bits: usize, live: u32) -> Result<Self> {
        let model = b.param_model("MODEL", "CD4XXX")?;
        let family = b.family(b.value_str(model))?;
        b.set_family(family);
        let ip = b.logic_input("IP", INPUT_PULSE);
        let reset = b.logic_input("RESET", RESET);
        let q = (0..bits)
            .map(|i| (live >> i & 1 != 0).then(|| b.logic_output(&format!("Q{}", i + 1))))
            .collect();
        Ok(Self {
            ip,
            reset,
            q,
            _vdd: b.analog_input_passive("VDD"),
            _vss: b.analog_input_passive("VSS"),
            cnt: 0,
        })
    }

    fn update_outputs(&self, ctx: &mut Context<'_>) {
        for (i, q) in self.q.iter().enumerate() {
            if let Some(q) = *q {
                ctx.push(q, (self.cnt >> i) & 1, stage_delay(i));
            }
        }
    }
}

impl Device for Cd4020 {
    fn reset(&mut self, ctx: &mut Context<'_>) {
        ctx.set_state(self.ip, TerminalState::InputHl);
        self.cnt = 0;
    }

    fn update(&mut self, ctx: &mut Context<'_>, handler: Handler) {
        match handler {
            INPUT_PULSE => {
                self.cnt = self.cnt.wrapping_add(1);
                self.update_outputs(ctx);
            }
            _ if ctx.input(self.reset) != 0 => {
                self.cnt = 0;
                ctx.inactivate(self.ip);
                for q in self.q.iter().flatten() {
                    ctx.push(*q, 0, RESET_DELAY);
                }
            }
            _ => ctx.activate_hl(self.ip),
        }
    }
}

/// Outputs `QA`..`QD` plus the TTL supply pins.
fn ttl_outputs(b: &mut DeviceBuilder<'_>) -> ([LogicOutput; 4], AnalogInput, AnalogInput) {
    let q = ["QA", "QB", "QC", "QD"].map(|pin| b.logic_output(pin));
    (q, b.analog_input_passive("VCC"), b.analog_input_passive("GND"))
}

fn push_count(ctx: &mut Context<'_>, q: &[LogicOutput; 4], cnt: u32, delay: &[NetlistTime; 4]) {
    for (i, o) in q.iter().enumerate() {
        ctx.push(*o, (cnt >> i) & 1, delay[i]);
    }
}

/// Ripple delay of the 7490 outputs, counted from the clocking edge.
const TTL7490_DELAY: [NetlistTime; 4] = [
    NetlistTime::from_nsec(18),
    NetlistTime::from_nsec(18),
    NetlistTime::from_nsec(36),
    NetlistTime::from_nsec(54),
];

/// Divide by five: `QB`..`QD` count 0 to 4.
fn decade_step(cnt: u32) -> u32 {
    let c = cnt + 2;
    if c >= 10 {
        // QA is not part of this stage
        c & 1
    } else {
        c
    }
}

/// Divide by six: `QB`..`QD` run 0, 1, 2, 4, 5, 6.
fn div12_step(cnt: u32) -> u32 {
    match cnt + 2 {
        6 => 8,
        14 => 0,
        c => c,
    }
}

/// 7490 decade and 7492 divide by twelve counters.
///
/// A divide by two stage clocked by `A` drives `QA`, the second stage is
/// clocked by `B`. Wiring `QA` to `B` counts the full cycle. `R1`/`R2`
/// both high clear, on the 7490 `R91`/`R92` both high set 9.
#[derive(Debug)]
pub struct Ttl7490 {
    a: LogicInput,
    b: LogicInput,
    r1: LogicInput,
    r2: LogicInput,
    r9: Option<[LogicInput; 2]>,
    step: fn(u32) -> u32,
    q: [LogicOutput; 4],
    _vcc: AnalogInput,
    _gnd: AnalogInput,
    cnt: u32,
    last_a: Signal,
    last_b: Signal,
}

impl Ttl7490 {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        let mut dev = Self::with_step(b, decade_step)?;
        dev.r9 = Some(["R91", "R92"].map(|pin| b.logic_input(pin, Handler::DEFAULT)));
        Ok(dev)
    }

    pub fn ttl7492(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        Self::with_step(b, div12_step)
    }

    fn with_step(b: &mut DeviceBuilder<'_>, step: fn(u32) -> u32) -> Result<Self> {
        let a = b.logic_input("A", Handler::DEFAULT);
        let clk_b = b.logic_input("B", Handler::DEFAULT);
        let r1 = b.logic_input("R1", Handler::DEFAULT);
        let r2 = b.logic_input("R2", Handler::DEFAULT);
        let (q, _vcc, _gnd) = ttl_outputs(b);
        Ok(Self {
            a,
            b: clk_b,
            r1,
            r2,
            r9: None,
            step,
            q,
            _vcc,
            _gnd,
            cnt: 0,
            last_a: 0,
            last_b: 0,
        })
    }
}

impl Device for Ttl7490 {
    fn reset(&mut self, _ctx: &mut Context<'_>) {
        self.cnt = 0;
        self.last_a = 0;
        self.last_b = 0;
    }

    fn update(&mut self, ctx: &mut Context<'_>, _handler: Handler) {
        let new_a = ctx.input(self.a);
        let new_b = ctx.input(self.b);
        let set9 = self.r9.map_or(false, |[r91, r92]| ctx.input(r91) & ctx.input(r92) != 0);
        if set9 {
            self.cnt = 9;
            push_count(ctx, &self.q, self.cnt, &TTL7490_DELAY);
        } else if ctx.input(self.r1) & ctx.input(self.r2) != 0 {
            self.cnt = 0;
            push_count(ctx, &self.q, self.cnt, &TTL7490_DELAY);
        } else {
            if self.last_a != 0 && new_a == 0 {
                self.cnt ^= 1;
                ctx.push(self.q[0], self.cnt & 1, TTL7490_DELAY[0]);
            }
            if self.last_b != 0 && new_b == 0 {
                self.cnt = (self.step)(self.cnt);
                push_count(ctx, &self.q, self.cnt, &TTL7490_DELAY);
            }
        }
        self.last_a = new_a;
        self.last_b = new_b;
    }
}

const TTL7493_RESET: Handler = Handler(0);
const TTL7493_CLKA: Handler = Handler(1);
const TTL7493_CLKB: Handler = Handler(2);

const TTL7493_RESET_DELAY: NetlistTime = NetlistTime::from_nsec(40);

/// 7493 4 bit binary counter: a divide by two stage on `CLKA` driving
/// `QA` and a divide by eight stage on `CLKB` driving `QB`..`QD`. `R1`
/// and `R2` both high clear and stop the clocks.
#[derive(Debug)]
pub struct Ttl7493 {
    r1: LogicInput,
    r2: LogicInput,
    clka: LogicInput,
    clkb: LogicInput,
    q: [LogicOutput; 4],
    _vcc: AnalogInput,
    _gnd: AnalogInput,
    a: u32,
    bcd: u32,
}

impl Ttl7493 {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        let r1 = b.logic_input("R1", TTL7493_RESET);
        let r2 = b.logic_input("R2", TTL7493_RESET);
        let clka = b.logic_input("CLKA", TTL7493_CLKA);
        let clkb = b.logic_input("CLKB", TTL7493_CLKB);
        let (q, _vcc, _gnd) = ttl_outputs(b);
        Ok(Self {
            r1,
            r2,
            clka,
            clkb,
            q,
            _vcc,
            _gnd,
            a: 0,
            bcd: 0,
        })
    }
}

impl Device for Ttl7493 {
    fn reset(&mut self, ctx: &mut Context<'_>) {
        self.a = 0;
        self.bcd = 0;
        ctx.set_state(self.clka, TerminalState::InputHl);
        ctx.set_state(self.clkb, TerminalState::InputHl);
    }

    fn update(&mut self, ctx: &mut Context<'_>, handler: Handler) {
        match handler {
            TTL7493_CLKA => {
                self.a ^= 1;
                ctx.push(self.q[0], self.a, NetlistTime::from_nsec(18));
            }
            TTL7493_CLKB => {
                self.bcd = (self.bcd + 1) & 0x07;
                for i in (0..3).rev() {
                    let delay = NetlistTime::from_nsec(18 * (i as i64 + 1));
                    ctx.push(self.q[i + 1], (self.bcd >> i) & 1, delay);
                }
            }
            _ if ctx.input(self.r1) != 0 && ctx.input(self.r2) != 0 => {
                ctx.inactivate(self.clka);
                ctx.inactivate(self.clkb);
                for q in &self.q {
                    ctx.push(*q, 0, TTL7493_RESET_DELAY);
                }
                self.a = 0;
                self.bcd = 0;
            }
            _ => {
                ctx.activate_hl(self.clka);
                ctx.activate_hl(self.clkb);
            }
        }
    }
}

const TTL74193_MAX: u32 = 15;
const TTL74193_DELAY: [NetlistTime; 4] = [NetlistTime::from_nsec(40); 4];
const TTL74193_FLAG_DELAY: NetlistTime = NetlistTime::from_nsec(20);

/// 74193 synchronous 4 bit up/down counter.
///
/// Counts up on the rising edge of `CU` while `CD` is high, down on the
/// rising edge of `CD` while `CU` is high. `CLEAR` high clears, `LOADQ`
/// low loads `D`..`A`. `CARRYQ` goes low while `CU` is low at 15,
/// `BORROWQ` while `CD` is low at 0.
#[derive(Debug)]
pub struct Ttl74193 {
    data: [LogicInput; 4],
    clear: LogicInput,
    loadq: LogicInput,
    cu: LogicInput,
    cd: LogicInput,
    q: [LogicOutput; 4],
    borrowq: LogicOutput,
    carryq: LogicOutput,
    _vcc: AnalogInput,
    _gnd: AnalogInput,
    cnt: u32,
    last_cu: Signal,
    last_cd: Signal,
}

impl Ttl74193 {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        let data = ["A", "B", "C", "D"].map(|pin| b.logic_input(pin, Handler::DEFAULT));
        let clear = b.logic_input("CLEAR", Handler::DEFAULT);
        let loadq = b.logic_input("LOADQ", Handler::DEFAULT);
        let cu = b.logic_input("CU", Handler::DEFAULT);
        let cd = b.logic_input("CD", Handler::DEFAULT);
        let (q, _vcc, _gnd) = ttl_outputs(b);
        Ok(Self {
            data,
            clear,
            loadq,
            cu,
            cd,
            q,
            borrowq: b.logic_output("BORROWQ"),
            carryq: b.logic_output("CARRYQ"),
            _vcc,
            _gnd,
            cnt: 0,
            last_cu: 0,
            last_cd: 0,
        })
    }
}

impl Device for Ttl74193 {
    fn reset(&mut self, _ctx: &mut Context<'_>) {
        self.cnt = 0;
        self.last_cu = 0;
        self.last_cd = 0;
    }

    fn update(&mut self, ctx: &mut Context<'_>, _handler: Handler) {
        let cu = ctx.input(self.cu);
        let cd = ctx.input(self.cd);
        if ctx.input(self.clear) != 0 {
            self.cnt = 0;
        } else if ctx.input(self.loadq) == 0 {
            self.cnt = self
                .data
                .iter()
                .enumerate()
                .fold(0, |acc, (i, &d)| acc | ctx.input(d) << i);
        } else {
            if cd != 0 && self.last_cu == 0 && cu != 0 {
                self.cnt = (self.cnt + 1) & TTL74193_MAX;
            }
            if cu != 0 && self.last_cd == 0 && cd != 0 {
                self.cnt = self.cnt.checked_sub(1).unwrap_or(TTL74193_MAX);
            }
        }
        let carry = Signal::from(!(cu == 0 && self.cnt == TTL74193_MAX));
        let borrow = Signal::from(!(cd == 0 && self.cnt == 0));
        self.last_cu = cu;
        self.last_cd = cd;

        push_count(ctx, &self.q, self.cnt, &TTL74193_DELAY);
        ctx.push(self.borrowq, borrow, TTL74193_FLAG_DELAY);
        ctx.push(self.carryq, carry, TTL74193_FLAG_DELAY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::tests::build;
    use crate::dsl::load;
    use crate::netlist::Netlist;

    fn count(nl: &Netlist, dev: &str) -> u32 {
        ["QA", "QB", "QC", "QD"]
            .iter()
            .enumerate()
            .map(|(i, q)| nl.logic_value(&format!("{}.{}", dev, q)).unwrap() << i)
            .sum()
    }

    fn pulse(nl: &mut Netlist, input: &str, n: usize) {
        for _ in 0..n {
            nl.set_param(input, "1").unwrap();
            nl.process_queue(NetlistTime::from_usec(1));
            nl.set_param(input, "0").unwrap();
            nl.process_queue(NetlistTime::from_usec(1));
        }
    }

    #[test]
    fn test_7490_counts_decades() {
        let mut nl = load(
            "TTL_INPUT(CLK, 0)
             TTL_INPUT(LO, 0)
             TTL_INPUT(SET9, 0)
             TTL_7490(U1, CLK, U1.QA, LO, LO, SET9, SET9)",
            None,
        )
        .unwrap();
        nl.reset();
        nl.process_queue(NetlistTime::from_usec(1));
        assert_eq!(count(&nl, "U1"), 0);

        pulse(&mut nl, "CLK.IN", 7);
        assert_eq!(count(&nl, "U1"), 7);
        pulse(&mut nl, "CLK.IN", 5);
        assert_eq!(count(&nl, "U1"), 2);

        nl.set_param("SET9.IN", "1").unwrap();
        nl.process_queue(NetlistTime::from_usec(1));
        assert_eq!(count(&nl, "U1"), 9);
    }

    #[test]
    fn test_7492_divides_by_twelve() {
        let mut nl = load(
            "TTL_INPUT(CLK, 0)
             TTL_INPUT(R, 0)
             TTL_7492(U1, CLK, U1.QA, R, R)",
            None,
        )
        .unwrap();
        nl.reset();
        nl.process_queue(NetlistTime::from_usec(1));

        let mut seen = Vec::new();
        for _ in 0..12 {
            pulse(&mut nl, "CLK.IN", 1);
            seen.push(count(&nl, "U1"));
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5, 8, 9, 10, 11, 12, 13, 0]);

        nl.set_param("R.IN", "1").unwrap();
        nl.process_queue(NetlistTime::from_usec(1));
        assert_eq!(count(&nl, "U1"), 0);
    }

    #[test]
    fn test_7493_counts_and_clears() {
        let mut nl = load(
            "TTL_INPUT(CLK, 0)
             TTL_INPUT(R, 0)
             TTL_7493(U1, CLK, U1.QA, R, R)",
            None,
        )
        .unwrap();
        nl.reset();
        nl.process_queue(NetlistTime::from_usec(1));
        // startup runs both clock handlers once
        let start = count(&nl, "U1");

        pulse(&mut nl, "CLK.IN", 9);
        assert_eq!(count(&nl, "U1"), (start + 9) % 16);
        pulse(&mut nl, "CLK.IN", 12);
        assert_eq!(count(&nl, "U1"), (start + 21) % 16);

        // clocks are ignored while held in reset
        nl.set_param("R.IN", "1").unwrap();
        pulse(&mut nl, "CLK.IN", 3);
        assert_eq!(count(&nl, "U1"), 0);
        nl.set_param("R.IN", "0").unwrap();
        pulse(&mut nl, "CLK.IN", 3);
        assert_eq!(count(&nl, "U1"), 3);
    }

    #[test]
    fn test_74193_up_down_load() {
        let mut nl = load(
            "TTL_INPUT(CLR, 0)
             TTL_INPUT(LD, 0)
             TTL_INPUT(UP, 1)
             TTL_INPUT(DN, 1)
             TTL_74193(U1, LO, LO, LO, LO, CLR, LD, UP, DN)
             TTL_INPUT(LO, 0)",
            None,
        )
        .unwrap();
        nl.reset();
        nl.process_queue(NetlistTime::from_usec(1));
        nl.set_param("LD.IN", "1").unwrap();
        nl.process_queue(NetlistTime::from_usec(1));
        assert_eq!(count(&nl, "U1"), 0);

        // the counters clock on the rising edge, so pulse low then high
        for _ in 0..3 {
            nl.set_param("UP.IN", "0").unwrap();
            nl.process_queue(NetlistTime::from_usec(1));
            nl.set_param("UP.IN", "1").unwrap();
            nl.process_queue(NetlistTime::from_usec(1));
        }
        assert_eq!(count(&nl, "U1"), 3);

        nl.set_param("DN.IN", "0").unwrap();
        nl.process_queue(NetlistTime::from_usec(1));
        nl.set_param("DN.IN", "1").unwrap();
        nl.process_queue(NetlistTime::from_usec(1));
        assert_eq!(count(&nl, "U1"), 2);

        nl.set_param("CLR.IN", "1").unwrap();
        nl.process_queue(NetlistTime::from_usec(1));
        assert_eq!(count(&nl, "U1"), 0);
        nl.set_param("CLR.IN", "0").unwrap();

        // down from zero wraps and flags a borrow while CD is low
        nl.set_param("DN.IN", "0").unwrap();
        nl.process_queue(NetlistTime::from_usec(1));
        assert_eq!(nl.logic_value("U1.BORROWQ"), Some(0));
        nl.set_param("DN.IN", "1").unwrap();
        nl.process_queue(NetlistTime::from_usec(1));
        assert_eq!(count(&nl, "U1"), 15);
        assert_eq!(nl.logic_value("U1.BORROWQ"), Some(1));

        nl.set_param("UP.IN", "0").unwrap();
        nl.process_queue(NetlistTime::from_usec(1));
        assert_eq!(nl.logic_value("U1.CARRYQ"), Some(0));
        nl.set_param("UP.IN", "1").unwrap();
        nl.process_queue(NetlistTime::from_usec(1));
        assert_eq!(count(&nl, "U1"), 0);
        assert_eq!(nl.logic_value("U1.CARRYQ"), Some(1));
    }

    #[test]
    fn test_74193_parallel_load() {
        let mut nl = load(
            "TTL_INPUT(HI, 1)
             TTL_INPUT(LO, 0)
             TTL_INPUT(LD, 0)
             TTL_74193(U1, HI, LO, HI, LO, LO, LD, HI, HI)",
            None,
        )
        .unwrap();
        nl.reset();
        nl.process_queue(NetlistTime::from_usec(1));
        assert_eq!(count(&nl, "U1"), 5);
    }

    #[test]
    fn test_cd4020_outputs() {
        let (state, _, _) = build("CD4020", "U1", &[]).unwrap();
        for pin in ["Q1", "Q4", "Q5", "Q14"] {
            assert!(state.find_terminal(&format!("U1.{}", pin)).is_some(), "{}", pin);
        }
        assert!(state.find_terminal("U1.Q2").is_none());
        assert!(state.find_terminal("U1.Q3").is_none());
    }

    #[test]
    fn test_cd4024_outputs() {
        let (state, _, _) = build("CD4024", "U2", &[]).unwrap();
        assert!(state.find_terminal("U2.Q7").is_some());
        assert!(state.find_terminal("U2.Q8").is_none());
    }

    #[test]
    fn test_stage_delays() {
        assert_eq!(stage_delay(0), NetlistTime::from_nsec(180));
        assert_eq!(stage_delay(13), NetlistTime::from_nsec(1480));
    }
}
