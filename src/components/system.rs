//! System devices: clocks, inputs, rails and netlist wide settings.

use log::{debug, warn};

use super::twoterm::TwoTerm;
use super::{Device, DeviceBuilder};
use crate::circuit::{
    AnalogInput, AnalogOutput, Context, Delegate, Handler, LogicInput, LogicOutput, ParamBool, ParamEnum, ParamF64,
    ParamInt, Signal,
};
use crate::error::{NetlistError, Result};
use crate::time::NetlistTime;

const DEFAULT_CLOCK_FREQ: f64 = 7_159_000.0 * 5.0;

/// Free running clock. The output is fed back into `FB`, every edge
/// schedules the next one half a period later.
#[derive(Debug)]
pub struct Clock {
    feedback: LogicInput,
    q: LogicOutput,
    freq: ParamF64,
    inc: NetlistTime,
}

impl Clock {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        let feedback = b.logic_input("FB", Handler::DEFAULT);
        let q = b.logic_output("Q");
        b.connect(feedback.id(), q.id());
        let freq = b.param_f64("FREQ", DEFAULT_CLOCK_FREQ)?;
        let inc = half_period(b.value_f64(freq));
        Ok(Self { feedback, q, freq, inc })
    }
}

fn half_period(freq: f64) -> NetlistTime {
    NetlistTime::from_fp(1.0 / (freq * 2.0))
}

impl Device for Clock {
    fn update_param(&mut self, ctx: &mut Context<'_>) {
        self.inc = half_period(ctx.param_f64(self.freq));
    }

    fn update(&mut self, ctx: &mut Context<'_>, _handler: Handler) {
        let q = ctx.input(self.feedback) ^ 1;
        ctx.push(self.q, q, self.inc);
    }
}

/// Split a full period into the phases given by `pattern`.
///
/// `pattern` is a comma separated list of relative phase lengths. The last
/// phase absorbs rounding so that the phases add up to exactly one period.
pub fn pattern_increments(freq: f64, pattern: &str) -> Result<Vec<NetlistTime>> {
    let base = half_period(freq);
    let pat = pattern
        .split(',')
        .map(|s| {
            s.trim()
                .parse::<i64>()
                .map_err(|_| NetlistError::invalid_parameter("PATTERN", format!("<{}> is not a number", s)))
        })
        .collect::<Result<Vec<_>>>()?;
    if pat.is_empty() || pat.len() > 32 {
        return Err(NetlistError::invalid_parameter("PATTERN", "pattern must have 1 to 32 entries"));
    }
    let total: i64 = pat.iter().sum();
    let mut inc: Vec<NetlistTime> = pat[..pat.len() - 1].iter().map(|&p| base * p).collect();
    let sum = inc.iter().fold(NetlistTime::zero(), |acc, &t| acc + t);
    inc.push(base * total - sum);
    Ok(inc)
}

/// Clock with an arbitrary duty pattern and start offset.
#[derive(Debug)]
pub struct ExtClock {
    feedback: LogicInput,
    q: LogicOutput,
    offset: ParamF64,
    inc: Vec<NetlistTime>,
    cnt: usize,
    off: NetlistTime,
}

impl ExtClock {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        let freq = b.param_f64("FREQ", DEFAULT_CLOCK_FREQ)?;
        let pattern = b.param_str("PATTERN", "1,1")?;
        let offset = b.param_f64("OFFSET", 0.0)?;
        let feedback = b.logic_input("FB", Handler::DEFAULT);
        let q = b.logic_output("Q");
        b.connect(feedback.id(), q.id());
        let inc = pattern_increments(b.value_f64(freq), b.value_str(pattern))?;
        Ok(Self {
            feedback,
            q,
            offset,
            inc,
            cnt: 0,
            off: NetlistTime::zero(),
        })
    }
}

impl Device for ExtClock {
    fn reset(&mut self, ctx: &mut Context<'_>) {
        self.cnt = 0;
        self.off = NetlistTime::from_fp(ctx.param_f64(self.offset));
    }

    fn update(&mut self, ctx: &mut Context<'_>, _handler: Handler) {
        let q = (self.cnt as Signal & 1) ^ 1;
        let delay = self.inc[self.cnt] + self.off;
        ctx.push(self.q, q, delay);
        self.off = NetlistTime::zero();
        self.cnt += 1;
        if self.cnt >= self.inc.len() {
            self.cnt = 0;
        }
    }
}

/// Logic level set through the `IN` parameter.
#[derive(Debug)]
pub struct LogicInputDevice {
    q: LogicOutput,
    input: ParamBool,
}

impl LogicInputDevice {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        let input = b.param_bool("IN", false)?;
        let model = b.param_model("MODEL", "74XX")?;
        let family = b.family(b.value_str(model))?;
        b.set_family(family);
        let q = b.logic_output("Q");
        Ok(Self { q, input })
    }
}

impl Device for LogicInputDevice {
    fn reset(&mut self, ctx: &mut Context<'_>) {
        ctx.initial(self.q, 0);
    }

    fn update_param(&mut self, ctx: &mut Context<'_>) {
        let v = Signal::from(ctx.param_bool(self.input));
        ctx.push(self.q, v, NetlistTime::from_nsec(1));
    }
}

/// Analog voltage set through the `IN` parameter.
#[derive(Debug)]
pub struct AnalogInputDevice {
    q: AnalogOutput,
    input: ParamF64,
}

impl AnalogInputDevice {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        let q = b.analog_output("Q");
        let input = b.param_f64("IN", 0.0)?;
        Ok(Self { q, input })
    }
}

impl Device for AnalogInputDevice {
    fn reset(&mut self, ctx: &mut Context<'_>) {
        ctx.initial_analog(self.q, 0.0);
    }

    fn update_param(&mut self, ctx: &mut Context<'_>) {
        let v = ctx.param_f64(self.input);
        ctx.push_analog(self.q, v);
    }
}

/// The ground rail.
#[derive(Debug)]
pub struct Gnd {
    q: AnalogOutput,
}

impl Gnd {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        Ok(Self {
            q: b.analog_output("Q"),
        })
    }
}

impl Device for Gnd {
    fn update_param(&mut self, ctx: &mut Context<'_>) {
        ctx.push_analog(self.q, 0.0);
    }
}

/// Terminates a pin that is deliberately left open.
#[derive(Debug)]
pub struct NcPin {
    _input: AnalogInput,
}

impl NcPin {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        Ok(Self {
            _input: b.analog_input("I", Handler::DEFAULT),
        })
    }
}

impl Device for NcPin {}

/// Supply pins of a package. Simulated gates draw no current, so the pins
/// only give `VCC`/`GND` (or `VDD`/`VSS`) something to connect to.
#[derive(Debug)]
pub struct PowerPins {
    _vcc: AnalogInput,
    _gnd: AnalogInput,
}

impl PowerPins {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        let vcc = b.analog_input_passive("VCC");
        let gnd = b.analog_input_passive("GND");
        b.alias("VDD", "VCC");
        b.alias("VSS", "GND");
        Ok(Self { _vcc: vcc, _gnd: gnd })
    }
}

impl Device for PowerPins {}

/// Splits a net in two: the input side sees `RIN`, the output side is
/// driven through `ROUT` with the input voltage.
///
/// Both halves can then end up in different (smaller) solvers.
#[derive(Debug)]
pub struct Frontier {
    rin: TwoTerm,
    rout: TwoTerm,
    input: AnalogInput,
    q: AnalogOutput,
    p_rin: ParamF64,
    p_rout: ParamF64,
}

impl Frontier {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        let rin = TwoTerm::with_names(b, "_RIN.1", "_RIN.2");
        let rout = TwoTerm::with_names(b, "_ROUT.1", "_ROUT.2");
        let input = b.analog_input("_I", Handler::DEFAULT);
        let q = b.analog_output("_Q");
        b.alias("I", "_RIN.1");
        b.alias("G", "_RIN.2");
        b.connect(input.id(), rin.p.id());
        b.alias("_OP", "_ROUT.1");
        b.alias("Q", "_ROUT.2");
        b.connect(q.id(), rout.p.id());
        Ok(Self {
            rin,
            rout,
            input,
            q,
            p_rin: b.param_f64("RIN", 1.0e6)?,
            p_rout: b.param_f64("ROUT", 50.0)?,
        })
    }
}

impl Device for Frontier {
    fn reset(&mut self, ctx: &mut Context<'_>) {
        let gin = 1.0 / ctx.param_f64(self.p_rin);
        let gout = 1.0 / ctx.param_f64(self.p_rout);
        self.rin.set_g_v_i(ctx, gin, 0.0, 0.0);
        self.rout.set_g_v_i(ctx, gout, 0.0, 0.0);
    }

    fn update(&mut self, ctx: &mut Context<'_>, _handler: Handler) {
        let v = ctx.analog(self.input);
        ctx.push_analog(self.q, v);
    }
}

/// Netlist wide settings, always present as device `NETLIST`.
#[derive(Debug)]
pub struct NetlistParams {
    pub use_deactivate: ParamBool,
    pub startup_strategy: ParamInt,
}

impl NetlistParams {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        Ok(Self {
            use_deactivate: b.param_bool("USE_DEACTIVATE", false)?,
            startup_strategy: b.param_int("STARTUP_STRATEGY", 0)?,
        })
    }
}

impl Device for NetlistParams {}

/// Matrix solving methods accepted by `SOLVER.METHOD`.
pub const SOLVER_METHODS: &[&str] = &["MAT_CR", "MAT", "GMRES", "SOR", "SOR_MAT", "SM", "W"];

/// Holds the solver parameters and drives the fixed time step.
///
/// The matrix solvers themselves are built by the setup once the netlist
/// is complete.
#[derive(Debug)]
pub struct SolverDevice {
    gmin: ParamF64,
    method: ParamEnum,
}

impl SolverDevice {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        b.param_f64("FREQ", 48000.0)?;
        let gmin = b.param_f64("GMIN", 1e-9)?;
        b.param_f64("RELTOL", 1e-3)?;
        b.param_f64("VNTOL", 1e-7)?;
        b.param_f64("ACCURACY", 1e-7)?;
        b.param_int("NR_LOOPS", 250)?;
        b.param_int("GS_LOOPS", 9)?;
        let method = b.param_enum("METHOD", SOLVER_METHODS, 0)?;
        b.param_bool("PIVOT", false)?;
        b.param_f64("NR_RECALC_DELAY", NetlistTime::quantum().as_fp())?;
        b.param_f64("MIN_TS_TS", 1e-9)?;
        b.param_bool("DYNAMIC_TS", false)?;
        b.param_f64("DYNAMIC_LTE", 1e-5)?;
        b.param_f64("DYNAMIC_MIN_TIMESTEP", 1e-6)?;

        let fb = b.logic_input_with("FB_step", Delegate::SolverStep);
        let q = b.logic_output("Q_step");
        b.connect(fb.id(), q.id());
        Ok(Self { gmin, method })
    }
}

impl Device for SolverDevice {
    fn update_param(&mut self, ctx: &mut Context<'_>) {
        let gmin = ctx.param_f64(self.gmin);
        if gmin <= 0.0 {
            warn!("{}: GMIN must be positive, keeping {}", ctx.name(), ctx.gmin());
            return;
        }
        ctx.set_gmin(gmin);
        debug!("{}: using {}", ctx.name(), SOLVER_METHODS[ctx.param_enum(self.method)]);
    }
}

/// Analog comparator with logic outputs.
#[derive(Debug)]
pub struct SysCompd {
    ip: AnalogInput,
    inn: AnalogInput,
    q: LogicOutput,
    qq: LogicOutput,
    last_state: Signal,
}

impl SysCompd {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        Ok(Self {
            ip: b.analog_input("IP", Handler::DEFAULT),
            inn: b.analog_input("IN", Handler::DEFAULT),
            q: b.logic_output("Q"),
            qq: b.logic_output("QQ"),
            // anything but 0 or 1 forces the first update through
            last_state: 2,
        })
    }
}

impl Device for SysCompd {
    fn reset(&mut self, _ctx: &mut Context<'_>) {
        self.last_state = 0;
    }

    fn update(&mut self, ctx: &mut Context<'_>, _handler: Handler) {
        let state = Signal::from(ctx.analog(self.ip) > ctx.analog(self.inn));
        if state != self.last_state {
            self.last_state = state;
            let delay = NetlistTime::from_nsec(10);
            ctx.push(self.q, state, delay);
            ctx.push(self.qq, state ^ 1, delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::tests::build;

    #[test]
    fn test_pattern_increments_sum_to_period() {
        let freq = 1000.0;
        let inc = pattern_increments(freq, "2,7,9").unwrap();
        assert_eq!(inc.len(), 3);
        let base = half_period(freq);
        assert_eq!(inc[0], base * 2);
        assert_eq!(inc[1], base * 7);
        let total = inc.iter().fold(NetlistTime::zero(), |a, &t| a + t);
        assert_eq!(total, base * 18);
    }

    #[test]
    fn test_bad_pattern() {
        assert!(pattern_increments(1000.0, "1,x").is_err());
        assert!(build("EXTCLOCK", "C1", &[("PATTERN", "1,,2")]).is_err());
    }

    #[test]
    fn test_clock_feedback_is_linked() {
        let (state, _, built) = build("CLOCK", "CLK", &[("FREQ", "1Meg")]).unwrap();
        let fb = state.find_terminal("CLK.FB").unwrap();
        let q = state.find_terminal("CLK.Q").unwrap();
        assert_eq!(built.links, vec![(fb, q)]);
        let f = state.find_param("CLK.FREQ").unwrap();
        assert_eq!(state.params()[f].value.as_f64(), 1e6);
    }

    #[test]
    fn test_solver_method_param() {
        let (state, _, _) = build("SOLVER", "Solver", &[("METHOD", "SOR")]).unwrap();
        let p = state.find_param("Solver.METHOD").unwrap();
        assert_eq!(state.params()[p].value.as_f64(), 3.0);
        assert!(build("SOLVER", "Solver", &[("METHOD", "CG")]).is_err());
    }
}
