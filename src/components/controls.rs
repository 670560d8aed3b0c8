//! Potentiometers, switches and analog multiplexers.
//!
//! All of them are resistors whose value changes outside the solver loop,
//! so every change is announced to the solver with `change_state`.

use super::twoterm::InnerResistor;
use super::{Device, DeviceBuilder};
use crate::circuit::{AnalogInput, Context, Handler, LogicInput, ParamBool, ParamF64, Signal};
use crate::error::Result;

/// Map a dial position to the fraction of the track between pins 1 and 2.
fn dial_position(dial: f64, log: bool, reverse: bool) -> f64 {
    let mut v = dial;
    if log {
        v = (v.exp() - 1.0) / (1f64.exp() - 1.0);
    }
    if reverse {
        v = 1.0 - v;
    }
    v
}

/// Potentiometer: two resistors meeting at the wiper (pin 2).
#[derive(Debug)]
pub struct Potentiometer {
    r1: InnerResistor,
    r2: InnerResistor,
    r: ParamF64,
    dial: ParamF64,
    dial_is_log: ParamBool,
    reverse: ParamBool,
}

impl Potentiometer {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        let r1 = InnerResistor::new(b, "_R1.1", "_R1.2");
        let r2 = InnerResistor::new(b, "_R2.1", "_R2.2");
        b.connect(r1.tt.n.id(), r2.tt.p.id());
        b.alias("1", "_R1.1");
        b.alias("2", "_R1.2");
        b.alias("3", "_R2.2");
        Ok(Self {
            r1,
            r2,
            r: b.param_f64("R", 10_000.0)?,
            dial: b.param_f64("DIAL", 0.5)?,
            dial_is_log: b.param_bool("DIALLOG", false)?,
            reverse: b.param_bool("REVERSE", false)?,
        })
    }

    fn apply(&self, ctx: &mut Context<'_>) {
        let v = dial_position(
            ctx.param_f64(self.dial),
            ctx.param_bool(self.dial_is_log),
            ctx.param_bool(self.reverse),
        );
        let r = ctx.param_f64(self.r);
        let gmin = ctx.gmin();
        self.r1.set_r(ctx, (r * v).max(gmin));
        self.r2.set_r(ctx, (r * (1.0 - v)).max(gmin));
    }
}

impl Device for Potentiometer {
    fn reset(&mut self, ctx: &mut Context<'_>) {
        self.apply(ctx);
    }

    fn update_param(&mut self, ctx: &mut Context<'_>) {
        self.r1.tt.change_state(ctx);
        self.r2.tt.change_state(ctx);
        self.apply(ctx);
    }
}

/// Switch set through its `POS` parameter.
#[derive(Debug)]
pub struct Switch {
    r: InnerResistor,
    pos: ParamBool,
    ron: ParamF64,
}

impl Switch {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        let r = InnerResistor::new(b, "_R.1", "_R.2");
        b.alias("1", "_R.1");
        b.alias("2", "_R.2");
        Ok(Self {
            r,
            pos: b.param_bool("POS", false)?,
            ron: b.param_f64("RON", 0.01)?,
        })
    }

    fn resistance(&self, ctx: &Context<'_>) -> f64 {
        if ctx.param_bool(self.pos) {
            ctx.param_f64(self.ron)
        } else {
            1.0 / ctx.gmin()
        }
    }
}

impl Device for Switch {
    fn reset(&mut self, ctx: &mut Context<'_>) {
        self.r.set_r(ctx, 1.0 / ctx.gmin());
    }

    fn update_param(&mut self, ctx: &mut Context<'_>) {
        let r = self.resistance(ctx);
        self.r.tt.change_state(ctx);
        self.r.set_r(ctx, r);
    }
}

/// Logic controlled single pole switch.
#[derive(Debug)]
pub struct Dsw1 {
    r: InnerResistor,
    input: LogicInput,
    ron: ParamF64,
    roff: ParamF64,
    last_state: Signal,
}

impl Dsw1 {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        let r = InnerResistor::new(b, "_R.1", "_R.2");
        b.alias("1", "_R.1");
        b.alias("2", "_R.2");
        let input = b.logic_input("I", Handler::DEFAULT);
        Ok(Self {
            r,
            input,
            ron: b.param_f64("RON", 1.0)?,
            roff: b.param_f64("ROFF", 1e20)?,
            last_state: 0,
        })
    }
}

impl Device for Dsw1 {
    fn reset(&mut self, ctx: &mut Context<'_>) {
        self.last_state = 0;
        let roff = ctx.param_f64(self.roff);
        self.r.set_r(ctx, roff);
    }

    fn update(&mut self, ctx: &mut Context<'_>, _handler: Handler) {
        let state = ctx.input(self.input);
        if state != self.last_state {
            self.last_state = state;
            let r = if state != 0 {
                ctx.param_f64(self.ron)
            } else {
                ctx.param_f64(self.roff)
            };
            self.r.tt.change_state(ctx);
            self.r.set_r(ctx, r);
        }
    }
}

/// Logic controlled changeover switch. Pin 2 is the common pin.
#[derive(Debug)]
pub struct Dsw2 {
    r1: InnerResistor,
    r2: InnerResistor,
    input: LogicInput,
    gon: ParamF64,
    goff: ParamF64,
}

impl Dsw2 {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        let r1 = InnerResistor::new(b, "_R1.1", "_R1.2");
        let r2 = InnerResistor::new(b, "_R2.1", "_R2.2");
        b.connect(r1.tt.n.id(), r2.tt.p.id());
        b.alias("1", "_R1.1");
        b.alias("2", "_R1.2");
        b.alias("3", "_R2.2");
        let input = b.logic_input("I", Handler::DEFAULT);
        Ok(Self {
            r1,
            r2,
            input,
            gon: b.param_f64("GON", 1e9)?,
            goff: b.param_f64("GOFF", 1e-9)?,
        })
    }

    fn set(&self, ctx: &mut Context<'_>, g1: f64, g2: f64) {
        self.r1.tt.set_g_v_i(ctx, g1, 0.0, 0.0);
        self.r2.tt.set_g_v_i(ctx, g2, 0.0, 0.0);
    }
}

impl Device for Dsw2 {
    fn reset(&mut self, ctx: &mut Context<'_>) {
        let (gon, goff) = (ctx.param_f64(self.gon), ctx.param_f64(self.goff));
        self.set(ctx, goff, gon);
    }

    fn update(&mut self, ctx: &mut Context<'_>, _handler: Handler) {
        let (gon, goff) = (ctx.param_f64(self.gon), ctx.param_f64(self.goff));
        let (g1, g2) = if ctx.input(self.input) != 0 {
            (gon, goff)
        } else {
            (goff, gon)
        };
        self.r1.tt.change_state(ctx);
        self.r2.tt.change_state(ctx);
        self.set(ctx, g1, g2);
    }
}

/// CMOS control input: low below 30 % of the supply, high above 70 %,
/// unchanged in between.
fn schmitt(ctx: &Context<'_>, input: AnalogInput, vdd: AnalogInput, vss: AnalogInput, state: &mut bool) -> bool {
    let gnd = ctx.analog(vss);
    let sup = ctx.analog(vdd) - gnd;
    let v = ctx.analog(input) - gnd;
    if v < 0.3 * sup {
        *state = false;
    } else if v > 0.7 * sup {
        *state = true;
    }
    *state
}

/// One switch of a CD4066/CD4016 bilateral switch.
///
/// The control input is analog and compared against 30 % and 70 % of the
/// supply with hysteresis. The on resistance scales with the supply.
#[derive(Debug)]
pub struct Cd4066Gate {
    r: InnerResistor,
    ctl: AnalogInput,
    vdd: AnalogInput,
    vss: AnalogInput,
    base_r: ParamF64,
    on: bool,
    last: Option<bool>,
}

impl Cd4066Gate {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        let r = InnerResistor::new(b, "R.1", "R.2");
        b.alias("1", "R.1");
        b.alias("2", "R.2");
        let ctl = b.analog_input("CTL", Handler::DEFAULT);
        let vdd = b.analog_input("VDD", Handler::DEFAULT);
        let vss = b.analog_input("VSS", Handler::DEFAULT);
        Ok(Self {
            r,
            ctl,
            vdd,
            vss,
            base_r: b.param_f64("BASER", 270.0)?,
            on: false,
            last: None,
        })
    }

    fn control(&mut self, ctx: &Context<'_>) -> bool {
        schmitt(ctx, self.ctl, self.vdd, self.vss, &mut self.on)
    }

    fn resistance(&self, ctx: &Context<'_>, on: bool) -> f64 {
        let sup = ctx.analog(self.vdd) - ctx.analog(self.vss);
        if on && sup > 0.0 {
            ctx.param_f64(self.base_r) * 5.0 / sup
        } else {
            1.0 / ctx.gmin()
        }
    }
}

impl Device for Cd4066Gate {
    fn reset(&mut self, ctx: &mut Context<'_>) {
        self.on = false;
        self.last = None;
        self.r.set_r(ctx, 1.0 / ctx.gmin());
    }

    fn update(&mut self, ctx: &mut Context<'_>, _handler: Handler) {
        let on = self.control(ctx);
        if self.last != Some(on) {
            self.last = Some(on);
            let r = self.resistance(ctx, on);
            self.r.tt.change_state(ctx);
            self.r.set_r(ctx, r);
        }
    }
}

/// One section of a CD4053 analog multiplexer.
///
/// `XY` connects to `X` while `S` is low and to `Y` while it is high, to
/// neither while `INH` is high. The on resistance scales with the analog
/// span `VDD - VEE`.
#[derive(Debug)]
pub struct Cd4053Gate {
    rx: InnerResistor,
    ry: InnerResistor,
    select: AnalogInput,
    inhibit: AnalogInput,
    vee: AnalogInput,
    vdd: AnalogInput,
    vss: AnalogInput,
    base_r: ParamF64,
    select_state: bool,
    inhibit_state: bool,
    /// Applied `(RX, RY)`
    last: Option<(f64, f64)>,
}

impl Cd4053Gate {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        let rx = InnerResistor::new(b, "RX.1", "RX.2");
        let ry = InnerResistor::new(b, "RY.1", "RY.2");
        b.connect(rx.tt.n.id(), ry.tt.n.id());
        b.alias("X", "RX.1");
        b.alias("Y", "RY.1");
        b.alias("XY", "RX.2");
        Ok(Self {
            rx,
            ry,
            select: b.analog_input("S", Handler::DEFAULT),
            inhibit: b.analog_input("INH", Handler::DEFAULT),
            vee: b.analog_input("VEE", Handler::DEFAULT),
            vdd: b.analog_input("VDD", Handler::DEFAULT),
            vss: b.analog_input("VSS", Handler::DEFAULT),
            base_r: b.param_f64("BASER", 270.0)?,
            select_state: false,
            inhibit_state: false,
            last: None,
        })
    }

    fn resistance(&self, ctx: &Context<'_>, on: bool) -> f64 {
        let sup = ctx.analog(self.vdd) - ctx.analog(self.vee);
        if on && sup > 0.0 {
            ctx.param_f64(self.base_r) * 5.0 / sup
        } else {
            1.0 / ctx.gmin()
        }
    }
}

impl Device for Cd4053Gate {
    fn reset(&mut self, ctx: &mut Context<'_>) {
        self.select_state = false;
        self.inhibit_state = false;
        self.last = None;
        let off = 1.0 / ctx.gmin();
        self.rx.set_r(ctx, off);
        self.ry.set_r(ctx, off);
    }

    fn update(&mut self, ctx: &mut Context<'_>, _handler: Handler) {
        let inhibit = schmitt(ctx, self.inhibit, self.vdd, self.vss, &mut self.inhibit_state);
        let select = schmitt(ctx, self.select, self.vdd, self.vss, &mut self.select_state);
        let r = (
            self.resistance(ctx, !inhibit && !select),
            self.resistance(ctx, !inhibit && select),
        );
        if self.last != Some(r) {
            self.last = Some(r);
            let (rx, ry) = r;
            self.rx.tt.change_state(ctx);
            self.ry.tt.change_state(ctx);
            self.rx.set_r(ctx, rx);
            self.ry.set_r(ctx, ry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_dial_position() {
        assert_relative_eq!(dial_position(0.25, false, false), 0.25);
        assert_relative_eq!(dial_position(0.25, false, true), 0.75);
        assert_relative_eq!(dial_position(0.0, true, false), 0.0);
        assert_relative_eq!(dial_position(1.0, true, false), 1.0);
        // the log taper stays below the linear one in between
        assert!(dial_position(0.5, true, false) < 0.5);
    }

    #[test]
    fn test_pot_pins() {
        let (state, _, built) = crate::components::tests::build("POT", "P1", &[("R", "50k")]).unwrap();
        assert_eq!(built.links.len(), 1);
        for pin in ["P1.1", "P1.2", "P1.3"] {
            assert!(built.aliases.iter().any(|(a, _)| a == pin), "{}", pin);
        }
        let r = state.find_param("P1.R").unwrap();
        assert_relative_eq!(state.params()[r].value.as_f64(), 50_000.0);
    }

    #[test]
    fn test_cd4053_selects_input() {
        let mut nl = crate::dsl::load(
            "SOLVER(Solver, 48000)
             ANALOG_INPUT(VDD, 5)
             ANALOG_INPUT(VX, 5)
             ANALOG_INPUT(VY, 2)
             ANALOG_INPUT(S, 0)
             ANALOG_INPUT(INH, 0)
             CD4053_GATE(G1)
             RES(R1, 1k)
             NET_C(VDD, G1.VDD)
             NET_C(GND, G1.VSS, G1.VEE, R1.2)
             NET_C(VX, G1.X)
             NET_C(VY, G1.Y)
             NET_C(S, G1.S)
             NET_C(INH, G1.INH)
             NET_C(G1.XY, R1.1)",
            None,
        )
        .unwrap();
        nl.reset();
        let step = crate::time::NetlistTime::from_msec(1);
        nl.process_queue(step);
        // 270 ohm on resistance at a 5 V span
        assert_relative_eq!(nl.analog_value("R1.1").unwrap(), 5.0 * 1000.0 / 1270.0, epsilon = 1e-3);

        nl.set_param("S.IN", "5").unwrap();
        nl.process_queue(step);
        assert_relative_eq!(nl.analog_value("R1.1").unwrap(), 2.0 * 1000.0 / 1270.0, epsilon = 1e-3);

        // between the thresholds the selection holds
        nl.set_param("S.IN", "2.5").unwrap();
        nl.process_queue(step);
        assert_relative_eq!(nl.analog_value("R1.1").unwrap(), 2.0 * 1000.0 / 1270.0, epsilon = 1e-3);

        nl.set_param("INH.IN", "5").unwrap();
        nl.process_queue(step);
        assert!(nl.analog_value("R1.1").unwrap().abs() < 1e-3);
    }
}
