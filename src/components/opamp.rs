//! Voltage controlled current source and a single stage op-amp.
//!
//! The VCCS drives `I = G * (V(IP) - V(IN))` from OP to ON. Its output
//! terminals are coupled to the input nets only, so the control voltage
//! enters the matrix as off-diagonal conductances.
//!
//! The op-amp is a VCCS with `G = A / ROUT` loaded by `ROUT` to ground,
//! which gives an open loop gain of `A`, plus `RIN` between the inputs.

use super::twoterm::{InnerResistor, TwoTerm};
use super::{Device, DeviceBuilder};
use crate::circuit::{Context, ParamF64, Pole};
use crate::error::Result;

/// Terminals of a VCCS. Every output pole exists twice, once coupled to
/// each input.
#[derive(Debug, Clone, Copy)]
struct VccsPoles {
    input: TwoTerm,
    op: Pole,
    op1: Pole,
    on: Pole,
    on1: Pole,
}

impl VccsPoles {
    fn new(b: &mut DeviceBuilder<'_>, prefix: &str) -> Self {
        let input = TwoTerm::with_names(b, &format!("{}IP", prefix), &format!("{}IN", prefix));
        let op = b.coupled_pole(&format!("{}OP", prefix), input.p);
        let op1 = b.coupled_pole(&format!("{}_OP1", prefix), input.n);
        let on = b.coupled_pole(&format!("{}ON", prefix), input.p);
        let on1 = b.coupled_pole(&format!("{}_ON1", prefix), input.n);
        b.connect(op.id(), op1.id());
        b.connect(on.id(), on1.id());
        Self {
            input,
            op,
            op1,
            on,
            on1,
        }
    }

    fn set(&self, ctx: &mut Context<'_>, g: f64, gi: f64) {
        self.input.set_g_v_i(ctx, gi, 0.0, 0.0);
        ctx.set_go_gt_i(self.op, -g, 0.0, 0.0);
        ctx.set_go_gt_i(self.op1, g, 0.0, 0.0);
        ctx.set_go_gt_i(self.on, g, 0.0, 0.0);
        ctx.set_go_gt_i(self.on1, -g, 0.0, 0.0);
    }

    fn change_state(&self, ctx: &mut Context<'_>) {
        ctx.change_state(self.op);
    }
}

#[derive(Debug)]
pub struct Vccs {
    poles: VccsPoles,
    g: ParamF64,
    ri: ParamF64,
}

impl Vccs {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        let poles = VccsPoles::new(b, "");
        Ok(Self {
            poles,
            g: b.param_f64("G", 1.0)?,
            ri: b.param_f64("RI", 1e9)?,
        })
    }

    fn apply(&self, ctx: &mut Context<'_>) {
        let g = ctx.param_f64(self.g);
        let gi = 1.0 / ctx.param_f64(self.ri);
        self.poles.set(ctx, g, gi);
    }
}

impl Device for Vccs {
    fn reset(&mut self, ctx: &mut Context<'_>) {
        self.apply(ctx);
    }

    fn update_param(&mut self, ctx: &mut Context<'_>) {
        self.poles.change_state(ctx);
        self.apply(ctx);
    }
}

#[derive(Debug)]
pub struct OpAmp {
    vccs: VccsPoles,
    rout: InnerResistor,
    a: f64,
    r_in: f64,
    r_out: f64,
}

impl OpAmp {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        let vccs = VccsPoles::new(b, "_G.");
        let rout = InnerResistor::new(b, "_RO.1", "_RO.2");
        b.connect(vccs.op.id(), rout.tt.p.id());
        b.connect(vccs.on.id(), rout.tt.n.id());
        b.alias("PLUS", "_G.IP");
        b.alias("MINUS", "_G.IN");
        b.alias("OUT", "_G.OP");
        b.connect_to("_G.ON", "GND");

        let model = b.param_model("MODEL", "OPAMP")?;
        let m = b.model(model)?;
        Ok(Self {
            vccs,
            rout,
            a: m.value("A")?,
            r_in: m.value("RIN")?,
            r_out: m.value("ROUT")?,
        })
    }
}

impl Device for OpAmp {
    fn reset(&mut self, ctx: &mut Context<'_>) {
        self.vccs.set(ctx, self.a / self.r_out, 1.0 / self.r_in);
        self.rout.set_r(ctx, self.r_out);
    }
}

#[cfg(test)]
mod tests {
    use crate::components::tests::build;

    #[test]
    fn test_vccs_couples_outputs_to_inputs() {
        let (state, _, built) = build("VCCS", "G1", &[("G", "0.01")]).unwrap();
        let ip = state.find_terminal("G1.IP").unwrap();
        let op = state.find_terminal("G1.OP").unwrap();
        assert_eq!(state.terminal(op).other, Some(ip));
        // the input side does not know about the outputs
        assert_ne!(state.terminal(ip).other, Some(op));
        assert_eq!(built.links.len(), 2);
    }

    #[test]
    fn test_opamp_ground_link() {
        let (_, _, built) = build("OPAMP", "U1", &[]).unwrap();
        assert!(built.net_links.iter().any(|(a, b)| a == "U1._G.ON" && b == "GND"));
        assert!(built.aliases.iter().any(|(a, t)| a == "U1.OUT" && t == "U1._G.OP"));
    }
}
