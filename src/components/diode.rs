//! Diode and Zener diode.
//!
//! Uses the Shockley diode equation:
//!   I = Is * (exp(V / (n * Vt)) - 1)
//!
//! The Zener adds a second, reversed junction modelling breakdown. Its
//! saturation current is chosen so that it carries `IBV` at `-BV`:
//!   IsBV = IBV / (exp(BV / (NBV * Vt)) - 1)

use super::generic::{thermal_voltage, DiodeKind, GenericDiode, T0};
use super::twoterm::TwoTerm;
use super::{Device, DeviceBuilder};
use crate::circuit::Context;
use crate::error::Result;

/// Diode model values.
#[derive(Debug, Clone, Copy)]
struct DiodeModel {
    is: f64,
    n: f64,
}

#[derive(Debug)]
pub struct Diode {
    tt: TwoTerm,
    model: DiodeModel,
    d: GenericDiode,
}

impl Diode {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        let tt = TwoTerm::new(b);
        b.alias("A", "1");
        b.alias("K", "2");
        let p = b.param_model("MODEL", "D")?;
        let m = b.model(p)?;
        let model = DiodeModel {
            is: m.value("IS")?,
            n: m.value("N")?,
        };
        Ok(Self {
            tt,
            model,
            d: GenericDiode::new(DiodeKind::Bipolar),
        })
    }
}

impl Device for Diode {
    fn reset(&mut self, ctx: &mut Context<'_>) {
        self.d.set_param(self.model.is, self.model.n, ctx.gmin(), T0);
        self.tt.set_g_v_i(ctx, self.d.g(), 0.0, self.d.ieq());
    }

    fn update_param(&mut self, ctx: &mut Context<'_>) {
        self.d.set_param(self.model.is, self.model.n, ctx.gmin(), T0);
    }

    fn update_terminals(&mut self, ctx: &mut Context<'_>) {
        self.d.update(self.tt.delta_v(ctx));
        self.tt.set_g_i(ctx, self.d.g(), self.d.ieq());
    }

    fn is_dynamic(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy)]
struct ZenerModel {
    is: f64,
    n: f64,
    nbv: f64,
    ibv: f64,
    bv: f64,
}

impl ZenerModel {
    fn is_bv(&self) -> f64 {
        self.ibv / ((self.bv / thermal_voltage(self.nbv, T0)).exp() - 1.0)
    }
}

#[derive(Debug)]
pub struct ZDiode {
    tt: TwoTerm,
    model: ZenerModel,
    d: GenericDiode,
    r: GenericDiode,
}

impl ZDiode {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        let tt = TwoTerm::new(b);
        b.alias("A", "1");
        b.alias("K", "2");
        let p = b.param_model("MODEL", "D")?;
        let m = b.model(p)?;
        let model = ZenerModel {
            is: m.value("IS")?,
            n: m.value("N")?,
            nbv: m.value("NBV")?,
            ibv: m.value("IBV")?,
            bv: m.value("BV")?,
        };
        Ok(Self {
            tt,
            model,
            d: GenericDiode::new(DiodeKind::Bipolar),
            r: GenericDiode::new(DiodeKind::Bipolar),
        })
    }

    fn set_params(&mut self, gmin: f64) {
        let m = self.model;
        self.d.set_param(m.is, m.n, gmin, T0);
        self.r.set_param(m.is_bv(), m.nbv, gmin, T0);
    }
}

impl Device for ZDiode {
    fn reset(&mut self, ctx: &mut Context<'_>) {
        self.set_params(ctx.gmin());
        self.tt.set_g_v_i(ctx, self.d.g(), 0.0, self.d.ieq());
    }

    fn update_param(&mut self, ctx: &mut Context<'_>) {
        self.set_params(ctx.gmin());
        self.tt.set_g_v_i(ctx, self.d.g(), 0.0, self.d.ieq());
    }

    fn update_terminals(&mut self, ctx: &mut Context<'_>) {
        let dv = self.tt.delta_v(ctx);
        self.d.update(dv);
        self.r.update(-dv);
        let g = self.d.g() + self.r.g();
        let i = self.d.ieq() - self.r.ieq();
        self.tt.set_g_i(ctx, g, i);
    }

    fn is_dynamic(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_breakdown_current() {
        let m = ZenerModel {
            is: 1e-15,
            n: 1.0,
            nbv: 1.0,
            ibv: 1e-3,
            bv: 0.5,
        };
        let mut r = GenericDiode::new(DiodeKind::Bipolar);
        r.set_param(m.is_bv(), m.nbv, 0.0, T0);
        // below vcrit the junction is evaluated exactly
        assert!(m.bv < r.vcrit());
        r.update(m.bv);
        assert_relative_eq!(r.i(), m.ibv, max_relative = 1e-9);
    }

    #[test]
    fn test_diode_from_named_model() {
        let (state, dev, built) = crate::components::tests::build("DIODE", "D1", &[("MODEL", "1N914")]).unwrap();
        assert!(dev.is_dynamic());
        assert!(built.aliases.iter().any(|(a, t)| a == "D1.A" && t == "D1.1"));
        assert!(state.find_terminal("D1.2").is_some());
    }

    #[test]
    fn test_diode_inline_model() {
        let (_, dev, _) = crate::components::tests::build("DIODE", "D1", &[("MODEL", "D(IS=1e-14 N=1.5)")]).unwrap();
        assert!(dev.is_dynamic());
        assert!(crate::components::tests::build("DIODE", "D2", &[("MODEL", "NOPE")]).is_err());
    }
}
