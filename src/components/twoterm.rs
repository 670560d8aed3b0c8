//! Linear two-terminal elements: Resistor, Capacitor, Inductor and sources.
//!
//! Every element writes a 2x2 stamp into the solver through its poles:
//!
//! ```text
//! | a11 a12 | | V1 |   | r1 |
//! | a21 a22 | | V2 | = | r2 |
//! ```
//!
//! Reactive elements use companion models. The capacitor becomes
//! `G = C/h` in parallel with a current source carrying the charge of the
//! last step; the inductor `G = h/L` in parallel with its last current.

use super::generic::{CapacitorKind, GenericCapacitor};
use super::{Device, DeviceBuilder};
use crate::circuit::{Context, ParamF64, Pole};
use crate::error::Result;

/// The pole pair of a two-terminal element.
#[derive(Debug, Clone, Copy)]
pub struct TwoTerm {
    pub p: Pole,
    pub n: Pole,
}

impl TwoTerm {
    /// Create poles `1` and `2`, reachable as `P` and `N` too.
    pub fn new(b: &mut DeviceBuilder<'_>) -> Self {
        let tt = Self::with_names(b, "1", "2");
        b.alias("P", "1");
        b.alias("N", "2");
        tt
    }

    pub fn with_names(b: &mut DeviceBuilder<'_>, p: &str, n: &str) -> Self {
        let (p, n) = b.pole_pair(p, n);
        Self { p, n }
    }

    pub fn delta_v(&self, ctx: &Context<'_>) -> f64 {
        ctx.delta_v(self.p, self.n)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_mat(&self, ctx: &mut Context<'_>, a11: f64, a12: f64, r1: f64, a21: f64, a22: f64, r2: f64) {
        ctx.set_mat(self.p, self.n, a11, a12, r1, a21, a22, r2);
    }

    pub fn set_g_v_i(&self, ctx: &mut Context<'_>, g: f64, v: f64, i: f64) {
        ctx.set_g_v_i(self.p, self.n, g, v, i);
    }

    /// Symmetric conductance `g` with companion current `i` flowing from
    /// pole 1 to pole 2.
    pub fn set_g_i(&self, ctx: &mut Context<'_>, g: f64, i: f64) {
        self.set_mat(ctx, g, -g, -i, -g, g, i);
    }

    pub fn change_state(&self, ctx: &mut Context<'_>) {
        ctx.change_state(self.p);
    }
}

/// Resistor. `G = 1 / max(R, gmin)`.
#[derive(Debug)]
pub struct Resistor {
    tt: TwoTerm,
    r: ParamF64,
}

impl Resistor {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        let tt = TwoTerm::new(b);
        let r = b.param_f64("R", 1e9)?;
        Ok(Self { tt, r })
    }

    fn set_r(&self, ctx: &mut Context<'_>) {
        let g = 1.0 / ctx.param_f64(self.r).max(ctx.gmin());
        self.tt.set_g_v_i(ctx, g, 0.0, 0.0);
    }
}

impl Device for Resistor {
    fn reset(&mut self, ctx: &mut Context<'_>) {
        self.set_r(ctx);
    }

    fn update_param(&mut self, ctx: &mut Context<'_>) {
        self.tt.change_state(ctx);
        self.set_r(ctx);
    }
}

/// Resistor whose value is set by its owner instead of a parameter.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InnerResistor {
    pub tt: TwoTerm,
}

impl InnerResistor {
    pub fn new(b: &mut DeviceBuilder<'_>, p: &str, n: &str) -> Self {
        Self {
            tt: TwoTerm::with_names(b, p, n),
        }
    }

    pub fn set_r(&self, ctx: &mut Context<'_>, r: f64) {
        let g = 1.0 / r.max(ctx.gmin());
        self.tt.set_g_v_i(ctx, g, 0.0, 0.0);
    }
}

/// Capacitor with constant capacity, backward Euler.
#[derive(Debug)]
pub struct Capacitor {
    tt: TwoTerm,
    c: Option<ParamF64>,
    value: f64,
    cap: GenericCapacitor,
}

impl Capacitor {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        let tt = TwoTerm::new(b);
        let c = b.param_f64("C", 1e-6)?;
        let value = b.value_f64(c);
        Ok(Self {
            tt,
            c: Some(c),
            value,
            cap: GenericCapacitor::new(CapacitorKind::Constant),
        })
    }

    /// A capacitor living inside another device, e.g. junction capacitance.
    pub(crate) fn embedded(b: &mut DeviceBuilder<'_>, prefix: &str, value: f64) -> Self {
        let tt = TwoTerm::with_names(b, &format!("{}.1", prefix), &format!("{}.2", prefix));
        Self {
            tt,
            c: None,
            value,
            cap: GenericCapacitor::new(CapacitorKind::Constant),
        }
    }

    pub(crate) fn poles(&self) -> TwoTerm {
        self.tt
    }
}

impl Device for Capacitor {
    fn reset(&mut self, ctx: &mut Context<'_>) {
        if let Some(c) = self.c {
            self.value = ctx.param_f64(c);
        }
        self.cap = GenericCapacitor::new(CapacitorKind::Constant);
        self.cap.set_gmin(ctx.gmin());
        // open until the first time step
        self.tt.set_g_v_i(ctx, ctx.gmin(), 0.0, 0.0);
    }

    fn update_param(&mut self, ctx: &mut Context<'_>) {
        if let Some(c) = self.c {
            self.value = ctx.param_f64(c);
        }
        self.cap.set_gmin(ctx.gmin());
    }

    fn timestep(&mut self, ctx: &mut Context<'_>, step: f64) {
        let dv = self.tt.delta_v(ctx);
        self.cap.timestep(self.value, dv, step);
        let g = self.cap.g(self.value);
        let i = self.cap.ieq(self.value, dv);
        self.tt.set_g_i(ctx, g, i);
    }

    fn is_timestep(&self) -> bool {
        true
    }
}

/// Inductor. `G = step/L + gmin`, the current integrates `G * dV`.
#[derive(Debug)]
pub struct Inductor {
    tt: TwoTerm,
    l: ParamF64,
    i: f64,
    g: f64,
    gmin: f64,
}

impl Inductor {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        let tt = TwoTerm::new(b);
        let l = b.param_f64("L", 1e-6)?;
        Ok(Self {
            tt,
            l,
            i: 0.0,
            g: 0.0,
            gmin: 0.0,
        })
    }
}

impl Device for Inductor {
    fn reset(&mut self, ctx: &mut Context<'_>) {
        self.gmin = ctx.gmin();
        self.i = 0.0;
        self.g = self.gmin;
        self.tt.set_g_i(ctx, self.g, self.i);
    }

    fn update_param(&mut self, ctx: &mut Context<'_>) {
        self.gmin = ctx.gmin();
    }

    fn timestep(&mut self, ctx: &mut Context<'_>, step: f64) {
        self.i += self.g * self.tt.delta_v(ctx);
        self.g = step / ctx.param_f64(self.l) + self.gmin;
        self.tt.set_g_i(ctx, self.g, self.i);
    }

    fn is_timestep(&self) -> bool {
        true
    }
}

/// Voltage source with internal resistance.
#[derive(Debug)]
pub struct VoltageSource {
    tt: TwoTerm,
    v: ParamF64,
    ri: ParamF64,
}

impl VoltageSource {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        let tt = TwoTerm::new(b);
        let v = b.param_f64("V", 0.0)?;
        let ri = b.param_f64("RI", 0.1)?;
        Ok(Self { tt, v, ri })
    }

    fn apply(&self, ctx: &mut Context<'_>) {
        let g = 1.0 / ctx.param_f64(self.ri);
        let v = ctx.param_f64(self.v);
        self.tt.set_g_v_i(ctx, g, v, 0.0);
    }
}

impl Device for VoltageSource {
    fn reset(&mut self, ctx: &mut Context<'_>) {
        self.apply(ctx);
    }

    fn update_param(&mut self, ctx: &mut Context<'_>) {
        self.tt.change_state(ctx);
        self.apply(ctx);
    }
}

/// Constant current source, current flows from P to N through the source.
#[derive(Debug)]
pub struct CurrentSource {
    tt: TwoTerm,
    i: ParamF64,
}

impl CurrentSource {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        let tt = TwoTerm::new(b);
        let i = b.param_f64("I", 1.0)?;
        Ok(Self { tt, i })
    }

    fn apply(&self, ctx: &mut Context<'_>) {
        let i = ctx.param_f64(self.i);
        self.tt.set_mat(ctx, 0.0, 0.0, -i, 0.0, 0.0, i);
    }
}

impl Device for CurrentSource {
    fn reset(&mut self, ctx: &mut Context<'_>) {
        self.apply(ctx);
    }

    fn update_param(&mut self, ctx: &mut Context<'_>) {
        self.tt.change_state(ctx);
        self.apply(ctx);
    }
}

#[cfg(test)]
mod tests {
    use crate::components::tests::build;
    use crate::error::NetlistError;

    #[test]
    fn test_default_values() {
        let (state, _, _) = build("VS", "V1", &[]).unwrap();
        let ri = state.find_param("V1.RI").unwrap();
        assert_eq!(state.params()[ri].value.as_f64(), 0.1);

        let (state, _, _) = build("CAP", "C1", &[("C", "10u")]).unwrap();
        let c = state.find_param("C1.C").unwrap();
        approx::assert_relative_eq!(state.params()[c].value.as_f64(), 10e-6);
    }

    #[test]
    fn test_timestep_flags() {
        let (_, cap, _) = build("CAP", "C1", &[]).unwrap();
        assert!(cap.is_timestep());
        assert!(!cap.is_dynamic());
        let (_, ind, _) = build("IND", "L1", &[]).unwrap();
        assert!(ind.is_timestep());
        let (_, res, _) = build("RES", "R1", &[]).unwrap();
        assert!(!res.is_timestep());
    }

    #[test]
    fn test_unknown_device() {
        let err = build("NOPE", "X1", &[]).unwrap_err();
        assert!(matches!(err, NetlistError::UnknownDeviceType { .. }));
    }
}
