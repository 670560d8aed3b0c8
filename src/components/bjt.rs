//! Bipolar Junction Transistor (BJT) model.
//!
//! Implements the Ebers-Moll injection model with two generic diodes:
//! - Base-emitter junction, scaled by the forward alpha
//! - Base-collector junction, scaled by the reverse alpha
//!
//! ```text
//! Ie = -I_BE + alpha_r * I_BC
//! Ic =  alpha_f * I_BE - I_BC
//! ```
//!
//! The three terminals are coupled through three pole pairs (E-B, C-B and
//! E-C) so that the full 3x3 linearization lands in the solver matrix.
//! Junction capacitances `CJE` and `CJC` become embedded capacitors.

use super::generic::{DiodeKind, GenericDiode, T0};
use super::twoterm::{Capacitor, TwoTerm};
use super::{Device, DeviceBuilder};
use crate::circuit::Context;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BjtType {
    Npn,
    Pnp,
}

impl BjtType {
    fn polarity(self) -> f64 {
        match self {
            Self::Npn => 1.0,
            Self::Pnp => -1.0,
        }
    }
}

/// Model values used by the Ebers-Moll model.
#[derive(Debug, Clone, Copy)]
struct BjtModel {
    bjt_type: BjtType,
    /// Transport saturation current
    is: f64,
    /// Ideal maximum forward beta
    bf: f64,
    /// Forward emission coefficient
    nf: f64,
    /// Ideal maximum reverse beta
    br: f64,
    /// Reverse emission coefficient
    nr: f64,
}

/// Rows E, C, B and the right hand side.
type Mna3 = [[f64; 4]; 3];

const E: usize = 0;
const C: usize = 1;
const B: usize = 2;

#[derive(Debug)]
pub struct Bjt {
    eb: TwoTerm,
    cb: TwoTerm,
    ec: TwoTerm,
    model: BjtModel,
    d_be: GenericDiode,
    d_bc: GenericDiode,
    alpha_f: f64,
    alpha_r: f64,
    cje: Option<Capacitor>,
    cjc: Option<Capacitor>,
}

impl Bjt {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        let eb = TwoTerm::with_names(b, "_EB.E", "_EB.B");
        let cb = TwoTerm::with_names(b, "_CB.C", "_CB.B");
        let ec = TwoTerm::with_names(b, "_EC.E", "_EC.C");
        b.connect(eb.p.id(), ec.p.id());
        b.connect(cb.p.id(), ec.n.id());
        b.connect(eb.n.id(), cb.n.id());
        b.alias("E", "_EB.E");
        b.alias("C", "_CB.C");
        b.alias("B", "_EB.B");

        let p = b.param_model("MODEL", "NPN")?;
        let m = b.model(p)?;
        let model = BjtModel {
            bjt_type: if m.type_name() == "NPN" { BjtType::Npn } else { BjtType::Pnp },
            is: m.value("IS")?,
            bf: m.value("BF")?,
            nf: m.value("NF")?,
            br: m.value("BR")?,
            nr: m.value("NR")?,
        };

        let cje = match m.value("CJE")? {
            c if c > 0.0 => {
                let cap = Capacitor::embedded(b, "m_CJE", c);
                b.connect(eb.n.id(), cap.poles().p.id());
                b.connect(eb.p.id(), cap.poles().n.id());
                Some(cap)
            }
            _ => None,
        };
        let cjc = match m.value("CJC")? {
            c if c > 0.0 => {
                let cap = Capacitor::embedded(b, "m_CJC", c);
                b.connect(eb.n.id(), cap.poles().p.id());
                b.connect(cb.p.id(), cap.poles().n.id());
                Some(cap)
            }
            _ => None,
        };

        Ok(Self {
            eb,
            cb,
            ec,
            model,
            d_be: GenericDiode::new(DiodeKind::Bipolar),
            d_bc: GenericDiode::new(DiodeKind::Bipolar),
            alpha_f: 0.0,
            alpha_r: 0.0,
            cje,
            cjc,
        })
    }

    fn capacitors(&mut self) -> impl Iterator<Item = &mut Capacitor> {
        self.cje.iter_mut().chain(self.cjc.iter_mut())
    }

    fn set_mat_ex(&self, ctx: &mut Context<'_>, m: &Mna3) {
        self.eb.set_mat(ctx, m[E][E], m[E][B], m[E][3], m[B][E], m[B][B], m[B][3]);
        self.cb.set_mat(ctx, m[C][C], m[C][B], m[C][3], m[B][C], 0.0, 0.0);
        self.ec.set_mat(ctx, 0.0, m[E][C], 0.0, m[C][E], 0.0, 0.0);
    }
}

impl Device for Bjt {
    fn reset(&mut self, ctx: &mut Context<'_>) {
        for cap in self.capacitors() {
            cap.reset(ctx);
        }
    }

    fn update_param(&mut self, ctx: &mut Context<'_>) {
        let m = self.model;
        self.alpha_f = m.bf / (1.0 + m.bf);
        self.alpha_r = m.br / (1.0 + m.br);
        self.d_be.set_param(m.is / self.alpha_f, m.nf, ctx.gmin(), T0);
        self.d_bc.set_param(m.is / self.alpha_r, m.nr, ctx.gmin(), T0);
    }

    fn update_terminals(&mut self, ctx: &mut Context<'_>) {
        let polarity = self.model.bjt_type.polarity();

        // V(B) - V(E) and V(B) - V(C)
        self.d_be.update(-self.eb.delta_v(ctx) * polarity);
        self.d_bc.update(-self.cb.delta_v(ctx) * polarity);

        let gee = self.d_be.g();
        let gcc = self.d_bc.g();
        let gec = self.alpha_r * gcc;
        let gce = self.alpha_f * gee;
        let s_ie = -self.d_be.i() + self.alpha_r * self.d_bc.i();
        let s_ic = self.alpha_f * self.d_be.i() - self.d_bc.i();
        let ie = (s_ie + gee * self.d_be.vd() - gec * self.d_bc.vd()) * polarity;
        let ic = (s_ic - gce * self.d_be.vd() + gcc * self.d_bc.vd()) * polarity;

        self.set_mat_ex(
            ctx,
            &[
                [gee, -gec, gec - gee, -ie],
                [-gce, gcc, gce - gcc, -ic],
                [gce - gee, gec - gcc, gcc + gee - gce - gec, ie + ic],
            ],
        );
    }

    fn timestep(&mut self, ctx: &mut Context<'_>, step: f64) {
        for cap in self.capacitors() {
            cap.timestep(ctx, step);
        }
    }

    fn is_dynamic(&self) -> bool {
        true
    }

    fn is_timestep(&self) -> bool {
        self.cje.is_some() || self.cjc.is_some()
    }
}

#[cfg(test)]
mod tests {
    use crate::components::tests::build;

    #[test]
    fn test_plain_model_has_no_capacitors() {
        let (_, q, built) = build("QBJT_EB", "Q1", &[("MODEL", "NPN")]).unwrap();
        assert!(q.is_dynamic());
        assert!(!q.is_timestep());
        assert_eq!(built.links.len(), 3);
    }

    #[test]
    fn test_junction_capacitance() {
        let (state, q, built) = build("QBJT_EB", "Q1", &[("MODEL", "NPN(CJE=2p CJC=1p)")]).unwrap();
        assert!(q.is_timestep());
        assert_eq!(built.links.len(), 7);
        assert!(state.find_terminal("Q1.m_CJE.1").is_some());
        assert!(state.find_terminal("Q1.m_CJC.2").is_some());
    }
}
