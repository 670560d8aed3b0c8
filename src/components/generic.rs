//! Nonlinear building blocks shared by several devices.
//!
//! The diode follows the Shockley equation:
//!   I = Is * (exp(V / (n * Vt)) - 1)
//!
//! For Newton-Raphson iteration it is linearized around the operating point:
//!   I ≈ G * V + Ieq,  G = dI/dV,  Ieq = I - V * G
//!
//! The capacitor is discretized with backward Euler:
//!   i(n+1) = C/h * (v(n+1) - v(n))

/// Boltzmann constant
pub const K_B: f64 = 1.380_648_52e-23;
/// Elementary charge
pub const Q_E: f64 = 1.602_176_531_4e-19;
/// Default device temperature in Kelvin
pub const T0: f64 = 300.0;

/// Largest step of the diode voltage per Newton iteration.
pub const DIODE_MAXDIFF: f64 = 1e100;
/// Upper bound of the exponent argument in the MOS diode.
pub const DIODE_MAXVOLT: f64 = 300.0;

/// Thermal voltage `n * k * T / q`.
pub fn thermal_voltage(n: f64, temp: f64) -> f64 {
    n * temp * K_B / Q_E
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiodeKind {
    Bipolar,
    Mos,
}

/// A diode junction with Newton step limiting.
#[derive(Debug, Clone)]
pub struct GenericDiode {
    kind: DiodeKind,
    vd: f64,
    id: f64,
    g: f64,
    vt: f64,
    vt_inv: f64,
    /// Below this the junction is treated as a plain `gmin` conductance
    vmin: f64,
    is: f64,
    log_is: f64,
    gmin: f64,
    /// Voltage of minimal radius of curvature of the I-V curve
    vcrit: f64,
}

impl GenericDiode {
    pub fn new(kind: DiodeKind) -> Self {
        let mut d = Self {
            kind,
            vd: 0.7,
            id: 0.0,
            g: 1e-15,
            vt: 0.0,
            vt_inv: 0.0,
            vmin: 0.0,
            is: 0.0,
            log_is: 0.0,
            gmin: 1e-15,
            vcrit: 0.0,
        };
        d.set_param(1e-15, 1.0, 1e-15, T0);
        d
    }

    pub fn set_param(&mut self, is: f64, n: f64, gmin: f64, temp: f64) {
        self.is = is;
        self.log_is = is.ln();
        self.gmin = gmin;
        self.vt = thermal_voltage(n, temp);
        self.vmin = -5.0 * self.vt;
        self.vcrit = self.vt * (self.vt / self.is / std::f64::consts::SQRT_2).ln();
        self.vt_inv = 1.0 / self.vt;
    }

    /// Move the operating point towards `nvd`.
    ///
    /// Above `vcrit` the step is compressed logarithmically, so one Newton
    /// iteration can never drive the exponential into overflow.
    pub fn update(&mut self, nvd: f64) {
        match self.kind {
            DiodeKind::Bipolar => {
                if nvd > self.vcrit {
                    // an old value below zero must not hold the new one back
                    let old = self.vd.max(0.0);
                    let d = DIODE_MAXDIFF.min(nvd - old);
                    let a = d.abs() * self.vt_inv;
                    self.vd = old + d.signum() * a.ln_1p() * self.vt;
                } else {
                    self.vd = (-DIODE_MAXDIFF).max(nvd);
                }

                if self.vd < self.vmin {
                    self.g = self.gmin;
                    self.id = -self.is;
                } else {
                    let is_e = (self.log_is + self.vd * self.vt_inv).exp();
                    self.id = is_e - self.is;
                    self.g = is_e * self.vt_inv + self.gmin;
                }
            }
            DiodeKind::Mos => {
                self.vd = nvd;
                if nvd < 0.0 {
                    self.g = self.is * self.vt_inv + self.gmin;
                    self.id = self.g * self.vd;
                } else {
                    let is_e = DIODE_MAXVOLT.min(self.log_is + self.vd * self.vt_inv).exp();
                    self.id = is_e - self.is;
                    self.g = is_e * self.vt_inv + self.gmin;
                }
            }
        }
    }

    pub fn i(&self) -> f64 {
        self.id
    }

    pub fn g(&self) -> f64 {
        self.g
    }

    /// Companion current source.
    pub fn ieq(&self) -> f64 {
        self.id - self.vd * self.g
    }

    pub fn vd(&self) -> f64 {
        self.vd
    }

    pub fn vt(&self) -> f64 {
        self.vt
    }

    pub fn vcrit(&self) -> f64 {
        self.vcrit
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacitorKind {
    /// Capacitance may change between steps
    Variable,
    Constant,
}

/// Discretized capacitor state.
#[derive(Debug, Clone)]
pub struct GenericCapacitor {
    kind: CapacitorKind,
    /// `1 / step`
    h: f64,
    /// Capacitance at the last step (variable only)
    c: f64,
    /// Voltage at the last step
    v: f64,
    gmin: f64,
}

impl GenericCapacitor {
    pub fn new(kind: CapacitorKind) -> Self {
        Self {
            kind,
            h: 0.0,
            c: 0.0,
            v: 0.0,
            gmin: 0.0,
        }
    }

    pub fn set_gmin(&mut self, gmin: f64) {
        self.gmin = gmin;
    }

    /// Conductance of the companion model.
    ///
    /// The variable model uses the mean of old and new capacitance so charge
    /// is conserved across a change. G depends only on the new voltage and
    /// Ieq only on the old one.
    pub fn g(&self, cap: f64) -> f64 {
        match self.kind {
            CapacitorKind::Variable => self.h * 0.5 * (cap + self.c) + self.gmin,
            CapacitorKind::Constant => cap * self.h + self.gmin,
        }
    }

    pub fn ieq(&self, cap: f64, _v: f64) -> f64 {
        match self.kind {
            CapacitorKind::Variable => -self.h * 0.5 * (cap + self.c) * self.v,
            CapacitorKind::Constant => -self.g(cap) * self.v,
        }
    }

    /// Advance to the next step with the voltage `v` just solved.
    pub fn timestep(&mut self, cap: f64, v: f64, step: f64) {
        self.h = 1.0 / step;
        self.c = cap;
        self.v = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn diode() -> GenericDiode {
        let mut d = GenericDiode::new(DiodeKind::Bipolar);
        d.set_param(1e-15, 1.0, 1e-15, T0);
        d
    }

    /// Evaluate the diode at exactly `v`, bypassing step limiting by
    /// approaching from below `vcrit`.
    fn eval(d: &mut GenericDiode, v: f64) -> (f64, f64) {
        for _ in 0..200 {
            d.update(v);
            if (d.vd() - v).abs() < 1e-15 {
                break;
            }
        }
        (d.i(), d.g())
    }

    #[test]
    fn test_thermal_voltage() {
        assert_relative_eq!(thermal_voltage(1.0, T0), 0.025_852, max_relative = 1e-4);
    }

    #[test]
    fn test_current_is_monotonic() {
        let mut d = diode();
        let mut last = f64::NEG_INFINITY;
        for k in 0..=200 {
            let v = -1.0 + k as f64 * 0.01;
            let (i, _) = eval(&mut d, v);
            assert!(i >= last, "I({}) = {} < {}", v, i, last);
            last = i;
        }
    }

    #[test]
    fn test_conductance_matches_derivative() {
        let mut d = diode();
        let vmin = -5.0 * d.vt();
        for k in 0..24 {
            let v = -1.0 + k as f64 * (1.8 / 23.0);
            if v < vmin + 1e-3 || v > d.vcrit() - 1e-3 {
                continue;
            }
            let h = 1e-7;
            let (i_hi, _) = eval(&mut d, v + h);
            let (i_lo, _) = eval(&mut d, v - h);
            let (_, g) = eval(&mut d, v);
            let fd = (i_hi - i_lo) / (2.0 * h);
            // gmin is part of G but not of I
            assert_relative_eq!(g - 1e-15, fd, max_relative = 1e-6, epsilon = 1e-18);
        }
    }

    #[test]
    fn test_step_is_limited_above_vcrit() {
        let mut d = diode();
        let mut prev = d.vd();
        for target in [5.0, 100.0, 1e6, 3.0, 1e12] {
            d.update(target);
            let step = d.vd() - prev;
            assert!(step.abs() <= DIODE_MAXDIFF);
            // log compression keeps a single step to a few Vt per decade
            assert!(step < 1.0, "step {} for target {}", step, target);
            assert!(d.i().is_finite() && d.g().is_finite());
            prev = d.vd();
        }
    }

    #[test]
    fn test_reverse_bias_is_gmin() {
        let mut d = diode();
        d.update(-2.0);
        assert_relative_eq!(d.g(), 1e-15);
        assert_relative_eq!(d.i(), -1e-15);
    }

    #[test]
    fn test_rc_discharge() {
        // C discharged through R, one backward Euler step at a time
        let (r, c) = (1000.0, 1e-6);
        let tau = r * c;
        let dt = tau / 1000.0;
        let mut cap = GenericCapacitor::new(CapacitorKind::Constant);
        let mut v = 1.0;
        for n in 1..=1000 {
            cap.timestep(c, v, dt);
            // node equation: v/R + G*v + Ieq = 0
            let g = cap.g(c);
            let ieq = cap.ieq(c, v);
            v = -ieq / (1.0 / r + g);
            let exact = (-(n as f64) * dt / tau).exp();
            assert_relative_eq!(v, exact, max_relative = 0.01);
        }
    }

    #[test]
    fn test_variable_capacitor_averages() {
        let mut cap = GenericCapacitor::new(CapacitorKind::Variable);
        cap.timestep(1e-6, 2.0, 1e-3);
        assert_relative_eq!(cap.g(3e-6), 1e3 * 0.5 * 4e-6);
        assert_relative_eq!(cap.ieq(3e-6, 0.0), -1e3 * 0.5 * 4e-6 * 2.0);
    }
}
