//! Newton-Raphson solver for one group of coupled analog nets.

use log::{debug, warn};

use super::matrix::DenseMatrix;
use super::{SolverMethod, SolverParams};
use crate::circuit::{Context, DeviceId, NetId, NetlistState, SolverId, TerminalId};
use crate::components::Device;
use crate::error::Result;
use crate::time::NetlistTime;

/// Relaxation factor of the SOR sweeps.
const SOR_OMEGA: f64 = 1.0;

/// Where the other end of a two-pole terminal sits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Partner {
    /// A net of this solver
    Row(usize),
    /// A net with a fixed voltage
    Rail(NetId),
    /// Not connected
    Open,
}

/// One solved net: a matrix row.
#[derive(Debug, Clone)]
pub(crate) struct Row {
    pub net: NetId,
    pub terms: Vec<(TerminalId, Partner)>,
    /// Voltage before the last solve
    last_v: f64,
    /// Voltage change and step of the previous solve, for the LTE estimate
    dd_n_m_1: f64,
    h_n_m_1: f64,
}

impl Row {
    pub fn new(net: NetId, terms: Vec<(TerminalId, Partner)>) -> Self {
        Self {
            net,
            terms,
            last_v: 0.0,
            dd_n_m_1: 0.0,
            h_n_m_1: 1e-9,
        }
    }
}

/// An analog input moved off a solved net. After each solve the proxy
/// output is driven with the solved voltage.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ProxiedInput {
    pub source: NetId,
    pub proxy: NetId,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SolverStats {
    pub calls: u64,
    pub newton_loops: u64,
    pub failures: u64,
    /// GMRES steps or SOR sweeps
    pub iterations: u64,
    /// Iterative solves that fell back to LU
    pub iterative_failures: u64,
}

#[derive(Debug)]
pub struct MatrixSolver {
    id: SolverId,
    name: String,
    params: SolverParams,
    rows: Vec<Row>,
    matrix: DenseMatrix,
    dynamic: Vec<DeviceId>,
    timestep: Vec<DeviceId>,
    inputs: Vec<ProxiedInput>,
    sync_net: NetId,
    last_step: Option<NetlistTime>,
    failed: bool,
    stats: SolverStats,
}

impl MatrixSolver {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: SolverId,
        name: String,
        params: SolverParams,
        rows: Vec<Row>,
        dynamic: Vec<DeviceId>,
        timestep: Vec<DeviceId>,
        inputs: Vec<ProxiedInput>,
        sync_net: NetId,
    ) -> Self {
        let size = rows.len();
        Self {
            id,
            name,
            params,
            rows,
            matrix: DenseMatrix::new(size),
            dynamic,
            timestep,
            inputs,
            sync_net,
            last_step: None,
            failed: false,
            stats: SolverStats::default(),
        }
    }

    pub fn id(&self) -> SolverId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.rows.len()
    }

    pub fn nets(&self) -> impl Iterator<Item = NetId> + '_ {
        self.rows.iter().map(|r| r.net)
    }

    pub fn has_dynamic_devices(&self) -> bool {
        !self.dynamic.is_empty()
    }

    pub fn has_timestep_devices(&self) -> bool {
        !self.timestep.is_empty()
    }

    pub fn stats(&self) -> &SolverStats {
        &self.stats
    }

    pub(crate) fn sync_net(&self) -> NetId {
        self.sync_net
    }

    /// Whether the last solve ran out of Newton iterations.
    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn reset(&mut self) {
        self.last_step = None;
        self.failed = false;
        for r in &mut self.rows {
            r.last_v = 0.0;
            r.dd_n_m_1 = 0.0;
            r.h_n_m_1 = 1e-9;
        }
    }

    /// Bring the nets up to the current time. Returns the delay after
    /// which the solver wants to run again (zero for never).
    ///
    /// The first solve after a reset computes the operating point without
    /// advancing timestep devices.
    pub fn solve(&mut self, state: &mut NetlistState, devices: &mut [Box<dyn Device>]) -> NetlistTime {
        let now = state.time;
        let delta = match self.last_step {
            Some(last) => {
                let d = now - last;
                // already up to date
                if d < NetlistTime::quantum() {
                    return if self.has_timestep_devices() {
                        NetlistTime::from_fp(self.params.dynamic_min_ts)
                    } else {
                        NetlistTime::zero()
                    };
                }
                Some(d)
            }
            None => None,
        };

        for r in &mut self.rows {
            r.last_v = state.nets[r.net.0].cur_analog;
        }
        self.last_step = Some(now);
        self.stats.calls += 1;

        if let Some(d) = delta {
            let step = d.as_fp();
            for &dev in &self.timestep {
                devices[dev.0].timestep(&mut Context::new(state, dev), step);
            }
        }

        self.failed = if self.has_dynamic_devices() {
            !self.solve_newton(state, devices)
        } else {
            !self.solve_linear(state)
        };
        if self.failed {
            self.stats.failures += 1;
            return self.params.nr_recalc_delay;
        }

        if !self.has_timestep_devices() {
            return NetlistTime::zero();
        }
        match delta {
            Some(d) if self.params.dynamic_ts => self.next_timestep(state, d.as_fp()),
            None if self.params.dynamic_ts => NetlistTime::from_fp(self.params.dynamic_min_ts),
            _ => NetlistTime::from_fp(self.params.max_ts),
        }
    }

    fn solve_linear(&mut self, state: &mut NetlistState) -> bool {
        self.build(state);
        if let Err(e) = self.solve_system(state) {
            warn!("{}: {}", self.name, e);
            return false;
        }
        self.store(state);
        true
    }

    /// Solve the assembled system. Iterative methods start from the
    /// present voltages.
    fn solve_system(&mut self, state: &NetlistState) -> Result<()> {
        let loops = self.params.gs_loops.max(1);
        let accuracy = self.params.accuracy;
        if self.params.method == SolverMethod::Direct {
            return self.matrix.factor_and_solve();
        }
        for (x, r) in self.matrix.x.iter_mut().zip(&self.rows) {
            *x = state.nets[r.net.0].cur_analog;
        }
        let steps = match self.params.method {
            SolverMethod::Gmres => self.matrix.solve_gmres(loops, accuracy),
            _ => self.matrix.solve_sor(SOR_OMEGA, loops, accuracy),
        };
        match steps {
            Some(n) => {
                self.stats.iterations += n as u64;
                Ok(())
            }
            None => {
                self.stats.iterative_failures += 1;
                self.matrix.factor_and_solve()
            }
        }
    }

    fn solve_newton(&mut self, state: &mut NetlistState, devices: &mut [Box<dyn Device>]) -> bool {
        for _ in 0..self.params.nr_loops {
            for &dev in &self.dynamic {
                devices[dev.0].update_terminals(&mut Context::new(state, dev));
            }
            self.build(state);
            if let Err(e) = self.solve_system(state) {
                warn!("{}: {}", self.name, e);
                return false;
            }
            self.stats.newton_loops += 1;
            if self.store(state) {
                return true;
            }
        }
        warn!(
            "{}: no convergence after {} Newton-Raphson loops at {}",
            self.name, self.params.nr_loops, state.time
        );
        false
    }

    /// Assemble the system from the terminal stamps.
    fn build(&mut self, state: &NetlistState) {
        self.matrix.clear();
        for (k, row) in self.rows.iter().enumerate() {
            for &(t, partner) in &row.terms {
                let term = &state.terminals[t.0];
                self.matrix.add(k, k, term.gt);
                self.matrix.add_rhs(k, term.idr);
                match partner {
                    Partner::Row(j) => self.matrix.add(k, j, term.go),
                    Partner::Rail(n) => self.matrix.add_rhs(k, -term.go * state.nets[n.0].cur_analog),
                    Partner::Open => {}
                }
            }
        }
    }

    /// Write the solution to the nets. Returns whether every voltage
    /// moved less than the tolerance.
    fn store(&mut self, state: &mut NetlistState) -> bool {
        let reltol = self.params.reltol;
        let vntol = self.params.vntol;
        let mut converged = true;
        for (row, &v) in self.rows.iter().zip(&self.matrix.x) {
            let net = &mut state.nets[row.net.0];
            let old = net.cur_analog;
            if (v - old).abs() > v.abs().max(old.abs()) * reltol + vntol {
                converged = false;
            }
            net.cur_analog = v;
        }
        converged
    }

    /// Step size from the local truncation error of every net.
    fn next_timestep(&mut self, state: &NetlistState, cur_ts: f64) -> NetlistTime {
        let mut ts = self.params.max_ts;
        for r in &mut self.rows {
            let dd_n = state.nets[r.net.0].cur_analog - r.last_v;
            let hn = cur_ts;
            let dd2 = (dd_n / hn - r.dd_n_m_1 / r.h_n_m_1) / (hn + r.h_n_m_1);
            r.h_n_m_1 = hn;
            r.dd_n_m_1 = dd_n;
            let net_ts = if dd2.abs() > 2.0 * f64::EPSILON {
                (self.params.dynamic_lte / (0.5 * dd2).abs()).sqrt()
            } else {
                self.params.max_ts
            };
            ts = ts.min(net_ts);
        }
        NetlistTime::from_fp(ts.max(self.params.dynamic_min_ts))
    }

    /// Drive the proxied analog inputs with the solved voltages.
    pub fn update_inputs(&self, state: &mut NetlistState) {
        for inp in &self.inputs {
            let v = state.nets[inp.source.0].cur_analog;
            state.push_analog(inp.proxy, v);
        }
    }

    pub fn log_stats(&self) {
        debug!(
            "{}: {} nets, {} dynamic, {} timestep devices",
            self.name,
            self.rows.len(),
            self.dynamic.len(),
            self.timestep.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{Delegate, DeviceInfo, NetKind, Terminal, TerminalKind};
    use approx::assert_relative_eq;

    /// Voltage divider: 10 V rail, 1k to the node, 3k to ground.
    fn divider(params: SolverParams) -> (NetlistState, MatrixSolver, NetId) {
        let mut st = NetlistState::new();
        let d = st.add_device(DeviceInfo::new("X", "TEST"));
        let v10 = st.add_output(Terminal::new("V.Q".into(), d, TerminalKind::AnalogOutput, Delegate::None));
        let gnd = st.add_output(Terminal::new("GND.Q".into(), d, TerminalKind::AnalogOutput, Delegate::None));
        let v10 = st.terminal(v10).net.unwrap_or(NetId(0));
        let gnd = st.terminal(gnd).net.unwrap_or(NetId(0));
        st.nets[v10.0].cur_analog = 10.0;
        let node = st.add_net("node", NetKind::Analog, None);

        let mut term = |g: f64| {
            let mut t = Terminal::new("R".into(), d, TerminalKind::Terminal, Delegate::SolveNow);
            t.solved = true;
            t.set_go_gt_i(-g, g, 0.0);
            st.add_terminal(t)
        };
        let t1 = term(1e-3);
        let t2 = term(1.0 / 3e3);

        let rows = vec![Row::new(node, vec![(t1, Partner::Rail(v10)), (t2, Partner::Rail(gnd))])];
        let s = MatrixSolver::new(
            SolverId(0),
            "Solver_0".into(),
            params,
            rows,
            Vec::new(),
            Vec::new(),
            Vec::new(),
            NetId(0),
        );
        (st, s, node)
    }

    #[test]
    fn test_linear_divider() {
        let (mut st, mut s, node) = divider(SolverParams::default());
        let mut devices: Vec<Box<dyn Device>> = Vec::new();
        let next = s.solve(&mut st, &mut devices);
        assert_eq!(next, NetlistTime::zero());
        assert_relative_eq!(st.net(node).cur_analog, 7.5, epsilon = 1e-9);
        assert_eq!(s.stats().calls, 1);
        assert_eq!(s.stats().iterations, 0);

        // same time again does nothing
        s.solve(&mut st, &mut devices);
        assert_eq!(s.stats().calls, 1);
    }

    #[test]
    fn test_iterative_methods() {
        for method in [SolverMethod::Gmres, SolverMethod::Sor] {
            let params = SolverParams {
                method,
                ..SolverParams::default()
            };
            let (mut st, mut s, node) = divider(params);
            let mut devices: Vec<Box<dyn Device>> = Vec::new();
            s.solve(&mut st, &mut devices);
            assert_relative_eq!(st.net(node).cur_analog, 7.5, epsilon = 1e-6);
            assert!(s.stats().iterations > 0, "{:?}", method);
            assert_eq!(s.stats().iterative_failures, 0);
        }
    }
}
