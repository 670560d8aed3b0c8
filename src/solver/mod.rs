//! Analog solver.
//!
//! Analog nets are grouped into independent systems (see [`split_nets`]).
//! Each system gets a [`MatrixSolver`] which assembles the two-pole stamps
//! of its nets into a dense matrix:
//!
//! ```text
//! A[k][k] += gt          for every terminal on net k
//! A[k][j] += go          partner terminal on net j of the same system
//! RHS[k]  += Idr
//! RHS[k]  -= go * V      partner terminal on a rail net
//! ```
//!
//! The system is solved by LU decomposition or, if `METHOD` asks for it,
//! by GMRES or SOR iterations that fall back to LU when they do not
//! converge within `GS_LOOPS`.
//!
//! Nonlinear devices are relinearized in a Newton-Raphson loop until the
//! node voltages settle. Timestep devices (capacitors, inductors) are
//! advanced either on the fixed step of the `SOLVER` device or, with
//! `DYNAMIC_TS`, on a step derived from the local truncation error.

mod matrix;
mod matrix_solver;
mod splitter;

pub use matrix::DenseMatrix;
pub use matrix_solver::{MatrixSolver, SolverStats};
pub use splitter::split_nets;

use std::collections::HashSet;

use log::{debug, info};

use crate::circuit::{
    Delegate, DeviceId, NetId, NetlistState, ParamValue, SolverId, Terminal, TerminalKind,
};
use crate::components::Device;
use crate::error::{NetlistError, Result};
use crate::time::NetlistTime;
use matrix_solver::{Partner, ProxiedInput, Row};

/// How a matrix solver solves its linear system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverMethod {
    /// LU decomposition
    Direct,
    Gmres,
    /// Gauss-Seidel sweeps
    Sor,
}

impl SolverMethod {
    /// Map an index into `MAT_CR, MAT, GMRES, SOR, SOR_MAT, SM, W`. The
    /// Sherman-Morrison and Woodbury update methods reach the same
    /// solution as a fresh decomposition.
    pub fn from_index(index: usize) -> Self {
        match index {
            2 => Self::Gmres,
            3 | 4 => Self::Sor,
            _ => Self::Direct,
        }
    }
}

/// Solver settings, read from the parameters of the `SOLVER` device.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverParams {
    pub freq: f64,
    pub gmin: f64,
    pub reltol: f64,
    pub vntol: f64,
    /// Iterative methods only
    pub accuracy: f64,
    pub nr_loops: usize,
    /// Iterative methods only
    pub gs_loops: usize,
    pub method: SolverMethod,
    pub pivot: bool,
    pub nr_recalc_delay: NetlistTime,
    pub min_ts_ts: f64,
    pub dynamic_ts: bool,
    pub dynamic_lte: f64,
    pub dynamic_min_ts: f64,
    /// `1 / freq`
    pub max_ts: f64,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            freq: 48000.0,
            gmin: 1e-9,
            reltol: 1e-3,
            vntol: 1e-7,
            accuracy: 1e-7,
            nr_loops: 250,
            gs_loops: 9,
            method: SolverMethod::Direct,
            pivot: false,
            nr_recalc_delay: NetlistTime::quantum(),
            min_ts_ts: 1e-9,
            dynamic_ts: false,
            dynamic_lte: 1e-5,
            dynamic_min_ts: 1e-6,
            max_ts: 1.0 / 48000.0,
        }
    }
}

impl SolverParams {
    /// Read the parameters of solver device `name`. Missing ones keep
    /// their defaults.
    pub fn from_state(state: &NetlistState, name: &str) -> Self {
        let get = |key: &str| {
            state
                .find_param(&format!("{}.{}", name, key))
                .map(|p| &state.params()[p].value)
        };
        let f = |key: &str, default: f64| get(key).map(ParamValue::as_f64).unwrap_or(default);
        let d = Self::default();
        let freq = f("FREQ", d.freq);
        Self {
            freq,
            gmin: f("GMIN", d.gmin),
            reltol: f("RELTOL", d.reltol),
            vntol: f("VNTOL", d.vntol),
            accuracy: f("ACCURACY", d.accuracy),
            nr_loops: f("NR_LOOPS", d.nr_loops as f64).max(1.0) as usize,
            gs_loops: f("GS_LOOPS", d.gs_loops as f64) as usize,
            method: SolverMethod::from_index(f("METHOD", 0.0) as usize),
            pivot: f("PIVOT", 0.0) != 0.0,
            nr_recalc_delay: NetlistTime::from_fp(f("NR_RECALC_DELAY", d.nr_recalc_delay.as_fp()))
                .max(NetlistTime::quantum()),
            min_ts_ts: f("MIN_TS_TS", d.min_ts_ts),
            dynamic_ts: f("DYNAMIC_TS", 0.0) != 0.0,
            dynamic_lte: f("DYNAMIC_LTE", d.dynamic_lte),
            dynamic_min_ts: f("DYNAMIC_MIN_TIMESTEP", d.dynamic_min_ts),
            max_ts: 1.0 / freq,
        }
    }
}

/// All matrix solvers of a netlist plus the fixed step clock.
#[derive(Debug, Default)]
pub struct SolverSystem {
    params: SolverParams,
    solvers: Vec<MatrixSolver>,
    step_net: Option<NetId>,
}

impl SolverSystem {
    /// Split the analog part of the netlist and create one solver per
    /// group. Must run after all devices and proxies exist.
    pub(crate) fn build(
        state: &mut NetlistState,
        devices: &[Box<dyn Device>],
        solver_device: Option<DeviceId>,
    ) -> Result<Self> {
        let groups = split_nets(state);
        let Some(owner) = solver_device else {
            if groups.is_empty() {
                return Ok(Self::default());
            }
            return Err(NetlistError::NoSolver);
        };
        let name = state.device_info(owner).name.clone();
        let params = SolverParams::from_state(state, &name);
        let step_net = state
            .find_terminal(&format!("{}.Q_step", name))
            .and_then(|t| state.terminal(t).net);

        let mut solvers = Vec::with_capacity(groups.len());
        for (i, group) in groups.into_iter().enumerate() {
            let sid = SolverId(i);
            for &n in &group {
                state.nets[n.0].solver = Some(sid);
            }
            let solver = Self::build_one(state, devices, owner, &name, sid, group, params.clone());
            solver.log_stats();
            solvers.push(solver);
        }
        debug!("{}: {} matrix solvers", name, solvers.len());

        Ok(Self {
            params,
            solvers,
            step_net,
        })
    }

    fn build_one(
        state: &mut NetlistState,
        devices: &[Box<dyn Device>],
        owner: DeviceId,
        owner_name: &str,
        sid: SolverId,
        group: Vec<NetId>,
        params: SolverParams,
    ) -> MatrixSolver {
        let mut rows = Vec::with_capacity(group.len());
        let mut device_ids = Vec::new();
        let mut seen = HashSet::new();
        let mut inputs = Vec::new();

        for &net in &group {
            let mut terms = Vec::new();
            let mut proxy = None;
            let attached = state.nets[net.0].terminals.clone();
            for t in attached {
                match state.terminals[t.0].kind {
                    TerminalKind::Terminal => {
                        state.terminals[t.0].solved = true;
                        let partner = match state.terminals[t.0].other.and_then(|o| state.terminals[o.0].net) {
                            Some(n) => match group.iter().position(|&g| g == n) {
                                Some(j) => Partner::Row(j),
                                None => Partner::Rail(n),
                            },
                            None => Partner::Open,
                        };
                        terms.push((t, partner));
                        let dev = state.terminals[t.0].device;
                        if seen.insert(dev) {
                            device_ids.push(dev);
                        }
                    }
                    // passive inputs read the net directly
                    TerminalKind::AnalogInput if state.terminals[t.0].delegate != Delegate::None => {
                        // move the input onto a net driven after each solve
                        let target = match proxy {
                            Some(p) => p,
                            None => {
                                let proxy_name = format!("{}.{}.proxy{}", owner_name, sid, inputs.len());
                                let out = state.add_output(Terminal::new(
                                    proxy_name,
                                    owner,
                                    TerminalKind::AnalogOutput,
                                    Delegate::None,
                                ));
                                let p = state.terminals[out.0].net.unwrap_or(net);
                                inputs.push(ProxiedInput { source: net, proxy: p });
                                proxy = Some(p);
                                p
                            }
                        };
                        state.detach(t);
                        state.attach(t, target);
                    }
                    _ => {}
                }
            }
            rows.push(Row::new(net, terms));
        }

        let dynamic = device_ids.iter().copied().filter(|d| devices[d.0].is_dynamic()).collect();
        let timestep = device_ids.iter().copied().filter(|d| devices[d.0].is_timestep()).collect();

        let fb = state.add_terminal(Terminal::new(
            format!("{}.FB_sync{}", owner_name, sid.0),
            owner,
            TerminalKind::LogicInput,
            Delegate::SolverSync(sid),
        ));
        let q = state.add_output(Terminal::new(
            format!("{}.Q_sync{}", owner_name, sid.0),
            owner,
            TerminalKind::LogicOutput,
            Delegate::None,
        ));
        let sync_net = state.terminals[q.0].net.unwrap_or(NetId(0));
        state.attach(fb, sync_net);

        MatrixSolver::new(
            sid,
            sid.to_string(),
            params,
            rows,
            dynamic,
            timestep,
            inputs,
            sync_net,
        )
    }

    pub fn params(&self) -> &SolverParams {
        &self.params
    }

    pub fn solvers(&self) -> &[MatrixSolver] {
        &self.solvers
    }

    pub fn is_empty(&self) -> bool {
        self.solvers.is_empty()
    }

    pub fn reset(&mut self) {
        for s in &mut self.solvers {
            s.reset();
        }
    }

    /// Main time step: advance the timestepping solvers (all solvers
    /// during start up) and schedule the next step.
    pub(crate) fn step(&mut self, state: &mut NetlistState, devices: &mut [Box<dyn Device>]) {
        if self.params.dynamic_ts {
            return;
        }
        let max_ts = NetlistTime::from_fp(self.params.max_ts);
        let force = state.time < NetlistTime::from_fp(2.0 * self.params.max_ts);
        for s in &mut self.solvers {
            if force || s.has_timestep_devices() {
                s.solve(state, devices);
            }
        }
        for s in &self.solvers {
            if force || s.has_timestep_devices() {
                s.update_inputs(state);
            }
        }
        if let Some(net) = self.step_net {
            if !state.nets[net.0].is_queued() {
                state.toggle_and_push(net, max_ts);
            }
        }
    }

    /// The solver's own sync input fired.
    pub(crate) fn sync(&mut self, sid: SolverId, state: &mut NetlistState, devices: &mut [Box<dyn Device>]) {
        let dynamic_ts = self.params.dynamic_ts;
        let Some(s) = self.solvers.get_mut(sid.0) else {
            return;
        };
        let ts = s.solve(state, devices);
        s.update_inputs(state);
        if s.failed() || (dynamic_ts && s.has_timestep_devices() && ts > NetlistTime::zero()) {
            state.reschedule(s.sync_net(), ts);
        }
    }

    /// Something the solver depends on changed: solve right away.
    pub(crate) fn solve_now(&mut self, sid: SolverId, state: &mut NetlistState, devices: &mut [Box<dyn Device>]) {
        let dynamic_ts = self.params.dynamic_ts;
        let min_ts = NetlistTime::from_fp(self.params.dynamic_min_ts);
        let Some(s) = self.solvers.get_mut(sid.0) else {
            return;
        };
        let ts = s.solve(state, devices);
        s.update_inputs(state);
        if s.failed() {
            state.reschedule(s.sync_net(), ts);
        } else if dynamic_ts && s.has_timestep_devices() {
            state.reschedule(s.sync_net(), min_ts);
        }
    }

    /// A device changed its stamps outside the solver loop.
    pub(crate) fn change_state(&mut self, sid: SolverId, state: &mut NetlistState) {
        let Some(s) = self.solvers.get(sid.0) else {
            return;
        };
        let delay = if s.has_timestep_devices() {
            NetlistTime::from_fp(self.params.min_ts_ts).max(NetlistTime::quantum())
        } else {
            NetlistTime::quantum()
        };
        state.reschedule(s.sync_net(), delay);
    }

    pub fn print_stats(&self) {
        for s in &self.solvers {
            let st = s.stats();
            info!(
                "{}: {} nets, {} calls, {} Newton loops, {} failures, {} iterations, {} iterative fallbacks",
                s.name(),
                s.size(),
                st.calls,
                st.newton_loops,
                st.failures,
                st.iterations,
                st.iterative_failures
            );
        }
    }
}
