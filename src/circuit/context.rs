//! The view of the netlist a device gets inside its callbacks.

use std::sync::Arc;

use super::param::{ParamBool, ParamBytes, ParamEnum, ParamF64, ParamInt, ParamStr, ParamValue};
use super::state::{Deferred, NetlistState};
use super::terminal::{AnalogInput, AnalogOutput, LogicInput, LogicOutput, Pole, Signal, TerminalState};
use super::types::{DeviceId, TerminalId};
use crate::time::NetlistTime;

/// Device callback context.
///
/// Holds the netlist state mutably for the duration of one callback. Net
/// changes go through the event queue; anything needing other devices or
/// the solvers is recorded and carried out by the kernel once the callback
/// returns.
pub struct Context<'a> {
    pub(crate) state: &'a mut NetlistState,
    pub(crate) device: DeviceId,
}

impl<'a> Context<'a> {
    pub(crate) fn new(state: &'a mut NetlistState, device: DeviceId) -> Self {
        Self { state, device }
    }

    pub fn time(&self) -> NetlistTime {
        self.state.time
    }

    pub fn name(&self) -> &str {
        &self.state.devices[self.device.0].name
    }

    pub fn gmin(&self) -> f64 {
        self.state.gmin
    }

    pub fn set_gmin(&mut self, gmin: f64) {
        self.state.gmin = gmin;
    }

    pub fn set_active_outputs(&mut self, n: i32) {
        self.state.devices[self.device.0].active_outputs = n;
    }

    fn net_of(&self, t: TerminalId) -> Option<super::types::NetId> {
        self.state.terminals[t.0].net
    }

    // ============ Logic ============

    /// Current value of a logic input.
    pub fn input(&self, i: LogicInput) -> Signal {
        self.net_of(i.0).map(|n| self.state.nets[n.0].cur_q).unwrap_or(0)
    }

    /// Time the net feeding `i` last changed or will change.
    pub fn next_scheduled(&self, i: LogicInput) -> NetlistTime {
        self.net_of(i.0)
            .map(|n| self.state.nets[n.0].next_scheduled)
            .unwrap_or_default()
    }

    /// Pending value of an output.
    pub fn output(&self, o: LogicOutput) -> Signal {
        self.net_of(o.0).map(|n| self.state.nets[n.0].new_q).unwrap_or(0)
    }

    /// Drive `q` onto the output after `delay`.
    pub fn push(&mut self, o: LogicOutput, q: Signal, delay: NetlistTime) {
        if let Some(n) = self.net_of(o.0) {
            self.state.set_q_and_push(n, q, delay);
        }
    }

    /// Whether anybody besides the output itself is on its net.
    pub fn is_connected(&self, o: LogicOutput) -> bool {
        self.net_of(o.0)
            .map(|n| self.state.nets[n.0].has_connections())
            .unwrap_or(false)
    }

    /// Latch `q` to become visible at `at`, without scheduling an event.
    pub fn set_q_time(&mut self, o: LogicOutput, q: Signal, at: NetlistTime) {
        if let Some(n) = self.net_of(o.0) {
            self.state.set_q_time(n, q, at);
        }
    }

    pub fn toggle(&mut self, o: LogicOutput, delay: NetlistTime) {
        if let Some(n) = self.net_of(o.0) {
            self.state.toggle_and_push(n, delay);
        }
    }

    /// Set an output without generating an event. Only useful in `reset`.
    pub fn initial(&mut self, o: LogicOutput, q: Signal) {
        if let Some(n) = self.net_of(o.0) {
            self.state.initial(n, q);
        }
    }

    pub fn activate(&mut self, i: LogicInput) {
        self.state.activate(i.0, TerminalState::InputActive);
    }

    /// Listen for falling edges only.
    pub fn activate_hl(&mut self, i: LogicInput) {
        self.state.activate(i.0, TerminalState::InputHl);
    }

    /// Listen for rising edges only.
    pub fn activate_lh(&mut self, i: LogicInput) {
        self.state.activate(i.0, TerminalState::InputLh);
    }

    pub fn inactivate(&mut self, i: LogicInput) {
        self.state.inactivate(i.0);
    }

    /// Set the edge sensitivity without touching the active list. Only
    /// useful in `reset`, the kernel rebuilds the lists afterwards.
    pub fn set_state(&mut self, i: LogicInput, state: TerminalState) {
        self.state.terminals[i.0 .0].state = state;
    }

    pub fn is_passive(&self, i: LogicInput) -> bool {
        self.state.terminals[i.0 .0].state == TerminalState::Passive
    }

    // ============ Analog ============

    pub fn analog(&self, i: AnalogInput) -> f64 {
        self.state.terminal_voltage(i.0)
    }

    /// Drive an analog output. Listeners see the change one quantum later.
    pub fn push_analog(&mut self, o: AnalogOutput, v: f64) {
        if let Some(n) = self.net_of(o.0) {
            self.state.push_analog(n, v);
        }
    }

    pub fn initial_analog(&mut self, o: AnalogOutput, v: f64) {
        if let Some(n) = self.net_of(o.0) {
            self.state.nets[n.0].cur_analog = v;
        }
    }

    /// Voltage of the net a pole sits on.
    pub fn v(&self, p: Pole) -> f64 {
        self.state.terminal_voltage(p.0)
    }

    /// `V(p) - V(n)`.
    pub fn delta_v(&self, p: Pole, n: Pole) -> f64 {
        self.v(p) - self.v(n)
    }

    pub fn set_go_gt_i(&mut self, p: Pole, go: f64, gt: f64, idr: f64) {
        self.state.terminals[p.0 .0].set_go_gt_i(go, gt, idr);
    }

    /// Write a two-pole stamp:
    ///
    /// ```text
    /// | a11 a12 | | Vp |   | r1 |
    /// | a21 a22 | | Vn | = | r2 |
    /// ```
    #[allow(clippy::too_many_arguments)]
    pub fn set_mat(&mut self, p: Pole, n: Pole, a11: f64, a12: f64, r1: f64, a21: f64, a22: f64, r2: f64) {
        self.set_go_gt_i(p, a12, a11, r1);
        self.set_go_gt_i(n, a21, a22, r2);
    }

    /// Conductance `g` with voltage `v` and current `i` in series between
    /// the poles.
    pub fn set_g_v_i(&mut self, p: Pole, n: Pole, g: f64, v: f64, i: f64) {
        self.set_mat(p, n, g, -g, v * g - i, -g, g, -v * g + i);
    }

    /// Re-solve the analog system the pole belongs to right after this
    /// callback.
    pub fn solve_now(&mut self, p: Pole) {
        if let Some(s) = self.state.solver_for_pole(p.0) {
            self.state.pending.push_back(Deferred::SolveNow(s));
        }
    }

    /// Announce that the pole's matrix contributions changed outside of
    /// the solver loop.
    pub fn change_state(&mut self, p: Pole) {
        if let Some(s) = self.state.solver_for_pole(p.0) {
            let ev = Deferred::ChangeState(s);
            if !self.state.pending.contains(&ev) {
                self.state.pending.push_back(ev);
            }
        }
    }

    // ============ Parameters ============

    pub fn param_f64(&self, p: ParamF64) -> f64 {
        self.state.params[p.0 .0].value.as_f64()
    }

    pub fn param_int(&self, p: ParamInt) -> i64 {
        match self.state.params[p.0 .0].value {
            ParamValue::Int(v) => v,
            ref other => other.as_f64() as i64,
        }
    }

    pub fn param_bool(&self, p: ParamBool) -> bool {
        match self.state.params[p.0 .0].value {
            ParamValue::Logic(v) => v,
            ref other => other.as_f64() != 0.0,
        }
    }

    pub fn param_str(&self, p: ParamStr) -> &str {
        match &self.state.params[p.0 .0].value {
            ParamValue::Str(s) | ParamValue::Model(s) => s,
            _ => "",
        }
    }

    /// Index of the selected enum value.
    pub fn param_enum(&self, p: ParamEnum) -> usize {
        match self.state.params[p.0 .0].value {
            ParamValue::Enum { index, .. } => index,
            _ => 0,
        }
    }

    pub fn param_bytes(&self, p: ParamBytes) -> Option<Arc<[u8]>> {
        match &self.state.params[p.0 .0].value {
            ParamValue::Data(d) => Some(d.clone()),
            ParamValue::Pointer(d) => d.clone(),
            _ => None,
        }
    }

    // ============ Recording ============

    pub fn log_sample(&mut self, channel: usize, v: f64) {
        let t = self.state.time;
        if let Some(ch) = self.state.logs.get_mut(channel) {
            ch.samples.push((t, v));
        }
    }
}
