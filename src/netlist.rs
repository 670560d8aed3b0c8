//! The execution kernel.
//!
//! A [`Netlist`] owns the state arena, the device objects and the matrix
//! solvers. Simulation time only advances inside [`Netlist::process_queue`],
//! which pops net events in time order and runs the delegates of every
//! terminal listening on the net.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::circuit::{
    Context, Deferred, Delegate, DeviceId, Handler, LogChannel, NetId, NetlistState, ParamValue, SolverId,
    TerminalId, DEFAULT_GMIN, USE_QUEUE_STATS,
};
use crate::components::Device;
use crate::error::{NetlistError, Result};
use crate::queue::TimedQueue;
use crate::solver::SolverSystem;
use crate::time::NetlistTime;

/// Main loop counters, only updated while stats are enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelStats {
    /// Time spent inside `process_queue`
    pub mainloop: Duration,
    /// Net events processed
    pub processed: u64,
}

/// A built netlist, ready to run after [`Netlist::reset`].
#[derive(Debug)]
pub struct Netlist {
    state: NetlistState,
    devices: Vec<Box<dyn Device>>,
    solvers: SolverSystem,
    stats: KernelStats,
    /// Listener snapshot reused by `update_devs`
    scratch: Vec<TerminalId>,
}

impl Netlist {
    pub(crate) fn new(state: NetlistState, devices: Vec<Box<dyn Device>>, solvers: SolverSystem) -> Self {
        Self {
            state,
            devices,
            solvers,
            stats: KernelStats::default(),
            scratch: Vec::new(),
        }
    }

    pub fn state(&self) -> &NetlistState {
        &self.state
    }

    pub fn solvers(&self) -> &SolverSystem {
        &self.solvers
    }

    pub fn time(&self) -> NetlistTime {
        self.state.time()
    }

    pub fn logs(&self) -> &[LogChannel] {
        self.state.logs()
    }

    pub fn kernel_stats(&self) -> &KernelStats {
        &self.stats
    }

    /// Collect per device call counts and timings.
    pub fn set_use_stats(&mut self, enable: bool) {
        self.state.use_stats = enable;
    }

    /// Voltage of the net the named terminal sits on.
    pub fn analog_value(&self, terminal: &str) -> Option<f64> {
        self.net_of(terminal).map(|n| self.state.net(n).q_analog())
    }

    /// Logic value of the net the named terminal sits on.
    pub fn logic_value(&self, terminal: &str) -> Option<u32> {
        self.net_of(terminal).map(|n| self.state.net(n).cur_q)
    }

    fn net_of(&self, terminal: &str) -> Option<NetId> {
        let t = self
            .state
            .find_terminal(terminal)
            .or_else(|| self.state.find_terminal(&format!("{}.Q", terminal)))?;
        self.state.terminal(t).net
    }

    /// The global minimum conductance, set by the solver device.
    pub fn gmin(&self) -> f64 {
        self.state.gmin
    }

    // ============ Reset ============

    /// Bring every net and device into its power-on state and run the
    /// startup strategy selected by `NETLIST.STARTUP_STRATEGY`.
    pub fn reset(&mut self) {
        self.state.time = NetlistTime::zero();
        self.state.queue.clear();
        self.state.pending.clear();
        self.state.gmin = self.configured_gmin();
        for log in &mut self.state.logs {
            log.samples.clear();
        }

        self.state.reset_nets();
        for info in &mut self.state.devices {
            info.active_outputs = 1;
        }
        debug!("Call reset on all devices");
        for (i, dev) in self.devices.iter_mut().enumerate() {
            dev.reset(&mut Context::new(&mut self.state, DeviceId(i)));
        }
        debug!("Call update_param on all devices");
        for (i, dev) in self.devices.iter_mut().enumerate() {
            dev.update_param(&mut Context::new(&mut self.state, DeviceId(i)));
        }
        self.solvers.reset();

        match self.startup_strategy() {
            1 => {
                debug!("Using brute force backward startup strategy");
                for i in (0..self.devices.len()).rev() {
                    self.call_update::<false>(DeviceId(i), Handler::DEFAULT);
                }
            }
            2 => {
                debug!("Using brute force forward startup strategy");
                for i in 0..self.devices.len() {
                    self.call_update::<false>(DeviceId(i), Handler::DEFAULT);
                }
            }
            _ => self.startup_delegates(),
        }
        self.drain_pending();
        self.state.rebuild_lists();
    }

    /// `GMIN` of the solver device, the default without one.
    fn configured_gmin(&self) -> f64 {
        self.state
            .devices
            .iter()
            .filter(|d| d.type_name == "SOLVER")
            .find_map(|d| self.state.find_param(&format!("{}.GMIN", d.name)))
            .map(|p| self.state.params()[p].value.as_f64())
            .filter(|&g| g > 0.0)
            .unwrap_or(DEFAULT_GMIN)
    }

    fn startup_strategy(&self) -> i64 {
        self.state
            .find_param("NETLIST.STARTUP_STRATEGY")
            .map(|p| self.state.params()[p].value.as_f64() as i64)
            .unwrap_or(0)
    }

    /// Run every distinct terminal delegate once, then update the devices
    /// nobody triggered.
    fn startup_delegates(&mut self) {
        let mut seen: HashSet<(Delegate, Option<SolverId>)> = HashSet::new();
        let mut updated = vec![false; self.devices.len()];
        for net in 0..self.state.nets.len() {
            let terms = self.state.nets[net].terminals.clone();
            for t in terms {
                let delegate = self.state.delegate(t);
                let solver = match delegate {
                    Delegate::None => continue,
                    Delegate::Device { device, .. } => {
                        updated[device.0] = true;
                        None
                    }
                    Delegate::SolveNow => self.state.solver_for_pole(t),
                    _ => None,
                };
                if seen.insert((delegate, solver)) {
                    self.run_delegate::<false>(t);
                }
            }
        }
        for (i, _) in updated.iter().enumerate().filter(|(_, &u)| !u) {
            debug!("\t ...{}", self.state.devices[i].name);
            self.call_update::<false>(DeviceId(i), Handler::DEFAULT);
        }
    }

    // ============ Main loop ============

    /// Advance simulation time by `delta`, processing every event due up to
    /// then.
    pub fn process_queue(&mut self, delta: NetlistTime) {
        if self.state.use_stats {
            self.process_queue_stats::<true>(delta);
        } else {
            self.process_queue_stats::<false>(delta);
        }
    }

    fn process_queue_stats<const KEEP_STATS: bool>(&mut self, delta: NetlistTime) {
        let start = KEEP_STATS.then(Instant::now);
        let stop = self.state.time + delta;
        // an entry without a net marks the end of the slice
        self.state.queue.emplace::<false>(stop, None);

        loop {
            let entry = self.state.queue.pop();
            if entry.exec_time().is_never() {
                break;
            }
            self.state.time = entry.exec_time();
            let Some(net) = entry.object() else {
                break;
            };
            self.update_devs::<KEEP_STATS>(net);
            if KEEP_STATS {
                self.stats.processed += 1;
            }
        }

        if let Some(start) = start {
            self.stats.mainloop += start.elapsed();
        }
    }

    /// End the running `process_queue` slice at the current time.
    pub fn abort_current_queue_slice(&mut self) {
        self.state.queue.remove::<false>(None);
        let now = self.state.time;
        self.state.queue.emplace::<false>(now, None);
    }

    /// Deliver a net's new value to its listeners.
    fn update_devs<const KEEP_STATS: bool>(&mut self, net: NetId) {
        let Some(mask) = self.state.deliver(net) else {
            return;
        };
        let mut listeners = std::mem::take(&mut self.scratch);
        listeners.clear();
        listeners.extend_from_slice(&self.state.nets[net.0].active);
        for &t in &listeners {
            if self.state.terminals[t.0].state.accepts(mask) {
                self.run_delegate::<KEEP_STATS>(t);
            }
        }
        self.scratch = listeners;
    }

    fn run_delegate<const KEEP_STATS: bool>(&mut self, t: TerminalId) {
        match self.state.delegate(t) {
            Delegate::None => {}
            Delegate::Device { device, handler } => self.call_update::<KEEP_STATS>(device, handler),
            Delegate::SolveNow => {
                if let Some(sid) = self.state.solver_for_pole(t) {
                    self.solvers.solve_now(sid, &mut self.state, &mut self.devices);
                }
            }
            Delegate::SolverSync(sid) => self.solvers.sync(sid, &mut self.state, &mut self.devices),
            Delegate::SolverStep => self.solvers.step(&mut self.state, &mut self.devices),
        }
        self.drain_pending();
    }

    fn call_update<const KEEP_STATS: bool>(&mut self, device: DeviceId, handler: Handler) {
        let start = KEEP_STATS.then(Instant::now);
        self.devices[device.0].update(&mut Context::new(&mut self.state, device), handler);
        if let Some(start) = start {
            let stats = &mut self.state.devices[device.0].stats;
            stats.calls += 1;
            stats.total_time += start.elapsed();
        }
    }

    /// Carry out what device callbacks asked for.
    fn drain_pending(&mut self) {
        while let Some(ev) = self.state.pending.pop_front() {
            match ev {
                Deferred::IncActive { device, net } => {
                    let seen = self.state.nets[net.0].cur_q;
                    self.devices[device.0].inc_active(&mut Context::new(&mut self.state, device));
                    self.state.release_woken(net, seen);
                }
                Deferred::DecActive(device) => {
                    self.devices[device.0].dec_active(&mut Context::new(&mut self.state, device));
                }
                Deferred::SolveNow(sid) => self.solvers.solve_now(sid, &mut self.state, &mut self.devices),
                Deferred::ChangeState(sid) => self.solvers.change_state(sid, &mut self.state),
            }
        }
    }

    // ============ Parameters ============

    /// Set a parameter from text, e.g. `set_param("I1.IN", "1")`, and let
    /// the device pick it up.
    pub fn set_param(&mut self, name: &str, value: &str) -> Result<()> {
        let p = self
            .state
            .find_param(name)
            .ok_or_else(|| NetlistError::ParamNotFound { name: name.to_string() })?;
        let v = self.state.params[p].value.parse_like(name, value)?;
        self.apply_param(p, v);
        Ok(())
    }

    /// Set a parameter to a value of the same type as the current one.
    pub fn set_param_value(&mut self, name: &str, value: ParamValue) -> Result<()> {
        let p = self
            .state
            .find_param(name)
            .ok_or_else(|| NetlistError::ParamNotFound { name: name.to_string() })?;
        let current = &self.state.params[p].value;
        if std::mem::discriminant(current) != std::mem::discriminant(&value) {
            return Err(NetlistError::invalid_parameter(
                name,
                format!("expected {} value, got {}", current.type_name(), value.type_name()),
            ));
        }
        self.apply_param(p, value);
        Ok(())
    }

    fn apply_param(&mut self, p: usize, value: ParamValue) {
        self.state.params[p].value = value;
        let device = self.state.params[p].device;
        let gmin = self.state.gmin;
        self.devices[device.0].update_param(&mut Context::new(&mut self.state, device));
        if self.state.gmin != gmin {
            debug!("gmin changed to {}, updating all devices", self.state.gmin);
            for (i, dev) in self.devices.iter_mut().enumerate() {
                if i != device.0 {
                    dev.update_param(&mut Context::new(&mut self.state, DeviceId(i)));
                }
            }
        }
        self.drain_pending();
    }

    // ============ Shutdown ============

    /// Finish the simulation and report statistics.
    pub fn stop(&mut self) {
        debug!("Printing statistics ...");
        self.print_stats();
    }

    pub fn print_stats(&self) {
        if self.state.use_stats {
            let mut order: Vec<usize> = (0..self.state.devices.len()).collect();
            order.sort_by_key(|&i| self.state.devices[i].stats.total_time);

            let mut total_time = Duration::ZERO;
            let mut total_count = 0u64;
            for &i in &order {
                let d = &self.state.devices[i];
                info!(
                    "Device {:20} : {:12} {:15?} {:12}",
                    d.name, d.stats.calls, d.stats.total_time, d.stats.inc_active
                );
                total_time += d.stats.total_time;
                total_count += d.stats.calls;
            }
            info!(
                "Total calls : {:12} {:12?} {:12?}",
                total_count,
                total_time,
                total_time / total_count.max(1) as u32
            );
            info!("Total loop     {:15?}", self.stats.mainloop);
            info!("Events         {:15}", self.stats.processed);

            if USE_QUEUE_STATS {
                let q = self.state.queue().stats();
                info!("Queue Pushes   {:15}", q.calls);
                info!("Queue Moves    {:15}", q.sort_moves);
                info!("Queue Removes  {:15}", q.removes);
                info!("Queue Retimes  {:15}", q.retimes);
            }

            // 200 ppm of all calls
            let trigger = total_count * 200 / 1_000_000;
            for d in &self.state.devices {
                let s = &d.stats;
                if s.inc_active > 3 * s.calls && s.inc_active > trigger {
                    info!(
                        "HINT({}, NO_DEACTIVATE) // {} {} {}",
                        d.name,
                        s.inc_active as f64 / s.calls.max(1) as f64,
                        s.inc_active,
                        s.calls
                    );
                }
            }
        }
        self.solvers.print_stats();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::TerminalState;
    use crate::components::generic::{thermal_voltage, T0};
    use crate::dsl::load;
    use approx::assert_abs_diff_eq;

    const OSCILLATOR: &str = "
        TRUTHTABLE_START(INV10, 1, 1, \"+A\")
            TT_HEAD(\"A|Q\")
            TT_LINE(\"0|1|10\")
            TT_LINE(\"1|0|10\")
            TT_FAMILY(\"74XX\")
        TRUTHTABLE_END()

        TRUTHTABLE_START(BUF15, 1, 1, \"+A\")
            TT_HEAD(\"A|Q\")
            TT_LINE(\"0|0|15\")
            TT_LINE(\"1|1|15\")
            TT_FAMILY(\"74XX\")
        TRUTHTABLE_END()

        INV10(G1)
        BUF15(G2, G1.Q)
        NET_C(G2.Q, G1.A)
    ";

    #[test]
    fn test_ring_oscillator_period() {
        let mut nl = load(OSCILLATOR, None).unwrap();
        nl.reset();

        // G1 rises at 10 ns, then toggles every 10 + 15 ns
        nl.process_queue(NetlistTime::from_nsec(22));
        let mut expected = 1;
        for _ in 0..200 {
            assert_eq!(nl.logic_value("G1.Q"), Some(expected));
            assert!(nl.state().queue().size() <= 2);
            nl.process_queue(NetlistTime::from_nsec(25));
            expected ^= 1;
        }
        assert_eq!(nl.time(), NetlistTime::from_nsec(22 + 200 * 25));
    }

    #[test]
    fn test_abort_ends_slice() {
        let mut nl = load(OSCILLATOR, None).unwrap();
        nl.reset();
        nl.abort_current_queue_slice();
        // the marker moved to t = 0, so nothing but it is popped
        nl.process_queue(NetlistTime::from_nsec(100));
        assert_eq!(nl.time(), NetlistTime::zero());
        assert_eq!(nl.logic_value("G1.Q"), Some(0));
    }

    #[test]
    fn test_diode_clamp_operating_point() {
        let mut nl = load(
            "SOLVER(Solver, 48000)
             ANALOG_INPUT(V, 5)
             RES(R1, 1k)
             DIODE(D1, \"D(IS=1e-15 N=1)\")
             NET_C(V, R1.1)
             NET_C(R1.2, D1.A)
             NET_C(D1.K, GND)",
            None,
        )
        .unwrap();
        nl.reset();
        nl.process_queue(NetlistTime::from_msec(1));

        // 5 - vd = R * Is * (exp(vd / Vt) - 1)
        let vt = thermal_voltage(1.0, T0);
        let f = |vd: f64| 5.0 - vd - 1e3 * 1e-15 * ((vd / vt).exp() - 1.0);
        let (mut lo, mut hi) = (0.0, 1.0);
        for _ in 0..100 {
            let mid = 0.5 * (lo + hi);
            if f(mid) > 0.0 {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        let vd = nl.analog_value("D1.A").unwrap();
        assert_abs_diff_eq!(vd, lo, epsilon = 1e-3);
        assert_abs_diff_eq!(nl.analog_value("R1.1").unwrap(), 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_iterative_solver_methods() {
        for method in ["GMRES", "SOR"] {
            let src = format!(
                "SOLVER(Solver, 48000)
                 PARAM(Solver.METHOD, \"{}\")
                 ANALOG_INPUT(V, 10)
                 RES(R1, 1k)
                 RES(R2, 3k)
                 RES(R3, 2k)
                 NET_C(V, R1.1)
                 NET_C(R1.2, R2.1, R3.1)
                 NET_C(R2.2, GND)
                 NET_C(R3.2, GND)",
                method
            );
            let mut nl = load(&src, None).unwrap();
            nl.reset();
            nl.process_queue(NetlistTime::from_usec(1));
            // 10 V over 1k into 3k || 2k
            assert_abs_diff_eq!(nl.analog_value("R1.2").unwrap(), 5.454_545, epsilon = 1e-5);
            let stats = nl.solvers().solvers()[0].stats();
            assert!(stats.iterations > 0, "{}", method);
        }
    }

    #[test]
    fn test_solver_gmin_reaches_capacitor() {
        let mut nl = load(
            "SOLVER(Solver, 48000)
             PARAM(Solver.GMIN, 1e-3)
             ANALOG_INPUT(V, 5)
             RES(R1, 1k)
             CAP(C1, 1u)
             NET_C(V, R1.1)
             NET_C(R1.2, C1.1)
             NET_C(C1.2, GND)",
            None,
        )
        .unwrap();
        nl.reset();
        assert_eq!(nl.gmin(), 1e-3);
        nl.process_queue(NetlistTime::from_nsec(1));
        // before the first time step the capacitor is a gmin conductance
        assert_abs_diff_eq!(nl.analog_value("C1.1").unwrap(), 2.5, epsilon = 1e-9);
    }

    #[test]
    fn test_runtime_gmin_change_restamps_devices() {
        let mut nl = load(
            "SOLVER(Solver, 48000)
             ANALOG_INPUT(V, 5)
             RES(R1, 1k)
             SWITCH(S1)
             NET_C(V, R1.1)
             NET_C(R1.2, S1.1)
             NET_C(S1.2, GND)",
            None,
        )
        .unwrap();
        nl.reset();
        nl.process_queue(NetlistTime::from_usec(1));
        assert_abs_diff_eq!(nl.analog_value("S1.1").unwrap(), 5.0, epsilon = 1e-3);

        // an open switch is 1 / gmin
        nl.set_param("Solver.GMIN", "1e-3").unwrap();
        nl.process_queue(NetlistTime::from_usec(1));
        assert_eq!(nl.gmin(), 1e-3);
        assert_abs_diff_eq!(nl.analog_value("S1.1").unwrap(), 2.5, epsilon = 1e-9);
    }

    #[test]
    fn test_reset_clears_log_samples() {
        let mut nl = load(
            "SOLVER(Solver, 48000)
             CLOCK(CLK, 1000)
             LOG(L1, CLK.Q)",
            None,
        )
        .unwrap();
        nl.reset();
        nl.process_queue(NetlistTime::from_msec(5));
        let first = nl.logs()[0].samples.len();
        assert!(first > 0);

        nl.reset();
        nl.process_queue(NetlistTime::from_msec(5));
        let samples = &nl.logs()[0].samples;
        assert_eq!(samples.len(), first);
        assert!(samples.windows(2).all(|w| w[0].0 <= w[1].0));
    }

    #[test]
    fn test_deactivated_chain_wakes_up() {
        let mut nl = load(
            "PARAM(NETLIST.USE_DEACTIVATE, 1)
             TTL_INPUT(I1, 1)
             TTL_INPUT(I2, 0)
             TTL_INPUT(H, 1)
             TTL_7400_NAND(N1, I1, H)
             TTL_7400_NAND(N2, N1.Q, H)
             TTL_7400_NAND(N3, N2.Q, I2)",
            None,
        )
        .unwrap();
        nl.reset();
        nl.process_queue(NetlistTime::from_usec(1));
        assert_eq!(nl.logic_value("N2.Q"), Some(1));
        assert_eq!(nl.logic_value("N3.Q"), Some(1));

        // N3 ignores N2 while I2 is low, so N1 and N2 went to sleep
        let n1a = nl.state().find_terminal("N1.A").unwrap();
        assert_eq!(nl.state().terminal(n1a).state, TerminalState::Passive);

        nl.set_param("I1.IN", "0").unwrap();
        nl.process_queue(NetlistTime::from_usec(1));
        assert_eq!(nl.logic_value("N1.Q"), Some(0));

        // listening again pulls the change through the chain
        nl.set_param("I2.IN", "1").unwrap();
        nl.process_queue(NetlistTime::from_usec(1));
        assert_eq!(nl.logic_value("N1.Q"), Some(1));
        assert_eq!(nl.logic_value("N2.Q"), Some(0));
        assert_eq!(nl.logic_value("N3.Q"), Some(1));
    }

    #[test]
    fn test_stats_count_device_calls() {
        let mut nl = load(OSCILLATOR, None).unwrap();
        nl.set_use_stats(true);
        nl.reset();
        nl.process_queue(NetlistTime::from_nsec(1000));
        let g1 = nl.state().find_device("G1").unwrap();
        assert!(nl.state().device_info(g1).stats.calls >= 39);
        assert!(nl.kernel_stats().processed >= 79);
        nl.stop();
    }

    #[test]
    fn test_set_param_errors() {
        let mut nl = load("TTL_INPUT(I1, 1)", None).unwrap();
        nl.reset();
        assert!(matches!(
            nl.set_param("I1.NOPE", "1"),
            Err(NetlistError::ParamNotFound { .. })
        ));
        assert!(matches!(
            nl.set_param_value("I1.IN", ParamValue::Float(1.0)),
            Err(NetlistError::InvalidParameter { .. })
        ));
        nl.set_param_value("I1.IN", ParamValue::Logic(false)).unwrap();
        nl.process_queue(NetlistTime::from_nsec(10));
        assert_eq!(nl.logic_value("I1"), Some(0));
    }
}
