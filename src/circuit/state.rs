//! The netlist arena and net signal propagation.

use std::collections::VecDeque;
use std::time::Duration;

use log::debug;

use super::net::{Net, NetKind, QueueStatus};
use super::param::Param;
use super::terminal::{Delegate, Signal, Terminal, TerminalKind, TerminalState};
use super::types::{DeviceId, NetId, SolverId, TerminalId};
use crate::queue::{TimedQueue, DEFAULT_QUEUE_SIZE};
use crate::time::NetlistTime;

#[cfg(not(feature = "heap-queue"))]
pub type Queue = crate::queue::LinearQueue<NetId>;
#[cfg(feature = "heap-queue")]
pub type Queue = crate::queue::HeapQueue<NetId>;

/// Queue profiling is compiled in only with the `queue-stats` feature.
pub const USE_QUEUE_STATS: bool = cfg!(feature = "queue-stats");

/// Default minimum conductance until a solver sets its own.
pub const DEFAULT_GMIN: f64 = 1e-9;

/// Per device profiling counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceStats {
    pub calls: u64,
    pub total_time: Duration,
    pub inc_active: u64,
}

/// Bookkeeping the kernel keeps for every device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub type_name: String,
    /// Number of outputs somebody listens to
    pub active_outputs: i32,
    /// Whether the device may be put to sleep
    pub hint_deactivate: bool,
    pub stats: DeviceStats,
}

impl DeviceInfo {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            active_outputs: 1,
            hint_deactivate: false,
            stats: DeviceStats::default(),
        }
    }
}

/// Work that needs access to devices or solvers and therefore runs after
/// the current callback returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Deferred {
    /// Run the device's `inc_active` hook, then release whatever it latched on `net`
    /// (see [`NetlistState::release_woken`]).
    IncActive { device: DeviceId, net: NetId },
    /// Run the device's `dec_active` hook.
    DecActive(DeviceId),
    /// Re-solve immediately.
    SolveNow(SolverId),
    /// Terminal values of the solver changed.
    ChangeState(SolverId),
}

/// Samples recorded by `LOG` devices.
#[derive(Debug, Clone, Default)]
pub struct LogChannel {
    pub name: String,
    pub samples: Vec<(NetlistTime, f64)>,
}

/// Everything the simulation mutates except the device objects and the
/// matrix solvers.
#[derive(Debug)]
pub struct NetlistState {
    pub(crate) time: NetlistTime,
    pub(crate) queue: Queue,
    pub(crate) nets: Vec<Net>,
    pub(crate) terminals: Vec<Terminal>,
    pub(crate) params: Vec<Param>,
    pub(crate) devices: Vec<DeviceInfo>,
    pub(crate) gmin: f64,
    pub(crate) use_stats: bool,
    pub(crate) pending: VecDeque<Deferred>,
    pub(crate) logs: Vec<LogChannel>,
}

impl Default for NetlistState {
    fn default() -> Self {
        Self::new()
    }
}

impl NetlistState {
    pub fn new() -> Self {
        Self {
            time: NetlistTime::zero(),
            queue: Queue::new(DEFAULT_QUEUE_SIZE),
            nets: Vec::new(),
            terminals: Vec::new(),
            params: Vec::new(),
            devices: Vec::new(),
            gmin: DEFAULT_GMIN,
            use_stats: false,
            pending: VecDeque::new(),
            logs: Vec::new(),
        }
    }

    pub fn time(&self) -> NetlistTime {
        self.time
    }

    pub fn net(&self, id: NetId) -> &Net {
        &self.nets[id.0]
    }

    pub fn nets(&self) -> &[Net] {
        &self.nets
    }

    pub fn terminal(&self, id: TerminalId) -> &Terminal {
        &self.terminals[id.0]
    }

    pub fn terminals(&self) -> &[Terminal] {
        &self.terminals
    }

    pub fn device_info(&self, id: DeviceId) -> &DeviceInfo {
        &self.devices[id.0]
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn logs(&self) -> &[LogChannel] {
        &self.logs
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    // ============ Construction ============

    pub(crate) fn add_device(&mut self, info: DeviceInfo) -> DeviceId {
        self.devices.push(info);
        DeviceId(self.devices.len() - 1)
    }

    pub(crate) fn add_net(&mut self, name: impl Into<String>, kind: NetKind, rail: Option<TerminalId>) -> NetId {
        let id = NetId(self.nets.len());
        self.nets.push(Net::new(name, kind, rail));
        if let Some(t) = rail {
            self.attach(t, id);
        }
        id
    }

    pub(crate) fn add_terminal(&mut self, terminal: Terminal) -> TerminalId {
        self.terminals.push(terminal);
        TerminalId(self.terminals.len() - 1)
    }

    /// Create an output terminal together with the net it drives.
    pub(crate) fn add_output(&mut self, terminal: Terminal) -> TerminalId {
        let kind = if terminal.kind == TerminalKind::LogicOutput {
            NetKind::Logic
        } else {
            NetKind::Analog
        };
        let name = terminal.name.clone();
        let t = self.add_terminal(terminal);
        self.add_net(name, kind, Some(t));
        t
    }

    /// Connect a terminal to a net. The terminal must not be on a net yet.
    pub(crate) fn attach(&mut self, t: TerminalId, net: NetId) {
        debug_assert!(self.terminals[t.0].net.is_none());
        self.terminals[t.0].net = Some(net);
        self.nets[net.0].terminals.push(t);
    }

    /// Disconnect a terminal from its net.
    pub(crate) fn detach(&mut self, t: TerminalId) {
        if let Some(net) = self.terminals[t.0].net.take() {
            let n = &mut self.nets[net.0];
            n.terminals.retain(|&x| x != t);
            n.active.retain(|&x| x != t);
        }
    }

    pub(crate) fn add_param(&mut self, param: Param) -> usize {
        self.params.push(param);
        self.params.len() - 1
    }

    pub(crate) fn add_log_channel(&mut self, name: impl Into<String>) -> usize {
        self.logs.push(LogChannel {
            name: name.into(),
            samples: Vec::new(),
        });
        self.logs.len() - 1
    }

    // ============ Queue ============

    pub(crate) fn qpush(&mut self, at: NetlistTime, net: NetId) {
        if !USE_QUEUE_STATS || !self.use_stats {
            self.queue.emplace::<false>(at, Some(net));
        } else {
            self.queue.emplace::<true>(at, Some(net));
        }
    }

    pub(crate) fn qremove(&mut self, net: NetId) {
        if !USE_QUEUE_STATS || !self.use_stats {
            self.queue.remove::<false>(Some(net));
        } else {
            self.queue.remove::<true>(Some(net));
        }
    }

    // ============ Net propagation ============

    /// Schedule delivery of the net's pending value after `delay`.
    pub(crate) fn push_to_queue(&mut self, net: NetId, delay: NetlistTime) {
        if !self.nets[net.0].has_connections() {
            return;
        }
        if self.nets[net.0].is_queued() {
            self.qremove(net);
        }
        let at = self.time + delay;
        let n = &mut self.nets[net.0];
        n.next_scheduled = at;
        if !n.active.is_empty() {
            n.in_queue = QueueStatus::Queued;
            self.qpush(at, net);
        } else {
            n.in_queue = QueueStatus::DelayedDueToInactive;
        }
    }

    /// Set the pending value and schedule it. Does nothing if the value
    /// equals the pending one.
    pub(crate) fn set_q_and_push(&mut self, net: NetId, q: Signal, delay: NetlistTime) {
        if q != self.nets[net.0].new_q {
            self.nets[net.0].new_q = q;
            self.push_to_queue(net, delay);
        }
    }

    /// Latch a value without scheduling. A changed value becomes visible
    /// at `at` once somebody listens again.
    pub(crate) fn set_q_time(&mut self, net: NetId, q: Signal, at: NetlistTime) {
        let n = &mut self.nets[net.0];
        if q != n.new_q {
            n.in_queue = QueueStatus::DelayedDueToInactive;
            n.next_scheduled = at;
        }
        n.cur_q = q;
        n.new_q = q;
    }

    pub(crate) fn toggle_and_push(&mut self, net: NetId, delay: NetlistTime) {
        self.nets[net.0].new_q ^= 1;
        self.push_to_queue(net, delay);
    }

    /// Make sure the net is delivered no later than `now + delay`.
    ///
    /// A queued net keeps its pending toggle and is only moved forward.
    pub(crate) fn reschedule(&mut self, net: NetId, delay: NetlistTime) {
        let at = self.time + delay;
        let n = &self.nets[net.0];
        if n.is_queued() {
            if at < n.next_scheduled {
                self.push_to_queue(net, delay);
            }
        } else {
            self.toggle_and_push(net, delay);
        }
    }

    /// Set both current and pending value without any event.
    pub(crate) fn initial(&mut self, net: NetId, q: Signal) {
        let n = &mut self.nets[net.0];
        n.cur_q = q;
        n.new_q = q;
    }

    /// Change the voltage of an analog output net and let listeners know.
    pub(crate) fn push_analog(&mut self, net: NetId, v: f64) {
        if v != self.nets[net.0].cur_analog {
            self.nets[net.0].cur_analog = v;
            self.toggle_and_push(net, NetlistTime::quantum());
        }
    }

    /// Mark the net delivered and return the delivery mask, or `None` if
    /// the value did not change.
    pub(crate) fn deliver(&mut self, net: NetId) -> Option<u32> {
        let n = &mut self.nets[net.0];
        n.in_queue = QueueStatus::Delivered;
        if n.cur_q == n.new_q {
            return None;
        }
        let mask = super::terminal::delivery_mask(n.cur_q, n.new_q);
        n.cur_q = n.new_q;
        Some(mask)
    }

    // ============ Activation ============

    pub(crate) fn add_to_active_list(&mut self, t: TerminalId) {
        let Some(net) = self.terminals[t.0].net else {
            return;
        };
        let n = &mut self.nets[net.0];
        let was_empty = n.active.is_empty();
        n.active.push(t);
        if !was_empty {
            return;
        }
        // the listener reads the net right after activating it
        self.release_delayed(net);
        let rail = self.nets[net.0].rail_terminal.map(|r| self.terminals[r.0].device);
        if let Some(device) = rail {
            if self.do_inc_active(device) {
                self.pending.push_back(Deferred::IncActive { device, net });
            }
        }
    }

    pub(crate) fn remove_from_active_list(&mut self, t: TerminalId) {
        let Some(net) = self.terminals[t.0].net else {
            return;
        };
        let n = &mut self.nets[net.0];
        n.active.retain(|&x| x != t);
        if !n.active.is_empty() {
            return;
        }
        if n.is_queued() {
            self.qremove(net);
            self.nets[net.0].in_queue = QueueStatus::DelayedDueToInactive;
        }
        if let Some(rail) = self.nets[net.0].rail_terminal {
            let device = self.terminals[rail.0].device;
            if self.do_dec_active(device) {
                self.pending.push_back(Deferred::DecActive(device));
            }
        }
    }

    /// Deliver a value that was latched while nobody listened.
    pub(crate) fn release_delayed(&mut self, net: NetId) {
        let now = self.time;
        let n = &mut self.nets[net.0];
        if n.in_queue != QueueStatus::DelayedDueToInactive {
            return;
        }
        if n.next_scheduled > now {
            n.in_queue = QueueStatus::Queued;
            let at = n.next_scheduled;
            self.qpush(at, net);
        } else {
            n.in_queue = QueueStatus::Delivered;
            n.cur_q = n.new_q;
        }
    }

    /// Release what a woken driver latched on `net`. Listeners have seen
    /// `seen` so far; if the driver moved on from it they get a regular
    /// event instead of a silent update.
    pub(crate) fn release_woken(&mut self, net: NetId, seen: Signal) {
        let now = self.time;
        let n = &mut self.nets[net.0];
        if n.in_queue != QueueStatus::DelayedDueToInactive || n.new_q == seen {
            self.release_delayed(net);
            return;
        }
        n.cur_q = seen;
        n.in_queue = QueueStatus::Queued;
        let at = n.next_scheduled.max(now);
        n.next_scheduled = at;
        self.qpush(at, net);
    }

    /// Count a newly listened output. Returns whether the device woke up.
    fn do_inc_active(&mut self, device: DeviceId) -> bool {
        let info = &mut self.devices[device.0];
        if !info.hint_deactivate {
            return false;
        }
        info.active_outputs += 1;
        if info.active_outputs == 1 {
            info.stats.inc_active += 1;
            return true;
        }
        false
    }

    /// Count an output nobody listens to anymore. Returns whether the
    /// device went to sleep.
    fn do_dec_active(&mut self, device: DeviceId) -> bool {
        let info = &mut self.devices[device.0];
        if !info.hint_deactivate {
            return false;
        }
        info.active_outputs -= 1;
        info.active_outputs == 0
    }

    pub(crate) fn activate(&mut self, t: TerminalId, state: TerminalState) {
        let term = &mut self.terminals[t.0];
        if term.state == TerminalState::Passive {
            term.state = state;
            self.add_to_active_list(t);
        } else {
            term.state = state;
        }
    }

    pub(crate) fn inactivate(&mut self, t: TerminalId) {
        let term = &mut self.terminals[t.0];
        if term.state != TerminalState::Passive {
            term.state = TerminalState::Passive;
            self.remove_from_active_list(t);
        }
    }

    // ============ Reset ============

    pub(crate) fn reset_net(&mut self, net: NetId) {
        let n = &mut self.nets[net.0];
        n.next_scheduled = NetlistTime::zero();
        n.in_queue = QueueStatus::Delivered;
        n.cur_q = 0;
        n.new_q = 0;
        n.cur_analog = 0.0;
        n.active.clear();
        let terms = n.terminals.clone();
        for t in terms {
            let term = &mut self.terminals[t.0];
            term.state = term.reset_state();
            if !term.kind.is_output() {
                self.nets[net.0].active.push(t);
            }
        }
    }

    pub(crate) fn reset_nets(&mut self) {
        debug!("resetting {} nets", self.nets.len());
        for i in 0..self.nets.len() {
            self.reset_net(NetId(i));
        }
    }

    /// Rebuild active lists from terminal states.
    pub(crate) fn rebuild_lists(&mut self) {
        for n in &mut self.nets {
            n.active = n
                .terminals
                .iter()
                .copied()
                .filter(|t| {
                    let term = &self.terminals[t.0];
                    !term.kind.is_output() && term.state != TerminalState::Passive
                })
                .collect();
        }
    }

    // ============ Lookups ============

    /// Solver responsible for a two-pole terminal: the one owning its net,
    /// else the one owning the partner's net.
    pub(crate) fn solver_for_pole(&self, t: TerminalId) -> Option<SolverId> {
        let term = &self.terminals[t.0];
        let own = term.net.and_then(|n| self.nets[n.0].solver);
        own.or_else(|| {
            term.other
                .and_then(|o| self.terminals[o.0].net)
                .and_then(|n| self.nets[n.0].solver)
        })
    }

    pub(crate) fn terminal_voltage(&self, t: TerminalId) -> f64 {
        self.terminals[t.0]
            .net
            .map(|n| self.nets[n.0].cur_analog)
            .unwrap_or(0.0)
    }

    pub fn find_net(&self, name: &str) -> Option<NetId> {
        self.nets.iter().position(|n| n.name == name).map(NetId)
    }

    pub fn find_terminal(&self, name: &str) -> Option<TerminalId> {
        self.terminals.iter().position(|t| t.name == name).map(TerminalId)
    }

    pub fn find_device(&self, name: &str) -> Option<DeviceId> {
        self.devices.iter().position(|d| d.name == name).map(DeviceId)
    }

    pub fn find_param(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }

    /// Delegate of a terminal, resolved against its device.
    pub(crate) fn delegate(&self, t: TerminalId) -> Delegate {
        self.terminals[t.0].delegate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::Handler;

    /// A driver device with one output and a reader device with one input.
    fn driver_and_reader(hint: bool) -> (NetlistState, NetId, TerminalId) {
        let mut st = NetlistState::new();
        let mut info = DeviceInfo::new("drv", "TEST");
        info.hint_deactivate = hint;
        let drv = st.add_device(info);
        let rd = st.add_device(DeviceInfo::new("rd", "TEST"));
        let out = st.add_output(Terminal::new("drv.Q".into(), drv, TerminalKind::LogicOutput, Delegate::None));
        let inp = st.add_terminal(Terminal::new(
            "rd.A".into(),
            rd,
            TerminalKind::LogicInput,
            Delegate::Device {
                device: rd,
                handler: Handler::DEFAULT,
            },
        ));
        let net = st.terminals[out.0].net.unwrap_or(NetId(0));
        st.attach(inp, net);
        st.reset_nets();
        (st, net, inp)
    }

    #[test]
    fn test_set_q_and_push_same_value_is_noop() {
        let (mut st, net, _) = driver_and_reader(false);
        st.set_q_and_push(net, 1, NetlistTime::from_nsec(10));
        st.set_q_and_push(net, 1, NetlistTime::from_nsec(10));
        assert_eq!(st.queue.size(), 1);
        assert!(st.net(net).is_queued());
    }

    #[test]
    fn test_push_back_to_current_value_requeues() {
        let (mut st, net, _) = driver_and_reader(false);
        st.set_q_and_push(net, 1, NetlistTime::from_nsec(10));
        st.set_q_and_push(net, 0, NetlistTime::from_nsec(20));
        assert_eq!(st.queue.size(), 1);
        assert_eq!(st.queue.top().exec_time(), NetlistTime::from_nsec(20));
        assert_eq!(st.deliver(net), None);
    }

    #[test]
    fn test_inactive_net_latches_value() {
        let (mut st, net, inp) = driver_and_reader(false);
        st.inactivate(inp);
        st.set_q_and_push(net, 1, NetlistTime::from_nsec(10));
        assert_eq!(st.queue.size(), 0);
        assert_eq!(st.net(net).in_queue, QueueStatus::DelayedDueToInactive);

        // listening again before the scheduled time queues the event
        st.activate(inp, TerminalState::InputActive);
        assert_eq!(st.queue.size(), 1);
        assert_eq!(st.queue.top().exec_time(), NetlistTime::from_nsec(10));
    }

    #[test]
    fn test_late_activation_delivers_immediately() {
        let (mut st, net, inp) = driver_and_reader(false);
        st.inactivate(inp);
        st.set_q_and_push(net, 1, NetlistTime::from_nsec(10));
        st.time = NetlistTime::from_nsec(50);
        st.activate(inp, TerminalState::InputActive);
        assert_eq!(st.queue.size(), 0);
        assert_eq!(st.net(net).cur_q, 1);
        assert_eq!(st.net(net).in_queue, QueueStatus::Delivered);
    }

    #[test]
    fn test_deactivation_hooks_are_deferred() {
        let (mut st, net, inp) = driver_and_reader(true);
        st.inactivate(inp);
        assert_eq!(st.devices[0].active_outputs, 0);
        assert_eq!(st.pending.pop_front(), Some(Deferred::DecActive(DeviceId(0))));

        st.activate(inp, TerminalState::InputActive);
        assert_eq!(st.devices[0].active_outputs, 1);
        assert_eq!(
            st.pending.pop_front(),
            Some(Deferred::IncActive {
                device: DeviceId(0),
                net
            })
        );
    }

    #[test]
    fn test_woken_driver_change_becomes_event() {
        let (mut st, net, _) = driver_and_reader(true);
        st.time = NetlistTime::from_nsec(5);
        // what an inc_active hook does through set_q_time
        st.set_q_time(net, 1, NetlistTime::from_nsec(20));
        st.release_woken(net, 0);
        assert_eq!(st.net(net).cur_q, 0);
        assert!(st.net(net).is_queued());
        assert_eq!(st.queue.top().exec_time(), NetlistTime::from_nsec(20));
        assert_eq!(st.deliver(net), Some(crate::circuit::delivery_mask(0, 1)));
    }

    #[test]
    fn test_no_hooks_without_hint() {
        let (mut st, _, inp) = driver_and_reader(false);
        st.inactivate(inp);
        st.activate(inp, TerminalState::InputActive);
        assert!(st.pending.is_empty());
        assert_eq!(st.devices[0].active_outputs, 1);
    }

    #[test]
    fn test_analog_push_toggles_only_on_change() {
        let mut st = NetlistState::new();
        let d = st.add_device(DeviceInfo::new("src", "TEST"));
        let r = st.add_device(DeviceInfo::new("rd", "TEST"));
        let out = st.add_output(Terminal::new("src.Q".into(), d, TerminalKind::AnalogOutput, Delegate::None));
        let inp = st.add_terminal(Terminal::new("rd.I".into(), r, TerminalKind::AnalogInput, Delegate::None));
        let net = st.terminals[out.0].net.unwrap_or(NetId(0));
        st.attach(inp, net);
        st.reset_nets();

        st.push_analog(net, 2.5);
        assert_eq!(st.queue.size(), 1);
        assert_eq!(st.queue.top().exec_time(), NetlistTime::quantum());
        st.push_analog(net, 2.5);
        assert_eq!(st.queue.size(), 1);
    }
}
