//! Grouping of analog nets into independent systems.
//!
//! Two nets belong to the same system if a two-pole element couples them.
//! Rail nets (driven by an analog output such as `GND`) only feed the
//! right hand side and never join a group.

use std::collections::VecDeque;

use crate::circuit::{NetId, NetlistState, TerminalKind};

/// Split all solvable nets into connected groups, in net order.
pub fn split_nets(state: &NetlistState) -> Vec<Vec<NetId>> {
    let nets = state.nets();
    let solvable = |n: NetId| nets[n.0].is_analog() && !nets[n.0].is_rail_net();

    // coupling is not always symmetric (VCCS outputs know their inputs
    // but not the other way round), so collect edges both ways
    let mut adjacent: Vec<Vec<NetId>> = vec![Vec::new(); nets.len()];
    let mut has_poles = vec![false; nets.len()];
    for t in state.terminals() {
        if t.kind != TerminalKind::Terminal {
            continue;
        }
        let Some(net) = t.net else { continue };
        has_poles[net.0] = true;
        let other = t.other.and_then(|o| state.terminal(o).net);
        if let Some(other) = other {
            if other != net && solvable(net) && solvable(other) {
                adjacent[net.0].push(other);
                adjacent[other.0].push(net);
            }
        }
    }

    let mut visited = vec![false; nets.len()];
    let mut groups = Vec::new();
    for start in 0..nets.len() {
        let start = NetId(start);
        if visited[start.0] || !has_poles[start.0] || !solvable(start) {
            continue;
        }
        let mut group = Vec::new();
        let mut queue = VecDeque::from([start]);
        visited[start.0] = true;
        while let Some(n) = queue.pop_front() {
            group.push(n);
            for &o in &adjacent[n.0] {
                if !visited[o.0] {
                    visited[o.0] = true;
                    queue.push_back(o);
                }
            }
        }
        group.sort();
        groups.push(group);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{Delegate, DeviceInfo, NetKind, Terminal};

    /// Add a two-pole element between nets `a` and `b`.
    fn element(st: &mut NetlistState, name: &str, a: NetId, b: NetId) {
        let d = st.add_device(DeviceInfo::new(name, "RES"));
        let p = st.add_terminal(Terminal::new(format!("{}.1", name), d, TerminalKind::Terminal, Delegate::SolveNow));
        let n = st.add_terminal(Terminal::new(format!("{}.2", name), d, TerminalKind::Terminal, Delegate::SolveNow));
        st.terminals[p.0].other = Some(n);
        st.terminals[n.0].other = Some(p);
        st.attach(p, a);
        st.attach(n, b);
    }

    #[test]
    fn test_rails_split_groups() {
        let mut st = NetlistState::new();
        let g = st.add_device(DeviceInfo::new("GND", "GNDA"));
        let gnd = st.add_output(Terminal::new("GND.Q".into(), g, TerminalKind::AnalogOutput, Delegate::None));
        let gnd = st.terminal(gnd).net.unwrap_or(NetId(0));
        let a = st.add_net("a", NetKind::Analog, None);
        let b = st.add_net("b", NetKind::Analog, None);
        let c = st.add_net("c", NetKind::Analog, None);
        element(&mut st, "R1", a, gnd);
        element(&mut st, "R2", a, b);
        element(&mut st, "R3", c, gnd);

        let groups = split_nets(&st);
        assert_eq!(groups, vec![vec![a, b], vec![c]]);
    }

    #[test]
    fn test_one_sided_coupling_joins_groups() {
        let mut st = NetlistState::new();
        let a = st.add_net("a", NetKind::Analog, None);
        let b = st.add_net("b", NetKind::Analog, None);
        let d = st.add_device(DeviceInfo::new("G1", "VCCS"));
        let ip = st.add_terminal(Terminal::new("G1.IP".into(), d, TerminalKind::Terminal, Delegate::SolveNow));
        let op = st.add_terminal(Terminal::new("G1.OP".into(), d, TerminalKind::Terminal, Delegate::SolveNow));
        st.terminals[op.0].other = Some(ip);
        st.attach(ip, a);
        st.attach(op, b);

        // searching from b or from a finds the same group
        assert_eq!(split_nets(&st), vec![vec![a, b]]);
    }

    #[test]
    fn test_nets_without_poles_are_skipped() {
        let mut st = NetlistState::new();
        st.add_net("lonely", NetKind::Analog, None);
        st.add_net("logic", NetKind::Logic, None);
        assert!(split_nets(&st).is_empty());
    }
}
