//! Nets: the nodes shared by terminals.

use super::terminal::Signal;
use super::types::{SolverId, TerminalId};
use crate::time::NetlistTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetKind {
    Logic,
    Analog,
}

/// Queue membership of a net.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    /// A change is pending but nobody listens, so it was not queued
    DelayedDueToInactive,
    Queued,
    Delivered,
}

#[derive(Debug, Clone)]
pub struct Net {
    pub name: String,
    pub kind: NetKind,
    pub cur_q: Signal,
    pub new_q: Signal,
    pub cur_analog: f64,
    pub in_queue: QueueStatus,
    pub next_scheduled: NetlistTime,
    /// Output driving this net. A net with a rail terminal is never solved.
    pub rail_terminal: Option<TerminalId>,
    /// All terminals attached to the net
    pub terminals: Vec<TerminalId>,
    /// Listening (non-passive, non-output) terminals
    pub active: Vec<TerminalId>,
    pub solver: Option<SolverId>,
}

impl Net {
    pub fn new(name: impl Into<String>, kind: NetKind, rail_terminal: Option<TerminalId>) -> Self {
        Self {
            name: name.into(),
            kind,
            cur_q: 0,
            new_q: 0,
            cur_analog: 0.0,
            in_queue: QueueStatus::Delivered,
            next_scheduled: NetlistTime::zero(),
            rail_terminal,
            terminals: Vec::new(),
            active: Vec::new(),
            solver: None,
        }
    }

    pub fn is_rail_net(&self) -> bool {
        self.rail_terminal.is_some()
    }

    pub fn is_logic(&self) -> bool {
        self.kind == NetKind::Logic
    }

    pub fn is_analog(&self) -> bool {
        self.kind == NetKind::Analog
    }

    pub fn is_queued(&self) -> bool {
        self.in_queue == QueueStatus::Queued
    }

    /// Whether anything besides the driver is attached.
    pub fn has_connections(&self) -> bool {
        self.terminals.len() > usize::from(self.rail_terminal.is_some())
    }

    pub fn q_analog(&self) -> f64 {
        self.cur_analog
    }
}
