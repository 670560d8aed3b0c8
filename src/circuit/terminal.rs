//! Terminals: the connection points of devices.

use super::family::LogicFamily;
use super::types::{DeviceId, Handler, NetId, SolverId, TerminalId};

/// A logic signal value.
pub type Signal = u32;

/// Bits per input edge group.
pub const INP_BITS: u32 = 2;
pub const INP_MASK: u32 = (1 << INP_BITS) - 1;
pub const INP_HL_SHIFT: u32 = 0;
pub const INP_LH_SHIFT: u32 = INP_BITS;

/// Terminal state. Input states are bit sets matched against the
/// delivery mask `(new << INP_LH_SHIFT) | (cur << INP_HL_SHIFT)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TerminalState {
    Passive = 0,
    InputHl = INP_MASK << INP_HL_SHIFT,
    InputLh = INP_MASK << INP_LH_SHIFT,
    InputActive = (INP_MASK << INP_HL_SHIFT) | (INP_MASK << INP_LH_SHIFT),
    Output = 16,
    Bidir = 32,
}

impl TerminalState {
    pub fn bits(self) -> u32 {
        self as u32
    }

    /// Whether a transition with this delivery mask reaches the terminal.
    pub fn accepts(self, mask: u32) -> bool {
        self.bits() & mask != 0
    }
}

/// Delivery mask for a transition from `cur` to `new`.
pub fn delivery_mask(cur: Signal, new: Signal) -> u32 {
    (new << INP_LH_SHIFT) | (cur << INP_HL_SHIFT)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalKind {
    LogicInput,
    LogicOutput,
    AnalogInput,
    AnalogOutput,
    /// Two-pole primitive feeding the matrix solver
    Terminal,
}

impl TerminalKind {
    pub fn is_logic(self) -> bool {
        matches!(self, Self::LogicInput | Self::LogicOutput)
    }

    pub fn is_output(self) -> bool {
        matches!(self, Self::LogicOutput | Self::AnalogOutput)
    }
}

/// What runs when a net delivers a change to the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delegate {
    None,
    Device { device: DeviceId, handler: Handler },
    /// Two-pole terminal on a rail: the solver owning the partner re-solves
    SolveNow,
    /// Matrix solver sync input
    SolverSync(SolverId),
    /// Main solver time step input
    SolverStep,
}

#[derive(Debug, Clone)]
pub struct Terminal {
    /// Fully qualified name, e.g. `R1.1`
    pub name: String,
    pub device: DeviceId,
    pub kind: TerminalKind,
    pub net: Option<NetId>,
    pub state: TerminalState,
    pub delegate: Delegate,
    /// Partner pole for two-pole terminals
    pub other: Option<TerminalId>,
    pub family: Option<LogicFamily>,
    pub go: f64,
    pub gt: f64,
    pub idr: f64,
    /// Set once the owning net is part of a matrix solver
    pub solved: bool,
}

impl Terminal {
    pub fn new(name: String, device: DeviceId, kind: TerminalKind, delegate: Delegate) -> Self {
        Self {
            name,
            device,
            kind,
            net: None,
            state: TerminalState::Passive,
            delegate,
            other: None,
            family: None,
            go: 0.0,
            gt: 0.0,
            idr: 0.0,
            solved: false,
        }
    }

    /// State after a net reset.
    pub fn reset_state(&self) -> TerminalState {
        if self.kind.is_output() {
            TerminalState::Output
        } else {
            TerminalState::InputActive
        }
    }

    /// Write matrix contributions. Ignored unless the net is solved.
    pub fn set_go_gt_i(&mut self, go: f64, gt: f64, idr: f64) {
        if self.solved {
            self.go = go;
            self.gt = gt;
            self.idr = idr;
        }
    }
}

macro_rules! terminal_handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name(pub(crate) TerminalId);

        impl $name {
            pub fn id(self) -> TerminalId {
                self.0
            }
        }
    };
}

terminal_handle!(
    /// Handle to a logic input terminal.
    LogicInput
);
terminal_handle!(
    /// Handle to a logic output terminal.
    LogicOutput
);
terminal_handle!(
    /// Handle to an analog input terminal.
    AnalogInput
);
terminal_handle!(
    /// Handle to an analog output terminal.
    AnalogOutput
);
terminal_handle!(
    /// Handle to a two-pole terminal.
    Pole
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_bits() {
        assert_eq!(TerminalState::InputHl.bits(), 3);
        assert_eq!(TerminalState::InputLh.bits(), 12);
        assert_eq!(TerminalState::InputActive.bits(), 15);
    }

    #[test]
    fn test_edge_masks() {
        let rising = delivery_mask(0, 1);
        let falling = delivery_mask(1, 0);
        assert!(TerminalState::InputLh.accepts(rising));
        assert!(!TerminalState::InputLh.accepts(falling));
        assert!(TerminalState::InputHl.accepts(falling));
        assert!(!TerminalState::InputHl.accepts(rising));
        assert!(TerminalState::InputActive.accepts(rising));
        assert!(!TerminalState::Output.accepts(rising | falling));
        assert!(!TerminalState::Passive.accepts(rising | falling));
    }
}
