//! Typed handles into the netlist arenas.
//!
//! Nets, terminals, devices and parameters live in flat vectors owned by
//! [`NetlistState`](super::NetlistState). Everything else refers to them by
//! index, so child-to-parent navigation never needs a pointer.

use std::fmt;

/// Index of a net.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetId(pub usize);

impl fmt::Display for NetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}", self.0)
    }
}

/// Index of a terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TerminalId(pub usize);

impl fmt::Display for TerminalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Index of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub usize);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "D{}", self.0)
    }
}

/// Index of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamId(pub usize);

/// Index of a matrix solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SolverId(pub usize);

impl fmt::Display for SolverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Solver_{}", self.0)
    }
}

/// Identifies which input handler of a device fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Handler(pub u16);

impl Handler {
    /// Handler used for devices with a single input group and for the
    /// startup update of devices without inputs.
    pub const DEFAULT: Handler = Handler(0);
}
