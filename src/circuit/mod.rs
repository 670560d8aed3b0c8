//! Core object model of a netlist.
//!
//! Nets, terminals and parameters live in flat arenas inside
//! [`NetlistState`] and refer to each other through typed indices. Devices
//! see the state through a [`Context`] while their callbacks run.

mod context;
mod family;
mod net;
mod param;
mod state;
mod terminal;
mod types;

pub use context::Context;
pub use family::{FamilyType, LogicFamily};
pub use net::{Net, NetKind, QueueStatus};
pub use param::{Param, ParamBool, ParamBytes, ParamEnum, ParamF64, ParamInt, ParamStr, ParamValue};
pub(crate) use state::Deferred;
pub use state::{DeviceInfo, DeviceStats, LogChannel, NetlistState, Queue, DEFAULT_GMIN, USE_QUEUE_STATS};
pub use terminal::{
    delivery_mask, AnalogInput, AnalogOutput, Delegate, LogicInput, LogicOutput, Pole, Signal, Terminal,
    TerminalKind, TerminalState,
};
pub use types::*;
