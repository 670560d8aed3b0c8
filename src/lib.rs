//! # Netlist Core
//!
//! An event-driven simulator for mixed analog and digital circuits.
//!
//! This library provides:
//! - A netlist description language with a built-in 74xx/CD4xxx library
//! - An event queue on a fixed-point time base driving logic nets
//! - Newton-Raphson matrix solvers for the analog parts
//! - Automatic proxies where logic and analog nets meet
//! - Writers turning recorded channels into WAV, VCD or tables (`nlwav`)
//!
//! ## Architecture
//!
//! - [`time`] - Fixed-point simulation time
//! - [`queue`] - Time-ordered event queues
//! - [`circuit`] - Nets, terminals, parameters and the state arena
//! - [`components`] - Device models and the device factory
//! - [`solver`] - Analog matrix solvers and their scheduling
//! - [`netlist`] - The execution kernel
//! - [`dsl`] - Parser and setup turning sources into a [`Netlist`]
//! - [`wav`] - Output back ends for recorded channels
//!
//! ## Usage
//!
//! ```no_run
//! use netlist_core::{dsl, NetlistTime};
//!
//! let mut nl = dsl::load(
//!     r#"
//!     CLOCK(CLK, 1000)
//!     TTL_7404_INVERT(G1, CLK)
//!     "#,
//!     None,
//! )?;
//! nl.reset();
//! nl.process_queue(NetlistTime::from_msec(10));
//! println!("G1.Q = {:?}", nl.logic_value("G1.Q"));
//! # Ok::<(), netlist_core::NetlistError>(())
//! ```
//!
//! ## Simulation method
//!
//! Logic outputs schedule their new value on the queue after the gate
//! delay. When the event fires every input listening on the net runs its
//! device. Analog nets are grouped into solvers; a solver runs when one of
//! its logic-driven inputs changes or when its time step is due, and
//! iterates Newton-Raphson steps until the node voltages converge.

pub mod circuit;
pub mod components;
pub mod dsl;
pub mod error;
pub mod netlist;
pub mod queue;
pub mod solver;
pub mod time;
pub mod wav;

// Re-export main types for convenience
pub use error::{NetlistError, Result};
pub use netlist::{KernelStats, Netlist};
pub use time::NetlistTime;

// WASM bindings
#[cfg(feature = "wasm")]
mod wasm;

#[cfg(feature = "wasm")]
pub use wasm::WasmNetlist;
