//! Device models.
//!
//! This module provides every device the netlist language can instantiate:
//! - Analog: Resistor, Capacitor, Inductor, sources, Diode, Zener, BJT,
//!   VCCS, Op-Amp, Potentiometer, switches, CD4053 multiplexer
//! - System: clocks, inputs, ground, frontier, solver and netlist parameters
//! - Digital: truth tables, counters, flip-flops, adder, multiplexer, PROMs
//! - Proxies between logic and analog nets, and log recorders
//!
//! Each device implements [`Device`] and is created through a
//! [`DeviceBuilder`] that registers its terminals and parameters.

mod bjt;
mod controls;
mod counter;
mod diode;
mod flipflop;
pub mod generic;
mod log;
mod msi;
mod opamp;
mod proxy;
mod rom;
mod system;
pub mod truthtable;
mod twoterm;

pub use bjt::Bjt;
pub use controls::{Cd4053Gate, Cd4066Gate, Dsw1, Dsw2, Potentiometer, Switch};
pub use counter::{Cd4020, Ttl7490, Ttl7493, Ttl74193};
pub use diode::{Diode, ZDiode};
pub use flipflop::Ttl74174;
pub use self::log::{Log, LogD};
pub use msi::{Ttl7483, Ttl9322};
pub use opamp::{OpAmp, Vccs};
pub use proxy::{AnalogToDigital, DigitalToAnalog};
pub use rom::{Mk28000, Prom, PromDesc};
pub use system::{
    AnalogInputDevice, Clock, ExtClock, Frontier, Gnd, LogicInputDevice, NcPin, NetlistParams, PowerPins,
    SolverDevice, SysCompd, SOLVER_METHODS,
};
pub use truthtable::{TruthTable, TruthTableDesc};
pub use twoterm::{Capacitor, CurrentSource, Inductor, Resistor, TwoTerm, VoltageSource};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::circuit::{
    AnalogInput, AnalogOutput, Context, Delegate, DeviceId, Handler, LogicFamily, LogicInput, LogicOutput,
    NetlistState, Param, ParamBool, ParamBytes, ParamEnum, ParamF64, ParamId, ParamInt, ParamStr, ParamValue,
    Pole, Terminal, TerminalId, TerminalKind,
};
use crate::dsl::{Model, ModelStore};
use crate::error::{NetlistError, Result};

/// Behaviour of a device. The kernel calls these through a trait object.
pub trait Device: fmt::Debug {
    /// Put the device into its power-on state.
    fn reset(&mut self, _ctx: &mut Context<'_>) {}

    /// Recompute everything derived from parameters.
    fn update_param(&mut self, _ctx: &mut Context<'_>) {}

    /// An input changed. `handler` says which input group fired.
    fn update(&mut self, _ctx: &mut Context<'_>, _handler: Handler) {}

    /// Relinearize nonlinear elements. Only called by the solver for
    /// dynamic devices.
    fn update_terminals(&mut self, _ctx: &mut Context<'_>) {}

    /// Advance internal state by `step` seconds. Only called by the solver
    /// for timestep devices.
    fn timestep(&mut self, _ctx: &mut Context<'_>, _step: f64) {}

    fn is_dynamic(&self) -> bool {
        false
    }

    fn is_timestep(&self) -> bool {
        false
    }

    /// First output is listened to again.
    fn inc_active(&mut self, _ctx: &mut Context<'_>) {}

    /// Last output lost its listeners.
    fn dec_active(&mut self, _ctx: &mut Context<'_>) {}
}

/// Creates a device inside a builder.
pub type CreateFn = fn(&mut DeviceBuilder<'_>) -> Result<Box<dyn Device>>;

/// A device type known to the factory.
#[derive(Clone, Copy)]
pub struct DeviceEntry {
    pub name: &'static str,
    /// Positional arguments. Names starting with `+` are pins to connect,
    /// the rest are parameters.
    pub params: &'static str,
    pub create: CreateFn,
}

impl fmt::Debug for DeviceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceEntry")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

macro_rules! entry {
    ($name:expr, $params:expr, $ty:ty) => {
        DeviceEntry {
            name: $name,
            params: $params,
            create: |b| Ok(Box::new(<$ty>::new(b)?)),
        }
    };
}

/// All devices implemented natively.
pub fn native_devices() -> Vec<DeviceEntry> {
    vec![
        entry!("RES", "R", Resistor),
        entry!("CAP", "C", Capacitor),
        entry!("IND", "L", Inductor),
        entry!("VS", "V", VoltageSource),
        entry!("CS", "I", CurrentSource),
        entry!("DIODE", "MODEL", Diode),
        entry!("ZDIODE", "MODEL", ZDiode),
        entry!("QBJT_EB", "MODEL", Bjt),
        entry!("VCCS", "", Vccs),
        entry!("OPAMP", "MODEL", OpAmp),
        entry!("POT", "R", Potentiometer),
        entry!("SWITCH", "", Switch),
        entry!("SYS_DSW1", "+I,+1,+2", Dsw1),
        DeviceEntry {
            name: "SYS_DSW",
            params: "+I,+1,+2",
            create: |b| Ok(Box::new(Dsw1::new(b)?)),
        },
        entry!("SYS_DSW2", "", Dsw2),
        entry!("CD4066_GATE", "", Cd4066Gate),
        entry!("CD4053_GATE", "", Cd4053Gate),
        entry!("CLOCK", "FREQ", Clock),
        entry!("EXTCLOCK", "FREQ,PATTERN", ExtClock),
        entry!("LOGIC_INPUT", "IN,MODEL", LogicInputDevice),
        DeviceEntry {
            name: "TTL_INPUT",
            params: "IN",
            create: |b| Ok(Box::new(LogicInputDevice::new(b)?)),
        },
        entry!("ANALOG_INPUT", "IN", AnalogInputDevice),
        entry!("GNDA", "", Gnd),
        entry!("NC_PIN", "", NcPin),
        entry!("POWER_PINS", "", PowerPins),
        entry!("FRONTIER_DEV", "+I,+G,+Q", Frontier),
        entry!("PARAMETER", "", NetlistParams),
        entry!("SOLVER", "FREQ", SolverDevice),
        entry!("SYS_COMPD", "", SysCompd),
        entry!("CD4020", "+IP,+RESET,+VDD,+VSS", Cd4020),
        DeviceEntry {
            name: "CD4024",
            params: "",
            create: |b| Ok(Box::new(Cd4020::cd4024(b)?)),
        },
        DeviceEntry {
            name: "PROM_82S126",
            params: "+CE1Q,+CE2Q,+A0,+A1,+A2,+A3,+A4,+A5,+A6,+A7",
            create: |b| Ok(Box::new(Prom::new(b, &rom::PROM_82S126)?)),
        },
        DeviceEntry {
            name: "PROM_74S287",
            params: "+CE1Q,+CE2Q,+A0,+A1,+A2,+A3,+A4,+A5,+A6,+A7",
            create: |b| Ok(Box::new(Prom::new(b, &rom::PROM_74S287)?)),
        },
        DeviceEntry {
            name: "PROM_82S123",
            params: "+CEQ,+A0,+A1,+A2,+A3,+A4",
            create: |b| Ok(Box::new(Prom::new(b, &rom::PROM_82S123)?)),
        },
        DeviceEntry {
            name: "EPROM_2716",
            params: "+CE2Q,+CE1Q,+A0,+A1,+A2,+A3,+A4,+A5,+A6,+A7,+A8,+A9,+A10",
            create: |b| Ok(Box::new(Prom::new(b, &rom::EPROM_2716)?)),
        },
        entry!(
            "PROM_MK28000",
            "+OE1,+OE2,+ARQ,+A1,+A2,+A3,+A4,+A5,+A6,+A7,+A8,+A9,+A10,+A11",
            Mk28000
        ),
        entry!("TTL_7490", "+A,+B,+R1,+R2,+R91,+R92", Ttl7490),
        DeviceEntry {
            name: "TTL_7492",
            params: "+A,+B,+R1,+R2",
            create: |b| Ok(Box::new(Ttl7490::ttl7492(b)?)),
        },
        entry!("TTL_7493", "+CLKA,+CLKB,+R1,+R2", Ttl7493),
        entry!("TTL_7483", "+A1,+A2,+A3,+A4,+B1,+B2,+B3,+B4,+C0", Ttl7483),
        entry!(
            "TTL_9322",
            "+SELECT,+A1,+B1,+A2,+B2,+A3,+B3,+A4,+B4,+STROBE",
            Ttl9322
        ),
        entry!("TTL_74193", "+A,+B,+C,+D,+CLEAR,+LOADQ,+CU,+CD", Ttl74193),
        entry!("TTL_74174", "+CLK,+D1,+D2,+D3,+D4,+D5,+D6,+CLRQ", Ttl74174),
        entry!("LOG", "+I", Log),
        entry!("LOGD", "+I,+I2", LogD),
        entry!("PROXY_AD", "", AnalogToDigital),
        entry!("PROXY_DA", "", DigitalToAnalog),
    ]
}

/// Registers terminals and parameters of a device under construction.
pub struct DeviceBuilder<'a> {
    state: &'a mut NetlistState,
    device: DeviceId,
    name: String,
    param_values: &'a HashMap<String, String>,
    models: &'a ModelStore,
    data: &'a HashMap<String, Arc<[u8]>>,
    family: LogicFamily,
    aliases: Vec<(String, String)>,
    links: Vec<(TerminalId, TerminalId)>,
    net_links: Vec<(String, String)>,
}

/// What the setup needs to know after a device is built.
#[derive(Debug, Default)]
pub struct BuiltDevice {
    /// `(alias, target)` pairs, both fully qualified
    pub aliases: Vec<(String, String)>,
    /// Internal connections
    pub links: Vec<(TerminalId, TerminalId)>,
    /// Connections to terminals outside the device, `(pin, target)`
    pub net_links: Vec<(String, String)>,
}

impl<'a> DeviceBuilder<'a> {
    pub(crate) fn new(
        state: &'a mut NetlistState,
        device: DeviceId,
        param_values: &'a HashMap<String, String>,
        models: &'a ModelStore,
        data: &'a HashMap<String, Arc<[u8]>>,
    ) -> Self {
        let name = state.device_info(device).name.clone();
        Self {
            state,
            device,
            name,
            param_values,
            models,
            data,
            family: LogicFamily::ttl(),
            aliases: Vec::new(),
            links: Vec::new(),
            net_links: Vec::new(),
        }
    }

    pub(crate) fn finish(self) -> BuiltDevice {
        BuiltDevice {
            aliases: self.aliases,
            links: self.links,
            net_links: self.net_links,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> DeviceId {
        self.device
    }

    fn full(&self, local: &str) -> String {
        format!("{}.{}", self.name, local)
    }

    // ============ Terminals ============

    fn terminal(&mut self, pin: &str, kind: TerminalKind, delegate: Delegate) -> TerminalId {
        let mut t = Terminal::new(self.full(pin), self.device, kind, delegate);
        if kind.is_logic() {
            t.family = Some(self.family);
        }
        if kind.is_output() {
            self.state.add_output(t)
        } else {
            self.state.add_terminal(t)
        }
    }

    pub fn logic_input(&mut self, pin: &str, handler: Handler) -> LogicInput {
        let delegate = Delegate::Device {
            device: self.device,
            handler,
        };
        LogicInput(self.terminal(pin, TerminalKind::LogicInput, delegate))
    }

    /// Logic input handled by the kernel instead of the device.
    pub(crate) fn logic_input_with(&mut self, pin: &str, delegate: Delegate) -> LogicInput {
        LogicInput(self.terminal(pin, TerminalKind::LogicInput, delegate))
    }

    pub fn logic_output(&mut self, pin: &str) -> LogicOutput {
        LogicOutput(self.terminal(pin, TerminalKind::LogicOutput, Delegate::None))
    }

    pub fn analog_input(&mut self, pin: &str, handler: Handler) -> AnalogInput {
        let delegate = Delegate::Device {
            device: self.device,
            handler,
        };
        AnalogInput(self.terminal(pin, TerminalKind::AnalogInput, delegate))
    }

    /// Analog input nobody needs to be told about.
    pub fn analog_input_passive(&mut self, pin: &str) -> AnalogInput {
        AnalogInput(self.terminal(pin, TerminalKind::AnalogInput, Delegate::None))
    }

    pub fn analog_output(&mut self, pin: &str) -> AnalogOutput {
        AnalogOutput(self.terminal(pin, TerminalKind::AnalogOutput, Delegate::None))
    }

    /// Two coupled poles of a two-terminal element.
    pub fn pole_pair(&mut self, p: &str, n: &str) -> (Pole, Pole) {
        let tp = self.terminal(p, TerminalKind::Terminal, Delegate::SolveNow);
        let tn = self.terminal(n, TerminalKind::Terminal, Delegate::SolveNow);
        self.state.terminals[tp.0].other = Some(tn);
        self.state.terminals[tn.0].other = Some(tp);
        (Pole(tp), Pole(tn))
    }

    /// A pole whose partner is `other`, without `other` knowing about it.
    /// Used where one input pair controls several outputs.
    pub fn coupled_pole(&mut self, pin: &str, other: Pole) -> Pole {
        let t = self.terminal(pin, TerminalKind::Terminal, Delegate::SolveNow);
        self.state.terminals[t.0].other = Some(other.id());
        Pole(t)
    }

    /// Make `alias` (local) another name for `pin` (local).
    pub fn alias(&mut self, alias: &str, pin: &str) {
        let a = self.full(alias);
        let t = self.full(pin);
        self.aliases.push((a, t));
    }

    /// Connect two terminals of this device.
    pub fn connect(&mut self, a: TerminalId, b: TerminalId) {
        self.links.push((a, b));
    }

    /// Connect a local pin to a terminal outside the device, e.g. `GND`.
    pub fn connect_to(&mut self, pin: &str, target: &str) {
        let p = self.full(pin);
        self.net_links.push((p, target.to_string()));
    }

    /// Allocate a recording channel named after the device.
    pub fn log_channel(&mut self) -> usize {
        let name = self.name.clone();
        self.state.add_log_channel(name)
    }

    /// Logic family used for logic terminals created from now on.
    pub fn set_family(&mut self, family: LogicFamily) {
        self.family = family;
    }

    pub fn logic_family(&self) -> LogicFamily {
        self.family
    }

    pub fn set_active_outputs(&mut self, n: i32) {
        self.state.devices[self.device.0].active_outputs = n;
    }

    // ============ Parameters ============

    fn param(&mut self, local: &str, default: ParamValue) -> Result<ParamId> {
        let name = self.full(local);
        let value = match self.param_values.get(&name) {
            Some(text) => match default {
                ParamValue::Data(_) | ParamValue::Pointer(_) => match self.data.get(text) {
                    Some(bytes) => ParamValue::Data(bytes.clone()),
                    None => {
                        return Err(NetlistError::SourceNotFound { name: text.clone() });
                    }
                },
                _ => default.parse_like(&name, text)?,
            },
            None => default,
        };
        let idx = self.state.add_param(Param {
            name,
            device: self.device,
            value,
        });
        Ok(ParamId(idx))
    }

    pub fn param_f64(&mut self, local: &str, default: f64) -> Result<ParamF64> {
        self.param(local, ParamValue::Float(default)).map(ParamF64)
    }

    pub fn param_int(&mut self, local: &str, default: i64) -> Result<ParamInt> {
        self.param(local, ParamValue::Int(default)).map(ParamInt)
    }

    pub fn param_bool(&mut self, local: &str, default: bool) -> Result<ParamBool> {
        self.param(local, ParamValue::Logic(default)).map(ParamBool)
    }

    pub fn param_str(&mut self, local: &str, default: &str) -> Result<ParamStr> {
        self.param(local, ParamValue::Str(default.to_string())).map(ParamStr)
    }

    pub fn param_model(&mut self, local: &str, default: &str) -> Result<ParamStr> {
        self.param(local, ParamValue::Model(default.to_string())).map(ParamStr)
    }

    pub fn param_enum(&mut self, local: &str, choices: &'static [&'static str], default: usize) -> Result<ParamEnum> {
        self.param(local, ParamValue::Enum { choices, index: default }).map(ParamEnum)
    }

    /// Binary parameter. Set from a named data source in the netlist, or
    /// later through [`Netlist::set_param_value`](crate::Netlist::set_param_value).
    pub fn param_bytes(&mut self, local: &str) -> Result<ParamBytes> {
        self.param(local, ParamValue::Pointer(None)).map(ParamBytes)
    }

    // ============ Build time values ============

    pub fn value_f64(&self, p: ParamF64) -> f64 {
        self.state.params[p.0 .0].value.as_f64()
    }

    pub fn value_int(&self, p: ParamInt) -> i64 {
        self.state.params[p.0 .0].value.as_f64() as i64
    }

    pub fn value_str(&self, p: ParamStr) -> &str {
        match &self.state.params[p.0 .0].value {
            ParamValue::Str(s) | ParamValue::Model(s) => s,
            _ => "",
        }
    }

    /// Resolve a model parameter.
    pub fn model(&self, p: ParamStr) -> Result<Model> {
        self.models.resolve(self.value_str(p))
    }

    /// Resolve a logic family model by name.
    pub fn family(&self, model: &str) -> Result<LogicFamily> {
        self.models.family(model)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::circuit::DeviceInfo;

    /// Build a device with parameter overrides, returning the state.
    pub(crate) fn build(
        entry: &str,
        name: &str,
        values: &[(&str, &str)],
    ) -> Result<(NetlistState, Box<dyn Device>, BuiltDevice)> {
        let mut state = NetlistState::new();
        let values: HashMap<String, String> = values
            .iter()
            .map(|(k, v)| (format!("{}.{}", name, k), v.to_string()))
            .collect();
        let models = ModelStore::with_builtins();
        let data = HashMap::new();
        let e = native_devices()
            .into_iter()
            .find(|e| e.name == entry)
            .ok_or_else(|| NetlistError::UnknownDeviceType {
                type_name: entry.to_string(),
            })?;
        let id = state.add_device(DeviceInfo::new(name, entry));
        let mut b = DeviceBuilder::new(&mut state, id, &values, &models, &data);
        let dev = (e.create)(&mut b)?;
        let built = b.finish();
        Ok((state, dev, built))
    }

    #[test]
    fn test_builder_registers_terminals_and_params() {
        let (state, _, built) = build("RES", "R1", &[("R", "4.7k")]).unwrap();
        assert!(state.find_terminal("R1.1").is_some());
        assert!(state.find_terminal("R1.2").is_some());
        let p = state.find_param("R1.R").unwrap();
        assert_eq!(state.params()[p].value, ParamValue::Float(4700.0));
        assert!(built.aliases.iter().any(|(a, t)| a == "R1.P" && t == "R1.1"));
    }

    #[test]
    fn test_bad_param_value_is_an_error() {
        let err = build("RES", "R1", &[("R", "abc")]).unwrap_err();
        assert!(matches!(err, NetlistError::InvalidParameter { .. }));
    }

    #[test]
    fn test_registry_names_are_unique() {
        let entries = native_devices();
        for (i, a) in entries.iter().enumerate() {
            assert!(entries[i + 1..].iter().all(|b| b.name != a.name), "{}", a.name);
        }
    }
}
