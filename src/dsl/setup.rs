//! Turning parsed statements into a runnable [`Netlist`].
//!
//! Statements are first recorded as a textual description: device names
//! and types, connections, aliases and parameter values, all fully
//! qualified with the current namespace. [`Setup::build`] then creates the
//! devices, resolves every connection to a terminal, inserts proxies where
//! logic and analog terminals meet, creates the nets and finally the
//! matrix solvers.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{debug, info, warn};

use super::ast::{Document, NetlistDef, Statement};
use super::library::LIBRARY;
use super::model::ModelStore;
use super::parse;
use crate::circuit::{Delegate, DeviceId, DeviceInfo, LogicFamily, NetKind, NetlistState, TerminalId, TerminalKind};
use crate::components::truthtable::TruthTableData;
use crate::components::{native_devices, Device, DeviceBuilder, DeviceEntry, TruthTable};
use crate::error::{NetlistError, Result};
use crate::netlist::Netlist;
use crate::solver::SolverSystem;

/// Nesting limit for `INCLUDE`, `SUBMODEL` and library entries.
const MAX_INCLUDE_DEPTH: usize = 64;

/// Substitution rounds before a `$(...)` chain counts as recursive.
const MAX_SUBSTITUTIONS: usize = 100;

/// How a device type is created.
#[derive(Debug, Clone)]
enum Factory {
    Native(DeviceEntry),
    TruthTable { params: String, data: Arc<TruthTableData> },
    /// A netlist included under the instance name
    Macro { params: String },
}

impl Factory {
    fn params(&self) -> &str {
        match self {
            Self::Native(e) => e.params,
            Self::TruthTable { params, .. } | Self::Macro { params } => params,
        }
    }
}

/// Collects a netlist description and builds it.
#[derive(Debug)]
pub struct Setup {
    models: ModelStore,
    sources: HashMap<String, NetlistDef>,
    factory: HashMap<String, Factory>,
    data: HashMap<String, Arc<[u8]>>,
    /// `(name, type)` in registration order
    devices: Vec<(String, String)>,
    device_names: HashSet<String>,
    links: Vec<(String, String)>,
    aliases: HashMap<String, String>,
    param_values: HashMap<String, String>,
    defaults: HashMap<String, String>,
    hints: HashSet<String>,
    namespace: Vec<String>,
    frontier_count: usize,
    depth: usize,
}

impl Setup {
    /// A setup knowing the native devices, the built-in models and the
    /// device library. `GND` and `NETLIST` are always present.
    pub fn new() -> Result<Self> {
        let mut setup = Self {
            models: ModelStore::with_builtins(),
            sources: HashMap::new(),
            factory: native_devices()
                .into_iter()
                .map(|e| (e.name.to_string(), Factory::Native(e)))
                .collect(),
            data: HashMap::new(),
            devices: Vec::new(),
            device_names: HashSet::new(),
            links: Vec::new(),
            aliases: HashMap::new(),
            param_values: HashMap::new(),
            defaults: HashMap::new(),
            hints: HashSet::new(),
            namespace: Vec::new(),
            frontier_count: 0,
            depth: 0,
        };
        setup.register_dev("GNDA", "GND", &[])?;
        setup.register_dev("PARAMETER", "NETLIST", &[])?;

        let lib = parse(LIBRARY)?;
        setup.register_document(&lib);
        setup.add_statements(&lib.top_level)?;
        Ok(setup)
    }

    /// Make the netlists of a document available to `INCLUDE`,
    /// `SUBMODEL` and `LOCAL_LIB_ENTRY`.
    pub fn register_document(&mut self, doc: &Document) {
        for def in &doc.netlists {
            if self.sources.insert(def.name.clone(), def.clone()).is_some() {
                debug!("netlist source {} replaced", def.name);
            }
        }
    }

    /// Register a named binary blob for data parameters.
    pub fn register_data(&mut self, name: impl Into<String>, data: impl Into<Arc<[u8]>>) {
        self.data.insert(name.into(), data.into());
    }

    pub fn models(&self) -> &ModelStore {
        &self.models
    }

    pub fn models_mut(&mut self) -> &mut ModelStore {
        &mut self.models
    }

    /// Device types with their positional argument descriptions.
    pub fn device_types(&self) -> Vec<(String, String)> {
        let mut types: Vec<(String, String)> = self
            .factory
            .iter()
            .map(|(name, f)| (name.clone(), f.params().to_string()))
            .collect();
        types.sort();
        types
    }

    /// Run the statements of a registered netlist.
    pub fn include(&mut self, name: &str) -> Result<()> {
        let def = self
            .sources
            .get(name)
            .cloned()
            .ok_or_else(|| NetlistError::SourceNotFound { name: name.to_string() })?;
        if self.depth >= MAX_INCLUDE_DEPTH {
            return Err(NetlistError::parse(0, format!("includes nest too deep at {}", name)));
        }
        debug!("including {} in <{}>", name, self.namespace_prefix());
        self.depth += 1;
        let result = self.add_statements(&def.statements);
        self.depth -= 1;
        result
    }

    pub fn add_statements(&mut self, statements: &[Statement]) -> Result<()> {
        statements.iter().try_for_each(|s| self.add_statement(s))
    }

    pub fn add_statement(&mut self, stmt: &Statement) -> Result<()> {
        match stmt {
            Statement::Device { type_name, name, args, .. } => self.register_dev(type_name, name, args),
            Statement::NetC(terms) => {
                if terms.len() < 2 {
                    return Err(NetlistError::NetCTooFewTerminals);
                }
                for t in &terms[1..] {
                    self.register_link(&terms[0], t);
                }
                Ok(())
            }
            Statement::Alias { alias, target } => {
                let (a, t) = (self.build_fqn(alias), self.build_fqn(target));
                self.add_alias(a, t)
            }
            Statement::Param { name, value } => {
                self.register_param(name, value);
                Ok(())
            }
            Statement::DefParam { name, value } => {
                let fqn = self.build_fqn(name);
                let value = value.replace("@.", &self.namespace_prefix());
                self.defaults.insert(fqn, value);
                Ok(())
            }
            Statement::NetModel(def) => self.models.register(def),
            Statement::Hint { device, hint } => {
                if hint != "NO_DEACTIVATE" {
                    return Err(NetlistError::UnsupportedHint { value: hint.clone() });
                }
                let fqn = self.build_fqn(device);
                self.hints.insert(fqn);
                Ok(())
            }
            Statement::Include(name) => self.include(name),
            Statement::Submodel { source, name } => {
                self.namespace_push(name);
                let result = self.include(source);
                self.namespace.pop();
                result
            }
            Statement::LocalSource(name) => {
                if !self.sources.contains_key(name) {
                    return Err(NetlistError::SourceNotFound { name: name.clone() });
                }
                Ok(())
            }
            Statement::LocalLibEntry { name, params } => {
                self.factory.insert(name.clone(), Factory::Macro { params: params.clone() });
                Ok(())
            }
            Statement::TruthTable(desc) => {
                let data = desc.compile()?;
                debug!("truth table {}", desc.name);
                self.factory.insert(
                    desc.name.clone(),
                    Factory::TruthTable {
                        params: desc.def_params.clone(),
                        data,
                    },
                );
                Ok(())
            }
            Statement::Frontier { attach, rin, rout } => self.register_frontier(attach, rin, rout),
            Statement::DipPins(pins) => self.register_dip_pins(pins),
        }
    }

    // ============ Namespaces ============

    fn namespace_push(&mut self, name: &str) {
        let ns = match self.namespace.last() {
            Some(top) => format!("{}.{}", top, name),
            None => name.to_string(),
        };
        self.namespace.push(ns);
    }

    fn namespace_prefix(&self) -> String {
        self.namespace.last().map(|ns| format!("{}.", ns)).unwrap_or_default()
    }

    fn build_fqn(&self, name: &str) -> String {
        format!("{}{}", self.namespace_prefix(), name.trim())
    }

    // ============ Registration ============

    /// Register a device. Positional arguments follow the type's
    /// description: `+X` connects pin `X` to the argument, `@X` connects
    /// pin `X` to the terminal `X` without taking an argument, anything
    /// else sets parameter `X`.
    pub fn register_dev(&mut self, type_name: &str, name: &str, args: &[String]) -> Result<()> {
        let factory = self
            .factory
            .get(type_name)
            .cloned()
            .ok_or_else(|| NetlistError::UnknownDeviceType {
                type_name: type_name.to_string(),
            })?;

        if let Factory::Macro { .. } = factory {
            self.namespace_push(name);
            let result = self.include(type_name);
            self.namespace.pop();
            result?;
        }

        let key = self.build_fqn(name);
        if !self.device_names.insert(key.clone()) {
            return Err(NetlistError::DuplicateDevice { name: key });
        }
        if !matches!(factory, Factory::Macro { .. }) {
            self.devices.push((key, type_name.to_string()));
        }

        if args.is_empty() {
            return Ok(());
        }
        let mut arg = args.iter();
        for desc in factory.params().split(',').map(str::trim).filter(|d| !d.is_empty()) {
            if let Some(pin) = desc.strip_prefix('+') {
                let target = arg.next().ok_or_else(|| NetlistError::ParamCountMismatch {
                    device: name.to_string(),
                    found: args.len(),
                })?;
                self.register_link(&format!("{}.{}", name, pin), target);
            } else if let Some(pin) = desc.strip_prefix('@') {
                self.register_link(&format!("{}.{}", name, pin), pin);
            } else {
                let value = arg.next().ok_or_else(|| NetlistError::ParamCountMismatch {
                    device: name.to_string(),
                    found: args.len(),
                })?;
                self.register_param(&format!("{}.{}", name, desc), value);
            }
        }
        if arg.next().is_some() {
            return Err(NetlistError::ParamCountExceeded {
                device: name.to_string(),
                found: args.len(),
            });
        }
        Ok(())
    }

    fn register_link(&mut self, a: &str, b: &str) {
        let (a, b) = (self.build_fqn(a), self.build_fqn(b));
        debug!("link {} <== {}", a, b);
        self.links.push((a, b));
    }

    fn add_alias(&mut self, alias: String, target: String) -> Result<()> {
        if self.aliases.contains_key(&alias) {
            return Err(NetlistError::DuplicateAlias { name: alias });
        }
        self.aliases.insert(alias, target);
        Ok(())
    }

    pub fn register_param(&mut self, name: &str, value: &str) {
        let fqn = self.build_fqn(name);
        let value = value.trim_matches('"').replace("@.", &self.namespace_prefix());
        if let Some(old) = self.param_values.get(&fqn) {
            if !old.contains("$(") {
                info!("Overwriting {} old <{}> new <{}>", fqn, old, value);
            }
        }
        self.param_values.insert(fqn, value);
    }

    /// Split the net at `attach`: everything connected to it so far sees
    /// the frontier input, `attach` itself is driven by the frontier output.
    fn register_frontier(&mut self, attach: &str, rin: &str, rout: &str) -> Result<()> {
        let name = format!("frontier_{}", self.frontier_count);
        self.frontier_count += 1;
        self.register_dev("FRONTIER_DEV", &name, &[])?;
        self.register_param(&format!("{}.RIN", name), rin);
        self.register_param(&format!("{}.ROUT", name), rout);
        self.register_link(&format!("{}.G", name), "GND");

        let attach_fqn = self.build_fqn(attach);
        let input = format!("{}.I", self.build_fqn(&name));
        let mut found = false;
        for (a, b) in &mut self.links {
            if *a == attach_fqn {
                *a = input.clone();
                found = true;
            } else if *b == attach_fqn {
                *b = input.clone();
                found = true;
            }
        }
        if !found {
            return Err(NetlistError::FrontierNotFound { name: attach_fqn });
        }
        self.register_link(attach, &format!("{}.Q", name));
        Ok(())
    }

    /// Package pins: pairs of (pin `i`, pin `n + 1 - i`) in the order the
    /// pins face each other on the package.
    fn register_dip_pins(&mut self, pins: &[String]) -> Result<()> {
        if pins.is_empty() || pins.len() % 2 == 1 {
            return Err(NetlistError::DipPinsOdd {
                first: self.build_fqn(""),
            });
        }
        let n = pins.len();
        for i in 0..n / 2 {
            let a = self.build_fqn(&(i + 1).to_string());
            let ta = self.build_fqn(&pins[i * 2]);
            self.add_alias(a, ta)?;
            let b = self.build_fqn(&(n - i).to_string());
            let tb = self.build_fqn(&pins[i * 2 + 1]);
            self.add_alias(b, tb)?;
        }
        Ok(())
    }

    // ============ Resolution ============

    /// Follow an alias chain to its end.
    pub fn resolve_alias(&self, name: &str) -> String {
        let mut cur = name.to_string();
        for _ in 0..=self.aliases.len() {
            match self.aliases.get(&cur) {
                Some(next) if *next != cur => cur = next.clone(),
                _ => break,
            }
        }
        cur
    }

    fn find_terminal(&self, names: &HashMap<String, TerminalId>, name: &str) -> Result<TerminalId> {
        let resolved = self.resolve_alias(name);
        names
            .get(&resolved)
            .or_else(|| names.get(&format!("{}.Q", resolved)))
            .copied()
            .ok_or_else(|| NetlistError::TerminalNotFound { name: name.to_string() })
    }

    /// Replace `$(NAME)` references by parameter or `DEFPARAM` values.
    fn substitute(&self, name: &str, value: &str) -> Result<String> {
        let mut v = value.to_string();
        for _ in 0..MAX_SUBSTITUTIONS {
            let Some(start) = v.find("$(") else {
                return Ok(v);
            };
            let end = v[start..]
                .find(')')
                .map(|e| start + e)
                .ok_or_else(|| NetlistError::invalid_parameter(name, format!("unterminated reference in <{}>", value)))?;
            let key = &v[start + 2..end];
            let rep = self
                .param_values
                .get(key)
                .or_else(|| self.defaults.get(key))
                .ok_or_else(|| NetlistError::invalid_parameter(name, format!("unresolved reference $({})", key)))?;
            v = format!("{}{}{}", &v[..start], rep, &v[end + 1..]);
        }
        Err(NetlistError::invalid_parameter(name, "recursive parameter reference"))
    }

    // ============ Build ============

    /// Create devices, nets and solvers.
    pub fn build(mut self) -> Result<Netlist> {
        let values: HashMap<String, String> = self
            .param_values
            .iter()
            .map(|(k, v)| Ok((k.clone(), self.substitute(k, v)?)))
            .collect::<Result<_>>()?;

        for single in ["SOLVER", "PARAMETER"] {
            if self.devices.iter().filter(|(_, t)| t == single).count() > 1 {
                return Err(NetlistError::MultipleSingletons {
                    type_name: single.to_string(),
                });
            }
        }

        // netlist parameters and the solver first, the rest in order
        let rank = |t: &str| match t {
            "PARAMETER" => 0,
            "SOLVER" => 1,
            _ => 2,
        };
        let mut order = self.devices.clone();
        order.sort_by_key(|(_, t)| rank(t));

        let mut state = NetlistState::new();
        let mut devices: Vec<Box<dyn Device>> = Vec::with_capacity(order.len());
        let mut edges = Vec::new();
        for (name, type_name) in &order {
            self.create_device(&mut state, &mut devices, &values, name, type_name, None, &mut edges)?;
        }
        debug!("created {} devices", devices.len());

        let known: HashSet<&str> = state.params().iter().map(|p| p.name.as_str()).collect();
        if let Some(missing) = values
            .keys()
            .find(|k| !known.contains(k.as_str()) && !self.defaults.contains_key(*k))
        {
            return Err(NetlistError::ParamNotFound { name: missing.clone() });
        }

        self.apply_hints(&mut state)?;
        self.connect(&mut state, &mut devices, &values, edges)?;

        let solver_device = self
            .devices
            .iter()
            .find(|(_, t)| t == "SOLVER")
            .and_then(|(n, _)| state.find_device(n));
        let solvers = SolverSystem::build(&mut state, &devices, solver_device)?;
        Ok(Netlist::new(state, devices, solvers))
    }

    #[allow(clippy::too_many_arguments)]
    fn create_device(
        &mut self,
        state: &mut NetlistState,
        devices: &mut Vec<Box<dyn Device>>,
        values: &HashMap<String, String>,
        name: &str,
        type_name: &str,
        family: Option<LogicFamily>,
        edges: &mut Vec<(TerminalId, TerminalId)>,
    ) -> Result<DeviceId> {
        let factory = self
            .factory
            .get(type_name)
            .cloned()
            .ok_or_else(|| NetlistError::UnknownDeviceType {
                type_name: type_name.to_string(),
            })?;
        let id = state.add_device(DeviceInfo::new(name, type_name));
        let mut b = DeviceBuilder::new(state, id, values, &self.models, &self.data);
        if let Some(f) = family {
            b.set_family(f);
        }
        let dev: Box<dyn Device> = match factory {
            Factory::Native(e) => (e.create)(&mut b)?,
            Factory::TruthTable { data, .. } => Box::new(TruthTable::new(&mut b, data)?),
            Factory::Macro { .. } => {
                return Err(NetlistError::UnknownDeviceType {
                    type_name: type_name.to_string(),
                })
            }
        };
        let built = b.finish();
        devices.push(dev);
        for (alias, target) in built.aliases {
            self.add_alias(alias, target)?;
        }
        edges.extend(built.links);
        self.links.extend(built.net_links);
        Ok(id)
    }

    fn apply_hints(&self, state: &mut NetlistState) -> Result<()> {
        if let Some(h) = self.hints.iter().find(|h| !self.device_names.contains(*h)) {
            return Err(NetlistError::HintTargetNotFound { name: h.clone() });
        }
        let use_deactivate = state
            .find_param("NETLIST.USE_DEACTIVATE")
            .map(|p| state.params()[p].value.as_f64() != 0.0)
            .unwrap_or(false);
        for info in &mut state.devices {
            info.hint_deactivate = use_deactivate && !self.hints.contains(&info.name);
        }
        Ok(())
    }

    /// Resolve all connections and create the nets.
    ///
    /// Connected terminals form groups. A group may hold at most one
    /// output. Where logic and analog terminals share a group, proxies
    /// split it into parts that only hold one kind.
    fn connect(
        &mut self,
        state: &mut NetlistState,
        devices: &mut Vec<Box<dyn Device>>,
        values: &HashMap<String, String>,
        mut edges: Vec<(TerminalId, TerminalId)>,
    ) -> Result<()> {
        let mut names: HashMap<String, TerminalId> = state
            .terminals()
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), TerminalId(i)))
            .collect();
        for (a, b) in &self.links {
            let ta = self.find_terminal(&names, a)?;
            let tb = self.find_terminal(&names, b)?;
            edges.push((ta, tb));
        }

        let mut plan = Plan {
            edges: Vec::new(),
            proxies: 0,
        };
        for group in group_terminals(state.terminals().len(), &edges) {
            self.plan_group(state, devices, values, &mut names, &mut plan, &group)?;
        }

        for group in group_terminals(state.terminals().len(), &plan.edges) {
            make_net(state, &group);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn plan_group(
        &mut self,
        state: &mut NetlistState,
        devices: &mut Vec<Box<dyn Device>>,
        values: &HashMap<String, String>,
        names: &mut HashMap<String, TerminalId>,
        plan: &mut Plan,
        group: &[TerminalId],
    ) -> Result<()> {
        let kind = |st: &NetlistState, t: TerminalId| st.terminal(t).kind;
        let outputs: Vec<TerminalId> = group.iter().copied().filter(|&t| kind(state, t).is_output()).collect();
        if outputs.len() > 1 {
            return Err(NetlistError::MergeRailNets {
                first: state.terminal(outputs[0]).name.clone(),
                second: state.terminal(outputs[1]).name.clone(),
            });
        }

        if let [t] = group {
            let term = state.terminal(*t);
            match term.kind {
                TerminalKind::Terminal => {
                    return Err(NetlistError::UnconnectedTerminal { name: term.name.clone() });
                }
                TerminalKind::LogicInput | TerminalKind::AnalogInput if !is_nc_or_passive(state, *t) => {
                    warn!("Found input {} without connections", term.name);
                }
                TerminalKind::LogicOutput | TerminalKind::AnalogOutput => {
                    debug!("output {} without connections", term.name);
                }
                _ => {}
            }
            return Ok(());
        }

        let logic_inputs: Vec<TerminalId> = group
            .iter()
            .copied()
            .filter(|&t| kind(state, t) == TerminalKind::LogicInput)
            .collect();
        let analog: Vec<TerminalId> = group
            .iter()
            .copied()
            .filter(|&t| matches!(kind(state, t), TerminalKind::AnalogInput | TerminalKind::Terminal))
            .collect();

        match outputs.first() {
            Some(&o) if kind(state, o) == TerminalKind::LogicOutput => {
                plan.chain(o, &logic_inputs);
                if !analog.is_empty() {
                    let family = state.terminal(o).family.unwrap_or_else(LogicFamily::ttl);
                    let name = format!("proxy_da_{}_{}", state.terminal(o).name, plan.next());
                    self.create_proxy(state, devices, values, names, plan, "PROXY_DA", &name, family)?;
                    let input = self.find_terminal(names, &format!("{}.I", name))?;
                    let q = self.find_terminal(names, &format!("{}.Q", name))?;
                    plan.edges.push((o, input));
                    plan.chain(q, &analog);
                }
            }
            Some(&o) => {
                plan.chain(o, &analog);
                for &li in &logic_inputs {
                    self.proxy_logic_input(state, devices, values, names, plan, li, o)?;
                }
            }
            None if analog.iter().any(|&t| kind(state, t) == TerminalKind::Terminal) => {
                let anchor = analog[0];
                plan.chain(anchor, &analog);
                for &li in &logic_inputs {
                    self.proxy_logic_input(state, devices, values, names, plan, li, anchor)?;
                }
            }
            None => {
                let has_nc = group.iter().any(|&t| is_nc(state, t));
                if let Some(&t) = group.iter().find(|&&t| !is_nc_or_passive(state, t)) {
                    if !has_nc {
                        return Err(NetlistError::UndrivenInput {
                            name: state.terminal(t).name.clone(),
                        });
                    }
                }
                warn!("net of {} has no driver", state.terminal(group[0]).name);
                plan.chain(group[0], group);
            }
        }
        Ok(())
    }

    /// Let a logic input listen to an analog net through an A/D proxy.
    #[allow(clippy::too_many_arguments)]
    fn proxy_logic_input(
        &mut self,
        state: &mut NetlistState,
        devices: &mut Vec<Box<dyn Device>>,
        values: &HashMap<String, String>,
        names: &mut HashMap<String, TerminalId>,
        plan: &mut Plan,
        input: TerminalId,
        analog: TerminalId,
    ) -> Result<()> {
        let family = state.terminal(input).family.unwrap_or_else(LogicFamily::ttl);
        let name = format!("proxy_ad_{}_{}", state.terminal(input).name, plan.next());
        self.create_proxy(state, devices, values, names, plan, "PROXY_AD", &name, family)?;
        let pi = self.find_terminal(names, &format!("{}.I", name))?;
        let pq = self.find_terminal(names, &format!("{}.Q", name))?;
        plan.edges.push((pi, analog));
        plan.edges.push((pq, input));
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn create_proxy(
        &mut self,
        state: &mut NetlistState,
        devices: &mut Vec<Box<dyn Device>>,
        values: &HashMap<String, String>,
        names: &mut HashMap<String, TerminalId>,
        plan: &mut Plan,
        type_name: &str,
        name: &str,
        family: LogicFamily,
    ) -> Result<()> {
        debug!("creating proxy {}", name);
        let first_terminal = state.terminals().len();
        let first_link = self.links.len();
        self.create_device(state, devices, values, name, type_name, Some(family), &mut plan.edges)?;
        for i in first_terminal..state.terminals().len() {
            names.insert(state.terminals()[i].name.clone(), TerminalId(i));
        }
        let new_links: Vec<(String, String)> = self.links[first_link..].to_vec();
        for (a, b) in new_links {
            let ta = self.find_terminal(names, &a)?;
            let tb = self.find_terminal(names, &b)?;
            plan.edges.push((ta, tb));
        }
        Ok(())
    }
}

/// Connections of the final, single kind nets.
struct Plan {
    edges: Vec<(TerminalId, TerminalId)>,
    proxies: usize,
}

impl Plan {
    fn chain(&mut self, anchor: TerminalId, others: &[TerminalId]) {
        self.edges.extend(others.iter().filter(|&&t| t != anchor).map(|&t| (anchor, t)));
    }

    fn next(&mut self) -> usize {
        self.proxies += 1;
        self.proxies - 1
    }
}

fn is_nc(state: &NetlistState, t: TerminalId) -> bool {
    state.device_info(state.terminal(t).device).type_name == "NC_PIN"
}

fn is_nc_or_passive(state: &NetlistState, t: TerminalId) -> bool {
    let term = state.terminal(t);
    is_nc(state, t) || (term.kind == TerminalKind::AnalogInput && term.delegate == Delegate::None)
}

/// Connected components over `n` terminals, ordered by their lowest member.
fn group_terminals(n: usize, edges: &[(TerminalId, TerminalId)]) -> Vec<Vec<TerminalId>> {
    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    let mut parent: Vec<usize> = (0..n).collect();
    for &(a, b) in edges {
        let (ra, rb) = (find(&mut parent, a.0), find(&mut parent, b.0));
        if ra != rb {
            parent[ra.max(rb)] = ra.min(rb);
        }
    }

    let mut index: HashMap<usize, usize> = HashMap::new();
    let mut groups: Vec<Vec<TerminalId>> = Vec::new();
    for t in 0..n {
        let root = find(&mut parent, t);
        let g = *index.entry(root).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[g].push(TerminalId(t));
    }
    groups
}

/// Put a group of terminals on one net. A group with an output uses the
/// output's net.
fn make_net(state: &mut NetlistState, group: &[TerminalId]) {
    let output = group.iter().copied().find(|&t| state.terminal(t).kind.is_output());
    let net = match output {
        Some(o) => match state.terminal(o).net {
            Some(n) => n,
            None => return,
        },
        None if group.len() == 1 => return,
        None => {
            let analog = group.iter().any(|&t| !state.terminal(t).kind.is_logic());
            let kind = if analog { NetKind::Analog } else { NetKind::Logic };
            let name = format!("net.{}", state.terminal(group[0]).name);
            state.add_net(name, kind, None)
        }
    };
    for &t in group {
        if Some(t) != output {
            state.attach(t, net);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::ParamValue;
    use crate::dsl::load;

    fn param(nl: &Netlist, name: &str) -> f64 {
        let st = nl.state();
        st.params()[st.find_param(name).unwrap()].value.as_f64()
    }

    fn net_of(nl: &Netlist, terminal: &str) -> Option<crate::circuit::NetId> {
        let st = nl.state();
        st.terminal(st.find_terminal(terminal).unwrap()).net
    }

    #[test]
    fn test_positional_args() {
        let nl = load(
            "SOLVER(Solver, 48000)
             ANALOG_INPUT(V5, 5)
             RES(R1, 1k)
             RES(R2, RES_K(2.2))
             NET_C(V5, R1.1)
             NET_C(R1.2, R2.1)
             NET_C(R2.2, GND)",
            None,
        )
        .unwrap();
        assert_eq!(param(&nl, "R1.R"), 1000.0);
        assert_eq!(param(&nl, "V5.IN"), 5.0);
        assert_eq!(net_of(&nl, "R1.2"), net_of(&nl, "R2.1"));
        assert_eq!(net_of(&nl, "R1.1"), net_of(&nl, "V5.Q"));
        assert_eq!(nl.solvers().solvers().len(), 1);
    }

    #[test]
    fn test_setup_errors() {
        let err = |src: &str| load(src, None).unwrap_err();
        assert!(matches!(err("FOO(X1)"), NetlistError::UnknownDeviceType { .. }));
        assert!(matches!(err("RES(R1, 1k)\nRES(R1, 2k)"), NetlistError::DuplicateDevice { .. }));
        assert!(matches!(err("RES(R1, 1k)\nNET_C(R1.1)"), NetlistError::NetCTooFewTerminals));
        assert!(matches!(err("RES(R1, 1k, 2k)"), NetlistError::ParamCountExceeded { .. }));
        assert!(matches!(err("SYS_DSW1(S1, A)"), NetlistError::ParamCountMismatch { .. }));
        assert!(matches!(err("RES(R1, 1k)\nPARAM(R1.X, 1)"), NetlistError::ParamNotFound { .. }));
        assert!(matches!(
            err("RES(R1, 1k)\nNET_C(R1.1, nowhere)"),
            NetlistError::TerminalNotFound { .. }
        ));
        assert!(matches!(err("DIPPINS(A, B, C)"), NetlistError::DipPinsOdd { .. }));
        assert!(matches!(
            err("TTL_INPUT(I1, 0)\nTTL_INPUT(I2, 1)\nNET_C(I1.Q, I2.Q)"),
            NetlistError::MergeRailNets { .. }
        ));
        assert!(matches!(
            err("TTL_7400_NAND(A)\nTTL_7400_NAND(B)\nNET_C(A.A, B.A)"),
            NetlistError::UndrivenInput { .. }
        ));
        assert!(matches!(
            err("SOLVER(Solver, 48000)\nRES(R1, 1k)\nNET_C(R1.1, GND)"),
            NetlistError::UnconnectedTerminal { .. }
        ));
        assert!(matches!(
            err("ANALOG_INPUT(V, 1)\nRES(R1, 1k)\nRES(R2, 1k)\nNET_C(V, R1.1)\nNET_C(R1.2, R2.1)\nNET_C(R2.2, GND)"),
            NetlistError::NoSolver
        ));
        assert!(matches!(
            err("SOLVER(S1, 48000)\nSOLVER(S2, 48000)"),
            NetlistError::MultipleSingletons { .. }
        ));
        assert!(matches!(
            err("HINT(nothing, NO_DEACTIVATE)"),
            NetlistError::HintTargetNotFound { .. }
        ));
        assert!(matches!(err("RES(R1, 1k)\nHINT(R1, FOO)"), NetlistError::UnsupportedHint { .. }));
        assert!(matches!(err("INCLUDE(missing)"), NetlistError::SourceNotFound { .. }));
        assert!(matches!(err("RES(R1, $(NOPE))"), NetlistError::InvalidParameter { .. }));
    }

    #[test]
    fn test_logic_output_into_analog_gets_da_proxy() {
        let nl = load(
            "SOLVER(Solver, 48000)
             TTL_INPUT(I1, 1)
             RES(R1, 1k)
             NET_C(I1.Q, R1.1)
             NET_C(R1.2, GND)
             TTL_7404_INVERT(N1, R1.1)",
            None,
        )
        .unwrap();
        let st = nl.state();
        assert!(st.find_device("proxy_da_I1.Q_0").is_some());
        assert_eq!(net_of(&nl, "N1.A"), net_of(&nl, "I1.Q"));
        assert_ne!(net_of(&nl, "R1.1"), net_of(&nl, "I1.Q"));
        let r1 = net_of(&nl, "R1.1").unwrap();
        assert!(st.net(r1).is_analog());
        assert_eq!(net_of(&nl, "proxy_da_I1.Q_0.RV.2"), net_of(&nl, "GND.Q"));
    }

    #[test]
    fn test_analog_into_logic_input_gets_ad_proxy() {
        let nl = load("ANALOG_INPUT(V, 5)\nTTL_7404_INVERT(N1, V)", None).unwrap();
        let st = nl.state();
        let proxy = "proxy_ad_N1.A_0";
        assert!(st.find_device(proxy).is_some());
        assert_eq!(net_of(&nl, "N1.A"), net_of(&nl, &format!("{}.Q", proxy)));
        assert_eq!(net_of(&nl, &format!("{}.I", proxy)), net_of(&nl, "V.Q"));
    }

    #[test]
    fn test_package_pins() {
        let mut setup = Setup::new().unwrap();
        let doc = parse("TTL_7400_DIP(IC1)\nTTL_INPUT(H, 1)\nNET_C(H, IC1.1, IC1.2)").unwrap();
        setup.add_statements(&doc.top_level).unwrap();
        assert_eq!(setup.resolve_alias("IC1.3"), "IC1.A.Q");
        assert_eq!(setup.resolve_alias("IC1.13"), "IC1.D.B");
        let nl = setup.build().unwrap();
        assert_eq!(net_of(&nl, "IC1.A.A"), net_of(&nl, "H.Q"));
        assert_eq!(net_of(&nl, "IC1.A.B"), net_of(&nl, "H.Q"));
    }

    #[test]
    fn test_submodel_with_defparam() {
        let src = "
            NETLIST_START(divider)
                DEFPARAM(RV, 2k)
                RES(R1, $(@.RV))
                RES(R2, $(@.RV))
                ALIAS(IN, R1.1)
                NET_C(R1.2, R2.1)
                ALIAS(OUT, R1.2)
                ALIAS(LOW, R2.2)
            NETLIST_END()

            NETLIST_START(main)
                SOLVER(Solver, 48000)
                ANALOG_INPUT(V, 5)
                SUBMODEL(divider, D1)
                SUBMODEL(divider, D2)
                PARAM(D1.RV, 3k)
                NET_C(V, D1.IN, D2.IN)
                NET_C(D1.LOW, D2.LOW, GND)
            NETLIST_END()
        ";
        let nl = load(src, None).unwrap();
        assert_eq!(param(&nl, "D1.R1.R"), 3000.0);
        assert_eq!(param(&nl, "D2.R2.R"), 2000.0);
        assert_eq!(net_of(&nl, "D1.R1.2"), net_of(&nl, "D1.R2.1"));
        assert_ne!(net_of(&nl, "D1.R1.2"), net_of(&nl, "D2.R1.2"));
    }

    #[test]
    fn test_frontier_splits_net() {
        let nl = load(
            "SOLVER(Solver, 48000)
             ANALOG_INPUT(V, 5)
             RES(R1, 1k)
             RES(R2, 1k)
             NET_C(V, R1.1)
             NET_C(R1.2, R2.1)
             NET_C(R2.2, GND)
             FRONTIER(R2.1, 1e6, 50)",
            None,
        )
        .unwrap();
        assert_eq!(param(&nl, "frontier_0.ROUT"), 50.0);
        assert_eq!(net_of(&nl, "R1.2"), net_of(&nl, "frontier_0._RIN.1"));
        assert_eq!(net_of(&nl, "R2.1"), net_of(&nl, "frontier_0._ROUT.2"));
        assert_ne!(net_of(&nl, "R1.2"), net_of(&nl, "R2.1"));

        let err = load("RES(R1, 1k)\nFRONTIER(R1.1, 1e6, 50)", None).unwrap_err();
        assert!(matches!(err, NetlistError::FrontierNotFound { .. }));
    }

    #[test]
    fn test_param_overwrite_and_models() {
        let nl = load(
            "SOLVER(Solver, 48000)
             NET_MODEL(\"MYD D(IS=1e-14 N=1.5)\")
             ANALOG_INPUT(V, 5)
             RES(R1, 1k)
             DIODE(D1, \"MYD\")
             PARAM(R1.R, 2k)
             NET_C(V, R1.1)
             NET_C(R1.2, D1.A)
             NET_C(D1.K, GND)",
            None,
        )
        .unwrap();
        assert_eq!(param(&nl, "R1.R"), 2000.0);
        let st = nl.state();
        let m = st.find_param("D1.MODEL").unwrap();
        assert_eq!(st.params()[m].value, ParamValue::Model("MYD".into()));
    }

    #[test]
    fn test_use_deactivate_and_hints() {
        let nl = load(
            "PARAM(NETLIST.USE_DEACTIVATE, 1)
             TTL_INPUT(I1, 1)
             TTL_7404_INVERT(N1, I1)
             TTL_7404_INVERT(N2, N1.Q)
             HINT(N2, NO_DEACTIVATE)",
            None,
        )
        .unwrap();
        let st = nl.state();
        let n1 = st.find_device("N1").unwrap();
        let n2 = st.find_device("N2").unwrap();
        assert!(st.device_info(n1).hint_deactivate);
        assert!(!st.device_info(n2).hint_deactivate);
    }
}
