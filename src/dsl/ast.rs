//! Abstract Syntax Tree types for the netlist language.

use crate::components::TruthTableDesc;

/// A parsed netlist source: the named `NETLIST_START` blocks plus the
/// statements written outside of any block.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub netlists: Vec<NetlistDef>,
    /// Statements outside of `NETLIST_START`/`NETLIST_END`
    pub top_level: Vec<Statement>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, name: &str) -> Option<&NetlistDef> {
        self.netlists.iter().find(|n| n.name == name)
    }

    /// The netlist to run: the top level statements if there are any,
    /// otherwise the last block (blocks used by it come first).
    pub fn main(&self) -> Option<NetlistDef> {
        if !self.top_level.is_empty() {
            return Some(NetlistDef {
                name: String::new(),
                statements: self.top_level.clone(),
            });
        }
        self.netlists.last().cloned()
    }
}

/// A `NETLIST_START(name)` ... `NETLIST_END()` block.
#[derive(Debug, Clone, PartialEq)]
pub struct NetlistDef {
    pub name: String,
    pub statements: Vec<Statement>,
}

/// One statement. Arguments are kept as text: numbers as written (unit
/// macros already evaluated), strings without quotes, parameter
/// references as `$(NAME)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `TYPE(name, args...)`
    Device {
        type_name: String,
        name: String,
        args: Vec<String>,
        line: usize,
    },
    /// `NET_C(a, b, ...)`
    NetC(Vec<String>),
    /// `ALIAS(alias, target)`
    Alias { alias: String, target: String },
    /// `PARAM(name, value)`
    Param { name: String, value: String },
    /// `DEFPARAM(name, value)`
    DefParam { name: String, value: String },
    /// `NET_MODEL("NAME BASE(...)")`
    NetModel(String),
    /// `HINT(device, NAME)`
    Hint { device: String, hint: String },
    /// `INCLUDE(source)`
    Include(String),
    /// `SUBMODEL(source, name)`
    Submodel { source: String, name: String },
    /// `LOCAL_SOURCE(source)`
    LocalSource(String),
    /// `LOCAL_LIB_ENTRY(source)` or `LOCAL_LIB_ENTRY(source, "params")`
    LocalLibEntry { name: String, params: String },
    /// `TRUTHTABLE_START` ... `TRUTHTABLE_END` block
    TruthTable(TruthTableDesc),
    /// `FRONTIER(attach, rin, rout)`
    Frontier { attach: String, rin: String, rout: String },
    /// `DIPPINS(pin1, pin14, pin2, pin13, ...)`
    DipPins(Vec<String>),
}

impl Statement {
    /// Keyword the statement is written with, for diagnostics.
    pub fn keyword(&self) -> &str {
        match self {
            Self::Device { type_name, .. } => type_name,
            Self::NetC(_) => "NET_C",
            Self::Alias { .. } => "ALIAS",
            Self::Param { .. } => "PARAM",
            Self::DefParam { .. } => "DEFPARAM",
            Self::NetModel(_) => "NET_MODEL",
            Self::Hint { .. } => "HINT",
            Self::Include(_) => "INCLUDE",
            Self::Submodel { .. } => "SUBMODEL",
            Self::LocalSource(_) => "LOCAL_SOURCE",
            Self::LocalLibEntry { .. } => "LOCAL_LIB_ENTRY",
            Self::TruthTable(_) => "TRUTHTABLE_START",
            Self::Frontier { .. } => "FRONTIER",
            Self::DipPins(_) => "DIPPINS",
        }
    }
}
