//! Error types for the netlist engine.
//!
//! [`NetlistError`] is the only error type the crate produces. It covers
//! everything that can go wrong while reading a netlist description, wiring
//! the circuit graph, resolving models and parameters, and doing file I/O in
//! the tools. Once a netlist is built, simulation itself does not fail:
//! numerical trouble is bounded and logged instead.

use thiserror::Error;

/// Result type alias using [`NetlistError`].
pub type Result<T> = std::result::Result<T, NetlistError>;

/// Unified error type for all netlist operations.
#[derive(Error, Debug)]
pub enum NetlistError {
    // ============ DSL Parsing Errors ============
    /// Error during lexical analysis
    #[error("Lexer error at line {line}, column {column}: {message}")]
    LexerError {
        line: usize,
        column: usize,
        message: String,
    },

    /// Error during parsing
    #[error("Parse error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    /// A referenced netlist source (INCLUDE, SUBMODEL, LOCAL_SOURCE) is missing
    #[error("unable to find {name} in sources collection")]
    SourceNotFound { name: String },

    /// Truth table description is inconsistent
    #[error("Truth table '{name}': {message}")]
    TruthTable { name: String, message: String },

    // ============ Setup Errors ============
    /// Unknown device type
    #[error("Class <{type_name}> not found!")]
    UnknownDeviceType { type_name: String },

    /// Device name used twice
    #[error("Device already exists: {name}")]
    DuplicateDevice { name: String },

    /// Alias or terminal could not be resolved
    #[error("Terminal {name} not found")]
    TerminalNotFound { name: String },

    /// Alias defined twice
    #[error("Error adding alias {name} to alias list")]
    DuplicateAlias { name: String },

    /// Device instantiated with too many positional parameters
    #[error("Parameter count exceed for {device} - found {found}")]
    ParamCountExceeded { device: String, found: usize },

    /// Device instantiated with too few positional parameters
    #[error("Parameter count mismatch for {device} - only found {found}")]
    ParamCountMismatch { device: String, found: usize },

    /// FRONTIER attach point has no connections to split
    #[error("Found no occurrence of {name}")]
    FrontierNotFound { name: String },

    /// Parameter lookup failed
    #[error("Parameter {name} not found")]
    ParamNotFound { name: String },

    /// Parameter value of the wrong type
    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter { name: String, message: String },

    /// DIPPINS needs pairs
    #[error("You must pass an equal number of pins to DIPPINS {first}")]
    DipPinsOdd { first: String },

    /// NET_C with a single terminal
    #[error("You must pass at least 2 terminals to NET_C")]
    NetCTooFewTerminals,

    /// Two drivers on the same net
    #[error("Trying to merge two rail nets: {first} and {second}")]
    MergeRailNets { first: String, second: String },

    /// A logic input has nothing driving it
    #[error("Found logic input {name} without a driver")]
    UndrivenInput { name: String },

    /// A terminal is not connected to anything
    #[error("Found terminal {name} without connections")]
    UnconnectedTerminal { name: String },

    /// Analog elements present but no SOLVER device
    #[error("No solver found for this netlist although analog elements are present")]
    NoSolver,

    /// More than one device of a singleton type
    #[error("More than one {type_name} device found")]
    MultipleSingletons { type_name: String },

    /// HINT refers to an unknown device
    #[error("Device not found for hint {name}")]
    HintTargetNotFound { name: String },

    /// Unsupported HINT value
    #[error("HINT_NO_DEACTIVATE value not supported: <{value}>")]
    UnsupportedHint { value: String },

    // ============ Model Errors ============
    /// Model string is malformed
    #[error("Unable to parse model: {model}")]
    ModelSyntax { model: String },

    /// Model or base model not found
    #[error("Model {model} not found")]
    ModelNotFound { model: String },

    /// Key missing from a model
    #[error("Entity {entity} not found in model {model}")]
    ModelEntityNotFound { entity: String, model: String },

    /// Model key not upper case
    #[error("Model parameters should be uppercase: {entity} {model}")]
    ModelKeyNotUppercase { entity: String, model: String },

    /// Model value not numeric
    #[error("Can't convert {entity}={value} to a number for model {model}")]
    ModelNumber {
        entity: String,
        value: String,
        model: String,
    },

    /// Unknown logic family type
    #[error("Unknown family type {family} in model {model}")]
    UnknownFamily { family: String, model: String },

    // ============ Solver Errors ============
    /// LU decomposition found no usable pivot
    #[error("Singular matrix in row {row}")]
    SingularMatrix { row: usize },

    // ============ I/O Errors ============
    /// Error reading a netlist or log file
    #[error("Failed to read file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Error writing an output stream
    #[error("Output error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Malformed input data in a log or wav stream
    #[error("Invalid data in {context}: {message}")]
    InvalidData { context: String, message: String },
}

impl NetlistError {
    /// Create a lexer error
    pub fn lexer(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::LexerError {
            line,
            column,
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::ParseError {
            line,
            message: message.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a truth table error
    pub fn truth_table(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TruthTable {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an invalid data error
    pub fn invalid_data(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidData {
            context: context.into(),
            message: message.into(),
        }
    }
}
