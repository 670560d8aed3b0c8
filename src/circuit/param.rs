//! Device parameters.

use std::sync::Arc;

use super::types::{DeviceId, ParamId};
use crate::dsl::parse_number;
use crate::error::{NetlistError, Result};

/// Value of a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Float(f64),
    Int(i64),
    Logic(bool),
    Str(String),
    /// One of a fixed set of names
    Enum {
        choices: &'static [&'static str],
        index: usize,
    },
    /// Model string, e.g. `1N914` or `D(IS=1e-15)`
    Model(String),
    /// Binary blob from the setup's data sources
    Data(Arc<[u8]>),
    /// Memory handed in by the embedding application
    Pointer(Option<Arc<[u8]>>),
}

impl ParamValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Float(_) => "float",
            Self::Int(_) => "integer",
            Self::Logic(_) => "logic",
            Self::Str(_) => "string",
            Self::Enum { .. } => "enum",
            Self::Model(_) => "model",
            Self::Data(_) => "data",
            Self::Pointer(_) => "pointer",
        }
    }

    /// Parse `text` into a value of the same variant as `self`.
    pub fn parse_like(&self, name: &str, text: &str) -> Result<ParamValue> {
        let bad = |what: &str| NetlistError::invalid_parameter(name, format!("<{}> is not {}", text, what));
        Ok(match self {
            Self::Float(_) => Self::Float(parse_number(text).ok_or_else(|| bad("a number"))?),
            Self::Int(_) => {
                let v = parse_number(text).ok_or_else(|| bad("a number"))?;
                if v.fract() != 0.0 {
                    return Err(bad("an integer"));
                }
                Self::Int(v as i64)
            }
            Self::Logic(_) => match text.to_uppercase().as_str() {
                "TRUE" => Self::Logic(true),
                "FALSE" => Self::Logic(false),
                _ => Self::Logic(parse_number(text).ok_or_else(|| bad("a logic value"))? != 0.0),
            },
            Self::Str(_) => Self::Str(text.to_string()),
            Self::Model(_) => Self::Model(text.to_string()),
            Self::Enum { choices, .. } => {
                let index = choices
                    .iter()
                    .position(|c| c.eq_ignore_ascii_case(text))
                    .ok_or_else(|| NetlistError::invalid_parameter(name, format!("Invalid element found {}", text)))?;
                Self::Enum { choices, index }
            }
            Self::Data(_) | Self::Pointer(_) => {
                return Err(NetlistError::invalid_parameter(
                    name,
                    "binary parameters are set from data sources",
                ))
            }
        })
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Float(v) => *v,
            Self::Int(v) => *v as f64,
            Self::Logic(v) => f64::from(u8::from(*v)),
            Self::Enum { index, .. } => *index as f64,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Param {
    /// Fully qualified name, e.g. `R1.R`
    pub name: String,
    pub device: DeviceId,
    pub value: ParamValue,
}

macro_rules! param_handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name(pub(crate) ParamId);

        impl $name {
            pub fn id(self) -> ParamId {
                self.0
            }
        }
    };
}

param_handle!(
    /// Floating point parameter.
    ParamF64
);
param_handle!(
    /// Integer parameter.
    ParamInt
);
param_handle!(
    /// Logic (boolean) parameter.
    ParamBool
);
param_handle!(
    /// String parameter.
    ParamStr
);
param_handle!(
    /// Enumerated parameter.
    ParamEnum
);
param_handle!(
    /// Binary parameter (data blob or pointer).
    ParamBytes
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_like() {
        let f = ParamValue::Float(0.0).parse_like("R1.R", "4.7k").unwrap();
        assert_eq!(f, ParamValue::Float(4700.0));

        let i = ParamValue::Int(0).parse_like("X.N", "3").unwrap();
        assert_eq!(i, ParamValue::Int(3));
        assert!(ParamValue::Int(0).parse_like("X.N", "2.5").is_err());

        let b = ParamValue::Logic(false).parse_like("X.B", "1").unwrap();
        assert_eq!(b, ParamValue::Logic(true));
    }

    #[test]
    fn test_enum_param() {
        const METHODS: &[&str] = &["MAT_CR", "MAT", "GMRES"];
        let e = ParamValue::Enum {
            choices: METHODS,
            index: 0,
        };
        let v = e.parse_like("Solver.METHOD", "gmres").unwrap();
        assert_eq!(v.as_f64(), 2.0);
        assert!(e.parse_like("Solver.METHOD", "SOR").is_err());
    }
}
