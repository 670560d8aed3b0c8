//! SPICE style models.
//!
//! A model is a name plus a definition of the form `BASE(KEY=VALUE ...)`.
//! Definitions inherit from their base model, `_` marks a core model:
//!
//! ```text
//! D      _(IS=1e-15 N=1)
//! 1N914  D(IS=2.52n N=1.752)
//! ```
//!
//! Devices may also give a definition inline, e.g. `D(IS=1e-14 N=1.5)`.

use std::collections::{BTreeMap, HashMap};

use log::debug;

use crate::circuit::{FamilyType, LogicFamily};
use crate::error::{NetlistError, Result};

/// Models every netlist knows about.
const BUILTIN_MODELS: &[&str] = &[
    "D _(IS=1e-15 N=1 NBV=3 IBV=1m BV=1e9)",
    "1N914 D(IS=2.52n RS=.568 N=1.752 CJO=4p M=.4 TT=20n)",
    "1N4148 D(IS=2.52n RS=.568 N=1.752 CJO=4p M=.4 TT=20n)",
    "1N4001 D(IS=14.11n N=1.984 RS=33.89m)",
    "NPN _(IS=1e-15 BF=100 NF=1 BR=1 NR=1 CJE=0 CJC=0)",
    "PNP _(IS=1e-15 BF=100 NF=1 BR=1 NR=1 CJE=0 CJC=0)",
    "2N3904 NPN(IS=1e-14 BF=300 NF=1 BR=4 NR=1 CJE=26p CJC=4p)",
    "2N3906 PNP(IS=1.41f BF=180.7 NF=1 BR=4.977 NR=1 CJE=8.063p CJC=9.728p)",
    "BC548 NPN(IS=1.8e-14 BF=400 NF=0.9955 BR=35.5 NR=1.005 CJE=11.5p CJC=5.25p)",
    "OPAMP _(A=1e5 RIN=1e7 ROUT=50)",
    "UA741 OPAMP(A=2e5 RIN=2e6 ROUT=75)",
    "FAMILY _(TYPE=CUSTOM FV=5 IVL=0.16 IVH=0.4 OVL=0.1 OVH=1.0 ORL=1.0 ORH=130)",
    "74XX FAMILY(TYPE=TTL)",
    "CD4XXX FAMILY(TYPE=CD4XXX IVL=0.3 IVH=0.7 OVL=0.05 OVH=0.05 ORL=500 ORH=500)",
];

/// Key under which the name of the core model is stored.
const CORE_MODEL: &str = "COREMODEL";

/// Registered model definitions.
#[derive(Debug, Clone, Default)]
pub struct ModelStore {
    models: HashMap<String, String>,
}

impl ModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding the built in models.
    pub fn with_builtins() -> Self {
        let mut store = Self::new();
        for def in BUILTIN_MODELS {
            // built in definitions are well formed
            if let Some((name, body)) = def.split_once(' ') {
                store.models.insert(name.to_string(), body.trim().to_string());
            }
        }
        store
    }

    /// Register `NAME BASE(...)`. A later definition replaces an earlier one.
    pub fn register(&mut self, def: &str) -> Result<()> {
        let (name, body) = def
            .trim()
            .split_once(' ')
            .ok_or_else(|| NetlistError::ModelSyntax { model: def.to_string() })?;
        let name = name.trim().to_uppercase();
        if self.models.insert(name.clone(), body.trim().to_string()).is_some() {
            debug!("model {} overwritten", name);
        }
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(&name.to_uppercase())
    }

    /// Flatten a model name or inline definition into its key/value map.
    pub fn resolve(&self, model: &str) -> Result<Model> {
        let mut map = BTreeMap::new();
        self.parse_into(model, &mut map)?;
        Ok(Model {
            name: model.to_string(),
            map,
        })
    }

    fn parse_into(&self, model_in: &str, map: &mut BTreeMap<String, String>) -> Result<()> {
        let mut model = model_in.trim().to_string();
        let mut key = String::new();
        let pos = loop {
            if let Some(pos) = model.find('(') {
                break pos;
            }
            key = model.to_uppercase();
            model = self
                .models
                .get(&key)
                .cloned()
                .ok_or_else(|| NetlistError::ModelNotFound { model: model_in.to_string() })?;
        };

        let base = model[..pos].trim();
        if base == "_" {
            map.insert(CORE_MODEL.to_string(), key);
        } else if self.models.contains_key(&base.to_uppercase()) {
            self.parse_into(base, map)?;
        } else {
            return Err(NetlistError::ModelNotFound { model: model_in.to_string() });
        }

        let rest = model[pos + 1..].trim();
        let body = rest
            .strip_suffix(')')
            .ok_or_else(|| NetlistError::ModelSyntax { model: model.clone() })?;
        for pair in body.split_whitespace() {
            let (k, v) = pair
                .split_once('=')
                .ok_or_else(|| NetlistError::ModelSyntax { model: model.clone() })?;
            map.insert(k.to_uppercase(), v.to_string());
        }
        Ok(())
    }

    /// Build a logic family from a `FAMILY` model.
    pub fn family(&self, model: &str) -> Result<LogicFamily> {
        let m = self.resolve(model)?;
        let type_str = m.value_str("TYPE")?;
        let family_type = FamilyType::from_str(type_str).ok_or_else(|| NetlistError::UnknownFamily {
            family: type_str.to_string(),
            model: model.to_string(),
        })?;
        Ok(LogicFamily {
            family_type,
            fixed_v: m.value("FV")?,
            low_thresh_pcnt: m.value("IVL")?,
            high_thresh_pcnt: m.value("IVH")?,
            low_vo: m.value("OVL")?,
            high_vo: m.value("OVH")?,
            r_low: m.value("ORL")?,
            r_high: m.value("ORH")?,
        })
    }
}

/// A resolved model.
#[derive(Debug, Clone)]
pub struct Model {
    name: String,
    map: BTreeMap<String, String>,
}

impl Model {
    /// Name of the core model, e.g. `NPN` for `2N3904`.
    pub fn type_name(&self) -> &str {
        self.map.get(CORE_MODEL).map(String::as_str).unwrap_or("")
    }

    pub fn value_str(&self, entity: &str) -> Result<&str> {
        if entity != entity.to_uppercase() {
            return Err(NetlistError::ModelKeyNotUppercase {
                entity: entity.to_string(),
                model: self.to_string(),
            });
        }
        self.map
            .get(entity)
            .map(String::as_str)
            .ok_or_else(|| NetlistError::ModelEntityNotFound {
                entity: entity.to_string(),
                model: self.to_string(),
            })
    }

    /// Numeric value with an optional scale suffix.
    pub fn value(&self, entity: &str) -> Result<f64> {
        let text = self.value_str(entity)?;
        parse_model_number(text).ok_or_else(|| NetlistError::ModelNumber {
            entity: entity.to_string(),
            value: text.to_string(),
            model: self.name.clone(),
        })
    }
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(", self.type_name())?;
        for (k, v) in &self.map {
            if k != CORE_MODEL {
                write!(f, "{}={} ", k, v)?;
            }
        }
        write!(f, ")")
    }
}

/// Model values only know single character suffixes, `M` is mega.
fn parse_model_number(text: &str) -> Option<f64> {
    let last = text.chars().last()?;
    let factor = match last {
        'M' => 1e6,
        'k' | 'K' => 1e3,
        'm' => 1e-3,
        'u' => 1e-6,
        'n' => 1e-9,
        'p' => 1e-12,
        'f' => 1e-15,
        'a' => 1e-18,
        _ => return text.parse().ok(),
    };
    text[..text.len() - 1].parse::<f64>().ok().map(|v| v * factor)
}
