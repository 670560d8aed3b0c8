//! The netlist description language.
//!
//! Sources are sequences of `KEYWORD(arg, ...)` statements:
//!
//! ```text
//! NETLIST_START(oscillator)
//!     SOLVER(Solver, 48000)
//!     ANALOG_INPUT(V5, 5)
//!     RES(R1, RES_K(1))
//!     DIODE(D1, "1N914")
//!     NET_C(V5, R1.1)
//!     NET_C(R1.2, D1.A)
//!     NET_C(D1.K, GND)
//! NETLIST_END()
//! ```
//!
//! [`parse`] turns text into a [`Document`], [`Setup`] turns documents into
//! a runnable [`Netlist`]. [`load`] does both for the common case.

mod ast;
mod lexer;
mod library;
mod model;
mod parser;
mod setup;

pub use ast::*;
pub use lexer::{parse_number, Lexer, Token, TokenKind};
pub use library::LIBRARY;
pub use model::{Model, ModelStore};
pub use parser::Parser;
pub use setup::Setup;

use crate::error::{NetlistError, Result};
use crate::netlist::Netlist;

/// Parse netlist source text.
pub fn parse(input: &str) -> Result<Document> {
    let lexer = Lexer::new(input);
    let mut parser = Parser::new(lexer)?;
    parser.parse()
}

/// A [`Setup`] holding the netlist `name` of `doc`, ready for further
/// statements or [`Setup::build`].
///
/// Without `name` the top level statements are used or, if there are
/// none, the last block.
pub fn prepare(doc: &Document, name: Option<&str>) -> Result<Setup> {
    let mut setup = Setup::new()?;
    setup.register_document(doc);
    match name {
        Some(name) => setup.include(name)?,
        None => {
            let main = doc
                .main()
                .ok_or_else(|| NetlistError::parse(0, "source contains no netlist"))?;
            setup.add_statements(&main.statements)?;
        }
    }
    Ok(setup)
}

/// Parse `source` and build a netlist from it, see [`prepare`].
pub fn load(source: &str, name: Option<&str>) -> Result<Netlist> {
    prepare(&parse(source)?, name)?.build()
}

/// Read and parse a netlist file.
#[cfg(feature = "cli")]
pub fn parse_file(path: &std::path::Path) -> Result<Document> {
    let content = std::fs::read_to_string(path).map_err(|e| NetlistError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    parse(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_named_block() {
        let src = r#"
            NETLIST_START(a)
                TTL_INPUT(I1, 1)
            NETLIST_END()
            NETLIST_START(b)
                TTL_INPUT(I2, 0)
            NETLIST_END()
        "#;
        let nl = load(src, Some("a")).unwrap();
        assert!(nl.state().find_device("I1").is_some());
        assert!(nl.state().find_device("I2").is_none());

        let nl = load(src, None).unwrap();
        assert!(nl.state().find_device("I2").is_some());
    }

    #[test]
    fn test_load_errors() {
        assert!(matches!(load("", None), Err(NetlistError::ParseError { .. })));
        assert!(matches!(
            load("NETLIST_START(a)\nNETLIST_END()", Some("zz")),
            Err(NetlistError::SourceNotFound { .. })
        ));
    }
}
