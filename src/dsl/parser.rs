//! Parser for the netlist language.
//!
//! Every statement has the form `KEYWORD(arg, ...)`. A few keywords open
//! blocks (`NETLIST_START`, `TRUTHTABLE_START`), everything else becomes
//! one [`Statement`].

use super::ast::*;
use super::lexer::{parse_number, Lexer, Token, TokenKind};
use crate::components::TruthTableDesc;
use crate::error::{NetlistError, Result};

/// Parser for netlist sources.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

/// Value macros evaluated while parsing, with their scale.
fn unit_macro(name: &str) -> Option<f64> {
    Some(match name {
        "RES_R" => 1.0,
        "RES_K" => 1e3,
        "RES_M" => 1e6,
        "CAP_U" => 1e-6,
        "CAP_N" => 1e-9,
        "CAP_P" => 1e-12,
        "IND_U" => 1e-6,
        "IND_N" => 1e-9,
        "IND_P" => 1e-12,
        _ => return None,
    })
}

impl<'a> Parser<'a> {
    /// Create a new parser with the given lexer.
    pub fn new(mut lexer: Lexer<'a>) -> Result<Self> {
        let current = lexer.next_token()?;
        Ok(Self { lexer, current })
    }

    /// Parse the whole source.
    pub fn parse(&mut self) -> Result<Document> {
        let mut doc = Document::new();
        let mut block: Option<NetlistDef> = None;

        while self.current.kind != TokenKind::Eof {
            let keyword = self.expect(TokenKind::Identifier)?;
            let line = keyword.line;

            match keyword.text.as_str() {
                "NETLIST_START" => {
                    let args = self.parse_args()?;
                    arity(&keyword, &args, 1)?;
                    if let Some(open) = &block {
                        return Err(NetlistError::parse(
                            line,
                            format!("NETLIST_START inside netlist {}", open.name),
                        ));
                    }
                    block = Some(NetlistDef {
                        name: args[0].clone(),
                        statements: Vec::new(),
                    });
                }
                "NETLIST_END" => {
                    let args = self.parse_args()?;
                    arity(&keyword, &args, 0)?;
                    let def = block
                        .take()
                        .ok_or_else(|| NetlistError::parse(line, "NETLIST_END without NETLIST_START"))?;
                    doc.netlists.push(def);
                }
                "TRUTHTABLE_START" => {
                    let desc = self.parse_truth_table(&keyword)?;
                    push(&mut doc, &mut block, Statement::TruthTable(desc));
                }
                _ => {
                    let args = self.parse_args()?;
                    let stmt = statement(&keyword, args)?;
                    push(&mut doc, &mut block, stmt);
                }
            }
        }

        if let Some(open) = block {
            return Err(NetlistError::parse(
                self.current.line,
                format!("netlist {} is missing NETLIST_END", open.name),
            ));
        }
        Ok(doc)
    }

    fn advance(&mut self) -> Result<Token> {
        let next = self.lexer.next_token()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        if self.current.kind == kind {
            self.advance()
        } else {
            Err(NetlistError::parse(
                self.current.line,
                format!("expected {:?}, got {:?} <{}>", kind, self.current.kind, self.current.text),
            ))
        }
    }

    /// `( [arg {, arg}] )`
    fn parse_args(&mut self) -> Result<Vec<String>> {
        self.expect(TokenKind::OpenParen)?;
        let mut args = Vec::new();
        if self.current.kind == TokenKind::CloseParen {
            self.advance()?;
            return Ok(args);
        }
        loop {
            args.push(self.parse_arg()?);
            let tok = self.advance()?;
            match tok.kind {
                TokenKind::Comma => {}
                TokenKind::CloseParen => return Ok(args),
                _ => {
                    return Err(NetlistError::parse(
                        tok.line,
                        format!("expected ',' or ')', got <{}>", tok.text),
                    ))
                }
            }
        }
    }

    fn parse_arg(&mut self) -> Result<String> {
        let tok = self.advance()?;
        match tok.kind {
            TokenKind::Number | TokenKind::String => Ok(tok.text),
            TokenKind::ParamRef => Ok(format!("$({})", tok.text)),
            TokenKind::Identifier => match unit_macro(&tok.text) {
                Some(scale) if self.current.kind == TokenKind::OpenParen => {
                    let args = self.parse_args()?;
                    arity(&tok, &args, 1)?;
                    let v = parse_number(&args[0]).ok_or_else(|| {
                        NetlistError::parse(tok.line, format!("{}: <{}> is not a number", tok.text, args[0]))
                    })?;
                    Ok(format!("{}", v * scale))
                }
                _ => Ok(tok.text),
            },
            _ => Err(NetlistError::parse(
                tok.line,
                format!("unexpected <{}> in argument list", tok.text),
            )),
        }
    }

    /// `TRUTHTABLE_START(name, inputs, outputs[, params])` followed by
    /// `TT_HEAD`, `TT_LINE`, `TT_FAMILY` and `TRUTHTABLE_END()`.
    fn parse_truth_table(&mut self, start: &Token) -> Result<TruthTableDesc> {
        let args = self.parse_args()?;
        if !(3..=4).contains(&args.len()) {
            return Err(NetlistError::parse(
                start.line,
                format!("TRUTHTABLE_START expects 3 or 4 arguments, found {}", args.len()),
            ));
        }
        let count = |s: &str| {
            parse_number(s)
                .filter(|v| *v >= 0.0 && v.fract() == 0.0)
                .map(|v| v as usize)
                .ok_or_else(|| NetlistError::parse(start.line, format!("<{}> is not a pin count", s)))
        };
        let mut desc = TruthTableDesc {
            name: args[0].clone(),
            num_inputs: count(&args[1])?,
            num_outputs: count(&args[2])?,
            def_params: args.get(3).cloned().unwrap_or_default(),
            family: "74XX".to_string(),
            ..Default::default()
        };

        loop {
            let kw = self.expect(TokenKind::Identifier)?;
            let args = self.parse_args()?;
            match kw.text.as_str() {
                "TT_HEAD" => {
                    arity(&kw, &args, 1)?;
                    desc.head = args[0].clone();
                }
                "TT_LINE" => {
                    arity(&kw, &args, 1)?;
                    desc.lines.push(args[0].clone());
                }
                "TT_FAMILY" => {
                    arity(&kw, &args, 1)?;
                    desc.family = args[0].clone();
                }
                "TRUTHTABLE_END" => {
                    arity(&kw, &args, 0)?;
                    return Ok(desc);
                }
                other => {
                    return Err(NetlistError::parse(
                        kw.line,
                        format!("{} not allowed in truth table {}", other, desc.name),
                    ))
                }
            }
        }
    }
}

fn push(doc: &mut Document, block: &mut Option<NetlistDef>, stmt: Statement) {
    match block {
        Some(def) => def.statements.push(stmt),
        None => doc.top_level.push(stmt),
    }
}

fn arity(keyword: &Token, args: &[String], n: usize) -> Result<()> {
    if args.len() != n {
        return Err(NetlistError::parse(
            keyword.line,
            format!("{} expects {} arguments, found {}", keyword.text, n, args.len()),
        ));
    }
    Ok(())
}

/// Turn a keyword and its arguments into a statement.
fn statement(keyword: &Token, mut args: Vec<String>) -> Result<Statement> {
    let line = keyword.line;
    let take2 = |mut args: Vec<String>| {
        let b = args.pop().unwrap_or_default();
        let a = args.pop().unwrap_or_default();
        (a, b)
    };

    let stmt = match keyword.text.as_str() {
        "NET_C" => Statement::NetC(args),
        "DIPPINS" => Statement::DipPins(args),
        "ALIAS" => {
            arity(keyword, &args, 2)?;
            let (alias, target) = take2(args);
            Statement::Alias { alias, target }
        }
        "PARAM" => {
            arity(keyword, &args, 2)?;
            let (name, value) = take2(args);
            Statement::Param { name, value }
        }
        "DEFPARAM" => {
            arity(keyword, &args, 2)?;
            let (name, value) = take2(args);
            Statement::DefParam { name, value }
        }
        "HINT" => {
            arity(keyword, &args, 2)?;
            let (device, hint) = take2(args);
            Statement::Hint { device, hint }
        }
        "SUBMODEL" => {
            arity(keyword, &args, 2)?;
            let (source, name) = take2(args);
            Statement::Submodel { source, name }
        }
        "NET_MODEL" => {
            arity(keyword, &args, 1)?;
            Statement::NetModel(args.remove(0))
        }
        "INCLUDE" => {
            arity(keyword, &args, 1)?;
            Statement::Include(args.remove(0))
        }
        "LOCAL_SOURCE" => {
            arity(keyword, &args, 1)?;
            Statement::LocalSource(args.remove(0))
        }
        "LOCAL_LIB_ENTRY" => {
            if args.is_empty() || args.len() > 2 {
                return Err(NetlistError::parse(line, "LOCAL_LIB_ENTRY expects 1 or 2 arguments"));
            }
            let params = if args.len() == 2 { args.remove(1) } else { String::new() };
            Statement::LocalLibEntry {
                name: args.remove(0),
                params,
            }
        }
        "FRONTIER" => {
            arity(keyword, &args, 3)?;
            let rout = args.remove(2);
            let rin = args.remove(1);
            Statement::Frontier {
                attach: args.remove(0),
                rin,
                rout,
            }
        }
        "NET_REGISTER_DEV" => {
            arity(keyword, &args, 2)?;
            let (type_name, name) = take2(args);
            Statement::Device {
                type_name,
                name,
                args: Vec::new(),
                line,
            }
        }
        "TT_HEAD" | "TT_LINE" | "TT_FAMILY" | "TRUTHTABLE_END" => {
            return Err(NetlistError::parse(
                line,
                format!("{} outside of TRUTHTABLE_START", keyword.text),
            ));
        }
        _ => {
            if args.is_empty() {
                return Err(NetlistError::parse(
                    line,
                    format!("{}: expected a device name", keyword.text),
                ));
            }
            let name = args.remove(0);
            Statement::Device {
                type_name: keyword.text.clone(),
                name,
                args,
                line,
            }
        }
    };
    Ok(stmt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::parse;

    #[test]
    fn test_parse_devices_and_connections() {
        let doc = parse(
            r#"
            // RC low pass
            SOLVER(Solver, 48000)
            ANALOG_INPUT(V5, 5)
            RES(R1, RES_K(4.7))
            CAP(C1, CAP_U(1))
            NET_C(V5, R1.1)
            NET_C(R1.2, C1.1)
            NET_C(C1.2, GND)
            "#,
        )
        .unwrap();
        assert!(doc.netlists.is_empty());
        assert_eq!(doc.top_level.len(), 7);
        assert_eq!(
            doc.top_level[2],
            Statement::Device {
                type_name: "RES".into(),
                name: "R1".into(),
                args: vec!["4700".into()],
                line: 5,
            }
        );
        match &doc.top_level[3] {
            Statement::Device { args, .. } => {
                assert_eq!(parse_number(&args[0]), Some(1e-6));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(doc.top_level[5], Statement::NetC(vec!["R1.2".into(), "C1.1".into()]));
    }

    #[test]
    fn test_blocks() {
        let doc = parse(
            r#"
            NETLIST_START(sub)
                RES(R, 1k)
                ALIAS(A, R.1)
            NETLIST_END()

            NETLIST_START(main)
                SOLVER(Solver, 48000)
                SUBMODEL(sub, X1)
                PARAM(X1.R.R, $(RVAL))
                NET_MODEL("MYD D(IS=1e-15)")
            NETLIST_END()
            "#,
        )
        .unwrap();
        assert_eq!(doc.netlists.len(), 2);
        assert_eq!(doc.find("sub").unwrap().statements.len(), 2);
        let main = doc.main().unwrap();
        assert_eq!(main.name, "main");
        assert_eq!(
            main.statements[1],
            Statement::Submodel {
                source: "sub".into(),
                name: "X1".into()
            }
        );
        assert_eq!(
            main.statements[2],
            Statement::Param {
                name: "X1.R.R".into(),
                value: "$(RVAL)".into()
            }
        );
        assert_eq!(main.statements[3], Statement::NetModel("MYD D(IS=1e-15)".into()));
    }

    #[test]
    fn test_truth_table_block() {
        let doc = parse(
            r#"
            TRUTHTABLE_START(NAND2, 2, 1, "+A,+B")
                TT_HEAD("A,B|Q ")
                TT_LINE("0,X|1|22")
                TT_LINE("X,0|1|22")
                TT_LINE("1,1|0|15")
                TT_FAMILY("74XX")
            TRUTHTABLE_END()
            "#,
        )
        .unwrap();
        let Statement::TruthTable(desc) = &doc.top_level[0] else {
            panic!("expected a truth table");
        };
        assert_eq!(desc.name, "NAND2");
        assert_eq!(desc.num_inputs, 2);
        assert_eq!(desc.def_params, "+A,+B");
        assert_eq!(desc.lines.len(), 3);
        assert!(desc.compile().is_ok());
    }

    #[test]
    fn test_errors() {
        assert!(parse("RES(R1, 1k").is_err());
        assert!(parse("RES()").is_err());
        assert!(parse("ALIAS(A)").is_err());
        assert!(parse("NETLIST_START(a)\nRES(R1, 1k)").is_err());
        assert!(parse("NETLIST_END()").is_err());
        assert!(parse("TT_LINE(\"0|1|1\")").is_err());
        assert!(parse("RES(R1, RES_K(abc))").is_err());
        assert!(matches!(parse("RES R1"), Err(NetlistError::ParseError { line: 1, .. })));
    }
}
