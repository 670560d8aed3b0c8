//! Lexer (tokenizer) for the netlist language.

use crate::error::{NetlistError, Result};

/// A token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The kind of token
    pub kind: TokenKind,
    /// The token's text. Strings come without quotes, parameter
    /// references without `$(` and `)`.
    pub text: String,
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
}

/// Token types in the netlist language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A name: statement, device, terminal or model
    Identifier,
    /// A number, possibly with a scale suffix
    Number,
    /// A double quoted string
    String,
    /// `$(NAME)` reference to a `DEFPARAM`
    ParamRef,
    OpenParen,
    CloseParen,
    Comma,
    /// End of file
    Eof,
}

/// Lexer for tokenizing netlist input.
pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || matches!(ch, '_' | '.' | ':' | '@')
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given input.
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    /// Tokenize the whole input. The last token is always `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if done {
                return Ok(tokens);
            }
        }
    }

    /// Get the next token.
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace_and_comments()?;

        let line = self.line;
        let column = self.column;
        let make = |kind, text: String| Token {
            kind,
            text,
            line,
            column,
        };

        let Some(&ch) = self.chars.peek() else {
            return Ok(make(TokenKind::Eof, String::new()));
        };

        let token = match ch {
            '(' => {
                self.advance();
                make(TokenKind::OpenParen, "(".to_string())
            }
            ')' => {
                self.advance();
                make(TokenKind::CloseParen, ")".to_string())
            }
            ',' => {
                self.advance();
                make(TokenKind::Comma, ",".to_string())
            }
            '"' => {
                self.advance();
                let text = self.read_string(line, column)?;
                make(TokenKind::String, text)
            }
            '$' => {
                self.advance();
                if self.advance() != Some('(') {
                    return Err(NetlistError::lexer(line, column, "expected '(' after '$'"));
                }
                let name = self.read_word();
                if self.advance() != Some(')') {
                    return Err(NetlistError::lexer(line, column, "unterminated parameter reference"));
                }
                make(TokenKind::ParamRef, name)
            }
            '-' | '+' => {
                let text = self.read_word();
                if parse_number(&text).is_none() {
                    return Err(NetlistError::lexer(line, column, format!("invalid number '{}'", text)));
                }
                make(TokenKind::Number, text)
            }
            _ if is_word_char(ch) => {
                let text = self.read_word();
                if parse_number(&text).is_some() {
                    make(TokenKind::Number, text)
                } else {
                    make(TokenKind::Identifier, text)
                }
            }
            _ => {
                return Err(NetlistError::lexer(line, column, format!("unexpected character '{}'", ch)));
            }
        };

        Ok(token)
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<()> {
        let mut at_line_start = self.column == 1;
        while let Some(&ch) = self.chars.peek() {
            if ch.is_whitespace() {
                if ch == '\n' {
                    at_line_start = true;
                }
                self.advance();
            } else if ch == '#' && at_line_start {
                // preprocessor lines of netlists embedded in C sources
                self.skip_line();
            } else if ch == '/' {
                let line = self.line;
                let column = self.column;
                self.advance();
                match self.chars.peek() {
                    Some('/') => self.skip_line(),
                    Some('*') => {
                        self.advance();
                        let mut star = false;
                        loop {
                            match self.advance() {
                                Some('/') if star => break,
                                Some(c) => star = c == '*',
                                None => return Err(NetlistError::lexer(line, column, "unterminated comment")),
                            }
                        }
                    }
                    _ => return Err(NetlistError::lexer(line, column, "unexpected character '/'")),
                }
            } else {
                break;
            }
        }
        Ok(())
    }

    fn skip_line(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn read_string(&mut self, line: usize, column: usize) -> Result<String> {
        let mut text = String::new();
        loop {
            match self.advance() {
                Some('"') => return Ok(text),
                Some('\\') => {
                    if let Some(c) = self.advance() {
                        text.push(c);
                    }
                }
                Some('\n') | None => return Err(NetlistError::lexer(line, column, "unterminated string")),
                Some(c) => text.push(c),
            }
        }
    }

    /// Read a name or number. A sign is taken at the start and after an
    /// exponent marker.
    fn read_word(&mut self) -> String {
        let mut text = String::new();
        while let Some(&ch) = self.chars.peek() {
            let sign_ok = text.is_empty() || (text.ends_with(['e', 'E']) && starts_numeric(&text));
            if is_word_char(ch) || (matches!(ch, '-' | '+') && sign_ok) {
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        text
    }
}

fn starts_numeric(text: &str) -> bool {
    let body = text.strip_prefix(['-', '+']).unwrap_or(text);
    body.starts_with(|c: char| c.is_ascii_digit() || c == '.')
}

/// Parse a number with an optional scale suffix (`G`, `M` or `Meg`, `k`,
/// `m`, `u`, `n`, `p`, `f`, `a`).
pub fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();
    if !starts_numeric(text) {
        return None;
    }
    let (num, factor) = if let Some(n) = text.strip_suffix("Meg").or_else(|| text.strip_suffix("MEG")) {
        (n, 1e6)
    } else {
        let factor = match text.chars().last()? {
            'G' => 1e9,
            'M' => 1e6,
            'k' | 'K' => 1e3,
            'm' => 1e-3,
            'u' => 1e-6,
            'n' => 1e-9,
            'p' => 1e-12,
            'f' => 1e-15,
            'a' => 1e-18,
            _ => 1.0,
        };
        if factor == 1.0 {
            (text, factor)
        } else {
            (&text[..text.len() - 1], factor)
        }
    };
    num.parse::<f64>().ok().map(|v| v * factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_parse_number() {
        assert_relative_eq!(parse_number("10k").unwrap(), 10_000.0);
        assert_relative_eq!(parse_number("100n").unwrap(), 100e-9, max_relative = 1e-12);
        assert_relative_eq!(parse_number("4.7u").unwrap(), 4.7e-6, max_relative = 1e-12);
        assert_relative_eq!(parse_number("1M").unwrap(), 1e6);
        assert_relative_eq!(parse_number("1Meg").unwrap(), 1e6);
        assert_relative_eq!(parse_number("2.2").unwrap(), 2.2);
        assert_relative_eq!(parse_number("-1e-9").unwrap(), -1e-9, max_relative = 1e-12);
        assert_eq!(parse_number("1N914"), None);
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("R1"), None);
    }

    #[test]
    fn test_statement() {
        use TokenKind::*;
        assert_eq!(
            kinds("RES(R1, 4.7k)"),
            vec![Identifier, OpenParen, Identifier, Comma, Number, CloseParen, Eof]
        );
        assert_eq!(kinds("NET_C(R1.1, 7400_DIP.3)").len(), 7);
    }

    #[test]
    fn test_comments_strings_and_refs() {
        let input = "#include \"x.h\"\n// line\nPARAM(X, $(R)) /* block\n comment */ NET_MODEL(\"D1 D(IS=1n)\")";
        let tokens = Lexer::new(input).tokenize().unwrap();
        assert_eq!(tokens[0].text, "PARAM");
        assert_eq!(tokens[0].line, 3);
        assert_eq!(tokens[4].kind, TokenKind::ParamRef);
        assert_eq!(tokens[4].text, "R");
        let s = tokens.iter().find(|t| t.kind == TokenKind::String).unwrap();
        assert_eq!(s.text, "D1 D(IS=1n)");
        assert_eq!(s.line, 4);
    }

    #[test]
    fn test_exponent_sign_stays_in_number() {
        let tokens = Lexer::new("CAP(C1, 1e-6)").tokenize().unwrap();
        assert_eq!(tokens[4].kind, TokenKind::Number);
        assert_eq!(tokens[4].text, "1e-6");
    }

    #[test]
    fn test_errors() {
        assert!(Lexer::new("RES(R1, \"open").tokenize().is_err());
        assert!(Lexer::new("/* open").tokenize().is_err());
        assert!(Lexer::new("RES{R1}").tokenize().is_err());
    }
}
