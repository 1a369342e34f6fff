//! Lexer for Ada 83 source text
//!
//! Produces a token vector the parser indexes with one-token lookahead
//! (plus a saved position for its single backtrack point). Ada-specific
//! scanning handled here:
//!
//! - the tick is disambiguated between attribute operator and character
//!   literal from the previous token kind
//! - based literals `base#digits#` with optional exponent, base 2..16
//! - `""` inside string literals, `%` as an alternate string delimiter
//! - a post-scan pass fuses `and then`, `or else` and `not in` into
//!   single tokens
//!
//! Lexical errors are fatal: scanning stops at the first malformed token
//! and the error is returned already formatted with its source location.

use crate::bigint::BigInt;
use crate::diagnostics::{Diagnostics, Loc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Literals and identifiers
    Ident,
    IntLit,
    RealLit,
    CharLit,
    StrLit,
    // Delimiters
    LParen,
    RParen,
    Comma,
    Semi,
    Colon,
    Dot,
    DotDot,
    Tick,
    Amp,
    Bar,
    Arrow,
    Assign,
    Box,
    LtLt,
    GtGt,
    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    StarStar,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    // Reserved words
    Abort,
    Abs,
    Accept,
    Access,
    All,
    And,
    AndThen,
    Array,
    At,
    Begin,
    Body,
    Case,
    Constant,
    Declare,
    Delay,
    Delta,
    Digits,
    Do,
    Else,
    Elsif,
    End,
    Entry,
    Exception,
    Exit,
    For,
    Function,
    Generic,
    Goto,
    If,
    In,
    NotIn,
    Is,
    Limited,
    Loop,
    Mod,
    New,
    Not,
    Null,
    Of,
    Or,
    OrElse,
    Others,
    Out,
    Package,
    Pragma,
    Private,
    Procedure,
    Raise,
    Range,
    Record,
    Rem,
    Renames,
    Return,
    Reverse,
    Select,
    Separate,
    Subtype,
    Task,
    Terminate,
    Then,
    Type,
    Use,
    When,
    While,
    With,
    Xor,
    Eof,
    Err,
}

/// A scanned token. Numeric literals carry both an `i64` evaluation and,
/// for integers, the exact big-integer value.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub loc: Loc,
    pub text: String,
    pub int_value: i64,
    pub big_value: Option<BigInt>,
    pub real_value: f64,
    pub char_value: char,
}

impl Token {
    fn new(kind: TokenKind, loc: Loc, text: String) -> Self {
        Token {
            kind,
            loc,
            text,
            int_value: 0,
            big_value: None,
            real_value: 0.0,
            char_value: '\0',
        }
    }
}

fn keyword_kind(lower: &str) -> Option<TokenKind> {
    use TokenKind::*;
    Some(match lower {
        "abort" => Abort,
        "abs" => Abs,
        "accept" => Accept,
        "access" => Access,
        "all" => All,
        "and" => And,
        "array" => Array,
        "at" => At,
        "begin" => Begin,
        "body" => Body,
        "case" => Case,
        "constant" => Constant,
        "declare" => Declare,
        "delay" => Delay,
        "delta" => Delta,
        "digits" => Digits,
        "do" => Do,
        "else" => Else,
        "elsif" => Elsif,
        "end" => End,
        "entry" => Entry,
        "exception" => Exception,
        "exit" => Exit,
        "for" => For,
        "function" => Function,
        "generic" => Generic,
        "goto" => Goto,
        "if" => If,
        "in" => In,
        "is" => Is,
        "limited" => Limited,
        "loop" => Loop,
        "mod" => Mod,
        "new" => New,
        "not" => Not,
        "null" => Null,
        "of" => Of,
        "or" => Or,
        "others" => Others,
        "out" => Out,
        "package" => Package,
        "pragma" => Pragma,
        "private" => Private,
        "procedure" => Procedure,
        "raise" => Raise,
        "range" => Range,
        "record" => Record,
        "rem" => Rem,
        "renames" => Renames,
        "return" => Return,
        "reverse" => Reverse,
        "select" => Select,
        "separate" => Separate,
        "subtype" => Subtype,
        "task" => Task,
        "terminate" => Terminate,
        "then" => Then,
        "type" => Type,
        "use" => Use,
        "when" => When,
        "while" => While,
        "with" => With,
        "xor" => Xor,
        _ => return None,
    })
}

pub struct Lexer<'a> {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    file: u32,
    /// Kind of the previously emitted token, for tick disambiguation.
    prev_kind: TokenKind,
    diags: &'a Diagnostics,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &str, file: u32, diags: &'a Diagnostics) -> Self {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            file,
            prev_kind: TokenKind::Eof,
            diags,
        }
    }

    fn loc(&self) -> Loc {
        Loc::new(self.file, self.line, self.column)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, off: usize) -> Option<char> {
        self.chars.get(self.pos + off).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('-') if self.peek_at(1) == Some('-') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    /// True when a tick after the previous token opens an attribute
    /// reference rather than a character literal.
    fn tick_is_attribute(&self) -> bool {
        matches!(
            self.prev_kind,
            TokenKind::Ident
                | TokenKind::RParen
                | TokenKind::All
                | TokenKind::StrLit
                | TokenKind::CharLit
        )
    }

    fn scan_identifier(&mut self, start: Loc) -> Result<Token, String> {
        let mut text = String::new();
        let mut prev_underscore = false;
        let mut malformed = false;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                if c == '_' {
                    if prev_underscore {
                        malformed = true;
                    }
                    prev_underscore = true;
                } else {
                    prev_underscore = false;
                }
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if malformed || text.ends_with('_') {
            return Err(self
                .diags
                .fatal(start, &format!("malformed identifier '{}'", text)));
        }
        let lower = text.to_ascii_lowercase();
        let kind = keyword_kind(&lower).unwrap_or(TokenKind::Ident);
        Ok(Token::new(kind, start, text))
    }

    fn scan_digits(&mut self, base: u32, into: &mut String) {
        while let Some(c) = self.peek() {
            if c == '_' {
                self.bump();
                continue;
            }
            if c.is_digit(base) {
                into.push(c);
                self.bump();
            } else {
                break;
            }
        }
    }

    fn scan_exponent(&mut self) -> Result<(bool, u32), String> {
        // Caller has seen 'e' or 'E'.
        let start = self.loc();
        self.bump();
        let mut neg = false;
        if self.peek() == Some('+') {
            self.bump();
        } else if self.peek() == Some('-') {
            neg = true;
            self.bump();
        }
        let mut digits = String::new();
        self.scan_digits(10, &mut digits);
        if digits.is_empty() {
            return Err(self.diags.fatal(start, "missing exponent digits"));
        }
        let exp: u32 = digits
            .parse()
            .map_err(|_| self.diags.fatal(start, "exponent too large"))?;
        Ok((neg, exp))
    }

    fn scan_number(&mut self, start: Loc) -> Result<Token, String> {
        let mut digits = String::new();
        self.scan_digits(10, &mut digits);

        // Based literal: base#digits[.digits]#[exponent]
        if self.peek() == Some('#') {
            let base: u32 = digits
                .parse()
                .map_err(|_| self.diags.fatal(start, "invalid base"))?;
            if !(2..=16).contains(&base) {
                return Err(self
                    .diags
                    .fatal(start, &format!("base {} not in 2..16", base)));
            }
            self.bump();
            let mut mantissa = String::new();
            self.scan_digits(base, &mut mantissa);
            if mantissa.is_empty() {
                return Err(self.diags.fatal(start, "missing based digits"));
            }
            let mut frac = String::new();
            if self.peek() == Some('.') {
                self.bump();
                self.scan_digits(base, &mut frac);
            }
            if self.peek() != Some('#') {
                return Err(self.diags.fatal(start, "unterminated based literal"));
            }
            self.bump();
            let mut exp = (false, 0u32);
            if matches!(self.peek(), Some('e') | Some('E')) {
                exp = self.scan_exponent()?;
            }
            return self.make_based(start, base, &mantissa, &frac, exp);
        }

        // Real literal: digits '.' digits, with the '..' of a range left
        // alone.
        if self.peek() == Some('.') && self.peek_at(1).map(|c| c.is_ascii_digit()).unwrap_or(false)
        {
            self.bump();
            let mut frac = String::new();
            self.scan_digits(10, &mut frac);
            let mut text = format!("{}.{}", digits, frac);
            if matches!(self.peek(), Some('e') | Some('E')) {
                let (neg, exp) = self.scan_exponent()?;
                text.push('e');
                if neg {
                    text.push('-');
                }
                text.push_str(&exp.to_string());
            }
            let value: f64 = text
                .parse()
                .map_err(|_| self.diags.fatal(start, "invalid real literal"))?;
            let mut tok = Token::new(TokenKind::RealLit, start, text);
            tok.real_value = value;
            if value.is_infinite() {
                eprintln!(
                    "{}",
                    self.diags
                        .format(start, "warning: real literal overflows to infinity")
                );
            }
            return Ok(tok);
        }

        // Integer, possibly with a non-negative exponent: 1E6.
        let mut big = BigInt::from_decimal_str(&digits)
            .ok_or_else(|| self.diags.fatal(start, "invalid numeric literal"))?;
        if matches!(self.peek(), Some('e') | Some('E')) {
            let (neg, exp) = self.scan_exponent()?;
            if neg {
                return Err(self
                    .diags
                    .fatal(start, "negative exponent in integer literal"));
            }
            for _ in 0..exp {
                big.mul_add_small(10, 0);
            }
        }
        let mut tok = Token::new(TokenKind::IntLit, start, digits);
        tok.int_value = big.to_i64().unwrap_or(i64::MAX);
        tok.big_value = Some(big);
        Ok(tok)
    }

    fn make_based(
        &self,
        start: Loc,
        base: u32,
        mantissa: &str,
        frac: &str,
        exp: (bool, u32),
    ) -> Result<Token, String> {
        let (exp_neg, exp_val) = exp;
        if frac.is_empty() && !exp_neg {
            let mut big = BigInt::zero();
            for c in mantissa.chars() {
                let d = c
                    .to_digit(base)
                    .ok_or_else(|| self.diags.fatal(start, "digit out of base"))?;
                big.mul_add_small(base as u64, d as u64);
            }
            for _ in 0..exp_val {
                big.mul_add_small(base as u64, 0);
            }
            let mut tok = Token::new(
                TokenKind::IntLit,
                start,
                format!("{}#{}#", base, mantissa),
            );
            tok.int_value = big.to_i64().unwrap_or(i64::MAX);
            tok.big_value = Some(big);
            return Ok(tok);
        }
        // Based real: evaluated in floating point.
        let mut value = 0.0f64;
        for c in mantissa.chars() {
            let d = c
                .to_digit(base)
                .ok_or_else(|| self.diags.fatal(start, "digit out of base"))?;
            value = value * base as f64 + d as f64;
        }
        let mut scale = 1.0f64;
        for c in frac.chars() {
            let d = c
                .to_digit(base)
                .ok_or_else(|| self.diags.fatal(start, "digit out of base"))?;
            scale /= base as f64;
            value += d as f64 * scale;
        }
        let factor = (base as f64).powi(exp_val as i32);
        value = if exp_neg { value / factor } else { value * factor };
        let mut tok = Token::new(
            TokenKind::RealLit,
            start,
            format!("{}#{}.{}#", base, mantissa, frac),
        );
        tok.real_value = value;
        Ok(tok)
    }

    fn scan_string(&mut self, start: Loc, delim: char) -> Result<Token, String> {
        self.bump();
        let mut text = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    return Err(self.diags.fatal(start, "unterminated string literal"));
                }
                Some(c) if c == delim => {
                    self.bump();
                    // Doubled delimiter is an escaped delimiter character.
                    if self.peek() == Some(delim) {
                        self.bump();
                        text.push(delim);
                    } else {
                        break;
                    }
                }
                Some(c) => {
                    text.push(c);
                    self.bump();
                }
            }
        }
        Ok(Token::new(TokenKind::StrLit, start, text))
    }

    fn scan_tick(&mut self, start: Loc) -> Result<Token, String> {
        if self.tick_is_attribute() {
            self.bump();
            return Ok(Token::new(TokenKind::Tick, start, "'".to_string()));
        }
        // Character literal iff the second character past the tick is a
        // closing tick; otherwise this is the attribute operator (e.g. the
        // tick of a qualified expression T'(...)).
        if self.peek_at(2) == Some('\'') {
            if let Some(c) = self.peek_at(1) {
                self.bump();
                self.bump();
                self.bump();
                let mut tok = Token::new(TokenKind::CharLit, start, c.to_string());
                tok.char_value = c;
                tok.int_value = c as i64;
                return Ok(tok);
            }
        }
        self.bump();
        Ok(Token::new(TokenKind::Tick, start, "'".to_string()))
    }

    fn scan_punct(&mut self, start: Loc) -> Result<Token, String> {
        use TokenKind::*;
        let c = self.bump().expect("scan_punct at end of input");
        let tok = |kind, text: &str| Token::new(kind, start, text.to_string());
        let out = match c {
            '(' => tok(LParen, "("),
            ')' => tok(RParen, ")"),
            ',' => tok(Comma, ","),
            ';' => tok(Semi, ";"),
            '&' => tok(Amp, "&"),
            '|' | '!' => tok(Bar, "|"),
            '+' => tok(Plus, "+"),
            '-' => tok(Minus, "-"),
            ':' => {
                if self.peek() == Some('=') {
                    self.bump();
                    tok(Assign, ":=")
                } else {
                    tok(Colon, ":")
                }
            }
            '.' => {
                if self.peek() == Some('.') {
                    self.bump();
                    tok(DotDot, "..")
                } else {
                    tok(Dot, ".")
                }
            }
            '*' => {
                if self.peek() == Some('*') {
                    self.bump();
                    tok(StarStar, "**")
                } else {
                    tok(Star, "*")
                }
            }
            '/' => {
                if self.peek() == Some('=') {
                    self.bump();
                    tok(Neq, "/=")
                } else {
                    tok(Slash, "/")
                }
            }
            '=' => {
                if self.peek() == Some('>') {
                    self.bump();
                    tok(Arrow, "=>")
                } else {
                    tok(Eq, "=")
                }
            }
            '<' => match self.peek() {
                Some('=') => {
                    self.bump();
                    tok(Le, "<=")
                }
                Some('<') => {
                    self.bump();
                    tok(LtLt, "<<")
                }
                Some('>') => {
                    self.bump();
                    tok(Box, "<>")
                }
                _ => tok(Lt, "<"),
            },
            '>' => match self.peek() {
                Some('=') => {
                    self.bump();
                    tok(Ge, ">=")
                }
                Some('>') => {
                    self.bump();
                    tok(GtGt, ">>")
                }
                _ => tok(Gt, ">"),
            },
            other => {
                return Result::Err(self
                    .diags
                    .fatal(start, &format!("unexpected character '{}'", other)));
            }
        };
        Ok(out)
    }

    fn next_token(&mut self) -> Result<Token, String> {
        self.skip_trivia();
        let start = self.loc();
        let tok = match self.peek() {
            None => Token::new(TokenKind::Eof, start, String::new()),
            Some(c) if c.is_alphabetic() => self.scan_identifier(start)?,
            Some(c) if c.is_ascii_digit() => self.scan_number(start)?,
            Some('"') => self.scan_string(start, '"')?,
            Some('%') => self.scan_string(start, '%')?,
            Some('\'') => self.scan_tick(start)?,
            Some(_) => self.scan_punct(start)?,
        };
        self.prev_kind = tok.kind;
        Ok(tok)
    }
}

/// Fuse `and then`, `or else` and `not in` into single tokens.
fn fuse_compound_keywords(tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        let fused = match (tokens[i].kind, tokens.get(i + 1).map(|t| t.kind)) {
            (TokenKind::And, Some(TokenKind::Then)) => Some((TokenKind::AndThen, "and then")),
            (TokenKind::Or, Some(TokenKind::Else)) => Some((TokenKind::OrElse, "or else")),
            (TokenKind::Not, Some(TokenKind::In)) => Some((TokenKind::NotIn, "not in")),
            _ => None,
        };
        if let Some((kind, text)) = fused {
            let mut tok = tokens[i].clone();
            tok.kind = kind;
            tok.text = text.to_string();
            out.push(tok);
            i += 2;
        } else {
            out.push(tokens[i].clone());
            i += 1;
        }
    }
    out
}

/// Scan a whole source text into a token vector ending in `Eof`.
pub fn tokenize(source: &str, file: u32, diags: &Diagnostics) -> Result<Vec<Token>, String> {
    let mut lexer = Lexer::new(source, file, diags);
    let mut tokens = Vec::new();
    loop {
        let tok = lexer.next_token()?;
        let done = tok.kind == TokenKind::Eof;
        tokens.push(tok);
        if done {
            break;
        }
    }
    Ok(fuse_compound_keywords(tokens))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let diags = Diagnostics::new();
        tokenize(source, 0, &diags)
            .unwrap()
            .iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_keywords_case_insensitive() {
        use TokenKind::*;
        assert_eq!(
            kinds("Procedure BEGIN end;"),
            vec![Procedure, Begin, End, Semi, Eof]
        );
    }

    #[test]
    fn test_compound_fusion() {
        use TokenKind::*;
        assert_eq!(
            kinds("a and then b or else c not in d"),
            vec![Ident, AndThen, Ident, OrElse, Ident, NotIn, Ident, Eof]
        );
        // Bare `and` survives fusion.
        assert_eq!(kinds("a and b"), vec![Ident, And, Ident, Eof]);
    }

    #[test]
    fn test_based_literal() {
        let diags = Diagnostics::new();
        let toks = tokenize("16#FF# 2#1010#E3", 0, &diags).unwrap();
        assert_eq!(toks[0].kind, TokenKind::IntLit);
        assert_eq!(toks[0].int_value, 255);
        assert_eq!(toks[1].kind, TokenKind::IntLit);
        assert_eq!(toks[1].int_value, 80);
    }

    #[test]
    fn test_based_literal_bad_base() {
        let diags = Diagnostics::new();
        assert!(tokenize("1#0#", 0, &diags).is_err());
        assert!(tokenize("17#0#", 0, &diags).is_err());
    }

    #[test]
    fn test_underscores_in_numbers() {
        let diags = Diagnostics::new();
        let toks = tokenize("1_000_000", 0, &diags).unwrap();
        assert_eq!(toks[0].int_value, 1_000_000);
    }

    #[test]
    fn test_real_literals() {
        let diags = Diagnostics::new();
        let toks = tokenize("3.14 1.0E2", 0, &diags).unwrap();
        assert_eq!(toks[0].kind, TokenKind::RealLit);
        assert!((toks[0].real_value - 3.14).abs() < 1e-12);
        assert!((toks[1].real_value - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_big_integer_literal() {
        let diags = Diagnostics::new();
        let toks = tokenize("9223372036854775808", 0, &diags).unwrap();
        assert_eq!(toks[0].kind, TokenKind::IntLit);
        assert!(toks[0].big_value.as_ref().unwrap().to_i64().is_none());
    }

    #[test]
    fn test_tick_attribute_vs_char_literal() {
        use TokenKind::*;
        // After an identifier the tick is an attribute operator.
        assert_eq!(kinds("X'First"), vec![Ident, Tick, Ident, Eof]);
        // After := the tick opens a character literal.
        assert_eq!(kinds("C := 'a';"), vec![Ident, Assign, CharLit, Semi, Eof]);
        // Qualified expression keeps the tick.
        assert_eq!(
            kinds("Character'('a')"),
            vec![Ident, Tick, LParen, CharLit, RParen, Eof]
        );
    }

    #[test]
    fn test_string_escapes_and_alternate_delimiter() {
        let diags = Diagnostics::new();
        let toks = tokenize(r#""he said ""hi""" %alt%"#, 0, &diags).unwrap();
        assert_eq!(toks[0].text, "he said \"hi\"");
        assert_eq!(toks[1].text, "alt");
    }

    #[test]
    fn test_unterminated_string_is_fatal() {
        let diags = Diagnostics::new();
        assert!(tokenize("\"oops", 0, &diags).is_err());
    }

    #[test]
    fn test_comment_skipped() {
        use TokenKind::*;
        assert_eq!(kinds("x -- comment\n y"), vec![Ident, Ident, Eof]);
    }

    #[test]
    fn test_compound_operators() {
        use TokenKind::*;
        assert_eq!(
            kinds(":= => .. << >> <> ** <= >= /="),
            vec![Assign, Arrow, DotDot, LtLt, GtGt, Box, StarStar, Le, Ge, Neq, Eof]
        );
    }

    #[test]
    fn test_relex_token_text_reproduces_kinds() {
        // Lex, join the token texts with spaces, and lex again: the kind
        // sequence must be reproduced.
        let diags = Diagnostics::new();
        let source = "procedure P is X : Integer := 16#FF#; begin X := X + 1; end P;";
        let first = tokenize(source, 0, &diags).unwrap();
        let joined: Vec<String> = first
            .iter()
            .filter(|t| t.kind != TokenKind::Eof)
            .map(|t| match t.kind {
                TokenKind::StrLit => format!("\"{}\"", t.text),
                TokenKind::CharLit => format!("'{}'", t.text),
                _ => t.text.clone(),
            })
            .collect();
        let second = tokenize(&joined.join(" "), 0, &diags).unwrap();
        let k1: Vec<TokenKind> = first.iter().map(|t| t.kind).collect();
        let k2: Vec<TokenKind> = second.iter().map(|t| t.kind).collect();
        assert_eq!(k1, k2);
    }

    #[test]
    fn test_malformed_identifier() {
        let diags = Diagnostics::new();
        assert!(tokenize("bad__name", 0, &diags).is_err());
        assert!(tokenize("trailing_", 0, &diags).is_err());
    }
}
