//! Structured-literal parser for simulator replies.
//!
//! The simulator answers every request with the textual representation of a
//! value: numbers, strings, nested tuples and lists, `None`, `True`/`False`,
//! and the non-finite float spellings (`inf`, `nan`, `float("inf")`,
//! `-float("inf")`).  [`parse`] turns such text into a [`Literal`] tree.  It
//! only recognises literals; nothing in a reply is ever evaluated.
//!
//! Running out of input inside a value is reported as
//! [`LiteralError::Incomplete`], which lets stream framing keep reading until
//! a whole reply has arrived.  Nesting deeper than [`MAX_DEPTH`] is rejected
//! with [`LiteralError::TooDeep`].
//!
//! # Example
//!
//! ```rust
//! use kinobridge_middleware::literal::{parse, Literal};
//!
//! let value = parse("[3, ((1.0, -2.5, float('inf')),)]").unwrap();
//! let items = value.as_seq().unwrap();
//! assert_eq!(items[0], Literal::Int(3));
//! ```

use std::fmt;

use thiserror::Error;

/// A decoded reply value.
///
/// Tuples and lists both decode to [`Literal::Seq`]; the simulator uses them
/// interchangeably.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Seq(Vec<Literal>),
}

impl Literal {
    /// Numeric value of an `Int` or `Float`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Literal::Int(i) => Some(*i as f64),
            Literal::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Non-negative integer value, for counts and indices.
    pub fn as_usize(&self) -> Option<usize> {
        match self {
            Literal::Int(i) => usize::try_from(*i).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Literal]> {
        match self {
            Literal::Seq(items) => Some(items),
            _ => None,
        }
    }
}

/// Renders the value back into the reply grammar.  Sequences are written as
/// lists, so a one-element sequence never needs a trailing comma.
impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::None => f.write_str("None"),
            Literal::Bool(true) => f.write_str("True"),
            Literal::Bool(false) => f.write_str("False"),
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Float(v) => f.write_str(&float_literal(*v)),
            Literal::Str(s) => {
                f.write_str("'")?;
                for c in s.chars() {
                    match c {
                        '\\' => f.write_str("\\\\")?,
                        '\'' => f.write_str("\\'")?,
                        '\n' => f.write_str("\\n")?,
                        '\t' => f.write_str("\\t")?,
                        '\r' => f.write_str("\\r")?,
                        c => write!(f, "{c}")?,
                    }
                }
                f.write_str("'")
            }
            Literal::Seq(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Spell `value` so the simulator's literal decoder reads back the same bits.
///
/// Finite values use the shortest round-trip representation; infinities and
/// NaN use the `float("...")` call form.
pub fn float_literal(value: f64) -> String {
    if value.is_nan() {
        "float(\"nan\")".to_string()
    } else if value == f64::INFINITY {
        "float(\"inf\")".to_string()
    } else if value == f64::NEG_INFINITY {
        "-float(\"inf\")".to_string()
    } else {
        format!("{value:?}")
    }
}

/// Deepest nesting of sequences and signs a reply may use.
///
/// Simulator replies nest four levels at most.
pub const MAX_DEPTH: usize = 64;

/// Why a reply could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LiteralError {
    /// Input ended inside a value.
    #[error("reply ended inside a literal")]
    Incomplete,

    #[error("unexpected '{found}' at byte {offset}")]
    Unexpected { offset: usize, found: String },

    #[error("literal nests deeper than {MAX_DEPTH} levels at byte {offset}")]
    TooDeep { offset: usize },
}

/// Parse one complete literal.  Leading and trailing whitespace is ignored;
/// anything else after the value is an error.
pub fn parse(input: &str) -> Result<Literal, LiteralError> {
    let mut parser = Parser {
        src: input,
        pos: 0,
        depth: 0,
    };
    let value = parser.value()?;
    parser.skip_ws();
    if parser.pos < input.len() {
        return Err(parser.unexpected());
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn unexpected(&self) -> LiteralError {
        self.unexpected_at(self.pos)
    }

    fn unexpected_at(&self, offset: usize) -> LiteralError {
        let found = self.src[offset..]
            .chars()
            .next()
            .map(String::from)
            .unwrap_or_default();
        LiteralError::Unexpected { offset, found }
    }

    fn descend(&mut self, offset: usize) -> Result<(), LiteralError> {
        if self.depth == MAX_DEPTH {
            return Err(LiteralError::TooDeep { offset });
        }
        self.depth += 1;
        Ok(())
    }

    fn value(&mut self) -> Result<Literal, LiteralError> {
        self.skip_ws();
        match self.peek() {
            None => Err(LiteralError::Incomplete),
            Some(b'(') => self.sequence(b')', true),
            Some(b'[') => self.sequence(b']', false),
            Some(b'\'' | b'"') => self.string().map(Literal::Str),
            Some(sign @ (b'-' | b'+')) => {
                let start = self.pos;
                self.descend(start)?;
                self.pos += 1;
                let operand = self.value()?;
                self.depth -= 1;
                match (sign, operand) {
                    (b'+', v @ (Literal::Int(_) | Literal::Float(_))) => Ok(v),
                    (_, Literal::Int(i)) => Ok(i
                        .checked_neg()
                        .map_or(Literal::Float(-(i as f64)), Literal::Int)),
                    (_, Literal::Float(f)) => Ok(Literal::Float(-f)),
                    _ => Err(self.unexpected_at(start)),
                }
            }
            Some(b) if b.is_ascii_digit() || b == b'.' => self.number(),
            Some(b) if b.is_ascii_alphabetic() || b == b'_' => self.word(),
            Some(_) => Err(self.unexpected()),
        }
    }

    fn sequence(&mut self, close: u8, is_tuple: bool) -> Result<Literal, LiteralError> {
        self.descend(self.pos)?;
        self.pos += 1;
        let mut items = Vec::new();
        let mut saw_comma = false;
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Err(LiteralError::Incomplete),
                Some(b) if b == close => {
                    self.pos += 1;
                    break;
                }
                _ => {}
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.peek() {
                None => return Err(LiteralError::Incomplete),
                Some(b',') => {
                    self.pos += 1;
                    saw_comma = true;
                }
                Some(b) if b == close => {
                    self.pos += 1;
                    break;
                }
                Some(_) => return Err(self.unexpected()),
            }
        }
        self.depth -= 1;
        // `(x)` is a parenthesised value, `(x,)` a one-element tuple.
        if is_tuple && items.len() == 1 && !saw_comma {
            return Ok(items.remove(0));
        }
        Ok(Literal::Seq(items))
    }

    fn string(&mut self) -> Result<String, LiteralError> {
        let quote = char::from(self.src.as_bytes()[self.pos]);
        self.pos += 1;
        let mut out = String::new();
        let mut chars = self.src[self.pos..].char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                c if c == quote => {
                    self.pos += i + c.len_utf8();
                    return Ok(out);
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, 'r')) => out.push('\r'),
                    Some((_, '0')) => out.push('\0'),
                    Some((_, other)) => out.push(other),
                    None => return Err(LiteralError::Incomplete),
                },
                c => out.push(c),
            }
        }
        Err(LiteralError::Incomplete)
    }

    fn digits(&mut self) -> usize {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        self.pos - start
    }

    fn number(&mut self) -> Result<Literal, LiteralError> {
        let start = self.pos;
        let mut is_float = false;
        let mut mantissa = self.digits();
        if self.peek() == Some(b'.') {
            is_float = true;
            self.pos += 1;
            mantissa += self.digits();
        }
        if mantissa == 0 {
            return Err(self.unexpected_at(start));
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            is_float = true;
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            if self.digits() == 0 {
                return Err(match self.peek() {
                    None => LiteralError::Incomplete,
                    Some(_) => self.unexpected(),
                });
            }
        }
        let text = &self.src[start..self.pos];
        if !is_float {
            if let Ok(i) = text.parse::<i64>() {
                return Ok(Literal::Int(i));
            }
        }
        text.parse::<f64>()
            .map(Literal::Float)
            .map_err(|_| self.unexpected_at(start))
    }

    fn word(&mut self) -> Result<Literal, LiteralError> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric() || b == b'_') {
            self.pos += 1;
        }
        let word = &self.src[start..self.pos];
        match word {
            "None" => return Ok(Literal::None),
            "True" => return Ok(Literal::Bool(true)),
            "False" => return Ok(Literal::Bool(false)),
            "float" => return self.float_call(),
            _ => {}
        }
        if let Some(v) = non_finite(word) {
            return Ok(Literal::Float(v));
        }
        if self.peek().is_none() && is_keyword_prefix(word) {
            // A keyword cut off by the end of a read.
            return Err(LiteralError::Incomplete);
        }
        Err(self.unexpected_at(start))
    }

    /// `float(<string or number>)`, the spelling used for non-finite values.
    fn float_call(&mut self) -> Result<Literal, LiteralError> {
        self.skip_ws();
        match self.peek() {
            None => return Err(LiteralError::Incomplete),
            Some(b'(') => self.pos += 1,
            Some(_) => return Err(self.unexpected()),
        }
        self.skip_ws();
        let arg_start = self.pos;
        let value = match self.peek() {
            None => return Err(LiteralError::Incomplete),
            Some(b'\'' | b'"') => {
                let text = self.string()?;
                parse_float_text(&text).ok_or_else(|| self.unexpected_at(arg_start))?
            }
            Some(_) => self
                .value()?
                .as_f64()
                .ok_or_else(|| self.unexpected_at(arg_start))?,
        };
        self.skip_ws();
        match self.peek() {
            None => Err(LiteralError::Incomplete),
            Some(b')') => {
                self.pos += 1;
                Ok(Literal::Float(value))
            }
            Some(_) => Err(self.unexpected()),
        }
    }
}

fn non_finite(word: &str) -> Option<f64> {
    match word.to_ascii_lowercase().as_str() {
        "inf" | "infinity" => Some(f64::INFINITY),
        "nan" => Some(f64::NAN),
        _ => None,
    }
}

fn is_keyword_prefix(word: &str) -> bool {
    let lower = word.to_ascii_lowercase();
    ["None", "True", "False", "float"]
        .iter()
        .any(|k| k.starts_with(word))
        || ["inf", "infinity", "nan"]
            .iter()
            .any(|k| k.starts_with(lower.as_str()))
}

fn parse_float_text(text: &str) -> Option<f64> {
    let text = text.trim();
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let magnitude = non_finite(body).or_else(|| body.parse::<f64>().ok())?;
    Some(if negative { -magnitude } else { magnitude })
}
