//! PDF Object Syntax Parser
//!
//! Parses direct objects from a byte buffer. Used for the bodies of object
//! streams, which the codec hands over as opaque decoded bytes.

use tracing::trace;

use crate::{
    error::{Result, StructureError},
    types::{Dictionary, ObjectId, StringFormat, Value},
};

/// Nesting limit for arrays and dictionaries.
const MAX_DEPTH: usize = 64;

pub struct ObjectParser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> ObjectParser<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    pub fn at(input: &'a [u8], pos: usize) -> Self {
        Self { input, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Parses the next value.
    pub fn parse_value(&mut self) -> Result<Value> {
        self.value(0)
    }

    /// Parses an unsigned integer token, as used in object stream headers.
    pub fn parse_unsigned(&mut self) -> Result<u64> {
        self.skip_whitespace();
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("expected unsigned integer"));
        }
        std::str::from_utf8(&self.input[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| self.error("integer out of range"))
    }

    fn value(&mut self, depth: usize) -> Result<Value> {
        if depth > MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        self.skip_whitespace();
        match self.peek() {
            None => Err(self.error("unexpected end of input")),
            Some(b'/') => self.name().map(Value::Name),
            Some(b'(') => self.literal_string(),
            Some(b'<') if self.peek_at(1) == Some(b'<') => self.dictionary(depth),
            Some(b'<') => self.hex_string(),
            Some(b'[') => self.array(depth),
            Some(b'+' | b'-' | b'.' | b'0'..=b'9') => self.number_or_reference(),
            Some(_) => self.keyword(),
        }
    }

    fn dictionary(&mut self, depth: usize) -> Result<Value> {
        self.pos += 2;
        let mut dict = Dictionary::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b'>') if self.peek_at(1) == Some(b'>') => {
                    self.pos += 2;
                    return Ok(Value::Dictionary(dict));
                }
                Some(b'/') => {
                    let key = self.name()?;
                    let value = self.value(depth + 1)?;
                    dict.set(key, value);
                }
                _ => return Err(self.error("expected name key or '>>'")),
            }
        }
    }

    fn array(&mut self, depth: usize) -> Result<Value> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Value::Array(items));
                }
                None => return Err(self.error("unterminated array")),
                _ => items.push(self.value(depth + 1)?),
            }
        }
    }

    fn name(&mut self) -> Result<Vec<u8>> {
        self.pos += 1;
        let mut name = Vec::new();
        while let Some(b) = self.peek() {
            if is_whitespace(b) || is_delimiter(b) {
                break;
            }
            if b == b'#' {
                let code = self
                    .input
                    .get(self.pos + 1..self.pos + 3)
                    .and_then(|h| hex::decode(h).ok());
                if let Some(code) = code {
                    name.extend_from_slice(&code);
                    self.pos += 3;
                    continue;
                }
            }
            name.push(b);
            self.pos += 1;
        }
        Ok(name)
    }

    fn literal_string(&mut self) -> Result<Value> {
        self.pos += 1;
        let mut out = Vec::new();
        let mut nesting = 1usize;
        loop {
            let Some(b) = self.peek() else {
                return Err(self.error("unterminated string"));
            };
            self.pos += 1;
            match b {
                b'(' => {
                    nesting += 1;
                    out.push(b);
                }
                b')' => {
                    nesting -= 1;
                    if nesting == 0 {
                        return Ok(Value::String(out, StringFormat::Literal));
                    }
                    out.push(b);
                }
                b'\\' => self.escape(&mut out),
                _ => out.push(b),
            }
        }
    }

    fn escape(&mut self, out: &mut Vec<u8>) {
        let Some(b) = self.peek() else { return };
        self.pos += 1;
        match b {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'\r' => {
                if self.peek() == Some(b'\n') {
                    self.pos += 1;
                }
            }
            b'\n' => {}
            b'0'..=b'7' => {
                let mut code = u32::from(b - b'0');
                for _ in 0..2 {
                    match self.peek() {
                        Some(d @ b'0'..=b'7') => {
                            code = code * 8 + u32::from(d - b'0');
                            self.pos += 1;
                        }
                        _ => break,
                    }
                }
                out.push((code & 0xff) as u8);
            }
            other => out.push(other),
        }
    }

    fn hex_string(&mut self) -> Result<Value> {
        self.pos += 1;
        let start = self.pos;
        while self.peek().is_some_and(|b| b != b'>') {
            self.pos += 1;
        }
        if self.peek().is_none() {
            return Err(self.error("unterminated hex string"));
        }
        let mut digits: Vec<u8> = self.input[start..self.pos]
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        self.pos += 1;
        if digits.len() % 2 == 1 {
            digits.push(b'0');
        }
        let bytes = hex::decode(&digits).map_err(|_| self.error("invalid hex string"))?;
        Ok(Value::String(bytes, StringFormat::Hexadecimal))
    }

    fn number_or_reference(&mut self) -> Result<Value> {
        let token = self.number_token();
        if token.iter().any(|b| *b == b'.') {
            let real = parse_str::<f64>(token).ok_or_else(|| self.error("invalid real"))?;
            return Ok(Value::Real(real));
        }
        let number = parse_str::<i64>(token).ok_or_else(|| self.error("invalid integer"))?;

        // `n g R` lookahead; rewind when it does not match.
        let save = self.pos;
        if let Some(reference) = self.reference_tail(number) {
            return Ok(Value::Reference(reference));
        }
        self.pos = save;
        Ok(Value::Integer(number))
    }

    fn reference_tail(&mut self, number: i64) -> Option<ObjectId> {
        let number = u32::try_from(number).ok()?;
        self.skip_whitespace();
        if !self.peek()?.is_ascii_digit() {
            return None;
        }
        let generation = u16::try_from(self.parse_unsigned().ok()?).ok()?;
        self.skip_whitespace();
        if self.peek()? != b'R' {
            return None;
        }
        if self.peek_at(1).is_some_and(|b| !is_whitespace(b) && !is_delimiter(b)) {
            return None;
        }
        self.pos += 1;
        Some(ObjectId::new(number, generation))
    }

    fn number_token(&mut self) -> &'a [u8] {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.'))
        {
            self.pos += 1;
        }
        let input = self.input;
        &input[start..self.pos]
    }

    fn keyword(&mut self) -> Result<Value> {
        let start = self.pos;
        while self.peek().is_some_and(|b| !is_whitespace(b) && !is_delimiter(b)) {
            self.pos += 1;
        }
        match &self.input[start..self.pos] {
            b"true" => Ok(Value::Boolean(true)),
            b"false" => Ok(Value::Boolean(false)),
            b"null" => Ok(Value::Null),
            other => {
                trace!(keyword = %String::from_utf8_lossy(other), "unexpected keyword");
                Err(self.error("unexpected keyword"))
            }
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            if is_whitespace(b) {
                self.pos += 1;
            } else if b == b'%' {
                while self.peek().is_some_and(|c| c != b'\n' && c != b'\r') {
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    fn error(&self, message: &str) -> crate::error::Error {
        StructureError::Corrupted(format!("{message} at offset {}", self.pos)).into()
    }
}

fn parse_str<T: std::str::FromStr>(token: &[u8]) -> Option<T> {
    std::str::from_utf8(token).ok()?.parse().ok()
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x0c' | b'\0')
}

fn is_delimiter(b: u8) -> bool {
    matches!(b, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}
