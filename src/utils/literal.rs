//! Permissive decoder for Python-style literal reprs.
//!
//! Agent tools frequently return the `repr()` of a Python structure rather
//! than JSON: single-quoted strings, `True`/`False`/`None`, tuples, and
//! constructor calls like `Decimal('12.50')`. This module decodes that
//! syntax into a [`serde_json::Value`].
//!
//! # Accepted syntax
//!
//! - strings: `'..'`, `".."`, `'''..'''`, `"""..."""`, optional `r`/`u`/`b` prefix
//! - numbers: integers, floats, exponents, leading sign
//! - keywords: `True`, `False`, `None` (JSON `true`/`false`/`null` are rejected)
//! - containers: lists, tuples and sets (as arrays), dicts; trailing commas
//! - calls: `Decimal('1.5')` becomes a number, any other `name(...)` call
//!   becomes a string holding its source text
//!
//! Dict keys that are not strings are stringified, since JSON objects only
//! have string keys.

use serde_json::{Map, Number, Value};

use crate::error::LiteralError;

/// Maximum nesting depth accepted before giving up.
const MAX_DEPTH: usize = 128;

/// Decodes a complete literal. Trailing non-whitespace input is an error.
pub fn parse_literal(input: &str) -> Result<Value, LiteralError> {
    let mut parser = LiteralParser::new(input);
    parser.skip_whitespace();
    let value = parser.parse_value(0)?;
    parser.skip_whitespace();
    if parser.pos < input.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(value)
}

struct LiteralParser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> LiteralParser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn error(&self, message: impl Into<String>) -> LiteralError {
        LiteralError::new(self.pos, message)
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), LiteralError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", expected)))
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }

    fn parse_value(&mut self, depth: usize) -> Result<Value, LiteralError> {
        if depth > MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }

        match self.peek() {
            None => Err(self.error("unexpected end of input")),
            Some('[') => {
                self.bump();
                self.parse_sequence(']', depth).map(Value::Array)
            }
            Some('(') => {
                self.bump();
                self.parse_sequence(')', depth).map(Value::Array)
            }
            Some('{') => self.parse_brace(depth),
            Some('"') | Some('\'') => self.parse_string().map(Value::String),
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => {
                self.parse_number()
            }
            Some(c) if c.is_alphabetic() || c == '_' => self.parse_word(depth),
            Some(c) => Err(self.error(format!("unexpected character '{}'", c))),
        }
    }

    /// Parses comma-separated values up to `close`. The opening delimiter
    /// has already been consumed.
    fn parse_sequence(&mut self, close: char, depth: usize) -> Result<Vec<Value>, LiteralError> {
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            if self.eat(close) {
                return Ok(items);
            }
            items.push(self.parse_value(depth + 1)?);
            self.skip_whitespace();
            if self.eat(',') {
                continue;
            }
            self.expect(close)?;
            return Ok(items);
        }
    }

    /// `{}` is an empty dict; `{a: b, ...}` a dict; `{a, b}` a set.
    fn parse_brace(&mut self, depth: usize) -> Result<Value, LiteralError> {
        self.expect('{')?;
        self.skip_whitespace();
        if self.eat('}') {
            return Ok(Value::Object(Map::new()));
        }

        let first = self.parse_value(depth + 1)?;
        self.skip_whitespace();

        if !self.eat(':') {
            // Set literal.
            let mut items = vec![first];
            if self.eat(',') {
                items.extend(self.parse_sequence('}', depth)?);
            } else {
                self.expect('}')?;
            }
            return Ok(Value::Array(items));
        }

        let mut map = Map::new();
        let mut key = first;
        loop {
            self.skip_whitespace();
            let value = self.parse_value(depth + 1)?;
            map.insert(key_to_string(key), value);
            self.skip_whitespace();

            if self.eat('}') {
                return Ok(Value::Object(map));
            }
            self.expect(',')?;
            self.skip_whitespace();
            if self.eat('}') {
                return Ok(Value::Object(map));
            }

            key = self.parse_value(depth + 1)?;
            self.skip_whitespace();
            self.expect(':')?;
        }
    }

    fn parse_string(&mut self) -> Result<String, LiteralError> {
        let start = self.pos;
        let quote = match self.bump() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(LiteralError::new(start, "expected string")),
        };

        let triple: String = std::iter::repeat(quote).take(3).collect();
        let is_triple = self.src[start..].starts_with(&triple);
        if is_triple {
            self.pos = start + triple.len();
        }

        let mut out = String::new();
        loop {
            if is_triple && self.rest().starts_with(&triple) {
                self.pos += triple.len();
                return Ok(out);
            }

            let c = self
                .bump()
                .ok_or_else(|| LiteralError::new(start, "unterminated string"))?;

            if c == quote && !is_triple {
                return Ok(out);
            }
            if c == '\\' {
                self.parse_escape(&mut out)?;
            } else {
                out.push(c);
            }
        }
    }

    fn parse_escape(&mut self, out: &mut String) -> Result<(), LiteralError> {
        let c = self
            .bump()
            .ok_or_else(|| self.error("unterminated escape"))?;
        match c {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            '\n' => {}
            'x' => out.push(self.parse_hex_escape(2)?),
            'u' => out.push(self.parse_hex_escape(4)?),
            'U' => out.push(self.parse_hex_escape(8)?),
            other => {
                // Unknown escapes are kept verbatim, as Python does.
                out.push('\\');
                out.push(other);
            }
        }
        Ok(())
    }

    fn parse_hex_escape(&mut self, len: usize) -> Result<char, LiteralError> {
        let end = self.pos + len;
        let digits = self
            .src
            .get(self.pos..end)
            .ok_or_else(|| self.error("truncated hex escape"))?;
        let code = u32::from_str_radix(digits, 16)
            .map_err(|_| self.error(format!("invalid hex escape '{}'", digits)))?;
        let c = char::from_u32(code)
            .ok_or_else(|| self.error(format!("invalid code point {:#x}", code)))?;
        self.pos = end;
        Ok(c)
    }

    fn parse_number(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        if matches!(self.peek(), Some('-') | Some('+')) {
            self.bump();
        }
        while let Some(c) = self.peek() {
            let continues_exponent = (c == '-' || c == '+')
                && matches!(self.src[..self.pos].chars().last(), Some('e') | Some('E'));
            if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || c == '_' || continues_exponent
            {
                self.bump();
            } else {
                break;
            }
        }

        let text: String = self.src[start..self.pos].chars().filter(|c| *c != '_').collect();
        number_from_text(&text).ok_or_else(|| LiteralError::new(start, format!("invalid number '{}'", text)))
    }

    fn parse_identifier(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '.' {
                self.bump();
            } else {
                break;
            }
        }
        &self.src[start..self.pos]
    }

    fn parse_word(&mut self, depth: usize) -> Result<Value, LiteralError> {
        let start = self.pos;

        // String prefixes: r'..', u"..", b'..'
        if let Some(rest) = self.rest().get(1..) {
            let first = self.peek().map(|c| c.to_ascii_lowercase());
            if matches!(first, Some('r') | Some('u') | Some('b'))
                && (rest.starts_with('\'') || rest.starts_with('"'))
            {
                let raw = first == Some('r');
                self.bump();
                return if raw {
                    self.parse_raw_string().map(Value::String)
                } else {
                    self.parse_string().map(Value::String)
                };
            }
        }

        let ident = self.parse_identifier();
        match ident {
            "True" => return Ok(Value::Bool(true)),
            "False" => return Ok(Value::Bool(false)),
            "None" => return Ok(Value::Null),
            "nan" | "inf" => return Ok(Value::String(ident.to_string())),
            _ => {}
        }

        self.skip_whitespace();
        if !self.eat('(') {
            return Err(LiteralError::new(start, format!("unknown name '{}'", ident)));
        }

        let args = self.parse_sequence(')', depth)?;
        let source = &self.src[start..self.pos];

        if ident == "Decimal" || ident.ends_with(".Decimal") {
            if let Some(number) = args.first().and_then(decimal_arg) {
                return Ok(number);
            }
        }
        Ok(Value::String(source.to_string()))
    }

    fn parse_raw_string(&mut self) -> Result<String, LiteralError> {
        let start = self.pos;
        let quote = self
            .bump()
            .ok_or_else(|| LiteralError::new(start, "expected string"))?;
        let mut out = String::new();
        loop {
            let c = self
                .bump()
                .ok_or_else(|| LiteralError::new(start, "unterminated string"))?;
            if c == quote {
                return Ok(out);
            }
            out.push(c);
            if c == '\\' {
                if let Some(next) = self.bump() {
                    out.push(next);
                }
            }
        }
    }
}

fn number_from_text(text: &str) -> Option<Value> {
    if let Ok(int) = text.parse::<i64>() {
        return Some(Value::Number(int.into()));
    }
    if let Ok(uint) = text.parse::<u64>() {
        return Some(Value::Number(uint.into()));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

fn decimal_arg(arg: &Value) -> Option<Value> {
    match arg {
        Value::String(s) => number_from_text(s.trim()),
        Value::Number(_) => Some(arg.clone()),
        _ => None,
    }
}

fn key_to_string(key: Value) -> String {
    match key {
        Value::String(s) => s,
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_python_list_of_dicts() {
        let value = parse_literal("[{'id': 1, 'name': 'Alice', 'active': True, 'manager': None}]")
            .expect("should parse");
        assert_eq!(
            value,
            json!([{"id": 1, "name": "Alice", "active": true, "manager": null}])
        );
    }

    #[test]
    fn test_empty_containers() {
        assert_eq!(parse_literal("[]").expect("list"), json!([]));
        assert_eq!(parse_literal("{}").expect("dict"), json!({}));
        assert_eq!(parse_literal("()").expect("tuple"), json!([]));
    }

    #[test]
    fn test_tuples_sets_and_trailing_commas() {
        assert_eq!(parse_literal("(1, 2,)").expect("tuple"), json!([1, 2]));
        assert_eq!(parse_literal("{'a', 'b'}").expect("set"), json!(["a", "b"]));
        assert_eq!(parse_literal("{'a': 1,}").expect("dict"), json!({"a": 1}));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(parse_literal("-12").expect("int"), json!(-12));
        assert_eq!(parse_literal("3.5e2").expect("float"), json!(350.0));
        assert_eq!(parse_literal("1_000").expect("underscore"), json!(1000));
        assert_eq!(parse_literal("1e-3").expect("neg exponent"), json!(0.001));
    }

    #[test]
    fn test_string_escapes_and_quotes() {
        assert_eq!(
            parse_literal(r#"'it\'s "quoted"\n'"#).expect("string"),
            json!("it's \"quoted\"\n")
        );
        assert_eq!(parse_literal(r"'\x41é'").expect("hex"), json!("Aé"));
        assert_eq!(parse_literal("'''multi\nline'''").expect("triple"), json!("multi\nline"));
        assert_eq!(parse_literal(r"r'\d+'").expect("raw"), json!(r"\d+"));
    }

    #[test]
    fn test_constructor_calls() {
        assert_eq!(
            parse_literal("{'amount': Decimal('12.50')}").expect("decimal"),
            json!({"amount": 12.5})
        );
        assert_eq!(
            parse_literal("[datetime.date(2024, 1, 2)]").expect("date"),
            json!(["datetime.date(2024, 1, 2)"])
        );
    }

    #[test]
    fn test_non_string_keys_are_stringified() {
        assert_eq!(
            parse_literal("{1: 'a', None: 'b', True: 'c'}").expect("keys"),
            json!({"1": "a", "None": "b", "True": "c"})
        );
    }

    #[test]
    fn test_rejects_json_keywords_and_garbage() {
        assert!(parse_literal("{\"a\": true}").is_err());
        assert!(parse_literal("[1, 2").is_err());
        assert!(parse_literal("[<TOKEN>]").is_err());
        assert!(parse_literal("[1] trailing").is_err());
        assert!(parse_literal("").is_err());
    }

    #[test]
    fn test_error_position() {
        let err = parse_literal("[1, @]").expect_err("should fail");
        assert_eq!(err.position, 4);
    }

    #[test]
    fn test_deep_nesting_is_bounded() {
        let input = "[".repeat(MAX_DEPTH + 10);
        assert!(parse_literal(&input).is_err());
    }
}
