//! Plugin parameter parsing
//!
//! protoc hands the plugin a single parameter string (everything after the
//! `:` in `--stencil_out=...:dir`, or the `--stencil_opt` values joined). The
//! string is a `;`-separated list of pairs, each either a bare `key` or
//! `key=v1,v2,...`. Values may be double-quoted to embed `;`, `,`, `=` or
//! quotes; inside a quoted span a backslash escapes the next character.

use crate::GeneratorError;
use minijinja::Value;
use std::collections::BTreeMap;

/// Parsed plugin parameters: every key maps to its values in the order given
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    values: BTreeMap<String, Vec<String>>,
}

impl Params {
    /// Parse a raw parameter string
    ///
    /// A key given without `=` records a single empty-string value. Repeated
    /// keys accumulate their values. A malformed quoted value is an error.
    pub fn parse(raw: &str) -> Result<Self, GeneratorError> {
        let mut params = Params::default();

        for pair in split_unquoted(raw, &[';']) {
            let mut segments = split_unquoted(pair, &['=', ',']).into_iter();
            let key = match segments.next() {
                Some(key) => key.trim().to_string(),
                None => continue,
            };

            let mut found = false;
            for segment in segments {
                let value = unquote_value(segment.trim())?;
                params.push(&key, value);
                found = true;
            }

            if !found {
                params.push(&key, String::new());
            }
        }

        Ok(params)
    }

    fn push(&mut self, key: &str, value: String) {
        self.values.entry(key.to_string()).or_default().push(value);
    }

    /// All values recorded for `key`, empty when the key is absent
    pub fn values(&self, key: &str) -> &[String] {
        self.values.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `key` appeared at all
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// First value of `key`, or the empty string
    pub fn get(&self, key: &str) -> &str {
        self.values(key).first().map(String::as_str).unwrap_or("")
    }

    /// First value of `key` parsed as an integer, or `default`
    pub fn int(&self, key: &str, default: i64) -> i64 {
        self.values(key)
            .first()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// First value of `key` as a boolean
    ///
    /// `yes`/`true` and `no`/`false` (any case); anything else yields `default`.
    pub fn bool(&self, key: &str, default: bool) -> bool {
        match self.values(key).first() {
            Some(v) if v.eq_ignore_ascii_case("yes") || v.eq_ignore_ascii_case("true") => true,
            Some(v) if v.eq_ignore_ascii_case("no") || v.eq_ignore_ascii_case("false") => false,
            _ => default,
        }
    }

    /// Iterate keys in sorted order with their values
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Template view: a map of key to list of strings
    pub fn to_value(&self) -> Value {
        let map: BTreeMap<String, Vec<String>> = self.values.clone();
        Value::from_serialize(&map)
    }
}

/// Split `s` on any of `splitters` occurring outside a double-quoted span
///
/// Empty fields are dropped.
fn split_unquoted<'a>(s: &'a str, splitters: &[char]) -> Vec<&'a str> {
    let mut fields = Vec::new();
    let mut in_quote = false;
    let mut escape = false;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        if c == '"' {
            in_quote = !in_quote;
        }
        if in_quote {
            escape = c == '\\';
            continue;
        }
        if splitters.contains(&c) {
            if i > start {
                fields.push(&s[start..i]);
            }
            start = i + c.len_utf8();
        }
    }

    if start < s.len() {
        fields.push(&s[start..]);
    }

    fields
}

fn unquote_value(s: &str) -> Result<String, GeneratorError> {
    if s.starts_with('"') {
        unquote(s).map_err(|e| GeneratorError::ParamsError(format!("{}: {}", e, s)))
    } else {
        Ok(s.to_string())
    }
}

/// Interpret a double-quoted string literal with C-style escapes
fn unquote(s: &str) -> Result<String, &'static str> {
    let inner = s
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .ok_or("unterminated quoted value")?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => return Err("unescaped quote inside quoted value"),
            '\\' => {
                let escaped = chars.next().ok_or("dangling escape")?;
                let decoded = match escaped {
                    'a' => '\x07',
                    'b' => '\x08',
                    'f' => '\x0c',
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    'v' => '\x0b',
                    '\\' | '"' | '\'' => escaped,
                    'x' => hex_escape(&mut chars, 2)?,
                    'u' => hex_escape(&mut chars, 4)?,
                    'U' => hex_escape(&mut chars, 8)?,
                    '0'..='7' => {
                        let mut code = escaped.to_digit(8).unwrap_or(0);
                        for _ in 0..2 {
                            let digit = chars
                                .next()
                                .and_then(|d| d.to_digit(8))
                                .ok_or("invalid octal escape")?;
                            code = code * 8 + digit;
                        }
                        char::from_u32(code).ok_or("invalid octal escape")?
                    }
                    _ => return Err("unknown escape sequence"),
                };
                out.push(decoded);
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

fn hex_escape(chars: &mut std::str::Chars<'_>, digits: usize) -> Result<char, &'static str> {
    let mut code = 0u32;
    for _ in 0..digits {
        let digit = chars
            .next()
            .and_then(|d| d.to_digit(16))
            .ok_or("invalid hex escape")?;
        code = code * 16 + digit;
    }
    char::from_u32(code).ok_or("invalid unicode escape")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mixed_pairs() {
        let params = Params::parse("a=1,2;b;c=\"x;y\"").unwrap();
        assert_eq!(params.values("a"), ["1", "2"]);
        assert_eq!(params.values("b"), [""]);
        assert_eq!(params.values("c"), ["x;y"]);
    }

    #[test]
    fn test_repeated_keys_accumulate() {
        let params = Params::parse("template=a.tmpl;template=b.tmpl,c.tmpl").unwrap();
        assert_eq!(params.values("template"), ["a.tmpl", "b.tmpl", "c.tmpl"]);
    }

    #[test]
    fn test_quoted_escapes() {
        let params = Params::parse(r#"sep="a,\"b\"=c";nl="\n""#).unwrap();
        assert_eq!(params.get("sep"), "a,\"b\"=c");
        assert_eq!(params.get("nl"), "\n");
    }

    #[test]
    fn test_bare_key_without_value() {
        let params = Params::parse("verbose;x").unwrap();
        assert_eq!(params.values("verbose"), [""]);
        assert_eq!(params.values("x"), [""]);
        assert_eq!(params.values("missing"), Vec::<String>::new());
    }

    #[test]
    fn test_unterminated_quote_is_error() {
        assert!(Params::parse("a=\"x;y").is_err());
        assert!(Params::parse("a=\"x\"y").is_err());
    }

    #[test]
    fn test_typed_accessors() {
        let params = Params::parse("n=42;bad=x;on=YES;t=true;off=no").unwrap();
        assert_eq!(params.int("n", 7), 42);
        assert_eq!(params.int("bad", 7), 7);
        assert_eq!(params.int("missing", 7), 7);
        assert!(params.bool("on", false));
        assert!(params.bool("t", false));
        assert!(!params.bool("off", false));
        assert!(!params.bool("off", true));
        assert!(params.bool("bad", true));
        assert!(params.bool("missing", true));
        assert_eq!(params.get("missing"), "");
        assert_eq!(params.get("n"), "42");
    }

    #[test]
    fn test_empty_string() {
        let params = Params::parse("").unwrap();
        assert_eq!(params.iter().count(), 0);
    }
}
