//! Minimal search filter evaluator for the mock directory.
//!
//! Supports `&`, `|`, `!`, presence (`attr=*`), equality and substring
//! patterns, with `\xx` hex escapes in values. Attribute names and values
//! compare case-insensitively.

use roster_core::AttributeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Present(String),
    Equal(String, String),
    /// Value split on unescaped `*`.
    Substring(String, Vec<String>),
}

impl Filter {
    pub fn parse(input: &str) -> Result<Self, String> {
        let mut parser = Parser {
            input: input.trim().as_bytes(),
            pos: 0,
        };
        let filter = parser.filter()?;
        if parser.pos != parser.input.len() {
            return Err(format!("trailing input at offset {}", parser.pos));
        }
        Ok(filter)
    }

    pub fn matches(&self, attrs: &AttributeMap) -> bool {
        match self {
            Self::And(clauses) => clauses.iter().all(|c| c.matches(attrs)),
            Self::Or(clauses) => clauses.iter().any(|c| c.matches(attrs)),
            Self::Not(inner) => !inner.matches(attrs),
            Self::Present(attr) => values(attrs, attr).is_some_and(|v| !v.is_empty()),
            Self::Equal(attr, expected) => values(attrs, attr)
                .is_some_and(|v| v.iter().any(|value| value.eq_ignore_ascii_case(expected))),
            Self::Substring(attr, parts) => values(attrs, attr)
                .is_some_and(|v| v.iter().any(|value| glob_match(parts, value))),
        }
    }
}

fn values<'a>(attrs: &'a AttributeMap, name: &str) -> Option<&'a Vec<String>> {
    attrs
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

fn glob_match(parts: &[String], value: &str) -> bool {
    let value = value.to_ascii_lowercase();
    let parts: Vec<String> = parts.iter().map(|p| p.to_ascii_lowercase()).collect();
    let (first, rest) = match parts.split_first() {
        Some(split) => split,
        None => return true,
    };
    if !value.starts_with(first.as_str()) {
        return false;
    }
    let mut remaining = &value[first.len()..];
    let (last, middle) = match rest.split_last() {
        Some(split) => split,
        None => return remaining.is_empty(),
    };
    for part in middle {
        match remaining.find(part.as_str()) {
            Some(index) => remaining = &remaining[index + part.len()..],
            None => return false,
        }
    }
    remaining.len() >= last.len() && remaining.ends_with(last.as_str())
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn filter(&mut self) -> Result<Filter, String> {
        self.expect(b'(')?;
        let filter = match self.peek() {
            Some(b'&') => {
                self.pos += 1;
                Filter::And(self.list()?)
            }
            Some(b'|') => {
                self.pos += 1;
                Filter::Or(self.list()?)
            }
            Some(b'!') => {
                self.pos += 1;
                Filter::Not(Box::new(self.filter()?))
            }
            Some(_) => self.item()?,
            None => return Err("unexpected end of filter".to_string()),
        };
        self.expect(b')')?;
        Ok(filter)
    }

    fn list(&mut self) -> Result<Vec<Filter>, String> {
        let mut clauses = Vec::new();
        while self.peek() == Some(b'(') {
            clauses.push(self.filter()?);
        }
        Ok(clauses)
    }

    fn item(&mut self) -> Result<Filter, String> {
        let start = self.pos;
        while let Some(byte) = self.peek() {
            if byte == b')' || byte == b'(' {
                break;
            }
            self.pos += 1;
        }
        let raw = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|e| e.to_string())?;
        let (attr, value) = raw
            .split_once('=')
            .ok_or_else(|| format!("missing '=' in {:?}", raw))?;
        if attr.is_empty() {
            return Err(format!("missing attribute in {:?}", raw));
        }

        if value == "*" {
            return Ok(Filter::Present(attr.to_string()));
        }
        let parts = value
            .split('*')
            .map(unescape)
            .collect::<Result<Vec<_>, _>>()?;
        if parts.len() == 1 {
            let mut parts = parts;
            Ok(Filter::Equal(attr.to_string(), parts.remove(0)))
        } else {
            Ok(Filter::Substring(attr.to_string(), parts))
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Result<(), String> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(format!("expected {:?} at offset {}", byte as char, self.pos))
        }
    }
}

fn unescape(raw: &str) -> Result<String, String> {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            let hex = raw
                .get(i + 1..i + 3)
                .ok_or_else(|| format!("truncated escape in {:?}", raw))?;
            let byte = u8::from_str_radix(hex, 16).map_err(|e| e.to_string())?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn attrs(pairs: &[(&str, &[&str])]) -> AttributeMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_equality_and_presence() {
        let entry = attrs(&[("uid", &["alice"]), ("mail", &["Alice@Example.org"])]);
        assert!(Filter::parse("(uid=alice)").unwrap().matches(&entry));
        assert!(Filter::parse("(MAIL=alice@example.org)").unwrap().matches(&entry));
        assert!(Filter::parse("(mail=*)").unwrap().matches(&entry));
        assert!(!Filter::parse("(cn=*)").unwrap().matches(&entry));
    }

    #[test]
    fn test_boolean_operators() {
        let entry = attrs(&[("uid", &["bob"]), ("loginShell", &["/usr/bin/false"])]);
        let filter = Filter::parse("(&(|(uid=alice)(uid=bob))(!(loginShell=/bin/bash)))").unwrap();
        assert!(filter.matches(&entry));
        assert!(!Filter::parse("(&(uid=bob)(uid=carol))").unwrap().matches(&entry));
    }

    #[test]
    fn test_substring() {
        let entry = attrs(&[("mail", &["alice@apache.org"])]);
        assert!(Filter::parse("(mail=*@apache.org)").unwrap().matches(&entry));
        assert!(Filter::parse("(mail=al*@*.org)").unwrap().matches(&entry));
        assert!(!Filter::parse("(mail=bob*)").unwrap().matches(&entry));
    }

    #[test]
    fn test_escaped_value() {
        let entry = attrs(&[("cn", &["a*b(c)"])]);
        let filter = Filter::parse(r"(cn=a\2ab\28c\29)").unwrap();
        assert_eq!(filter, Filter::Equal("cn".into(), "a*b(c)".into()));
        assert!(filter.matches(&entry));
    }

    #[test]
    fn test_malformed() {
        assert!(Filter::parse("uid=alice").is_err());
        assert!(Filter::parse("(uid=alice").is_err());
        assert!(Filter::parse("(uid)").is_err());
        assert!(Filter::parse(r"(cn=\2)").is_err());
    }

    proptest! {
        /// Property: an escaped value always matches itself exactly.
        #[test]
        fn prop_escaped_equality_matches(value in "[ -~]{1,24}") {
            let filter = Filter::parse(&roster_directory::filter::eq("cn", &value)).unwrap();
            prop_assert!(filter.matches(&attrs(&[("cn", &[value.as_str()])])));
        }
    }
}
