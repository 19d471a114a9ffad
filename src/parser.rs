// RFC 4515 string filter parser.
// Recursive descent over the parenthesized grammar; leaf expressions are
// split at the first ')' and classified by their operator.

use crate::error::{FilterError, Result};
use crate::escape::unescape;
use crate::filter::{AttributeValueAssertion, ExtensibleFilter, Filter, SubstringFilter, Substrings};
use std::str::FromStr;
use tracing::debug;

impl Filter {
    /// Parse an RFC 4515 filter string. Input without an outer pair of
    /// parentheses is wrapped in one before parsing.
    pub fn parse(input: &str) -> Result<Filter> {
        parse(input)
    }
}

impl FromStr for Filter {
    type Err = FilterError;
    fn from_str(s: &str) -> Result<Self> {
        parse(s)
    }
}

pub fn parse(input: &str) -> Result<Filter> {
    debug!("Parsing filter string ({} bytes)", input.len());
    let result = parse_wrapped(input);
    if let Err(ref e) = result {
        debug!("Rejected filter string {:?}: {}", input, e);
    }
    result
}

fn parse_wrapped(input: &str) -> Result<Filter> {
    if input.is_empty() {
        return Err(FilterError::parse("input string cannot be empty"));
    }

    let wrapped;
    let s = if input.starts_with('(') {
        input
    } else {
        wrapped = format!("({})", input);
        wrapped.as_str()
    };

    let (end, filter) = parse_filter(s, 0)?;
    if end < s.len() - 1 {
        return Err(FilterError::parse("unbalanced parens"));
    }
    Ok(filter)
}

/// Parse one parenthesized filter starting at `start`. Returns the index of
/// its closing paren together with the filter.
fn parse_filter(s: &str, start: usize) -> Result<(usize, Filter)> {
    let bytes = s.as_bytes();
    let len = bytes.len();
    let mut cur = start;

    if bytes.get(cur) != Some(&b'(') {
        return Err(FilterError::parse(format!("missing paren at offset {}", cur)));
    }
    cur += 1;

    let filter = match bytes.get(cur) {
        Some(&op @ (b'&' | b'|')) => {
            cur += 1;
            let mut clauses = Vec::new();
            loop {
                let (end, clause) = parse_filter(s, cur)?;
                clauses.push(clause);
                cur = end + 1;
                if cur >= len || bytes[cur] == b')' {
                    break;
                }
            }
            if op == b'&' {
                Filter::And(clauses)
            } else {
                Filter::Or(clauses)
            }
        }
        Some(b'!') => {
            let (end, inner) = parse_filter(s, cur + 1)?;
            cur = end + 1;
            if bytes.get(cur) != Some(&b')') {
                return Err(FilterError::parse("unbalanced parens"));
            }
            Filter::Not(Box::new(inner))
        }
        _ => {
            let end = s[cur..]
                .find(')')
                .map(|i| cur + i)
                .ok_or_else(|| FilterError::parse("unbalanced parens"))?;
            let filter = parse_expr(&s[cur..end])?;
            cur = end;
            filter
        }
    };

    if cur >= len {
        return Err(FilterError::parse("unbalanced parens"));
    }
    Ok((cur, filter))
}

fn is_attr_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

/// Classify a leaf expression (the text between the parens).
fn parse_expr(expr: &str) -> Result<Filter> {
    let (attr, remain) = if expr.starts_with(':') {
        // Extensible filters may omit the attribute.
        ("", expr)
    } else {
        let n = expr.bytes().take_while(|&b| is_attr_char(b)).count();
        if n == 0 {
            return Err(FilterError::parse(format!("invalid attribute name: {:?}", expr)));
        }
        expr.split_at(n)
    };

    if remain == "=*" {
        return Ok(Filter::Presence(attr.to_string()));
    }
    if let Some(value) = remain.strip_prefix('=') {
        if value.contains('*') {
            let parts = split_substrings(value)?;
            return Ok(Filter::Substring(SubstringFilter::from_parts(attr.to_string(), parts)));
        }
        return Ok(Filter::Equality(ava(attr, value)?));
    }
    if let Some(value) = remain.strip_prefix(">=") {
        return Ok(Filter::GreaterOrEqual(ava(attr, value)?));
    }
    if let Some(value) = remain.strip_prefix("<=") {
        return Ok(Filter::LessOrEqual(ava(attr, value)?));
    }
    if let Some(value) = remain.strip_prefix("~=") {
        return Ok(Filter::Approximate(ava(attr, value)?));
    }
    if remain.starts_with(':') {
        return parse_ext(attr, remain);
    }

    Err(FilterError::parse(format!("invalid expression: {:?}", expr)))
}

fn ava(attr: &str, value: &str) -> Result<AttributeValueAssertion> {
    Ok(AttributeValueAssertion::new(attr, decode_value(value)?))
}

/// Decode an escaped assertion value. An unescaped '(' can only be a
/// misplaced filter; '*' is left to the callers that split on it.
fn decode_value(text: &str) -> Result<Vec<u8>> {
    if text.contains('(') {
        return Err(FilterError::parse("illegal unescaped char: ("));
    }
    unescape(text)
}

/// Split on unescaped '*' and decode every fragment on its own, so an
/// escaped `\2a` stays a literal star inside its fragment.
fn split_substrings(text: &str) -> Result<Substrings> {
    let mut fields: Vec<&str> = text.split('*').collect();
    if fields.len() < 2 {
        return Err(FilterError::parse("wildcard missing"));
    }

    let last = fields.pop().unwrap_or_default();
    let first = fields.remove(0);

    let initial = decode_value(first)?;
    let final_ = decode_value(last)?;
    let any = fields
        .into_iter()
        .map(decode_value)
        .collect::<Result<Vec<_>>>()?;

    Ok(Substrings {
        initial: (!initial.is_empty()).then_some(initial),
        any,
        final_: (!final_.is_empty()).then_some(final_),
    })
}

/// `[attr]:[dn:][rule:]=value`; `remain` starts at the first ':'.
fn parse_ext(attr: &str, remain: &str) -> Result<Filter> {
    let mut fields = remain.split(':').peekable();
    // The attribute was already consumed, so the leading field is empty.
    fields.next();

    let mut ext = ExtensibleFilter {
        match_type: (!attr.is_empty()).then(|| attr.to_string()),
        ..ExtensibleFilter::default()
    };

    if fields.next_if(|f| f.eq_ignore_ascii_case("dn")).is_some() {
        ext.dn_attributes = true;
    }
    if let Some(rule) = fields.next_if(|f| !f.starts_with('=')) {
        if rule.is_empty() {
            return Err(FilterError::parse("invalid matching rule in ext filter"));
        }
        ext.rule = Some(rule.to_string());
    }
    if !fields.peek().is_some_and(|f| f.starts_with('=')) {
        // With matchType, dnAttributes and rule consumed, ':=' must be next.
        return Err(FilterError::parse("missing := in ext filter"));
    }

    // Put back any ':' that belonged to the value.
    let joined = fields.collect::<Vec<_>>().join(":");
    let raw = &joined[1..];
    ext.value = decode_value(raw)?;
    if raw.contains('*') {
        ext.substrings = Some(split_substrings(raw)?);
    }

    ext.validate().map_err(|e| match e {
        FilterError::Invalid(msg) => FilterError::Parse(msg),
        other => other,
    })?;
    Ok(Filter::Extensible(ext))
}
