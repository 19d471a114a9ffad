// LDAP search filter model (RFC 4511 section 4.5.1).

use crate::error::{FilterError, Result};
use crate::escape::escape;
use serde_json::{json, Value};
use std::borrow::Cow;
use std::fmt;

// Filter CHOICE tags (context-specific)
pub const FILTER_AND: u8 = 0xA0;
pub const FILTER_OR: u8 = 0xA1;
pub const FILTER_NOT: u8 = 0xA2;
pub const FILTER_EQUALITY: u8 = 0xA3;
pub const FILTER_SUBSTRINGS: u8 = 0xA4;
pub const FILTER_GE: u8 = 0xA5;
pub const FILTER_LE: u8 = 0xA6;
pub const FILTER_PRESENT: u8 = 0x87;
pub const FILTER_APPROX: u8 = 0xA8;
pub const FILTER_EXT: u8 = 0xA9;
/// Placeholder envelope for the empty filter: SEQUENCE { NULL }.
pub const FILTER_EMPTY: u8 = 0x30;

/// Discriminant of a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    Empty,
    And,
    Or,
    Not,
    Equality,
    Substring,
    GreaterOrEqual,
    LessOrEqual,
    Presence,
    Approximate,
    Extensible,
}

impl FilterKind {
    /// Outer BER tag of this kind.
    pub fn tag(self) -> u8 {
        match self {
            FilterKind::Empty => FILTER_EMPTY,
            FilterKind::And => FILTER_AND,
            FilterKind::Or => FILTER_OR,
            FilterKind::Not => FILTER_NOT,
            FilterKind::Equality => FILTER_EQUALITY,
            FilterKind::Substring => FILTER_SUBSTRINGS,
            FilterKind::GreaterOrEqual => FILTER_GE,
            FilterKind::LessOrEqual => FILTER_LE,
            FilterKind::Presence => FILTER_PRESENT,
            FilterKind::Approximate => FILTER_APPROX,
            FilterKind::Extensible => FILTER_EXT,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FilterKind::Empty => "FilterString",
            FilterKind::And => "AndFilter",
            FilterKind::Or => "OrFilter",
            FilterKind::Not => "NotFilter",
            FilterKind::Equality => "EqualityFilter",
            FilterKind::Substring => "SubstringFilter",
            FilterKind::GreaterOrEqual => "GreaterThanEqualsFilter",
            FilterKind::LessOrEqual => "LessThanEqualsFilter",
            FilterKind::Presence => "PresenceFilter",
            FilterKind::Approximate => "ApproximateFilter",
            FilterKind::Extensible => "ExtensibleFilter",
        }
    }
}

impl TryFrom<u8> for FilterKind {
    type Error = FilterError;
    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            FILTER_EMPTY => Ok(FilterKind::Empty),
            FILTER_AND => Ok(FilterKind::And),
            FILTER_OR => Ok(FilterKind::Or),
            FILTER_NOT => Ok(FilterKind::Not),
            FILTER_EQUALITY => Ok(FilterKind::Equality),
            FILTER_SUBSTRINGS => Ok(FilterKind::Substring),
            FILTER_GE => Ok(FilterKind::GreaterOrEqual),
            FILTER_LE => Ok(FilterKind::LessOrEqual),
            FILTER_PRESENT => Ok(FilterKind::Presence),
            FILTER_APPROX => Ok(FilterKind::Approximate),
            FILTER_EXT => Ok(FilterKind::Extensible),
            _ => Err(FilterError::ber(format!(
                "invalid search filter type: 0x{:02x}",
                tag
            ))),
        }
    }
}

/// Attribute name plus assertion value, shared by `=`, `>=`, `<=` and `~=`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeValueAssertion {
    pub attribute: String,
    pub value: Vec<u8>,
}

impl AttributeValueAssertion {
    pub fn new(attribute: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn value_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }
}

/// Initial / any / final fragments of a substring assertion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Substrings {
    pub initial: Option<Vec<u8>>,
    pub any: Vec<Vec<u8>>,
    pub final_: Option<Vec<u8>>,
}

impl Substrings {
    pub fn is_empty(&self) -> bool {
        self.initial.is_none() && self.any.is_empty() && self.final_.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstringFilter {
    pub attribute: String,
    pub initial: Option<Vec<u8>>,
    pub any: Vec<Vec<u8>>,
    pub final_: Option<Vec<u8>>,
}

impl SubstringFilter {
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            initial: None,
            any: Vec::new(),
            final_: None,
        }
    }

    pub fn with_initial(mut self, initial: impl Into<Vec<u8>>) -> Self {
        self.initial = Some(initial.into());
        self
    }

    pub fn with_any(mut self, any: impl Into<Vec<u8>>) -> Self {
        self.any.push(any.into());
        self
    }

    pub fn with_final(mut self, final_: impl Into<Vec<u8>>) -> Self {
        self.final_ = Some(final_.into());
        self
    }

    pub(crate) fn from_parts(attribute: String, parts: Substrings) -> Self {
        Self {
            attribute,
            initial: parts.initial,
            any: parts.any,
            final_: parts.final_,
        }
    }
}

/// Extensible match (`attr:dn:rule:=value`).
///
/// `substrings` is filled in by the text parser when the value contains an
/// unescaped `*`, for matching rules that take substring syntax. It is not
/// part of the BER encoding and is ignored by `==`.
#[derive(Debug, Clone, Default, Eq)]
pub struct ExtensibleFilter {
    pub match_type: Option<String>,
    pub rule: Option<String>,
    pub value: Vec<u8>,
    pub dn_attributes: bool,
    pub substrings: Option<Substrings>,
}

impl PartialEq for ExtensibleFilter {
    fn eq(&self, other: &Self) -> bool {
        self.match_type == other.match_type
            && self.rule == other.rule
            && self.value == other.value
            && self.dn_attributes == other.dn_attributes
    }
}

impl ExtensibleFilter {
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn with_match_type(mut self, match_type: impl Into<String>) -> Self {
        self.match_type = Some(match_type.into());
        self
    }

    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }

    pub fn with_dn_attributes(mut self, dn_attributes: bool) -> Self {
        self.dn_attributes = dn_attributes;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let has_type = self.match_type.as_deref().is_some_and(|s| !s.is_empty());
        let has_rule = self.rule.as_deref().is_some_and(|s| !s.is_empty());
        if !has_type && !has_rule {
            return Err(FilterError::Invalid(
                "extensible filter requires an attribute or a matching rule".to_string(),
            ));
        }
        // RFC 4515 oid: a descr or a numericoid
        if let Some(rule) = self.rule.as_deref() {
            if !rule.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-') {
                return Err(FilterError::Invalid(format!("invalid matching rule: {:?}", rule)));
            }
        }
        Ok(())
    }

    pub fn value_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }
}

/// An LDAP search filter.
///
/// `Empty` is the base placeholder: it renders as `()`, encodes as
/// `SEQUENCE { NULL }` and never matches. Parsers never produce it from
/// real input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Filter {
    #[default]
    Empty,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equality(AttributeValueAssertion),
    Substring(SubstringFilter),
    GreaterOrEqual(AttributeValueAssertion),
    LessOrEqual(AttributeValueAssertion),
    Presence(String),
    Approximate(AttributeValueAssertion),
    Extensible(ExtensibleFilter),
}

impl Filter {
    pub fn empty() -> Self {
        Filter::Empty
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And(filters)
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or(filters)
    }

    pub fn not(filter: Filter) -> Self {
        Filter::Not(Box::new(filter))
    }

    pub fn equality(attribute: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Filter::Equality(AttributeValueAssertion::new(attribute, value))
    }

    pub fn greater_or_equal(attribute: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Filter::GreaterOrEqual(AttributeValueAssertion::new(attribute, value))
    }

    pub fn less_or_equal(attribute: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Filter::LessOrEqual(AttributeValueAssertion::new(attribute, value))
    }

    pub fn approximate(attribute: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Filter::Approximate(AttributeValueAssertion::new(attribute, value))
    }

    pub fn presence(attribute: impl Into<String>) -> Result<Self> {
        let attribute = attribute.into();
        if attribute.is_empty() {
            return Err(FilterError::Invalid(
                "presence filter requires an attribute".to_string(),
            ));
        }
        Ok(Filter::Presence(attribute))
    }

    pub fn substring(filter: SubstringFilter) -> Self {
        Filter::Substring(filter)
    }

    pub fn extensible(filter: ExtensibleFilter) -> Result<Self> {
        filter.validate()?;
        Ok(Filter::Extensible(filter))
    }

    pub fn kind(&self) -> FilterKind {
        match self {
            Filter::Empty => FilterKind::Empty,
            Filter::And(_) => FilterKind::And,
            Filter::Or(_) => FilterKind::Or,
            Filter::Not(_) => FilterKind::Not,
            Filter::Equality(_) => FilterKind::Equality,
            Filter::Substring(_) => FilterKind::Substring,
            Filter::GreaterOrEqual(_) => FilterKind::GreaterOrEqual,
            Filter::LessOrEqual(_) => FilterKind::LessOrEqual,
            Filter::Presence(_) => FilterKind::Presence,
            Filter::Approximate(_) => FilterKind::Approximate,
            Filter::Extensible(_) => FilterKind::Extensible,
        }
    }

    pub fn tag(&self) -> u8 {
        self.kind().tag()
    }

    /// Attribute targeted by a leaf filter. For extensible filters this is
    /// the match type, if any.
    pub fn attribute(&self) -> Option<&str> {
        match self {
            Filter::Equality(ava)
            | Filter::GreaterOrEqual(ava)
            | Filter::LessOrEqual(ava)
            | Filter::Approximate(ava) => Some(&ava.attribute),
            Filter::Substring(s) => Some(&s.attribute),
            Filter::Presence(attr) => Some(attr),
            Filter::Extensible(ext) => ext.match_type.as_deref(),
            Filter::Empty | Filter::And(_) | Filter::Or(_) | Filter::Not(_) => None,
        }
    }

    /// Child clauses of an And/Or filter; the single child of a Not.
    pub fn clauses(&self) -> &[Filter] {
        match self {
            Filter::And(clauses) | Filter::Or(clauses) => clauses,
            Filter::Not(inner) => std::slice::from_ref(&**inner),
            _ => &[],
        }
    }

    /// Append a clause to an And/Or filter.
    pub fn add_clause(&mut self, filter: Filter) -> Result<()> {
        match self {
            Filter::And(clauses) | Filter::Or(clauses) => {
                clauses.push(filter);
                Ok(())
            }
            other => Err(FilterError::Invalid(format!(
                "{} does not take clauses",
                other.kind().name()
            ))),
        }
    }

    /// Replace the negated filter of a Not.
    pub fn set_filter(&mut self, filter: Filter) -> Result<()> {
        match self {
            Filter::Not(inner) => {
                **inner = filter;
                Ok(())
            }
            other => Err(FilterError::Invalid(format!(
                "{} has no negated filter",
                other.kind().name()
            ))),
        }
    }

    /// Descriptive projection for logging and tests. Not a wire format.
    pub fn json(&self) -> Value {
        let kind = self.kind().name();
        match self {
            Filter::Empty => json!({ "type": kind }),
            Filter::And(clauses) | Filter::Or(clauses) => json!({
                "type": kind,
                "filters": clauses.iter().map(Filter::json).collect::<Vec<_>>(),
            }),
            Filter::Not(inner) => json!({ "type": kind, "filter": inner.json() }),
            Filter::Equality(ava)
            | Filter::GreaterOrEqual(ava)
            | Filter::LessOrEqual(ava)
            | Filter::Approximate(ava) => json!({
                "type": kind,
                "attribute": ava.attribute,
                "value": ava.value_str(),
            }),
            Filter::Presence(attr) => json!({ "type": kind, "attribute": attr }),
            Filter::Substring(s) => json!({
                "type": kind,
                "attribute": s.attribute,
                "initial": s.initial.as_deref().map(String::from_utf8_lossy),
                "any": s.any.iter().map(|a| String::from_utf8_lossy(a)).collect::<Vec<_>>(),
                "final": s.final_.as_deref().map(String::from_utf8_lossy),
            }),
            Filter::Extensible(ext) => {
                let mut value = json!({
                    "type": kind,
                    "matchRule": ext.rule,
                    "matchType": ext.match_type,
                    "matchValue": ext.value_str(),
                    "dnAttributes": ext.dn_attributes,
                });
                if let Some(view) = ext.substrings.as_ref().filter(|v| !v.is_empty()) {
                    value["initial"] = json!(view.initial.as_deref().map(String::from_utf8_lossy));
                    value["any"] = json!(view
                        .any
                        .iter()
                        .map(|a| String::from_utf8_lossy(a))
                        .collect::<Vec<_>>());
                    value["final"] = json!(view.final_.as_deref().map(String::from_utf8_lossy));
                }
                value
            }
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Empty => f.write_str("()"),
            Filter::And(clauses) => {
                f.write_str("(&")?;
                for clause in clauses {
                    write!(f, "{}", clause)?;
                }
                f.write_str(")")
            }
            Filter::Or(clauses) => {
                f.write_str("(|")?;
                for clause in clauses {
                    write!(f, "{}", clause)?;
                }
                f.write_str(")")
            }
            Filter::Not(inner) => write!(f, "(!{})", inner),
            Filter::Equality(ava) => write_ava(f, ava, "="),
            Filter::GreaterOrEqual(ava) => write_ava(f, ava, ">="),
            Filter::LessOrEqual(ava) => write_ava(f, ava, "<="),
            Filter::Approximate(ava) => write_ava(f, ava, "~="),
            Filter::Presence(attr) => write!(f, "({}=*)", escape(attr)),
            Filter::Substring(s) => {
                write!(f, "({}=", escape(&s.attribute))?;
                if let Some(initial) = &s.initial {
                    f.write_str(&escape(initial))?;
                }
                f.write_str("*")?;
                for any in &s.any {
                    write!(f, "{}*", escape(any))?;
                }
                if let Some(final_) = &s.final_ {
                    f.write_str(&escape(final_))?;
                }
                f.write_str(")")
            }
            Filter::Extensible(ext) => {
                f.write_str("(")?;
                if let Some(match_type) = &ext.match_type {
                    f.write_str(&escape(match_type))?;
                }
                if ext.dn_attributes {
                    f.write_str(":dn")?;
                }
                if let Some(rule) = &ext.rule {
                    write!(f, ":{}", escape(rule))?;
                }
                write!(f, ":={})", escape(&ext.value))
            }
        }
    }
}

fn write_ava(f: &mut fmt::Formatter<'_>, ava: &AttributeValueAssertion, op: &str) -> fmt::Result {
    write!(f, "({}{}{})", escape(&ava.attribute), op, escape(&ava.value))
}
