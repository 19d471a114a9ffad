//! Evaluate filters against candidate records.

use crate::attribute::{test_values, Record, Scalar};
use crate::error::{FilterError, Result};
use crate::filter::{AttributeValueAssertion, ExtensibleFilter, Filter, SubstringFilter};
use regex::Regex;
use std::cmp::Ordering;

/// Evaluator for the match kinds whose semantics depend on the directory
/// schema. The default methods refuse to guess.
pub trait Matcher {
    fn approximate(
        &self,
        ava: &AttributeValueAssertion,
        record: &Record,
        strict_case: bool,
    ) -> Result<bool> {
        let _ = (ava, record, strict_case);
        Err(FilterError::NotImplemented("approximate"))
    }

    fn extensible(&self, ext: &ExtensibleFilter, record: &Record, strict_case: bool) -> Result<bool> {
        let _ = (ext, record, strict_case);
        Err(FilterError::NotImplemented("extensible"))
    }
}

/// Matcher used by [`Filter::matches`]: approximate and extensible filters
/// fail with [`FilterError::NotImplemented`].
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedMatcher;

impl Matcher for UnsupportedMatcher {}

impl Filter {
    /// Evaluate against `record`. `strict_case` controls attribute name
    /// lookup only; values are always compared exactly.
    pub fn matches(&self, record: &Record, strict_case: bool) -> Result<bool> {
        self.matches_with(record, strict_case, &UnsupportedMatcher)
    }

    pub fn matches_with(
        &self,
        record: &Record,
        strict_case: bool,
        matcher: &dyn Matcher,
    ) -> Result<bool> {
        match self {
            Filter::Empty => Ok(false),
            Filter::And(clauses) => {
                for clause in clauses {
                    if !clause.matches_with(record, strict_case, matcher)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Filter::Or(clauses) => {
                for clause in clauses {
                    if clause.matches_with(record, strict_case, matcher)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Filter::Not(inner) => Ok(!inner.matches_with(record, strict_case, matcher)?),
            // Equality is exact on bytes, so "01000" does not equal 1000.
            Filter::Equality(ava) => Ok(match_ava(record, ava, strict_case, |v| {
                v.to_bytes() == ava.value
            })),
            Filter::GreaterOrEqual(ava) => Ok(match_ava(record, ava, strict_case, |v| {
                v.compare(&ava.value) != Ordering::Less
            })),
            Filter::LessOrEqual(ava) => Ok(match_ava(record, ava, strict_case, |v| {
                v.compare(&ava.value) != Ordering::Greater
            })),
            Filter::Presence(attr) => Ok(record
                .get(attr, strict_case)
                .is_some_and(|value| !value.is_null())),
            Filter::Substring(s) => match_substring(record, s, strict_case),
            Filter::Approximate(ava) => matcher.approximate(ava, record, strict_case),
            Filter::Extensible(ext) => matcher.extensible(ext, record, strict_case),
        }
    }
}

fn match_ava<F>(record: &Record, ava: &AttributeValueAssertion, strict_case: bool, accept: F) -> bool
where
    F: Fn(&Scalar) -> bool,
{
    record
        .get(&ava.attribute, strict_case)
        .is_some_and(|value| test_values(accept, value, false))
}

fn match_substring(record: &Record, filter: &SubstringFilter, strict_case: bool) -> Result<bool> {
    let Some(value) = record.get(&filter.attribute, strict_case) else {
        return Ok(false);
    };
    let re = substring_regex(filter)?;
    Ok(test_values(|scalar| re.is_match(&scalar.to_string()), value, false))
}

/// `^initial.*any.*...final$`, with every fragment matched literally.
pub fn substring_regex(filter: &SubstringFilter) -> Result<Regex> {
    let mut pattern = String::new();
    if let Some(initial) = &filter.initial {
        pattern.push('^');
        pattern.push_str(&regex::escape(&String::from_utf8_lossy(initial)));
        pattern.push_str(".*");
    }
    for any in &filter.any {
        pattern.push_str(&regex::escape(&String::from_utf8_lossy(any)));
        pattern.push_str(".*");
    }
    if let Some(final_) = &filter.final_ {
        pattern.push_str(&regex::escape(&String::from_utf8_lossy(final_)));
        pattern.push('$');
    }
    Regex::new(&pattern).map_err(|e| FilterError::Invalid(format!("substring pattern: {}", e)))
}
