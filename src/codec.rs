// RFC 4511 section 4.5.1 BER encoding of search filters.

use crate::ber::{BerReader, BerWriter, TAG_OCTET_STRING, TAG_SEQUENCE};
use crate::error::{FilterError, Result};
use crate::filter::{
    AttributeValueAssertion, ExtensibleFilter, Filter, FilterKind, SubstringFilter,
};
use tracing::debug;

// SubstringFilter.substrings CHOICE
const SUBSTR_INITIAL: u8 = 0x80;
const SUBSTR_ANY: u8 = 0x81;
const SUBSTR_FINAL: u8 = 0x82;

// MatchingRuleAssertion fields
const EXT_RULE: u8 = 0x81;
const EXT_TYPE: u8 = 0x82;
const EXT_VALUE: u8 = 0x83;
const EXT_DN_ATTRIBUTES: u8 = 0x84;

impl Filter {
    /// Encode as a complete BER filter element.
    pub fn to_ber(&self) -> Vec<u8> {
        let mut writer = BerWriter::new();
        encode_filter(&mut writer, self);
        writer.into_vec()
    }

    /// Decode one BER filter element. The buffer must hold exactly one
    /// element.
    pub fn from_ber(data: &[u8]) -> Result<Filter> {
        Self::decode_top(data, usize::MAX)
    }

    /// Like [`Filter::from_ber`], but refuses to descend past `max_depth`
    /// levels of nesting. A leaf counts as one level, as in
    /// [`Filter::depth`].
    pub fn from_ber_limited(data: &[u8], max_depth: usize) -> Result<Filter> {
        Self::decode_top(data, max_depth)
    }

    fn decode_top(data: &[u8], max_depth: usize) -> Result<Filter> {
        debug!("Decoding BER filter ({} bytes)", data.len());
        let mut reader = BerReader::new(data);
        let result = decode_filter_limited(&mut reader, max_depth).and_then(|filter| {
            expect_consumed(&reader)?;
            Ok(filter)
        });
        if let Err(ref e) = result {
            debug!("Rejected BER filter: {}", e);
        }
        result
    }

    /// Decode a BER filter element that must be of the given kind.
    pub fn from_ber_as(kind: FilterKind, data: &[u8]) -> Result<Filter> {
        let mut reader = BerReader::new(data);
        let tag = reader.read_sequence()?;
        if tag != kind.tag() {
            return Err(FilterError::TagMismatch {
                context: kind.name(),
                expected: kind.tag(),
                found: tag,
            });
        }
        let filter = decode_body(&mut reader, kind, usize::MAX)?;
        expect_consumed(&reader)?;
        Ok(filter)
    }
}

fn expect_consumed(reader: &BerReader<'_>) -> Result<()> {
    match reader.remaining() {
        0 => Ok(()),
        n => Err(FilterError::ber(format!("{} trailing bytes after filter", n))),
    }
}

pub fn encode_filter(writer: &mut BerWriter, filter: &Filter) {
    match filter {
        Filter::Empty => {
            writer.start_sequence(TAG_SEQUENCE);
            writer.write_null();
            writer.end_sequence();
        }
        Filter::And(clauses) | Filter::Or(clauses) => {
            writer.start_sequence(filter.tag());
            for clause in clauses {
                encode_filter(writer, clause);
            }
            writer.end_sequence();
        }
        Filter::Not(inner) => {
            writer.start_sequence(filter.tag());
            encode_filter(writer, inner);
            writer.end_sequence();
        }
        Filter::Equality(ava)
        | Filter::GreaterOrEqual(ava)
        | Filter::LessOrEqual(ava)
        | Filter::Approximate(ava) => {
            writer.start_sequence(filter.tag());
            writer.write_string(&ava.attribute);
            writer.write_octet_string(TAG_OCTET_STRING, &ava.value);
            writer.end_sequence();
        }
        Filter::Presence(attr) => {
            writer.write_octet_string(filter.tag(), attr.as_bytes());
        }
        Filter::Substring(s) => {
            writer.start_sequence(filter.tag());
            writer.write_string(&s.attribute);
            writer.start_sequence(TAG_SEQUENCE);
            if let Some(initial) = &s.initial {
                writer.write_octet_string(SUBSTR_INITIAL, initial);
            }
            for any in &s.any {
                writer.write_octet_string(SUBSTR_ANY, any);
            }
            if let Some(final_) = &s.final_ {
                writer.write_octet_string(SUBSTR_FINAL, final_);
            }
            writer.end_sequence();
            writer.end_sequence();
        }
        Filter::Extensible(ext) => {
            writer.start_sequence(filter.tag());
            if let Some(rule) = &ext.rule {
                writer.write_octet_string(EXT_RULE, rule.as_bytes());
            }
            if let Some(match_type) = &ext.match_type {
                writer.write_octet_string(EXT_TYPE, match_type.as_bytes());
            }
            writer.write_octet_string(EXT_VALUE, &ext.value);
            if ext.dn_attributes {
                writer.write_boolean(EXT_DN_ATTRIBUTES, true);
            }
            writer.end_sequence();
        }
    }
}

/// Decode the filter element at the reader's position.
pub fn decode_filter(reader: &mut BerReader<'_>) -> Result<Filter> {
    decode_filter_limited(reader, usize::MAX)
}

/// Decode the filter element at the reader's position, failing once more
/// than `depth` levels of nesting have been entered.
pub fn decode_filter_limited(reader: &mut BerReader<'_>, depth: usize) -> Result<Filter> {
    if depth == 0 {
        return Err(FilterError::ber(format!(
            "filter nesting exceeds max depth at offset {}",
            reader.offset()
        )));
    }
    let tag = reader.read_sequence()?;
    let kind = FilterKind::try_from(tag)?;
    decode_body(reader, kind, depth)
}

/// Decode the content of an element whose header was just read. `depth`
/// counts the levels still allowed, this one included.
fn decode_body(reader: &mut BerReader<'_>, kind: FilterKind, depth: usize) -> Result<Filter> {
    let end = reader.offset() + reader.length();

    let filter = match kind {
        FilterKind::Empty => {
            reader.read_null()?;
            Filter::Empty
        }
        FilterKind::And | FilterKind::Or => {
            let mut clauses = Vec::new();
            while reader.offset() < end {
                clauses.push(decode_filter_limited(reader, depth - 1)?);
            }
            if kind == FilterKind::And {
                Filter::And(clauses)
            } else {
                Filter::Or(clauses)
            }
        }
        FilterKind::Not => {
            if reader.offset() >= end {
                return Err(FilterError::ber("NotFilter requires exactly one filter"));
            }
            Filter::not(decode_filter_limited(reader, depth - 1)?)
        }
        FilterKind::Equality => Filter::Equality(decode_ava(reader)?),
        FilterKind::GreaterOrEqual => Filter::GreaterOrEqual(decode_ava(reader)?),
        FilterKind::LessOrEqual => Filter::LessOrEqual(decode_ava(reader)?),
        FilterKind::Approximate => Filter::Approximate(decode_ava(reader)?),
        FilterKind::Presence => {
            let length = reader.length();
            let bytes = reader.read_raw_bytes(length)?;
            let attr = std::str::from_utf8(bytes)
                .map_err(|_| FilterError::ber("presence attribute is not valid UTF-8"))?;
            Filter::presence(attr).map_err(invalid_as_ber)?
        }
        FilterKind::Substring => Filter::Substring(decode_substring(reader)?),
        FilterKind::Extensible => Filter::Extensible(decode_extensible(reader, end)?),
    };

    if reader.offset() != end {
        return Err(FilterError::ber(format!(
            "{} content length mismatch: envelope ends at {}, content ends at {}",
            kind.name(),
            end,
            reader.offset()
        )));
    }
    Ok(filter)
}

fn decode_ava(reader: &mut BerReader<'_>) -> Result<AttributeValueAssertion> {
    let attribute = reader.read_string(TAG_OCTET_STRING, "attribute")?;
    let value = reader.read_octet_string(TAG_OCTET_STRING, "value")?;
    Ok(AttributeValueAssertion { attribute, value })
}

fn decode_substring(reader: &mut BerReader<'_>) -> Result<SubstringFilter> {
    let mut filter = SubstringFilter::new(reader.read_string(TAG_OCTET_STRING, "attribute")?);
    let length = reader.expect_sequence(TAG_SEQUENCE, "substrings")?;
    let end = reader.offset() + length;

    while reader.offset() < end {
        let tag = reader.read_sequence()?;
        let length = reader.length();
        let fragment = reader.read_raw_bytes(length)?.to_vec();
        let seen_any = filter.initial.is_some() || !filter.any.is_empty();
        if filter.final_.is_some() {
            return Err(FilterError::ber("substring final must be the last fragment"));
        }
        match tag {
            SUBSTR_INITIAL if seen_any => {
                return Err(FilterError::ber("substring initial must be the first fragment"));
            }
            SUBSTR_INITIAL => filter.initial = Some(fragment),
            SUBSTR_ANY => filter.any.push(fragment),
            SUBSTR_FINAL => filter.final_ = Some(fragment),
            other => {
                return Err(FilterError::ber(format!(
                    "invalid substring fragment tag: 0x{:02x}",
                    other
                )));
            }
        }
    }

    if reader.offset() != end {
        return Err(FilterError::ber("substring fragments overrun their sequence"));
    }
    Ok(filter)
}

fn decode_extensible(reader: &mut BerReader<'_>, end: usize) -> Result<ExtensibleFilter> {
    let mut ext = ExtensibleFilter::default();
    let mut value = None;
    let mut last_tag = 0u8;

    while reader.offset() < end {
        let tag = reader
            .peek_tag()
            .ok_or_else(|| FilterError::ber("BER truncated: missing tag"))?;
        if tag <= last_tag {
            return Err(FilterError::ber(format!(
                "extensible field 0x{:02x} out of order",
                tag
            )));
        }
        last_tag = tag;

        match tag {
            EXT_RULE => ext.rule = Some(reader.read_string(EXT_RULE, "matchingRule")?),
            EXT_TYPE => ext.match_type = Some(reader.read_string(EXT_TYPE, "type")?),
            EXT_VALUE => value = Some(reader.read_octet_string(EXT_VALUE, "matchValue")?),
            EXT_DN_ATTRIBUTES => {
                ext.dn_attributes = reader.read_boolean(EXT_DN_ATTRIBUTES, "dnAttributes")?
            }
            other => {
                return Err(FilterError::ber(format!(
                    "invalid extensible field tag: 0x{:02x}",
                    other
                )));
            }
        }
    }

    ext.value = value.ok_or_else(|| FilterError::ber("extensible filter is missing matchValue"))?;
    ext.validate().map_err(invalid_as_ber)?;
    Ok(ext)
}

fn invalid_as_ber(e: FilterError) -> FilterError {
    match e {
        FilterError::Invalid(msg) => FilterError::Ber(msg),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_equality() {
        let f = Filter::equality("foo", "bar");
        assert_eq!(
            f.to_ber(),
            vec![0xA3, 0x0A, 0x04, 0x03, b'f', b'o', b'o', 0x04, 0x03, b'b', b'a', b'r']
        );
    }

    #[test]
    fn test_empty_filter_bytes() {
        assert_eq!(Filter::Empty.to_ber(), vec![0x30, 0x02, 0x05, 0x00]);
        assert_eq!(Filter::from_ber(&[0x30, 0x02, 0x05, 0x00]).unwrap(), Filter::Empty);
    }

    #[test]
    fn test_encode_presence() {
        let f = Filter::presence("foo").unwrap();
        assert_eq!(f.to_ber(), vec![0x87, 0x03, b'f', b'o', b'o']);
        assert_eq!(Filter::from_ber(&f.to_ber()).unwrap(), f);
    }

    #[test]
    fn test_encode_substring() {
        let f = Filter::substring(SubstringFilter::new("foo").with_initial("bar"));
        assert_eq!(
            f.to_ber(),
            vec![
                0xA4, 0x0C, 0x04, 0x03, b'f', b'o', b'o', 0x30, 0x05, 0x80, 0x03, b'b', b'a',
                b'r'
            ]
        );
    }

    #[test]
    fn test_encode_extensible() {
        let f = Filter::extensible(
            ExtensibleFilter::new("x")
                .with_match_type("cn")
                .with_rule("1.2")
                .with_dn_attributes(true),
        )
        .unwrap();
        assert_eq!(
            f.to_ber(),
            vec![
                0xA9, 0x0F, 0x81, 0x03, b'1', b'.', b'2', 0x82, 0x02, b'c', b'n', 0x83, 0x01,
                b'x', 0x84, 0x01, 0xFF
            ]
        );
        assert_eq!(Filter::from_ber(&f.to_ber()).unwrap(), f);
    }

    #[test]
    fn test_extensible_omits_false_dn_attributes() {
        let f = Filter::extensible(ExtensibleFilter::new("x").with_match_type("cn")).unwrap();
        assert_eq!(f.to_ber(), vec![0xA9, 0x07, 0x82, 0x02, b'c', b'n', 0x83, 0x01, b'x']);
    }

    #[test]
    fn test_decode_empty_and_or() {
        assert_eq!(Filter::from_ber(&[0xA0, 0x00]).unwrap(), Filter::and(vec![]));
        assert_eq!(Filter::from_ber(&[0xA1, 0x00]).unwrap(), Filter::or(vec![]));
    }

    #[test]
    fn test_roundtrip_nested() {
        let f = Filter::and(vec![
            Filter::equality("objectClass", "person"),
            Filter::or(vec![
                Filter::presence("mail").unwrap(),
                Filter::greater_or_equal("uidNumber", "1000"),
                Filter::less_or_equal("uidNumber", "2000"),
                Filter::approximate("sn", "smith"),
            ]),
            Filter::not(Filter::substring(
                SubstringFilter::new("cn")
                    .with_initial("a")
                    .with_any("b")
                    .with_any("")
                    .with_final("c"),
            )),
        ]);
        assert_eq!(Filter::from_ber(&f.to_ber()).unwrap(), f);
    }

    #[test]
    fn test_roundtrip_long_value() {
        let value = vec![b'z'; 200];
        let f = Filter::equality("description", value.clone());
        let ber = f.to_ber();
        // 2 + 11 + 3 + 200 content bytes, long-form outer length
        assert_eq!(&ber[..3], &[0xA3, 0x81, 0xD8]);
        assert_eq!(Filter::from_ber(&ber).unwrap(), f);
    }

    #[test]
    fn test_roundtrip_binary_value() {
        let f = Filter::equality("objectGUID", vec![0x00, 0xFF, 0x28, 0x29]);
        assert_eq!(Filter::from_ber(&f.to_ber()).unwrap(), f);
    }

    #[test]
    fn test_decode_as_tag_mismatch() {
        let ber = Filter::greater_or_equal("foo", "1").to_ber();
        let err = Filter::from_ber_as(FilterKind::Equality, &ber).unwrap_err();
        assert_eq!(
            err,
            FilterError::TagMismatch {
                context: "EqualityFilter",
                expected: 0xA3,
                found: 0xA5
            }
        );
        assert_eq!(err.to_string(), "expected EqualityFilter tag 0xa3, got 0xa5");
        assert_eq!(
            Filter::from_ber_as(FilterKind::GreaterOrEqual, &ber).unwrap(),
            Filter::greater_or_equal("foo", "1")
        );
    }

    #[test]
    fn test_decode_inner_tag_mismatch() {
        // value tagged 0x05 instead of OCTET STRING
        let ber = [0xA3, 0x07, 0x04, 0x01, b'a', 0x05, 0x02, b'b', b'c'];
        let err = Filter::from_ber(&ber).unwrap_err();
        assert_eq!(err.to_string(), "expected value tag 0x04, got 0x05");
    }

    #[test]
    fn test_decode_unknown_tag() {
        let err = Filter::from_ber(&[0xAB, 0x00]).unwrap_err();
        assert_eq!(err.to_string(), "invalid BER filter: invalid search filter type: 0xab");
    }

    #[test]
    fn test_decode_truncated() {
        let ber = Filter::equality("foo", "bar").to_ber();
        for n in 0..ber.len() {
            assert!(Filter::from_ber(&ber[..n]).is_err(), "prefix of {} bytes", n);
        }
    }

    #[test]
    fn test_decode_trailing_bytes() {
        let mut ber = Filter::presence("cn").unwrap().to_ber();
        ber.push(0x00);
        assert!(Filter::from_ber(&ber).is_err());
    }

    #[test]
    fn test_decode_length_mismatch() {
        // AVA envelope claims one extra byte beyond its two octet strings
        let ber = [0xA3, 0x07, 0x04, 0x01, b'a', 0x04, 0x01, b'b', 0x00];
        assert!(Filter::from_ber(&ber).is_err());
    }

    #[test]
    fn test_decode_presence_requires_attribute() {
        assert!(matches!(Filter::from_ber(&[0x87, 0x00]), Err(FilterError::Ber(_))));
    }

    #[test]
    fn test_decode_not_requires_child() {
        assert!(Filter::from_ber(&[0xA2, 0x00]).is_err());
        let two = [0xA2, 0x0A, 0x87, 0x03, b'f', b'o', b'o', 0x87, 0x03, b'b', b'a', b'r'];
        assert!(Filter::from_ber(&two).is_err());
    }

    #[test]
    fn test_decode_substring_order() {
        // final before initial
        let ber = [
            0xA4, 0x0C, 0x04, 0x01, b'a', 0x30, 0x07, 0x82, 0x01, b'x', 0x80, 0x02, b'y', b'z',
        ];
        assert!(Filter::from_ber(&ber).is_err());
        // initial after any
        let ber = [
            0xA4, 0x0B, 0x04, 0x01, b'a', 0x30, 0x06, 0x81, 0x01, b'x', 0x80, 0x01, b'y',
        ];
        assert!(Filter::from_ber(&ber).is_err());
        // two finals
        let ber = [
            0xA4, 0x0B, 0x04, 0x01, b'a', 0x30, 0x06, 0x82, 0x01, b'x', 0x82, 0x01, b'y',
        ];
        assert!(Filter::from_ber(&ber).is_err());
    }

    #[test]
    fn test_decode_extensible_requires_value() {
        let ber = [0xA9, 0x04, 0x82, 0x02, b'c', b'n'];
        let err = Filter::from_ber(&ber).unwrap_err();
        assert!(err.to_string().contains("matchValue"));
    }

    #[test]
    fn test_decode_extensible_requires_type_or_rule() {
        let ber = [0xA9, 0x03, 0x83, 0x01, b'x'];
        assert!(matches!(Filter::from_ber(&ber), Err(FilterError::Ber(_))));
    }

    #[test]
    fn test_decode_extensible_field_order() {
        let ber = [0xA9, 0x07, 0x83, 0x01, b'x', 0x82, 0x02, b'c', b'n'];
        assert!(Filter::from_ber(&ber).is_err());
    }

    #[test]
    fn test_decode_limited_depth() {
        let f = Filter::parse("(&(a=b)(!(c=d)))").unwrap();
        let bytes = f.to_ber();
        assert_eq!(Filter::from_ber_limited(&bytes, 3).unwrap(), f);
        let err = Filter::from_ber_limited(&bytes, 2).unwrap_err();
        assert!(matches!(err, FilterError::Ber(_)));
        assert!(Filter::from_ber_limited(&bytes, 0).is_err());
    }

    #[test]
    fn test_decode_limited_stops_deep_nesting() {
        // 5,000 nested NotFilter envelopes around (a=*).
        let mut bytes = vec![0x87, 0x01, b'a'];
        for _ in 0..5_000 {
            let mut writer = BerWriter::new();
            writer.start_sequence(0xA2);
            writer.append_buffer(&bytes);
            writer.end_sequence();
            bytes = writer.into_vec();
        }
        let err = Filter::from_ber_limited(&bytes, 64).unwrap_err();
        assert!(err.to_string().contains("max depth"), "{}", err);
    }

    #[test]
    fn test_parsed_text_roundtrips_through_ber() {
        for text in [
            "(&(objectClass=person)(!(objectClass=shadowAccount)))",
            "(|(cn=a*b*c)(sn=*x)(mail=*))",
            "(sn:dn:2.4.6.8.10:=Barney Rubble)",
            "(foo=bar\\28\\29)",
        ] {
            let f = Filter::parse(text).unwrap();
            let decoded = Filter::from_ber(&f.to_ber()).unwrap();
            assert_eq!(decoded, f, "{}", text);
            assert_eq!(decoded.to_string(), f.to_string());
        }
    }
}
