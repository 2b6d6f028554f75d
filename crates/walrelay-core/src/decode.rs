//! Column decoding: raw tuple values to typed [`Value`]s.
//!
//! Decoding never fails. A value that does not parse as its declared type
//! is kept as its raw text and a warning is logged, so one malformed value
//! cannot abort a transaction's event stream.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use tracing::{debug, warn};

use crate::relation::RelationColumn;
use crate::types::Value;

/// PostgreSQL type OIDs with a dedicated decoding rule.
pub mod oid {
    pub const BOOL: u32 = 16;
    pub const CHAR: u32 = 18;
    pub const NAME: u32 = 19;
    pub const INT8: u32 = 20;
    pub const INT2: u32 = 21;
    pub const INT4: u32 = 23;
    pub const TEXT: u32 = 25;
    pub const OID: u32 = 26;
    pub const JSON: u32 = 114;
    pub const FLOAT4: u32 = 700;
    pub const FLOAT8: u32 = 701;
    pub const BPCHAR: u32 = 1042;
    pub const VARCHAR: u32 = 1043;
    pub const DATE: u32 = 1082;
    pub const TIMESTAMP: u32 = 1114;
    pub const TIMESTAMPTZ: u32 = 1184;
    pub const NUMERIC: u32 = 1700;
    pub const UUID: u32 = 2950;
    pub const JSONB: u32 = 3802;

    pub const BOOL_ARRAY: u32 = 1000;
    pub const INT2_ARRAY: u32 = 1005;
    pub const INT4_ARRAY: u32 = 1007;
    pub const TEXT_ARRAY: u32 = 1009;
    pub const VARCHAR_ARRAY: u32 = 1015;
    pub const INT8_ARRAY: u32 = 1016;
    pub const FLOAT4_ARRAY: u32 = 1021;
    pub const FLOAT8_ARRAY: u32 = 1022;
    pub const NUMERIC_ARRAY: u32 = 1231;
    pub const UUID_ARRAY: u32 = 2951;

    /// Element type of a supported one-dimensional array type.
    pub fn array_element(type_oid: u32) -> Option<u32> {
        Some(match type_oid {
            BOOL_ARRAY => BOOL,
            INT2_ARRAY => INT2,
            INT4_ARRAY => INT4,
            TEXT_ARRAY => TEXT,
            VARCHAR_ARRAY => VARCHAR,
            INT8_ARRAY => INT8,
            FLOAT4_ARRAY => FLOAT4,
            FLOAT8_ARRAY => FLOAT8,
            NUMERIC_ARRAY => NUMERIC,
            UUID_ARRAY => UUID,
            _ => return None,
        })
    }

    pub fn is_known(type_oid: u32) -> bool {
        matches!(
            type_oid,
            BOOL | CHAR
                | NAME
                | INT8
                | INT2
                | INT4
                | TEXT
                | OID
                | JSON
                | FLOAT4
                | FLOAT8
                | BPCHAR
                | VARCHAR
                | DATE
                | TIMESTAMP
                | TIMESTAMPTZ
                | NUMERIC
                | UUID
                | JSONB
        ) || array_element(type_oid).is_some()
    }
}

/// One raw column value as delivered by the replication protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TupleData {
    Null,
    /// Unchanged TOAST value; the server did not send it.
    Unchanged,
    Text(String),
    Binary(Vec<u8>),
}

impl TupleData {
    pub fn text(value: impl Into<String>) -> Self {
        TupleData::Text(value.into())
    }
}

impl From<&str> for TupleData {
    fn from(value: &str) -> Self {
        TupleData::Text(value.to_string())
    }
}

/// Decode one tuple value against its column descriptor.
///
/// Returns `None` for an unchanged TOAST value: there is nothing to report
/// for that column, so it is left out of the action entirely.
pub fn decode_column(tuple: &TupleData, column: &RelationColumn) -> Option<Value> {
    match tuple {
        TupleData::Null => Some(Value::Null),
        TupleData::Unchanged => None,
        TupleData::Binary(bytes) => Some(Value::String(format!("\\x{}", hex::encode(bytes)))),
        TupleData::Text(raw) => {
            if !oid::is_known(column.type_oid) {
                debug!(
                    column = %column.name,
                    type_oid = column.type_oid,
                    "unknown column type, keeping text value"
                );
            }

            let value = parse_text(raw, column.type_oid).unwrap_or_else(|reason| {
                warn!(
                    column = %column.name,
                    type_oid = column.type_oid,
                    error = %reason,
                    "column value decode fallback"
                );
                Value::String(raw.clone())
            });
            Some(value)
        }
    }
}

/// Parse a text-format value based on its PostgreSQL type OID.
///
/// `Err` carries the reason a value of a known type did not parse.
pub fn parse_text(raw: &str, type_oid: u32) -> Result<Value, String> {
    if let Some(element_oid) = oid::array_element(type_oid) {
        return parse_array(raw, element_oid);
    }

    match type_oid {
        oid::BOOL => match raw {
            "t" | "true" => Ok(Value::Bool(true)),
            "f" | "false" => Ok(Value::Bool(false)),
            _ => Err(format!("invalid boolean literal '{raw}'")),
        },
        oid::INT2 | oid::INT4 | oid::INT8 | oid::OID => {
            raw.parse::<i64>().map(Value::Int).map_err(|e| e.to_string())
        }
        oid::FLOAT4 | oid::FLOAT8 => {
            let f = raw.parse::<f64>().map_err(|e| e.to_string())?;
            // NaN and the infinities have no JSON number form
            Ok(if f.is_finite() {
                Value::Float(f)
            } else {
                Value::String(raw.to_string())
            })
        }
        oid::NUMERIC => Ok(match raw.parse::<f64>() {
            Ok(f) if f.is_finite() => Value::Float(f),
            _ => Value::String(raw.to_string()),
        }),
        oid::JSON | oid::JSONB => serde_json::from_str::<serde_json::Value>(raw)
            .map(Value::from)
            .map_err(|e| e.to_string()),
        oid::TIMESTAMPTZ => parse_timestamptz(raw),
        oid::TIMESTAMP => parse_timestamp(raw),
        oid::DATE => parse_date(raw),
        oid::UUID => uuid::Uuid::parse_str(raw)
            .map(|u| Value::String(u.to_string()))
            .map_err(|e| e.to_string()),
        _ => Ok(Value::String(raw.to_string())),
    }
}

fn is_infinity(raw: &str) -> bool {
    raw == "infinity" || raw == "-infinity"
}

fn parse_timestamptz(raw: &str) -> Result<Value, String> {
    if is_infinity(raw) {
        return Ok(Value::String(raw.to_string()));
    }

    DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| {
            Value::String(
                dt.with_timezone(&Utc)
                    .to_rfc3339_opts(SecondsFormat::AutoSi, true),
            )
        })
        .map_err(|e| e.to_string())
}

fn parse_timestamp(raw: &str) -> Result<Value, String> {
    if is_infinity(raw) {
        return Ok(Value::String(raw.to_string()));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|dt| Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
        .map_err(|e| e.to_string())
}

fn parse_date(raw: &str) -> Result<Value, String> {
    if is_infinity(raw) {
        return Ok(Value::String(raw.to_string()));
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
        .map_err(|e| e.to_string())
}

/// Parse a one-dimensional array literal such as `{1,2,NULL}` or
/// `{"a b","c\"d"}`.
fn parse_array(raw: &str, element_oid: u32) -> Result<Value, String> {
    let inner = raw
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .ok_or_else(|| format!("not an array literal '{raw}'"))?;

    if inner.is_empty() {
        return Ok(Value::Array(Vec::new()));
    }

    let mut items = Vec::new();
    let mut chars = inner.chars().peekable();

    loop {
        let mut element = String::new();
        let quoted = chars.peek() == Some(&'"');

        if quoted {
            chars.next();
            loop {
                match chars.next() {
                    Some('\\') => match chars.next() {
                        Some(c) => element.push(c),
                        None => return Err("unterminated escape in array".into()),
                    },
                    Some('"') => break,
                    Some(c) => element.push(c),
                    None => return Err("unterminated quoted array element".into()),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                match c {
                    ',' => break,
                    '{' | '}' | '"' => {
                        return Err("multi-dimensional or malformed array".into())
                    }
                    _ => {
                        element.push(c);
                        chars.next();
                    }
                }
            }
        }

        if !quoted && element.eq_ignore_ascii_case("NULL") {
            items.push(Value::Null);
        } else {
            items.push(parse_text(&element, element_oid)?);
        }

        match chars.next() {
            Some(',') => continue,
            None => break,
            Some(c) => return Err(format!("unexpected '{c}' after array element")),
        }
    }

    Ok(Value::Array(items))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(type_oid: u32) -> RelationColumn {
        RelationColumn::new("c", type_oid)
    }

    fn decode(raw: &str, type_oid: u32) -> Value {
        decode_column(&TupleData::text(raw), &column(type_oid)).unwrap()
    }

    #[test]
    fn test_null_decodes_to_null_for_any_type() {
        for type_oid in [oid::BOOL, oid::INT4, oid::JSONB, oid::TIMESTAMPTZ, 999_999] {
            assert_eq!(
                decode_column(&TupleData::Null, &column(type_oid)),
                Some(Value::Null)
            );
        }
    }

    #[test]
    fn test_unchanged_toast_is_omitted() {
        assert_eq!(decode_column(&TupleData::Unchanged, &column(oid::TEXT)), None);
    }

    #[test]
    fn test_scalars() {
        assert_eq!(decode("t", oid::BOOL), Value::Bool(true));
        assert_eq!(decode("f", oid::BOOL), Value::Bool(false));
        assert_eq!(decode("42", oid::INT4), Value::Int(42));
        assert_eq!(decode("-9000000000", oid::INT8), Value::Int(-9_000_000_000));
        assert_eq!(decode("1.5", oid::FLOAT8), Value::Float(1.5));
        assert_eq!(decode("12.25", oid::NUMERIC), Value::Float(12.25));
        assert_eq!(decode("hello", oid::TEXT), Value::String("hello".into()));
        assert_eq!(decode("hi", oid::VARCHAR), Value::String("hi".into()));
    }

    #[test]
    fn test_non_finite_numbers_stay_strings() {
        assert_eq!(decode("NaN", oid::FLOAT8), Value::String("NaN".into()));
        assert_eq!(decode("Infinity", oid::FLOAT4), Value::String("Infinity".into()));
        assert_eq!(decode("NaN", oid::NUMERIC), Value::String("NaN".into()));
    }

    #[test]
    fn test_malformed_values_fall_back_to_raw_text() {
        assert_eq!(decode("abc", oid::INT4), Value::String("abc".into()));
        assert_eq!(decode("maybe", oid::BOOL), Value::String("maybe".into()));
        assert_eq!(decode("{broken", oid::JSONB), Value::String("{broken".into()));
        assert_eq!(decode("not-a-uuid", oid::UUID), Value::String("not-a-uuid".into()));
        assert!(parse_text("abc", oid::INT4).is_err());
    }

    #[test]
    fn test_unknown_type_is_text() {
        assert_eq!(decode("(1,2)", 600), Value::String("(1,2)".into()));
    }

    #[test]
    fn test_json() {
        let value = decode(r#"{"plan": "pro", "seats": 3}"#, oid::JSONB);
        let expected: Value = serde_json::json!({"plan": "pro", "seats": 3}).into();
        assert_eq!(value, expected);
    }

    #[test]
    fn test_temporal_types() {
        assert_eq!(
            decode("2024-01-15 10:30:00+00", oid::TIMESTAMPTZ),
            Value::String("2024-01-15T10:30:00Z".into())
        );
        assert_eq!(
            decode("2024-01-15 12:30:00.123456+02", oid::TIMESTAMPTZ),
            Value::String("2024-01-15T10:30:00.123456Z".into())
        );
        assert_eq!(
            decode("2024-01-15 10:30:00", oid::TIMESTAMP),
            Value::String("2024-01-15T10:30:00".into())
        );
        assert_eq!(
            decode("2024-01-15", oid::DATE),
            Value::String("2024-01-15".into())
        );
        assert_eq!(
            decode("infinity", oid::TIMESTAMPTZ),
            Value::String("infinity".into())
        );
    }

    #[test]
    fn test_uuid_is_normalized() {
        assert_eq!(
            decode("A0EEBC99-9C0B-4EF8-BB6D-6BB9BD380A11", oid::UUID),
            Value::String("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11".into())
        );
    }

    #[test]
    fn test_arrays() {
        assert_eq!(
            decode("{1,2,NULL}", oid::INT4_ARRAY),
            Value::Array(vec![Value::Int(1), Value::Int(2), Value::Null])
        );
        assert_eq!(
            decode(r#"{plain,"with space","quote\"d","NULL"}"#, oid::TEXT_ARRAY),
            Value::Array(vec![
                Value::String("plain".into()),
                Value::String("with space".into()),
                Value::String("quote\"d".into()),
                Value::String("NULL".into()),
            ])
        );
        assert_eq!(decode("{}", oid::BOOL_ARRAY), Value::Array(vec![]));
    }

    #[test]
    fn test_unsupported_arrays_fall_back() {
        assert_eq!(
            decode("{{1,2},{3,4}}", oid::INT4_ARRAY),
            Value::String("{{1,2},{3,4}}".into())
        );
        assert_eq!(decode("{1,x}", oid::INT4_ARRAY), Value::String("{1,x}".into()));
    }

    #[test]
    fn test_binary_is_hex_encoded() {
        let value = decode_column(&TupleData::Binary(vec![0xde, 0xad]), &column(17));
        assert_eq!(value, Some(Value::String("\\xdead".into())));
    }
}
