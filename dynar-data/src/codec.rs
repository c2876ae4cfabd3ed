//! Blob codec: attribute maps to build expressions and back.
//!
//! Writing walks the map and emits a backend build call per nesting level,
//! binding keys and scalar values as parameters. Reading parses the JSON the
//! backend renders for the blob column.
//!
//! Both directions apply the binary-safety transform to every string key
//! and value: strings the JSON text cannot carry (invalid UTF-8, or text that
//! already starts with [`BINARY_PREFIX`]) travel as
//! `BINARY_PREFIX + base64(bytes)`.

use crate::encoder::DynamicEncoder;
use crate::error::DynamicError;
use crate::params::{BoundParams, Expression, ParamValue, Placeholders};
use crate::value::{DynMap, DynValue};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use std::borrow::Cow;

/// Prefix marking a base64-encoded string.
pub const BINARY_PREFIX: &str = "data:application/octet-stream;base64,";

/// Whether `bytes` must be base64-wrapped to survive a JSON round trip.
pub fn needs_binary_safety(bytes: &[u8]) -> bool {
    std::str::from_utf8(bytes).is_err() || bytes.starts_with(BINARY_PREFIX.as_bytes())
}

/// Make `bytes` safe for the encoder's text serialization.
pub fn encode_string(encoder: &dyn DynamicEncoder, bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) if !encoder.needs_binary_safety(bytes) => text.to_string(),
        _ => format!("{BINARY_PREFIX}{}", STANDARD.encode(bytes)),
    }
}

/// Reverse [`encode_string`].
pub fn decode_string(text: &str) -> Result<Bytes, DynamicError> {
    match text.strip_prefix(BINARY_PREFIX) {
        Some(encoded) => STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(|e| DynamicError::Decode(format!("invalid base64 payload: {e}"))),
        None => Ok(Bytes::copy_from_slice(text.as_bytes())),
    }
}

/// Encode `attrs` into a build expression.
///
/// Null values and maps with nothing left to store are pruned. An empty
/// result encodes as the backend's null literal.
pub fn encode(
    encoder: &dyn DynamicEncoder,
    attrs: &DynMap,
    placeholders: &mut Placeholders,
) -> Result<Expression, DynamicError> {
    let mut params = BoundParams::new();
    let sql = match encode_map(encoder, attrs, placeholders, &mut params)? {
        Some(sql) => sql,
        None => encoder.null_literal().to_string(),
    };
    tracing::trace!(
        backend = encoder.name(),
        params = params.len(),
        "encoded dynamic attributes"
    );
    Ok(Expression::new(sql, params))
}

fn encode_map(
    encoder: &dyn DynamicEncoder,
    attrs: &DynMap,
    placeholders: &mut Placeholders,
    params: &mut BoundParams,
) -> Result<Option<String>, DynamicError> {
    let mut args = Vec::new();
    for (key, value) in attrs {
        if is_prunable(value) {
            continue;
        }
        let key_ph = placeholders.next_free(params);
        params.insert(key_ph.clone(), ParamValue::Text(encode_string(encoder, key)));
        args.push(key_ph);

        let arg = match value {
            DynValue::Map(nested) => match encode_map(encoder, nested, placeholders, params)? {
                Some(sql) => sql,
                None => encoder.null_literal().to_string(),
            },
            DynValue::Verbatim(v) => encoder.verbatim(v),
            DynValue::Float(f) => {
                if !f.is_finite() {
                    return Err(DynamicError::NonFiniteFloat {
                        key: String::from_utf8_lossy(key).into_owned(),
                    });
                }
                format!("{f:?}")
            }
            scalar => {
                let value_ph = placeholders.next_free(params);
                params.insert(value_ph.clone(), scalar_param(encoder, scalar));
                value_ph
            }
        };
        args.push(arg);
    }
    if args.is_empty() {
        Ok(None)
    } else {
        Ok(Some(encoder.build_call(&args)))
    }
}

fn is_prunable(value: &DynValue) -> bool {
    match value {
        DynValue::Null => true,
        DynValue::Map(m) => m.values().all(is_prunable),
        _ => false,
    }
}

fn scalar_param(encoder: &dyn DynamicEncoder, value: &DynValue) -> ParamValue {
    match value {
        DynValue::Bool(b) => ParamValue::Bool(*b),
        DynValue::Int(i) => ParamValue::Int(*i),
        DynValue::Str(s) => ParamValue::Text(encode_string(encoder, s)),
        _ => ParamValue::Null,
    }
}

/// Decode the JSON text a backend renders for a blob column.
///
/// Raw control bytes inside string literals (MariaDB's `COLUMN_JSON` leaves
/// them unescaped) are escaped before parsing. Blank input and a JSON `null`
/// decode to an empty map; anything else that is not a JSON object is an
/// error.
pub fn decode(blob: &[u8]) -> Result<DynMap, DynamicError> {
    let repaired = escape_control_bytes(blob);
    if matches!(repaired, Cow::Owned(_)) {
        tracing::warn!("dynamic column blob contained unescaped control bytes");
    }
    if repaired.iter().all(u8::is_ascii_whitespace) {
        return Ok(DynMap::new());
    }
    let json: serde_json::Value =
        serde_json::from_slice(&repaired).map_err(|e| DynamicError::Decode(e.to_string()))?;
    match json {
        serde_json::Value::Null => Ok(DynMap::new()),
        serde_json::Value::Object(_) | serde_json::Value::Array(_) => match from_json(json)? {
            DynValue::Map(map) => Ok(map),
            _ => Err(DynamicError::Decode("expected a JSON object".into())),
        },
        other => Err(DynamicError::Decode(format!(
            "expected a JSON object, found `{other}`"
        ))),
    }
}

fn from_json(json: serde_json::Value) -> Result<DynValue, DynamicError> {
    use serde_json::Value as Json;
    Ok(match json {
        Json::Null => DynValue::Null,
        Json::Bool(b) => DynValue::Bool(b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => DynValue::Int(i),
            None => DynValue::Float(n.as_f64().ok_or_else(|| {
                DynamicError::Decode(format!("number out of range: {n}"))
            })?),
        },
        Json::String(s) => DynValue::Str(decode_string(&s)?),
        Json::Array(items) => {
            let mut map = DynMap::new();
            for (i, item) in items.into_iter().enumerate() {
                map.insert(Bytes::from(i.to_string()), from_json(item)?);
            }
            DynValue::Map(map)
        }
        Json::Object(obj) => {
            let mut map = DynMap::new();
            for (key, value) in obj {
                map.insert(decode_string(&key)?, from_json(value)?);
            }
            DynValue::Map(map)
        }
    })
}

/// Escape bytes 0x00-0x1F that appear inside JSON string literals.
fn escape_control_bytes(blob: &[u8]) -> Cow<'_, [u8]> {
    if !has_raw_control_bytes(blob) {
        return Cow::Borrowed(blob);
    }
    let mut out = Vec::with_capacity(blob.len() + 16);
    let mut scan = StringScan::default();
    for &b in blob {
        if scan.step(b) && b < 0x20 {
            out.extend_from_slice(format!("\\u{b:04x}").as_bytes());
        } else {
            out.push(b);
        }
    }
    Cow::Owned(out)
}

fn has_raw_control_bytes(blob: &[u8]) -> bool {
    let mut scan = StringScan::default();
    blob.iter().any(|&b| scan.step(b) && b < 0x20)
}

/// Tracks whether a byte of JSON text sits inside a string literal.
#[derive(Default)]
struct StringScan {
    in_string: bool,
    escaped: bool,
}

impl StringScan {
    /// Feed one byte. Returns `true` if it is string content that is not
    /// part of an escape sequence.
    fn step(&mut self, b: u8) -> bool {
        if !self.in_string {
            self.in_string = b == b'"';
            return false;
        }
        if self.escaped {
            self.escaped = false;
            return false;
        }
        match b {
            b'\\' => {
                self.escaped = true;
                false
            }
            b'"' => {
                self.in_string = false;
                false
            }
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::MariaEncoder;
    use serde_json::json;

    fn maria() -> &'static dyn DynamicEncoder {
        &MariaEncoder
    }

    #[test]
    fn test_binary_safety_roundtrip() {
        let cases: Vec<Vec<u8>> = vec![
            b"plain".to_vec(),
            b"".to_vec(),
            b"\x00".to_vec(),
            b"asd\xC1\xC2\xC3asd".to_vec(),
            (0u8..=255).collect(),
            format!("{BINARY_PREFIX}This is my string").into_bytes(),
            format!("{BINARY_PREFIX}{}", STANDARD.encode("This is my string")).into_bytes(),
        ];
        for bytes in cases {
            let encoded = encode_string(maria(), &bytes);
            assert_eq!(decode_string(&encoded).unwrap(), Bytes::from(bytes));
        }
    }

    #[test]
    fn test_plain_text_is_untouched() {
        assert_eq!(encode_string(maria(), "black".as_bytes()), "black");
        assert_eq!(encode_string(maria(), "größe\n".as_bytes()), "größe\n");
        assert!(encode_string(maria(), b"\xFF").starts_with(BINARY_PREFIX));
    }

    #[test]
    fn test_prefix_lookalike_is_wrapped() {
        let encoded = encode_string(maria(), BINARY_PREFIX.as_bytes());
        assert_ne!(encoded, BINARY_PREFIX);
        assert_eq!(decode_string(&encoded).unwrap(), BINARY_PREFIX.as_bytes());
    }

    #[test]
    fn test_encode_empty_is_null() {
        let mut ph = Placeholders::new(":dca");
        let expr = encode(maria(), &DynMap::new(), &mut ph).unwrap();
        assert_eq!(expr.sql, "NULL");
        assert!(expr.params.is_empty());
    }

    #[test]
    fn test_encode_prunes_null_and_empty() {
        let attrs = match DynValue::from(json!({"a": null, "b": {}, "c": {"d": null}, "e": 1})) {
            DynValue::Map(m) => m,
            _ => unreachable!(),
        };
        let mut ph = Placeholders::new(":dca");
        let expr = encode(maria(), &attrs, &mut ph).unwrap();
        assert_eq!(expr.sql, "COLUMN_CREATE(:dca1, :dca2)");
        assert_eq!(expr.params.get(":dca1"), Some(&ParamValue::Text("e".into())));
        assert_eq!(expr.params.get(":dca2"), Some(&ParamValue::Int(1)));
    }

    #[test]
    fn test_encode_inlines_floats() {
        let mut attrs = DynMap::new();
        attrs.insert(Bytes::from_static(b"width"), DynValue::Float(123.456));
        let mut ph = Placeholders::new(":dca");
        let expr = encode(maria(), &attrs, &mut ph).unwrap();
        assert_eq!(expr.sql, "COLUMN_CREATE(:dca1, 123.456)");
        assert_eq!(expr.params.len(), 1);
    }

    #[test]
    fn test_encode_rejects_nan() {
        let mut attrs = DynMap::new();
        attrs.insert(Bytes::from_static(b"bad"), DynValue::Float(f64::NAN));
        let err = encode(maria(), &attrs, &mut Placeholders::new(":dca")).unwrap_err();
        assert!(matches!(err, DynamicError::NonFiniteFloat { key } if key == "bad"));
    }

    #[test]
    fn test_decode_repairs_control_bytes() {
        let blob = b"{\"s\":\"a\x00b\x1fc\nd\"}";
        let map = decode(blob).unwrap();
        assert_eq!(
            map.get(&b"s"[..]).and_then(DynValue::as_bytes),
            Some(&b"a\x00b\x1fc\nd"[..])
        );
    }

    #[test]
    fn test_decode_keeps_whitespace_between_tokens() {
        let map = decode(b"{\n\t\"a\": 1,\n\t\"b\": {\"c\": \"x\"}\n}").unwrap();
        assert_eq!(map.get(&b"a"[..]), Some(&DynValue::Int(1)));
    }

    #[test]
    fn test_decode_blank_and_null() {
        assert!(decode(b"").unwrap().is_empty());
        assert!(decode(b"  ").unwrap().is_empty());
        assert!(decode(b"null").unwrap().is_empty());
    }

    #[test]
    fn test_decode_garbage_is_error() {
        assert!(matches!(decode(b"{not json"), Err(DynamicError::Decode(_))));
        assert!(matches!(decode(b"42"), Err(DynamicError::Decode(_))));
    }

    #[test]
    fn test_decode_binary_keys_and_values() {
        let key = encode_string(maria(), b"_x\xE1");
        let value = encode_string(maria(), b"qwert\xD1\xD2\xD3");
        let mut obj = serde_json::Map::new();
        obj.insert(key, json!(value));
        obj.insert("n".into(), json!(1.5));
        let text = serde_json::Value::Object(obj).to_string();
        let map = decode(text.as_bytes()).unwrap();
        assert_eq!(
            map.get(&b"_x\xE1"[..]).and_then(DynValue::as_bytes),
            Some(&b"qwert\xD1\xD2\xD3"[..])
        );
        assert_eq!(map.get(&b"n"[..]), Some(&DynValue::Float(1.5)));
    }
}
