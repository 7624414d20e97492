//! Key Hasher - turns a logical parameter mapping into a stable cache key.
//!
//! Canonicalization rule: drop entries whose value is null/undefined/empty
//! string, sort the remaining keys lexicographically, join as `key:value`
//! pairs separated by `|`, then SHA-256 the result and hex-encode it.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// A parameter value, with an unambiguous textual form for canonicalization.
///
/// `"1"` (a `Text`) and `1` (a `Number`) hash to different keys even though
/// their textual forms look similar in isolation. The variant tag is folded
/// into the canonical string via the `Display` impl below, which renders
/// each variant with a distinct, unambiguous literal form.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Null,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl ParamValue {
    fn is_empty(&self) -> bool {
        match self {
            ParamValue::Null => true,
            ParamValue::Text(s) => s.is_empty(),
            ParamValue::Number(_) | ParamValue::Bool(_) => false,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => write!(f, "null"),
            ParamValue::Text(s) => write!(f, "s:{s}"),
            ParamValue::Number(n) => write!(f, "n:{n}"),
            ParamValue::Bool(b) => write!(f, "b:{b}"),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ParamValue::Null)
    }
}

/// Canonicalize `params` into the stable string described above.
///
/// Two mappings whose non-empty entries agree, regardless of insertion
/// order, produce the same canonical string.
pub fn canonicalize(params: &BTreeMap<String, ParamValue>) -> String {
    params
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{k}:{v}"))
        .collect::<Vec<_>>()
        .join("|")
}

/// Generate a cache key: `scope_prefix` followed by the hex SHA-256 digest of
/// the canonical parameter string.
pub fn generate_key(scope_prefix: &str, params: &BTreeMap<String, ParamValue>) -> String {
    let canonical = canonicalize(params);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();
    let mut key = String::with_capacity(scope_prefix.len() + digest.len() * 2);
    key.push_str(scope_prefix);
    for byte in digest {
        key.push_str(&format!("{byte:02x}"));
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, ParamValue)]) -> BTreeMap<String, ParamValue> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn stable_regardless_of_insertion_order() {
        let a = map(&[
            ("cep", ParamValue::from("01310-100")),
            ("country", ParamValue::from("BR")),
        ]);
        let b = map(&[
            ("country", ParamValue::from("BR")),
            ("cep", ParamValue::from("01310-100")),
        ]);
        assert_eq!(
            generate_key("cache:cep:", &a),
            generate_key("cache:cep:", &b)
        );
    }

    #[test]
    fn empty_and_null_entries_are_filtered() {
        let a = map(&[("cep", ParamValue::from("01310-100"))]);
        let b = map(&[
            ("cep", ParamValue::from("01310-100")),
            ("note", ParamValue::Null),
            ("extra", ParamValue::from("")),
        ]);
        assert_eq!(
            generate_key("cache:cep:", &a),
            generate_key("cache:cep:", &b)
        );
    }

    #[test]
    fn distinct_types_produce_distinct_keys() {
        let a = map(&[("page", ParamValue::Text("1".to_string()))]);
        let b = map(&[("page", ParamValue::Number(1.0))]);
        assert_ne!(
            generate_key("cache:x:", &a),
            generate_key("cache:x:", &b)
        );
    }

    #[test]
    fn prefix_is_preserved_verbatim() {
        let a = map(&[("cep", ParamValue::from("01310-100"))]);
        let key = generate_key("cache:geocoding:", &a);
        assert!(key.starts_with("cache:geocoding:"));
        assert_eq!(key.len(), "cache:geocoding:".len() + 64);
    }
}
