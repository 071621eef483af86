//! Query-string codec.
//!
//! Serializes [`Params`] to the `?key=value&...` portion of a URL and back.
//! The codec is shaped by three independent axes, mirroring the variety of
//! query conventions in the wild:
//!
//! | Axis | Values | Effect on `tags = ["a", "b"]`, `draft = true`, `ref = Null` |
//! |------|--------|--------------------------------------------------------------|
//! | [`ArrayFormat`] | `None` | `tags=a&tags=b` |
//! | | `Brackets` | `tags[]=a&tags[]=b` |
//! | | `Index` | `tags[0]=a&tags[1]=b` |
//! | | `Comma` | `tags=a,b` |
//! | [`BooleanFormat`] | `None` / `String` | `draft=true` |
//! | | `EmptyTrue` | `draft` |
//! | [`NullFormat`] | `Default` | `ref` |
//! | | `Hidden` | (omitted) |
//!
//! `parse` is the inverse of `build` under the same options: bare keys come
//! back as `Bool(true)` under `EmptyTrue`, otherwise as `Null`; `"true"` /
//! `"false"` values come back as booleans only under `BooleanFormat::String`.
//!
//! # Example
//!
//! ```
//! use wayfarer::params::Params;
//! use wayfarer::query::{build_query, parse_query, QueryOptions};
//!
//! let mut params = Params::new();
//! params.insert("page", "2");
//! params.insert("tags", vec!["rust".to_string(), "router".to_string()]);
//!
//! let options = QueryOptions::default();
//! let query = build_query(&params, &options);
//! assert_eq!(query, "page=2&tags=rust&tags=router");
//! assert_eq!(parse_query(&query, &options), params);
//! ```

use crate::params::{ParamValue, Params};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// How list values are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArrayFormat {
    /// Repeat the key for each value.
    #[default]
    None,
    /// Append `[]` to the key.
    Brackets,
    /// Append `[index]` to the key.
    Index,
    /// Join values with commas under a single key.
    Comma,
}

/// How boolean values are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BooleanFormat {
    /// Booleans render as `key=true` / `key=false`; parsing leaves them as strings.
    #[default]
    None,
    /// Same rendering, but parsing converts `"true"` / `"false"` back to booleans.
    String,
    /// `true` renders as a bare key; `false` renders as `key=false`.
    EmptyTrue,
}

/// How explicitly-null values are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NullFormat {
    /// Null values render as a bare key.
    #[default]
    Default,
    /// Null values are omitted from the query string.
    Hidden,
}

/// Combined codec options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryOptions {
    /// List rendering convention.
    pub array_format: ArrayFormat,
    /// Boolean rendering convention.
    pub boolean_format: BooleanFormat,
    /// Null rendering convention.
    pub null_format: NullFormat,
}

/// Characters percent-encoded inside query keys and values. Everything
/// non-alphanumeric except the URL-safe marks.
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn encode_component(raw: &str) -> String {
    utf8_percent_encode(raw, QUERY_COMPONENT).to_string()
}

fn decode_component(raw: &str) -> String {
    percent_decode_str(raw)
        .decode_utf8()
        .map_or_else(|_| raw.to_string(), |decoded| decoded.into_owned())
}

/// Serialize parameters into a query string (no leading `?`).
///
/// Entries appear in key order; empty output means "no query string".
pub fn build_query(params: &Params, options: &QueryOptions) -> String {
    let mut pairs: Vec<String> = Vec::new();

    for (key, value) in params.iter() {
        let encoded_key = encode_component(key);
        match value {
            ParamValue::Null => match options.null_format {
                NullFormat::Default => pairs.push(encoded_key),
                NullFormat::Hidden => {}
            },
            ParamValue::Bool(b) => match (options.boolean_format, *b) {
                (BooleanFormat::EmptyTrue, true) => pairs.push(encoded_key),
                (_, b) => pairs.push(format!("{encoded_key}={b}")),
            },
            ParamValue::Str(s) => pairs.push(format!("{encoded_key}={}", encode_component(s))),
            ParamValue::List(items) => match options.array_format {
                ArrayFormat::None => {
                    for item in items {
                        pairs.push(format!("{encoded_key}={}", encode_component(item)));
                    }
                }
                ArrayFormat::Brackets => {
                    for item in items {
                        pairs.push(format!("{encoded_key}%5B%5D={}", encode_component(item)));
                    }
                }
                ArrayFormat::Index => {
                    for (index, item) in items.iter().enumerate() {
                        pairs.push(format!(
                            "{encoded_key}%5B{index}%5D={}",
                            encode_component(item)
                        ));
                    }
                }
                ArrayFormat::Comma => {
                    let joined = items
                        .iter()
                        .map(|item| encode_component(item))
                        .collect::<Vec<_>>()
                        .join(",");
                    pairs.push(format!("{encoded_key}={joined}"));
                }
            },
        }
    }

    pairs.join("&")
}

/// Parse a query string (with or without a leading `?`) into parameters.
pub fn parse_query(query: &str, options: &QueryOptions) -> Params {
    let query = query.strip_prefix('?').unwrap_or(query);
    let mut params = Params::new();

    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        let (raw_key, raw_value) = match pair.split_once('=') {
            Some((key, value)) => (key, Some(value)),
            None => (pair, None),
        };

        let key = normalize_key(&decode_component(raw_key));

        let Some(raw_value) = raw_value else {
            // Bare key: a flag under empty-true booleans, a null otherwise.
            let value = if options.boolean_format == BooleanFormat::EmptyTrue {
                ParamValue::Bool(true)
            } else {
                ParamValue::Null
            };
            insert_parsed(&mut params, key, value);
            continue;
        };

        if options.array_format == ArrayFormat::Comma && raw_value.contains(',') {
            let items = raw_value.split(',').map(decode_component).collect();
            insert_parsed(&mut params, key, ParamValue::List(items));
            continue;
        }

        let decoded = decode_component(raw_value);
        let value = match (options.boolean_format, decoded.as_str()) {
            (BooleanFormat::String, "true") => ParamValue::Bool(true),
            (BooleanFormat::String, "false") => ParamValue::Bool(false),
            (BooleanFormat::EmptyTrue, "false") => ParamValue::Bool(false),
            _ => ParamValue::Str(decoded),
        };
        insert_parsed(&mut params, key, value);
    }

    params
}

/// Strip the `[]` / `[index]` suffix bracket formats append to keys.
fn normalize_key(key: &str) -> String {
    match key.find('[') {
        Some(open) if key.ends_with(']') => key[..open].to_string(),
        _ => key.to_string(),
    }
}

/// Insert a parsed value, promoting repeated keys to lists.
fn insert_parsed(params: &mut Params, key: String, value: ParamValue) {
    let merged = match (params.remove(&key), value) {
        (None, value) => value,
        (Some(ParamValue::List(mut items)), value) => {
            items.extend(value.coerced().unwrap_or_default());
            ParamValue::List(items)
        }
        (Some(existing), value) => {
            let mut items = existing.coerced().unwrap_or_default();
            items.extend(value.coerced().unwrap_or_default());
            ParamValue::List(items)
        }
    };
    params.insert(key, merged);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn options(array: ArrayFormat, boolean: BooleanFormat, null: NullFormat) -> QueryOptions {
        QueryOptions {
            array_format: array,
            boolean_format: boolean,
            null_format: null,
        }
    }

    #[test]
    fn test_build_simple() {
        let mut params = Params::new();
        params.insert("page", "2");
        params.insert("sort", "name");

        let query = build_query(&params, &QueryOptions::default());
        assert_eq!(query, "page=2&sort=name");
    }

    #[test]
    fn test_build_encodes_components() {
        let mut params = Params::new();
        params.insert("q", "hello world/rust");

        let query = build_query(&params, &QueryOptions::default());
        assert_eq!(query, "q=hello%20world%2Frust");
    }

    #[test]
    fn test_array_formats() {
        let mut params = Params::new();
        params.insert("tags", vec!["a".to_string(), "b".to_string()]);

        let cases = [
            (ArrayFormat::None, "tags=a&tags=b"),
            (ArrayFormat::Brackets, "tags%5B%5D=a&tags%5B%5D=b"),
            (ArrayFormat::Index, "tags%5B0%5D=a&tags%5B1%5D=b"),
            (ArrayFormat::Comma, "tags=a,b"),
        ];
        for (format, expected) in cases {
            let opts = options(format, BooleanFormat::None, NullFormat::Default);
            assert_eq!(build_query(&params, &opts), expected);
        }
    }

    #[test]
    fn test_boolean_formats() {
        let mut params = Params::new();
        params.insert("draft", true);

        let opts = options(ArrayFormat::None, BooleanFormat::None, NullFormat::Default);
        assert_eq!(build_query(&params, &opts), "draft=true");

        let opts = options(ArrayFormat::None, BooleanFormat::EmptyTrue, NullFormat::Default);
        assert_eq!(build_query(&params, &opts), "draft");

        params.insert("draft", false);
        assert_eq!(build_query(&params, &opts), "draft=false");
    }

    #[test]
    fn test_null_formats() {
        let mut params = Params::new();
        params.insert("page", "1");
        params.unset("ref");

        let opts = options(ArrayFormat::None, BooleanFormat::None, NullFormat::Default);
        assert_eq!(build_query(&params, &opts), "page=1&ref");

        let opts = options(ArrayFormat::None, BooleanFormat::None, NullFormat::Hidden);
        assert_eq!(build_query(&params, &opts), "page=1");
    }

    #[test]
    fn test_parse_repeated_keys() {
        let params = parse_query("tag=rust&tag=router", &QueryOptions::default());
        assert_eq!(
            params.get("tag"),
            Some(&ParamValue::List(vec!["rust".into(), "router".into()]))
        );
    }

    #[test]
    fn test_parse_bracket_keys() {
        let opts = options(ArrayFormat::Brackets, BooleanFormat::None, NullFormat::Default);
        let params = parse_query("tags%5B%5D=a&tags%5B%5D=b", &opts);
        assert_eq!(
            params.get("tags"),
            Some(&ParamValue::List(vec!["a".into(), "b".into()]))
        );
    }

    #[test]
    fn test_parse_bare_keys() {
        let opts = options(ArrayFormat::None, BooleanFormat::None, NullFormat::Default);
        let params = parse_query("ref", &opts);
        assert_eq!(params.get("ref"), Some(&ParamValue::Null));

        let opts = options(ArrayFormat::None, BooleanFormat::EmptyTrue, NullFormat::Default);
        let params = parse_query("draft", &opts);
        assert_eq!(params.get("draft"), Some(&ParamValue::Bool(true)));
    }

    #[test]
    fn test_parse_boolean_strings() {
        let opts = options(ArrayFormat::None, BooleanFormat::String, NullFormat::Default);
        let params = parse_query("draft=true&done=false&name=trueish", &opts);
        assert_eq!(params.get("draft"), Some(&ParamValue::Bool(true)));
        assert_eq!(params.get("done"), Some(&ParamValue::Bool(false)));
        assert_eq!(params.get_str("name"), Some("trueish"));
    }

    #[test]
    fn test_round_trip_default_options() {
        let mut params = Params::new();
        params.insert("page", "2");
        params.insert("q", "a b");
        params.insert("tags", vec!["x".to_string(), "y".to_string()]);

        let opts = QueryOptions::default();
        let built = build_query(&params, &opts);
        assert_eq!(parse_query(&built, &opts), params);
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_query("", &QueryOptions::default()).is_empty());
        assert!(parse_query("?", &QueryOptions::default()).is_empty());
    }
}
