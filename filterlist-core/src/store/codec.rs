//! Query-string codec for request parameters.
//!
//! Layout: `page` (omitted when 1), `page_size` (omitted when absent),
//! `sort` (`-` prefix for descending, omitted when unsorted) and one key per
//! applied filter. Array filters are written as `name[]=a&name[]=b`; an
//! explicitly empty array is a bare `name[]` with no `=`. Keys are emitted
//! in sorted order and everything else is percent-encoded, so a literal `[]`
//! at the end of a raw key is always the array marker.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::params::{Filters, RequestParams, Sort};

const EMPTY_ARRAY_SUFFIX: &str = "[]";

/// Key names of the pagination and sorting parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueryKeys {
    pub page: String,
    pub page_size: String,
    pub sort: String,
}

impl Default for QueryKeys {
    fn default() -> Self {
        Self {
            page: "page".to_string(),
            page_size: "page_size".to_string(),
            sort: "sort".to_string(),
        }
    }
}

/// How array filter values are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArrayFormat {
    /// `tags=a&tags=b`. A one-element array reads back as a plain string.
    Repeat,
    /// `tags[]=a&tags[]=b`. Arrays of any length read back as arrays.
    #[default]
    Brackets,
}

/// Parses and serializes [`RequestParams`] as a query string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueryCodec {
    pub keys: QueryKeys,
    pub array_format: ArrayFormat,
    /// Direction reported when the query has no sort key.
    pub default_sort_asc: bool,
}

impl Default for QueryCodec {
    fn default() -> Self {
        Self {
            keys: QueryKeys::default(),
            array_format: ArrayFormat::default(),
            default_sort_asc: true,
        }
    }
}

impl QueryCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keys(mut self, keys: QueryKeys) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_array_format(mut self, array_format: ArrayFormat) -> Self {
        self.array_format = array_format;
        self
    }

    pub fn with_default_sort_asc(mut self, asc: bool) -> Self {
        self.default_sort_asc = asc;
        self
    }

    /// Parse a query string, with or without its leading `?`.
    ///
    /// Malformed page numbers fall back to their defaults.
    pub fn parse(&self, query: &str) -> RequestParams {
        let mut params = RequestParams {
            sort: Sort::unsorted(self.default_sort_asc),
            ..RequestParams::default()
        };

        let query = query.strip_prefix('?').unwrap_or(query);
        for segment in query.split('&').filter(|s| !s.is_empty()) {
            let (raw_key, raw_value) = match segment.split_once('=') {
                Some((k, v)) => (k, Some(v)),
                None => (segment, None),
            };
            let value = raw_value.map(decode);
            if let Some(name) = raw_key.strip_suffix(EMPTY_ARRAY_SUFFIX) {
                push_array_item(&mut params.applied_filters, decode(name), value);
                continue;
            }

            let key = decode(raw_key);
            if key == self.keys.page {
                match value.as_deref().map(str::parse::<u32>) {
                    Some(Ok(page)) if page >= 1 => params.page = page,
                    _ => debug!(value = ?value, "ignoring malformed page"),
                }
            } else if key == self.keys.page_size {
                match value.as_deref().map(str::parse::<u32>) {
                    Some(Ok(size)) => params.page_size = Some(size),
                    _ => debug!(value = ?value, "ignoring malformed page size"),
                }
            } else if key == self.keys.sort {
                params.sort = parse_sort(value.as_deref().unwrap_or_default(), self.default_sort_asc);
            } else {
                insert_filter(&mut params.applied_filters, key, value);
            }
        }

        params
    }

    /// Serialize to a query string: `""` or `?k=v&...`.
    pub fn stringify(&self, params: &RequestParams) -> String {
        let mut pairs: Vec<(String, Option<String>)> = Vec::new();

        if params.page != 1 {
            pairs.push((self.keys.page.clone(), Some(params.page.to_string())));
        }
        if let Some(size) = params.page_size {
            pairs.push((self.keys.page_size.clone(), Some(size.to_string())));
        }
        if let Some(param) = &params.sort.param {
            let value = if params.sort.asc {
                param.clone()
            } else {
                format!("-{param}")
            };
            pairs.push((self.keys.sort.clone(), Some(value)));
        }
        for (name, value) in &params.applied_filters {
            self.push_filter(&mut pairs, name, value);
        }

        // Stable: repeated array keys keep their element order
        pairs.sort_by(|a, b| a.0.cmp(&b.0));

        if pairs.is_empty() {
            return String::new();
        }
        let body = pairs
            .iter()
            .map(|(key, value)| match value {
                Some(value) => format!("{key}={}", encode(value)),
                None => key.clone(),
            })
            .collect::<Vec<_>>()
            .join("&");
        format!("?{body}")
    }

    fn push_filter(&self, pairs: &mut Vec<(String, Option<String>)>, name: &str, value: &Value) {
        let key = encode(name);
        match value {
            Value::Null => {}
            Value::Array(items) if items.is_empty() => {
                pairs.push((format!("{key}{EMPTY_ARRAY_SUFFIX}"), None));
            }
            Value::Array(items) => {
                let key = match self.array_format {
                    ArrayFormat::Repeat => key,
                    ArrayFormat::Brackets => format!("{key}{EMPTY_ARRAY_SUFFIX}"),
                };
                for item in items {
                    pairs.push((key.clone(), Some(scalar_text(item))));
                }
            }
            other => pairs.push((key, Some(scalar_text(other)))),
        }
    }
}

fn parse_sort(value: &str, default_asc: bool) -> Sort {
    match value.strip_prefix('-') {
        Some(param) if !param.is_empty() => Sort::new(param, false),
        Some(_) => Sort::unsorted(default_asc),
        None if value.is_empty() => Sort::unsorted(default_asc),
        None => Sort::new(value, true),
    }
}

fn push_array_item(filters: &mut Filters, name: String, value: Option<String>) {
    let entry = filters.entry(name).or_insert_with(|| Value::Array(Vec::new()));
    if let Some(value) = value {
        push_value(entry, value);
    }
}

fn insert_filter(filters: &mut Filters, key: String, value: Option<String>) {
    let value = value.unwrap_or_default();
    match filters.get_mut(&key) {
        Some(existing) => push_value(existing, value),
        None => {
            filters.insert(key, Value::String(value));
        }
    }
}

/// Append to an array value, promoting a scalar to an array first.
fn push_value(slot: &mut Value, value: String) {
    match slot {
        Value::Array(items) => items.push(Value::String(value)),
        other => {
            let first = other.take();
            *other = Value::Array(vec![first, Value::String(value)]);
        }
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~')
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
pub(crate) fn encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        if is_unreserved(byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Decode `%XX` escapes and `+` as space. Invalid escapes are kept as is.
pub(crate) fn decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                let hi = bytes.get(i + 1).copied().and_then(hex_value);
                let lo = bytes.get(i + 2).copied().and_then(hex_value);
                match hi.zip(lo) {
                    Some((hi, lo)) => {
                        out.push(hi << 4 | lo);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
