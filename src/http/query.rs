//! Query string parsing with allow-listed sanitization.
//!
//! # Responsibilities
//! - Split `key=value` pairs on `&`
//! - Percent-decode and lower-case keys, drop anything that is not `[a-z]+`
//! - Keep only allow-listed keys, sanitizing values of strict keys
//!
//! # Design Decisions
//! - Never fails: unknown or malformed input is dropped, not reported
//! - Later duplicates overwrite earlier ones
//! - Non-strict keys (e.g. `filter`) keep their decoded value verbatim so embedded
//!   filter syntax survives; the consumer of those values must validate them itself

use std::borrow::Cow;
use std::collections::HashMap;

use percent_encoding::percent_decode_str;

/// Replacement for characters dropped from keys and strict values.
pub const PLACEHOLDER: char = '?';

/// Whether a parameter's value is sanitized before storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    /// Stored exactly as decoded.
    Verbatim,
    /// Characters outside `[-+,.:/_# 0-9A-Za-z]` become [`PLACEHOLDER`].
    Sanitized,
}

/// Accepted parameter names mapped to their strictness.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    keys: HashMap<&'static str, Strictness>,
}

impl AllowList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &'static str, strictness: Strictness) -> Self {
        self.keys.insert(key, strictness);
        self
    }

    pub fn get(&self, key: &str) -> Option<Strictness> {
        self.keys.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    /// Parameters recognised across WFS, WMS and WMTS requests.
    ///
    /// Only `filter` is verbatim. `layer` and `layers` are both sanitized.
    pub fn ows() -> Self {
        const SANITIZED: [&str; 21] = [
            "bbox",
            "crs",
            "format",
            "height",
            "layer",
            "layers",
            "maxfeatures",
            "outputformat",
            "request",
            "service",
            "srs",
            "srsname",
            "style",
            "styles",
            "tilecol",
            "tilematrix",
            "tilematrixset",
            "tilerow",
            "typename",
            "version",
            "width",
        ];

        SANITIZED
            .iter()
            .fold(Self::new(), |list, &key| list.with(key, Strictness::Sanitized))
            .with("filter", Strictness::Verbatim)
    }
}

/// Parsed query parameters, keyed by lower-case name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamTable {
    params: HashMap<String, String>,
}

impl ParamTable {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Like [`ParamTable::get`], but treats an empty value as absent.
    pub fn get_nonempty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|value| !value.is_empty())
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Parse `query` (the part after `?`) into a [`ParamTable`].
///
/// Without an allow-list every well-formed key is kept with a sanitized value.
pub fn parse_query(query: &str, allow: Option<&AllowList>) -> ParamTable {
    let mut params = HashMap::new();

    for pair in query.split('&') {
        let Some((raw_key, raw_value)) = pair.split_once('=') else {
            continue;
        };

        let key = decode(raw_key).to_lowercase();
        if key.is_empty() || !key.bytes().all(|b| b.is_ascii_lowercase()) {
            continue;
        }

        let strictness = match allow {
            Some(list) => match list.get(&key) {
                Some(strictness) => strictness,
                None => continue,
            },
            None => Strictness::Sanitized,
        };

        let value = decode(raw_value);
        let value = match strictness {
            Strictness::Verbatim => value.into_owned(),
            Strictness::Sanitized => sanitize(&value),
        };
        params.insert(key, value);
    }

    ParamTable { params }
}

/// Replace every character outside the safe value set with [`PLACEHOLDER`].
pub fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if is_safe_value_char(c) { c } else { PLACEHOLDER })
        .collect()
}

pub(crate) fn is_safe_value_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | ',' | '.' | ':' | '/' | '_' | '#' | ' ')
}

/// Percent-decode, substituting U+FFFD for invalid UTF-8.
///
/// `+` is not treated as a space; OWS clients percent-encode spaces.
pub(crate) fn decode(raw: &str) -> Cow<'_, str> {
    percent_decode_str(raw).decode_utf8_lossy()
}
