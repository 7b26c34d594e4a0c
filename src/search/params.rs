//! Ordered multi-valued query parameters

use super::error::{SearchError, SearchResult};

/// Keys that carry request controls rather than field filters
pub const RESERVED_KEYS: &[&str] = &[
    "type",
    "frame",
    "format",
    "limit",
    "sort",
    "from",
    "field",
    "mode",
    "redirected_from",
    "datastore",
    "referrer",
    "currentAction",
    "additional_facet",
    "debug",
    "q",
];

/// Value matching documents that lack a field
pub const NO_VALUE: &str = "No value";

pub fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Ordered list of `key=value` pairs. Duplicate keys and their order are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a URL-encoded query string (leading `?` optional)
    pub fn parse(query: &str) -> SearchResult<Self> {
        let query = query.trim().trim_start_matches('?');
        let mut params = Vec::new();

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            params.push((decode(key)?, decode(value)?));
        }

        Ok(Self(params))
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    pub fn extend(&mut self, other: QueryParams) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// First value for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.iter().filter(|(k, _)| *k == key).map(|(_, v)| v).collect()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.iter().any(|(k, _)| k == key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy without the first occurrence of the exact pair
    pub fn without_pair(&self, key: &str, value: &str) -> Self {
        let mut removed = false;
        Self(
            self.0
                .iter()
                .filter(|(k, v)| {
                    if !removed && k == key && v == value {
                        removed = true;
                        false
                    } else {
                        true
                    }
                })
                .cloned()
                .collect(),
        )
    }

    /// Copy without any of the given keys
    pub fn without_keys(&self, keys: &[&str]) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(k, _)| !keys.contains(&k.as_str()))
                .cloned()
                .collect(),
        )
    }

    /// Canonical percent-encoded form
    pub fn to_query_string(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl FromIterator<(String, String)> for QueryParams {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for QueryParams {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

fn decode(raw: &str) -> SearchResult<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .map_err(|e| SearchError::BadRequest(format!("Invalid query string encoding: {}", e)))
}
