//! Query parameters of an upgrade request.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use url::form_urlencoded;

// ============================================================================
// QueryParams
// ============================================================================

/// Decoded query string: each key maps to every value given for it, in
/// request order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    values: FxHashMap<String, Vec<String>>,
}

impl QueryParams {
    /// Parses a raw query string (without the leading `?`).
    #[must_use]
    pub fn parse(query: &str) -> Self {
        let mut values: FxHashMap<String, Vec<String>> = FxHashMap::default();

        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            values
                .entry(key.into_owned())
                .or_default()
                .push(value.into_owned());
        }

        Self { values }
    }

    /// First value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// All values for `key`, empty if absent.
    #[must_use]
    pub fn get_all(&self, key: &str) -> &[String] {
        self.values.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns `true` if `key` appeared at least once.
    #[inline]
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Number of distinct keys.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if no parameters were given.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over keys and their values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

// ============================================================================
// Tests
// ============================================================================
