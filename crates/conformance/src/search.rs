//! Search parameter construction.
//!
//! FHIR search expresses OR in two ways: a comma inside one value
//! (`family=Smith,Johnson`) and the same key repeated
//! (`_id=a&_id=b`). [`SearchParams`] is therefore an ordered multimap rather
//! than a map. The same encoded form is used for search URLs, conditional
//! update/delete URLs and the `If-None-Exist` header.
//!
//! # Example
//!
//! ```rust
//! use helios_conformance::SearchParams;
//!
//! let params = SearchParams::new()
//!     .param("family", "Smith")
//!     .param("birthdate", "ge1980-01-01")
//!     .param("birthdate", "le1990-12-31")
//!     .count(10);
//!
//! assert_eq!(
//!     params.to_query_string(),
//!     "family=Smith&birthdate=ge1980-01-01&birthdate=le1990-12-31&_count=10"
//! );
//! ```

use std::fmt;

/// An ordered list of search parameters that may repeat keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchParams {
    params: Vec<(String, String)>,
}

impl SearchParams {
    /// Creates empty search params.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a parameter. Repeating a key expresses OR (or AND for
    /// date ranges, per the parameter's semantics).
    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((name.into(), value.to_string()));
        self
    }

    /// Appends a parameter in place.
    pub fn push(&mut self, name: impl Into<String>, value: impl ToString) {
        self.params.push((name.into(), value.to_string()));
    }

    /// Sets the page size (`_count`).
    pub fn count(self, count: usize) -> Self {
        self.param("_count", count)
    }

    /// Adds a sort key (`_sort`). Prefix with `-` for descending.
    pub fn sort(self, field: &str) -> Self {
        self.param("_sort", field)
    }

    /// Adds an `_include`.
    pub fn include(self, target: &str) -> Self {
        self.param("_include", target)
    }

    /// Adds a `_revinclude`.
    pub fn revinclude(self, target: &str) -> Self {
        self.param("_revinclude", target)
    }

    /// Sets `_summary`.
    pub fn summary(self, mode: &str) -> Self {
        self.param("_summary", mode)
    }

    /// Sets `_elements` from a list of element names.
    pub fn elements(self, elements: &[&str]) -> Self {
        self.param("_elements", elements.join(","))
    }

    /// Returns the first value for a key.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns every value for a key, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.params
            .iter()
            .filter(move |(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns an iterator over all parameters.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns true if there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Returns the number of parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Encodes as `application/x-www-form-urlencoded`.
    pub fn to_query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.params.iter())
            .finish()
    }
}

impl fmt::Display for SearchParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query_string())
    }
}

impl<K, V> FromIterator<(K, V)> for SearchParams
where
    K: Into<String>,
    V: ToString,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            params: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.to_string()))
                .collect(),
        }
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for SearchParams
where
    K: Into<String>,
    V: ToString,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}
