//! URL query string and form body decoding into ordered parameter maps.

use std::{error, fmt};
use url::form_urlencoded;

/// Decoder for `application/x-www-form-urlencoded` data.
///
/// Used for both the query component of a request URL and for form-encoded
/// request bodies. Percent escapes and `+` are decoded; a leading `?` is
/// skipped, so `?a=1` and `a=1` are equivalent.
///
/// # Examples
/// ```rust
/// use maestro_web::query::{Params, Query};
///
/// let params: Params = Query::parse(b"name=john%20doe&age=25&flag", 10).unwrap();
/// assert_eq!(params.get("name"), Some("john doe"));
/// assert_eq!(params.get("flag"), Some(""));
///
/// // Handle limits
/// let result = Query::parse::<Params>(b"a=1&b=2", 1);
/// assert!(result.is_err());
/// ```
pub struct Query;

impl Query {
    /// Parses a query string into a new collection.
    ///
    /// # Arguments
    /// - `query`: Raw bytes of the query string
    /// - `limit`: Maximum number of parameters to parse
    #[inline]
    pub fn parse<C: QueryCollector>(query: &[u8], limit: usize) -> Result<C, Error> {
        let mut result = C::with_capacity(limit.min(16));
        Self::parse_into(&mut result, query, limit)?;
        Ok(result)
    }

    /// Parses a query string into an existing collection.
    ///
    /// Parameters are appended; an empty input adds nothing.
    ///
    /// # Examples
    /// ```
    /// use maestro_web::query::Query;
    ///
    /// let mut collector: Vec<(String, String)> = Vec::new();
    ///
    /// Query::parse_into(&mut collector, b"a=1&b=2", 10).unwrap();
    /// Query::parse_into(&mut collector, b"c=3", 10).unwrap();
    /// assert_eq!(collector.len(), 3);
    /// ```
    pub fn parse_into<C: QueryCollector>(
        result: &mut C,
        query: &[u8],
        limit: usize,
    ) -> Result<(), Error> {
        let data = match query.first() {
            Some(b'?') => &query[1..],
            _ => query,
        };

        for (key, value) in form_urlencoded::parse(data) {
            if key.is_empty() && value.is_empty() {
                continue;
            }
            if result.length() >= limit {
                return Err(Error::OverLimit(limit));
            }

            result.add_param(key.into_owned(), value.into_owned());
        }

        Ok(())
    }
}

/// A trait for types that can collect decoded query parameters.
pub trait QueryCollector
where
    Self: Sized,
{
    /// Adds a decoded parameter to the collection.
    fn add_param(&mut self, key: String, value: String);

    /// Returns the current number of parameters in the collection.
    // For `length` instead of `len`, thanks to `clippy` for the tip
    // about adding the `is_empty` method, although it's not needed here
    fn length(&self) -> usize;

    /// Creates a new collection with the specified capacity.
    fn with_capacity(capacity: usize) -> Self;
}

// Preserves every pair, duplicates included
impl QueryCollector for Vec<(String, String)> {
    #[inline(always)]
    fn add_param(&mut self, key: String, value: String) {
        self.push((key, value));
    }

    #[inline(always)]
    fn length(&self) -> usize {
        self.len()
    }

    #[inline(always)]
    fn with_capacity(capacity: usize) -> Self {
        Vec::with_capacity(capacity)
    }
}

// Deduplicates parameters (last wins, first position kept)
impl QueryCollector for Params {
    #[inline(always)]
    fn add_param(&mut self, key: String, value: String) {
        self.insert(key, value);
    }

    #[inline(always)]
    fn length(&self) -> usize {
        self.len()
    }

    #[inline(always)]
    fn with_capacity(capacity: usize) -> Self {
        Params(Vec::with_capacity(capacity))
    }
}

/// Insertion-ordered string map used for query, form and route parameters.
///
/// Lookups are linear; parameter sets are small.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    #[inline]
    pub fn new() -> Self {
        Params(Vec::new())
    }

    /// Returns the value bound to `key`.
    #[inline]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[inline]
    pub fn contains(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    /// Sets `key` to `value`, replacing an existing binding in place.
    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        let (key, value) = (key.into(), value.into());

        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    /// Adds `key` only when it is not bound yet. Returns `true` if inserted.
    pub fn insert_if_absent<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) -> bool {
        let key = key.into();
        if self.contains(&key) {
            return false;
        }

        self.0.push((key, value.into()));
        true
    }

    /// Overwrites or adds every binding of `other`.
    pub fn merge(&mut self, other: Params) {
        for (key, value) in other.0 {
            self.insert(key, value);
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(index).1)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

/// Error types that can occur during query parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The number of parameters exceeded the specified limit.
    ///
    /// # Fields
    /// - `0`: The maximum allowed number of parameters
    OverLimit(usize),
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OverLimit(limit) => {
                write!(f, "Query parameter limit exceeded: limit={}", limit)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic() {
        let cases = ["a=1&b=2", "?a=1&b=2"];

        for line in cases {
            let params: Vec<(String, String)> = Query::parse(line.as_bytes(), 8).unwrap();

            assert_eq!(params.len(), 2);
            assert_eq!(params[0], ("a".into(), "1".into()));
            assert_eq!(params[1], ("b".into(), "2".into()));
        }
    }

    #[test]
    fn decoding() {
        let params: Params = Query::parse(b"q=rust+lang&mail=user%40example.com&flag", 10).unwrap();

        assert_eq!(params.get("q"), Some("rust lang"));
        assert_eq!(params.get("mail"), Some("user@example.com"));
        assert_eq!(params.get("flag"), Some(""));
        assert_eq!(params.get("missing"), None);
    }

    #[test]
    fn empty_pairs_skipped() {
        let params: Vec<(String, String)> = Query::parse(b"a=1&&b=2&", 10).unwrap();
        assert_eq!(params.len(), 2);

        let params: Params = Query::parse(b"", 10).unwrap();
        assert!(params.is_empty());

        let params: Params = Query::parse(b"?", 10).unwrap();
        assert!(params.is_empty());
    }

    #[test]
    fn last_value_wins() {
        let params: Params = Query::parse(b"a=1&b=2&a=3", 10).unwrap();

        assert_eq!(params.len(), 2);
        assert_eq!(params.get("a"), Some("3"));
        assert_eq!(params.iter().next(), Some(("a", "3")));
    }

    #[test]
    fn limit_error() {
        assert_eq!(
            Query::parse::<Vec<(String, String)>>(b"a&a", 1),
            Err(Error::OverLimit(1))
        );
    }

    #[test]
    fn params_merge() {
        let mut params: Params = [("id", "query"), ("page", "2")].into_iter().collect();
        params.merge([("id", "42")].into_iter().collect());

        assert_eq!(params.get("id"), Some("42"));
        assert_eq!(params.get("page"), Some("2"));

        assert!(!params.insert_if_absent("id", "x"));
        assert!(params.insert_if_absent("sort", "asc"));
        assert_eq!(params.remove("page"), Some("2".into()));
        assert_eq!(params.len(), 2);
    }
}
