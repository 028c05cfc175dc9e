//! Ordered header collection shared by requests and responses.

use crate::http::types::slice_to_usize;
use std::fmt;

/// Well-known header names, in the casing they are written on the wire.
pub mod names {
    pub const CONNECTION: &str = "Connection";
    pub const CONTENT_LENGTH: &str = "Content-Length";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const DATE: &str = "Date";
    pub const HOST: &str = "Host";
    pub const SERVER: &str = "Server";
    pub const TRANSFER_ENCODING: &str = "Transfer-Encoding";
}

/// Ordered list of `(name, value)` pairs.
///
/// Insertion order is kept for output and duplicate names are allowed
/// (e.g. several `Set-Cookie`). Lookups compare names case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Appends an entry, keeping any existing entries with the same name.
    #[inline]
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Rewrites the value of every entry named `name` in place, then
    /// appends one more `(name, value)` entry.
    ///
    /// Note that this is not a pure replace: calling `set` for a name that
    /// is already present leaves the patched old entry *and* the new
    /// trailing one.
    ///
    /// ```
    /// use birb::Headers;
    ///
    /// let mut headers = Headers::new();
    /// headers.add("X-Mode", "a");
    /// headers.set("x-mode", "b");
    ///
    /// let all: Vec<_> = headers.iter().collect();
    /// assert_eq!(all, [("X-Mode", "b"), ("x-mode", "b")]);
    /// ```
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let (name, value) = (name.into(), value.into());

        for (key, old) in self.entries.iter_mut() {
            if key.eq_ignore_ascii_case(&name) {
                old.clone_from(&value);
            }
        }

        self.entries.push((name, value));
    }

    /// First value whose name matches `name`, ignoring case.
    #[inline]
    pub fn first(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// All values whose name matches `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.first(name).is_some()
    }

    /// Parsed `Content-Length`; `None` when absent or not a decimal number.
    #[inline]
    pub fn content_length(&self) -> Option<usize> {
        self.first(names::CONTENT_LENGTH)
            .and_then(|value| slice_to_usize(value.trim().as_bytes()))
    }

    #[inline]
    pub fn set_content_length(&mut self, length: usize) {
        self.set(names::CONTENT_LENGTH, length.to_string());
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry named `name`, ignoring case.
    #[inline]
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
    }

    #[inline]
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Serializes every entry as `name: value\r\n`.
    pub(crate) fn write_to(&self, buffer: &mut Vec<u8>) {
        for (name, value) in &self.entries {
            buffer.extend_from_slice(name.as_bytes());
            buffer.extend_from_slice(b": ");
            buffer.extend_from_slice(value.as_bytes());
            buffer.extend_from_slice(b"\r\n");
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.add(name, value);
        }
        headers
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            writeln!(f, "{name}: {value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod headers_tests {
    use super::*;

    #[test]
    fn add_keeps_order_and_duplicates() {
        let mut headers = Headers::new();
        headers.add("Host", "example.com");
        headers.add("Set-Cookie", "a=1");
        headers.add("Accept", "*/*");
        headers.add("Set-Cookie", "b=2");

        let all: Vec<_> = headers.iter().collect();
        assert_eq!(
            all,
            [
                ("Host", "example.com"),
                ("Set-Cookie", "a=1"),
                ("Accept", "*/*"),
                ("Set-Cookie", "b=2"),
            ]
        );

        let cookies: Vec<_> = headers.get_all("set-cookie").collect();
        assert_eq!(cookies, ["a=1", "b=2"]);
    }

    #[test]
    fn first_ignores_case() {
        let headers: Headers = [("Content-Type", "text/html"), ("content-type", "text/plain")]
            .into_iter()
            .collect();

        #[rustfmt::skip]
        let cases = [
            ("Content-Type", Some("text/html")),
            ("CONTENT-TYPE", Some("text/html")),
            ("content-type", Some("text/html")),
            ("Content-Length", None),
        ];

        for (name, expected) in cases {
            assert_eq!(headers.first(name), expected);
        }
    }

    #[test]
    fn set_patches_and_appends() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/html");
        headers.add("Accept", "*/*");
        headers.add("CONTENT-TYPE", "text/css");

        headers.set("content-type", "text/plain");

        let all: Vec<_> = headers.iter().collect();
        assert_eq!(
            all,
            [
                ("Content-Type", "text/plain"),
                ("Accept", "*/*"),
                ("CONTENT-TYPE", "text/plain"),
                ("content-type", "text/plain"),
            ]
        );

        let mut fresh = Headers::new();
        fresh.set("Server", "Birb");
        assert_eq!(fresh.len(), 1);
    }

    #[test]
    fn remove_ignores_case() {
        let mut headers: Headers = [("Content-Length", "1"), ("X-Kept", "a"), ("content-length", "2")]
            .into_iter()
            .collect();
        headers.remove("CONTENT-LENGTH");

        assert_eq!(headers.iter().collect::<Vec<_>>(), [("X-Kept", "a")]);
    }

    #[test]
    fn content_length() {
        #[rustfmt::skip]
        let cases = [
            (Some("0"),     Some(0)),
            (Some("42"),    Some(42)),
            (Some(" 7 "),   Some(7)),
            (Some("-1"),    None),
            (Some("12abc"), None),
            (Some(""),      None),
            (None,          None),
        ];

        for (value, expected) in cases {
            let mut headers = Headers::new();
            if let Some(value) = value {
                headers.add("content-length", value);
            }
            assert_eq!(headers.content_length(), expected, "{value:?}");
        }

        let mut headers = Headers::new();
        headers.set_content_length(1024);
        assert_eq!(headers.first("Content-Length"), Some("1024"));
        assert_eq!(headers.content_length(), Some(1024));
    }

    #[test]
    fn serializes_in_order() {
        let headers: Headers = [("B", "2"), ("A", "1")].into_iter().collect();
        let mut buffer = Vec::new();
        headers.write_to(&mut buffer);
        assert_eq!(buffer, b"B: 2\r\nA: 1\r\n");
    }
}
