use crate::{
    errors::PatternError,
    routing::pattern::{parse_host, parse_path, RouteSegment},
};
use std::collections::{hash_map, HashMap};

/// Named captures of one match, fresh for every match attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParams(HashMap<String, String>);

impl RouteParams {
    #[inline]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Captures in no particular order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[inline]
    pub(crate) fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(name.to_owned(), value.into());
    }
}

impl IntoIterator for RouteParams {
    type Item = (String, String);
    type IntoIter = hash_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Compiles `pattern` as a path pattern and matches it against `path`.
///
/// ```
/// use birb::routing::path_match;
///
/// assert!(path_match("/", "/").unwrap().is_some());
/// assert!(path_match("/", "/hello").unwrap().is_none());
///
/// let params = path_match("/drive/{path...}", "/drive/a/b").unwrap().unwrap();
/// assert_eq!(params.get("path"), Some("a/b"));
/// ```
pub fn path_match(pattern: &str, path: &str) -> Result<Option<RouteParams>, PatternError> {
    let segments = parse_path(pattern)?;
    let mut params = RouteParams::default();

    Ok(match_path(&segments, path, &mut params).then_some(params))
}

/// Compiles `pattern` as a host pattern and matches it against `host`.
///
/// ```
/// use birb::routing::host_match;
///
/// let params = host_match("{sub...}.example.com", "a.b.example.com").unwrap().unwrap();
/// assert_eq!(params.get("sub"), Some("a.b"));
/// ```
pub fn host_match(pattern: &str, host: &str) -> Result<Option<RouteParams>, PatternError> {
    let segments = parse_host(pattern)?;
    let mut params = RouteParams::default();

    Ok(match_host(&segments, host, &mut params).then_some(params))
}

/// Walks `segments` against the non-empty `/`-separated parts of `path`.
pub(crate) fn match_path(segments: &[RouteSegment], path: &str, params: &mut RouteParams) -> bool {
    let mut parts = path.split('/').filter(|part| !part.is_empty());

    for segment in segments {
        match segment {
            RouteSegment::Literal(text) => {
                if parts.next() != Some(text.as_str()) {
                    return false;
                }
            }
            RouteSegment::Param(name) => match parts.next() {
                Some(part) => params.insert(name, part),
                None => return false,
            },
            RouteSegment::Rest(name) => {
                let rest: Vec<&str> = parts.collect();
                params.insert(name, rest.join("/"));
                return true;
            }
            RouteSegment::Wildcard => {
                if parts.next().is_none() {
                    return false;
                }
            }
        }
    }

    parts.next().is_none()
}

/// Matches host labels.
///
/// Without a rest segment the labels are walked in lock-step. With one, the
/// labels before it and the labels reserved for the segments after it are
/// matched one to one, and the rest captures whatever lies in between
/// (possibly nothing).
pub(crate) fn match_host(segments: &[RouteSegment], host: &str, params: &mut RouteParams) -> bool {
    let host = host.strip_suffix('.').unwrap_or(host);
    if host.is_empty() {
        return false;
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.iter().any(|label| label.is_empty()) {
        return false;
    }

    let Some(at) = segments.iter().position(|s| matches!(s, RouteSegment::Rest(_))) else {
        return labels.len() == segments.len()
            && segments
                .iter()
                .zip(&labels)
                .all(|(segment, label)| match_label(segment, label, params));
    };

    let after = segments.len() - at - 1;
    if labels.len() < at + after {
        return false;
    }
    let end = labels.len() - after;

    let head = segments[..at]
        .iter()
        .zip(&labels[..at])
        .all(|(segment, label)| match_label(segment, label, params));
    let tail = segments[at + 1..]
        .iter()
        .zip(&labels[end..])
        .all(|(segment, label)| match_label(segment, label, params));
    if !head || !tail {
        return false;
    }

    if let RouteSegment::Rest(name) = &segments[at] {
        params.insert(name, labels[at..end].join("."));
    }
    true
}

#[inline]
fn match_label(segment: &RouteSegment, label: &str, params: &mut RouteParams) -> bool {
    match segment {
        RouteSegment::Literal(text) => text.eq_ignore_ascii_case(label),
        RouteSegment::Param(name) => {
            params.insert(name, label);
            true
        }
        RouteSegment::Wildcard => true,
        RouteSegment::Rest(_) => false,
    }
}

#[cfg(test)]
mod matcher_tests {
    use super::*;

    fn captures(params: &RouteParams) -> Vec<(&str, &str)> {
        let mut all: Vec<_> = params.iter().collect();
        all.sort();
        all
    }

    #[test]
    fn match_paths() {
        #[rustfmt::skip]
        let cases: [(&str, &str, Option<Vec<(&str, &str)>>); 16] = [
            ("/",                   "/",               Some(vec![])),
            ("/",                   "/hello",          None),
            ("/{path...}",          "/",               Some(vec![("path", "")])),
            ("/{path...}",          "/hello",          Some(vec![("path", "hello")])),
            ("/{path...}",          "/a/b",            Some(vec![("path", "a/b")])),
            ("/hello",              "/hello/",         Some(vec![])),
            ("/hello",              "//hello",         Some(vec![])),
            ("/hello",              "/Hello",          None),
            ("/hello",              "/hello/world",    None),
            ("/a/b",                "/a",              None),
            ("/blog/{article}",     "/blog/rust",      Some(vec![("article", "rust")])),
            ("/blog/{article}",     "/blog",           None),
            ("/blog/{article}",     "/blog/a/b",       None),
            ("/{a}/{b}",            "/x/y",            Some(vec![("a", "x"), ("b", "y")])),
            ("/drive/{path...}",    "/drive",          Some(vec![("path", "")])),
            ("/drive/{path...}",    "/drives/x",       None),
        ];

        for (pattern, path, expected) in cases {
            let found = path_match(pattern, path).unwrap();
            assert_eq!(found.as_ref().map(captures), expected, "{pattern:?} ~ {path:?}");
        }
    }

    #[test]
    fn match_hosts() {
        #[rustfmt::skip]
        let cases: [(&str, &str, Option<Vec<(&str, &str)>>); 16] = [
            ("{user}.example.com",     "alice.example.com",     Some(vec![("user", "alice")])),
            ("{user}.example.com",     "a.b.example.com",       None),
            ("{user}.example.com",     "example.com",           None),
            ("{user}.example.com",     "alice.EXAMPLE.com",     Some(vec![("user", "alice")])),
            ("{user}.example.com",     "alice.example.com.",    Some(vec![("user", "alice")])),
            ("{user}.example.com",     "alice..example.com",    None),
            ("{sub...}.example.com",   "a.b.example.com",       Some(vec![("sub", "a.b")])),
            ("{sub...}.example.com",   "a.example.com",         Some(vec![("sub", "a")])),
            ("{sub...}.example.com",   "example.com",           Some(vec![("sub", "")])),
            ("{sub...}.example.com",   "a.b.example.org",       None),
            ("{sub...}.example.com",   "com",                   None),
            ("api.{zone...}.{tld}",    "api.eu.west.io",        Some(vec![("tld", "io"), ("zone", "eu.west")])),
            ("api.{zone...}.{tld}",    "web.eu.west.io",        None),
            ("example.{rest...}",      "example.co.uk",         Some(vec![("rest", "co.uk")])),
            ("*.example.com",          "www.example.com",       Some(vec![])),
            ("*.example.com",          "example.com",           None),
        ];

        for (pattern, host, expected) in cases {
            let found = host_match(pattern, host).unwrap();
            assert_eq!(found.as_ref().map(captures), expected, "{pattern:?} ~ {host:?}");
        }

        assert_eq!(host_match("example.com", ""), Ok(None));
        assert_eq!(host_match("a..b", "a.b"), Err(PatternError::EmptySegment));
    }
}
