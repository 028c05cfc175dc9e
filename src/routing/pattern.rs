//! Route pattern compiler.
//!
//! ```text
//! GET {user}.example.com /blog/{article}
//! |-| |----------------| |-------------|
//! method  host (optional)     path
//! ```

use crate::{
    errors::PatternError,
    http::types::Method,
    routing::matcher::{match_host, match_path, RouteParams},
};
use std::{fmt, str::FromStr};

/// One compiled element of a host or path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteSegment {
    /// Text that must appear as is (hosts compare it ignoring case).
    Literal(String),
    /// `{name}`: exactly one path segment or host label.
    Param(String),
    /// `{name...}`: a run of segments or labels, joined back with `/` or `.`.
    Rest(String),
    /// `*`: exactly one host label, not captured.
    Wildcard,
}

impl fmt::Display for RouteSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteSegment::Literal(text) => f.write_str(text),
            RouteSegment::Param(name) => write!(f, "{{{name}}}"),
            RouteSegment::Rest(name) => write!(f, "{{{name}...}}"),
            RouteSegment::Wildcard => f.write_str("*"),
        }
    }
}

/// Captures produced by a successful [`RoutePattern::matches`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteMatch {
    pub path: RouteParams,
    pub host: RouteParams,
}

/// A compiled `"METHOD [host]path"` pattern.
///
/// Built once at registration and never changed afterwards, so it can be
/// shared by all connections.
///
/// # Grammar
///
/// Path segments are separated by `/`, a trailing `/` is ignored:
/// - `{name}` captures one segment
/// - `{name...}` captures all remaining segments, only as the last one
/// - anything else is compared literally
///
/// Host labels are separated by `.`:
/// - `{name}` captures one label, `*` matches one label without capturing
/// - `{name...}` captures a run of labels and may appear anywhere, once
/// - anything else is compared literally, ignoring case
///
/// # Examples
///
/// ```
/// use birb::{Method, RoutePattern};
///
/// let pattern: RoutePattern = "GET {user}.example.com /blog/{article}".parse().unwrap();
///
/// let found = pattern
///     .matches(Method::Get, Some("alice.example.com"), "/blog/hello")
///     .unwrap();
/// assert_eq!(found.host.get("user"), Some("alice"));
/// assert_eq!(found.path.get("article"), Some("hello"));
///
/// assert!(pattern.matches(Method::Get, Some("a.b.example.com"), "/blog/hello").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    method: Method,
    host: Option<Vec<RouteSegment>>,
    path: Vec<RouteSegment>,
}

impl RoutePattern {
    /// Compiles a full pattern, method token included.
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let pattern = pattern.trim();

        let Some((token, rest)) = pattern.split_once(|c: char| c.is_ascii_whitespace()) else {
            return Err(match pattern.is_empty() || pattern.starts_with('/') {
                true => PatternError::MissingMethod,
                false => PatternError::MissingPath,
            });
        };

        let method = Method::from_token(token).ok_or_else(|| PatternError::UnknownMethod(token.to_owned()))?;
        Self::with_method(method, rest)
    }

    /// Compiles `"[host]path"` for a method given separately.
    pub fn with_method(method: Method, pattern: &str) -> Result<Self, PatternError> {
        let pattern = pattern.trim();

        let (host, path) = match pattern.find('/') {
            Some(0) => (None, pattern),
            Some(slash) => (Some(pattern[..slash].trim()), &pattern[slash..]),
            None => return Err(PatternError::MissingPath),
        };

        Ok(Self {
            method,
            host: host.map(parse_host).transpose()?,
            path: parse_path(path.trim_end())?,
        })
    }

    #[inline]
    pub fn method(&self) -> Method {
        self.method
    }

    #[inline]
    pub fn host_segments(&self) -> Option<&[RouteSegment]> {
        self.host.as_deref()
    }

    #[inline]
    pub fn path_segments(&self) -> &[RouteSegment] {
        &self.path
    }

    /// Matches a request. `host` is the request's host name without port;
    /// a pattern with a host part never matches a request without one.
    pub fn matches(&self, method: Method, host: Option<&str>, path: &str) -> Option<RouteMatch> {
        if self.method != method {
            return None;
        }

        let mut found = RouteMatch::default();

        if let Some(segments) = &self.host {
            if !match_host(segments, host?, &mut found.host) {
                return None;
            }
        }

        match_path(&self.path, path, &mut found.path).then_some(found)
    }
}

impl FromStr for RoutePattern {
    type Err = PatternError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// (pattern GET [{user}, example, com] [blog, {article}])
impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, segments: &[RouteSegment]) -> fmt::Result {
            f.write_str("[")?;
            for (i, segment) in segments.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{segment}")?;
            }
            f.write_str("]")
        }

        write!(f, "(pattern {} ", self.method)?;
        if let Some(host) = &self.host {
            list(f, host)?;
            f.write_str(" ")?;
        }
        list(f, &self.path)?;
        f.write_str(")")
    }
}

pub(crate) fn parse_path(path: &str) -> Result<Vec<RouteSegment>, PatternError> {
    let path = path.strip_prefix('/').ok_or(PatternError::MissingPath)?;
    let path = path.strip_suffix('/').unwrap_or(path);
    if path.is_empty() {
        return Ok(Vec::new());
    }

    let mut segments = Vec::new();
    let mut rest_seen = false;

    for part in path.split('/') {
        if part.is_empty() {
            return Err(PatternError::EmptySegment);
        }

        let segment = match part.starts_with('{') {
            true => parse_capture(part)?,
            false => RouteSegment::Literal(part.to_owned()),
        };

        match (rest_seen, &segment) {
            (true, RouteSegment::Rest(_)) => return Err(PatternError::MultipleRest),
            (true, _) => return Err(PatternError::RestNotLast),
            (false, RouteSegment::Rest(_)) => rest_seen = true,
            _ => {}
        }
        segments.push(segment);
    }

    Ok(segments)
}

pub(crate) fn parse_host(host: &str) -> Result<Vec<RouteSegment>, PatternError> {
    let mut segments = Vec::new();
    let mut rest_seen = false;
    let mut remaining = host;

    loop {
        // A capture may hold `...`, so labels are cut only after its closing brace.
        let (segment, tail) = match remaining.as_bytes().first() {
            None | Some(b'.') => return Err(PatternError::EmptySegment),
            Some(b'{') => {
                let close = remaining.find('}').ok_or(PatternError::UnclosedBrace)?;
                (parse_capture(&remaining[..=close])?, &remaining[close + 1..])
            }
            Some(_) => {
                let end = remaining.find('.').unwrap_or(remaining.len());
                (parse_label(&remaining[..end])?, &remaining[end..])
            }
        };

        if let RouteSegment::Rest(_) = segment {
            if rest_seen {
                return Err(PatternError::MultipleRest);
            }
            rest_seen = true;
        }
        segments.push(segment);

        match tail.strip_prefix('.') {
            Some(next) => remaining = next,
            None if tail.is_empty() => return Ok(segments),
            None => return Err(unexpected(tail)),
        }
    }
}

fn parse_label(label: &str) -> Result<RouteSegment, PatternError> {
    match label.as_bytes() {
        [b'*'] => Ok(RouteSegment::Wildcard),
        [b'*', ..] => Err(unexpected(&label[1..])),
        _ => match label.find(['{', '}', '*']) {
            Some(pos) => Err(unexpected(&label[pos..])),
            None => Ok(RouteSegment::Literal(label.to_owned())),
        },
    }
}

// `{name}` or `{name...}`, nothing after the closing brace
fn parse_capture(src: &str) -> Result<RouteSegment, PatternError> {
    let inner = &src[1..];
    let close = inner.find('}').ok_or(PatternError::UnclosedBrace)?;
    if close + 1 < inner.len() {
        return Err(unexpected(&inner[close + 1..]));
    }

    let (name, rest) = match inner[..close].strip_suffix("...") {
        Some(name) => (name, true),
        None => (&inner[..close], false),
    };
    if name.is_empty() {
        return Err(PatternError::EmptyParamName);
    }
    if let Some(pos) = name.find('{') {
        return Err(unexpected(&name[pos..]));
    }

    Ok(match rest {
        true => RouteSegment::Rest(name.to_owned()),
        false => RouteSegment::Param(name.to_owned()),
    })
}

#[inline]
fn unexpected(rest: &str) -> PatternError {
    PatternError::UnexpectedChar(rest.chars().next().unwrap_or_default())
}
