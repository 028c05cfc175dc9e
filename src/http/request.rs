//! Request head parsing and the [`Request`] value handed to handlers.

use crate::{
    errors::{Error, ParseError},
    http::{
        body::Body,
        headers::{names, Headers},
        reader::{read_line, read_str_line, Reader},
        types::{percent_decode, Method, Version},
    },
    limits::ReqLimits,
    routing::RouteParams,
};
use memchr::memchr;
use std::time::Duration;

/// A parsed HTTP/1.x request.
///
/// # General designations
///
/// ```text
/// GET /blog/hello%20world?page=2 HTTP/1.1\r\n
/// |-| |-------------------------| |------|
///  |             target            version
/// method
/// ```
///
/// [`path`](Request::path) is the target without its query and fragment,
/// percent-decoded, with `\` turned into `/`: `/blog/hello world`.
///
/// The body is left unread; handlers read it through [`Request::body`].
/// Captures are filled in by the [`Router`](crate::Router) before the
/// matching handler runs.
#[derive(Debug)]
pub struct Request {
    method: Method,
    target: String,
    path: String,
    version: Version,
    headers: Headers,
    body: Body,

    pub(crate) path_params: RouteParams,
    pub(crate) host_params: RouteParams,
}

impl Request {
    /// Reads the request line and headers from `reader`.
    ///
    /// The returned request owns `reader` through its unread body.
    pub(crate) async fn read_head(mut reader: Reader, limits: &ReqLimits, read_timeout: Duration) -> Result<Self, Error> {
        let mut line = Vec::with_capacity(256);

        let (method, target, version) = match read_str_line(&mut reader, &mut line, limits.line_size).await? {
            Some(start) if !start.trim().is_empty() => parse_request_line(start)?,
            _ => return Err(ParseError::EmptyRequestLine.into()),
        };

        let mut headers = Headers::with_capacity(16);
        loop {
            if !read_line(&mut reader, &mut line, limits.line_size).await? {
                return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
            }
            if line.is_empty() {
                break;
            }
            if headers.len() == limits.header_count {
                return Err(ParseError::TooManyHeaders.into());
            }

            let (name, value) = parse_header_line(&line)?;
            headers.add(name, value);
        }

        let body = Body::from_headers(reader, &headers, limits.line_size, read_timeout);
        let path = decode_path(&target);

        Ok(Self {
            method,
            target,
            path,
            version,
            headers,
            body,

            path_params: RouteParams::default(),
            host_params: RouteParams::default(),
        })
    }

    #[inline]
    pub(crate) fn into_body(self) -> Body {
        self.body
    }
}

// Public API
impl Request {
    #[inline]
    pub fn method(&self) -> Method {
        self.method
    }

    /// Request target exactly as sent, e.g. `/a%20b?x=1`.
    #[inline]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Decoded path, without query or fragment.
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw query string after `?`, without the fragment.
    pub fn query(&self) -> Option<&str> {
        let target = self.target.split_once('#').map_or(&*self.target, |(target, _)| target);
        target.split_once('?').map(|(_, query)| query)
    }

    #[inline]
    pub fn version(&self) -> Version {
        self.version
    }

    #[inline]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// First value of header `name`, ignoring case.
    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.first(name)
    }

    /// Host name the request is addressed to, without the port.
    ///
    /// Taken from an absolute-form target (`GET http://host/path`) if there
    /// is one, otherwise from the `Host` header.
    pub fn host(&self) -> Option<&str> {
        let authority = match absolute_form(&self.target) {
            Some((authority, _)) => authority,
            None => self.headers.first(names::HOST)?.trim(),
        };

        let host = match authority.rsplit_once('@') {
            Some((_, host)) => host,
            None => authority,
        };

        let host = if let Some(v6) = host.strip_prefix('[') {
            v6.split_once(']').map_or(v6, |(addr, _)| addr)
        } else {
            host.split_once(':').map_or(host, |(name, _)| name)
        };

        (!host.is_empty()).then_some(host)
    }

    /// `false` if the client sent `Connection: close`.
    ///
    /// The comparison is case-sensitive.
    #[inline]
    pub fn keep_alive(&self) -> bool {
        self.headers.first(names::CONNECTION) != Some("close")
    }

    #[inline]
    pub fn body(&mut self) -> &mut Body {
        &mut self.body
    }

    /// Captures from the path pattern of the route that matched.
    #[inline]
    pub fn path_params(&self) -> &RouteParams {
        &self.path_params
    }

    /// Captures from the host pattern of the route that matched.
    #[inline]
    pub fn host_params(&self) -> &RouteParams {
        &self.host_params
    }

    /// Path capture `name`, falling back to the host captures.
    #[inline]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).or_else(|| self.host_params.get(name))
    }
}

fn parse_request_line(line: &str) -> Result<(Method, String, Version), ParseError> {
    let mut tokens = line.split_ascii_whitespace();

    let (Some(method), Some(target), Some(version), None) =
        (tokens.next(), tokens.next(), tokens.next(), tokens.next())
    else {
        return Err(ParseError::InvalidRequestLine);
    };

    Ok((method.parse()?, target.to_owned(), version.parse()?))
}

fn parse_header_line(line: &[u8]) -> Result<(String, String), ParseError> {
    let colon = match memchr(b':', line) {
        Some(0) | None => return Err(ParseError::InvalidHeader),
        Some(pos) => pos,
    };

    let text = simdutf8::basic::from_utf8(line).map_err(|_| ParseError::InvalidEncoding)?;
    let name = text[..colon].trim();
    if name.is_empty() {
        return Err(ParseError::InvalidHeader);
    }

    Ok((name.to_owned(), text[colon + 1..].trim().to_owned()))
}

// `http://host:80/a?b` -> ("host:80", "/a?b")
fn absolute_form(target: &str) -> Option<(&str, &str)> {
    let scheme = target.find("://")?;
    if !target[..scheme].eq_ignore_ascii_case("http") && !target[..scheme].eq_ignore_ascii_case("https") {
        return None;
    }

    let rest = &target[scheme + 3..];
    Some(match rest.find(['/', '?', '#']) {
        Some(pos) => (&rest[..pos], &rest[pos..]),
        None => (rest, ""),
    })
}

fn decode_path(target: &str) -> String {
    let target = absolute_form(target).map_or(target, |(_, rest)| rest);
    let end = target.find(['?', '#']).unwrap_or(target.len());

    let path = percent_decode(&target[..end]).replace('\\', "/");
    match path.is_empty() {
        true => "/".to_owned(),
        false => path,
    }
}
