//! Core HTTP protocol types and utilities

use crate::errors::ParseError;
use std::{fmt, str::FromStr};

#[inline(always)]
pub(crate) fn slice_to_usize(bytes: &[u8]) -> Option<usize> {
    if bytes.is_empty() {
        return None;
    }

    let mut result: usize = 0;

    for &byte in bytes {
        if !byte.is_ascii_digit() {
            return None;
        }

        result = result
            .checked_mul(10)?
            .checked_add((byte - b'0') as usize)?;
    }

    Some(result)
}

#[inline(always)]
pub(crate) fn hex_to_usize(bytes: &[u8]) -> Option<usize> {
    if bytes.is_empty() {
        return None;
    }

    let mut result: usize = 0;

    for &byte in bytes {
        let digit = match byte {
            b'0'..=b'9' => byte - b'0',
            b'a'..=b'f' => byte - b'a' + 10,
            b'A'..=b'F' => byte - b'A' + 10,
            _ => return None,
        };

        result = result.checked_mul(16)?.checked_add(digit as usize)?;
    }

    Some(result)
}

/// Decodes `%XX` escapes. Malformed escapes are kept as written and
/// decoded bytes that are not UTF-8 are replaced.
pub(crate) fn percent_decode(src: &str) -> String {
    if !src.contains('%') {
        return src.to_owned();
    }

    let bytes = src.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let Some(value) = bytes.get(i + 1..i + 3).and_then(hex_to_usize) {
                out.push(value as u8);
                i += 3;
                continue;
            }
        }

        out.push(bytes[i]);
        i += 1;
    }

    match String::from_utf8(out) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

// METHOD

macro_rules! set_methods {
    ($($name:ident = $token:literal;)+) => {
        /// HTTP request methods
        ///
        /// Parsing is case-insensitive, [`Display`](fmt::Display) prints the
        /// canonical upper-case token.
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
        pub enum Method { $(
            #[doc = concat!("`", $token, "`")]
            $name,
        )+ }

        impl Method {
            /// Canonical upper-case token.
            #[inline]
            pub const fn as_str(&self) -> &'static str {
                match self { $(
                    Method::$name => $token,
                )+ }
            }

            #[inline]
            pub(crate) fn from_token(token: &str) -> Option<Self> { $(
                if token.eq_ignore_ascii_case($token) {
                    return Some(Method::$name);
                }
            )+
                None
            }
        }
    };
}

set_methods! {
    Get = "GET";
    Head = "HEAD";
    Post = "POST";
    Put = "PUT";
    Delete = "DELETE";
    Connect = "CONNECT";
    Options = "OPTIONS";
    Trace = "TRACE";
    Patch = "PATCH";
}

impl FromStr for Method {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::from_token(s).ok_or(ParseError::InvalidMethod)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// VERSION

/// HTTP protocol version
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Version {
    /// `HTTP/1.0`
    Http10,
    /// `HTTP/1.1`
    Http11,
}

impl Version {
    /// Protocol family, always `"HTTP"`.
    #[inline]
    pub const fn protocol(&self) -> &'static str {
        "HTTP"
    }

    #[inline]
    pub const fn major(&self) -> u8 {
        1
    }

    #[inline]
    pub const fn minor(&self) -> u8 {
        match self {
            Version::Http10 => 0,
            Version::Http11 => 1,
        }
    }

    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
}

impl FromStr for Version {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("HTTP/1.1") {
            Ok(Version::Http11)
        } else if s.eq_ignore_ascii_case("HTTP/1.0") {
            Ok(Version::Http10)
        } else {
            Err(ParseError::InvalidVersion)
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// STATUS_CODE

macro_rules! set_status_codes {
    ($($name:ident = ($num:literal, $str:literal);)+) => {
        /// HTTP response status codes with their reason phrases.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum StatusCode { $(
            #[doc = concat!(stringify!($num), " ", $str)]
            $name = $num,
        )+ }

        impl StatusCode {
            #[inline]
            pub const fn code(&self) -> u16 {
                *self as u16
            }

            #[inline]
            pub const fn reason(&self) -> &'static str {
                match self { $(
                    StatusCode::$name => $str,
                )+ }
            }

            pub const fn from_code(code: u16) -> Option<Self> {
                match code { $(
                    $num => Some(StatusCode::$name),
                )+
                    _ => None,
                }
            }
        }
    }
}

set_status_codes! {
    Continue = (100, "Continue");
    SwitchingProtocols = (101, "Switching Protocols");
    Processing = (102, "Processing");

    Ok = (200, "OK");
    Created = (201, "Created");
    Accepted = (202, "Accepted");
    NonAuthoritativeInformation = (203, "Non Authoritative Information");
    NoContent = (204, "No Content");
    ResetContent = (205, "Reset Content");
    PartialContent = (206, "Partial Content");
    MultiStatus = (207, "Multi-Status");
    AlreadyReported = (208, "Already Reported");
    ImUsed = (226, "IM Used");

    MultipleChoices = (300, "Multiple Choices");
    MovedPermanently = (301, "Moved Permanently");
    Found = (302, "Found");
    SeeOther = (303, "See Other");
    NotModified = (304, "Not Modified");
    UseProxy = (305, "Use Proxy");
    TemporaryRedirect = (307, "Temporary Redirect");
    PermanentRedirect = (308, "Permanent Redirect");

    BadRequest = (400, "Bad Request");
    Unauthorized = (401, "Unauthorized");
    PaymentRequired = (402, "Payment Required");
    Forbidden = (403, "Forbidden");
    NotFound = (404, "Not Found");
    MethodNotAllowed = (405, "Method Not Allowed");
    NotAcceptable = (406, "Not Acceptable");
    ProxyAuthenticationRequired = (407, "Proxy Authentication Required");
    RequestTimeout = (408, "Request Timeout");
    Conflict = (409, "Conflict");
    Gone = (410, "Gone");
    LengthRequired = (411, "Length Required");
    PreconditionFailed = (412, "Precondition Failed");
    PayloadTooLarge = (413, "Payload Too Large");
    UriTooLong = (414, "URI Too Long");
    UnsupportedMediaType = (415, "Unsupported Media Type");
    RangeNotSatisfiable = (416, "Range Not Satisfiable");
    ExpectationFailed = (417, "Expectation Failed");
    ImaTeapot = (418, "I'm a teapot");
    MisdirectedRequest = (421, "Misdirected Request");
    UnprocessableEntity = (422, "Unprocessable Entity");
    Locked = (423, "Locked");
    FailedDependency = (424, "Failed Dependency");
    TooEarly = (425, "Too Early");
    UpgradeRequired = (426, "Upgrade Required");
    PreconditionRequired = (428, "Precondition Required");
    TooManyRequests = (429, "Too Many Requests");
    RequestHeaderFieldsTooLarge = (431, "Request Header Fields Too Large");
    UnavailableForLegalReasons = (451, "Unavailable For Legal Reasons");

    InternalServerError = (500, "Internal Server Error");
    NotImplemented = (501, "Not Implemented");
    BadGateway = (502, "Bad Gateway");
    ServiceUnavailable = (503, "Service Unavailable");
    GatewayTimeout = (504, "Gateway Timeout");
    HttpVersionNotSupported = (505, "HTTP Version Not Supported");
    VariantAlsoNegotiates = (506, "Variant Also Negotiates");
    InsufficientStorage = (507, "Insufficient Storage");
    LoopDetected = (508, "Loop Detected");
    NotExtended = (510, "Not Extended");
    NetworkAuthenticationRequired = (511, "Network Authentication Required");
}

impl StatusCode {
    /// Whether a response with this status may carry a body.
    #[inline]
    pub const fn allows_body(&self) -> bool {
        let code = self.code();
        !(code < 200 || code == 204 || code == 304)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

#[cfg(test)]
mod types_tests {
    use super::*;

    #[test]
    fn parse_method() {
        #[rustfmt::skip]
        let cases = [
            ("GET",     Some(Method::Get)),
            ("get",     Some(Method::Get)),
            ("Post",    Some(Method::Post)),
            ("PUT",     Some(Method::Put)),
            ("DELETE",  Some(Method::Delete)),
            ("head",    Some(Method::Head)),
            ("OPTIONS", Some(Method::Options)),
            ("TRACE",   Some(Method::Trace)),
            ("CONNECT", Some(Method::Connect)),
            ("PATCH",   Some(Method::Patch)),

            ("",        None),
            ("GETT",    None),
            (" GET",    None),
            ("BREW",    None),
        ];

        for (token, expected) in cases {
            assert_eq!(token.parse::<Method>().ok(), expected, "{token:?}");
        }
        assert_eq!(Method::Delete.to_string(), "DELETE");
    }

    #[test]
    fn parse_version() {
        #[rustfmt::skip]
        let cases = [
            ("HTTP/1.1", Ok(Version::Http11)),
            ("HTTP/1.0", Ok(Version::Http10)),
            ("http/1.1", Ok(Version::Http11)),

            ("HTTP/2.0", Err(ParseError::InvalidVersion)),
            ("HTTP/1",   Err(ParseError::InvalidVersion)),
            ("HTTP/0.9", Err(ParseError::InvalidVersion)),
            ("",         Err(ParseError::InvalidVersion)),
        ];

        for (src, expected) in cases {
            assert_eq!(src.parse::<Version>(), expected, "{src:?}");
        }

        assert_eq!(
            (Version::Http10.protocol(), Version::Http10.major(), Version::Http10.minor()),
            ("HTTP", 1, 0)
        );
    }

    #[test]
    fn status_codes() {
        assert_eq!(StatusCode::NotFound.code(), 404);
        assert_eq!(StatusCode::NotFound.reason(), "Not Found");
        assert_eq!(StatusCode::from_code(500), Some(StatusCode::InternalServerError));
        assert_eq!(StatusCode::from_code(299), None);
        assert_eq!(StatusCode::Ok.to_string(), "200 OK");

        assert!(StatusCode::Ok.allows_body());
        assert!(!StatusCode::NoContent.allows_body());
        assert!(!StatusCode::NotModified.allows_body());
        assert!(!StatusCode::Continue.allows_body());
    }

    #[test]
    fn numbers() {
        #[rustfmt::skip]
        let cases: [(&[u8], Option<usize>, Option<usize>); 7] = [
            (b"0",    Some(0),  Some(0)),
            (b"10",   Some(10), Some(16)),
            (b"ff",   None,     Some(255)),
            (b"1A",   None,     Some(26)),
            (b"",     None,     None),
            (b"-1",   None,     None),
            (b"99999999999999999999999", None, None),
        ];

        for (src, dec, hex) in cases {
            assert_eq!(slice_to_usize(src), dec);
            assert_eq!(hex_to_usize(src), hex);
        }
    }

    #[test]
    fn decode_percent() {
        #[rustfmt::skip]
        let cases = [
            ("/plain",         "/plain"),
            ("/a%20b",         "/a b"),
            ("/%E2%9C%93",     "/\u{2713}"),
            ("/100%",          "/100%"),
            ("/%zz",           "/%zz"),
            ("/%4",            "/%4"),
        ];

        for (src, expected) in cases {
            assert_eq!(percent_decode(src), expected);
        }
    }
}
