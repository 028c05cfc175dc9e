use std::io;
use thiserror::Error;

/// Everything that can go wrong while serving or configuring.
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    /// The peer sent bytes that are not a valid HTTP/1.x request.
    #[error("malformed request: {0}")]
    Parse(#[from] ParseError),

    /// A route pattern was rejected at registration time.
    #[error("invalid route pattern: {0}")]
    Pattern(#[from] PatternError),

    /// A handler wrote more bytes than the response framing allows.
    #[error("response body exceeds the declared length of {declared} bytes")]
    BodyOverflow { declared: usize },

    /// A request body was larger than the caller was willing to buffer.
    #[error("request body exceeds the limit of {limit} bytes")]
    BodyTooLarge { limit: usize },

    /// The socket failed, timed out or hit end of stream mid-message.
    #[error(transparent)]
    Io(#[from] IoError),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(IoError(err))
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Error::Io(IoError(err.into()))
    }
}

/// Wrapper that compares I/O errors by [`io::ErrorKind`].
#[derive(Debug, Error)]
#[error(transparent)]
pub struct IoError(pub io::Error);

impl IoError {
    #[inline]
    pub fn kind(&self) -> io::ErrorKind {
        self.0.kind()
    }
}

impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

/// Protocol violations found while reading a request.
///
/// None of these are recoverable: the connection cannot be resynchronized,
/// so the server answers with a canned response (best effort) and closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty request line")]
    EmptyRequestLine,
    #[error("request line must be `METHOD target VERSION`")]
    InvalidRequestLine,
    #[error("unknown method")]
    InvalidMethod,
    #[error("unsupported protocol version")]
    InvalidVersion,
    #[error("header line without a `name: value` pair")]
    InvalidHeader,
    #[error("too many header lines")]
    TooManyHeaders,
    #[error("line exceeds the configured size")]
    LineTooLong,
    #[error("request head is not valid UTF-8")]
    InvalidEncoding,
    #[error("chunk size is not a hexadecimal number")]
    InvalidChunkSize,
    #[error("chunk data is not followed by CRLF")]
    InvalidChunkTerminator,
}

macro_rules! http_errors {
    ($($name:ident: $status:literal, $len:literal => $body:literal;)*) => {
        impl ParseError {
            /// Complete `connection: close` response announcing this error.
            pub(crate) const fn as_http(&self) -> &'static [u8] {
                match self { $(
                    Self::$name => concat!(
                        "HTTP/1.1 ", $status, "\r\n",
                        "connection: close\r\n",
                        "content-type: text/plain; charset=utf-8\r\n",
                        "content-length: ", $len, "\r\n",
                        "\r\n",
                        $body
                    ),
                )* }.as_bytes()
            }
        }
    };
}

http_errors! {
    EmptyRequestLine: "400 Bad Request", "18" => "Empty request line";
    InvalidRequestLine: "400 Bad Request", "20" => "Invalid request line";
    InvalidMethod: "400 Bad Request", "19" => "Invalid HTTP method";
    InvalidVersion: "505 HTTP Version Not Supported", "26" => "HTTP version not supported";
    InvalidHeader: "400 Bad Request", "21" => "Invalid header format";
    TooManyHeaders: "431 Request Header Fields Too Large", "16" => "Too many headers";
    LineTooLong: "431 Request Header Fields Too Large", "13" => "Line too long";
    InvalidEncoding: "400 Bad Request", "25" => "Request head is not UTF-8";
    InvalidChunkSize: "400 Bad Request", "18" => "Invalid chunk size";
    InvalidChunkTerminator: "400 Bad Request", "24" => "Invalid chunk terminator";
}

/// Sent to sockets accepted while the server is at `max_connections`.
pub(crate) const SERVICE_UNAVAILABLE: &[u8] = b"HTTP/1.1 503 Service Unavailable\r\n\
connection: close\r\n\
content-type: text/plain; charset=utf-8\r\n\
content-length: 19\r\n\
\r\n\
Service Unavailable";

/// Rejections produced while compiling a route pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("pattern does not start with a method")]
    MissingMethod,
    #[error("unknown method `{0}`")]
    UnknownMethod(String),
    #[error("pattern has no path")]
    MissingPath,
    #[error("`{{` without a matching `}}`")]
    UnclosedBrace,
    #[error("empty segment")]
    EmptySegment,
    #[error("empty parameter name")]
    EmptyParamName,
    #[error("`{{name...}}` must be the last path segment")]
    RestNotLast,
    #[error("only one `{{name...}}` segment is allowed")]
    MultipleRest,
    #[error("unexpected character `{0}`")]
    UnexpectedChar(char),
}
