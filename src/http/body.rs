//! Request body decoding.
//!
//! The framing is chosen from the request headers once the head is read:
//!
//! ```text
//! Transfer-Encoding: ..., chunked  => Chunked
//! Content-Length: N                => Bounded(N)
//! neither                          => Unbounded (until end of stream)
//! ```

use crate::{
    errors::{Error, ParseError},
    http::{
        headers::{names, Headers},
        reader::{read_line, Reader},
        types::hex_to_usize,
    },
};
use std::{fmt, io, time::Duration};
use tokio::{
    io::AsyncReadExt,
    time::timeout,
};

/// How the body of a request is delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// Exactly `Content-Length` bytes.
    Bounded,
    /// `Transfer-Encoding: chunked` framing.
    Chunked,
    /// No framing headers: everything until the peer closes its side.
    Unbounded,
}

#[derive(Debug)]
enum State {
    Bounded { remaining: usize },
    Chunked { remaining: usize, finished: bool },
    Unbounded { finished: bool },
}

/// Decoded request body.
///
/// Reads never go past the end of this request's body, so an unread
/// bounded or chunked body can be skipped and the connection reused.
pub struct Body {
    reader: Reader,
    state: State,
    line: Vec<u8>,
    line_size: usize,
    read_timeout: Duration,
}

impl Body {
    pub(crate) fn new(reader: Reader, kind: BodyKind, length: usize, line_size: usize, read_timeout: Duration) -> Self {
        let state = match kind {
            BodyKind::Bounded => State::Bounded { remaining: length },
            BodyKind::Chunked => State::Chunked {
                remaining: 0,
                finished: false,
            },
            BodyKind::Unbounded => State::Unbounded { finished: false },
        };

        Self {
            reader,
            state,
            line: Vec::new(),
            line_size,
            read_timeout,
        }
    }

    /// Picks the framing announced by `headers`.
    pub(crate) fn from_headers(reader: Reader, headers: &Headers, line_size: usize, read_timeout: Duration) -> Self {
        let chunked = headers
            .first(names::TRANSFER_ENCODING)
            .and_then(|value| value.rsplit(',').next())
            .is_some_and(|coding| coding.trim().eq_ignore_ascii_case("chunked"));

        match (chunked, headers.content_length()) {
            (true, _) => Self::new(reader, BodyKind::Chunked, 0, line_size, read_timeout),
            (false, Some(length)) => Self::new(reader, BodyKind::Bounded, length, line_size, read_timeout),
            (false, None) => Self::new(reader, BodyKind::Unbounded, 0, line_size, read_timeout),
        }
    }

    #[inline]
    pub fn kind(&self) -> BodyKind {
        match self.state {
            State::Bounded { .. } => BodyKind::Bounded,
            State::Chunked { .. } => BodyKind::Chunked,
            State::Unbounded { .. } => BodyKind::Unbounded,
        }
    }

    /// Whether the end of the body has been reached.
    #[inline]
    pub fn is_finished(&self) -> bool {
        match self.state {
            State::Bounded { remaining } => remaining == 0,
            State::Chunked { finished, .. } | State::Unbounded { finished } => finished,
        }
    }

    /// Reads the next decoded bytes into `buf`; `0` means the body is over.
    ///
    /// Every socket read is bounded by the connection's read timeout. A
    /// stream that ends inside a bounded or chunked body is an
    /// [`UnexpectedEof`](io::ErrorKind::UnexpectedEof) error.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        if buf.is_empty() || self.is_finished() {
            return Ok(0);
        }

        timeout(self.read_timeout, self.read_inner(buf)).await?
    }

    async fn read_inner(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        match &mut self.state {
            State::Bounded { remaining } => {
                let want = (*remaining).min(buf.len());
                let read = self.reader.read(&mut buf[..want]).await?;
                if read == 0 {
                    return Err(unexpected_eof());
                }

                *remaining -= read;
                Ok(read)
            }
            State::Chunked {
                remaining,
                finished,
            } => {
                if *remaining == 0 {
                    let size = next_chunk_size(&mut self.reader, &mut self.line, self.line_size).await?;
                    if size == 0 {
                        skip_trailers(&mut self.reader, &mut self.line, self.line_size).await?;
                        *finished = true;
                        return Ok(0);
                    }
                    *remaining = size;
                }

                let want = (*remaining).min(buf.len());
                let read = self.reader.read(&mut buf[..want]).await?;
                if read == 0 {
                    return Err(unexpected_eof());
                }

                *remaining -= read;
                if *remaining == 0 {
                    expect_crlf(&mut self.reader).await?;
                }
                Ok(read)
            }
            State::Unbounded { finished } => {
                let read = self.reader.read(buf).await?;
                *finished = read == 0;
                Ok(read)
            }
        }
    }

    /// Reads the whole remaining body, failing once it would exceed `limit`.
    pub async fn read_to_end(&mut self, limit: usize) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        let mut buf = [0u8; 4096];

        loop {
            let read = self.read(&mut buf).await?;
            if read == 0 {
                return Ok(out);
            }
            if out.len() + read > limit {
                return Err(Error::BodyTooLarge { limit });
            }
            out.extend_from_slice(&buf[..read]);
        }
    }

    /// Discards up to `limit` remaining bytes. Returns whether the body is
    /// now fully consumed.
    pub(crate) async fn drain(&mut self, limit: usize) -> Result<bool, Error> {
        let mut buf = [0u8; 4096];
        let mut skipped = 0;

        while skipped <= limit {
            let want = buf.len().min(limit - skipped + 1);
            let read = self.read(&mut buf[..want]).await?;
            if read == 0 {
                return Ok(true);
            }
            skipped += read;
        }

        Ok(false)
    }

    /// Gives the underlying reader back, positioned wherever reading stopped.
    #[inline]
    pub(crate) fn into_reader(self) -> Reader {
        self.reader
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body").field("state", &self.state).finish_non_exhaustive()
    }
}

#[inline]
fn unexpected_eof() -> Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "stream ended inside the body").into()
}

// `1a;name=value` -> 26
async fn next_chunk_size(reader: &mut Reader, line: &mut Vec<u8>, limit: usize) -> Result<usize, Error> {
    if !read_line(reader, line, limit).await? {
        return Err(unexpected_eof());
    }

    let size = match memchr::memchr(b';', line) {
        Some(pos) => &line[..pos],
        None => &line[..],
    };

    hex_to_usize(trim(size)).ok_or_else(|| ParseError::InvalidChunkSize.into())
}

fn trim(mut bytes: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = bytes {
        if !first.is_ascii_whitespace() {
            break;
        }
        bytes = rest;
    }
    while let [rest @ .., last] = bytes {
        if !last.is_ascii_whitespace() {
            break;
        }
        bytes = rest;
    }
    bytes
}

async fn skip_trailers(reader: &mut Reader, line: &mut Vec<u8>, limit: usize) -> Result<(), Error> {
    loop {
        if !read_line(reader, line, limit).await? {
            return Err(unexpected_eof());
        }
        if line.is_empty() {
            return Ok(());
        }
    }
}

async fn expect_crlf(reader: &mut Reader) -> Result<(), Error> {
    let mut crlf = [0u8; 2];

    match reader.read_exact(&mut crlf).await {
        Ok(_) if &crlf == b"\r\n" => Ok(()),
        Ok(_) => Err(ParseError::InvalidChunkTerminator.into()),
        Err(e) => Err(e.into()),
    }
}
