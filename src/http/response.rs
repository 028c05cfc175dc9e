//! Streaming HTTP response writer.

use crate::{
    errors::Error,
    http::{
        headers::{names, Headers},
        types::{StatusCode, Version},
    },
};
use std::{io, path::Path, sync::Arc, time::SystemTime};
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    time::{timeout, Duration},
};

/// Buffered write half of a connection.
pub(crate) type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// How the body is delimited, decided when the head is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Pending,
    Length(usize),
    Chunked,
    /// HTTP/1.0 peer and no length: the body ends when the connection does.
    UntilClose,
    /// The status forbids a body.
    Empty,
}

/// Writes one response to the connection.
///
/// The head (status line and headers) goes out exactly once: either
/// explicitly through [`send_headers`](Self::send_headers) or implicitly on
/// the first [`write`](Self::write). Header changes made after that have no
/// effect on the wire.
///
/// # Framing
///
/// - A first `write` without prior `send_headers` and without a
///   `Content-Length` sets `Content-Length` to the size of that write.
///   Later writes must fit in that length, otherwise they fail with
///   [`Error::BodyOverflow`].
/// - `send_headers` with neither `Content-Length` nor `Transfer-Encoding`
///   switches to `Transfer-Encoding: chunked` and encodes every write.
/// - A handler that writes nothing produces an empty body with
///   `Content-Length: 0`.
///
/// # Examples
///
/// ```
/// use birb::{Error, ResponseWriter, StatusCode};
///
/// async fn stream(resp: &mut ResponseWriter) -> Result<(), Error> {
///     resp.headers_mut().set("Content-Type", "text/plain");
///     resp.send_headers(StatusCode::Ok).await?;
///
///     for part in ["one ", "two ", "three"] {
///         resp.write(part).await?;
///     }
///     Ok(())
/// }
/// ```
pub struct ResponseWriter {
    status: StatusCode,
    headers: Headers,
    headers_sent: bool,
    framing: Framing,
    written: usize,
    finished: bool,

    sink: Writer,
    head: Vec<u8>,
    version: Version,
    server_name: Arc<str>,
    write_timeout: Duration,
}

impl ResponseWriter {
    #[inline]
    pub(crate) fn new(sink: Writer, head: Vec<u8>, version: Version, server_name: Arc<str>, write_timeout: Duration) -> Self {
        Self {
            status: StatusCode::Ok,
            headers: Headers::with_capacity(8),
            headers_sent: false,
            framing: Framing::Pending,
            written: 0,
            finished: false,

            sink,
            head,
            version,
            server_name,
            write_timeout,
        }
    }

    /// Returns the connection writer and the head buffer for reuse.
    #[inline]
    pub(crate) fn into_parts(self) -> (Writer, Vec<u8>) {
        (self.sink, self.head)
    }
}

// Public API
impl ResponseWriter {
    /// Status that will be (or was) sent, `200 OK` by default.
    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Changes the status used by an implicit head. No effect once the
    /// head was sent.
    #[inline]
    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        if !self.headers_sent {
            self.status = status;
        }
        self
    }

    #[inline]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    #[inline]
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    #[inline]
    pub fn headers_sent(&self) -> bool {
        self.headers_sent
    }

    /// Writes the status line and headers. Does nothing if they were
    /// already sent.
    ///
    /// `Date` and `Server` are added when missing.
    pub async fn send_headers(&mut self, status: StatusCode) -> Result<(), Error> {
        if self.headers_sent {
            return Ok(());
        }
        self.status = status;

        if !self.headers.contains(names::DATE) {
            self.headers.set(names::DATE, httpdate::fmt_http_date(SystemTime::now()));
        }
        if !self.headers.contains(names::SERVER) {
            self.headers.set(names::SERVER, &*self.server_name);
        }
        self.framing = self.select_framing();

        let code = status.code();
        self.head.clear();
        self.head.extend_from_slice(b"HTTP/1.1 ");
        self.head.extend_from_slice(&[
            b'0' + (code / 100) as u8,
            b'0' + (code / 10 % 10) as u8,
            b'0' + (code % 10) as u8,
            b' ',
        ]);
        self.head.extend_from_slice(status.reason().as_bytes());
        self.head.extend_from_slice(b"\r\n");
        self.headers.write_to(&mut self.head);
        self.head.extend_from_slice(b"\r\n");

        self.headers_sent = true;
        timeout(self.write_timeout, self.sink.write_all(&self.head)).await??;
        Ok(())
    }

    /// Writes body bytes, sending the head first if needed.
    pub async fn write(&mut self, data: impl AsRef<[u8]>) -> Result<(), Error> {
        let data = data.as_ref();

        if !self.headers_sent {
            if self.status.allows_body()
                && !self.headers.contains(names::CONTENT_LENGTH)
                && !self.headers.contains(names::TRANSFER_ENCODING)
            {
                self.headers.set_content_length(data.len());
            }
            self.send_headers(self.status).await?;
        }

        match self.framing {
            Framing::Length(declared) if self.written + data.len() > declared => {
                return Err(Error::BodyOverflow { declared });
            }
            Framing::Empty if !data.is_empty() => {
                return Err(Error::BodyOverflow { declared: 0 });
            }
            Framing::Chunked if !data.is_empty() => {
                let size = format!("{:x}\r\n", data.len());
                self.write_raw(size.as_bytes()).await?;
                self.write_raw(data).await?;
                self.write_raw(b"\r\n").await?;
            }
            _ => self.write_raw(data).await?,
        }

        self.written += data.len();
        Ok(())
    }

    /// Pushes buffered bytes to the socket.
    pub async fn flush(&mut self) -> Result<(), Error> {
        timeout(self.write_timeout, self.sink.flush()).await??;
        Ok(())
    }

    /// Responds with `status` and its reason phrase as a plain-text body.
    ///
    /// If the head was already sent only the body text is written. Statuses
    /// that forbid a body send just the head.
    pub async fn send_status(&mut self, status: StatusCode) -> Result<(), Error> {
        if !status.allows_body() {
            return self.send_headers(status).await;
        }
        if !self.headers_sent {
            self.status = status;
            self.headers.set(names::CONTENT_TYPE, "text/plain; charset=utf-8");
        }
        self.write(status.reason()).await
    }

    /// Responds `404 Not Found`.
    #[inline]
    pub async fn not_found(&mut self) -> Result<(), Error> {
        self.send_status(StatusCode::NotFound).await
    }

    /// Responds with the contents of the file at `path`, or `404` if there
    /// is no such file.
    pub async fn send_file(&mut self, path: impl AsRef<Path>) -> Result<(), Error> {
        match tokio::fs::read(path.as_ref()).await {
            Ok(contents) => self.write(contents).await,
            Err(e) if e.kind() == io::ErrorKind::NotFound => self.not_found().await,
            Err(e) => Err(e.into()),
        }
    }
}

impl ResponseWriter {
    fn select_framing(&mut self) -> Framing {
        if !self.status.allows_body() {
            return Framing::Empty;
        }

        if let Some(coding) = self.headers.first(names::TRANSFER_ENCODING) {
            return match coding.rsplit(',').next().map(str::trim) {
                Some(last) if last.eq_ignore_ascii_case("chunked") => Framing::Chunked,
                _ => Framing::UntilClose,
            };
        }
        if let Some(length) = self.headers.content_length() {
            return Framing::Length(length);
        }
        self.headers.remove(names::CONTENT_LENGTH);

        match self.version {
            Version::Http11 => {
                self.headers.set(names::TRANSFER_ENCODING, "chunked");
                Framing::Chunked
            }
            Version::Http10 => {
                self.headers.set(names::CONNECTION, "close");
                Framing::UntilClose
            }
        }
    }

    #[inline]
    async fn write_raw(&mut self, data: &[u8]) -> Result<(), Error> {
        timeout(self.write_timeout, self.sink.write_all(data)).await??;
        Ok(())
    }

    /// Completes the response after the handler returned.
    pub(crate) async fn finish(&mut self) -> Result<(), Error> {
        if self.finished {
            return Ok(());
        }

        if !self.headers_sent {
            self.write(b"").await?;
        }
        if self.framing == Framing::Chunked {
            self.write_raw(b"0\r\n\r\n").await?;
        }

        self.finished = true;
        Ok(())
    }

    /// Whether the connection may serve another request after this one.
    pub(crate) fn keep_alive(&self) -> bool {
        match self.framing {
            Framing::UntilClose => false,
            Framing::Length(declared) if self.written < declared => false,
            _ => self.headers.first(names::CONNECTION) != Some("close"),
        }
    }
}
