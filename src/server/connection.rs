use crate::{
    errors::Error,
    http::{
        body::BodyKind,
        headers::names,
        reader::Reader,
        request::Request,
        response::{ResponseWriter, Writer},
        types::StatusCode,
    },
    limits::{ConnLimits, ReqLimits, RespLimits},
    server::server_impl::Handler,
};
use crossbeam::queue::ArrayQueue;
use futures_util::FutureExt;
use std::{io, panic::AssertUnwindSafe, sync::Arc, time::Instant};
use tokio::{
    io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter},
    net::TcpStream,
    sync::watch,
    time::{timeout, Duration},
};

/// State every connection of one server reads.
pub(crate) struct Shared {
    pub(crate) name: Arc<str>,
    pub(crate) conn_limits: ConnLimits,
    pub(crate) req_limits: ReqLimits,
    pub(crate) resp_limits: RespLimits,
    pub(crate) pool: HeadPool,
}

pub(crate) struct HttpConnection<H: Handler> {
    handler: Arc<H>,
    shared: Arc<Shared>,
    shutdown: watch::Receiver<bool>,

    created: Instant,
    request_count: usize,
}

/// What the loop does after one exchange.
enum Next {
    KeepAlive(Reader, Writer),
    Close,
}

impl<H: Handler> HttpConnection<H> {
    #[inline]
    pub(crate) fn new(handler: Arc<H>, shared: Arc<Shared>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            handler,
            shared,
            shutdown,

            created: Instant::now(),
            request_count: 0,
        }
    }

    /// Serves requests on `stream` until either side ends the connection.
    pub(crate) async fn run(mut self, stream: TcpStream) {
        tracing::debug!("connection opened");
        let _ = stream.set_nodelay(true);

        let (read, write) = stream.into_split();
        let mut reader: Reader = Box::new(BufReader::with_capacity(self.shared.req_limits.read_buffer, read));
        let mut writer: Writer = Box::new(BufWriter::new(write));

        while !self.is_expired() {
            if !self.wait_for_request(&mut reader).await {
                break;
            }

            let shared = self.shared.clone();
            let limits = &shared.conn_limits;
            let head = Request::read_head(reader, &shared.req_limits, limits.socket_read_timeout);

            let request = match timeout(limits.socket_read_timeout, head).await {
                Ok(Ok(request)) => request,
                Ok(Err(Error::Parse(err))) => {
                    tracing::warn!(%err, "rejecting malformed request");
                    let _ = write_bytes(&mut writer, err.as_http(), limits.socket_write_timeout).await;
                    break;
                }
                Ok(Err(err)) => {
                    tracing::debug!(%err, "failed to read request head");
                    break;
                }
                Err(_) => {
                    tracing::debug!("timed out reading request head");
                    break;
                }
            };

            self.request_count += 1;
            match self.exchange(request, writer).await {
                Next::KeepAlive(r, w) => (reader, writer) = (r, w),
                Next::Close => break,
            }
        }

        tracing::debug!(requests = self.request_count, "connection closed");
    }

    /// Waits until the next request starts arriving.
    ///
    /// `false` if the peer went away, stayed idle for too long or the server
    /// is shutting down.
    async fn wait_for_request(&mut self, reader: &mut Reader) -> bool {
        if *self.shutdown.borrow() {
            return false;
        }

        let limits = &self.shared.conn_limits;
        let idle = match self.request_count {
            0 => limits.socket_read_timeout,
            _ => limits.keep_alive_timeout,
        };

        tokio::select! {
            filled = timeout(idle, reader.fill_buf()) => matches!(filled, Ok(Ok(buf)) if !buf.is_empty()),
            _ = self.shutdown.changed() => false,
        }
    }

    /// Runs the handler for `request` and completes the response.
    async fn exchange(&self, mut request: Request, writer: Writer) -> Next {
        let shared = &self.shared;
        let write_timeout = shared.conn_limits.socket_write_timeout;

        tracing::info!(
            method = %request.method(),
            target = request.target(),
            version = %request.version(),
            "request"
        );

        let closing = !request.keep_alive() || self.is_expired() || *self.shutdown.borrow();

        let mut response = ResponseWriter::new(
            writer,
            shared.pool.get(),
            request.version(),
            shared.name.clone(),
            write_timeout,
        );
        if closing {
            response.headers_mut().set(names::CONNECTION, "close");
        }

        let handled = AssertUnwindSafe(self.handler.handle(&mut request, &mut response))
            .catch_unwind()
            .await;

        let completed = match handled {
            Ok(Ok(())) => response.finish().await,
            Ok(Err(err)) => {
                tracing::warn!(%err, "handler failed");
                Err(internal_error(&mut response).await)
            }
            Err(_) => {
                tracing::error!("handler panicked");
                Err(internal_error(&mut response).await)
            }
        };
        let keep_alive = completed.is_ok() && !closing && response.keep_alive();

        let (mut writer, head) = response.into_parts();
        shared.pool.put(head);

        if !matches!(timeout(write_timeout, writer.flush()).await, Ok(Ok(()))) || !keep_alive {
            return Next::Close;
        }

        let mut body = request.into_body();
        if body.kind() != BodyKind::Unbounded && !body.is_finished() {
            match body.drain(shared.req_limits.drain_size).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!("unread request body too large to drain");
                    return Next::Close;
                }
                Err(err) => {
                    tracing::debug!(%err, "failed to drain request body");
                    return Next::Close;
                }
            }
        }

        Next::KeepAlive(body.into_reader(), writer)
    }

    #[inline]
    fn is_expired(&self) -> bool {
        let limits = &self.shared.conn_limits;

        self.request_count >= limits.max_requests_per_connection
            || self.created.elapsed() > limits.connection_lifetime
    }
}

/// Answers `500` if nothing was sent yet. Always yields the error that
/// makes the caller close the connection.
async fn internal_error(response: &mut ResponseWriter) -> Error {
    if !response.headers_sent() {
        let headers = response.headers_mut();
        headers.clear();
        headers.set(names::CONNECTION, "close");

        if let Err(err) = response.send_status(StatusCode::InternalServerError).await {
            return err;
        }
    }
    io::Error::from(io::ErrorKind::Other).into()
}

/// Best-effort write of a complete canned response.
pub(crate) async fn write_bytes<W>(stream: &mut W, bytes: &[u8], limit: Duration) -> Result<(), Error>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    timeout(limit, async {
        stream.write_all(bytes).await?;
        stream.flush().await
    })
    .await??;
    Ok(())
}

/// Response-head buffers shared by all connections.
pub(crate) struct HeadPool {
    queue: ArrayQueue<Vec<u8>>,
    default_capacity: usize,
    max_capacity: usize,
}

impl HeadPool {
    pub(crate) fn new(limits: &RespLimits, size: usize) -> Self {
        Self {
            queue: ArrayQueue::new(size.max(1)),
            default_capacity: limits.default_capacity,
            max_capacity: limits.max_capacity,
        }
    }

    #[inline]
    pub(crate) fn get(&self) -> Vec<u8> {
        self.queue
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.default_capacity))
    }

    /// Returns `buf` to the pool; oversized buffers are dropped.
    #[inline]
    pub(crate) fn put(&self, mut buf: Vec<u8>) {
        if buf.capacity() <= self.max_capacity {
            buf.clear();
            let _ = self.queue.push(buf);
        }
    }
}
