use crate::{
    config::Config,
    errors::{Error, SERVICE_UNAVAILABLE},
    http::{request::Request, response::ResponseWriter},
    limits::{ConnLimits, ReqLimits, RespLimits, ServerLimits},
    server::connection::{write_bytes, HeadPool, HttpConnection, Shared},
};
use futures_util::future::BoxFuture;
use socket2::{Domain, Protocol, Socket, Type};
use std::{
    future::{pending, Future},
    io,
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};
use tokio::{
    net::TcpListener,
    sync::{watch, Semaphore},
};
use tracing::{instrument::WithSubscriber, Dispatch, Instrument};

/// Turns a request into a response.
///
/// The connection finishes the response after `handle` returns: a handler
/// that wrote nothing sends `200 OK` with an empty body. Returning an error
/// (or panicking) before the head went out produces `500 Internal Server
/// Error`; in every failure case the connection is closed afterwards.
///
/// # Examples
///
/// ```
/// use birb::{Error, Handler, Request, ResponseWriter};
///
/// struct Hello;
///
/// impl Handler for Hello {
///     async fn handle(&self, req: &mut Request, resp: &mut ResponseWriter) -> Result<(), Error> {
///         let name = req.param("name").unwrap_or("stranger").to_owned();
///         resp.write(format!("Hello, {name}!")).await
///     }
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    fn handle(
        &self,
        request: &mut Request,
        response: &mut ResponseWriter,
    ) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Object-safe form of [`Handler`], so routes can hold different handler types.
pub(crate) trait DynHandler: Send + Sync + 'static {
    fn call<'a>(&'a self, request: &'a mut Request, response: &'a mut ResponseWriter) -> BoxFuture<'a, Result<(), Error>>;
}

impl<H: Handler> DynHandler for H {
    #[inline]
    fn call<'a>(&'a self, request: &'a mut Request, response: &'a mut ResponseWriter) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(self.handle(request, response))
    }
}

/// Handler built from a closure by [`handler_fn`].
#[derive(Clone, Copy)]
pub struct HandlerFn<F>(F);

/// Wraps a closure returning a boxed future into a [`Handler`].
///
/// ```
/// use birb::handler_fn;
///
/// let hello = handler_fn(|_, resp| Box::pin(async move { resp.write("Hello!").await }));
/// ```
#[inline]
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(&'a mut Request, &'a mut ResponseWriter) -> BoxFuture<'a, Result<(), Error>> + Send + Sync + 'static,
{
    HandlerFn(f)
}

impl<F> Handler for HandlerFn<F>
where
    F: for<'a> Fn(&'a mut Request, &'a mut ResponseWriter) -> BoxFuture<'a, Result<(), Error>> + Send + Sync + 'static,
{
    #[inline]
    fn handle(
        &self,
        request: &mut Request,
        response: &mut ResponseWriter,
    ) -> impl Future<Output = Result<(), Error>> + Send {
        async move { (self.0)(request, response).await }
    }
}

/// An HTTP/1.1 server: one tokio task per accepted connection.
///
/// # Examples
///
/// ```no_run
/// use birb::{handler_fn, Router, Server};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut router = Router::new();
///     router.get("/", handler_fn(|_, resp| Box::pin(async move { resp.write("Hello world!").await })))?;
///
///     Server::builder().port(8080).handler(router).build()?.launch().await;
///     Ok(())
/// }
/// ```
pub struct Server<H: Handler> {
    listener: TcpListener,
    handler: Arc<H>,
    logger: Option<Dispatch>,
    server_limits: ServerLimits,
    shared: Arc<Shared>,
}

impl<H: Handler> Server<H> {
    /// Creates a new builder for configuring the server instance.
    #[inline]
    pub fn builder() -> ServerBuilder<H> {
        ServerBuilder {
            listener: None,
            handler: None,
            config: Config::default(),

            server_limits: None,
            connection_limits: None,
            request_limits: None,
            response_limits: None,
        }
    }

    /// Address the listener is bound to.
    #[inline]
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until the process ends.
    #[inline]
    pub async fn launch(self) {
        self.launch_with_shutdown(pending()).await
    }

    /// Accepts connections until `signal` resolves, then waits for live
    /// connections to finish.
    ///
    /// Idle connections close at once; busy ones close after the exchange
    /// in progress.
    ///
    /// ```no_run
    /// # use birb::{handler_fn, Server};
    /// # #[tokio::main]
    /// # async fn main() -> std::io::Result<()> {
    /// # let handler = handler_fn(|_, resp| Box::pin(async move { resp.write("Hi").await }));
    /// let server = Server::builder().handler(handler).build()?;
    ///
    /// server
    ///     .launch_with_shutdown(async {
    ///         let _ = tokio::signal::ctrl_c().await;
    ///     })
    ///     .await;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn launch_with_shutdown(mut self, signal: impl Future<Output = ()> + Send) {
        match self.logger.take() {
            Some(logger) => self.serve(signal).with_subscriber(logger).await,
            None => self.serve(signal).await,
        }
    }

    async fn serve(self, signal: impl Future<Output = ()> + Send) {
        let Self {
            listener,
            handler,
            server_limits,
            shared,
            ..
        } = self;

        match listener.local_addr() {
            Ok(address) => tracing::info!(name = %shared.name, %address, "listening"),
            Err(_) => tracing::info!(name = %shared.name, "listening"),
        }

        let permits = Arc::new(Semaphore::new(server_limits.max_connections));
        let (notify, shutdown) = watch::channel(false);
        tokio::pin!(signal);

        loop {
            let (stream, peer) = tokio::select! {
                _ = &mut signal => break,
                accepted = listener.accept() => match accepted {
                    Ok(value) => value,
                    Err(err) => {
                        tracing::debug!(%err, "accept failed");
                        continue;
                    }
                },
            };

            let Ok(permit) = permits.clone().try_acquire_owned() else {
                tracing::warn!(%peer, "connection limit reached");
                let write_timeout = shared.conn_limits.socket_write_timeout;

                tokio::spawn(
                    async move {
                        let mut stream = stream;
                        let _ = write_bytes(&mut stream, SERVICE_UNAVAILABLE, write_timeout).await;
                    }
                    .with_current_subscriber(),
                );
                continue;
            };

            let conn = HttpConnection::new(handler.clone(), shared.clone(), shutdown.clone());
            tokio::spawn(
                async move {
                    conn.run(stream).await;
                    drop(permit);
                }
                .instrument(tracing::info_span!("conn", %peer))
                .with_current_subscriber(),
            );
        }

        drop(listener);
        tracing::info!(name = %shared.name, "shutting down");

        let _ = notify.send(true);
        let all = u32::try_from(server_limits.max_connections).unwrap_or(u32::MAX);
        let _ = permits.acquire_many(all).await;

        tracing::info!(name = %shared.name, "stopped");
    }
}

/// Builder for configuring and creating [`Server`] instances.
///
/// Everything except [`handler`](Self::handler) has a default. Without a
/// [`listener`](Self::listener) the server binds `0.0.0.0` on the configured
/// [`port`](Self::port).
pub struct ServerBuilder<H: Handler> {
    listener: Option<TcpListener>,
    handler: Option<H>,
    config: Config,

    server_limits: Option<ServerLimits>,
    connection_limits: Option<ConnLimits>,
    request_limits: Option<ReqLimits>,
    response_limits: Option<RespLimits>,
}

impl<H: Handler> ServerBuilder<H> {
    /// Uses an already bound listener instead of binding `port`.
    ///
    /// ```no_run
    /// # use birb::{handler_fn, Server};
    /// # #[tokio::main]
    /// # async fn main() -> std::io::Result<()> {
    /// # let handler = handler_fn(|_, resp| Box::pin(async move { resp.write("Hi").await }));
    /// use tokio::net::TcpListener;
    ///
    /// let server = Server::builder()
    ///     .listener(TcpListener::bind("127.0.0.1:8080").await?)
    ///     .handler(handler)
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    #[inline(always)]
    pub fn listener(mut self, listener: TcpListener) -> Self {
        self.listener = Some(listener);
        self
    }

    #[inline(always)]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Name sent in the `Server` header and logged at startup.
    #[inline(always)]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Subscriber for the server's events, see [`Config::logger`].
    #[inline(always)]
    pub fn logger(mut self, logger: impl Into<Dispatch>) -> Self {
        self.config.logger = Some(logger.into());
        self
    }

    /// Replaces name, port and logger at once.
    #[inline(always)]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Sets the request handler, usually a [`Router`](crate::Router).
    ///
    /// **This is a required component.**
    #[inline(always)]
    pub fn handler(mut self, handler: H) -> Self {
        self.handler = Some(handler);
        self
    }

    #[inline(always)]
    pub fn server_limits(mut self, limits: ServerLimits) -> Self {
        self.server_limits = Some(limits);
        self
    }

    #[inline(always)]
    pub fn connection_limits(mut self, limits: ConnLimits) -> Self {
        self.connection_limits = Some(limits);
        self
    }

    #[inline(always)]
    pub fn request_limits(mut self, limits: ReqLimits) -> Self {
        self.request_limits = Some(limits);
        self
    }

    #[inline(always)]
    pub fn response_limits(mut self, limits: RespLimits) -> Self {
        self.response_limits = Some(limits);
        self
    }

    /// Finalizes the builder, binding the port if no listener was given.
    ///
    /// # Errors
    ///
    /// Fails when the listening socket cannot be created or bound.
    ///
    /// # Panics
    ///
    /// - ``The `handler` method must be called to create`` when no handler
    ///   was set.
    /// - Outside a tokio runtime, when the port has to be bound here.
    #[inline]
    #[track_caller]
    pub fn build(self) -> io::Result<Server<H>> {
        let handler = self
            .handler
            .expect("The `handler` method must be called to create");

        let server_limits = self.server_limits.unwrap_or_default();
        let resp_limits = self.response_limits.unwrap_or_default();

        let listener = match self.listener {
            Some(listener) => listener,
            None => {
                let address = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.config.port));
                bind(address, server_limits.backlog)?
            }
        };

        let shared = Shared {
            name: Arc::from(self.config.name),
            pool: HeadPool::new(&resp_limits, server_limits.max_connections),
            conn_limits: self.connection_limits.unwrap_or_default(),
            req_limits: self.request_limits.unwrap_or_default(),
            resp_limits,
        };

        Ok(Server {
            listener,
            handler: Arc::new(handler),
            logger: self.config.logger,
            server_limits,
            shared: Arc::new(shared),
        })
    }
}

fn bind(address: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(address), Type::STREAM, Some(Protocol::TCP))?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&address.into())?;
    socket.listen(backlog)?;

    TcpListener::from_std(socket.into())
}

#[cfg(test)]
mod server_tests {
    use super::*;
    use crate::{handler_fn, Router, StatusCode};
    use std::time::Duration;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpStream,
        sync::oneshot,
        task::JoinHandle,
        time::timeout,
    };

    struct Fail;

    impl Handler for Fail {
        async fn handle(&self, _: &mut Request, _: &mut ResponseWriter) -> Result<(), Error> {
            Err(Error::BodyOverflow { declared: 0 })
        }
    }

    struct Panic;

    impl Handler for Panic {
        async fn handle(&self, _: &mut Request, _: &mut ResponseWriter) -> Result<(), Error> {
            panic!("handler bug")
        }
    }

    fn router() -> Router {
        let mut router = Router::new();
        router
            .get("/", handler_fn(|_, resp| Box::pin(async move { resp.write("OK").await })))
            .unwrap()
            .post("/echo", handler_fn(|req, resp| {
                Box::pin(async move {
                    let body = req.body().read_to_end(1024).await?;
                    resp.write(body).await
                })
            }))
            .unwrap()
            .get("/fail", Fail)
            .unwrap()
            .get("/panic", Panic)
            .unwrap()
            .get("/empty", handler_fn(|_, resp| Box::pin(async move { resp.send_status(StatusCode::NoContent).await })))
            .unwrap()
            .get("/slow", handler_fn(|_, resp| {
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    resp.send_status(StatusCode::Accepted).await
                })
            }))
            .unwrap();
        router
    }

    async fn start(builder: ServerBuilder<Router>) -> (SocketAddr, oneshot::Sender<()>, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = builder.listener(listener).handler(router()).build().unwrap();
        let address = server.local_addr().unwrap();

        let (stop, signal) = oneshot::channel::<()>();
        let task = tokio::spawn(server.launch_with_shutdown(async move {
            let _ = signal.await;
        }));

        (address, stop, task)
    }

    /// Reads until the peer closes.
    async fn read_all(stream: &mut TcpStream) -> String {
        let mut out = Vec::new();
        timeout(Duration::from_secs(5), stream.read_to_end(&mut out))
            .await
            .unwrap()
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    /// Reads exactly one `Content-Length` framed response.
    async fn read_response(stream: &mut TcpStream) -> String {
        let mut out = Vec::new();
        let mut byte = [0; 1];

        while !out.ends_with(b"\r\n\r\n") {
            assert_eq!(stream.read(&mut byte).await.unwrap(), 1, "closed mid-head");
            out.push(byte[0]);
        }

        let head = String::from_utf8(out.clone()).unwrap();
        let length = head
            .lines()
            .find_map(|l| l.strip_prefix("Content-Length: "))
            .map_or(0, |v| v.parse().unwrap());

        let mut body = vec![0; length];
        stream.read_exact(&mut body).await.unwrap();
        out.extend(body);
        String::from_utf8(out).unwrap()
    }

    fn body(response: &str) -> &str {
        response.split_once("\r\n\r\n").map_or("", |(_, b)| b)
    }

    #[tokio::test]
    async fn serves_and_keeps_alive() {
        let (address, stop, task) = start(Server::builder().name("Test")).await;
        let mut client = TcpStream::connect(address).await.unwrap();

        client.write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").await.unwrap();
        let first = read_response(&mut client).await;
        assert!(first.starts_with("HTTP/1.1 200 OK\r\n"), "{first}");
        assert!(first.contains("Content-Length: 2\r\n"));
        assert!(first.contains("Server: Test\r\n"));
        assert_eq!(body(&first), "OK");

        client
            .write_all(b"POST /echo HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n2\r\nde\r\n0\r\n\r\n")
            .await
            .unwrap();
        let second = read_response(&mut client).await;
        assert_eq!(body(&second), "abcde");

        client.write_all(b"GET /missing HTTP/1.1\r\nConnection: close\r\n\r\n").await.unwrap();
        let third = read_all(&mut client).await;
        assert!(third.starts_with("HTTP/1.1 404 Not Found\r\n"), "{third}");
        assert!(third.contains("Connection: close\r\n"));

        stop.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn unread_body_is_drained() {
        let (address, _stop, _task) = start(Server::builder()).await;
        let mut client = TcpStream::connect(address).await.unwrap();

        client
            .write_all(b"GET / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhelloGET / HTTP/1.1\r\n\r\n")
            .await
            .unwrap();

        for _ in 0..2 {
            let response = read_response(&mut client).await;
            assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
        }
    }

    #[tokio::test]
    async fn malformed_request_gets_canned_error() {
        let (address, _stop, _task) = start(Server::builder()).await;

        #[rustfmt::skip]
        let cases: [(&[u8], &str); 3] = [
            (b"BREW / HTTP/1.1\r\n\r\n",      "HTTP/1.1 400 Bad Request\r\n"),
            (b"GET / HTTP/2.0\r\n\r\n",       "HTTP/1.1 505 HTTP Version Not Supported\r\n"),
            (b"GET / HTTP/1.1\r\nnope\r\n\r\n", "HTTP/1.1 400 Bad Request\r\n"),
        ];

        for (raw, status) in cases {
            let mut client = TcpStream::connect(address).await.unwrap();
            client.write_all(raw).await.unwrap();

            let response = read_all(&mut client).await;
            assert!(response.starts_with(status), "{response}");
            assert!(response.contains("connection: close\r\n"));
        }
    }

    #[tokio::test]
    async fn failing_handlers_get_500() {
        let (address, _stop, _task) = start(Server::builder()).await;

        for path in ["/fail", "/panic"] {
            let mut client = TcpStream::connect(address).await.unwrap();
            let raw = format!("GET {path} HTTP/1.1\r\n\r\n");
            client.write_all(raw.as_bytes()).await.unwrap();

            let response = read_all(&mut client).await;
            assert!(response.starts_with("HTTP/1.1 500 Internal Server Error\r\n"), "{response}");
            assert_eq!(body(&response), "Internal Server Error");
        }
    }

    #[tokio::test]
    async fn over_capacity_gets_503() {
        let limits = ServerLimits {
            max_connections: 1,
            ..ServerLimits::default()
        };
        let (address, _stop, _task) = start(Server::builder().server_limits(limits)).await;

        let mut first = TcpStream::connect(address).await.unwrap();
        first.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        read_response(&mut first).await;

        let mut second = TcpStream::connect(address).await.unwrap();
        let response = read_all(&mut second).await;
        assert!(response.starts_with("HTTP/1.1 503 Service Unavailable\r\n"), "{response}");
    }

    #[tokio::test]
    async fn request_cap_closes_connection() {
        let limits = ConnLimits {
            max_requests_per_connection: 1,
            ..ConnLimits::default()
        };
        let (address, _stop, _task) = start(Server::builder().connection_limits(limits)).await;
        let mut client = TcpStream::connect(address).await.unwrap();

        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        let response = read_all(&mut client).await;
        assert!(response.contains("Connection: close\r\n"), "{response}");
    }

    #[tokio::test]
    async fn idle_keep_alive_connection_closes() {
        let limits = ConnLimits {
            keep_alive_timeout: Duration::from_millis(100),
            ..ConnLimits::default()
        };
        let (address, _stop, _task) = start(Server::builder().connection_limits(limits)).await;
        let mut client = TcpStream::connect(address).await.unwrap();

        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        let response = read_response(&mut client).await;
        assert!(!response.contains("Connection: close\r\n"), "{response}");

        let started = std::time::Instant::now();
        assert_eq!(read_all(&mut client).await, "");
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn oversized_unread_body_closes_connection() {
        let limits = ReqLimits {
            drain_size: 4,
            ..ReqLimits::default()
        };
        let (address, _stop, _task) = start(Server::builder().request_limits(limits)).await;
        let mut client = TcpStream::connect(address).await.unwrap();

        client
            .write_all(b"GET / HTTP/1.1\r\nContent-Length: 10\r\n\r\n0123456789GET / HTTP/1.1\r\n\r\n")
            .await
            .unwrap();

        let output = read_all(&mut client).await;
        assert!(output.starts_with("HTTP/1.1 200 OK\r\n"), "{output}");
        assert_eq!(output.matches("HTTP/1.1 200 OK").count(), 1, "{output}");
    }

    #[tokio::test]
    async fn expired_connection_closes_after_response() {
        let limits = ConnLimits {
            connection_lifetime: Duration::from_millis(100),
            ..ConnLimits::default()
        };
        let (address, _stop, _task) = start(Server::builder().connection_limits(limits)).await;
        let mut client = TcpStream::connect(address).await.unwrap();

        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        let first = read_response(&mut client).await;
        assert!(!first.contains("Connection: close\r\n"), "{first}");

        tokio::time::sleep(Duration::from_millis(200)).await;
        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();

        let second = read_all(&mut client).await;
        assert!(second.starts_with("HTTP/1.1 200 OK\r\n"), "{second}");
        assert!(second.contains("Connection: close\r\n"), "{second}");
    }

    #[tokio::test]
    async fn no_content_keeps_connection_open() {
        let (address, _stop, _task) = start(Server::builder()).await;
        let mut client = TcpStream::connect(address).await.unwrap();

        client.write_all(b"GET /empty HTTP/1.1\r\n\r\n").await.unwrap();
        let first = read_response(&mut client).await;
        assert!(first.starts_with("HTTP/1.1 204 No Content\r\n"), "{first}");
        assert!(!first.contains("Content-Type"), "{first}");
        assert!(!first.contains("Connection: close"), "{first}");

        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        assert_eq!(body(&read_response(&mut client).await), "OK");
    }

    #[tokio::test]
    async fn graceful_shutdown_finishes_exchange() {
        let (address, stop, task) = start(Server::builder()).await;

        let mut idle = TcpStream::connect(address).await.unwrap();
        let mut busy = TcpStream::connect(address).await.unwrap();
        busy.write_all(b"GET /slow HTTP/1.1\r\n\r\n").await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.send(()).unwrap();

        let response = read_all(&mut busy).await;
        assert!(response.starts_with("HTTP/1.1 202 Accepted\r\n"), "{response}");
        assert_eq!(read_all(&mut idle).await, "");

        timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
        assert!(TcpStream::connect(address).await.is_err());
    }
}
