//! birb - small HTTP/1.1 server with a method, host and path router
//!
//! One tokio task per connection reads requests straight off the socket,
//! hands them to a [`Handler`] (usually a [`Router`]) and streams the
//! response back, keeping the connection alive between exchanges.
//!
//! # Protocol Support
//!
//! - **HTTP/1.1**: persistent connections, chunked request and response bodies
//! - **HTTP/1.0**: accepted; responses without a length end with the connection
//!
//! # Routing
//!
//! Patterns look like `"GET {user}.example.com/blog/{article}"`:
//! - a method, then an optional host and a path
//! - `{name}` captures one path segment or host label
//! - `{name...}` captures the rest of the path, or any run of host labels
//! - `*` in a host matches any single label
//!
//! Routes are tried in the order they were added; the first match wins and
//! anything unmatched gets `404 Not Found`.
//!
//! # Examples
//!
//! Quick start:
//! ```no_run
//! use birb::{handler_fn, Server};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     Server::builder()
//!         .port(8080)
//!         .handler(handler_fn(|_, resp| Box::pin(async move { resp.write("Hello World!").await })))
//!         .build()?
//!         .launch()
//!         .await;
//!
//!     Ok(())
//! }
//! ```
//! With a router:
//! ```no_run
//! use birb::{handler_fn, Error, Handler, Request, ResponseWriter, Router, Server};
//!
//! struct Echo;
//!
//! impl Handler for Echo {
//!     async fn handle(&self, req: &mut Request, resp: &mut ResponseWriter) -> Result<(), Error> {
//!         let body = req.body().read_to_end(64 * 1024).await?;
//!         resp.headers_mut().set("Content-Type", "application/octet-stream");
//!         resp.write(body).await
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut router = Router::new();
//!     router
//!         .get("/hello/{name}", handler_fn(|req, resp| Box::pin(async move {
//!             let text = format!("Hello, {}!", req.param("name").unwrap_or_default());
//!             resp.write(text).await
//!         })))?
//!         .post("/echo", Echo)?;
//!
//!     Server::builder().port(8080).handler(router).build()?.launch().await;
//!     Ok(())
//! }
//! ```

pub(crate) mod http {
    pub(crate) mod body;
    pub mod headers;
    pub(crate) mod reader;
    pub(crate) mod request;
    pub(crate) mod response;
    pub(crate) mod types;
}
pub mod routing {
    //! Route patterns, the matcher and the [`Router`].

    mod matcher;
    mod pattern;
    mod router;

    pub use self::{
        matcher::{host_match, path_match, RouteParams},
        pattern::{RouteMatch, RoutePattern, RouteSegment},
        router::Router,
    };
}
pub(crate) mod server {
    pub(crate) mod connection;
    pub(crate) mod server_impl;
}
pub(crate) mod config;
pub(crate) mod errors;
pub mod limits;

pub use crate::{
    config::Config,
    errors::{Error, IoError, ParseError, PatternError},
    http::{
        body::{Body, BodyKind},
        headers::{self, Headers},
        request::Request,
        response::ResponseWriter,
        types::{Method, StatusCode, Version},
    },
    routing::{RouteMatch, RouteParams, RoutePattern, RouteSegment, Router},
    server::server_impl::{handler_fn, Handler, HandlerFn, Server, ServerBuilder},
};
pub use futures_util::future::BoxFuture;
