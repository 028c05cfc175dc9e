use crate::{
    errors::{Error, PatternError},
    http::{request::Request, response::ResponseWriter, types::Method},
    routing::pattern::RoutePattern,
    server::server_impl::{DynHandler, Handler},
};
use std::fmt;

/// Dispatches requests to the first route whose pattern matches.
///
/// Routes are tried in registration order. A request no route accepts gets
/// `404 Not Found`. Captures of the winning pattern are available through
/// [`Request::param`], [`Request::path_params`] and [`Request::host_params`].
///
/// # Examples
///
/// ```
/// use birb::{handler_fn, PatternError, Router};
///
/// fn routes() -> Result<Router, PatternError> {
///     let mut router = Router::new();
///     router
///         .route("GET /", handler_fn(|_, resp| Box::pin(async move {
///             resp.write("home").await
///         })))?
///         .route("GET {user}.example.com/blog/{article}", handler_fn(|req, resp| {
///             Box::pin(async move {
///                 let text = format!("{:?} wrote {:?}", req.param("user"), req.param("article"));
///                 resp.write(text).await
///             })
///         }))?
///         .route("DELETE /drive/{path...}", handler_fn(|req, resp| Box::pin(async move {
///             let path = req.param("path").unwrap_or_default().to_owned();
///             resp.write(path).await
///         })))?;
///
///     Ok(router)
/// }
/// # routes().unwrap();
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<(RoutePattern, Box<dyn DynHandler>)>,
}

impl Router {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for a pattern such as `"GET /blog/{article}"`.
    pub fn route(&mut self, pattern: &str, handler: impl Handler) -> Result<&mut Self, PatternError> {
        let pattern = RoutePattern::parse(pattern)?;
        Ok(self.add(pattern, handler))
    }

    /// Registers `handler` for an already compiled pattern.
    #[inline]
    pub fn add(&mut self, pattern: RoutePattern, handler: impl Handler) -> &mut Self {
        self.routes.push((pattern, Box::new(handler)));
        self
    }

    /// Registers `handler` for `method` and a `[host]/path` pattern.
    pub fn method(&mut self, method: Method, pattern: &str, handler: impl Handler) -> Result<&mut Self, PatternError> {
        let pattern = RoutePattern::with_method(method, pattern)?;
        Ok(self.add(pattern, handler))
    }

    #[inline]
    pub fn get(&mut self, pattern: &str, handler: impl Handler) -> Result<&mut Self, PatternError> {
        self.method(Method::Get, pattern, handler)
    }

    #[inline]
    pub fn post(&mut self, pattern: &str, handler: impl Handler) -> Result<&mut Self, PatternError> {
        self.method(Method::Post, pattern, handler)
    }

    #[inline]
    pub fn put(&mut self, pattern: &str, handler: impl Handler) -> Result<&mut Self, PatternError> {
        self.method(Method::Put, pattern, handler)
    }

    #[inline]
    pub fn delete(&mut self, pattern: &str, handler: impl Handler) -> Result<&mut Self, PatternError> {
        self.method(Method::Delete, pattern, handler)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Index of the first matching route, with its captures applied to `request`.
    fn select(&self, request: &mut Request) -> Option<usize> {
        let host = request.host().map(str::to_owned);

        self.routes.iter().position(|(pattern, _)| {
            match pattern.matches(request.method(), host.as_deref(), request.path()) {
                Some(found) => {
                    request.path_params = found.path;
                    request.host_params = found.host;
                    true
                }
                None => false,
            }
        })
    }
}

impl Handler for Router {
    async fn handle(&self, request: &mut Request, response: &mut ResponseWriter) -> Result<(), Error> {
        match self.select(request) {
            Some(index) => {
                tracing::debug!(pattern = %self.routes[index].0, "route matched");
                self.routes[index].1.call(request, response).await
            }
            None => {
                tracing::debug!(path = request.path(), "no route matched");
                response.not_found().await
            }
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.routes.iter().map(|(p, _)| p)).finish()
    }
}
