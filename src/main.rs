use birb::{handler_fn, Error, Handler, Request, ResponseWriter, Router, Server, StatusCode};
use std::path::{Component, Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Serves files below `root`, refusing paths that climb out of it.
struct Files {
    root: PathBuf,
}

impl Handler for Files {
    async fn handle(&self, req: &mut Request, resp: &mut ResponseWriter) -> Result<(), Error> {
        let relative = Path::new(req.param("path").unwrap_or_default());
        if relative.as_os_str().is_empty() {
            return resp.not_found().await;
        }
        if relative.components().any(|c| !matches!(c, Component::Normal(_))) {
            return resp.send_status(StatusCode::Forbidden).await;
        }

        resp.send_file(self.root.join(relative)).await
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "birb=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut router = Router::new();
    router
        .get("{user}.localhost/", handler_fn(|req, resp| Box::pin(async move {
            let text = format!("Home of {}\n", req.param("user").unwrap_or_default());
            resp.write(text).await
        })))?
        .get("/", handler_fn(|_, resp| Box::pin(async move {
            resp.headers_mut().set("Content-Type", "text/plain; charset=utf-8");
            resp.write("Hello from birb!\n").await
        })))?
        .get("/hello/{name}", handler_fn(|req, resp| Box::pin(async move {
            let text = format!("Hello, {}!\n", req.param("name").unwrap_or("stranger"));
            resp.write(text).await
        })))?
        .post("/echo", handler_fn(|req, resp| Box::pin(async move {
            let body = req.body().read_to_end(1024 * 1024).await?;
            resp.send_headers(StatusCode::Ok).await?;
            resp.write(body).await
        })))?
        .get("/files/{path...}", Files { root: std::env::current_dir()? })?;

    Server::builder()
        .port(8080)
        .name("birb-demo")
        .handler(router)
        .build()?
        .launch_with_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    Ok(())
}
