//! HTTP server
//!
//! An axum router over the configured paths. The render route answers GET and POST and
//! reads form fields from the query string and from urlencoded bodies.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{Form, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::http::form::{self, FormFields};
use crate::http::metrics::HttpMetrics;
use crate::render::{CaptureExecutor, RenderResult};
use crate::{Error, Result};

/// Paths the server answers on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routes {
    /// Render endpoint
    pub image: String,
    /// Health check endpoint
    pub healthcheck: String,
    /// Prometheus endpoint
    pub metrics: String,
}

impl Routes {
    /// Routes configured in `config`
    pub fn from_config(config: &Config) -> Self {
        Self {
            image: config.image_url.clone(),
            healthcheck: config.healthcheck_url.clone(),
            metrics: config.metrics_url.clone(),
        }
    }

    /// Every path is absolute and no two routes share one
    pub fn validate(&self) -> Result<()> {
        let paths = [&self.image, &self.healthcheck, &self.metrics];
        if let Some(path) = paths.iter().find(|p| !p.starts_with('/')) {
            return Err(Error::configuration(format!("Route {:?} must start with '/'", path)));
        }
        if self.image == self.healthcheck || self.image == self.metrics || self.healthcheck == self.metrics {
            return Err(Error::configuration("Image, health check and metrics routes must differ"));
        }
        Ok(())
    }
}

impl Default for Routes {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

struct ServerState {
    executor: CaptureExecutor,
    metrics: HttpMetrics,
    routes: Routes,
}

type SharedState = Arc<ServerState>;

/// Render service over HTTP
#[derive(Clone)]
pub struct HttpServer {
    state: SharedState,
}

impl fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpServer").field("routes", &self.state.routes).finish()
    }
}

impl HttpServer {
    /// Create a server rendering through `executor`
    pub fn new(executor: CaptureExecutor, routes: Routes) -> Result<Self> {
        routes.validate()?;
        Ok(Self {
            state: Arc::new(ServerState {
                executor,
                metrics: HttpMetrics::new()?,
                routes,
            }),
        })
    }

    /// Counters exposed on the metrics route
    pub fn metrics(&self) -> &HttpMetrics {
        &self.state.metrics
    }

    /// Configured routes
    pub fn routes(&self) -> &Routes {
        &self.state.routes
    }

    /// Router answering the configured routes; anything else is a 404
    pub fn router(&self) -> Router {
        let routes = &self.state.routes;
        Router::new()
            .route(&routes.image, get(render).post(render))
            .route(&routes.healthcheck, get(healthcheck))
            .route(&routes.metrics, get(metrics))
            .fallback(not_found)
            .with_state(Arc::clone(&self.state))
    }

    /// Accept connections on `listener` until `shutdown` resolves, then wait for open
    /// connections to finish.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(addr = ?listener.local_addr().ok(), "HTTP server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!("Shutdown signal received, stopping server...");
            })
            .await?;

        info!("All connections closed");
        Ok(())
    }
}

async fn render(
    State(state): State<SharedState>,
    uri: Uri,
    query: std::result::Result<Query<FormFields>, QueryRejection>,
    body: std::result::Result<Form<FormFields>, FormRejection>,
) -> Response {
    let channel = uri.path().trim_start_matches('/').to_string();
    debug!(%channel, "Render request");
    state.metrics.record_request(&channel);

    match render_request(&state, query, body).await {
        Ok(result) => ([(CONTENT_TYPE, result.content_type())], result.data).into_response(),
        Err(e) => {
            state.metrics.record_error(&channel);
            warn!(%channel, "Render request failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn render_request(
    state: &ServerState,
    query: std::result::Result<Query<FormFields>, QueryRejection>,
    body: std::result::Result<Form<FormFields>, FormRejection>,
) -> Result<RenderResult> {
    let Query(fields) = query.map_err(|e| form::rejected(e.body_text()))?;
    let body = match body {
        Ok(Form(fields)) => Some(fields),
        // Not a urlencoded body: the query string carries everything
        Err(FormRejection::InvalidFormContentType(_)) => None,
        Err(e) => return Err(form::rejected(e.body_text())),
    };

    let request = form::merge(fields, body).resolve(state.executor.defaults())?;
    state.executor.render(&request).await
}

async fn healthcheck() -> &'static str {
    "OK"
}

async fn metrics(State(state): State<SharedState>) -> Response {
    match state.metrics.encode() {
        Ok(text) => ([(CONTENT_TYPE, "text/plain; version=0.0.4")], text).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}
