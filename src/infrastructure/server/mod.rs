//! Development server: static files from the output directory, live reload
//! and reverse proxying.

pub mod live_reload;
pub mod live_reload_client;
pub mod proxy;

pub use live_reload::{LiveReloadHub, LiveReloadMessage};
pub use live_reload_client::{inject_client, CLIENT_SCRIPT_PATH, LIVE_RELOAD_PATH};
pub use proxy::ProxyState;

use crate::core::interfaces::ReloadSignal;
use crate::core::models::ProxyRule;
use crate::utils::{FlowError, Logger, Result};
use axum::body::Body;
use axum::extract::{Request, State, WebSocketUpgrade};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

const MAX_HTML_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct DevServerConfig {
    pub host: String,
    pub port: u16,
    pub outdir: PathBuf,
    pub proxy: Vec<ProxyRule>,
}

pub struct DevServer {
    config: DevServerConfig,
    hub: LiveReloadHub,
}

/// A bound server that has not started accepting yet.
pub struct BoundServer {
    listener: TcpListener,
    app: Router,
    addr: SocketAddr,
}

impl DevServer {
    pub fn new(config: DevServerConfig) -> Self {
        Self {
            config,
            hub: LiveReloadHub::new(),
        }
    }

    pub fn hub(&self) -> &LiveReloadHub {
        &self.hub
    }

    /// The signal watch reactions fire once their artifact is rebuilt.
    pub fn reload_signal(&self) -> Arc<dyn ReloadSignal> {
        Arc::new(self.hub.clone())
    }

    /// Validates proxy targets and binds the port. Every failure here is a
    /// startup failure.
    pub async fn bind(&self) -> Result<BoundServer> {
        let proxy = ProxyState::new(&self.config.proxy).await?;
        for resolved in proxy.rules() {
            Logger::info(&format!(
                "🔀 Proxy {} -> {}",
                resolved.rule.match_prefix, resolved.target
            ));
        }

        let address = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| FlowError::ProxyStartup(format!("cannot bind {}: {}", address, e)))?;
        let addr = listener.local_addr().map_err(FlowError::Io)?;

        Ok(BoundServer {
            listener,
            app: self.router(proxy),
            addr,
        })
    }

    fn router(&self, proxy: ProxyState) -> Router {
        let static_files = ServeDir::new(&self.config.outdir).append_index_html_on_directories(true);

        Router::new()
            .route(LIVE_RELOAD_PATH, get(live_reload_socket))
            .route(CLIENT_SCRIPT_PATH, get(live_reload_script))
            .with_state(self.hub.clone())
            .fallback_service(static_files)
            .layer(middleware::from_fn(inject_live_reload))
            .layer(middleware::from_fn_with_state(proxy, proxy::proxy_middleware))
    }
}

impl BoundServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serves until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(self.listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(FlowError::Io)
    }
}

async fn live_reload_socket(ws: WebSocketUpgrade, State(hub): State<LiveReloadHub>) -> Response {
    ws.on_upgrade(move |socket| hub.handle_socket(socket))
}

async fn live_reload_script() -> Response {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        live_reload_client::client_script(),
    )
        .into_response()
}

/// Adds the live-reload client to successful HTML responses.
async fn inject_live_reload(request: Request, next: Next) -> Response {
    let response = next.run(request).await;

    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/html"));
    if response.status() != StatusCode::OK || !is_html {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_HTML_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            Logger::warn(&format!("Cannot inject live reload: {}", e));
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let html = inject_client(&String::from_utf8_lossy(&bytes));
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(html))
}
