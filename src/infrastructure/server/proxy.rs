//! Reverse proxy for configured path prefixes, HTTP and WebSocket.

use crate::core::models::ProxyRule;
use crate::utils::{FlowError, Logger, Result};
use axum::body::Body;
use axum::extract::ws::{CloseFrame, Message as ClientMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{FromRequestParts, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use std::sync::Arc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as UpstreamCloseFrame;
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;

const MAX_REQUEST_BODY: usize = 64 * 1024 * 1024;

const HOP_BY_HOP: &[header::HeaderName] = &[
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

#[derive(Debug, Clone)]
pub struct ResolvedRule {
    pub rule: ProxyRule,
    pub target: Url,
}

#[derive(Clone)]
pub struct ProxyState {
    rules: Arc<Vec<ResolvedRule>>,
    client: reqwest::Client,
}

impl ProxyState {
    /// Checks every target origin and builds the forwarding client.
    /// Unparseable, non-http(s) or unresolvable targets fail startup.
    pub async fn new(rules: &[ProxyRule]) -> Result<Self> {
        let mut resolved = Vec::with_capacity(rules.len());
        for rule in rules {
            resolved.push(resolve_rule(rule).await?);
        }

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()
            .map_err(|e| FlowError::ProxyStartup(format!("cannot build proxy client: {}", e)))?;

        Ok(Self {
            rules: Arc::new(resolved),
            client,
        })
    }

    pub fn rules(&self) -> &[ResolvedRule] {
        &self.rules
    }

    fn find(&self, path: &str) -> Option<&ResolvedRule> {
        self.rules.iter().find(|resolved| resolved.rule.matches(path))
    }
}

async fn resolve_rule(rule: &ProxyRule) -> Result<ResolvedRule> {
    let target = Url::parse(&rule.target_origin).map_err(|e| {
        FlowError::ProxyStartup(format!(
            "invalid proxy target '{}' for '{}': {}",
            rule.target_origin, rule.match_prefix, e
        ))
    })?;

    if !matches!(target.scheme(), "http" | "https") {
        return Err(FlowError::ProxyStartup(format!(
            "proxy target '{}' must be an http(s) origin",
            rule.target_origin
        )));
    }

    let host = target
        .host_str()
        .ok_or_else(|| {
            FlowError::ProxyStartup(format!("proxy target '{}' has no host", rule.target_origin))
        })?
        .to_string();
    let port = target.port_or_known_default().unwrap_or(80);

    let mut addresses = tokio::net::lookup_host((host.as_str(), port)).await.map_err(|e| {
        FlowError::ProxyStartup(format!("proxy upstream {} is unreachable: {}", host, e))
    })?;
    if addresses.next().is_none() {
        return Err(FlowError::ProxyStartup(format!(
            "proxy upstream {} has no address",
            host
        )));
    }

    Ok(ResolvedRule {
        rule: rule.clone(),
        target,
    })
}

/// Target origin joined with the full incoming path and query.
pub fn upstream_url(target: &Url, path_and_query: &str) -> String {
    format!("{}{}", target.as_str().trim_end_matches('/'), path_and_query)
}

fn websocket_url(target: &Url, path_and_query: &str) -> String {
    let http = upstream_url(target, path_and_query);
    match http.strip_prefix("https://") {
        Some(rest) => format!("wss://{}", rest),
        None => format!("ws://{}", http.trim_start_matches("http://")),
    }
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("websocket"))
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Forwards matching requests; everything else goes to the inner router.
pub async fn proxy_middleware(State(state): State<ProxyState>, request: Request, next: Next) -> Response {
    let Some(resolved) = state.find(request.uri().path()).cloned() else {
        return next.run(request).await;
    };

    if is_websocket_upgrade(request.headers()) {
        if resolved.rule.forward_web_socket {
            return tunnel_websocket(&resolved, request).await;
        }
        return (StatusCode::BAD_GATEWAY, "WebSocket forwarding is disabled for this route").into_response();
    }

    match forward_http(&state.client, &resolved, request).await {
        Ok(response) => response,
        Err(message) => {
            Logger::warn(&format!("Proxy {} failed: {}", resolved.rule.match_prefix, message));
            (StatusCode::BAD_GATEWAY, message).into_response()
        }
    }
}

async fn forward_http(
    client: &reqwest::Client,
    resolved: &ResolvedRule,
    request: Request,
) -> std::result::Result<Response, String> {
    let (parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = upstream_url(&resolved.target, path_and_query);

    let mut headers = parts.headers.clone();
    strip_hop_by_hop(&mut headers);
    if resolved.rule.rewrite_origin {
        // reqwest fills Host from the target URL.
        headers.remove(header::HOST);
    }

    let body = axum::body::to_bytes(body, MAX_REQUEST_BODY)
        .await
        .map_err(|e| format!("cannot read request body: {}", e))?;

    Logger::debug(&format!("↪️  {} {} -> {}", parts.method, path_and_query, url));
    let upstream = client
        .request(parts.method.clone(), &url)
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(|e| format!("{}: {}", url, e))?;

    let status = upstream.status();
    let mut response_headers = upstream.headers().clone();
    strip_hop_by_hop(&mut response_headers);

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    Ok(response)
}

async fn tunnel_websocket(resolved: &ResolvedRule, request: Request) -> Response {
    let (mut parts, _body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };

    let url = websocket_url(&resolved.target, &path_and_query);
    let upstream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            Logger::warn(&format!("WebSocket upstream {} failed: {}", url, e));
            return (StatusCode::BAD_GATEWAY, format!("{}: {}", url, e)).into_response();
        }
    };

    Logger::debug(&format!("🔀 WebSocket tunnel {} -> {}", path_and_query, url));
    upgrade.on_upgrade(move |client| pump(client, upstream))
}

async fn pump<S>(client: WebSocket, upstream: tokio_tungstenite::WebSocketStream<S>)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut client_tx, mut client_rx) = client.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    let client_to_upstream = async {
        while let Some(Ok(message)) = client_rx.next().await {
            if upstream_tx.send(to_upstream(message)).await.is_err() {
                break;
            }
        }
    };

    let upstream_to_client = async {
        while let Some(Ok(message)) = upstream_rx.next().await {
            let Some(message) = to_client(message) else {
                continue;
            };
            if client_tx.send(message).await.is_err() {
                break;
            }
        }
    };

    tokio::select! {
        _ = client_to_upstream => {}
        _ = upstream_to_client => {}
    }
}

fn to_upstream(message: ClientMessage) -> UpstreamMessage {
    match message {
        ClientMessage::Text(text) => UpstreamMessage::Text(text),
        ClientMessage::Binary(data) => UpstreamMessage::Binary(data),
        ClientMessage::Ping(data) => UpstreamMessage::Ping(data),
        ClientMessage::Pong(data) => UpstreamMessage::Pong(data),
        ClientMessage::Close(frame) => UpstreamMessage::Close(frame.map(|frame| UpstreamCloseFrame {
            code: CloseCode::from(frame.code),
            reason: frame.reason,
        })),
    }
}

fn to_client(message: UpstreamMessage) -> Option<ClientMessage> {
    match message {
        UpstreamMessage::Text(text) => Some(ClientMessage::Text(text)),
        UpstreamMessage::Binary(data) => Some(ClientMessage::Binary(data)),
        UpstreamMessage::Ping(data) => Some(ClientMessage::Ping(data)),
        UpstreamMessage::Pong(data) => Some(ClientMessage::Pong(data)),
        UpstreamMessage::Close(frame) => Some(ClientMessage::Close(frame.map(|frame| CloseFrame {
            code: u16::from(frame.code),
            reason: frame.reason,
        }))),
        UpstreamMessage::Frame(_) => None,
    }
}
