use crate::common::write;
use assetflow::core::interfaces::ReloadSignal;
use assetflow::core::models::ProxyRule;
use assetflow::infrastructure::server::{LiveReloadMessage, CLIENT_SCRIPT_PATH, LIVE_RELOAD_PATH};
use assetflow::infrastructure::{DevServer, DevServerConfig};
use assetflow::FlowError;
use axum::extract::Request;
use axum::Router;
use futures::StreamExt;
use std::net::SocketAddr;
use std::path::Path;
use tempfile::tempdir;
use tokio::sync::oneshot;

fn server_config(outdir: &Path, proxy: Vec<ProxyRule>) -> DevServerConfig {
    DevServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        outdir: outdir.to_path_buf(),
        proxy,
    }
}

async fn start(server: &DevServer) -> (SocketAddr, oneshot::Sender<()>) {
    let bound = server.bind().await.unwrap();
    let addr = bound.local_addr();
    let (stop, stopped) = oneshot::channel::<()>();
    tokio::spawn(bound.serve(async move {
        let _ = stopped.await;
    }));
    (addr, stop)
}

/// Upstream that echoes method, path, query and Host header.
async fn echo_upstream() -> SocketAddr {
    let app = Router::new().fallback(|request: Request| async move {
        let host = request
            .headers()
            .get("host")
            .and_then(|h| h.to_str().ok())
            .unwrap_or("")
            .to_string();
        format!(
            "{} {} host={}",
            request.method(),
            request.uri().path_and_query().map(|pq| pq.as_str()).unwrap_or("/"),
            host
        )
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

async fn get(url: String) -> String {
    client().get(url).send().await.unwrap().text().await.unwrap()
}

#[tokio::test]
async fn html_gets_the_live_reload_client() {
    let dir = tempdir().unwrap();
    write(dir.path(), "index.html", "<html><body><div id=\"luckysheet\"></div></body></html>");
    write(dir.path(), "assets/styles/index.css", "a{color:red}");

    let server = DevServer::new(server_config(dir.path(), Vec::new()));
    let (addr, _stop) = start(&server).await;

    let html = get(format!("http://{}/", addr)).await;
    assert!(html.contains(&format!("<script src=\"{}\"></script></body>", CLIENT_SCRIPT_PATH)));

    let css = get(format!("http://{}/assets/styles/index.css", addr)).await;
    assert_eq!(css, "a{color:red}");

    let script = get(format!("http://{}{}", addr, CLIENT_SCRIPT_PATH)).await;
    assert!(script.contains(LIVE_RELOAD_PATH));
}

#[tokio::test]
async fn reload_reaches_connected_browsers() {
    let dir = tempdir().unwrap();
    let server = DevServer::new(server_config(dir.path(), Vec::new()));
    let (addr, _stop) = start(&server).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{}{}", addr, LIVE_RELOAD_PATH))
        .await
        .unwrap();

    let hello = socket.next().await.unwrap().unwrap().into_text().unwrap();
    let hello: LiveReloadMessage = serde_json::from_str(&hello).unwrap();
    assert_eq!(hello, LiveReloadMessage::Connected);
    assert_eq!(server.hub().client_count(), 1);

    server.reload_signal().reload("mainStyle");
    let update = socket.next().await.unwrap().unwrap().into_text().unwrap();
    let update: LiveReloadMessage = serde_json::from_str(&update).unwrap();
    assert_eq!(
        update,
        LiveReloadMessage::Reload {
            reason: "mainStyle".to_string()
        }
    );
}

#[tokio::test]
async fn matching_requests_are_forwarded_upstream() {
    let upstream = echo_upstream().await;
    let dir = tempdir().unwrap();
    write(dir.path(), "index.html", "<html><body></body></html>");

    let rule = ProxyRule {
        match_prefix: "/luckysheet/".to_string(),
        target_origin: format!("http://{}/", upstream),
        rewrite_origin: true,
        forward_web_socket: true,
    };
    let server = DevServer::new(server_config(dir.path(), vec![rule]));
    let (addr, _stop) = start(&server).await;

    let body = client()
        .post(format!("http://{}/luckysheet/api/load?gridKey=7", addr))
        .body("payload")
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, format!("POST /luckysheet/api/load?gridKey=7 host={}", upstream));

    let local = get(format!("http://{}/index.html", addr)).await;
    assert!(local.contains("<body>"));
}

#[tokio::test]
async fn invalid_proxy_target_fails_startup() {
    let dir = tempdir().unwrap();
    let rule = ProxyRule {
        match_prefix: "/luckysheet/".to_string(),
        target_origin: "ws://127.0.0.1:9/".to_string(),
        rewrite_origin: true,
        forward_web_socket: false,
    };
    let server = DevServer::new(server_config(dir.path(), vec![rule]));
    let err = server.bind().await.err().unwrap();
    assert!(matches!(err, FlowError::ProxyStartup(_)));
    assert!(err.is_startup_failure());
}

#[tokio::test]
async fn occupied_port_fails_startup() {
    let dir = tempdir().unwrap();
    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = server_config(dir.path(), Vec::new());
    config.port = taken.local_addr().unwrap().port();

    let err = DevServer::new(config).bind().await.err().unwrap();
    assert!(matches!(err, FlowError::ProxyStartup(_)));
}
