//! Common test utilities
//!
//! A mock DevTools WebSocket endpoint for driving the real connection and client code
//! without a browser, plus helpers for spinning up the HTTP server on a mock launcher.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};

use webrender::cdp::mock::{MockBrowserLauncher, MOCK_PDF, MOCK_PNG};
use webrender::http::{HttpServer, Routes};
use webrender::render::{CaptureExecutor, RenderDefaults};
use webrender::session::SessionManager;

/// Markup the mock endpoint returns for `DOM.getOuterHTML`
pub const PAGE_HTML: &str = "<html><body><h1>Mock Chrome</h1></body></html>";

/// Mock DevTools page endpoint
pub struct MockChromeServer {
    addr: String,
    connections: Arc<AtomicUsize>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl MockChromeServer {
    /// Start the endpoint on an ephemeral port
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let connections = Arc::new(AtomicUsize::new(0));

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let accepted = Arc::clone(&connections);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => match result {
                        Ok((stream, _)) => {
                            accepted.fetch_add(1, Ordering::SeqCst);
                            tokio::spawn(Self::handle_connection(stream));
                        }
                        Err(_) => break,
                    },
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        Ok(Self {
            addr: format!("ws://{}/devtools/page/mock", addr),
            connections,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// WebSocket URL of the page
    pub fn ws_endpoint(&self) -> &str {
        &self.addr
    }

    /// Connections accepted so far
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    async fn handle_connection(stream: TcpStream) {
        let Ok(ws_stream) = accept_async(stream).await else {
            return;
        };
        let (mut sender, mut receiver) = ws_stream.split();

        while let Some(Ok(message)) = receiver.next().await {
            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            let Ok(request) = serde_json::from_str::<Value>(&text) else {
                continue;
            };

            for event in Self::events_for(&request) {
                if sender.send(Message::Text(event.to_string())).await.is_err() {
                    return;
                }
            }
            if let Some(response) = Self::response_for(&request) {
                if sender.send(Message::Text(response.to_string())).await.is_err() {
                    return;
                }
            }
        }
    }

    /// Events the endpoint pushes before answering a command
    fn events_for(request: &Value) -> Vec<Value> {
        match request["method"].as_str() {
            Some("Page.navigate") => vec![
                json!({ "method": "Page.frameStartedLoading", "params": { "frameId": "mock-frame" } }),
                json!({ "method": "Page.loadEventFired", "params": { "timestamp": 1.0 } }),
            ],
            _ => Vec::new(),
        }
    }

    fn response_for(request: &Value) -> Option<Value> {
        let id = request["id"].as_u64().unwrap_or(0);
        let params = &request["params"];

        let result = match request["method"].as_str().unwrap_or("") {
            "Page.navigate" => {
                let url = params["url"].as_str().unwrap_or("");
                if url.contains("never-commits") {
                    return None;
                }
                if url.contains("unreachable") {
                    json!({ "frameId": "mock-frame", "errorText": "net::ERR_NAME_NOT_RESOLVED" })
                } else {
                    json!({ "frameId": "mock-frame", "loaderId": "mock-loader" })
                }
            }
            "Page.hang" => return None,
            "Runtime.evaluate" => match params["expression"].as_str().unwrap_or("") {
                "document.readyState" => json!({ "result": { "type": "string", "value": "complete" } }),
                expr if expr.starts_with("throw") => json!({
                    "result": { "type": "object", "subtype": "error" },
                    "exceptionDetails": {
                        "exceptionId": 1,
                        "text": "Uncaught",
                        "exception": { "type": "object", "description": "Error: boom" }
                    }
                }),
                _ => json!({ "result": { "type": "number", "value": 42 } }),
            },
            "Page.getLayoutMetrics" => json!({
                "cssContentSize": { "x": 0, "y": 0, "width": 1024.0, "height": 2400.2 }
            }),
            "Page.captureScreenshot" => json!({ "data": BASE64.encode(MOCK_PNG) }),
            "Page.printToPDF" => json!({ "data": BASE64.encode(MOCK_PDF) }),
            "DOM.getDocument" => json!({ "root": { "nodeId": 1, "nodeName": "#document" } }),
            "DOM.querySelector" => json!({ "nodeId": 2 }),
            "DOM.getOuterHTML" => json!({ "outerHTML": PAGE_HTML }),
            "Page.handleJavaScriptDialog" => {
                return Some(json!({
                    "id": id,
                    "error": { "code": -32602, "message": "No dialog is showing" }
                }))
            }
            _ => json!({}),
        };

        Some(json!({ "id": id, "result": result }))
    }
}

impl Drop for MockChromeServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// HTTP server rendering through `launcher`, listening on an ephemeral port
pub async fn start_http_server(
    launcher: Arc<MockBrowserLauncher>,
    defaults: RenderDefaults,
) -> (String, HttpServer, tokio::sync::oneshot::Sender<()>) {
    let executor = CaptureExecutor::new(SessionManager::new(launcher), defaults);
    let server = HttpServer::new(executor, Routes::default()).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let serving = server.clone();
    tokio::spawn(async move {
        serving
            .serve(listener, async move {
                let _ = shutdown_rx.await;
            })
            .await
    });

    (base, server, shutdown_tx)
}

/// Render defaults with no post-navigation delay
pub fn fast_defaults() -> RenderDefaults {
    RenderDefaults {
        delay: 0,
        timeout: 5,
        ..RenderDefaults::default()
    }
}
