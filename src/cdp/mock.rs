//! Mock CDP implementation for testing
//!
//! [`MockCdpConnection`] answers raw commands from a per-method table so the real client
//! can be exercised without a browser. [`MockCdpClient`], [`MockCdpBrowser`] and
//! [`MockBrowserLauncher`] stand in for a whole browser and can be scripted to hang,
//! fail or emit events.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::cdp::traits::*;
use crate::Error;

/// Minimal PNG the mocks hand out as screenshots
pub const MOCK_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52, 0x00, 0x00,
    0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x02, 0x00, 0x00, 0x00, 0x90, 0x77, 0x53, 0xDE,
];

/// Minimal PDF the mocks hand out as printed pages
pub const MOCK_PDF: &[u8] = b"%PDF-1.4\n%mock\n%%EOF\n";

/// Markup returned for `:root`
pub const MOCK_HTML: &str = "<html><head></head><body>Mock HTML</body></html>";

type Subscriber = (Vec<String>, mpsc::Sender<CdpEvent>);

fn deliver(subscribers: &Mutex<Vec<Subscriber>>, event: &CdpEvent) {
    if let Ok(mut subscribers) = subscribers.lock() {
        subscribers.retain(|(filter, tx)| {
            if !filter.is_empty() && !filter.iter().any(|m| *m == event.method) {
                return !tx.is_closed();
            }
            !matches!(tx.try_send(event.clone()), Err(mpsc::error::TrySendError::Closed(_)))
        });
    }
}

fn subscribe(subscribers: &Mutex<Vec<Subscriber>>, methods: &[&str]) -> mpsc::Receiver<CdpEvent> {
    let (tx, rx) = mpsc::channel(100);
    if let Ok(mut subscribers) = subscribers.lock() {
        subscribers.push((methods.iter().map(|m| m.to_string()).collect(), tx));
    }
    rx
}

/// Mock CDP connection answering from a method table
#[derive(Debug)]
pub struct MockCdpConnection {
    is_active: AtomicBool,
    next_id: AtomicU64,
    responses: Mutex<HashMap<String, Result<Value, String>>>,
    sent: Mutex<Vec<(String, Value)>>,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl MockCdpConnection {
    /// Create a connection with browser-like answers for the commands the client issues
    pub fn new() -> Self {
        let mut responses = HashMap::new();
        responses.insert(
            "Page.navigate".to_string(),
            Ok(json!({ "frameId": "mock-frame", "loaderId": "mock-loader" })),
        );
        responses.insert(
            "Runtime.evaluate".to_string(),
            Ok(json!({ "result": { "type": "string", "value": "complete" } })),
        );
        responses.insert(
            "Page.getLayoutMetrics".to_string(),
            Ok(json!({ "cssContentSize": { "x": 0, "y": 0, "width": 1280.0, "height": 3000.5 } })),
        );
        responses.insert(
            "Page.captureScreenshot".to_string(),
            Ok(json!({ "data": BASE64.encode(MOCK_PNG) })),
        );
        responses.insert(
            "Page.printToPDF".to_string(),
            Ok(json!({ "data": BASE64.encode(MOCK_PDF) })),
        );
        responses.insert(
            "DOM.getDocument".to_string(),
            Ok(json!({ "root": { "nodeId": 1, "nodeName": "#document" } })),
        );
        responses.insert("DOM.querySelector".to_string(), Ok(json!({ "nodeId": 2 })));
        responses.insert("DOM.getOuterHTML".to_string(), Ok(json!({ "outerHTML": MOCK_HTML })));

        Self {
            is_active: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
            responses: Mutex::new(responses),
            sent: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Answer `method` with `result`
    pub fn respond(&self, method: &str, result: Value) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert(method.to_string(), Ok(result));
        }
    }

    /// Answer `method` with a protocol error
    pub fn fail(&self, method: &str, message: &str) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert(method.to_string(), Err(message.to_string()));
        }
    }

    /// Every command sent so far, in order
    pub fn sent(&self) -> Vec<(String, Value)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Methods sent so far, in order
    pub fn sent_methods(&self) -> Vec<String> {
        self.sent().into_iter().map(|(m, _)| m).collect()
    }

    /// Push an event to every listener
    pub fn emit(&self, event: CdpEvent) {
        deliver(&self.subscribers, &event);
    }
}

impl Default for MockCdpConnection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CdpConnection for MockCdpConnection {
    async fn send_command(&self, method: &str, params: Value) -> Result<CdpResponse, Error> {
        if !self.is_active() {
            return Err(Error::websocket("Connection is not active"));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((method.to_string(), params));
        }

        let answer = self
            .responses
            .lock()
            .ok()
            .and_then(|r| r.get(method).cloned())
            .unwrap_or_else(|| Ok(json!({})));

        match answer {
            Ok(result) => Ok(CdpResponse {
                id,
                result: Some(result),
                error: None,
            }),
            Err(message) => Err(Error::cdp(format!("{}: {} (code: -32000)", method, message))),
        }
    }

    async fn listen_events(&self) -> Result<mpsc::Receiver<CdpEvent>, Error> {
        Ok(subscribe(&self.subscribers, &[]))
    }

    async fn close(&self) -> Result<(), Error> {
        self.is_active.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.is_active.load(Ordering::Relaxed)
    }
}

/// How a [`MockCdpClient`] behaves
#[derive(Debug, Clone, Default)]
pub struct MockBehavior {
    /// Navigation never completes
    pub hang_navigation: bool,
    /// Time a navigation takes before it completes
    pub navigation_delay: Duration,
    /// Navigation fails with this error text
    pub navigation_error: Option<String>,
    /// Script evaluation throws
    pub script_error: bool,
    /// Screenshot and PDF capture never complete
    pub hang_capture: bool,
    /// Screenshot and PDF capture fail
    pub capture_error: bool,
    /// Accepting a dialog fails
    pub dialog_error: bool,
}

/// Scriptable mock page
#[derive(Debug, Default)]
pub struct MockCdpClient {
    behavior: MockBehavior,
    calls: Mutex<Vec<String>>,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl MockCdpClient {
    /// Create a mock page that succeeds at everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock page with the given behavior
    pub fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            ..Self::default()
        }
    }

    /// Operations performed so far, in order (e.g. `navigate:https://example.com`)
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Whether an operation starting with `prefix` was performed
    pub fn called(&self, prefix: &str) -> bool {
        self.calls().iter().any(|c| c.starts_with(prefix))
    }

    /// Number of live event subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .map(|s| s.iter().filter(|(_, tx)| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Push an event to every matching subscriber
    pub fn emit(&self, event: CdpEvent) {
        deliver(&self.subscribers, &event);
    }

    fn record<S: Into<String>>(&self, call: S) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call.into());
        }
    }

    async fn capture(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        if self.behavior.hang_capture {
            std::future::pending::<()>().await;
        }
        if self.behavior.capture_error {
            return Err(Error::capture("mock capture failure"));
        }
        Ok(data.to_vec())
    }
}

#[async_trait]
impl CdpClient for MockCdpClient {
    async fn navigate(&self, url: &str) -> Result<NavigationResult, Error> {
        self.record(format!("navigate:{}", url));

        if self.behavior.hang_navigation {
            std::future::pending::<()>().await;
        }
        if !self.behavior.navigation_delay.is_zero() {
            tokio::time::sleep(self.behavior.navigation_delay).await;
        }
        if let Some(error_text) = &self.behavior.navigation_error {
            return Err(Error::navigation(format!("{}: {}", url, error_text)));
        }

        Ok(NavigationResult {
            frame_id: Some("mock-frame".to_string()),
            loader_id: Some("mock-loader".to_string()),
            url: url.to_string(),
        })
    }

    async fn evaluate(&self, script: &str, _await_promise: bool) -> Result<EvaluationResult, Error> {
        self.record(format!("evaluate:{}", script));
        if self.behavior.script_error {
            return Err(Error::navigation("Script threw: mock exception"));
        }
        Ok(EvaluationResult::Null)
    }

    async fn stop_loading(&self) -> Result<(), Error> {
        self.record("stop_loading");
        Ok(())
    }

    async fn outer_html(&self, selector: &str) -> Result<String, Error> {
        self.record(format!("outer_html:{}", selector));
        Ok(MOCK_HTML.to_string())
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, Error> {
        self.record(format!("screenshot:{}", if full_page { "full" } else { "viewport" }));
        self.capture(MOCK_PNG).await
    }

    async fn print_to_pdf(&self, display_header_footer: bool) -> Result<Vec<u8>, Error> {
        self.record(format!("print_to_pdf:{}", display_header_footer));
        self.capture(MOCK_PDF).await
    }

    async fn enable_domain(&self, domain: &str) -> Result<(), Error> {
        self.record(format!("enable_domain:{}", domain));
        Ok(())
    }

    async fn set_extra_headers(&self, headers: &BTreeMap<String, String>) -> Result<(), Error> {
        let names: Vec<&str> = headers.keys().map(|k| k.as_str()).collect();
        self.record(format!("set_extra_headers:{}", names.join(",")));
        Ok(())
    }

    async fn handle_dialog(&self, accept: bool) -> Result<(), Error> {
        self.record(format!("handle_dialog:{}", accept));
        if self.behavior.dialog_error {
            return Err(Error::dialog_handling("No dialog is showing"));
        }
        Ok(())
    }

    async fn call_method(&self, method: &str, _params: Value) -> Result<Value, Error> {
        self.record(format!("call_method:{}", method));
        Ok(json!({}))
    }

    async fn subscribe_events(&self, methods: &[&str]) -> Result<mpsc::Receiver<CdpEvent>, Error> {
        Ok(subscribe(&self.subscribers, methods))
    }
}

/// Mock browser handing out one scripted page per `new_page`
#[derive(Debug)]
pub struct MockCdpBrowser {
    is_active: AtomicBool,
    behavior: MockBehavior,
    fail_version: bool,
    live: Arc<AtomicUsize>,
    pages: Arc<Mutex<Vec<Arc<MockCdpClient>>>>,
}

impl MockCdpBrowser {
    /// Create a standalone mock browser
    pub fn new() -> Self {
        Self::attached(
            MockBehavior::default(),
            false,
            Arc::new(AtomicUsize::new(0)),
            Arc::new(Mutex::new(Vec::new())),
        )
    }

    fn attached(
        behavior: MockBehavior,
        fail_version: bool,
        live: Arc<AtomicUsize>,
        pages: Arc<Mutex<Vec<Arc<MockCdpClient>>>>,
    ) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self {
            is_active: AtomicBool::new(true),
            behavior,
            fail_version,
            live,
            pages,
        }
    }
}

impl Default for MockCdpBrowser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CdpBrowser for MockCdpBrowser {
    async fn new_page(&self) -> Result<Arc<dyn CdpClient>, Error> {
        if !self.is_active() {
            return Err(Error::cdp("Browser is closed"));
        }

        let page = Arc::new(MockCdpClient::with_behavior(self.behavior.clone()));
        if let Ok(mut pages) = self.pages.lock() {
            pages.push(Arc::clone(&page));
        }
        Ok(page)
    }

    async fn version(&self) -> Result<BrowserVersion, Error> {
        if self.fail_version || !self.is_active() {
            return Err(Error::cdp("Browser is not responding"));
        }
        Ok(BrowserVersion {
            protocol_version: "1.3".to_string(),
            product: "HeadlessChrome/120.0.0.0".to_string(),
            user_agent: "webrender".to_string(),
            js_version: "12.0.267.8".to_string(),
        })
    }

    async fn close(&self) -> Result<(), Error> {
        if self.is_active.swap(false, Ordering::SeqCst) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.is_active.load(Ordering::SeqCst)
    }
}

/// Mock launcher tracking how many of its browsers are still running
#[derive(Debug, Default)]
pub struct MockBrowserLauncher {
    behavior: MockBehavior,
    fail_launch: bool,
    fail_version: bool,
    launches: AtomicUsize,
    live: Arc<AtomicUsize>,
    pages: Arc<Mutex<Vec<Arc<MockCdpClient>>>>,
    configs: Mutex<Vec<LaunchConfig>>,
}

impl MockBrowserLauncher {
    /// Launcher whose browsers succeed at everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Launcher whose pages follow `behavior`
    pub fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            ..Self::default()
        }
    }

    /// Launcher that cannot start a browser
    pub fn failing() -> Self {
        Self {
            fail_launch: true,
            ..Self::default()
        }
    }

    /// Launcher whose browsers start but fail the liveness check
    pub fn unresponsive() -> Self {
        Self {
            fail_version: true,
            ..Self::default()
        }
    }

    /// Browsers launched so far
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Browsers launched and not yet closed
    pub fn live_browsers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Every page opened so far
    pub fn pages(&self) -> Vec<Arc<MockCdpClient>> {
        self.pages.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Most recently opened page
    pub fn last_page(&self) -> Option<Arc<MockCdpClient>> {
        self.pages().pop()
    }

    /// Launch configurations received, in order
    pub fn configs(&self) -> Vec<LaunchConfig> {
        self.configs.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl BrowserLauncher for MockBrowserLauncher {
    async fn launch(&self, config: &LaunchConfig) -> Result<Arc<dyn CdpBrowser>, Error> {
        if let Ok(mut configs) = self.configs.lock() {
            configs.push(config.clone());
        }
        if self.fail_launch {
            return Err(Error::browser_launch("mock browser binary missing"));
        }

        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockCdpBrowser::attached(
            self.behavior.clone(),
            self.fail_version,
            Arc::clone(&self.live),
            Arc::clone(&self.pages),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_connection_records_commands() {
        let conn = MockCdpConnection::new();
        assert!(conn.is_active());

        let response = conn.send_command("Page.enable", json!({})).await.unwrap();
        assert!(response.result.is_some());
        assert_eq!(conn.sent_methods(), vec!["Page.enable".to_string()]);

        conn.close().await.unwrap();
        assert!(conn.send_command("Page.enable", json!({})).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_client_filters_events() {
        let client = MockCdpClient::new();
        let mut crashes = client.subscribe_events(&["Inspector.targetCrashed"]).await.unwrap();

        client.emit(CdpEvent::new("Runtime.consoleAPICalled", json!({})));
        client.emit(CdpEvent::new("Inspector.targetCrashed", json!({})));

        let event = crashes.recv().await.unwrap();
        assert_eq!(event.method, "Inspector.targetCrashed");
    }

    #[tokio::test]
    async fn test_launcher_tracks_live_browsers() {
        let launcher = MockBrowserLauncher::new();
        let browser = launcher.launch(&LaunchConfig::default()).await.unwrap();
        assert_eq!(launcher.live_browsers(), 1);

        browser.close().await.unwrap();
        browser.close().await.unwrap();
        assert_eq!(launcher.live_browsers(), 0);
        assert_eq!(launcher.launches(), 1);
    }
}
