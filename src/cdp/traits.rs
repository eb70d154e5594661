//! CDP (Chrome DevTools Protocol) layer traits
//!
//! This module defines the abstract interfaces the renderer drives the browser through.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// CDP event representation
#[derive(Debug, Clone)]
pub struct CdpEvent {
    /// Event method (e.g., "Inspector.targetCrashed")
    pub method: String,
    /// Event parameters
    pub params: Value,
    /// Session ID (for multi-session targets)
    pub session_id: Option<String>,
}

impl CdpEvent {
    /// Build an event with no session id
    pub fn new<S: Into<String>>(method: S, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
            session_id: None,
        }
    }
}

/// CDP response representation
#[derive(Debug, Clone)]
pub struct CdpResponse {
    /// Response ID (matches request ID)
    pub id: u64,
    /// Response result
    pub result: Option<Value>,
    /// Error if any
    pub error: Option<CdpError>,
}

/// CDP error representation
#[derive(Debug, Clone)]
pub struct CdpError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Additional error data
    pub data: Option<Value>,
}

/// CDP connection trait
///
/// Represents a WebSocket connection to a Chrome DevTools Protocol target.
#[async_trait]
pub trait CdpConnection: Send + Sync + std::fmt::Debug {
    /// Send a CDP command and wait for response
    async fn send_command(&self, method: &str, params: Value) -> Result<CdpResponse, crate::Error>;

    /// Subscribe to CDP events; dropping the receiver unsubscribes
    async fn listen_events(&self) -> Result<mpsc::Receiver<CdpEvent>, crate::Error>;

    /// Close the connection
    async fn close(&self) -> Result<(), crate::Error>;

    /// Check if connection is active
    fn is_active(&self) -> bool;
}

/// CDP client trait
///
/// One page (tab) of a launched browser, with the typed operations a render pipeline needs.
#[async_trait]
pub trait CdpClient: Send + Sync + std::fmt::Debug {
    /// Navigate to a URL and wait until the document has finished loading
    async fn navigate(&self, url: &str) -> Result<NavigationResult, crate::Error>;

    /// Evaluate JavaScript in the page
    async fn evaluate(&self, script: &str, await_promise: bool) -> Result<EvaluationResult, crate::Error>;

    /// Stop all pending loads
    async fn stop_loading(&self) -> Result<(), crate::Error>;

    /// Serialized markup of the first node matching `selector`
    async fn outer_html(&self, selector: &str) -> Result<String, crate::Error>;

    /// Capture a PNG screenshot of the viewport or of the whole page
    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, crate::Error>;

    /// Print the page to PDF
    async fn print_to_pdf(&self, display_header_footer: bool) -> Result<Vec<u8>, crate::Error>;

    /// Enable a domain
    async fn enable_domain(&self, domain: &str) -> Result<(), crate::Error>;

    /// Send these headers with every request the page makes
    async fn set_extra_headers(&self, headers: &BTreeMap<String, String>) -> Result<(), crate::Error>;

    /// Accept or dismiss the currently open JavaScript dialog
    async fn handle_dialog(&self, accept: bool) -> Result<(), crate::Error>;

    /// Call a raw CDP method (returns JSON Value)
    async fn call_method(&self, method: &str, params: Value) -> Result<Value, crate::Error>;

    /// Subscribe to events whose method is in `methods` (empty = every event)
    async fn subscribe_events(&self, methods: &[&str]) -> Result<mpsc::Receiver<CdpEvent>, crate::Error>;
}

/// Navigation result
#[derive(Debug, Clone)]
pub struct NavigationResult {
    /// Frame that navigated
    pub frame_id: Option<String>,
    /// Loader that handled the navigation
    pub loader_id: Option<String>,
    /// URL requested
    pub url: String,
}

/// JavaScript evaluation result
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationResult {
    /// String value
    String(String),
    /// Number value
    Number(f64),
    /// Boolean value
    Bool(bool),
    /// Null value
    Null,
    /// Object/Array (as JSON)
    Object(Value),
}

/// CDP browser trait
///
/// One launched browser process.
#[async_trait]
pub trait CdpBrowser: Send + Sync + std::fmt::Debug {
    /// Open a new tab and return a client bound to it
    async fn new_page(&self) -> Result<Arc<dyn CdpClient>, crate::Error>;

    /// Get browser version; doubles as the liveness check after launch
    async fn version(&self) -> Result<BrowserVersion, crate::Error>;

    /// Close every connection and terminate the process; safe to call repeatedly
    async fn close(&self) -> Result<(), crate::Error>;

    /// Whether the browser has not been closed yet
    fn is_active(&self) -> bool;
}

/// Starts browser processes
#[async_trait]
pub trait BrowserLauncher: Send + Sync + std::fmt::Debug {
    /// Launch a fresh, isolated browser
    async fn launch(&self, config: &LaunchConfig) -> Result<Arc<dyn CdpBrowser>, crate::Error>;
}

/// Everything needed to start one browser process
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchConfig {
    /// Window width in pixels
    pub width: u32,
    /// Window height in pixels
    pub height: u32,
    /// User agent the browser announces
    pub user_agent: String,
    /// Browser binary; looked up on PATH when absent
    pub executable_path: Option<String>,
    /// Proxy server address
    pub proxy: Option<String>,
    /// Pass `--disable-gpu`
    pub disable_gpu: bool,
    /// Pass `--ignore-certificate-errors`
    pub ignore_certificate_errors: bool,
    /// How long to wait for the DevTools endpoint
    pub launch_timeout: Duration,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1280,
            user_agent: "webrender".to_string(),
            executable_path: None,
            proxy: None,
            disable_gpu: true,
            ignore_certificate_errors: true,
            launch_timeout: Duration::from_secs(20),
        }
    }
}

/// Browser version information
#[derive(Debug, Clone)]
pub struct BrowserVersion {
    /// Protocol version
    pub protocol_version: String,
    /// Product name
    pub product: String,
    /// User agent
    pub user_agent: String,
    /// JavaScript engine version
    pub js_version: String,
}
