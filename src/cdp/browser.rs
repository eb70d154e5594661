//! Chrome process management
//!
//! [`ChromeLauncher`] starts one headless Chrome per session with a throwaway profile and
//! waits for it to announce its DevTools endpoint. [`ChromeBrowser`] opens tabs over the
//! DevTools HTTP API and owns the process until it is closed.

use super::client::CdpClientImpl;
use super::connection::CdpWebSocketConnection;
use super::traits::*;
use crate::Error;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

/// Binaries tried in order when no executable path is configured
const CHROME_CANDIDATES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

/// Flags every launched browser gets
const DEFAULT_FLAGS: &[&str] = &[
    "--headless",
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-background-networking",
    "--enable-features=NetworkService,NetworkServiceInProcess",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-breakpad",
    "--disable-client-side-phishing-detection",
    "--disable-default-apps",
    "--disable-dev-shm-usage",
    "--disable-extensions",
    "--disable-features=site-per-process,Translate,BlinkGenPropertyTrees",
    "--disable-hang-monitor",
    "--disable-ipc-flooding-protection",
    "--disable-popup-blocking",
    "--disable-prompt-on-repost",
    "--disable-renderer-backgrounding",
    "--disable-sync",
    "--force-color-profile=srgb",
    "--metrics-recording-only",
    "--safebrowsing-disable-auto-update",
    "--enable-automation",
    "--password-store=basic",
    "--use-mock-keychain",
    "--remote-debugging-port=0",
];

const DEVTOOLS_PREFIX: &str = "DevTools listening on ";

/// Domains every new tab enables; crash notifications only flow once Inspector is on
pub const PAGE_DOMAINS: &[&str] = &["Page", "Runtime", "Inspector"];

/// Enable the domains whose events and commands a render relies on
pub async fn enable_page_domains(page: &dyn CdpClient) -> Result<(), Error> {
    for domain in PAGE_DOMAINS {
        page.enable_domain(domain).await?;
    }
    Ok(())
}

/// Command line for one browser process, excluding the binary
pub fn chrome_args(config: &LaunchConfig, profile_dir: &Path) -> Vec<String> {
    let mut args: Vec<String> = DEFAULT_FLAGS.iter().map(|f| f.to_string()).collect();

    args.push(format!("--user-data-dir={}", profile_dir.display()));
    args.push(format!("--window-size={},{}", config.width, config.height));
    if !config.user_agent.is_empty() {
        args.push(format!("--user-agent={}", config.user_agent));
    }
    if config.disable_gpu {
        args.push("--disable-gpu".to_string());
    }
    if config.ignore_certificate_errors {
        args.push("--ignore-certificate-errors".to_string());
    }
    if let Some(proxy) = config.proxy.as_deref().filter(|p| !p.is_empty()) {
        args.push(format!("--proxy-server={}", proxy));
    }
    args.push("about:blank".to_string());

    args
}

/// WebSocket URL from a `DevTools listening on ws://...` stderr line
pub fn parse_devtools_line(line: &str) -> Option<String> {
    let endpoint = line.trim().strip_prefix(DEVTOOLS_PREFIX)?;
    if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
        Some(endpoint.to_string())
    } else {
        None
    }
}

/// HTTP base of the DevTools API behind a browser WebSocket URL
pub fn http_base(ws_url: &str) -> Result<String, Error> {
    let parsed = url::Url::parse(ws_url)
        .map_err(|e| Error::browser_launch(format!("Bad DevTools endpoint {}: {}", ws_url, e)))?;
    let scheme = if parsed.scheme() == "wss" { "https" } else { "http" };
    let host = parsed
        .host_str()
        .ok_or_else(|| Error::browser_launch(format!("DevTools endpoint {} has no host", ws_url)))?;

    Ok(match parsed.port() {
        Some(port) => format!("{}://{}:{}", scheme, host, port),
        None => format!("{}://{}", scheme, host),
    })
}

fn find_executable(configured: Option<&str>) -> Result<PathBuf, Error> {
    if let Some(path) = configured.filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }

    let path_var = std::env::var_os("PATH").unwrap_or_default();
    std::env::split_paths(&path_var)
        .flat_map(|dir| CHROME_CANDIDATES.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| Error::browser_launch("No Chrome or Chromium binary found on PATH"))
}

async fn read_endpoint(stderr: ChildStderr) -> Result<(String, tokio::io::Lines<BufReader<ChildStderr>>), Error> {
    let mut lines = BufReader::new(stderr).lines();
    while let Some(line) = lines.next_line().await? {
        trace!("chrome: {}", line);
        if let Some(endpoint) = parse_devtools_line(&line) {
            return Ok((endpoint, lines));
        }
    }
    Err(Error::browser_launch("Browser exited before announcing its DevTools endpoint"))
}

/// Launches local Chrome processes
#[derive(Debug, Default, Clone)]
pub struct ChromeLauncher;

impl ChromeLauncher {
    /// Create a launcher
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self, config: &LaunchConfig) -> Result<Arc<dyn CdpBrowser>, Error> {
        let executable = find_executable(config.executable_path.as_deref())?;
        let profile = tempfile::Builder::new()
            .prefix("webrender-profile-")
            .tempdir()
            .map_err(|e| Error::browser_launch(format!("Failed to create profile dir: {}", e)))?;

        let args = chrome_args(config, profile.path());
        info!("Launching {} ({}x{})", executable.display(), config.width, config.height);
        debug!("Browser args: {:?}", args);

        let mut child = Command::new(&executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::browser_launch(format!("Failed to start {}: {}", executable.display(), e)))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::browser_launch("Browser stderr not captured"))?;

        let (ws_endpoint, mut rest) = match tokio::time::timeout(config.launch_timeout, read_endpoint(stderr)).await {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                let _ = child.kill().await;
                return Err(Error::browser_launch(e.to_string()));
            }
            Err(_) => {
                let _ = child.kill().await;
                return Err(Error::browser_launch(format!(
                    "Browser did not announce a DevTools endpoint within {:?}",
                    config.launch_timeout
                )));
            }
        };

        // Keep draining stderr so the browser never blocks on a full pipe
        tokio::spawn(async move {
            while let Ok(Some(line)) = rest.next_line().await {
                trace!("chrome: {}", line);
            }
        });

        let browser = ChromeBrowser::new(ws_endpoint, child, profile)?;
        Ok(Arc::new(browser))
    }
}

/// A running Chrome process reachable over DevTools
#[derive(Debug)]
pub struct ChromeBrowser {
    /// Browser-level WebSocket endpoint
    ws_endpoint: String,
    /// HTTP base of the DevTools API
    http_base: String,
    http: reqwest::Client,
    child: Mutex<Option<Child>>,
    profile: Mutex<Option<TempDir>>,
    /// Connections of every tab opened through this browser
    connections: Mutex<Vec<Arc<CdpWebSocketConnection>>>,
    closed: AtomicBool,
}

impl ChromeBrowser {
    fn new(ws_endpoint: String, child: Child, profile: TempDir) -> Result<Self, Error> {
        let http_base = http_base(&ws_endpoint)?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            ws_endpoint,
            http_base,
            http,
            child: Mutex::new(Some(child)),
            profile: Mutex::new(Some(profile)),
            connections: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    async fn create_target(&self) -> Result<String, Error> {
        let new_url = format!("{}/json/new?about:blank", self.http_base);
        debug!("Creating new page via {}", new_url);

        let target: serde_json::Value = self
            .http
            .put(&new_url)
            .send()
            .await
            .map_err(|e| Error::cdp(format!("Failed to open tab: {}", e)))?
            .json()
            .await
            .map_err(|e| Error::cdp(format!("Failed to parse new target response: {}", e)))?;

        target
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| Error::cdp("No webSocketDebuggerUrl in new target response"))
    }
}

#[async_trait]
impl CdpBrowser for ChromeBrowser {
    async fn new_page(&self) -> Result<Arc<dyn CdpClient>, Error> {
        if !self.is_active() {
            return Err(Error::cdp("Browser is closed"));
        }

        let target_url = self.create_target().await?;
        let connection = CdpWebSocketConnection::connect(target_url).await?;
        self.connections.lock().await.push(Arc::clone(&connection));

        let client = CdpClientImpl::new(connection);
        enable_page_domains(&client).await?;

        Ok(Arc::new(client))
    }

    async fn version(&self) -> Result<BrowserVersion, Error> {
        let url = format!("{}/json/version", self.http_base);
        let version_json: serde_json::Value = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::cdp(format!("Failed to reach browser: {}", e)))?
            .json()
            .await
            .map_err(|e| Error::cdp(format!("Failed to parse version: {}", e)))?;

        let field = |key: &str| {
            version_json
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string()
        };

        Ok(BrowserVersion {
            protocol_version: field("Protocol-Version"),
            product: field("Browser"),
            user_agent: field("User-Agent"),
            js_version: field("V8-Version"),
        })
    }

    async fn close(&self) -> Result<(), Error> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Closing browser at {}", self.ws_endpoint);

        for connection in self.connections.lock().await.drain(..) {
            if let Err(e) = CdpConnection::close(connection.as_ref()).await {
                warn!("Failed to close connection to {}: {}", connection.url(), e);
            }
        }

        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                warn!("Failed to kill browser process: {}", e);
            }
        }
        self.profile.lock().await.take();

        Ok(())
    }

    fn is_active(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdp::mock::MockCdpConnection;

    #[test]
    fn test_parse_devtools_line() {
        let line = "DevTools listening on ws://127.0.0.1:41235/devtools/browser/6f2c9a1e";
        assert_eq!(
            parse_devtools_line(line).as_deref(),
            Some("ws://127.0.0.1:41235/devtools/browser/6f2c9a1e")
        );
        assert!(parse_devtools_line("[0101/000000.000:ERROR:gpu_init.cc] GPU disabled").is_none());
    }

    #[test]
    fn test_http_base_from_ws_endpoint() {
        assert_eq!(
            http_base("ws://127.0.0.1:41235/devtools/browser/abc").unwrap(),
            "http://127.0.0.1:41235"
        );
        assert!(http_base("not a url").is_err());
    }

    #[test]
    fn test_chrome_args_follow_config() {
        let config = LaunchConfig {
            width: 800,
            height: 600,
            user_agent: "bot".to_string(),
            proxy: Some("http://proxy:3128".to_string()),
            ..LaunchConfig::default()
        };
        let args = chrome_args(&config, Path::new("/tmp/profile"));

        assert!(args.contains(&"--window-size=800,600".to_string()));
        assert!(args.contains(&"--user-agent=bot".to_string()));
        assert!(args.contains(&"--proxy-server=http://proxy:3128".to_string()));
        assert!(args.contains(&"--disable-gpu".to_string()));
        assert!(args.contains(&"--ignore-certificate-errors".to_string()));
        assert!(args.contains(&"--user-data-dir=/tmp/profile".to_string()));
        assert!(args.contains(&"--headless".to_string()));
    }

    #[test]
    fn test_chrome_args_without_proxy() {
        let args = chrome_args(&LaunchConfig::default(), Path::new("/tmp/profile"));
        assert!(!args.iter().any(|a| a.starts_with("--proxy-server")));
    }

    #[test]
    fn test_configured_executable_wins() {
        let path = find_executable(Some("/opt/chrome/chrome")).unwrap();
        assert_eq!(path, PathBuf::from("/opt/chrome/chrome"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_launch_error() {
        let config = LaunchConfig {
            executable_path: Some("/nonexistent/webrender-test-chrome".to_string()),
            ..LaunchConfig::default()
        };
        let err = ChromeLauncher::new().launch(&config).await.unwrap_err();
        assert!(matches!(err, Error::BrowserLaunch(_)));
    }

    #[tokio::test]
    async fn test_new_tabs_enable_crash_reporting() {
        let connection = Arc::new(MockCdpConnection::new());
        let client = CdpClientImpl::new(connection.clone());

        enable_page_domains(&client).await.unwrap();

        assert_eq!(
            connection.sent_methods(),
            vec!["Page.enable", "Runtime.enable", "Inspector.enable"]
        );
    }

    #[tokio::test]
    async fn test_failed_enable_fails_the_tab() {
        let connection = Arc::new(MockCdpConnection::new());
        connection.fail("Inspector.enable", "Inspector domain unavailable");
        let client = CdpClientImpl::new(connection.clone());

        let err = enable_page_domains(&client).await.unwrap_err();

        assert!(matches!(err, Error::Cdp(_)));
        assert!(err.to_string().contains("Inspector.enable"));
    }
}
