//! Render requests
//!
//! A [`RenderForm`] holds the raw fields a caller sent. Resolving it against the
//! process-wide [`RenderDefaults`] yields an immutable [`RenderRequest`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::cdp::LaunchConfig;
use crate::{Error, Result};

/// Browser engine used for rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderEngine {
    /// Headless Chrome or Chromium
    #[default]
    Chrome,
}

impl RenderEngine {
    /// Parse an engine selector; anything unrecognized selects the default engine
    pub fn parse_lenient(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }
}

impl FromStr for RenderEngine {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chrome" | "chromium" => Ok(RenderEngine::Chrome),
            other => Err(Error::invalid_request(format!("Unknown engine: {}", other))),
        }
    }
}

impl fmt::Display for RenderEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderEngine::Chrome => f.write_str("chrome"),
        }
    }
}

/// What the capture produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// PNG image
    Screenshot,
    /// PDF document
    Pdf,
}

impl OutputKind {
    /// MIME type of the produced bytes
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputKind::Screenshot => "image/png",
            OutputKind::Pdf => "application/pdf",
        }
    }
}

/// Process-wide defaults for fields a request leaves out
#[derive(Debug, Clone, PartialEq)]
pub struct RenderDefaults {
    /// Engine used when a request names none
    pub engine: RenderEngine,
    /// Viewport width in pixels
    pub width: u32,
    /// Viewport height in pixels
    pub height: u32,
    /// Attempt timeout in seconds
    pub timeout: u64,
    /// Delay after navigation in seconds
    pub delay: u64,
    /// User agent
    pub user_agent: String,
    /// Produce PDF instead of PNG
    pub as_pdf: bool,
    /// Capture the whole page instead of the viewport
    pub full_page: bool,
    /// Browser binary
    pub browser_path: Option<String>,
    /// Proxy server handed to the browser
    pub proxy: Option<String>,
    /// How long a launched browser has to come up
    pub launch_timeout: Duration,
}

impl Default for RenderDefaults {
    fn default() -> Self {
        Self {
            engine: RenderEngine::Chrome,
            width: 1920,
            height: 1280,
            timeout: 10,
            delay: 3,
            user_agent: "webrender".to_string(),
            as_pdf: false,
            full_page: true,
            browser_path: None,
            proxy: None,
            launch_timeout: Duration::from_secs(20),
        }
    }
}

/// Raw render fields as decoded from a query string or form body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderForm {
    /// Page to render
    pub url: Option<String>,
    /// Engine selector
    pub kind: Option<String>,
    /// Viewport width
    pub width: Option<u32>,
    /// Viewport height
    pub height: Option<u32>,
    /// User agent
    pub user_agent: Option<String>,
    /// Attempt timeout in seconds
    pub timeout: Option<u64>,
    /// Delay after navigation in seconds
    pub delay: Option<u64>,
    /// Produce PDF
    pub as_pdf: Option<bool>,
    /// Script to run after navigation
    pub script: Option<String>,
    /// Extra request headers
    pub headers: BTreeMap<String, String>,
}

impl RenderForm {
    /// Resolve against `defaults` into a validated request
    pub fn resolve(self, defaults: &RenderDefaults) -> Result<RenderRequest> {
        let raw_url = self
            .url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::invalid_request("url is required"))?;
        url::Url::parse(&raw_url).map_err(|e| Error::invalid_request(format!("Invalid url {}: {}", raw_url, e)))?;

        let as_pdf = self.as_pdf.unwrap_or(defaults.as_pdf);

        Ok(RenderRequest {
            url: raw_url,
            engine: self
                .kind
                .as_deref()
                .filter(|k| !k.is_empty())
                .map(RenderEngine::parse_lenient)
                .unwrap_or(defaults.engine),
            width: self.width.filter(|w| *w > 0).unwrap_or(defaults.width),
            height: self.height.filter(|h| *h > 0).unwrap_or(defaults.height),
            user_agent: self
                .user_agent
                .filter(|ua| !ua.is_empty())
                .unwrap_or_else(|| defaults.user_agent.clone()),
            script: self.script.filter(|s| !s.trim().is_empty()),
            delay: Duration::from_secs(self.delay.filter(|d| *d > 0).unwrap_or(defaults.delay)),
            timeout: Duration::from_secs(self.timeout.filter(|t| *t > 0).unwrap_or(defaults.timeout)),
            headers: self.headers,
            output: if as_pdf { OutputKind::Pdf } else { OutputKind::Screenshot },
            full_page: defaults.full_page,
        })
    }
}

/// A fully resolved render request; read-only once built
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    url: String,
    engine: RenderEngine,
    width: u32,
    height: u32,
    user_agent: String,
    script: Option<String>,
    delay: Duration,
    timeout: Duration,
    headers: BTreeMap<String, String>,
    output: OutputKind,
    full_page: bool,
}

impl RenderRequest {
    /// Request for `url` with every other field taken from `defaults`
    pub fn new(url: &str, defaults: &RenderDefaults) -> Result<Self> {
        RenderForm {
            url: Some(url.to_string()),
            ..RenderForm::default()
        }
        .resolve(defaults)
    }

    /// Page to render
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Engine
    pub fn engine(&self) -> RenderEngine {
        self.engine
    }

    /// Viewport width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Viewport height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// User agent
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Script evaluated after navigation
    pub fn script(&self) -> Option<&str> {
        self.script.as_deref()
    }

    /// Wait after navigation
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Deadline of each attempt
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Extra request headers
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// PNG or PDF
    pub fn output(&self) -> OutputKind {
        self.output
    }

    /// Capture beyond the viewport (screenshots only)
    pub fn full_page(&self) -> bool {
        self.full_page
    }

    /// Browser launch settings for this request
    pub fn launch_config(&self, defaults: &RenderDefaults) -> LaunchConfig {
        LaunchConfig {
            width: self.width,
            height: self.height,
            user_agent: self.user_agent.clone(),
            executable_path: defaults.browser_path.clone(),
            proxy: defaults.proxy.clone(),
            disable_gpu: true,
            ignore_certificate_errors: true,
            launch_timeout: defaults.launch_timeout,
        }
    }
}
