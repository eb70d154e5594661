//! Configuration management for WebRender
//!
//! Values are read once at startup, from an optional TOML file and then from
//! `WEBRENDER_*` environment variables, and shared read-only afterwards.

use crate::render::{RenderDefaults, RenderEngine};
use crate::{Error, Result};
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host address to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Path serving render requests
    pub image_url: String,

    /// Path answering health checks
    pub healthcheck_url: String,

    /// Path exposing Prometheus metrics
    pub metrics_url: String,

    /// Browser executable path
    pub browser_path: Option<String>,

    /// Default engine selector
    pub browser_kind: String,

    /// Proxy server handed to the browser
    pub proxy: Option<String>,

    /// Default viewport width in pixels
    pub width: u32,

    /// Default viewport height in pixels
    pub height: u32,

    /// Default attempt timeout in seconds
    pub timeout: u64,

    /// Default delay after navigation in seconds
    pub delay: u64,

    /// Default user agent
    pub user_agent: String,

    /// Render PDF instead of PNG by default
    pub as_pdf: bool,

    /// Capture the full page by default
    pub full_page: bool,

    /// Seconds to wait for the browser to print its DevTools endpoint
    pub launch_timeout: u64,

    /// Log level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 80,
            image_url: "/image".to_string(),
            healthcheck_url: "/healthcheck".to_string(),
            metrics_url: "/metrics".to_string(),
            browser_path: None,
            browser_kind: "chrome".to_string(),
            proxy: None,
            width: 1920,
            height: 1280,
            timeout: 10,
            delay: 3,
            user_agent: "webrender".to_string(),
            as_pdf: false,
            full_page: true,
            launch_timeout: 20,
            log_level: "info".to_string(),
        }
    }
}

fn parse_env<T: FromStr>(key: &str, target: &mut T) -> Result<()> {
    if let Ok(value) = env::var(key) {
        *target = value
            .trim()
            .parse()
            .map_err(|_| Error::configuration(format!("Invalid {}", key)))?;
    }
    Ok(())
}

fn string_env(key: &str, target: &mut String) {
    if let Ok(value) = env::var(key) {
        *target = value;
    }
}

fn optional_env(key: &str, target: &mut Option<String>) {
    if let Ok(value) = env::var(key) {
        *target = if value.is_empty() { None } else { Some(value) };
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::configuration(format!("Failed to read config file: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text; missing keys keep their defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::configuration(format!("Failed to parse config: {}", e)))
    }

    /// Override fields with any `WEBRENDER_*` variables that are set
    pub fn apply_env(&mut self) -> Result<()> {
        string_env("WEBRENDER_HOST", &mut self.host);
        parse_env("WEBRENDER_PORT", &mut self.port)?;
        string_env("WEBRENDER_HTTP_IMAGE_URL", &mut self.image_url);
        string_env("WEBRENDER_HTTP_HEALTHCHECK_URL", &mut self.healthcheck_url);
        string_env("WEBRENDER_HTTP_METRICS_URL", &mut self.metrics_url);
        optional_env("WEBRENDER_IMAGE_BROWSER_PATH", &mut self.browser_path);
        string_env("WEBRENDER_IMAGE_BROWSER_KIND", &mut self.browser_kind);
        optional_env("WEBRENDER_IMAGE_PROXY", &mut self.proxy);
        parse_env("WEBRENDER_IMAGE_WIDTH", &mut self.width)?;
        parse_env("WEBRENDER_IMAGE_HEIGHT", &mut self.height)?;
        parse_env("WEBRENDER_IMAGE_TIMEOUT", &mut self.timeout)?;
        parse_env("WEBRENDER_IMAGE_DELAY", &mut self.delay)?;
        string_env("WEBRENDER_IMAGE_USER_AGENT", &mut self.user_agent);
        parse_env("WEBRENDER_IMAGE_AS_PDF", &mut self.as_pdf)?;
        parse_env("WEBRENDER_IMAGE_FULL_PAGE", &mut self.full_page)?;
        parse_env("WEBRENDER_LAUNCH_TIMEOUT", &mut self.launch_timeout)?;
        string_env("WEBRENDER_LOG_LEVEL", &mut self.log_level);
        Ok(())
    }

    /// Socket address string for the HTTP listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Defaults applied to fields a render request leaves out
    pub fn render_defaults(&self) -> RenderDefaults {
        RenderDefaults {
            engine: RenderEngine::parse_lenient(&self.browser_kind),
            width: self.width,
            height: self.height,
            timeout: self.timeout,
            delay: self.delay,
            user_agent: self.user_agent.clone(),
            as_pdf: self.as_pdf,
            full_page: self.full_page,
            browser_path: self.browser_path.clone(),
            proxy: self.proxy.clone(),
            launch_timeout: self.launch_timeout(),
        }
    }

    /// How long to wait for a freshly spawned browser to come up
    pub fn launch_timeout(&self) -> Duration {
        Duration::from_secs(self.launch_timeout)
    }
}
