//! Unified error types for WebRender

use thiserror::Error;

/// Unified Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for WebRender
#[derive(Error, Debug)]
pub enum Error {
    /// The browser process could not be started or did not answer the liveness check
    #[error("Browser launch failed: {0}")]
    BrowserLaunch(String),

    /// Navigation, script evaluation or load-stop failed
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// An attempt scope ran past its deadline
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// A scope was cancelled (crash, dialog failure or teardown)
    #[error("Scope cancelled: {0}")]
    Cancelled(String),

    /// Screenshot or PDF capture failed
    #[error("Capture failed: {0}")]
    Capture(String),

    /// Accepting a page dialog failed
    #[error("Dialog handling failed: {0}")]
    DialogHandling(String),

    /// Diagnostic listener failure, only ever logged
    #[error("Listener error: {0}")]
    Listener(String),

    /// The render request could not be decoded or validated
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// CDP protocol errors
    #[error("CDP error: {0}")]
    Cdp(String),

    /// WebSocket errors
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new browser launch error
    pub fn browser_launch<S: Into<String>>(msg: S) -> Self {
        Error::BrowserLaunch(msg.into())
    }

    /// Create a new navigation error
    pub fn navigation<S: Into<String>>(msg: S) -> Self {
        Error::Navigation(msg.into())
    }

    /// Create a new deadline exceeded error
    pub fn deadline_exceeded<S: Into<String>>(msg: S) -> Self {
        Error::DeadlineExceeded(msg.into())
    }

    /// Create a new cancellation error
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        Error::Cancelled(msg.into())
    }

    /// Create a new capture error
    pub fn capture<S: Into<String>>(msg: S) -> Self {
        Error::Capture(msg.into())
    }

    /// Create a new dialog handling error
    pub fn dialog_handling<S: Into<String>>(msg: S) -> Self {
        Error::DialogHandling(msg.into())
    }

    /// Create a new listener error
    pub fn listener<S: Into<String>>(msg: S) -> Self {
        Error::Listener(msg.into())
    }

    /// Create a new invalid request error
    pub fn invalid_request<S: Into<String>>(msg: S) -> Self {
        Error::InvalidRequest(msg.into())
    }

    /// Create a new CDP error
    pub fn cdp<S: Into<String>>(msg: S) -> Self {
        Error::Cdp(msg.into())
    }

    /// Create a new WebSocket error
    pub fn websocket<S: Into<String>>(msg: S) -> Self {
        Error::WebSocket(msg.into())
    }

    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Error::Configuration(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }

    /// Whether this error is the deadline of an attempt scope running out.
    ///
    /// This is the only error the capture executor recovers from.
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Error::DeadlineExceeded(_))
    }
}
