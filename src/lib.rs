//! WebRender: renders web pages to PNG or PDF through a headless browser
//!
//! Every render runs in its own freshly launched browser. The primary attempt navigates and
//! captures under a deadline; if that deadline passes, a single fallback attempt captures
//! whatever the page has loaded so far.

pub mod error;
pub mod config;

pub mod cdp;
pub mod http;
pub mod render;
pub mod session;

// Re-exports
pub use error::{Error, Result};

/// WebRender library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
