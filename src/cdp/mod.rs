//! # Chrome DevTools Protocol (CDP) layer
//!
//! Launches headless Chrome processes and drives their pages over the DevTools WebSocket
//! protocol.
//!
//! ## Module layout
//! - `traits`: the browser, page and connection seams the renderer is written against
//! - `types`: wire types of the commands issued
//! - `connection`: WebSocket JSON-RPC transport with event fan-out
//! - `client`: typed page operations
//! - `browser`: process launch and tab management
//! - `mock`: scriptable stand-ins for tests
//!
//! ## Example
//! ```rust,no_run
//! use webrender::cdp::{BrowserLauncher, ChromeLauncher, LaunchConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let browser = ChromeLauncher::new().launch(&LaunchConfig::default()).await?;
//! let page = browser.new_page().await?;
//! page.navigate("https://example.com").await?;
//! let png = page.screenshot(true).await?;
//! println!("captured {} bytes", png.len());
//! browser.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod client;
pub mod connection;
pub mod mock;
pub mod traits;
pub mod types;


pub use traits::{
    BrowserLauncher, BrowserVersion, CdpBrowser, CdpClient, CdpConnection, CdpError, CdpEvent, CdpResponse,
    EvaluationResult, LaunchConfig, NavigationResult,
};

pub use browser::{ChromeBrowser, ChromeLauncher};
pub use client::CdpClientImpl;
pub use connection::CdpWebSocketConnection;

pub use mock::{MockBehavior, MockBrowserLauncher, MockCdpBrowser, MockCdpClient, MockCdpConnection};
