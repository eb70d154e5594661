//! # Render layer
//!
//! Turns a [`RenderRequest`] into PNG or PDF bytes plus a DOM snapshot.
//!
//! ## Module layout
//! - `request`: raw form fields, process defaults and the resolved request
//! - `pipeline`: the ordered action steps of one attempt
//! - `watcher`: crash, dialog, console and network listeners bound to scopes
//! - `executor`: the capture state machine with its single deadline fallback
//!
//! ## Example
//! ```rust,no_run
//! use webrender::render::{CaptureExecutor, RenderDefaults, RenderRequest};
//! use webrender::session::SessionManager;
//!
//! # async fn example(sessions: SessionManager) -> webrender::Result<()> {
//! let defaults = RenderDefaults::default();
//! let request = RenderRequest::new("https://example.com", &defaults)?;
//! let executor = CaptureExecutor::new(sessions, defaults);
//! let result = executor.render(&request).await?;
//! println!("{} bytes of {}", result.data.len(), result.content_type());
//! # Ok(())
//! # }
//! ```

pub mod executor;
pub mod pipeline;
pub mod request;
pub mod watcher;


pub use executor::{CaptureExecutor, CaptureState, RenderResult};
pub use pipeline::{ActionStep, CaptureOutput};
pub use request::{OutputKind, RenderDefaults, RenderEngine, RenderForm, RenderRequest};
pub use watcher::{EventWatcher, ListenerKind};
