//! # Session layer
//!
//! Owns the two-level cancellation hierarchy of a render: one browser scope per launched
//! browser and one deadline-bound attempt scope per pipeline run.
//!
//! ## Module layout
//! - `scope`: cancellation scopes with deadlines and attached listeners
//! - `manager`: browser launch, attempts and release
//!
//! ## Example
//! ```rust,no_run
//! use webrender::cdp::LaunchConfig;
//! use webrender::session::{AttemptKind, SessionManager};
//! use std::time::Duration;
//!
//! # async fn example(manager: SessionManager) -> webrender::Result<()> {
//! let session = manager.open(&LaunchConfig::default()).await?;
//! let attempt = manager.new_attempt(&session, AttemptKind::Primary, Duration::from_secs(10))?;
//! let page = session.page().clone();
//! attempt.scope().run(async move { page.navigate("https://example.com").await }).await?;
//! manager.close(&session).await?;
//! # Ok(())
//! # }
//! ```

pub mod manager;
pub mod scope;


pub use manager::{AttemptKind, CaptureAttempt, Session, SessionGuard, SessionManager};
pub use scope::Scope;
