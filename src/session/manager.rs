//! Session manager implementation
//!
//! Launches one isolated browser per render, owns its browser scope, derives deadline-bound
//! attempt scopes from it and tears everything down exactly once.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::cdp::mock::MockBrowserLauncher;
use crate::cdp::{BrowserLauncher, CdpBrowser, CdpClient, LaunchConfig};
use crate::session::scope::Scope;
use crate::{Error, Result};

/// Which run of the pipeline an attempt is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptKind {
    /// First run, with navigation
    Primary,
    /// The single run after the primary attempt timed out, without navigation
    Fallback,
}

impl fmt::Display for AttemptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptKind::Primary => f.write_str("primary"),
            AttemptKind::Fallback => f.write_str("fallback"),
        }
    }
}

/// One live browser and its browser-level scope
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    browser: Arc<dyn CdpBrowser>,
    page: Arc<dyn CdpClient>,
    scope: Scope,
    primary_opened: AtomicBool,
    fallback_opened: AtomicBool,
    closed: AtomicBool,
}

impl Session {
    /// Session ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The browser process
    pub fn browser(&self) -> &Arc<dyn CdpBrowser> {
        &self.browser
    }

    /// The tab every attempt of this session runs in
    pub fn page(&self) -> &Arc<dyn CdpClient> {
        &self.page
    }

    /// Browser-level scope
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Whether the session has been released
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// One deadline-bound run of a pipeline inside a session
#[derive(Debug)]
pub struct CaptureAttempt {
    kind: AttemptKind,
    scope: Scope,
}

impl CaptureAttempt {
    /// Primary or fallback
    pub fn kind(&self) -> AttemptKind {
        self.kind
    }

    /// Attempt scope, a child of the session scope
    pub fn scope(&self) -> &Scope {
        &self.scope
    }
}

/// Session manager
#[derive(Debug, Clone)]
pub struct SessionManager {
    launcher: Arc<dyn BrowserLauncher>,
    live_sessions: Arc<AtomicUsize>,
}

impl SessionManager {
    /// Create a session manager
    pub fn new(launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self {
            launcher,
            live_sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a session manager backed by a mock launcher for testing
    pub fn mock() -> Self {
        Self::new(Arc::new(MockBrowserLauncher::new()))
    }

    /// Sessions opened and not yet closed
    pub fn live_sessions(&self) -> usize {
        self.live_sessions.load(Ordering::SeqCst)
    }

    /// Launch a browser, check it answers and open the tab attempts will run in.
    ///
    /// Every failure is a [`Error::BrowserLaunch`] and leaves no process behind.
    pub async fn open(&self, config: &LaunchConfig) -> Result<Session> {
        let id = Uuid::new_v4();
        let browser = self
            .launcher
            .launch(config)
            .await
            .map_err(|e| Error::browser_launch(e.to_string()))?;

        let page = match Self::confirm_live(browser.as_ref()).await {
            Ok(page) => page,
            Err(e) => {
                if let Err(close_err) = browser.close().await {
                    warn!(session = %id, "Failed to close browser after launch failure: {}", close_err);
                }
                return Err(Error::browser_launch(e.to_string()));
            }
        };

        self.live_sessions.fetch_add(1, Ordering::SeqCst);
        info!(session = %id, "Session opened");

        Ok(Session {
            id,
            browser,
            page,
            scope: Scope::root(format!("browser-{}", id)),
            primary_opened: AtomicBool::new(false),
            fallback_opened: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    async fn confirm_live(browser: &dyn CdpBrowser) -> Result<Arc<dyn CdpClient>> {
        let version = browser.version().await?;
        info!(product = %version.product, protocol = %version.protocol_version, "Browser is live");
        browser.new_page().await
    }

    /// Derive an attempt scope from the session scope with a fresh deadline.
    ///
    /// A session gets at most one attempt of each kind.
    pub fn new_attempt(&self, session: &Session, kind: AttemptKind, timeout: Duration) -> Result<CaptureAttempt> {
        if session.is_closed() {
            return Err(Error::internal("Session is already closed"));
        }

        let slot = match kind {
            AttemptKind::Primary => &session.primary_opened,
            AttemptKind::Fallback => &session.fallback_opened,
        };
        if slot.swap(true, Ordering::SeqCst) {
            return Err(Error::internal(format!("Session {} already has a {} attempt", session.id, kind)));
        }

        Ok(CaptureAttempt {
            kind,
            scope: session.scope.child(format!("{}-{}", kind, session.id), Some(timeout)),
        })
    }

    /// Cancel the session scope, detach its listeners and terminate the browser.
    ///
    /// Only the first call does anything.
    pub async fn close(&self, session: &Session) -> Result<()> {
        if session.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        session.scope.close();
        self.live_sessions.fetch_sub(1, Ordering::SeqCst);

        let result = session.browser.close().await;
        info!(session = %session.id, "Session closed");
        result
    }
}

/// Closes its session when released or dropped
#[derive(Debug)]
pub struct SessionGuard {
    manager: SessionManager,
    session: Option<Arc<Session>>,
}

impl SessionGuard {
    /// Take ownership of an open session
    pub fn new(manager: SessionManager, session: Session) -> Self {
        Self {
            manager,
            session: Some(Arc::new(session)),
        }
    }

    /// The guarded session
    pub fn session(&self) -> Result<&Session> {
        self.session
            .as_deref()
            .ok_or_else(|| Error::internal("Session already released"))
    }

    /// Close the session now
    pub async fn release(mut self) -> Result<()> {
        match self.session.take() {
            Some(session) => self.manager.close(&session).await,
            None => Ok(()),
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        if session.is_closed() {
            return;
        }

        // The render was abandoned mid-flight; finish the teardown in the background
        session.scope.cancel();
        let manager = self.manager.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = manager.close(&session).await {
                        warn!(session = %session.id, "Failed to close abandoned session: {}", e);
                    }
                });
            }
            Err(_) => warn!(session = %session.id, "No runtime to close abandoned session"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guard_release_closes_session() {
        let manager = SessionManager::mock();
        let session = manager.open(&LaunchConfig::default()).await.unwrap();
        let guard = SessionGuard::new(manager.clone(), session);
        assert!(guard.session().is_ok());

        guard.release().await.unwrap();
        assert_eq!(manager.live_sessions(), 0);
    }

    #[tokio::test]
    async fn test_dropped_guard_closes_session() {
        let manager = SessionManager::mock();
        let session = manager.open(&LaunchConfig::default()).await.unwrap();
        drop(SessionGuard::new(manager.clone(), session));

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(manager.live_sessions(), 0);
    }

    #[tokio::test]
    async fn test_session_manager_creation() {
        let manager = SessionManager::mock();
        assert_eq!(manager.live_sessions(), 0);
    }

    #[tokio::test]
    async fn test_open_and_close() {
        let manager = SessionManager::mock();
        let session = manager.open(&LaunchConfig::default()).await.unwrap();
        assert_eq!(manager.live_sessions(), 1);
        assert!(session.browser().is_active());

        manager.close(&session).await.unwrap();
        assert_eq!(manager.live_sessions(), 0);
        assert!(session.is_closed());
        assert!(session.scope().is_cancelled());
        assert!(!session.browser().is_active());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let manager = SessionManager::mock();
        let session = manager.open(&LaunchConfig::default()).await.unwrap();

        manager.close(&session).await.unwrap();
        manager.close(&session).await.unwrap();

        assert_eq!(manager.live_sessions(), 0);
    }

    #[tokio::test]
    async fn test_one_attempt_per_kind() {
        let manager = SessionManager::mock();
        let session = manager.open(&LaunchConfig::default()).await.unwrap();

        let primary = manager
            .new_attempt(&session, AttemptKind::Primary, Duration::from_secs(5))
            .unwrap();
        assert_eq!(primary.kind(), AttemptKind::Primary);
        assert!(manager
            .new_attempt(&session, AttemptKind::Primary, Duration::from_secs(5))
            .is_err());

        manager
            .new_attempt(&session, AttemptKind::Fallback, Duration::from_secs(5))
            .unwrap();
        assert!(manager
            .new_attempt(&session, AttemptKind::Fallback, Duration::from_secs(5))
            .is_err());

        manager.close(&session).await.unwrap();
    }
}
