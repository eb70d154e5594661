//! Capture executor
//!
//! Drives one render from launch to release:
//!
//! ```text
//! Init -> Launching -> Running(primary) -> Succeeded
//!                                      -> Failed
//!                                      -> TimedOut -> Running(fallback) -> Succeeded | Failed
//! ```
//!
//! Only a deadline on the primary attempt leads to the fallback. The session is released on
//! every path out.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cdp::CdpClient;
use crate::render::pipeline::{self, CaptureOutput};
use crate::render::request::{OutputKind, RenderDefaults, RenderRequest};
use crate::render::watcher::{EventWatcher, ListenerKind};
use crate::session::{AttemptKind, CaptureAttempt, Scope, Session, SessionGuard, SessionManager};
use crate::Result;

/// Listeners on the primary attempt
const PRIMARY_LISTENERS: [ListenerKind; 4] = [
    ListenerKind::Crash,
    ListenerKind::Dialog,
    ListenerKind::Console,
    ListenerKind::Network,
];

/// Listeners on the fallback attempt
const FALLBACK_LISTENERS: [ListenerKind; 1] = [ListenerKind::Crash];

/// Where a render is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Nothing started yet
    Init,
    /// Starting the browser
    Launching,
    /// Running an attempt's pipeline
    Running(AttemptKind),
    /// The primary attempt ran out of time
    TimedOut,
    /// A result was captured
    Succeeded,
    /// The render failed
    Failed,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureState::Init => f.write_str("init"),
            CaptureState::Launching => f.write_str("launching"),
            CaptureState::Running(kind) => write!(f, "running({})", kind),
            CaptureState::TimedOut => f.write_str("timed-out"),
            CaptureState::Succeeded => f.write_str("succeeded"),
            CaptureState::Failed => f.write_str("failed"),
        }
    }
}

/// Output of a successful render
#[derive(Debug, Clone, PartialEq)]
pub struct RenderResult {
    /// PNG or PDF bytes
    pub data: Vec<u8>,
    /// Markup of the root element
    pub dom: String,
    /// Format of `data`
    pub output: OutputKind,
    /// Attempt that produced the result
    pub attempt: AttemptKind,
}

impl RenderResult {
    /// MIME type of `data`
    pub fn content_type(&self) -> &'static str {
        self.output.content_type()
    }
}

struct CaptureRun {
    id: Uuid,
    state: CaptureState,
}

impl CaptureRun {
    fn transition(&mut self, next: CaptureState) {
        debug!(render = %self.id, from = %self.state, to = %next, "Capture state");
        self.state = next;
    }
}

/// Renders requests, one isolated browser each
#[derive(Debug, Clone)]
pub struct CaptureExecutor {
    sessions: SessionManager,
    defaults: RenderDefaults,
}

impl CaptureExecutor {
    /// Create an executor
    pub fn new(sessions: SessionManager, defaults: RenderDefaults) -> Self {
        Self { sessions, defaults }
    }

    /// Session manager backing this executor
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Defaults requests are resolved against
    pub fn defaults(&self) -> &RenderDefaults {
        &self.defaults
    }

    /// Render `request`, blocking until a result or an error is available
    pub async fn render(&self, request: &RenderRequest) -> Result<RenderResult> {
        let mut run = CaptureRun {
            id: Uuid::new_v4(),
            state: CaptureState::Init,
        };
        info!(render = %run.id, url = %request.url(), engine = %request.engine(), "Render started");

        run.transition(CaptureState::Launching);
        let session = match self.sessions.open(&request.launch_config(&self.defaults)).await {
            Ok(session) => session,
            Err(e) => {
                run.transition(CaptureState::Failed);
                warn!(render = %run.id, "Browser launch failed: {}", e);
                return Err(e);
            }
        };
        let guard = SessionGuard::new(self.sessions.clone(), session);

        let result = match guard.session() {
            Ok(session) => self.capture(&mut run, session, request).await,
            Err(e) => Err(e),
        };

        run.transition(if result.is_ok() {
            CaptureState::Succeeded
        } else {
            CaptureState::Failed
        });
        if let Err(e) = guard.release().await {
            warn!(render = %run.id, "Failed to release session: {}", e);
        }

        match &result {
            Ok(output) => info!(render = %run.id, attempt = %output.attempt, bytes = output.data.len(), "Render finished"),
            Err(e) => warn!(render = %run.id, "Render failed: {}", e),
        }
        result
    }

    async fn capture(&self, run: &mut CaptureRun, session: &Session, request: &RenderRequest) -> Result<RenderResult> {
        let watcher = EventWatcher::new(Arc::clone(session.page()));
        attach_listeners(&watcher, session.scope(), &[ListenerKind::Crash]).await;

        run.transition(CaptureState::Running(AttemptKind::Primary));
        let primary = self
            .sessions
            .new_attempt(session, AttemptKind::Primary, request.timeout())?;
        attach_listeners(&watcher, primary.scope(), &PRIMARY_LISTENERS).await;

        match run_attempt(session.page().as_ref(), &primary, request).await {
            Ok(output) => return Ok(finish(output, request, AttemptKind::Primary)),
            Err(e) if e.is_deadline_exceeded() => {
                run.transition(CaptureState::TimedOut);
                warn!(render = %run.id, timeout = ?request.timeout(), "Primary attempt timed out, capturing what loaded");
            }
            Err(e) => return Err(e),
        }
        drop(primary);

        run.transition(CaptureState::Running(AttemptKind::Fallback));
        let fallback = self
            .sessions
            .new_attempt(session, AttemptKind::Fallback, request.timeout())?;
        attach_listeners(&watcher, fallback.scope(), &FALLBACK_LISTENERS).await;

        let output = run_attempt(session.page().as_ref(), &fallback, request).await?;
        Ok(finish(output, request, AttemptKind::Fallback))
    }
}

async fn attach_listeners(watcher: &EventWatcher, scope: &Scope, kinds: &[ListenerKind]) {
    for kind in kinds {
        if let Err(e) = watcher.attach(scope, *kind).await {
            warn!(scope = %scope.name(), "{}", e);
        }
    }
}

async fn run_attempt(page: &dyn CdpClient, attempt: &CaptureAttempt, request: &RenderRequest) -> Result<CaptureOutput> {
    let steps = pipeline::build(request, attempt.kind() == AttemptKind::Primary);
    debug!(attempt = %attempt.kind(), steps = steps.len(), "Running pipeline");

    let result = attempt.scope().run(pipeline::execute(page, &steps)).await;
    attempt.scope().close();
    result
}

fn finish(output: CaptureOutput, request: &RenderRequest, attempt: AttemptKind) -> RenderResult {
    RenderResult {
        data: output.data,
        dom: output.dom,
        output: request.output(),
        attempt,
    }
}
