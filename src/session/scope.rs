//! Cancellation scopes
//!
//! A [`Scope`] is a cancellation boundary with an optional deadline. Scopes form a tree:
//! cancelling a scope cancels every scope derived from it, while cancelling a child leaves
//! its parent and siblings running. Listener tasks attached to a scope are aborted when the
//! scope is closed or dropped.

use crate::{Error, Result};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A cancellation boundary with optional deadline and attached listeners
#[derive(Debug)]
pub struct Scope {
    name: String,
    token: CancellationToken,
    deadline: Option<Instant>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
}

impl Scope {
    /// Top-level scope with no deadline
    pub fn root<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            token: CancellationToken::new(),
            deadline: None,
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Derive a scope that is cancelled whenever this one is.
    ///
    /// The deadline, if any, starts counting now.
    pub fn child<S: Into<String>>(&self, name: S, timeout: Option<Duration>) -> Self {
        Self {
            name: name.into(),
            token: self.token.child_token(),
            deadline: timeout.map(|t| Instant::now() + t),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Scope name, used in logs and errors
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instant at which work under this scope is cut off
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Handle that cancels this scope; given to listeners
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel this scope and every scope derived from it
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether this scope or an ancestor has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Run `fut` under this scope.
    ///
    /// Returns [`Error::Cancelled`] if the scope is cancelled first and
    /// [`Error::DeadlineExceeded`] if the deadline passes first; reaching the deadline also
    /// cancels the scope so its listeners stop.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Error::cancelled(format!("{} scope cancelled", self.name))),
            _ = deadline => {
                self.token.cancel();
                Err(Error::deadline_exceeded(format!("{} scope ran past its deadline", self.name)))
            }
            result = fut => result,
        }
    }

    /// Tie a listener task to this scope's lifetime
    pub fn attach(&self, listener: JoinHandle<()>) {
        match self.listeners.lock() {
            Ok(mut listeners) => {
                listeners.retain(|l| !l.is_finished());
                listeners.push(listener);
            }
            Err(_) => listener.abort(),
        }
    }

    /// Attached listeners that are still running
    pub fn live_listeners(&self) -> usize {
        self.listeners
            .lock()
            .map(|l| l.iter().filter(|h| !h.is_finished()).count())
            .unwrap_or(0)
    }

    /// Cancel the scope and detach every listener
    pub fn close(&self) {
        self.token.cancel();
        if let Ok(mut listeners) = self.listeners.lock() {
            if !listeners.is_empty() {
                debug!(scope = %self.name, count = listeners.len(), "Detaching listeners");
            }
            for listener in listeners.drain(..) {
                listener.abort();
            }
        }
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.close();
    }
}
