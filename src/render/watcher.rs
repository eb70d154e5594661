//! Event listeners bound to scopes
//!
//! Each listener is a task subscribed to the page's event stream and attached to a scope,
//! so it stops when the scope is cancelled or closed. Crash and dialog listeners act on the
//! scope; console and network listeners only log.

use std::fmt;
use std::sync::Arc;

use phf::phf_map;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cdp::{CdpClient, CdpEvent};
use crate::session::Scope;
use crate::{Error, Result};

/// Listener kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerKind {
    /// Cancels its scope when the target crashes
    Crash,
    /// Accepts page dialogs; cancels its scope if that fails
    Dialog,
    /// Logs console calls and uncaught exceptions
    Console,
    /// Logs request, response and WebSocket lifecycle events
    Network,
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ListenerKind::Crash => "crash",
            ListenerKind::Dialog => "dialog",
            ListenerKind::Console => "console",
            ListenerKind::Network => "network",
        };
        f.write_str(name)
    }
}

static EVENT_KINDS: phf::Map<&'static str, ListenerKind> = phf_map! {
    "Inspector.targetCrashed" => ListenerKind::Crash,
    "Page.javascriptDialogOpening" => ListenerKind::Dialog,
    "Runtime.consoleAPICalled" => ListenerKind::Console,
    "Runtime.exceptionThrown" => ListenerKind::Console,
    "Network.requestWillBeSent" => ListenerKind::Network,
    "Network.responseReceived" => ListenerKind::Network,
    "Network.loadingFailed" => ListenerKind::Network,
    "Network.webSocketCreated" => ListenerKind::Network,
    "Network.webSocketHandshakeResponseReceived" => ListenerKind::Network,
    "Network.webSocketFrameError" => ListenerKind::Network,
};

impl ListenerKind {
    /// Listener kind interested in an event method
    pub fn for_method(method: &str) -> Option<ListenerKind> {
        EVENT_KINDS.get(method).copied()
    }

    /// Event methods this kind subscribes to
    pub fn methods(&self) -> Vec<&'static str> {
        let mut methods: Vec<&'static str> = EVENT_KINDS
            .entries()
            .filter(|(_, kind)| *kind == self)
            .map(|(method, _)| *method)
            .collect();
        methods.sort_unstable();
        methods
    }
}

/// Attaches listeners for one page's events onto scopes
#[derive(Debug, Clone)]
pub struct EventWatcher {
    page: Arc<dyn CdpClient>,
}

impl EventWatcher {
    /// Watch `page`
    pub fn new(page: Arc<dyn CdpClient>) -> Self {
        Self { page }
    }

    /// Start a listener of `kind` bound to `scope`.
    ///
    /// The listener runs until the scope is cancelled or the event stream ends. A failure to
    /// subscribe is returned as [`Error::Listener`].
    pub async fn attach(&self, scope: &Scope, kind: ListenerKind) -> Result<()> {
        let events = self
            .page
            .subscribe_events(&kind.methods())
            .await
            .map_err(|e| Error::listener(format!("{} listener on {}: {}", kind, scope.name(), e)))?;

        let listener = Listener {
            kind,
            scope_name: scope.name().to_string(),
            token: scope.token(),
            page: Arc::clone(&self.page),
        };
        scope.attach(tokio::spawn(listener.run(events)));
        debug!(scope = %scope.name(), %kind, "Listener attached");
        Ok(())
    }
}

struct Listener {
    kind: ListenerKind,
    scope_name: String,
    token: CancellationToken,
    page: Arc<dyn CdpClient>,
}

impl Listener {
    async fn run(self, mut events: mpsc::Receiver<CdpEvent>) {
        loop {
            let event = tokio::select! {
                _ = self.token.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            if ListenerKind::for_method(&event.method) != Some(self.kind) {
                continue;
            }

            match self.kind {
                ListenerKind::Crash => {
                    warn!(scope = %self.scope_name, "Target crashed, cancelling scope");
                    self.token.cancel();
                    break;
                }
                ListenerKind::Dialog => self.accept_dialog(&event).await,
                ListenerKind::Console => log_console(&self.scope_name, &event),
                ListenerKind::Network => log_network(&self.scope_name, &event),
            }
        }
    }

    async fn accept_dialog(&self, event: &CdpEvent) {
        let message = event.params.get("message").and_then(Value::as_str).unwrap_or("");
        debug!(scope = %self.scope_name, %message, "Accepting page dialog");

        let accepted = tokio::select! {
            _ = self.token.cancelled() => return,
            result = self.page.handle_dialog(true) => result,
        };
        if let Err(e) = accepted {
            warn!(scope = %self.scope_name, "Dialog handling failed, cancelling scope: {}", e);
            self.token.cancel();
        }
    }
}

fn log_console(scope: &str, event: &CdpEvent) {
    match event.method.as_str() {
        "Runtime.consoleAPICalled" => {
            let level = event.params.get("type").and_then(Value::as_str).unwrap_or("log");
            let args: Vec<String> = event
                .params
                .get("args")
                .and_then(Value::as_array)
                .map(|args| {
                    args.iter()
                        .map(|arg| match arg.get("value") {
                            Some(Value::String(s)) => s.clone(),
                            Some(other) => other.to_string(),
                            None => arg
                                .get("description")
                                .and_then(Value::as_str)
                                .unwrap_or("")
                                .to_string(),
                        })
                        .collect()
                })
                .unwrap_or_default();
            debug!(scope, console_type = level, "console: {}", args.join(" "));
        }
        "Runtime.exceptionThrown" => {
            let details = &event.params["exceptionDetails"];
            let text = details["exception"]["description"]
                .as_str()
                .or_else(|| details["text"].as_str())
                .unwrap_or("");
            debug!(scope, "uncaught exception: {}", text);
        }
        other => debug!(scope, "console event {}", other),
    }
}

fn log_network(scope: &str, event: &CdpEvent) {
    let params = &event.params;
    let request_id = params["requestId"].as_str().unwrap_or("");
    match event.method.as_str() {
        "Network.requestWillBeSent" => {
            let request = &params["request"];
            debug!(
                scope,
                request_id,
                method = request["method"].as_str().unwrap_or(""),
                "request {}",
                request["url"].as_str().unwrap_or("")
            );
        }
        "Network.responseReceived" => {
            let response = &params["response"];
            debug!(
                scope,
                request_id,
                status = response["status"].as_i64().unwrap_or(0),
                "response {}",
                response["url"].as_str().unwrap_or("")
            );
        }
        "Network.loadingFailed" => {
            debug!(scope, request_id, "loading failed: {}", params["errorText"].as_str().unwrap_or(""));
        }
        "Network.webSocketCreated" => {
            debug!(scope, request_id, "websocket {}", params["url"].as_str().unwrap_or(""));
        }
        other => debug!(scope, request_id, "network event {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdp::mock::{MockBehavior, MockCdpClient};
    use serde_json::json;
    use std::time::Duration;

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[test]
    fn test_methods_per_kind() {
        assert_eq!(ListenerKind::Crash.methods(), vec!["Inspector.targetCrashed"]);
        assert_eq!(
            ListenerKind::Console.methods(),
            vec!["Runtime.consoleAPICalled", "Runtime.exceptionThrown"]
        );
        assert_eq!(ListenerKind::Network.methods().len(), 6);
        assert_eq!(ListenerKind::for_method("Page.javascriptDialogOpening"), Some(ListenerKind::Dialog));
        assert_eq!(ListenerKind::for_method("Page.loadEventFired"), None);
    }

    #[tokio::test]
    async fn test_crash_cancels_only_its_scope() {
        let page = Arc::new(MockCdpClient::new());
        let other_page = Arc::new(MockCdpClient::new());
        let browser = Scope::root("browser");
        let primary = browser.child("primary", None);
        let sibling = browser.child("sibling", None);

        EventWatcher::new(page.clone()).attach(&primary, ListenerKind::Crash).await.unwrap();
        EventWatcher::new(other_page).attach(&sibling, ListenerKind::Crash).await.unwrap();

        page.emit(CdpEvent::new("Inspector.targetCrashed", json!({})));
        settle().await;

        assert!(primary.is_cancelled());
        assert!(!sibling.is_cancelled());
        assert!(!browser.is_cancelled());
    }

    #[tokio::test]
    async fn test_browser_crash_cancels_every_attempt() {
        let page = Arc::new(MockCdpClient::new());
        let browser = Scope::root("browser");
        let primary = browser.child("primary", None);
        let fallback = browser.child("fallback", None);

        EventWatcher::new(page.clone()).attach(&browser, ListenerKind::Crash).await.unwrap();

        page.emit(CdpEvent::new("Inspector.targetCrashed", json!({})));
        settle().await;

        assert!(browser.is_cancelled());
        assert!(primary.is_cancelled());
        assert!(fallback.is_cancelled());
    }

    #[tokio::test]
    async fn test_dialog_is_accepted() {
        let page = Arc::new(MockCdpClient::new());
        let browser = Scope::root("browser");
        let scope = browser.child("primary", None);

        EventWatcher::new(page.clone()).attach(&scope, ListenerKind::Dialog).await.unwrap();
        page.emit(CdpEvent::new(
            "Page.javascriptDialogOpening",
            json!({ "type": "alert", "message": "hi" }),
        ));
        settle().await;

        assert!(page.called("handle_dialog:true"));
        assert!(!scope.is_cancelled());
    }

    #[tokio::test]
    async fn test_failed_dialog_cancels_scope() {
        let page = Arc::new(MockCdpClient::with_behavior(MockBehavior {
            dialog_error: true,
            ..MockBehavior::default()
        }));
        let browser = Scope::root("browser");
        let scope = browser.child("primary", None);

        EventWatcher::new(page.clone()).attach(&scope, ListenerKind::Dialog).await.unwrap();
        assert!(!scope.is_cancelled());

        page.emit(CdpEvent::new("Page.javascriptDialogOpening", json!({ "type": "confirm" })));
        settle().await;

        assert!(page.called("handle_dialog:true"));
        assert!(scope.is_cancelled());
        assert!(!browser.is_cancelled());
    }

    #[tokio::test]
    async fn test_diagnostic_listeners_never_cancel() {
        let page = Arc::new(MockCdpClient::new());
        let browser = Scope::root("browser");
        let scope = browser.child("primary", None);
        let watcher = EventWatcher::new(page.clone());
        watcher.attach(&scope, ListenerKind::Console).await.unwrap();
        watcher.attach(&scope, ListenerKind::Network).await.unwrap();

        page.emit(CdpEvent::new(
            "Runtime.consoleAPICalled",
            json!({ "type": "error", "args": [{ "type": "string", "value": "boom" }] }),
        ));
        page.emit(CdpEvent::new("Runtime.exceptionThrown", json!({})));
        page.emit(CdpEvent::new("Network.loadingFailed", json!({ "requestId": "1" })));
        page.emit(CdpEvent::new("Network.webSocketFrameError", json!(null)));
        settle().await;

        assert!(!scope.is_cancelled());
        assert_eq!(scope.live_listeners(), 2);
    }

    #[tokio::test]
    async fn test_listeners_stop_with_scope() {
        let page = Arc::new(MockCdpClient::new());
        let browser = Scope::root("browser");
        let scope = browser.child("primary", None);
        let watcher = EventWatcher::new(page.clone());
        watcher.attach(&scope, ListenerKind::Crash).await.unwrap();
        watcher.attach(&scope, ListenerKind::Dialog).await.unwrap();
        assert_eq!(scope.live_listeners(), 2);
        assert!(!scope.is_cancelled());

        scope.close();
        settle().await;

        assert_eq!(scope.live_listeners(), 0);
        assert_eq!(page.subscriber_count(), 0);
    }
}
