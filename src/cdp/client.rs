//! CDP client implementation
//!
//! This module provides a high-level CDP client with typed methods for the operations a
//! render pipeline performs on one page.

use super::traits::*;
use super::types::*;
use crate::Error;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Interval between `document.readyState` checks after a navigation
const READY_STATE_POLL: Duration = Duration::from_millis(100);

/// CDP client implementation
#[derive(Debug, Clone)]
pub struct CdpClientImpl {
    /// Underlying CDP connection
    connection: Arc<dyn CdpConnection>,
}

impl CdpClientImpl {
    /// Create a new CDP client
    ///
    /// # Arguments
    /// * `connection` - CDP connection instance
    pub fn new(connection: Arc<dyn CdpConnection>) -> Self {
        Self { connection }
    }

    /// Get the underlying connection
    pub fn connection(&self) -> Arc<dyn CdpConnection> {
        Arc::clone(&self.connection)
    }

    /// Parse remote object value to evaluation result
    fn parse_remote_object(obj: &RemoteObject) -> EvaluationResult {
        match obj.r#type.as_str() {
            "string" => EvaluationResult::String(
                obj.value
                    .as_ref()
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
            ),
            "number" => EvaluationResult::Number(obj.value.as_ref().and_then(|v| v.as_f64()).unwrap_or(0.0)),
            "boolean" => EvaluationResult::Bool(obj.value.as_ref().and_then(|v| v.as_bool()).unwrap_or(false)),
            "object" | "function" | "bigint" | "symbol" => match &obj.value {
                None | Some(serde_json::Value::Null) => EvaluationResult::Null,
                Some(value) => EvaluationResult::Object(value.clone()),
            },
            other => {
                debug!("parse_remote_object: '{}' maps to Null", other);
                EvaluationResult::Null
            }
        }
    }

    fn decode_data(result: serde_json::Value, what: &str) -> Result<Vec<u8>, Error> {
        let response: DataResponse = serde_json::from_value(result)
            .map_err(|e| Error::capture(format!("No data in {} result: {}", what, e)))?;

        let bytes = BASE64
            .decode(response.data)
            .map_err(|e| Error::capture(format!("Failed to decode {}: {}", what, e)))?;

        if bytes.is_empty() {
            return Err(Error::capture(format!("Browser returned an empty {}", what)));
        }
        Ok(bytes)
    }

    async fn wait_until_loaded(&self) -> Result<(), Error> {
        loop {
            tokio::time::sleep(READY_STATE_POLL).await;
            match self.evaluate("document.readyState", false).await {
                Ok(EvaluationResult::String(state)) if state == "complete" => return Ok(()),
                Ok(state) => debug!("Document not ready yet: {:?}", state),
                Err(e) if !self.connection.is_active() => {
                    return Err(Error::navigation(format!("Page went away while loading: {}", e)));
                }
                // The execution context is swapped out while the new document commits
                Err(e) => debug!("Ready state check failed: {}", e),
            }
        }
    }
}

#[async_trait]
impl CdpClient for CdpClientImpl {
    /// Navigate to a URL and wait for the load to complete.
    ///
    /// There is no cap on the wait; the enclosing attempt scope bounds it.
    async fn navigate(&self, url: &str) -> Result<NavigationResult, Error> {
        info!("Navigating to {}", url);

        let params = NavigateParams {
            url: url.to_string(),
            referrer: None,
        };
        let result = self
            .call_method("Page.navigate", serde_json::to_value(params)?)
            .await
            .map_err(|e| Error::navigation(e.to_string()))?;

        let response: NavigateResponse = serde_json::from_value(result).unwrap_or_default();
        if let Some(error_text) = response.error_text.filter(|t| !t.is_empty()) {
            return Err(Error::navigation(format!("{}: {}", url, error_text)));
        }

        self.wait_until_loaded().await?;

        Ok(NavigationResult {
            frame_id: response.frame_id,
            loader_id: response.loader_id,
            url: url.to_string(),
        })
    }

    async fn evaluate(&self, script: &str, await_promise: bool) -> Result<EvaluationResult, Error> {
        let params = EvaluateParams {
            expression: script.to_string(),
            await_promise: Some(await_promise),
            return_by_value: Some(true),
        };

        let result = self
            .call_method("Runtime.evaluate", serde_json::to_value(params)?)
            .await
            .map_err(|e| Error::navigation(format!("Script evaluation failed: {}", e)))?;

        let response: EvaluateResponse = serde_json::from_value(result)
            .map_err(|e| Error::cdp(format!("Failed to parse EvaluateResponse: {}", e)))?;

        if let Some(exception) = response.exception_details {
            return Err(Error::navigation(format!("Script threw: {}", exception.message())));
        }

        Ok(Self::parse_remote_object(&response.result))
    }

    async fn stop_loading(&self) -> Result<(), Error> {
        self.call_method("Page.stopLoading", serde_json::json!({}))
            .await
            .map_err(|e| Error::navigation(format!("Failed to stop loading: {}", e)))?;
        Ok(())
    }

    async fn outer_html(&self, selector: &str) -> Result<String, Error> {
        let document: GetDocumentResponse =
            serde_json::from_value(self.call_method("DOM.getDocument", serde_json::json!({ "depth": 0 })).await?)?;

        let found: QuerySelectorResponse = serde_json::from_value(
            self.call_method(
                "DOM.querySelector",
                serde_json::json!({ "nodeId": document.root.node_id, "selector": selector }),
            )
            .await?,
        )?;
        if found.node_id == 0 {
            return Err(Error::capture(format!("No node matches selector {}", selector)));
        }

        let html: OuterHtmlResponse = serde_json::from_value(
            self.call_method("DOM.getOuterHTML", serde_json::json!({ "nodeId": found.node_id }))
                .await?,
        )?;
        Ok(html.outer_html)
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, Error> {
        info!("Capturing screenshot (full_page: {})", full_page);

        let mut params = ScreenshotParams {
            format: "png".to_string(),
            clip: None,
            capture_beyond_viewport: None,
        };

        if full_page {
            let metrics: LayoutMetrics = serde_json::from_value(
                self.call_method("Page.getLayoutMetrics", serde_json::json!({}))
                    .await
                    .map_err(|e| Error::capture(e.to_string()))?,
            )?;
            let size = metrics
                .page_size()
                .ok_or_else(|| Error::capture("Layout metrics carry no content size"))?;
            params.clip = Some(Clip {
                x: 0.0,
                y: 0.0,
                width: size.width.ceil(),
                height: size.height.ceil(),
                scale: 1.0,
            });
            params.capture_beyond_viewport = Some(true);
        }

        let result = self
            .call_method("Page.captureScreenshot", serde_json::to_value(params)?)
            .await
            .map_err(|e| Error::capture(e.to_string()))?;

        Self::decode_data(result, "screenshot")
    }

    async fn print_to_pdf(&self, display_header_footer: bool) -> Result<Vec<u8>, Error> {
        info!("Printing page to PDF");

        let params = PrintToPdfParams { display_header_footer };
        let result = self
            .call_method("Page.printToPDF", serde_json::to_value(params)?)
            .await
            .map_err(|e| Error::capture(e.to_string()))?;

        Self::decode_data(result, "PDF")
    }

    async fn enable_domain(&self, domain: &str) -> Result<(), Error> {
        debug!("Enabling domain: {}", domain);
        self.call_method(&format!("{}.enable", domain), serde_json::json!({}))
            .await?;
        Ok(())
    }

    async fn set_extra_headers(&self, headers: &BTreeMap<String, String>) -> Result<(), Error> {
        let params = ExtraHeadersParams {
            headers: headers.clone(),
        };
        self.call_method("Network.setExtraHTTPHeaders", serde_json::to_value(params)?)
            .await
            .map_err(|e| Error::navigation(format!("Failed to set extra headers: {}", e)))?;
        Ok(())
    }

    async fn handle_dialog(&self, accept: bool) -> Result<(), Error> {
        self.call_method("Page.handleJavaScriptDialog", serde_json::json!({ "accept": accept }))
            .await
            .map_err(|e| Error::dialog_handling(e.to_string()))?;
        Ok(())
    }

    async fn call_method(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, Error> {
        let response = self.connection.send_command(method, params).await?;
        response.result.ok_or_else(|| Error::cdp("No result in response"))
    }

    async fn subscribe_events(&self, methods: &[&str]) -> Result<tokio::sync::mpsc::Receiver<CdpEvent>, Error> {
        let mut event_receiver = self.connection.listen_events().await?;
        if methods.is_empty() {
            return Ok(event_receiver);
        }

        let (tx, rx) = tokio::sync::mpsc::channel(100);
        let wanted: Vec<String> = methods.iter().map(|m| m.to_string()).collect();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    event = event_receiver.recv() => match event {
                        Some(event) => {
                            if wanted.iter().any(|m| *m == event.method) && tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdp::mock::MockCdpConnection;
    use serde_json::json;

    fn remote(kind: &str, value: Option<serde_json::Value>) -> RemoteObject {
        RemoteObject {
            r#type: kind.to_string(),
            subtype: None,
            value,
            description: None,
        }
    }

    #[test]
    fn test_parse_remote_object_string() {
        let result = CdpClientImpl::parse_remote_object(&remote("string", Some(serde_json::json!("complete"))));
        assert!(matches!(result, EvaluationResult::String(s) if s == "complete"));
    }

    #[test]
    fn test_parse_remote_object_number() {
        let result = CdpClientImpl::parse_remote_object(&remote("number", Some(serde_json::json!(42.5))));
        assert!(matches!(result, EvaluationResult::Number(n) if n == 42.5));
    }

    #[test]
    fn test_parse_remote_object_bool() {
        let result = CdpClientImpl::parse_remote_object(&remote("boolean", Some(serde_json::json!(true))));
        assert!(matches!(result, EvaluationResult::Bool(true)));
    }

    #[test]
    fn test_parse_remote_object_null() {
        let result = CdpClientImpl::parse_remote_object(&remote("undefined", None));
        assert!(matches!(result, EvaluationResult::Null));
    }

    #[test]
    fn test_decode_empty_payload_is_capture_error() {
        let err = CdpClientImpl::decode_data(serde_json::json!({ "data": "" }), "PDF").unwrap_err();
        assert!(matches!(err, Error::Capture(_)));
    }

    #[test]
    fn test_decode_payload() {
        let encoded = BASE64.encode(b"%PDF-1.4");
        let bytes = CdpClientImpl::decode_data(serde_json::json!({ "data": encoded }), "PDF").unwrap();
        assert!(bytes.starts_with(b"%PDF-"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigate_fails_fast_when_page_goes_away() {
        let connection = Arc::new(MockCdpConnection::new());
        connection.respond(
            "Runtime.evaluate",
            json!({ "result": { "type": "string", "value": "loading" } }),
        );
        let client = CdpClientImpl::new(connection.clone());

        let closer = {
            let connection = connection.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(450)).await;
                connection.close().await
            })
        };

        let started = tokio::time::Instant::now();
        let err = client.navigate("https://example.com").await.unwrap_err();

        assert!(matches!(err, Error::Navigation(_)));
        assert!(err.to_string().contains("went away"));
        assert!(started.elapsed() < Duration::from_secs(1));
        closer.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigate_keeps_polling_while_context_swaps() {
        let connection = Arc::new(MockCdpConnection::new());
        connection.fail("Runtime.evaluate", "Cannot find context with specified id");
        let client = CdpClientImpl::new(connection.clone());

        let navigation = tokio::spawn({
            let client = client.clone();
            async move { client.navigate("https://example.com").await }
        });
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(!navigation.is_finished());

        connection.respond(
            "Runtime.evaluate",
            json!({ "result": { "type": "string", "value": "complete" } }),
        );
        let result = navigation.await.unwrap().unwrap();
        assert_eq!(result.url, "https://example.com");
    }
}
