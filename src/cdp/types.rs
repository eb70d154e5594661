//! CDP (Chrome DevTools Protocol) type definitions
//!
//! This module defines the JSON-RPC envelopes and the params/results of the commands the
//! renderer issues.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// CDP JSON-RPC request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CdpRequest {
    /// Request ID
    pub id: u64,
    /// Method name (e.g., "Page.navigate")
    pub method: String,
    /// Method parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    /// Session ID for multi-session targets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// CDP JSON-RPC notification (event)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdpNotification {
    /// Event method (e.g., "Page.loadEventFired")
    pub method: String,
    /// Event parameters
    #[serde(default)]
    pub params: serde_json::Value,
    /// Session ID for multi-session targets
    #[serde(default)]
    pub session_id: Option<String>,
}

/// CDP JSON-RPC response
#[derive(Debug, Clone, Deserialize)]
pub struct CdpRpcResponse {
    /// Response ID (matches request ID)
    pub id: u64,
    /// Response result
    #[serde(default)]
    pub result: serde_json::Value,
    /// Error if any
    #[serde(default)]
    pub error: Option<CdpErrorDetail>,
}

/// CDP error detail
#[derive(Debug, Clone, Deserialize)]
pub struct CdpErrorDetail {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Additional error data
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Page.navigate parameters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateParams {
    /// URL to navigate to
    pub url: String,
    /// Referrer URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
}

/// Page.navigate result
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NavigateResponse {
    /// Frame id that has navigated (or failed to navigate)
    pub frame_id: Option<String>,
    /// Loader identifier; absent for same-document navigations
    pub loader_id: Option<String>,
    /// User friendly error message, present if and only if navigation has failed
    pub error_text: Option<String>,
}

/// Runtime.evaluate parameters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateParams {
    /// JavaScript expression to evaluate
    pub expression: String,
    /// Whether to await promise
    #[serde(skip_serializing_if = "Option::is_none")]
    pub await_promise: Option<bool>,
    /// Whether to return as value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_by_value: Option<bool>,
}

/// Page.captureScreenshot parameters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotParams {
    /// Image format
    pub format: String,
    /// Clip region; absent means the current viewport
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip: Option<Clip>,
    /// Capture content outside the viewport
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_beyond_viewport: Option<bool>,
}

/// Clip region for screenshot
#[derive(Debug, Clone, Serialize)]
pub struct Clip {
    /// X offset
    pub x: f64,
    /// Y offset
    pub y: f64,
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
    /// Page scale factor
    pub scale: f64,
}

/// Page.printToPDF parameters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintToPdfParams {
    /// Render header and footer templates
    pub display_header_footer: bool,
}

/// Network.setExtraHTTPHeaders parameters
#[derive(Debug, Clone, Serialize)]
pub struct ExtraHeadersParams {
    /// Header name to value
    pub headers: BTreeMap<String, String>,
}

/// Result carrying base64 encoded binary data (screenshots, PDFs)
#[derive(Debug, Clone, Deserialize)]
pub struct DataResponse {
    /// Base64 payload
    pub data: String,
}

/// Rectangle size in CSS pixels
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ContentSize {
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
}

/// Page.getLayoutMetrics result
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutMetrics {
    /// Size of scrollable area in CSS pixels
    #[serde(default)]
    pub css_content_size: Option<ContentSize>,
    /// Deprecated size of scrollable area, reported by older browsers
    #[serde(default)]
    pub content_size: Option<ContentSize>,
}

impl LayoutMetrics {
    /// Full scrollable size, preferring the CSS pixel metric
    pub fn page_size(&self) -> Option<ContentSize> {
        self.css_content_size.or(self.content_size)
    }
}

/// Remote object (result of JavaScript evaluation)
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    /// Object type
    #[serde(default)]
    pub r#type: String,
    /// Object subtype
    #[serde(default)]
    pub subtype: Option<String>,
    /// Object value
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    /// Object description
    #[serde(default)]
    pub description: Option<String>,
}

/// Exception details
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    /// Exception text
    #[serde(default)]
    pub text: Option<String>,
    /// Line number
    #[serde(default)]
    pub line_number: i32,
    /// Column number
    #[serde(default)]
    pub column_number: i32,
    /// Exception object
    #[serde(default)]
    pub exception: Option<RemoteObject>,
}

impl ExceptionDetails {
    /// Most descriptive message available
    pub fn message(&self) -> String {
        self.exception
            .as_ref()
            .and_then(|e| e.description.clone())
            .or_else(|| self.text.clone())
            .unwrap_or_else(|| "Unknown error".to_string())
    }
}

/// Runtime.evaluate result
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResponse {
    /// Evaluation result
    #[serde(default)]
    pub result: RemoteObject,
    /// Exception details if evaluation failed
    #[serde(default)]
    pub exception_details: Option<ExceptionDetails>,
}

/// Document node
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Node ID
    pub node_id: i64,
    /// Node name
    #[serde(default)]
    pub node_name: String,
}

/// DOM.getDocument result
#[derive(Debug, Clone, Deserialize)]
pub struct GetDocumentResponse {
    /// Root node
    pub root: Node,
}

/// DOM.querySelector result
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySelectorResponse {
    /// Matching node; 0 when nothing matched
    pub node_id: i64,
}

/// DOM.getOuterHTML result
#[derive(Debug, Clone, Deserialize)]
pub struct OuterHtmlResponse {
    /// Serialized markup
    #[serde(rename = "outerHTML")]
    pub outer_html: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cdp_request_serialization() {
        let request = CdpRequest {
            id: 1,
            method: "Page.navigate".to_string(),
            params: Some(serde_json::json!({ "url": "https://example.com" })),
            session_id: None,
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"method\":\"Page.navigate\""));
    }

    #[test]
    fn test_cdp_request_without_params() {
        let request = CdpRequest {
            id: 2,
            method: "Page.enable".to_string(),
            params: None,
            session_id: None,
        };

        let json = serde_json::to_string(&request).unwrap();
        // params should not be serialized when None
        assert!(!json.contains("\"params\""));
    }

    #[test]
    fn test_navigate_response_with_error_text() {
        let response: NavigateResponse = serde_json::from_value(serde_json::json!({
            "frameId": "F1",
            "loaderId": "L1",
            "errorText": "net::ERR_NAME_NOT_RESOLVED"
        }))
        .unwrap();

        assert_eq!(response.frame_id.as_deref(), Some("F1"));
        assert_eq!(response.error_text.as_deref(), Some("net::ERR_NAME_NOT_RESOLVED"));
    }

    #[test]
    fn test_screenshot_params_full_page() {
        let params = ScreenshotParams {
            format: "png".to_string(),
            clip: Some(Clip {
                x: 0.0,
                y: 0.0,
                width: 800.0,
                height: 2400.0,
                scale: 1.0,
            }),
            capture_beyond_viewport: Some(true),
        };

        let json = serde_json::to_string(&params).unwrap();
        assert!(json.contains("\"captureBeyondViewport\":true"));
        assert!(json.contains("\"height\":2400"));
    }

    #[test]
    fn test_layout_metrics_prefers_css_size() {
        let metrics: LayoutMetrics = serde_json::from_value(serde_json::json!({
            "contentSize": { "x": 0, "y": 0, "width": 1600.0, "height": 4000.0 },
            "cssContentSize": { "x": 0, "y": 0, "width": 800.0, "height": 2000.0 }
        }))
        .unwrap();

        let size = metrics.page_size().unwrap();
        assert_eq!(size.width, 800.0);
        assert_eq!(size.height, 2000.0);
    }

    #[test]
    fn test_exception_message_prefers_description() {
        let details: ExceptionDetails = serde_json::from_value(serde_json::json!({
            "text": "Uncaught",
            "lineNumber": 0,
            "columnNumber": 6,
            "exception": { "type": "object", "description": "ReferenceError: foo is not defined" }
        }))
        .unwrap();

        assert_eq!(details.message(), "ReferenceError: foo is not defined");
    }
}
