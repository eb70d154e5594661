//! Action pipelines
//!
//! [`build`] turns a request into the ordered steps of one attempt; [`execute`] runs them
//! one after another against a page.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use tracing::debug;

use crate::cdp::CdpClient;
use crate::render::request::{OutputKind, RenderRequest};
use crate::{Error, Result};

/// Selector of the node whose markup is kept as the DOM snapshot
pub const ROOT_SELECTOR: &str = ":root";

/// One automation step
#[derive(Debug, Clone, PartialEq)]
pub enum ActionStep {
    /// Enable the Network domain so extra headers apply
    EnableHeaderInterception,
    /// Send these headers with every request
    SetHeaders(BTreeMap<String, String>),
    /// Load a URL and wait for it to complete
    Navigate(String),
    /// Run a script in the page
    EvaluateScript(String),
    /// Wait
    Sleep(Duration),
    /// Stop whatever is still loading
    StopLoading,
    /// Snapshot the root element's markup
    CaptureDom,
    /// Capture a PNG of the viewport or the whole page
    CaptureScreenshot {
        /// Beyond the viewport
        full_page: bool,
    },
    /// Print to PDF with header and footer
    CapturePdf,
}

impl fmt::Display for ActionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionStep::EnableHeaderInterception => f.write_str("enable-header-interception"),
            ActionStep::SetHeaders(headers) => write!(f, "set-headers({})", headers.len()),
            ActionStep::Navigate(url) => write!(f, "navigate({})", url),
            ActionStep::EvaluateScript(_) => f.write_str("evaluate-script"),
            ActionStep::Sleep(delay) => write!(f, "sleep({:?})", delay),
            ActionStep::StopLoading => f.write_str("stop-loading"),
            ActionStep::CaptureDom => f.write_str("capture-dom"),
            ActionStep::CaptureScreenshot { full_page: true } => f.write_str("capture-full-screenshot"),
            ActionStep::CaptureScreenshot { full_page: false } => f.write_str("capture-screenshot"),
            ActionStep::CapturePdf => f.write_str("capture-pdf"),
        }
    }
}

/// Steps of one attempt; `navigate` is false for the fallback attempt
pub fn build(request: &RenderRequest, navigate: bool) -> Vec<ActionStep> {
    let mut steps = Vec::new();

    if !request.headers().is_empty() {
        steps.push(ActionStep::EnableHeaderInterception);
        steps.push(ActionStep::SetHeaders(request.headers().clone()));
    }

    if navigate {
        steps.push(ActionStep::Navigate(request.url().to_string()));
        if let Some(script) = request.script() {
            steps.push(ActionStep::EvaluateScript(script.to_string()));
        }
        if !request.delay().is_zero() {
            steps.push(ActionStep::Sleep(request.delay()));
        }
        steps.push(ActionStep::StopLoading);
    }

    steps.push(ActionStep::CaptureDom);

    steps.push(match request.output() {
        OutputKind::Pdf => ActionStep::CapturePdf,
        OutputKind::Screenshot => ActionStep::CaptureScreenshot {
            full_page: request.full_page(),
        },
    });

    steps
}

/// What a pipeline captured
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureOutput {
    /// PNG or PDF bytes
    pub data: Vec<u8>,
    /// Markup of the root element
    pub dom: String,
}

/// Run `steps` in order; the first failing step ends the run
pub async fn execute(page: &dyn CdpClient, steps: &[ActionStep]) -> Result<CaptureOutput> {
    let mut output = CaptureOutput::default();

    for step in steps {
        debug!(%step, "Running step");
        match step {
            ActionStep::EnableHeaderInterception => page.enable_domain("Network").await?,
            ActionStep::SetHeaders(headers) => page.set_extra_headers(headers).await?,
            ActionStep::Navigate(url) => {
                page.navigate(url).await?;
            }
            ActionStep::EvaluateScript(script) => {
                page.evaluate(script, false).await?;
            }
            ActionStep::Sleep(delay) => tokio::time::sleep(*delay).await,
            ActionStep::StopLoading => page.stop_loading().await?,
            ActionStep::CaptureDom => output.dom = page.outer_html(ROOT_SELECTOR).await?,
            ActionStep::CaptureScreenshot { full_page } => output.data = page.screenshot(*full_page).await?,
            ActionStep::CapturePdf => output.data = page.print_to_pdf(true).await?,
        }
    }

    if output.data.is_empty() {
        return Err(Error::capture("Pipeline produced no output"));
    }
    Ok(output)
}
