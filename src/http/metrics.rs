//! Prometheus counters for the HTTP surface

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

use crate::{Error, Result};

/// Request and error counters, labelled by channel
#[derive(Debug, Clone)]
pub struct HttpMetrics {
    registry: Registry,
    requests: IntCounterVec,
    errors: IntCounterVec,
}

impl HttpMetrics {
    /// Create the counters in a private registry
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let requests = counter("webrender_requests_total", "Count of all render requests")?;
        let errors = counter("webrender_errors_total", "Count of all failed render requests")?;

        registry
            .register(Box::new(requests.clone()))
            .map_err(|e| Error::internal(format!("Failed to register metric: {}", e)))?;
        registry
            .register(Box::new(errors.clone()))
            .map_err(|e| Error::internal(format!("Failed to register metric: {}", e)))?;

        Ok(Self {
            registry,
            requests,
            errors,
        })
    }

    /// Count a request on `channel`
    pub fn record_request(&self, channel: &str) {
        self.requests.with_label_values(&[channel]).inc();
    }

    /// Count a failed request on `channel`
    pub fn record_error(&self, channel: &str) {
        self.errors.with_label_values(&[channel]).inc();
    }

    /// Requests counted on `channel`
    pub fn requests(&self, channel: &str) -> u64 {
        self.requests.with_label_values(&[channel]).get()
    }

    /// Errors counted on `channel`
    pub fn errors(&self, channel: &str) -> u64 {
        self.errors.with_label_values(&[channel]).get()
    }

    /// Text exposition of every counter
    pub fn encode(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| Error::internal(format!("Failed to encode metrics: {}", e)))?;
        String::from_utf8(buffer).map_err(|e| Error::internal(format!("Metrics are not UTF-8: {}", e)))
    }
}

fn counter(name: &str, help: &str) -> Result<IntCounterVec> {
    IntCounterVec::new(Opts::new(name, help), &["channel"])
        .map_err(|e| Error::internal(format!("Failed to create metric {}: {}", name, e)))
}
