//! # HTTP surface
//!
//! - `server`: axum router for render, health check and metrics requests
//! - `form`: render fields as decoded by the query and form extractors
//! - `metrics`: Prometheus request and error counters

pub mod form;
pub mod metrics;
pub mod server;

pub use metrics::HttpMetrics;
pub use server::{HttpServer, Routes};
