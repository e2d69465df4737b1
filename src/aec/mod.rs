//! Echo canceller diagnostics

pub mod metrics_log;

pub use metrics_log::{AecMetrics, AecSample, FinalMetrics};
