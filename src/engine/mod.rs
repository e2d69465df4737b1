//! Comparison Engine Module
//!
//! Orchestrates the analysis stages:
//! - Configuration of a comparison run
//! - Comparison state machine

pub mod comparison;
pub mod config;

pub use comparison::{ComparisonEngine, ComparisonResult, ComparisonState, SilenceSource};
pub use config::{ComparisonConfig, LongReferencePolicy, ShorterReferencePolicy};
