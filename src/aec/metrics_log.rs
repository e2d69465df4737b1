//! Echo canceller convergence metrics read from tester logs
//!
//! The echo canceller periodically logs its estimated delay, echo return loss
//! (ERL) and echo return loss enhancement (ERLE):
//!
//! ```text
//! 2025-03-12 10:15:42:123 bctbx-message-mediastreamer-AEC3 current metrics : delay = 84 ms, ERL = 12.500000, ERLE = 3.250000
//! ```
//!
//! Only the delay is present until the filter has converged enough to report
//! ERL and ERLE.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::NaiveDateTime;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{CompareError, Result};

const METRICS_MARKER: &str = "metrics :";
const TIMESTAMP_END: &str = " bctbx-message";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One metrics line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AecSample {
    pub timestamp: NaiveDateTime,
    /// Seconds since the earliest sample of the log
    pub elapsed_s: f64,
    /// Estimated delay in ms
    pub delay_ms: f64,
    pub erl: f64,
    pub erle: f64,
}

/// Metrics time series of one test run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AecMetrics {
    samples: Vec<AecSample>,
}

/// Last reported values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinalMetrics {
    pub delay_ms: f64,
    pub erl: f64,
    pub erle: f64,
}

impl AecMetrics {
    /// Parse a log file
    pub fn from_log(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CompareError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let reader = BufReader::new(File::open(path)?);
        let lines = reader.lines().collect::<std::io::Result<Vec<_>>>()?;
        let metrics = Self::from_lines(lines.iter().map(String::as_str));
        info!(
            "read {} AEC metrics samples from {}",
            metrics.len(),
            path.display()
        );
        Ok(metrics)
    }

    /// Parse log lines; lines without metrics are skipped
    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        let mut samples: Vec<AecSample> = lines.into_iter().filter_map(parse_line).collect();
        if let Some(first) = samples.iter().map(|s| s.timestamp).min() {
            for sample in &mut samples {
                sample.elapsed_s =
                    (sample.timestamp - first).num_microseconds().unwrap_or(0) as f64 / 1e6;
            }
        }
        Self { samples }
    }

    pub fn samples(&self) -> &[AecSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Values of the last metrics line
    pub fn final_values(&self) -> Option<FinalMetrics> {
        self.samples.last().map(|s| FinalMetrics {
            delay_ms: s.delay_ms,
            erl: s.erl,
            erle: s.erle,
        })
    }
}

fn parse_line(line: &str) -> Option<AecSample> {
    let (_, values) = line.split_once(METRICS_MARKER)?;
    let values = floats(values.lines().next().unwrap_or(""));
    let (delay_ms, erl, erle) = match values.as_slice() {
        [] => return None,
        [delay] => (*delay, 0.0, 0.0),
        [delay, erl, erle, ..] => (*delay, *erl, *erle),
        _ => {
            debug!("incomplete AEC metrics line skipped: {}", line);
            return None;
        }
    };

    let timestamp = match line.split_once(TIMESTAMP_END).and_then(|(ts, _)| parse_timestamp(ts)) {
        Some(ts) => ts,
        None => {
            warn!("AEC metrics line without a readable timestamp skipped: {}", line);
            return None;
        }
    };

    Some(AecSample {
        timestamp,
        elapsed_s: 0.0,
        delay_ms,
        erl,
        erle,
    })
}

/// `YYYY-mm-dd HH:MM:SS:ffffff`, the fraction having 1 to 6 digits
fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let (seconds, fraction) = text.trim().rsplit_once(':')?;
    if fraction.is_empty() || fraction.len() > 6 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let micros: i64 = format!("{:0<6}", fraction).parse().ok()?;
    let base = NaiveDateTime::parse_from_str(seconds, TIMESTAMP_FORMAT).ok()?;
    Some(base + chrono::Duration::microseconds(micros))
}

/// Every number in `text`, in order
fn floats(text: &str) -> Vec<f64> {
    text.split(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E')))
        .filter(|token| !token.is_empty())
        .filter_map(|token| token.parse::<f64>().ok())
        .collect()
}
