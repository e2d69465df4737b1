//! Per-test result records
//!
//! One JSON object per line, appended to a shared file so that a batch of
//! tests builds a single result table.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::engine::ComparisonResult;
use crate::error::Result;

/// Result line of one test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    #[serde(rename = "test name")]
    pub test_name: String,
    pub passed: bool,
    #[serde(rename = "energy in silence")]
    pub energy_in_silence: f64,
    #[serde(rename = "energy in silence (additional)")]
    pub energy_in_silence_additional: f64,
    pub similarity: Option<f64>,
    pub distance: Option<f64>,
    /// Alignment offset in samples, when a reference was available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

impl ResultRecord {
    pub fn new(test_name: impl Into<String>, result: &ComparisonResult, offset: Option<i64>) -> Self {
        Self {
            test_name: test_name.into(),
            passed: result.passed,
            energy_in_silence: result.energy_in_silence,
            energy_in_silence_additional: result.energy_in_silence_additional,
            similarity: result.similarity,
            distance: result.distance,
            offset,
            timestamp: Utc::now(),
        }
    }

    /// Append this record as one JSON line, creating the file if needed
    pub fn append_to(&self, path: &Path) -> Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let line = serde_json::to_string(self)?;
        writeln!(file, "{}", line)?;
        debug!("appended result of {} to {}", self.test_name, path.display());
        Ok(())
    }

    /// Read every record of a results file
    ///
    /// Lines that do not parse are skipped with a warning.
    pub fn read_all(path: &Path) -> Result<Vec<Self>> {
        let reader = BufReader::new(std::fs::File::open(path)?);
        let mut records = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!("{}:{}: skipping result line: {}", path.display(), index + 1, e),
            }
        }
        Ok(records)
    }
}
