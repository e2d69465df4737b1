//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::{Path, PathBuf};

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::aec::AecMetrics;
use crate::analysis::snr_db_from_files;
use crate::audio::AudioBuffer;
use crate::engine::{ComparisonConfig, ComparisonEngine};
use crate::error::{CompareError, Result};
use crate::report::{write_features, ResultRecord};

/// Name of the results file in an output directory
pub const METRICS_FILE: &str = "metrics.jsonl";

/// One comparison to run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub tested: PathBuf,
    #[serde(default)]
    pub reference: Option<PathBuf>,
    #[serde(default)]
    pub additional: Option<PathBuf>,
    /// Overrides the configured analysis start
    #[serde(default)]
    pub start_ms: Option<u32>,
    /// Overrides the configured alignment interval
    #[serde(default)]
    pub alignment_interval_ms: Option<(u32, u32)>,
}

/// Test cases sharing a configuration and an output directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchManifest {
    #[serde(default)]
    pub config: ComparisonConfig,
    pub output_dir: PathBuf,
    pub cases: Vec<TestCase>,
}

impl BatchManifest {
    /// Load a manifest; relative paths are resolved against its directory
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CompareError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let mut manifest: Self = serde_json::from_str(&content)?;
        manifest.config.validate()?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        manifest.output_dir = base.join(&manifest.output_dir);
        for case in &mut manifest.cases {
            case.tested = base.join(&case.tested);
            case.reference = case.reference.as_ref().map(|p| base.join(p));
            case.additional = case.additional.as_ref().map(|p| base.join(p));
        }
        Ok(manifest)
    }
}

/// Outcome of a batch run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub passed: Vec<String>,
    pub failed: Vec<String>,
    /// Cases that could not be evaluated, with the reason
    pub errors: Vec<(String, String)>,
}

impl BatchSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.errors.is_empty()
    }
}

/// Run one test case and record its result
///
/// Writes the MFCC files and the aligned recordings, and appends to
/// `metrics.jsonl`, when `output_dir` is given.
pub fn run_case(
    case: &TestCase,
    config: &ComparisonConfig,
    output_dir: Option<&Path>,
) -> Result<ResultRecord> {
    info!("=== {} ===", case.name);
    let mut config = config.clone();
    if let Some(start_ms) = case.start_ms {
        config.start_ms = start_ms;
    }
    if case.alignment_interval_ms.is_some() {
        config.alignment_interval_ms = case.alignment_interval_ms;
    }
    let mut engine = ComparisonEngine::new(config.clone())?;

    let tested = AudioBuffer::load(&case.tested, config.sample_rate)?;
    let reference = match &case.reference {
        Some(path) => AudioBuffer::load(path, config.sample_rate)?,
        None => {
            warn!("{}: no reference recording", case.name);
            AudioBuffer::empty(config.sample_rate)
        }
    };
    let additional = case
        .additional
        .as_ref()
        .map(|path| AudioBuffer::load(path, config.sample_rate))
        .transpose()?;

    let result = engine.run(tested, reference, additional)?;
    let record = ResultRecord::new(
        case.name.clone(),
        &result,
        engine.alignment().map(|a| a.offset),
    );

    if let Some(dir) = output_dir {
        std::fs::create_dir_all(dir)?;
        if let Some(outcome) = engine.similarity() {
            write_features(dir, &case.name, outcome)?;
        }
        if let Some(tested) = engine.tested() {
            tested.write_aligned_wav(&dir.join(format!("{}_test_aligned.wav", case.name)))?;
        }
        if let Some(reference) = engine.reference() {
            reference.write_aligned_wav(&dir.join(format!("{}_ref_aligned.wav", case.name)))?;
        }
        record.append_to(&dir.join(METRICS_FILE))?;
    }
    Ok(record)
}

/// Compare one recording with its reference and print the metrics
#[allow(clippy::too_many_arguments)]
pub fn compare(
    tested: &Path,
    reference: Option<&Path>,
    additional: Option<&Path>,
    config_path: Option<&Path>,
    sample_rate: Option<u32>,
    start_ms: Option<u32>,
    interval: Option<(u32, u32)>,
    name: Option<String>,
    output_dir: Option<&Path>,
) -> Result<ResultRecord> {
    let mut config = match config_path {
        Some(path) => ComparisonConfig::from_json_file(path)?,
        None => ComparisonConfig::default(),
    };
    if let Some(rate) = sample_rate {
        config.sample_rate = rate;
    }

    let case = TestCase {
        name: name.unwrap_or_else(|| {
            tested
                .file_stem()
                .map_or_else(|| "test".to_string(), |s| s.to_string_lossy().into_owned())
        }),
        tested: tested.to_path_buf(),
        reference: reference.map(Path::to_path_buf),
        additional: additional.map(Path::to_path_buf),
        start_ms,
        alignment_interval_ms: interval,
    };

    let record = run_case(&case, &config, output_dir)?;
    print_record(&record);
    Ok(record)
}

/// Print the SNR between two recordings
pub fn snr(signal: &Path, noise: &Path, interval: Option<(u32, u32)>, noise_gain: f64) -> Result<f64> {
    let value = snr_db_from_files(signal, noise, interval, noise_gain)?;
    println!("SNR = {:.2} dB", value);
    Ok(value)
}

/// Print the final echo canceller metrics of a log
pub fn aec_metrics(log: &Path, json: bool) -> Result<AecMetrics> {
    let metrics = AecMetrics::from_log(log)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
    }
    match metrics.final_values() {
        Some(last) => {
            println!("final metrics:");
            println!("  delay = {} ms", last.delay_ms);
            println!("  erl   = {}", last.erl);
            println!("  erle  = {}", last.erle);
        }
        None => println!("no AEC metrics found in {}", log.display()),
    }
    Ok(metrics)
}

/// Run every case of a manifest, one engine per case
///
/// A failing case is reported and the batch goes on.
pub fn batch(manifest_path: &Path) -> Result<BatchSummary> {
    let manifest = BatchManifest::load(manifest_path)?;
    info!(
        "running {} test cases, results in {}",
        manifest.cases.len(),
        manifest.output_dir.display()
    );

    let mut summary = BatchSummary::default();
    for case in &manifest.cases {
        match run_case(case, &manifest.config, Some(&manifest.output_dir)) {
            Ok(record) if record.passed => summary.passed.push(case.name.clone()),
            Ok(_) => summary.failed.push(case.name.clone()),
            Err(e) => {
                error!("{}: [{}] {} ({})", case.name, e.error_code(), e, e.recovery_hint());
                summary.errors.push((case.name.clone(), e.to_string()));
            }
        }
    }

    println!(
        "{} passed, {} failed, {} errors",
        summary.passed.len(),
        summary.failed.len(),
        summary.errors.len()
    );
    for name in &summary.failed {
        println!("  FAILED {}", name);
    }
    for (name, reason) in &summary.errors {
        println!("  ERROR  {}: {}", name, reason);
    }
    Ok(summary)
}

fn print_record(record: &ResultRecord) {
    println!("{}:", record.test_name);
    if let Some(offset) = record.offset {
        println!("  offset                  : {} samples", offset);
    }
    println!("  energy in silence       : {:.1}", record.energy_in_silence);
    println!(
        "  energy in silence (add.): {:.1}",
        record.energy_in_silence_additional
    );
    match (record.similarity, record.distance) {
        (Some(similarity), Some(distance)) => {
            println!("  similarity              : {:.5}", similarity);
            println!("  distance                : {:.3}", distance);
        }
        _ => println!("  similarity              : n/a"),
    }
    println!("  passed                  : {}", record.passed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::write_pcm16_wav;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn speech(len: usize) -> Vec<f32> {
        let mut samples = vec![0.0; len / 3];
        samples.extend((0..len / 3).map(|i| 0.5 * (i as f32 * 0.05).sin()));
        samples.extend(vec![0.0; len - 2 * (len / 3)]);
        samples
    }

    #[test]
    fn test_manifest_paths_are_relative_to_manifest() {
        let dir = tempdir().unwrap();
        let manifest_path = dir.path().join("manifest.json");
        std::fs::write(
            &manifest_path,
            r#"{
                "output_dir": "results",
                "cases": [
                    {"name": "a", "tested": "a_out.wav", "reference": "ref.wav"},
                    {"name": "b", "tested": "/abs/b_out.wav", "alignment_interval_ms": [100, 200]}
                ]
            }"#,
        )
        .unwrap();

        let manifest = BatchManifest::load(&manifest_path).unwrap();
        assert_eq!(manifest.output_dir, dir.path().join("results"));
        assert_eq!(manifest.cases[0].tested, dir.path().join("a_out.wav"));
        assert_eq!(manifest.cases[0].reference, Some(dir.path().join("ref.wav")));
        assert_eq!(manifest.cases[1].tested, PathBuf::from("/abs/b_out.wav"));
        assert_eq!(manifest.cases[1].alignment_interval_ms, Some((100, 200)));
        assert_eq!(manifest.config, ComparisonConfig::default());
    }

    #[test]
    fn test_batch_continues_after_error() {
        let dir = tempdir().unwrap();
        let signal = speech(24000);
        write_pcm16_wav(&dir.path().join("ref.wav"), &signal, 16000).unwrap();
        write_pcm16_wav(&dir.path().join("out.wav"), &signal, 16000).unwrap();
        let manifest_path = dir.path().join("manifest.json");
        std::fs::write(
            &manifest_path,
            r#"{
                "output_dir": "results",
                "cases": [
                    {"name": "missing", "tested": "nope.wav", "reference": "ref.wav"},
                    {"name": "same", "tested": "out.wav", "reference": "ref.wav"}
                ]
            }"#,
        )
        .unwrap();

        let summary = batch(&manifest_path).unwrap();
        assert_eq!(summary.passed, vec!["same".to_string()]);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].0, "missing");
        assert!(!summary.is_success());

        let results = dir.path().join("results");
        let records = ResultRecord::read_all(&results.join(METRICS_FILE)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].test_name, "same");
        assert!(results.join("same_test_MFCC_on_talk.npy").exists());
        assert!(results.join("same_ref_MFCC_on_talk.npy").exists());
        assert!(results.join("same_MFCC_difference_with_ref_on_talk.npy").exists());

        let aligned = AudioBuffer::load(&results.join("same_test_aligned.wav"), 16000).unwrap();
        assert_eq!(aligned.len(), signal.len());
        assert!(results.join("same_ref_aligned.wav").exists());
        assert!(!results.join("missing_test_aligned.wav").exists());
    }

    #[test]
    fn test_run_case_without_reference() {
        let dir = tempdir().unwrap();
        let noise: Vec<f32> = (0..16000).map(|i| 0.01 * (i as f32 * 0.3).sin()).collect();
        write_pcm16_wav(&dir.path().join("out.wav"), &noise, 16000).unwrap();
        let case = TestCase {
            name: "single_talk".to_string(),
            tested: dir.path().join("out.wav"),
            reference: None,
            additional: None,
            start_ms: Some(250),
            alignment_interval_ms: None,
        };

        let record = run_case(&case, &ComparisonConfig::default(), None).unwrap();
        assert!(record.energy_in_silence > 0.0);
        assert!(record.similarity.is_none());
        assert!(record.offset.is_none());
    }

    #[test]
    fn test_run_case_rate_mismatch() {
        let dir = tempdir().unwrap();
        write_pcm16_wav(&dir.path().join("out.wav"), &speech(4800), 48000).unwrap();
        let case = TestCase {
            name: "rate".to_string(),
            tested: dir.path().join("out.wav"),
            reference: None,
            additional: None,
            start_ms: None,
            alignment_interval_ms: None,
        };
        let result = run_case(&case, &ComparisonConfig::default(), None);
        assert!(matches!(result, Err(CompareError::SampleRateMismatch { .. })));
    }
}
