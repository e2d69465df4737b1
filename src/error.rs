//! Error handling for filter-compare
//!
//! Sample-rate and empty-signal violations are caller-contract errors and are
//! surfaced immediately. Alignment and similarity problems never show up here:
//! they degrade the comparison result instead.

use thiserror::Error;

/// Result type alias for comparison operations
pub type Result<T> = std::result::Result<T, CompareError>;

/// Main error type for comparison operations
#[derive(Error, Debug)]
pub enum CompareError {
    // File Errors
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Failed to read audio file: {path}")]
    AudioRead {
        path: String,
        #[source]
        source: hound::Error,
    },

    #[error("Failed to write audio file: {path}")]
    AudioWrite {
        path: String,
        #[source]
        source: hound::Error,
    },

    #[error("Unsupported audio format: {details}")]
    UnsupportedFormat { details: String },

    // Audio Validation Errors
    #[error("Sample rate mismatch for {path}: expected {expected} Hz, file is {actual} Hz")]
    SampleRateMismatch {
        path: String,
        expected: u32,
        actual: u32,
    },

    #[error("Tested and reference signals don't share a sample rate: {tested} Hz vs {reference} Hz")]
    IncompatibleSampleRate { tested: u32, reference: u32 },

    #[error("Signal is empty or silent: {context}")]
    EmptySignal { context: String },

    // Comparison Errors
    #[error(
        "MFCC shapes differ: tested {tested_coefficients}x{tested_frames}, \
         reference {reference_coefficients}x{reference_frames}"
    )]
    ShapeMismatch {
        tested_coefficients: usize,
        tested_frames: usize,
        reference_coefficients: usize,
        reference_frames: usize,
    },

    #[error("Cannot {operation} in state {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Malformed feature file {path}: {reason}")]
    MalformedFeatureFile { path: String, reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CompareError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            CompareError::FileNotFound { .. } => "FILE_NOT_FOUND",
            CompareError::AudioRead { .. } => "AUDIO_READ",
            CompareError::AudioWrite { .. } => "AUDIO_WRITE",
            CompareError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            CompareError::SampleRateMismatch { .. } => "SAMPLE_RATE_MISMATCH",
            CompareError::IncompatibleSampleRate { .. } => "INCOMPATIBLE_SAMPLE_RATE",
            CompareError::EmptySignal { .. } => "EMPTY_SIGNAL",
            CompareError::ShapeMismatch { .. } => "SHAPE_MISMATCH",
            CompareError::InvalidState { .. } => "INVALID_STATE",
            CompareError::InvalidConfig { .. } => "INVALID_CONFIG",
            CompareError::MalformedFeatureFile { .. } => "MALFORMED_FEATURE_FILE",
            CompareError::Io(_) => "IO_ERROR",
            CompareError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Whether a batch may record this failure and carry on with the next case
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CompareError::ShapeMismatch { .. }
                | CompareError::FileNotFound { .. }
                | CompareError::AudioRead { .. }
                | CompareError::MalformedFeatureFile { .. }
        )
    }

    /// Returns a suggested recovery action for this error
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            Self::FileNotFound { .. } => "Check that the recording was produced by the tester run",
            Self::AudioRead { .. } => "Check that the file is a valid PCM-16 WAV file",
            Self::UnsupportedFormat { .. } => "Convert the recording to mono PCM-16 WAV",
            Self::SampleRateMismatch { .. } => "Load the file with its native sample rate (16000 or 48000 Hz)",
            Self::IncompatibleSampleRate { .. } => "Record tested and reference audio at the same rate",
            Self::EmptySignal { .. } => "Check that the recording actually contains audio",
            Self::ShapeMismatch { .. } => "Adjust the alignment interval or analysis start",
            Self::InvalidState { .. } => "Run set_audio, align, detect_silence and compute_metrics in order",
            Self::InvalidConfig { .. } => "Fix the configuration value and retry",
            _ => "Check the error details and try again",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = CompareError::IncompatibleSampleRate {
            tested: 16000,
            reference: 48000,
        };
        assert_eq!(err.error_code(), "INCOMPATIBLE_SAMPLE_RATE");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_messages_carry_context() {
        let err = CompareError::ShapeMismatch {
            tested_coefficients: 20,
            tested_frames: 31,
            reference_coefficients: 20,
            reference_frames: 30,
        };
        let msg = err.to_string();
        assert!(msg.contains("20x31"));
        assert!(msg.contains("20x30"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        let err: CompareError = io.into();
        assert_eq!(err.error_code(), "IO_ERROR");
        assert!(!err.recovery_hint().is_empty());
    }
}
