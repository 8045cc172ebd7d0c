//! Error types for the transcription pipeline

use std::fmt;

/// Custom error type for audio-to-MIDI transcription
///
/// Only input, configuration and I/O problems surface here. Silent or
/// degenerate audio is a normal outcome and yields an empty note list.
#[derive(Debug, Clone)]
pub enum TranscriptionError {
    /// E001: Invalid audio format (e.g., unsupported container or bit depth)
    InvalidAudioFormat(String),
    /// E002: Unsupported sample rate
    UnsupportedSampleRate(u32),
    /// E003: Configuration validation failed
    ConfigValidationFailed(String),
    /// E004: Audio file I/O error
    AudioFileError(String),
    /// E005: Input validation error
    InputValidationError(String),
    /// E006: Processing pipeline error
    ProcessingPipelineError(String),
    /// E007: MIDI export error
    MidiExportError(String),
    /// E008: Analysis export error
    AnalysisExportError(String),
}

impl fmt::Display for TranscriptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscriptionError::InvalidAudioFormat(msg) => {
                write!(f, "E001: Invalid audio format - {}", msg)
            }
            TranscriptionError::UnsupportedSampleRate(sr) => {
                write!(f, "E002: Unsupported sample rate {} Hz", sr)
            }
            TranscriptionError::ConfigValidationFailed(msg) => {
                write!(f, "E003: Configuration validation failed - {}", msg)
            }
            TranscriptionError::AudioFileError(msg) => {
                write!(f, "E004: Audio file I/O error - {}", msg)
            }
            TranscriptionError::InputValidationError(msg) => {
                write!(f, "E005: Input validation error - {}", msg)
            }
            TranscriptionError::ProcessingPipelineError(msg) => {
                write!(f, "E006: Processing pipeline error - {}", msg)
            }
            TranscriptionError::MidiExportError(msg) => {
                write!(f, "E007: MIDI export error - {}", msg)
            }
            TranscriptionError::AnalysisExportError(msg) => {
                write!(f, "E008: Analysis export error - {}", msg)
            }
        }
    }
}

impl std::error::Error for TranscriptionError {}

impl From<std::io::Error> for TranscriptionError {
    fn from(err: std::io::Error) -> Self {
        TranscriptionError::AudioFileError(format!("File I/O error: {}", err))
    }
}

impl From<hound::Error> for TranscriptionError {
    fn from(err: hound::Error) -> Self {
        TranscriptionError::AudioFileError(err.to_string())
    }
}

impl From<serde_json::Error> for TranscriptionError {
    fn from(err: serde_json::Error) -> Self {
        TranscriptionError::AnalysisExportError(format!("JSON serialization error: {}", err))
    }
}

impl From<anyhow::Error> for TranscriptionError {
    fn from(err: anyhow::Error) -> Self {
        TranscriptionError::ProcessingPipelineError(format!("Generic error: {}", err))
    }
}

/// Result type alias for transcription operations
pub type Result<T> = std::result::Result<T, TranscriptionError>;
