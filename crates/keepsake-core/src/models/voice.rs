//! Voice clip model

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A voice note attached to exactly one captured item.
///
/// Deleted together with its parent item (cascade).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceClip {
    /// Local audio file (WAV)
    pub audio_path: PathBuf,
    /// Object-store path of the uploaded audio
    pub remote_audio_path: Option<String>,
    /// Clip duration in milliseconds
    pub duration_ms: u64,
    /// Precomputed normalized waveform peaks for UI rendering
    pub waveform: Option<Vec<f32>>,
}

impl VoiceClip {
    /// Create a clip pointing at a local audio file.
    #[must_use]
    pub fn new(audio_path: impl Into<PathBuf>, duration_ms: u64) -> Self {
        Self {
            audio_path: audio_path.into(),
            remote_audio_path: None,
            duration_ms,
            waveform: None,
        }
    }

    /// Attach precomputed waveform peaks.
    #[must_use]
    pub fn with_waveform(mut self, waveform: Vec<f32>) -> Self {
        self.waveform = Some(waveform);
        self
    }
}
