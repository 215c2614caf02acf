//! Media derivation helpers: thumbnails for captured photos and waveform
//! analysis for voice clips.

mod thumbnail;
mod waveform;

pub use thumbnail::{generate_thumbnail, Thumbnail, ThumbnailOptions};
pub use waveform::{analyze_wav, VoiceAnalysis, WAVEFORM_BUCKETS};
