pub mod decoder;
pub mod engine;
pub mod metadata;
pub mod mixer;
pub mod output;
pub mod resampler;
pub mod tags;
pub mod transport;
pub mod waveform;

// Re-export decoding types
pub use decoder::{open_file, AudioDecoder, DecodedStream, SymphoniaDecoder};

// Re-export metadata extraction
pub use metadata::{resolve_track_info, MetadataExtractor};
pub use tags::{FfprobeTagReader, NoTagFallback, ProbedTags, TagFallback};

// Re-export the playback chain
pub use engine::{BlockRenderer, PlaybackEngine, LOOP_EPSILON_SECONDS};
pub use mixer::{BlockSource, Mixer};
pub use resampler::{PlaybackSpeed, TrackResampler, MAX_SPEED, MIN_SPEED};
pub use transport::Transport;

// Re-export device output
pub use output::{AudioOutput, DeviceDescription, DeviceManager};

pub use waveform::{Peak, WaveformThumbnail};

// Re-export models for convenience
pub use crate::models::{AudioBuffer, AudioMetadata};
