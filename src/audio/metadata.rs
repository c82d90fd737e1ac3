use std::path::Path;
use std::time::Duration;

use log::debug;
use symphonia::core::formats::FormatReader;
use symphonia::core::meta::{MetadataRevision, StandardTagKey, Value};
use symphonia::core::probe::ProbedMetadata;

use crate::audio::tags::TagFallback;
use crate::models::{AudioMetadata, TrackInfo};

/// Embedded tag extraction for symphonia-probed files
pub struct MetadataExtractor;

impl MetadataExtractor {
    /// Collect tags from the probe result and the container, container tags winning
    pub fn extract(probed_metadata: &mut ProbedMetadata, format_reader: &mut dyn FormatReader) -> AudioMetadata {
        let mut metadata = AudioMetadata::new();

        if let Some(probed_meta) = probed_metadata.get() {
            if let Some(revision) = probed_meta.current() {
                Self::extract_from_revision(revision, &mut metadata);
            }
        }

        let container_meta = format_reader.metadata();
        if let Some(revision) = container_meta.current() {
            Self::extract_from_revision(revision, &mut metadata);
        }

        metadata
    }

    /// Extract metadata from a metadata revision
    pub(crate) fn extract_from_revision(revision: &MetadataRevision, metadata: &mut AudioMetadata) {
        for tag in revision.tags() {
            let text = match &tag.value {
                Value::String(s) => Some(s.trim().to_string()),
                _ => None,
            };

            if let Some(std_key) = tag.std_key {
                match std_key {
                    StandardTagKey::TrackTitle => {
                        if let Some(title) = text.filter(|t| !t.is_empty()) {
                            metadata.title = Some(title);
                        }
                    }
                    StandardTagKey::Artist => {
                        if let Some(artist) = text.filter(|t| !t.is_empty()) {
                            metadata.artist = Some(artist);
                        }
                    }
                    StandardTagKey::AlbumArtist => {
                        // Only used when no track artist is present
                        if metadata.artist.is_none() {
                            metadata.artist = text.filter(|t| !t.is_empty());
                        }
                    }
                    StandardTagKey::Album => {
                        if let Some(album) = text.filter(|t| !t.is_empty()) {
                            metadata.album = Some(album);
                        }
                    }
                    StandardTagKey::Date => match &tag.value {
                        Value::String(date_str) => {
                            // YYYY-MM-DD or just YYYY
                            if let Some(year) = date_str.split('-').next().and_then(|y| y.trim().parse::<u32>().ok()) {
                                metadata.year = Some(year);
                            }
                        }
                        Value::UnsignedInt(year) => metadata.year = Some(*year as u32),
                        _ => {}
                    },
                    _ => {}
                }
            } else {
                match tag.key.to_lowercase().as_str() {
                    "title" | "tit2" | "inam" => {
                        if let Some(title) = text.filter(|t| !t.is_empty()) {
                            metadata.title = Some(title);
                        }
                    }
                    "artist" | "tpe1" | "iart" => {
                        if let Some(artist) = text.filter(|t| !t.is_empty()) {
                            metadata.artist = Some(artist);
                        }
                    }
                    "album" | "talb" | "iprd" => {
                        if let Some(album) = text.filter(|t| !t.is_empty()) {
                            metadata.album = Some(album);
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Build the display info for a freshly decoded file.
///
/// Embedded tags come first. When they carry no usable artist the external
/// tag probe is asked, and whatever it returns fills the gaps. Anything still
/// missing falls back to "Unknown Artist" and the file name at display time.
pub fn resolve_track_info(
    path: &Path,
    embedded: AudioMetadata,
    duration: Duration,
    sample_rate: u32,
    channels: u16,
    fallback: &dyn TagFallback,
) -> TrackInfo {
    let mut metadata = embedded;

    if !metadata.has_meaningful_artist() {
        if let Some(probed) = fallback.lookup(path) {
            debug!("Tag fallback for {}: {:?}", path.display(), probed);
            if probed.artist.is_some() {
                metadata.artist = probed.artist;
            }
            if metadata.title.is_none() {
                metadata.title = probed.title;
            }
        }
    }

    TrackInfo::new(path.to_path_buf(), metadata, duration, sample_rate, channels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::tags::{NoTagFallback, ProbedTags};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedTags {
        calls: AtomicUsize,
        tags: ProbedTags,
    }

    impl TagFallback for FixedTags {
        fn lookup(&self, _path: &Path) -> Option<ProbedTags> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Some(self.tags.clone())
        }
    }

    fn fixed(artist: Option<&str>, title: Option<&str>) -> FixedTags {
        FixedTags {
            calls: AtomicUsize::new(0),
            tags: ProbedTags {
                artist: artist.map(str::to_string),
                title: title.map(str::to_string),
            },
        }
    }

    #[test]
    fn test_embedded_artist_skips_fallback() {
        let fallback = fixed(Some("Probe Artist"), Some("Probe Title"));
        let embedded = AudioMetadata::with_title_artist("Tagged".to_string(), "Tagged Artist".to_string());

        let info = resolve_track_info(
            &PathBuf::from("/music/a.mp3"),
            embedded,
            Duration::from_secs(30),
            44100,
            2,
            &fallback,
        );

        assert_eq!(info.artist_name(), "Tagged Artist");
        assert_eq!(info.display_name(), "Tagged");
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_generic_artist_uses_fallback() {
        let fallback = fixed(Some("Probe Artist"), Some("Probe Title"));
        let mut embedded = AudioMetadata::new();
        embedded.artist = Some("Unknown".to_string());
        embedded.title = Some("Kept Title".to_string());

        let info = resolve_track_info(
            &PathBuf::from("/music/a.mp3"),
            embedded,
            Duration::from_secs(30),
            44100,
            2,
            &fallback,
        );

        assert_eq!(info.artist_name(), "Probe Artist");
        assert_eq!(info.display_name(), "Kept Title");
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_everything_yields_placeholders() {
        let info = resolve_track_info(
            &PathBuf::from("/music/loop_take3.wav"),
            AudioMetadata::new(),
            Duration::from_secs(12),
            48000,
            1,
            &NoTagFallback,
        );

        assert_eq!(info.artist_name(), "Unknown Artist");
        assert_eq!(info.display_name(), "loop_take3");
        assert_eq!(info.sample_rate, 48000);
        assert_eq!(info.channels, 1);
    }
}
