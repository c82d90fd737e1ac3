//! Background min/max peak summary of a file, for drawing its waveform.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use log::{debug, warn};

use crate::audio::decoder::{AudioDecoder, SymphoniaDecoder};

/// Lowest and highest sample seen in one bucket
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub min: f32,
    pub max: f32,
}

#[derive(Default)]
struct ThumbnailData {
    source: Option<PathBuf>,
    total_length: Option<f64>,
    peaks: Vec<Peak>,
    expected_peaks: usize,
    complete: bool,
}

/// Peak summary built progressively by a worker thread. Readers can poll it
/// at any time and get whatever has been computed so far.
pub struct WaveformThumbnail {
    peaks_per_second: u32,
    data: Arc<Mutex<ThumbnailData>>,
    cancel: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl WaveformThumbnail {
    pub fn new(peaks_per_second: u32) -> Self {
        Self {
            peaks_per_second: peaks_per_second.max(1),
            data: Arc::new(Mutex::new(ThumbnailData::default())),
            cancel: Arc::new(AtomicBool::new(true)),
            worker: None,
        }
    }

    fn lock_data(&self) -> MutexGuard<'_, ThumbnailData> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start summarizing `path`, abandoning any previous file
    pub fn set_source(&mut self, path: &Path) {
        self.clear();

        {
            let mut data = self.lock_data();
            data.source = Some(path.to_path_buf());
        }

        let cancel = Arc::new(AtomicBool::new(false));
        self.cancel = Arc::clone(&cancel);
        let data = Arc::clone(&self.data);
        let path = path.to_path_buf();
        let peaks_per_second = self.peaks_per_second;

        let spawned = thread::Builder::new()
            .name("waveform".to_string())
            .spawn(move || build_peaks(&path, peaks_per_second, &data, &cancel));

        match spawned {
            Ok(handle) => self.worker = Some(handle),
            Err(e) => warn!("Failed to start waveform worker: {}", e),
        }
    }

    /// Drop the current summary and stop its worker
    pub fn clear(&mut self) {
        self.cancel.store(true, Ordering::Release);
        // The worker checks the flag between packets; don't wait on it
        self.worker.take();
        *self.lock_data() = ThumbnailData::default();
    }

    pub fn source(&self) -> Option<PathBuf> {
        self.lock_data().source.clone()
    }

    /// Length of the summarized file in seconds, once known
    pub fn total_length(&self) -> Option<f64> {
        self.lock_data().total_length
    }

    pub fn peaks(&self) -> Vec<Peak> {
        self.lock_data().peaks.clone()
    }

    pub fn is_complete(&self) -> bool {
        self.lock_data().complete
    }

    /// Fraction of the file summarized so far
    pub fn progress(&self) -> f64 {
        let data = self.lock_data();
        if data.complete {
            1.0
        } else if data.expected_peaks == 0 {
            0.0
        } else {
            (data.peaks.len() as f64 / data.expected_peaks as f64).min(1.0)
        }
    }

    /// Reduce the summary to `width` columns, merging neighbouring peaks
    pub fn columns(&self, width: usize) -> Vec<Peak> {
        let data = self.lock_data();
        let total = match data.total_length {
            Some(length) if length > 0.0 => ((length * self.peaks_per_second as f64).ceil() as usize).max(data.peaks.len()),
            _ => data.peaks.len(),
        };
        if width == 0 || total == 0 {
            return Vec::new();
        }

        (0..width)
            .map(|column| {
                let begin = column * total / width;
                let end = ((column + 1) * total / width).max(begin + 1);
                data.peaks
                    .get(begin.min(data.peaks.len())..end.min(data.peaks.len()))
                    .unwrap_or(&[])
                    .iter()
                    .fold(Peak { min: 0.0, max: 0.0 }, |acc, p| Peak {
                        min: acc.min.min(p.min),
                        max: acc.max.max(p.max),
                    })
            })
            .collect()
    }
}

impl Drop for WaveformThumbnail {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Release);
    }
}

fn publish(data: &Mutex<ThumbnailData>, cancel: &AtomicBool, update: impl FnOnce(&mut ThumbnailData)) {
    let mut guard = data.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    // A cleared or replaced thumbnail must not see late writes
    if !cancel.load(Ordering::Acquire) {
        update(&mut guard);
    }
}

fn build_peaks(path: &Path, peaks_per_second: u32, data: &Mutex<ThumbnailData>, cancel: &AtomicBool) {
    let mut decoder = match SymphoniaDecoder::open(path) {
        Ok(decoder) => decoder,
        Err(e) => {
            warn!("Waveform unavailable for {}: {}", path.display(), e);
            publish(data, cancel, |d| d.complete = true);
            return;
        }
    };

    let sample_rate = decoder.sample_rate().max(1);
    let frames_per_peak = (sample_rate / peaks_per_second).max(1) as usize;
    let length = decoder.duration().as_secs_f64();
    if length > 0.0 {
        let expected = (length * peaks_per_second as f64).ceil() as usize;
        publish(data, cancel, |d| {
            d.total_length = Some(length);
            d.expected_peaks = expected;
        });
    }

    let mut current = Peak { min: 0.0, max: 0.0 };
    let mut in_bucket = 0usize;
    let mut total_frames = 0u64;

    loop {
        if cancel.load(Ordering::Acquire) {
            debug!("Waveform build for {} cancelled", path.display());
            return;
        }

        let buffer = match decoder.decode_next() {
            Ok(Some(buffer)) => buffer,
            Ok(None) => break,
            Err(e) => {
                warn!("Waveform decode stopped early for {}: {}", path.display(), e);
                break;
            }
        };

        let channels = buffer.channels.max(1) as usize;
        let mut fresh = Vec::new();
        for frame in buffer.samples.chunks(channels) {
            for &sample in frame {
                current.min = current.min.min(sample);
                current.max = current.max.max(sample);
            }
            in_bucket += 1;
            if in_bucket == frames_per_peak {
                fresh.push(current);
                current = Peak { min: 0.0, max: 0.0 };
                in_bucket = 0;
            }
        }
        total_frames += buffer.frames as u64;

        if !fresh.is_empty() {
            publish(data, cancel, |d| d.peaks.extend(fresh));
        }
    }

    let measured = total_frames as f64 / sample_rate as f64;
    publish(data, cancel, |d| {
        if in_bucket > 0 {
            d.peaks.push(current);
        }
        if d.total_length.is_none() {
            d.total_length = Some(measured);
        }
        d.complete = true;
    });
    debug!("Waveform for {} complete", path.display());
}
