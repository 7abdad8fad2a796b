// src/samples.rs
//
// Decoded note samples.
//
// The sample table maps a canonical note to a mono buffer. It is shared
// between the loader (which may run on its own thread and finish after
// playback has started) and the trainer, which looks notes up at voice
// creation time. A missing entry is not an error: the voice falls back to
// synthesis.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use hound::{SampleFormat, WavReader};
use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::note::NoteSymbol;

/// A decoded, mono, single-note recording.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    data: Vec<f32>,
    sample_rate: f64,
}

impl SampleBuffer {
    pub fn new(data: Vec<f32>, sample_rate: f64) -> Self {
        Self { data, sample_rate }
    }

    /// Decode a WAV stream, folding every channel down to mono.
    pub fn decode<R: Read>(reader: R) -> std::result::Result<Self, hound::Error> {
        let mut reader = WavReader::new(reader)?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
            SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|s| s as f32 / scale))
                    .collect::<std::result::Result<_, _>>()?
            }
        };

        let data = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();

        Ok(Self::new(data, spec.sample_rate as f64))
    }

    /// Read and decode a WAV file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::decode(std::io::BufReader::new(file)).map_err(|source| Error::SampleDecode {
            path: path.to_path_buf(),
            source,
        })
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn duration(&self) -> f64 {
        if self.sample_rate > 0.0 {
            self.data.len() as f64 / self.sample_rate
        } else {
            0.0
        }
    }

    /// Linearly interpolated value at a fractional frame position.
    /// Positions past the end read as silence.
    #[inline]
    pub fn interpolate(&self, position: f64) -> f32 {
        if position < 0.0 {
            return 0.0;
        }
        let index = position as usize;
        let Some(&a) = self.data.get(index) else {
            return 0.0;
        };
        let b = self.data.get(index + 1).copied().unwrap_or(0.0);
        let frac = (position - index as f64) as f32;
        a + (b - a) * frac
    }
}

/// Shared note → buffer table.
///
/// Cloning is cheap and every clone sees the same table.
#[derive(Debug, Clone, Default)]
pub struct SampleTable {
    inner: Arc<RwLock<HashMap<NoteSymbol, Arc<SampleBuffer>>>>,
}

impl SampleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, note: NoteSymbol, buffer: SampleBuffer) {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        map.insert(note, Arc::new(buffer));
    }

    pub fn get(&self, note: &NoteSymbol) -> Option<Arc<SampleBuffer>> {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        map.get(note).cloned()
    }

    pub fn contains(&self, note: &NoteSymbol) -> bool {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        map.contains_key(note)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// File that holds the sample for `note` inside `dir` (`C#4.wav`).
pub fn sample_path(dir: &Path, note: &NoteSymbol) -> PathBuf {
    dir.join(format!("{note}.wav"))
}

/// Load `{note}.wav` for every note from `dir` into `table`.
///
/// Notes whose file is missing or unreadable are skipped. A single
/// warning summarizes the failures of the whole load. Returns how many
/// notes were loaded.
pub fn load_directory<'a>(
    table: &SampleTable,
    dir: impl AsRef<Path>,
    notes: impl IntoIterator<Item = &'a NoteSymbol>,
) -> usize {
    let dir = dir.as_ref();
    let mut loaded = 0;
    let mut failed = Vec::new();

    for note in notes {
        let path = sample_path(dir, note);
        match SampleBuffer::open(&path) {
            Ok(buffer) => {
                debug!("Loaded sample {} ({:.2}s)", note, buffer.duration());
                table.insert(*note, buffer);
                loaded += 1;
            }
            Err(err) => failed.push((*note, err)),
        }
    }

    if let Some((note, err)) = failed.first() {
        warn!(
            "{} of {} samples unavailable in {} (first: {}: {}); using synthesis for those notes",
            failed.len(),
            failed.len() + loaded,
            dir.display(),
            note,
            err
        );
    }
    info!("Loaded {} samples from {}", loaded, dir.display());

    loaded
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    fn note(s: &str) -> NoteSymbol {
        s.parse().unwrap()
    }

    fn write_wav(path: &Path, channels: u16, frames: &[i16]) {
        let spec = WavSpec {
            channels,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for &s in frames {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_decode_folds_to_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("C4.wav");
        write_wav(&path, 2, &[16_384, 0, -16_384, -16_384]);

        let buffer = SampleBuffer::open(&path).unwrap();
        assert_eq!(buffer.frames(), 2);
        assert_eq!(buffer.sample_rate(), 22_050.0);
        assert_eq!(buffer.interpolate(0.0), 0.25);
        assert_eq!(buffer.interpolate(1.0), -0.5);
    }

    #[test]
    fn test_load_directory_skips_missing() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&sample_path(dir.path(), &note("C4")), 1, &[0, 100, 200]);
        write_wav(&sample_path(dir.path(), &note("C#4")), 1, &[0, 100]);
        std::fs::write(sample_path(dir.path(), &note("E4")), b"not a wav").unwrap();

        let table = SampleTable::new();
        let notes = [note("C4"), note("Db4"), note("D4"), note("E4")];
        let loaded = load_directory(&table, dir.path(), &notes);

        assert_eq!(loaded, 2);
        assert!(table.contains(&note("C4")));
        assert!(table.contains(&note("C#4")));
        assert!(table.get(&note("D4")).is_none());
        assert!(table.get(&note("E4")).is_none());
    }

    #[test]
    fn test_clones_share_entries() {
        let table = SampleTable::new();
        let other = table.clone();
        other.insert(note("A4"), SampleBuffer::new(vec![0.0; 4], 44_100.0));
        assert_eq!(table.len(), 1);
        assert!(table.contains(&note("A4")));
    }

    #[test]
    fn test_missing_file_error_names_path() {
        let err = SampleBuffer::open("/nope/C4.wav").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
