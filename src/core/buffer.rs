//! Duration-bounded audio capture per pattern.
//!
//! Each pattern with an enabled capture policy owns a FIFO of raw audio
//! chunks. Whole chunks are evicted oldest-first whenever the retained
//! sample count would exceed `duration_secs * sample_rate`.

use crate::core::error::PipelineError;
use crate::core::pattern::AudioCaptureConfig;
use std::collections::{HashMap, VecDeque};
use std::io::Cursor;

/// Audio chunks retained for one pattern.
#[derive(Debug, Clone)]
pub struct AudioRingBuffer {
    config: AudioCaptureConfig,
    chunks: VecDeque<Vec<f32>>,
    sample_count: usize,
    recording: bool,
}

impl AudioRingBuffer {
    pub fn new(config: AudioCaptureConfig) -> Self {
        Self {
            config,
            chunks: VecDeque::new(),
            sample_count: 0,
            recording: true,
        }
    }

    /// Append a chunk and evict whole chunks until back within bound.
    ///
    /// Returns the number of chunks evicted.
    pub fn push(&mut self, chunk: &[f64]) -> usize {
        if !self.recording || chunk.is_empty() {
            return 0;
        }
        self.chunks.push_back(chunk.iter().map(|&v| v as f32).collect());
        self.sample_count += chunk.len();

        let max_samples = self.config.max_samples();
        let mut evicted = 0;
        while self.sample_count > max_samples {
            match self.chunks.pop_front() {
                Some(old) => {
                    self.sample_count -= old.len();
                    evicted += 1;
                }
                None => break,
            }
        }
        evicted
    }

    /// All retained samples in arrival order.
    pub fn samples(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.sample_count);
        for chunk in &self.chunks {
            out.extend_from_slice(chunk);
        }
        out
    }

    /// Encode retained audio as mono 16-bit PCM WAV.
    pub fn to_wav(&self) -> Result<Vec<u8>, PipelineError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.config.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
            for chunk in &self.chunks {
                for &sample in chunk {
                    writer.write_sample(to_pcm16(sample))?;
                }
            }
            writer.finalize()?;
        }

        Ok(cursor.into_inner())
    }

    pub fn config(&self) -> &AudioCaptureConfig {
        &self.config
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Retained duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.sample_count as f64 / self.config.sample_rate as f64
    }
}

/// Convert a float sample to 16-bit PCM, clamping to [-1, 1].
fn to_pcm16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Audio ring buffers for every capturing pattern.
#[derive(Debug, Clone, Default)]
pub struct AudioBufferBank {
    buffers: HashMap<String, AudioRingBuffer>,
}

impl AudioBufferBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) capture with an empty buffer.
    pub fn start(&mut self, pattern: &str, config: AudioCaptureConfig) {
        if !config.enabled {
            return;
        }
        self.buffers
            .insert(pattern.to_string(), AudioRingBuffer::new(config));
    }

    /// Stop capturing. Retained audio stays exportable.
    pub fn stop(&mut self, pattern: &str) -> bool {
        match self.buffers.get_mut(pattern) {
            Some(buffer) => {
                buffer.recording = false;
                true
            }
            None => false,
        }
    }

    /// Append a chunk if capture is active for the pattern.
    ///
    /// Returns `true` if the chunk was accepted.
    pub fn append(&mut self, pattern: &str, chunk: &[f64]) -> bool {
        let Some(buffer) = self.buffers.get_mut(pattern) else {
            return false;
        };
        if !buffer.recording {
            return false;
        }
        let evicted = buffer.push(chunk);
        if evicted > 0 {
            tracing::debug!(
                pattern,
                evicted,
                retained = buffer.sample_count,
                "evicted oldest audio chunks"
            );
        }
        true
    }

    /// Export a pattern's retained audio as WAV bytes.
    pub fn export(&self, pattern: &str) -> Result<Option<Vec<u8>>, PipelineError> {
        self.buffers
            .get(pattern)
            .map(AudioRingBuffer::to_wav)
            .transpose()
    }

    /// Discard a pattern's buffer and configuration entirely.
    pub fn reset(&mut self, pattern: &str) -> bool {
        self.buffers.remove(pattern).is_some()
    }

    pub fn get(&self, pattern: &str) -> Option<&AudioRingBuffer> {
        self.buffers.get(pattern)
    }

    /// Names of patterns holding a buffer, sorted.
    pub fn patterns(&self) -> Vec<String> {
        let mut names: Vec<String> = self.buffers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_recording(&self, pattern: &str) -> bool {
        self.buffers.get(pattern).is_some_and(|b| b.recording)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> (hound::WavSpec, Vec<i16>) {
        let mut reader = hound::WavReader::new(Cursor::new(bytes.to_vec())).unwrap();
        let spec = reader.spec();
        let samples = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        (spec, samples)
    }

    #[test]
    fn test_append_requires_started_buffer() {
        let mut bank = AudioBufferBank::new();
        assert!(!bank.append("kettle", &[0.1, 0.2]));
        bank.start("kettle", AudioCaptureConfig::new(1, 100));
        assert!(bank.append("kettle", &[0.1, 0.2]));
        assert_eq!(bank.get("kettle").unwrap().sample_count(), 2);
    }

    #[test]
    fn test_whole_chunk_eviction() {
        let mut bank = AudioBufferBank::new();
        bank.start("p", AudioCaptureConfig::new(1, 10));
        bank.append("p", &[0.1; 6]);
        bank.append("p", &[0.2; 6]);
        // 12 > 10: the first chunk goes entirely, leaving 6
        let buffer = bank.get("p").unwrap();
        assert_eq!(buffer.sample_count(), 6);
        assert_eq!(buffer.chunk_count(), 1);
        assert!(buffer.samples().iter().all(|&s| (s - 0.2).abs() < 1e-6));
    }

    #[test]
    fn test_oversized_chunk_evicts_itself() {
        let mut buffer = AudioRingBuffer::new(AudioCaptureConfig::new(1, 4));
        assert_eq!(buffer.push(&[0.0; 5]), 1);
        assert_eq!(buffer.sample_count(), 0);
    }

    #[test]
    fn test_stop_keeps_audio_reset_discards() {
        let mut bank = AudioBufferBank::new();
        bank.start("dog_barking", AudioCaptureConfig::new(30, 100));
        bank.append("dog_barking", &[0.5; 10]);
        assert!(bank.stop("dog_barking"));
        assert!(!bank.append("dog_barking", &[0.5; 10]));
        assert_eq!(bank.get("dog_barking").unwrap().sample_count(), 10);
        assert!(bank.export("dog_barking").unwrap().is_some());

        assert!(bank.reset("dog_barking"));
        assert!(bank.export("dog_barking").unwrap().is_none());
        assert!(!bank.append("dog_barking", &[0.5; 10]));
    }

    #[test]
    fn test_wav_export_round_trip() {
        let mut bank = AudioBufferBank::new();
        bank.start("kettle", AudioCaptureConfig::new(1, 8_000));
        bank.append("kettle", &[0.0, 0.5, -0.5, 1.0]);
        bank.append("kettle", &[-1.0, 2.0, -3.0]);

        let bytes = bank.export("kettle").unwrap().unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");

        let (spec, samples) = decode(&bytes);
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 8_000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(
            samples,
            vec![0, 16_383, -16_384, 32_767, -32_768, 32_767, -32_768]
        );
    }

    #[test]
    fn test_pcm_scaling() {
        assert_eq!(to_pcm16(0.0), 0);
        assert_eq!(to_pcm16(1.0), i16::MAX);
        assert_eq!(to_pcm16(-1.0), i16::MIN);
        assert_eq!(to_pcm16(5.0), i16::MAX);
    }
}
