//! Replay acquisition from JSON Lines recordings.
//!
//! Real device drivers live outside this crate. Recorded samples (one JSON
//! object per line) stand in for them so the pipeline can be driven from
//! files or standard input.

use crate::collector::queue::{CollectorError, SampleSender};
use crate::collector::types::SensorSample;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::thread::{self, JoinHandle};

/// Parse samples from a JSON Lines reader. Blank lines are skipped.
pub fn parse_samples<R: Read>(reader: R) -> Result<Vec<SensorSample>, CollectorError> {
    let mut samples = Vec::new();
    for (index, line) in BufReader::new(reader).lines().enumerate() {
        let line = line.map_err(|e| CollectorError::Io(e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        let sample: SensorSample = serde_json::from_str(&line)
            .map_err(|e| CollectorError::Parse(format!("line {}: {e}", index + 1)))?;
        samples.push(sample);
    }
    Ok(samples)
}

/// Read all samples from a JSON Lines file.
pub fn read_samples(path: &Path) -> Result<Vec<SensorSample>, CollectorError> {
    let file = std::fs::File::open(path)
        .map_err(|e| CollectorError::Io(format!("{}: {e}", path.display())))?;
    parse_samples(file)
}

/// Write samples as JSON Lines.
pub fn write_samples(path: &Path, samples: &[SensorSample]) -> Result<(), CollectorError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CollectorError::Io(e.to_string()))?;
    }
    let lines: Vec<String> = samples
        .iter()
        .map(serde_json::to_string)
        .collect::<Result<_, _>>()
        .map_err(|e| CollectorError::Parse(e.to_string()))?;
    std::fs::write(path, lines.join("\n")).map_err(|e| CollectorError::Io(e.to_string()))
}

/// Replay samples into the queue on a background thread.
///
/// A full or paused queue is retried after a short pause rather than
/// dropping the sample. The thread stops early once the queue is dropped,
/// and returns the number of samples delivered.
pub fn spawn_replay(samples: Vec<SensorSample>, sender: SampleSender) -> JoinHandle<usize> {
    thread::spawn(move || {
        let mut delivered = 0;
        for sample in samples {
            loop {
                match sender.push(sample.clone()) {
                    Ok(()) => {
                        delivered += 1;
                        break;
                    }
                    Err(CollectorError::QueueFull | CollectorError::NotRunning) => {
                        thread::sleep(std::time::Duration::from_millis(5));
                    }
                    Err(e) => {
                        tracing::debug!("replay stopped: {e}");
                        return delivered;
                    }
                }
            }
        }
        delivered
    })
}
