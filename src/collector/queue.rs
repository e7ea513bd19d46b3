//! Single-consumer sample queue.
//!
//! Acquisition threads push samples through cloned [`SampleSender`] handles;
//! the pipeline drains them one at a time from the receiver so that scoring
//! and buffer appends are never interleaved.

use crate::collector::types::{Modality, SensorSample};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default queue capacity.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Errors that can occur during sample collection.
#[derive(Debug)]
pub enum CollectorError {
    AlreadyRunning,
    NotRunning,
    QueueFull,
    Disconnected,
    Io(String),
    Parse(String),
}

impl std::fmt::Display for CollectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectorError::AlreadyRunning => write!(f, "Collector is already running"),
            CollectorError::NotRunning => write!(f, "Collector is not running"),
            CollectorError::QueueFull => write!(f, "Sample queue is full"),
            CollectorError::Disconnected => write!(f, "Sample queue disconnected"),
            CollectorError::Io(e) => write!(f, "IO error: {e}"),
            CollectorError::Parse(e) => write!(f, "Parse error: {e}"),
        }
    }
}

impl std::error::Error for CollectorError {}

/// Cloneable producer handle for acquisition threads.
#[derive(Clone)]
pub struct SampleSender {
    sender: Sender<SensorSample>,
    running: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl SampleSender {
    /// Push a sample without blocking.
    pub fn push(&self, sample: SensorSample) -> Result<(), CollectorError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CollectorError::Disconnected);
        }
        if !self.running.load(Ordering::SeqCst) {
            return Err(CollectorError::NotRunning);
        }
        self.sender.try_send(sample).map_err(|e| match e {
            TrySendError::Full(_) => CollectorError::QueueFull,
            TrySendError::Disconnected(_) => CollectorError::Disconnected,
        })
    }

    /// Check if the owning queue is accepting samples.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Bounded queue serializing samples into the pipeline.
pub struct SampleQueue {
    sender: Sender<SensorSample>,
    receiver: Receiver<SensorSample>,
    running: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl SampleQueue {
    /// Create a stopped queue holding at most `capacity` pending samples.
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self {
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start accepting samples.
    pub fn start(&mut self) -> Result<(), CollectorError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CollectorError::AlreadyRunning);
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Stop accepting samples. Samples already queued remain readable.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the queue is currently accepting samples.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get a producer handle.
    pub fn sender(&self) -> SampleSender {
        SampleSender {
            sender: self.sender.clone(),
            running: Arc::clone(&self.running),
            closed: Arc::clone(&self.closed),
        }
    }

    /// Get the receiver for queued samples.
    pub fn receiver(&self) -> &Receiver<SensorSample> {
        &self.receiver
    }

    /// Try to receive a sample without blocking.
    pub fn try_recv(&self) -> Option<SensorSample> {
        self.receiver.try_recv().ok()
    }

    /// Number of samples waiting to be processed.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}

impl Drop for SampleQueue {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl Default for SampleQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Gather samples of one modality for a fixed duration.
///
/// Collection ends when the duration elapses or every sender has been
/// dropped. Whatever was gathered up to that point is returned; a short
/// collection is not an error. Samples of other modalities are discarded.
pub fn collect_for(
    receiver: &Receiver<SensorSample>,
    modality: Modality,
    duration: Duration,
) -> Vec<SensorSample> {
    let deadline = Instant::now() + duration;
    let mut collected = Vec::new();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match receiver.recv_timeout(remaining) {
            Ok(sample) if sample.modality == modality => collected.push(sample),
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => break,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    tracing::debug!(
        modality = %modality,
        count = collected.len(),
        "collection finished"
    );
    collected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_requires_running_queue() {
        let mut queue = SampleQueue::new(4);
        let sender = queue.sender();
        let sample = SensorSample::new(0, Modality::Light, vec![1.0]);

        assert!(matches!(
            sender.push(sample.clone()),
            Err(CollectorError::NotRunning)
        ));

        queue.start().unwrap();
        assert!(sender.push(sample).is_ok());
        assert_eq!(queue.pending(), 1);
        assert!(queue.try_recv().is_some());
    }

    #[test]
    fn test_dropped_queue_disconnects_senders() {
        let queue = SampleQueue::new(4);
        let sender = queue.sender();
        drop(queue);
        assert!(matches!(
            sender.push(SensorSample::new(0, Modality::Light, vec![1.0])),
            Err(CollectorError::Disconnected)
        ));
    }

    #[test]
    fn test_double_start_rejected() {
        let mut queue = SampleQueue::default();
        queue.start().unwrap();
        assert!(matches!(queue.start(), Err(CollectorError::AlreadyRunning)));
        queue.stop();
        assert!(!queue.is_running());
    }

    #[test]
    fn test_full_queue_does_not_block() {
        let mut queue = SampleQueue::new(1);
        queue.start().unwrap();
        let sender = queue.sender();
        sender
            .push(SensorSample::new(0, Modality::Light, vec![1.0]))
            .unwrap();
        assert!(matches!(
            sender.push(SensorSample::new(1, Modality::Light, vec![1.0])),
            Err(CollectorError::QueueFull)
        ));
    }

    #[test]
    fn test_collect_for_filters_modality_and_returns_partial() {
        let mut queue = SampleQueue::new(16);
        queue.start().unwrap();
        let sender = queue.sender();
        sender
            .push(SensorSample::new(0, Modality::Audio, vec![0.1]))
            .unwrap();
        sender
            .push(SensorSample::new(1, Modality::Light, vec![5.0]))
            .unwrap();
        sender
            .push(SensorSample::new(2, Modality::Audio, vec![0.2]))
            .unwrap();

        let collected = collect_for(queue.receiver(), Modality::Audio, Duration::from_millis(50));
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[1].timestamp, 2);
    }
}
