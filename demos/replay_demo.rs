//! Demonstration of the Mundane Sensor Agent pipeline.
//!
//! This example shows how to:
//! 1. Build a classifier from the default pattern table
//! 2. Train the kettle pattern from synthetic audio
//! 3. Replay a mixed stream through the sample queue
//! 4. Print detections and build snapshots
//! 5. Export the kettle's captured audio as WAV
//!
//! Run with: cargo run --example replay_demo

use std::time::Duration;

use mundane_sensor_agent::{
    collector::{spawn_replay, Modality, SampleQueue, SensorSample},
    core::SnapshotBuilder,
    transparency::TransparencyLog,
    Config, TrainingDriver, DATA_DECLARATION,
};

const SAMPLE_RATE: usize = 44_100;

/// One chunk of a sine tone.
fn tone(freq_hz: f64, amplitude: f64, len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| {
            let t = i as f64 / SAMPLE_RATE as f64;
            amplitude * (2.0 * std::f64::consts::PI * freq_hz * t).sin()
        })
        .collect()
}

fn main() {
    println!("Mundane Sensor Agent - Replay Demo");
    println!("==================================");
    println!();
    println!("{DATA_DECLARATION}");

    let config = Config::default();
    let mut classifier = match config.build_classifier() {
        Ok(classifier) => classifier,
        Err(e) => {
            eprintln!("Error building classifier: {e}");
            return;
        }
    };

    // Kettle whistle: a steady 2 kHz tone
    let whistle = tone(2_000.0, 0.6, 4_410);
    let training: Vec<SensorSample> = (0..5)
        .map(|_| SensorSample::now(Modality::Audio, whistle.clone()))
        .collect();

    let driver = TrainingDriver::default();
    match driver.train(&mut classifier, "kettle", &training, None) {
        Ok(result) => println!("Trained kettle reference: {:?}", result.features),
        Err(e) => {
            eprintln!("Training failed: {e}");
            return;
        }
    }
    println!();

    let stream = vec![
        SensorSample::now(Modality::Audio, tone(150.0, 0.1, 4_410)),
        SensorSample::now(Modality::Light, vec![310.0, 312.0, 309.0]),
        SensorSample::now(Modality::Audio, whistle.clone()),
        SensorSample::now(Modality::Accelerometer, vec![0.1, 9.8, 0.2, 0.3, 9.6, 0.1]),
        SensorSample::now(Modality::Audio, whistle),
    ];
    let expected = stream.len();

    let mut queue = SampleQueue::default();
    if let Err(e) = queue.start() {
        eprintln!("Error starting queue: {e}");
        return;
    }
    let replay = spawn_replay(stream, queue.sender());

    let builder = SnapshotBuilder::new();
    let log = TransparencyLog::new();

    for _ in 0..expected {
        let sample = match queue.receiver().recv_timeout(Duration::from_secs(1)) {
            Ok(sample) => sample,
            Err(_) => break,
        };
        log.record_sample(sample.modality);

        let confidences = match classifier.score(&sample) {
            Ok(confidences) => confidences,
            Err(e) => {
                log.record_rejected_sample();
                eprintln!("Rejected sample: {e}");
                continue;
            }
        };

        println!("{} sample:", sample.modality);
        for (pattern, confidence) in &confidences {
            println!("  {pattern:<14} {confidence:.3}");
        }

        let detected = classifier.detected(&confidences);
        if !detected.is_empty() {
            log.record_detections(detected.len() as u64);
            let snapshot = builder.build(&sample, &confidences, detected);
            println!("  -> detected {:?}", snapshot.detected);
        }
    }

    queue.stop();
    let _ = replay.join();

    println!();
    match classifier.export_audio("kettle") {
        Ok(Some(bytes)) => {
            log.record_audio_export();
            println!(
                "Kettle audio: {} samples buffered, {} WAV bytes",
                classifier.buffered_samples("kettle"),
                bytes.len()
            );
        }
        Ok(None) => println!("Kettle audio: no buffer"),
        Err(e) => eprintln!("Export failed: {e}"),
    }

    println!();
    println!("{}", log.summary());
}
