//! Mundane Sensor Agent CLI
//!
//! Household pattern recognition from recorded sensor streams.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use mundane_sensor_agent::{
    collector::{collect_for, parse_samples, read_samples, spawn_replay, write_samples},
    config::{Config, SourceConfig},
    core::{DetectionSnapshot, PatternClassifier, SnapshotBuilder},
    transparency::{create_shared_log_with_persistence, SharedTransparencyLog},
    Modality, ModelStore, SampleQueue, SensorSample, DATA_DECLARATION, VERSION,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mundane-sensor")]
#[command(version = VERSION)]
#[command(about = "Recognise everyday household patterns from sensor streams", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run recorded samples through the classifier
    Start {
        /// JSON Lines sample file, or '-' for standard input
        #[arg(long, short, default_value = "-")]
        input: String,

        /// Sources to ingest (audio, accelerometer, gyroscope, light, or all)
        #[arg(long, default_value = "all")]
        sources: String,

        /// Use this threshold for every pattern in this session
        #[arg(long)]
        threshold_override: Option<f64>,
    },

    /// Gather samples of one modality for a fixed duration
    Collect {
        /// JSON Lines sample file, or '-' for standard input
        #[arg(long, short, default_value = "-")]
        input: String,

        /// Modality to keep
        #[arg(long, short)]
        modality: String,

        /// Collection duration in seconds
        #[arg(long, short, default_value = "10")]
        duration: u64,

        /// Output JSON Lines file
        #[arg(long, short)]
        output: PathBuf,
    },

    /// Train a pattern from labeled samples
    Train {
        #[arg(long, short)]
        pattern: String,

        /// Labeled samples (JSON Lines)
        #[arg(long, short)]
        data: PathBuf,

        /// Optional validation samples (JSON Lines)
        #[arg(long)]
        validation: Option<PathBuf>,
    },

    /// Evaluate a trained pattern
    Evaluate {
        #[arg(long, short)]
        pattern: String,

        /// Samples of the pattern (JSON Lines)
        #[arg(long, short)]
        data: PathBuf,

        /// Samples that are not the pattern (JSON Lines)
        #[arg(long)]
        negatives: Option<PathBuf>,
    },

    /// Sweep thresholds and keep the most accurate one
    Optimize {
        #[arg(long, short)]
        pattern: String,

        /// Training samples (JSON Lines)
        #[arg(long, short)]
        data: PathBuf,

        /// Validation samples (JSON Lines)
        #[arg(long)]
        validation: PathBuf,
    },

    /// List configured patterns
    Patterns,

    /// Show current collection status
    Status,

    /// Pause ingestion
    Pause,

    /// Resume ingestion
    Resume,

    /// Display the data handling declaration
    Declaration,

    /// Show configuration
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            input,
            sources,
            threshold_override,
        } => cmd_start(&input, &sources, threshold_override),
        Commands::Collect {
            input,
            modality,
            duration,
            output,
        } => cmd_collect(&input, &modality, duration, &output),
        Commands::Train {
            pattern,
            data,
            validation,
        } => cmd_train(&pattern, &data, validation.as_deref()),
        Commands::Evaluate {
            pattern,
            data,
            negatives,
        } => cmd_evaluate(&pattern, &data, negatives.as_deref()),
        Commands::Optimize {
            pattern,
            data,
            validation,
        } => cmd_optimize(&pattern, &data, &validation),
        Commands::Patterns => cmd_patterns(),
        Commands::Status => cmd_status(),
        Commands::Pause => cmd_set_paused(true),
        Commands::Resume => cmd_set_paused(false),
        Commands::Declaration => {
            println!("{DATA_DECLARATION}");
            Ok(())
        }
        Commands::Config => cmd_config(),
    }
}

fn cmd_start(input: &str, sources: &str, threshold_override: Option<f64>) -> Result<()> {
    println!("Mundane Sensor Agent v{VERSION}");
    println!();

    let source_config = SourceConfig::from_csv(sources);
    if !source_config.any_enabled() {
        bail!("at least one source must be enabled (audio, accelerometer, gyroscope or light)");
    }

    let config = Config::load()?;
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let mut classifier = config.build_classifier()?;
    if let Some(threshold) = threshold_override {
        let names: Vec<String> = classifier.patterns().map(|p| p.name.clone()).collect();
        for name in names {
            classifier.update_threshold(&name, threshold)?;
        }
    }
    let installed = ModelStore::new(config.models_path()).install_into(&mut classifier)?;

    println!("Starting pipeline...");
    for (name, enabled) in [
        ("Audio", source_config.audio),
        ("Accelerometer", source_config.accelerometer),
        ("Gyroscope", source_config.gyroscope),
        ("Light", source_config.light),
    ] {
        println!("  {name}: {}", if enabled { "enabled" } else { "disabled" });
    }
    println!("  Patterns: {}", classifier.registry().len());
    println!("  Trained models loaded: {installed}");

    let transparency_log =
        create_shared_log_with_persistence(config.data_path.join("transparency.json"));
    let snapshot_builder = SnapshotBuilder::new();
    println!("Instance ID: {}", snapshot_builder.instance_id());
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let samples = load_input(input)?;
    let mut queue = SampleQueue::default();
    let replay = spawn_replay(samples, queue.sender());

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(Arc::clone(&running))?;

    // Pause/resume is driven by another process through the config file.
    let mut paused = config.paused;
    let mut last_config_check = Instant::now();
    if paused {
        println!("Ingestion is currently paused.");
        println!("Run `mundane-sensor resume` to continue.");
        println!();
    } else {
        queue.start()?;
    }

    let mut snapshots: Vec<DetectionSnapshot> = Vec::new();
    let receiver = queue.receiver().clone();

    while running.load(Ordering::SeqCst) {
        if last_config_check.elapsed() >= Duration::from_secs(1) {
            if let Ok(cfg) = Config::load() {
                if cfg.paused != paused {
                    paused = cfg.paused;
                    if paused {
                        println!();
                        println!("Pausing ingestion...");
                        queue.stop();
                    } else {
                        println!();
                        println!("Resuming ingestion...");
                        queue.start()?;
                    }
                }
            }
            last_config_check = Instant::now();
        }

        if paused {
            thread::sleep(Duration::from_millis(100));
            continue;
        }

        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(sample) => {
                if !source_config.accepts(sample.modality) {
                    continue;
                }
                if let Some(snapshot) =
                    process_sample(&mut classifier, &snapshot_builder, &transparency_log, &sample)
                {
                    snapshots.push(snapshot);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if replay.is_finished() && receiver.is_empty() {
                    println!("End of input reached.");
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                eprintln!("Sample queue disconnected unexpectedly");
                break;
            }
        }
    }

    println!();
    println!("Stopping pipeline...");
    queue.stop();

    export_audio(&classifier, &config.export_path, &transparency_log);
    export_snapshots(&snapshots, &config.export_path);

    if let Err(e) = transparency_log.save() {
        eprintln!("Warning: Could not save transparency log: {e}");
    }

    println!();
    println!("{}", transparency_log.summary());
    Ok(())
}

/// Score one sample, print detections, and return a snapshot when any fired.
fn process_sample(
    classifier: &mut PatternClassifier,
    builder: &SnapshotBuilder,
    log: &SharedTransparencyLog,
    sample: &SensorSample,
) -> Option<DetectionSnapshot> {
    let confidences = match classifier.score(sample) {
        Ok(confidences) => confidences,
        Err(e) => {
            tracing::warn!(modality = %sample.modality, "rejected sample: {e}");
            log.record_rejected_sample();
            return None;
        }
    };
    log.record_sample(sample.modality);

    let detected = classifier.detected(&confidences);
    if detected.is_empty() {
        return None;
    }
    log.record_detections(detected.len() as u64);

    let snapshot = builder.build(sample, &confidences, detected);
    for name in &snapshot.detected {
        println!(
            "[{}] Detected {} (confidence {:.2})",
            Utc::now().format("%H:%M:%S"),
            name,
            confidences.get(name).copied().unwrap_or_default()
        );
    }
    Some(snapshot)
}

fn export_audio(classifier: &PatternClassifier, export_dir: &Path, log: &SharedTransparencyLog) {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    for name in classifier.buffers().patterns() {
        if classifier.buffered_samples(&name) == 0 {
            continue;
        }
        let bytes = match classifier.export_audio(&name) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("Error exporting audio for {name}: {e}");
                continue;
            }
        };
        let path = export_dir.join(format!("{name}_{stamp}.wav"));
        match std::fs::write(&path, bytes) {
            Ok(()) => {
                println!("Exported audio for {name} to {path:?}");
                log.record_audio_export();
            }
            Err(e) => eprintln!("Error writing {path:?}: {e}"),
        }
    }
}

fn export_snapshots(snapshots: &[DetectionSnapshot], export_dir: &Path) {
    if snapshots.is_empty() {
        return;
    }
    let path = export_dir.join(format!(
        "detections_{}.json",
        Utc::now().format("%Y%m%d_%H%M%S")
    ));
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!(path = ?parent, error = %e, "could not create export directory");
        }
    }
    match serde_json::to_string_pretty(snapshots) {
        Ok(json) => match std::fs::write(&path, json) {
            Ok(()) => println!("Exported {} snapshots to {:?}", snapshots.len(), path),
            Err(e) => eprintln!("Error writing snapshots: {e}"),
        },
        Err(e) => eprintln!("Error serializing snapshots: {e}"),
    }
}

fn cmd_collect(input: &str, modality: &str, duration: u64, output: &Path) -> Result<()> {
    let modality = Modality::parse(modality);
    if !modality.is_supported() {
        bail!("unsupported modality '{modality}'");
    }

    let samples = load_input(input)?;
    let mut queue = SampleQueue::default();
    queue.start()?;
    let replay = spawn_replay(samples, queue.sender());

    println!("Collecting {modality} samples for {duration}s...");
    let collected = collect_for(queue.receiver(), modality, Duration::from_secs(duration));
    drop(queue);
    if replay.join().is_err() {
        tracing::warn!("replay thread panicked");
    }

    write_samples(output, &collected)?;
    println!("Wrote {} samples to {:?}", collected.len(), output);
    Ok(())
}

fn cmd_train(pattern: &str, data: &Path, validation: Option<&Path>) -> Result<()> {
    let config = Config::load()?;
    let mut classifier = config.build_classifier()?;
    let driver = config.build_training_driver();

    let samples = read_samples(data)?;
    let validation = validation.map(read_samples).transpose()?;

    let result = driver.train(&mut classifier, pattern, &samples, validation.as_deref())?;
    let path = ModelStore::new(config.models_path()).save(&result)?;

    let log = create_shared_log_with_persistence(config.data_path.join("transparency.json"));
    log.record_training_run();
    if let Err(e) = log.save() {
        eprintln!("Warning: Could not save transparency log: {e}");
    }

    println!("Trained '{}' on {} samples", result.pattern_name, result.samples);
    println!("  Validation accuracy: {:.1}%", result.accuracy * 100.0);
    println!("  Reference: {:?}", result.features);
    println!("  Saved to {path:?}");
    Ok(())
}

fn cmd_evaluate(pattern: &str, data: &Path, negatives: Option<&Path>) -> Result<()> {
    let config = Config::load()?;
    let mut classifier = config.build_classifier()?;
    ModelStore::new(config.models_path()).install_into(&mut classifier)?;
    if classifier.reference(pattern).is_none() {
        bail!("pattern '{pattern}' has not been trained; run `mundane-sensor train` first");
    }

    let positives = read_samples(data)?;
    let negatives = negatives.map(read_samples).transpose()?.unwrap_or_default();
    let metrics = config
        .build_training_driver()
        .evaluate(&classifier, pattern, &positives, &negatives)?;

    println!("Evaluation for '{pattern}'");
    println!("  Accuracy:  {:.3}", metrics.accuracy);
    println!("  Precision: {:.3}", metrics.precision);
    println!("  Recall:    {:.3}", metrics.recall);
    println!("  F1 score:  {:.3}", metrics.f1_score);
    println!(
        "  TP {} / FP {} / TN {} / FN {}",
        metrics.true_positives,
        metrics.false_positives,
        metrics.true_negatives,
        metrics.false_negatives
    );
    Ok(())
}

fn cmd_optimize(pattern: &str, data: &Path, validation: &Path) -> Result<()> {
    let mut config = Config::load()?;
    let mut classifier = config.build_classifier()?;
    let driver = config.build_training_driver();

    let training = read_samples(data)?;
    let validation = read_samples(validation)?;
    let best = driver.optimize_threshold(&mut classifier, pattern, &training, &validation)?;

    if let Some(reference) = classifier.reference(pattern) {
        let result = mundane_sensor_agent::TrainingResult {
            pattern_name: pattern.to_string(),
            accuracy: best.best_accuracy,
            samples: training.len(),
            features: reference.as_slice().to_vec(),
            timestamp: Utc::now().timestamp_millis(),
        };
        ModelStore::new(config.models_path()).save(&result)?;
    }

    config.set_threshold(pattern, best.best_threshold);
    config.save().context("saving optimized threshold")?;

    println!("Best threshold for '{pattern}': {:.2}", best.best_threshold);
    println!("  Validation accuracy: {:.1}%", best.best_accuracy * 100.0);
    Ok(())
}

fn cmd_patterns() -> Result<()> {
    let config = Config::load()?;
    let store = ModelStore::new(config.models_path());

    println!("{:<14} {:<14} {:>9}  {:<8} Audio", "Pattern", "Sensor", "Threshold", "Trained");
    for pattern in &config.patterns {
        let trained = store.load(&pattern.name)?.is_some();
        let audio = match pattern.capture_policy() {
            Some(policy) => format!("{}s @ {} Hz", policy.duration_secs, policy.sample_rate),
            None => "-".to_string(),
        };
        println!(
            "{:<14} {:<14} {:>9.2}  {:<8} {}",
            pattern.name,
            pattern.modality.as_str(),
            pattern.threshold,
            if trained { "yes" } else { "no" },
            audio
        );
    }
    Ok(())
}

fn cmd_status() -> Result<()> {
    let config = Config::load()?;

    println!("Mundane Sensor Agent Status");
    println!("===========================");
    println!();
    println!("Configuration:");
    for (name, enabled) in [
        ("Audio", config.sources.audio),
        ("Accelerometer", config.sources.accelerometer),
        ("Gyroscope", config.sources.gyroscope),
        ("Light", config.sources.light),
    ] {
        println!("  {name}: {}", if enabled { "enabled" } else { "disabled" });
    }
    println!("  Audio sample rate: {} Hz", config.sensors.audio_sample_rate);
    println!("  Accelerometer rate: {} Hz", config.sensors.accelerometer_hz);
    println!("  Gyroscope rate: {} Hz", config.sensors.gyroscope_hz);
    println!("  Light rate: {} Hz", config.sensors.light_hz);
    println!("  Patterns: {}", config.patterns.len());
    println!("  Paused: {}", config.paused);
    println!();

    let trained = ModelStore::new(config.models_path()).load_all()?;
    println!("Trained models: {}", trained.len());
    for result in &trained {
        println!(
            "  {} ({} samples, accuracy {:.1}%)",
            result.pattern_name,
            result.samples,
            result.accuracy * 100.0
        );
    }
    println!();

    let stats_path = config.data_path.join("transparency.json");
    if stats_path.exists() {
        let log = create_shared_log_with_persistence(stats_path);
        let stats = log.stats();
        println!("Cumulative Statistics:");
        println!("  Audio samples: {}", stats.audio_samples);
        println!("  Motion samples: {}", stats.motion_samples);
        println!("  Light samples: {}", stats.light_samples);
        println!("  Other samples: {}", stats.other_samples);
        println!("  Rejected samples: {}", stats.rejected_samples);
        println!("  Detections: {}", stats.detections);
        println!("  Audio exports: {}", stats.audio_exports);
        println!("  Training runs: {}", stats.training_runs);
    } else {
        println!("No previous session data found.");
    }
    Ok(())
}

fn cmd_set_paused(paused: bool) -> Result<()> {
    let mut config = Config::load()?;
    config.paused = paused;
    config.save().context("saving config")?;
    if paused {
        println!("Ingestion paused. Use 'mundane-sensor resume' to continue.");
    } else {
        println!("Ingestion resumed.");
    }
    Ok(())
}

fn cmd_config() -> Result<()> {
    let config = Config::load()?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Read samples from a file path, or standard input for '-'.
fn load_input(input: &str) -> Result<Vec<SensorSample>> {
    let samples = if input == "-" {
        parse_samples(std::io::stdin().lock())?
    } else {
        read_samples(Path::new(input)).with_context(|| format!("reading {input}"))?
    };
    tracing::info!(count = samples.len(), "loaded samples");
    Ok(samples)
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("setting Ctrl+C handler")
}
