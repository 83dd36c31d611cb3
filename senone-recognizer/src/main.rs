//! senone - batch recognizer
//!
//! Decodes WAV files against a tied-state acoustic model, dumps the search
//! graph, and re-estimates models from frame alignments.

use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use senone_acoustic::AcousticModel;
use senone_frontend::capture_channel;
use senone_recognizer::{train, AlignmentFile, Recognizer, RecognizerConfig};
use senone_search::TraversalOrder;

/// Samples per chunk handed to the capture queue
const CHUNK_SAMPLES: usize = 1024;

#[derive(Parser)]
#[command(name = "senone", version, about = "Tied-state HMM speech recognizer")]
struct Cli {
    /// Configuration file (default: platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode a WAV file
    Decode {
        wav: PathBuf,
    },
    /// Print the search graph, one `level signature 1 type` line per state
    DumpGraph {
        #[arg(long)]
        breadth_first: bool,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write the default configuration
    InitConfig {
        #[arg(long)]
        force: bool,
    },
    /// Re-estimate the model from a JSON alignment file
    Train {
        alignments: PathBuf,
        /// Where to write the trained model (default: overwrite model_path)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    if let Command::InitConfig { force } = cli.command {
        return init_config(cli.config, force);
    }

    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Decode { wav } => decode(config, &wav),
        Command::DumpGraph { breadth_first, output } => dump(config, breadth_first, output),
        Command::Train { alignments, output } => train_model(config, &alignments, output),
        Command::InitConfig { .. } => Ok(()),
    }
}

fn load_config(path: Option<&Path>) -> Result<RecognizerConfig> {
    let config = match path {
        Some(path) => RecognizerConfig::load_from(path)?,
        None => RecognizerConfig::load().context("Failed to load configuration")?,
    };
    info!("Configuration loaded from {}", config.config_path.display());
    Ok(config)
}

fn init_config(path: Option<PathBuf>, force: bool) -> Result<()> {
    let mut config = RecognizerConfig::default();
    if let Some(path) = path {
        config.config_path = path;
    }
    if config.config_path.exists() && !force {
        bail!(
            "{} already exists, use --force to overwrite",
            config.config_path.display()
        );
    }
    config.save()?;
    println!("{}", config.config_path.display());
    Ok(())
}

/// Read a WAV file as mono samples on the 16-bit scale
fn read_wav(path: &Path) -> Result<(Vec<f64>, u32)> {
    let mut reader = hound::WavReader::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f64> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let scale = f64::from(1u32 << 15) / f64::from(1u32 << (spec.bits_per_sample.clamp(1, 32) - 1));
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f64 * scale))
                .collect::<std::result::Result<_, _>>()?
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map(|v| v as f64 * 32768.0))
            .collect::<std::result::Result<_, _>>()?,
    };

    if channels > 1 {
        warn!(channels, "Using the first channel only");
    }
    let samples = interleaved.into_iter().step_by(channels).collect();
    Ok((samples, spec.sample_rate))
}

fn decode(config: RecognizerConfig, wav: &Path) -> Result<()> {
    let (samples, sample_rate) = read_wav(wav)?;
    if sample_rate != config.frontend.sample_rate {
        warn!(
            file = sample_rate,
            configured = config.frontend.sample_rate,
            "Sample rate differs from configuration"
        );
    }
    info!(samples = samples.len(), sample_rate, "Decoding {}", wav.display());

    let queue_capacity = config.frontend.queue_capacity;
    let recognizer = Recognizer::new(config)?;

    // File reading stands in for a capture device on its own thread
    let (mut producer, source) = capture_channel(queue_capacity, sample_rate)?;
    let reader = thread::spawn(move || -> Result<()> {
        producer.start()?;
        for chunk in samples.chunks(CHUNK_SAMPLES) {
            producer.push(chunk.to_vec())?;
        }
        producer.stop()?;
        Ok(())
    });

    let result = recognizer.recognize(Box::new(source));
    let read = reader
        .join()
        .map_err(|_| anyhow!("Audio reader thread panicked"))?;
    let result = result?;
    read?;

    match result {
        Some(result) if !result.words.is_empty() => println!("{}", result.text()),
        Some(result) => println!("{}", result.units.join(" ")),
        None => info!("No speech found"),
    }
    Ok(())
}

fn dump(config: RecognizerConfig, breadth_first: bool, output: Option<PathBuf>) -> Result<()> {
    let recognizer = Recognizer::new(config)?;
    let order = if breadth_first {
        TraversalOrder::BreadthFirst
    } else {
        TraversalOrder::DepthFirst
    };
    let dump = recognizer.dump_graph(order);

    match output {
        Some(path) => std::fs::write(&path, dump).with_context(|| format!("Failed to write {}", path.display()))?,
        None => print!("{}", dump),
    }
    Ok(())
}

fn train_model(config: RecognizerConfig, alignments: &Path, output: Option<PathBuf>) -> Result<()> {
    let model = AcousticModel::load(&config.model_path, &config.acoustic)
        .with_context(|| format!("Failed to load acoustic model {}", config.model_path.display()))?;
    let alignments = AlignmentFile::load(alignments)?;

    let (model, reports) = train(model, alignments, &config.training)?;
    for report in &reports {
        println!(
            "pass {}: log likelihood {:.4} over {} frames",
            report.iteration, report.log_likelihood, report.frames
        );
    }

    let output = output.unwrap_or(config.model_path);
    model
        .save(&output)
        .with_context(|| format!("Failed to save model {}", output.display()))?;
    info!("Trained model written to {}", output.display());
    Ok(())
}
