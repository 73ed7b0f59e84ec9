use anyhow::{Context, Result};
use clap::Parser;
use fakenews_ocr::{
    ImageSource, Pipeline, PipelineError, ResultStore,
    classifier::select_classifier,
    config::{self, AppConfig},
    consts::DEFAULT_CONFIG_PATH,
    ocr,
};
use log::{error, info, warn};
use std::path::PathBuf;

/// Fake news OCR - classify the text found in news screenshots
#[derive(Parser, Debug)]
#[command(name = "fakenews_ocr")]
#[command(version, about = "Extract text from news images and classify it as real or fake", long_about = None)]
struct Args {
    /// Image files to process (PNG, JPEG or BMP), handled one after another
    #[arg(required_unless_present_any = ["show_results", "write_default_config"])]
    images: Vec<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Classifier artifact (overrides the config file)
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Results CSV (overrides the config file)
    #[arg(short, long)]
    results: Option<PathBuf>,

    /// Per-backend OCR timeout in seconds, 0 to wait indefinitely
    #[arg(short, long)]
    timeout_secs: Option<u64>,

    /// Print each record as JSON instead of the text report
    #[arg(long)]
    json: bool,

    /// Print all stored results and exit
    #[arg(long)]
    show_results: bool,

    /// Write the effective configuration to the config path and exit
    #[arg(long)]
    write_default_config: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::builder()
        .filter(None, log::LevelFilter::Info)
        .filter(
            Some("fakenews_ocr"),
            if args.verbose {
                log::LevelFilter::Debug
            } else {
                log::LevelFilter::Info
            },
        )
        .init();

    let config = load_or_default_config(&args)?;

    if args.write_default_config {
        if let Some(parent) = args.config.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        config::save_config(&config, &args.config)
            .with_context(|| format!("failed to write config {}", args.config.display()))?;
        info!("Configuration written to {}", args.config.display());
        return Ok(());
    }

    let store = ResultStore::open(&config.store.results_path)?;

    if args.show_results {
        for record in store.records()? {
            if args.json {
                println!("{}", serde_json::to_string(&record)?);
            } else {
                println!(
                    "{} | {} | {} | {}",
                    record.image_path,
                    record.language_detected,
                    record.prediction,
                    record.extracted_text
                );
            }
        }
        return Ok(());
    }

    // Backends and classifier live for the rest of the process
    let engine = ocr::build_engine(&config.ocr).context("failed to initialize OCR backends")?;
    let selection = select_classifier(&config.classifier.model_path)?;
    let pipeline = Pipeline::new(&engine, &selection.classifier, &store);

    let mut failed = 0usize;
    for image in &args.images {
        let source = ImageSource::from(image.as_path());
        match pipeline.process(&source) {
            Ok(processed) => {
                let record = processed.record;
                if args.json {
                    println!("{}", serde_json::to_string(&record)?);
                } else {
                    println!("Processed {}", record.image_path);
                    println!("Extracted Text: {}", record.extracted_text);
                    println!("Detected Language: {}", record.language_detected);
                    println!("Prediction: {}\n", record.prediction);
                }
            }
            Err(PipelineError::Store(e)) => {
                return Err(e).context("failed to persist result");
            }
            Err(e) => {
                error!("{}", e);
                failed += 1;
            }
        }
    }

    info!("Results saved at: {}", store.path().display());

    if failed > 0 {
        anyhow::bail!("{} of {} images could not be processed", failed, args.images.len());
    }
    Ok(())
}

/// Load configuration from file, falling back to defaults, then apply
/// command line overrides
fn load_or_default_config(args: &Args) -> Result<AppConfig> {
    let mut config = if args.config.exists() {
        let config = config::load_config(&args.config)?;
        info!("Loaded configuration from {:?}", args.config);
        config
    } else {
        if args.config.as_os_str() != DEFAULT_CONFIG_PATH {
            warn!("Config file {:?} not found, using defaults", args.config);
        }
        AppConfig::default()
    };

    if let Some(model) = &args.model {
        config.classifier.model_path = model.clone();
    }
    if let Some(results) = &args.results {
        config.store.results_path = results.clone();
    }
    if let Some(timeout_secs) = args.timeout_secs {
        config.ocr.timeout_secs = timeout_secs;
    }

    Ok(config)
}
