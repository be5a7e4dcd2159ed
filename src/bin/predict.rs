#[allow(dead_code)]
#[path = "../booking.rs"]
mod booking;
#[allow(dead_code)]
#[path = "../classifier.rs"]
mod classifier;
#[allow(dead_code)]
#[path = "../encoder.rs"]
mod encoder;
#[allow(dead_code)]
#[path = "../error.rs"]
mod error;
#[allow(dead_code)]
#[path = "../predictor.rs"]
mod predictor;
#[allow(dead_code)]
#[path = "../settings.rs"]
mod settings;

use std::{fs, io::Read, path::PathBuf, process::exit};

use anyhow::{bail, Context, Result};
use clap::Parser;
use predictor::Predictor;
use serde_json::Value;
use settings::Settings;
use tracing_subscriber::EnvFilter;

/// Predicts the cancellation outcome of a single booking.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Path to the local configuration TOML file.
    #[arg(short, value_name = "CONFIG_PATH")]
    config: PathBuf,

    /// JSON object with every booking field, or `-` to read from stdin.
    #[arg(value_name = "RECORD_JSON")]
    record: PathBuf,
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::from_file(&args.config).context("failed to load settings")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let predictor = Predictor::load(&settings.model)?;

    let text = if args.record.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("failed to read stdin")?;
        text
    } else {
        fs::read_to_string(&args.record)
            .with_context(|| format!("failed to read {}", args.record.display()))?
    };
    println!("{}", predict_record(&predictor, &text)?);
    Ok(())
}

/// Predicts the booking in `text` and returns the outcome message.
fn predict_record(predictor: &Predictor, text: &str) -> Result<String> {
    let Value::Object(raw) = serde_json::from_str::<Value>(text).context("invalid JSON record")?
    else {
        bail!("record must be a JSON object");
    };
    let outcome = predictor.predict(&raw)?;
    Ok(outcome.message())
}
