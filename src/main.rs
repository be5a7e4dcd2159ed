mod booking;
mod classifier;
mod encoder;
mod error;
mod graphql;
mod page;
mod predictor;
mod settings;
mod web;

use std::process::exit;

use clap::Parser;
use predictor::Predictor;
use settings::{Args, Settings};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let settings = match Settings::from_file(&args.config) {
        Ok(ret) => ret,
        Err(error) => {
            eprintln!("Problem while loading settings. {error}");
            exit(1);
        }
    };

    init_tracing(&settings.log.filter);
    info!("Hotel Booking Cancellation Prediction Server");

    let predictor = match Predictor::load(&settings.model) {
        Ok(ret) => ret,
        Err(error) => {
            error!("Problem while loading model artifacts. {error}");
            exit(1);
        }
    };

    let schema = graphql::schema(predictor.clone());
    let tls = args.cert.zip(args.key);
    web::serve(schema, predictor, settings.web.address, tls).await;
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
