use std::{net::SocketAddr, path::Path, path::PathBuf, time::Duration};

use clap::Parser;
use config::{builder::DefaultState, ConfigBuilder, ConfigError, File};
use serde::{Deserialize, Serialize};

const DEFAULT_ADDR: &str = "127.0.0.1:8000";

#[derive(Parser, Debug)]
#[command(version)]
pub struct Args {
    /// Path to the local configuration TOML file.
    #[arg(short, value_name = "CONFIG_PATH")]
    pub config: PathBuf,

    /// Path to the certificate file. Serves HTTPS together with `--key`.
    #[arg(long, value_name = "CERT_PATH", requires = "key")]
    pub cert: Option<PathBuf>,

    /// Path to the key file.
    #[arg(long, value_name = "KEY_PATH", requires = "cert")]
    pub key: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Web {
    #[serde(deserialize_with = "deserialize_socket_addr")]
    pub address: SocketAddr,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelSettings {
    /// The exported preprocessing pipeline.
    pub encoder: PathBuf,
    /// The trained classifier, `.onnx` or `.json`.
    pub classifier: PathBuf,
    pub inference_timeout_ms: u64,
}

impl ModelSettings {
    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Log {
    /// Default filter directive, overridden by `RUST_LOG`.
    pub filter: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Settings {
    pub web: Web,
    pub model: ModelSettings,
    pub log: Log,
}

impl Settings {
    /// Load settings from the given TOML file, with sane defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let builder = ConfigBuilder::<DefaultState>::default()
            .set_default("web.address", DEFAULT_ADDR)?
            .set_default("model.encoder", "preprocessor.json")?
            .set_default("model.classifier", "hotel_model.onnx")?
            .set_default("model.inference_timeout_ms", 5000)?
            .set_default("log.filter", "info")?;

        let cfg = builder.add_source(File::from(path)).build()?;

        let settings: Self = cfg.try_deserialize()?;
        if settings.model.inference_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "model.inference_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(settings)
    }
}

fn deserialize_socket_addr<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}
