use crate::sms::SmsConfig;
use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_BIND: &str = "0.0.0.0:9000";
const DEFAULT_STATIC_DIR: &str = "public";
const DEFAULT_TWILIO_API_BASE: &str = "https://api.twilio.com";

/// Daemon configuration: `.env`, then an optional TOML file, then `FACEDESK_*`
/// and `TWILIO_*` environment variables (highest precedence).
#[derive(Debug, Clone)]
pub struct Config {
    /// Socket address the HTTP server listens on (default: 0.0.0.0:9000).
    pub bind_addr: String,
    /// Root of the static assets (HTML pages, uploads, models).
    pub static_dir: PathBuf,
    /// Image store root, one subdirectory per label.
    pub upload_dir: PathBuf,
    /// Directory containing the SCRFD and ArcFace ONNX files.
    pub model_dir: PathBuf,
    /// Number of extraction worker threads.
    pub engine_workers: usize,
    /// Maximum mean Euclidean distance accepted as a match by `/recognize`.
    pub match_threshold: f32,
    /// Request body limit in bytes.
    pub max_upload_bytes: usize,
    /// Drop the cached registry after every successful upload.
    pub refresh_on_upload: bool,
    pub sms: SmsConfig,
}

/// Optional TOML configuration file, pointed to by `FACEDESK_CONFIG`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub bind: Option<String>,
    pub static_dir: Option<PathBuf>,
    pub upload_dir: Option<PathBuf>,
    pub model_dir: Option<PathBuf>,
    pub engine_workers: Option<usize>,
    pub match_threshold: Option<f32>,
    pub max_upload_bytes: Option<usize>,
    pub refresh_on_upload: Option<bool>,
    pub sms_timeout_secs: Option<u64>,
    pub twilio: TwilioFileConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TwilioFileConfig {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub phone_number: Option<String>,
    pub api_base: Option<String>,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn load() -> anyhow::Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::info!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!(error = %e, "ignoring malformed .env"),
        }

        let file = match std::env::var("FACEDESK_CONFIG") {
            Ok(path) => FileConfig::read(Path::new(&path))?,
            Err(_) => FileConfig::default(),
        };

        Ok(Self::resolve(file, |key| std::env::var(key).ok()))
    }

    /// Merge a file config with environment lookups. Environment wins.
    pub fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let static_dir = env("FACEDESK_STATIC_DIR")
            .map(PathBuf::from)
            .or(file.static_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR));

        let upload_dir = env("FACEDESK_UPLOAD_DIR")
            .map(PathBuf::from)
            .or(file.upload_dir)
            .unwrap_or_else(|| static_dir.join("uploads"));

        let model_dir = env("FACEDESK_MODEL_DIR")
            .map(PathBuf::from)
            .or(file.model_dir)
            .unwrap_or_else(|| static_dir.join("models"));

        let sms = SmsConfig {
            account_sid: env("TWILIO_ACCOUNT_SID").or(file.twilio.account_sid),
            auth_token: env("TWILIO_AUTH_TOKEN").or(file.twilio.auth_token),
            from_number: env("TWILIO_PHONE_NUMBER").or(file.twilio.phone_number),
            api_base: env("TWILIO_API_BASE")
                .or(file.twilio.api_base)
                .unwrap_or_else(|| DEFAULT_TWILIO_API_BASE.to_string()),
            timeout_secs: parsed(&env, "FACEDESK_SMS_TIMEOUT_SECS")
                .or(file.sms_timeout_secs)
                .unwrap_or(15),
        };

        Self {
            bind_addr: env("FACEDESK_BIND")
                .or(file.bind)
                .unwrap_or_else(|| DEFAULT_BIND.to_string()),
            static_dir,
            upload_dir,
            model_dir,
            engine_workers: parsed(&env, "FACEDESK_ENGINE_WORKERS")
                .or(file.engine_workers)
                .unwrap_or(2)
                .max(1),
            match_threshold: parsed(&env, "FACEDESK_MATCH_THRESHOLD")
                .or(file.match_threshold)
                .unwrap_or(1.1),
            max_upload_bytes: parsed(&env, "FACEDESK_MAX_UPLOAD_BYTES")
                .or(file.max_upload_bytes)
                .unwrap_or(10 * 1024 * 1024),
            refresh_on_upload: env("FACEDESK_REFRESH_ON_UPLOAD")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .or(file.refresh_on_upload)
                .unwrap_or(false),
            sms,
        }
    }
}

impl FileConfig {
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let file = toml::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        tracing::info!(path = %path.display(), "loaded config file");
        Ok(file)
    }
}

/// Parse an environment value, ignoring unparsable input.
fn parsed<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}
