use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

pub const DEFAULT_MAX_MEDIA_BYTES: u64 = 20 * 1024 * 1024;

/// Typed configuration for the support bot process.
#[derive(Clone, Debug)]
pub struct Config {
    // Bot seeding
    pub telegram_bot_token: Option<String>,
    pub telegram_bot_name: String,

    // Storage
    pub database_path: PathBuf,
    pub media_dir: PathBuf,
    pub max_media_bytes: u64,

    // Runtime
    pub provider_timeout: Duration,
    pub reconcile_interval: Duration,

    // Audit
    pub audit_log_path: PathBuf,
    pub audit_log_json: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_env()
    }

    /// Build from the current process environment without touching `.env`.
    pub fn from_env() -> Result<Self> {
        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").and_then(non_empty);
        let telegram_bot_name = env_str("TELEGRAM_BOT_NAME")
            .and_then(non_empty)
            .unwrap_or_else(|| "default".to_string());

        let database_path = env_path("DATABASE_PATH").unwrap_or_else(|| PathBuf::from("support.db"));
        let media_dir = env_path("MEDIA_DIR").unwrap_or_else(|| PathBuf::from("media"));

        let max_media_bytes = env_u64("MAX_MEDIA_BYTES").unwrap_or(DEFAULT_MAX_MEDIA_BYTES);
        if max_media_bytes == 0 {
            return Err(Error::Config(
                "MAX_MEDIA_BYTES must be greater than zero".to_string(),
            ));
        }

        let provider_timeout =
            Duration::from_millis(env_u64("PROVIDER_TIMEOUT_MS").unwrap_or(10_000));
        let reconcile_interval =
            Duration::from_secs(env_u64("RECONCILE_INTERVAL_SECS").unwrap_or(300).max(1));

        let audit_log_path =
            env_path("AUDIT_LOG_PATH").unwrap_or_else(|| PathBuf::from("audit.log"));
        let audit_log_json = env_bool("AUDIT_LOG_JSON").unwrap_or(false);

        Ok(Self {
            telegram_bot_token,
            telegram_bot_name,
            database_path,
            media_dir,
            max_media_bytes,
            provider_timeout,
            reconcile_interval,
            audit_log_path,
            audit_log_json,
        })
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim().trim_start_matches("export ").trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| parse_bool(&s))
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env_str(key).and_then(non_empty).map(PathBuf::from)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.trim().to_string())
    }
}
