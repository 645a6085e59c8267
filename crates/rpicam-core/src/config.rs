use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::{domain::UserId, errors::Error, security::AllowList, Result};

pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const DEFAULT_MONITOR_INTERVAL_SECONDS: u64 = 1;
pub const DEFAULT_TEMP_DIR: &str = "/var/tmp";
pub const MIN_IMAGE_WIDTH: u32 = 400;
pub const MIN_IMAGE_HEIGHT: u32 = 300;

/// On-disk shape of `config.json`.
///
/// Numbers are signed so that a negative or zero interval in the file can be
/// normalized instead of failing to parse.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    pub api_token: String,
    #[serde(default)]
    pub available_ids: Vec<String>,
    #[serde(default)]
    pub monitor_interval: i64,
    #[serde(default)]
    pub is_verbose: bool,
    #[serde(default)]
    pub image_width: i64,
    #[serde(default)]
    pub image_height: i64,
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    #[serde(default)]
    pub raspistill_path: Option<PathBuf>,
}

/// Output image size, already clamped to the supported minimum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn clamped(width: i64, height: i64) -> Self {
        Self {
            width: clamp_dimension(width, MIN_IMAGE_WIDTH),
            height: clamp_dimension(height, MIN_IMAGE_HEIGHT),
        }
    }
}

/// Immutable runtime configuration, loaded once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub telegram_bot_token: String,
    pub allowed_users: AllowList,
    pub poll_interval: Duration,
    pub verbose: bool,
    pub image_size: ImageSize,
    pub temp_dir: PathBuf,
    pub raspistill_path: PathBuf,
}

impl Config {
    /// Load `.env`, then the JSON config file (`$RPICAM_CONFIG` or `./config.json`).
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let path = env_path("RPICAM_CONFIG").unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let mut raw = read_raw(&path)?;

        if let Some(token) = env_str("TELEGRAM_BOT_TOKEN").and_then(non_empty) {
            raw.api_token = token;
        }

        Self::from_raw(raw)
    }

    /// Validate and normalize a raw config. All clamping happens here, once.
    pub fn from_raw(raw: RawConfig) -> Result<Self> {
        let telegram_bot_token = raw.api_token.trim().to_string();
        if telegram_bot_token.is_empty() {
            return Err(Error::Config(
                "api_token is required (config file or TELEGRAM_BOT_TOKEN)".to_string(),
            ));
        }

        let allowed_users = AllowList::new(
            raw.available_ids
                .iter()
                .filter_map(|s| normalize_username(s))
                .map(UserId),
        );
        if allowed_users.is_empty() {
            return Err(Error::Config(
                "available_ids must list at least one telegram username".to_string(),
            ));
        }

        let poll_interval = if raw.monitor_interval <= 0 {
            Duration::from_secs(DEFAULT_MONITOR_INTERVAL_SECONDS)
        } else {
            Duration::from_secs(raw.monitor_interval as u64)
        };

        let raspistill_path = raw
            .raspistill_path
            .or_else(|| which_in_path("raspistill"))
            .unwrap_or_else(|| PathBuf::from("raspistill"));

        Ok(Self {
            telegram_bot_token,
            allowed_users,
            poll_interval,
            verbose: raw.is_verbose,
            image_size: ImageSize::clamped(raw.image_width, raw.image_height),
            temp_dir: raw
                .temp_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMP_DIR)),
            raspistill_path,
        })
    }
}

fn read_raw(path: &Path) -> Result<RawConfig> {
    let txt = fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("failed to read config file {}: {e}", path.display()))
    })?;
    Ok(serde_json::from_str(&txt)?)
}

fn clamp_dimension(v: i64, min: u32) -> u32 {
    if v < min as i64 {
        return min;
    }
    u32::try_from(v).unwrap_or(u32::MAX)
}

fn normalize_username(s: &str) -> Option<String> {
    let s = s.trim();
    let s = s.strip_prefix('@').unwrap_or(s);
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        // The process environment wins over `.env`.
        if env::var_os(key).is_some() {
            continue;
        }

        let mut val = v.trim().to_string();
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn which_in_path(binary: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    for dir in env::split_paths(&path) {
        let candidate = dir.join(binary);
        if is_executable_file(&candidate) {
            return Some(candidate);
        }
    }
    None
}

fn is_executable_file(p: &Path) -> bool {
    if !p.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(md) = fs::metadata(p) {
            return (md.permissions().mode() & 0o111) != 0;
        }
    }
    true
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
