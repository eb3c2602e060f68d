use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Daemon configuration: defaults, overlaid by the TOML file named in
/// `ROLLCALL_CONFIG`, overlaid by `ROLLCALL_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address (default: 0.0.0.0:5000).
    pub bind_addr: String,
    /// Root for student photos (`images/`) and the last annotated photo.
    pub data_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Base URL of the embedding oracle.
    pub oracle_url: String,
    /// Per-call oracle timeout in seconds.
    pub oracle_timeout_secs: u64,
    /// Reference photos encoded concurrently while building a roster.
    pub roster_concurrency: usize,
    /// Enhancement is disabled when no key is set.
    pub enhance_api_key: Option<String>,
    pub enhance_base_url: String,
    pub enhance_timeout_secs: u64,
    /// Notifications are only logged when no SMTP host is set.
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: String,
    pub smtp_starttls: bool,
    /// TTF/OTF font for roll-number labels. Without one only boxes are drawn.
    pub label_font: Option<PathBuf>,
    /// Reject registrations whose photo does not show exactly one face.
    pub strict_reference_photos: bool,
    /// Percentage below which students get a low-attendance warning.
    pub low_attendance_threshold: u32,
}

/// Keys accepted in the TOML overlay. All optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    bind_addr: Option<String>,
    data_dir: Option<PathBuf>,
    db_path: Option<PathBuf>,
    oracle_url: Option<String>,
    oracle_timeout_secs: Option<u64>,
    roster_concurrency: Option<usize>,
    enhance_api_key: Option<String>,
    enhance_base_url: Option<String>,
    enhance_timeout_secs: Option<u64>,
    smtp_host: Option<String>,
    smtp_port: Option<u16>,
    smtp_user: Option<String>,
    smtp_password: Option<String>,
    smtp_from: Option<String>,
    smtp_starttls: Option<bool>,
    label_font: Option<PathBuf>,
    strict_reference_photos: Option<bool>,
    low_attendance_threshold: Option<u32>,
}

impl FileConfig {
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let file = match std::env::var("ROLLCALL_CONFIG") {
            Ok(path) => FileConfig::load(Path::new(&path))?,
            Err(_) => FileConfig::default(),
        };
        Ok(Self::resolve(file, &|key| std::env::var(key).ok()))
    }

    fn resolve(file: FileConfig, env: &dyn Fn(&str) -> Option<String>) -> Self {
        let data_dir = env("ROLLCALL_DATA_DIR")
            .map(PathBuf::from)
            .or(file.data_dir)
            .unwrap_or_else(|| {
                env("XDG_DATA_HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| {
                        let home = env("HOME").unwrap_or_else(|| "/tmp".to_string());
                        PathBuf::from(home).join(".local/share")
                    })
                    .join("rollcall")
            });

        let db_path = env("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .or(file.db_path)
            .unwrap_or_else(|| data_dir.join("rollcall.db"));

        Self {
            bind_addr: env("ROLLCALL_BIND_ADDR")
                .or(file.bind_addr)
                .unwrap_or_else(|| "0.0.0.0:5000".to_string()),
            oracle_url: env("ROLLCALL_ORACLE_URL")
                .or(file.oracle_url)
                .unwrap_or_else(|| "http://127.0.0.1:8500".to_string()),
            oracle_timeout_secs: env_u64(env, "ROLLCALL_ORACLE_TIMEOUT_SECS", file.oracle_timeout_secs.unwrap_or(10)),
            roster_concurrency: env_usize(env, "ROLLCALL_ROSTER_CONCURRENCY", file.roster_concurrency.unwrap_or(4)),
            enhance_api_key: env("ROLLCALL_ENHANCE_API_KEY")
                .or(file.enhance_api_key)
                .filter(|k| !k.is_empty()),
            enhance_base_url: env("ROLLCALL_ENHANCE_BASE_URL")
                .or(file.enhance_base_url)
                .unwrap_or_else(|| "https://api.letsenhance.io".to_string()),
            enhance_timeout_secs: env_u64(env, "ROLLCALL_ENHANCE_TIMEOUT_SECS", file.enhance_timeout_secs.unwrap_or(60)),
            smtp_host: env("ROLLCALL_SMTP_HOST").or(file.smtp_host).filter(|h| !h.is_empty()),
            smtp_port: env_u16(env, "ROLLCALL_SMTP_PORT", file.smtp_port.unwrap_or(587)),
            smtp_user: env("ROLLCALL_SMTP_USER").or(file.smtp_user),
            smtp_password: env("ROLLCALL_SMTP_PASSWORD").or(file.smtp_password),
            smtp_from: env("ROLLCALL_SMTP_FROM")
                .or(file.smtp_from)
                .unwrap_or_else(|| "rollcall@localhost".to_string()),
            smtp_starttls: env_bool(env, "ROLLCALL_SMTP_STARTTLS", file.smtp_starttls.unwrap_or(true)),
            label_font: env("ROLLCALL_LABEL_FONT").map(PathBuf::from).or(file.label_font),
            strict_reference_photos: env_bool(
                env,
                "ROLLCALL_STRICT_REFERENCE_PHOTOS",
                file.strict_reference_photos.unwrap_or(false),
            ),
            low_attendance_threshold: env_u32(
                env,
                "ROLLCALL_LOW_ATTENDANCE_THRESHOLD",
                file.low_attendance_threshold
                    .unwrap_or(rollcall_core::report::DEFAULT_LOW_ATTENDANCE_PERCENT),
            ),
            data_dir,
            db_path,
        }
    }

    /// Defaults rooted at `data_dir`, ignoring the process environment.
    #[cfg(test)]
    pub(crate) fn for_data_dir(data_dir: &Path) -> Self {
        let dir = data_dir.display().to_string();
        Self::resolve(FileConfig::default(), &|key| (key == "ROLLCALL_DATA_DIR").then(|| dir.clone()))
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle_timeout_secs)
    }

    pub fn enhance_timeout(&self) -> Duration {
        Duration::from_secs(self.enhance_timeout_secs)
    }

    /// Where the most recent annotated attendance photo is written.
    pub fn last_attendance_path(&self) -> PathBuf {
        self.data_dir.join("last_attendance.jpg")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.data_dir.join("images")
    }
}

fn env_u64(env: &dyn Fn(&str) -> Option<String>, key: &str, default: u64) -> u64 {
    env(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(env: &dyn Fn(&str) -> Option<String>, key: &str, default: u32) -> u32 {
    env(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u16(env: &dyn Fn(&str) -> Option<String>, key: &str, default: u16) -> u16 {
    env(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(env: &dyn Fn(&str) -> Option<String>, key: &str, default: usize) -> usize {
    env(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(env: &dyn Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    env(key).map(|v| v != "0" && !v.eq_ignore_ascii_case("false")).unwrap_or(default)
}
