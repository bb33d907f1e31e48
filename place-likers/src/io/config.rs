//! Runner configuration stored in `place-likers.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::policy::PolicySettings;
use crate::core::session::LimitSettings;
use crate::core::value_range::ValueRange;

pub const DEFAULT_CONFIG_PATH: &str = "place-likers.toml";

/// Place-likers configuration (TOML).
///
/// Meant to be edited by hand. Missing fields fall back to defaults; CLI flags
/// override the place lists and `truncate_sources`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LikersConfig {
    /// Account the bot acts as. Required for `run`.
    pub username: String,

    /// Places whose top-results likers are targeted.
    pub place_likers_top: Vec<String>,

    /// Places whose recent-results likers are targeted.
    pub place_likers_recent: Vec<String>,

    /// Handle at most this many places per session (`N` or `N-M`), chosen at random.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncate_sources: Option<ValueRange>,

    /// Follows allowed per place.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_limit: Option<u32>,

    /// Consecutive skipped likers before the list is abandoned (default 15).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_list_limit: Option<ValueRange>,

    /// Fling gestures without progress before the list is abandoned (default 0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fling_when_skipped: Option<ValueRange>,

    /// Attempts per place before moving on. `0` retries without bound.
    pub max_attempts_per_source: u32,

    /// Root of per-account storage (`<storage_dir>/<username>/`).
    pub storage_dir: PathBuf,

    /// Where crash reports are written.
    pub crash_dir: PathBuf,

    pub interaction: PolicySettings,

    pub limits: LimitSettings,

    pub driver: DriverConfig,
}

/// External device driver invoked once per attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DriverConfig {
    /// Command that performs one attempt (e.g. `["python3", "-m", "likers_driver"]`).
    pub command: Vec<String>,

    /// Wall-clock budget per attempt in seconds.
    pub attempt_timeout_secs: u64,

    /// Truncate captured driver output beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Exit code with which the driver declares the failure unrecoverable.
    pub unrecoverable_exit_code: i32,

    /// Optional command run after a failed attempt to bring the device back
    /// to a known state. Empty disables it.
    pub reset_command: Vec<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            command: vec!["likers-driver".to_string()],
            attempt_timeout_secs: 60 * 60,
            output_limit_bytes: 1_000_000,
            unrecoverable_exit_code: 3,
            reset_command: Vec::new(),
        }
    }
}

impl Default for LikersConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            place_likers_top: Vec::new(),
            place_likers_recent: Vec::new(),
            truncate_sources: None,
            follow_limit: None,
            skipped_list_limit: None,
            fling_when_skipped: None,
            max_attempts_per_source: 5,
            storage_dir: PathBuf::from("accounts"),
            crash_dir: PathBuf::from("crashes"),
            interaction: PolicySettings::default(),
            limits: LimitSettings::default(),
            driver: DriverConfig::default(),
        }
    }
}

impl LikersConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = self.interaction.invalid_percentages();
        if !invalid.is_empty() {
            return Err(anyhow!(
                "interaction.{} must be <= 100",
                invalid.join(", interaction.")
            ));
        }
        if self.driver.attempt_timeout_secs == 0 {
            return Err(anyhow!("driver.attempt_timeout_secs must be > 0"));
        }
        if self.driver.output_limit_bytes == 0 {
            return Err(anyhow!("driver.output_limit_bytes must be > 0"));
        }
        if self.driver.command.is_empty() || self.driver.command[0].trim().is_empty() {
            return Err(anyhow!("driver.command must be a non-empty array"));
        }
        if self.driver.unrecoverable_exit_code == 0 {
            return Err(anyhow!("driver.unrecoverable_exit_code must be non-zero"));
        }
        Ok(())
    }

    /// `run` needs an account to act as.
    pub fn require_username(&self) -> Result<&str> {
        let username = self.username.trim();
        if username.is_empty() {
            return Err(anyhow!("username must be set in the config"));
        }
        Ok(username)
    }

    pub fn max_attempts(&self) -> Option<u32> {
        (self.max_attempts_per_source > 0).then_some(self.max_attempts_per_source)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `LikersConfig::default()`.
pub fn load_config(path: &Path) -> Result<LikersConfig> {
    if !path.exists() {
        let cfg = LikersConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: LikersConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &LikersConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
