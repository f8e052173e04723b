//! Academy configuration stored under `.academy/config.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::advisor::DEFAULT_MISTAKE_THRESHOLD;
use crate::core::rail_fence::{DEFAULT_WORDS, validate_word};
use crate::core::wave::WaveParams;

/// Academy configuration (TOML).
///
/// Meant to be edited by hand. Missing fields fall back to the stock game
/// parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AcademyConfig {
    /// Delay between solving a mini-game and the campaign completion signal.
    pub completion_delay_ms: u64,

    /// Mistake count at which the advisor offers help unprompted.
    pub mistake_threshold: u32,

    pub wave: WaveConfig,
    pub rail_fence: RailFenceConfig,
    pub advisor: AdvisorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WaveConfig {
    pub total: usize,
    pub bad: usize,
    pub max_misses: u32,
    pub spawn_interval_ms: u64,
    pub transit_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RailFenceConfig {
    /// Candidate target words, uppercase A-Z.
    pub words: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AdvisorConfig {
    /// Command that answers advisor questions (prompt on stdin, reply on
    /// stdout). Empty means the advisor always runs offline.
    pub command: Vec<String>,

    /// Environment variable holding the credential passed to `command`.
    pub api_key_env: String,

    pub timeout_secs: u64,

    /// Replies beyond this many bytes are truncated.
    pub output_limit_bytes: usize,
}

impl Default for AcademyConfig {
    fn default() -> Self {
        Self {
            completion_delay_ms: 1_500,
            mistake_threshold: DEFAULT_MISTAKE_THRESHOLD,
            wave: WaveConfig::default(),
            rail_fence: RailFenceConfig::default(),
            advisor: AdvisorConfig::default(),
        }
    }
}

impl Default for WaveConfig {
    fn default() -> Self {
        let params = WaveParams::default();
        Self {
            total: params.total,
            bad: params.bad,
            max_misses: params.max_misses,
            spawn_interval_ms: params.spawn_interval_ms,
            transit_ms: params.transit_ms,
        }
    }
}

impl Default for RailFenceConfig {
    fn default() -> Self {
        Self {
            words: DEFAULT_WORDS.iter().map(|w| w.to_string()).collect(),
        }
    }
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            timeout_secs: 30,
            output_limit_bytes: 16_000,
        }
    }
}

impl AcademyConfig {
    pub fn validate(&self) -> Result<()> {
        self.wave_params().validate().map_err(|err| anyhow!(err))?;
        if self.mistake_threshold == 0 {
            return Err(anyhow!("mistake_threshold must be > 0"));
        }
        if self.rail_fence.words.is_empty() {
            return Err(anyhow!("rail_fence.words must not be empty"));
        }
        for word in &self.rail_fence.words {
            validate_word(word).map_err(|err| anyhow!("rail_fence.words: {err}"))?;
        }
        if self.advisor.timeout_secs == 0 {
            return Err(anyhow!("advisor.timeout_secs must be > 0"));
        }
        if self.advisor.output_limit_bytes == 0 {
            return Err(anyhow!("advisor.output_limit_bytes must be > 0"));
        }
        if self
            .advisor
            .command
            .first()
            .is_some_and(|program| program.trim().is_empty())
        {
            return Err(anyhow!("advisor.command must start with a program name"));
        }
        Ok(())
    }

    pub fn wave_params(&self) -> WaveParams {
        WaveParams {
            total: self.wave.total,
            bad: self.wave.bad,
            max_misses: self.wave.max_misses,
            spawn_interval_ms: self.wave.spawn_interval_ms,
            transit_ms: self.wave.transit_ms,
            completion_delay_ms: self.completion_delay_ms,
        }
    }

    pub fn advisor_timeout(&self) -> Duration {
        Duration::from_secs(self.advisor.timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AcademyConfig::default()`.
pub fn load_config(path: &Path) -> Result<AcademyConfig> {
    if !path.exists() {
        let cfg = AcademyConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AcademyConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AcademyConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf, "toml.tmp")
}

/// Write `contents` next to `path` under a temporary extension, then rename.
pub(crate) fn write_atomic(path: &Path, contents: &str, tmp_extension: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension(tmp_extension);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
