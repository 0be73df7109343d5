use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::face::FaceConfig;
use crate::fusion::FusionConfig;
use crate::triage::TriageThresholds;
use crate::voice::VoiceConfig;

/// Current config schema
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Engine configuration. Every empirical threshold lives here with its
/// historical value as the default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub schema_version: u32,

    pub face: FaceConfig,
    pub voice: VoiceConfig,
    pub fusion: FusionConfig,
    pub triage: TriageThresholds,

    /// Per-modality analysis deadline
    pub modality_timeout_ms: u64,
    /// Deadline for the clinical note generator
    pub narrative_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION,
            face: FaceConfig::default(),
            voice: VoiceConfig::default(),
            fusion: FusionConfig::default(),
            triage: TriageThresholds::default(),
            modality_timeout_ms: 10_000,
            narrative_timeout_ms: 15_000,
        }
    }
}

impl EngineConfig {
    /// Load config from file, or use defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        if config.schema_version > CONFIG_SCHEMA_VERSION {
            warn!(
                "Config schema {} is newer than supported {}; unknown fields are ignored",
                config.schema_version, CONFIG_SCHEMA_VERSION
            );
        }
        config.validate()?;
        Ok(config)
    }

    /// Load `~/.vitalyn/config.json`, or defaults
    pub fn load_or_default() -> Result<Self> {
        Self::load(&Self::default_config_path()?)
    }

    /// Save config to file, creating the parent directory
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")
    }

    /// Get the default config directory
    pub fn default_config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home.join(".vitalyn"))
    }

    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::default_config_dir()?.join("config.json"))
    }

    pub fn modality_timeout(&self) -> Duration {
        Duration::from_millis(self.modality_timeout_ms)
    }

    pub fn narrative_timeout(&self) -> Duration {
        Duration::from_millis(self.narrative_timeout_ms)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.modality_timeout_ms == 0 {
            bail!("modality_timeout_ms must be greater than 0");
        }
        if self.narrative_timeout_ms == 0 {
            bail!("narrative_timeout_ms must be greater than 0");
        }
        let w = &self.fusion.weights;
        for (name, weight) in [("vitals", w.vitals), ("face", w.face), ("voice", w.voice)] {
            if !weight.is_finite() || weight < 0.0 {
                bail!("fusion weight '{}' must be a non-negative number", name);
            }
        }
        if self.face.max_frames == 0 {
            bail!("face.max_frames must be at least 1");
        }
        if self.voice.n_mfcc == 0 {
            bail!("voice.n_mfcc must be at least 1");
        }
        Ok(())
    }
}
