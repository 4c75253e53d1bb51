use crate::error::{CHMError, Result};
use crate::signing::KeyPair;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_DATA_DIR: &str = "CHM_DATA_DIR";
pub const ENV_SIGNING_KEY_PATH: &str = "CHM_SIGNING_KEY_PATH";
pub const ENV_MAX_EVENTS: &str = "CHM_MAX_EVENTS";

const TRANSPARENCY_LOG_FILE: &str = "public_timestamp_log.jsonl";
const LOG_SECRET_FILE: &str = ".log_secret";

/// Periodic tracing check settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Strokes between two fingerprint comparisons
    pub check_interval: usize,
    /// Minimum similarity that declares tracing
    pub similarity_threshold: f64,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            check_interval: 10,
            similarity_threshold: 0.33,
        }
    }
}

/// Library configuration, layered as defaults < JSON file < environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub data_dir: PathBuf,
    pub signing_key_path: PathBuf,
    pub max_events: usize,
    /// Below this many strokes an import with unknown visibility counts as MixedMedia
    pub mixed_media_stroke_threshold: usize,
    pub encrypt_sessions: bool,
    pub tracing: TracingConfig,
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

impl Default for CoreConfig {
    fn default() -> Self {
        let home = home_dir();
        Self {
            data_dir: home.join(".local").join("share").join("chm"),
            signing_key_path: home.join(".config").join("chm").join("signing_key.txt"),
            max_events: 50_000,
            mixed_media_stroke_threshold: 10,
            encrypt_sessions: true,
            tracing: TracingConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Read a JSON config file; absent keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: CoreConfig = serde_json::from_str(&text)
            .map_err(|e| CHMError::config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `CHM_*` overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup(ENV_SIGNING_KEY_PATH) {
            self.signing_key_path = PathBuf::from(path);
        }
        if let Some(max) = lookup(ENV_MAX_EVENTS) {
            self.max_events = max.trim().parse().map_err(|_| {
                CHMError::config(format!("{} must be a positive integer, got {:?}", ENV_MAX_EVENTS, max))
            })?;
        }
        self.validate()
    }

    /// Defaults, then `config_file` if given, then the environment
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut config = match config_file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        log::debug!("Loaded configuration (data dir {})", config.data_dir.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_events == 0 {
            return Err(CHMError::config("max_events must be greater than zero"));
        }
        if self.tracing.check_interval == 0 {
            return Err(CHMError::config("tracing.check_interval must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.tracing.similarity_threshold) {
            return Err(CHMError::config(format!(
                "tracing.similarity_threshold must be within [0, 1], got {}",
                self.tracing.similarity_threshold
            )));
        }
        Ok(())
    }

    /// Read the signing key once at startup.
    ///
    /// A missing file is not an error: proofs are then issued unsigned.
    pub fn load_signing_key(&self) -> Result<Option<KeyPair>> {
        let text = match std::fs::read_to_string(&self.signing_key_path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!(
                    "No signing key at {}; proofs will be unsigned",
                    self.signing_key_path.display()
                );
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let keypair = KeyPair::from_base64(&text).map_err(|e| {
            CHMError::config(format!("{}: {}", self.signing_key_path.display(), e))
        })?;
        log::info!("Loaded signing key ({})", keypair.public_key().to_base64());
        Ok(Some(keypair))
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }

    pub fn proofs_dir(&self) -> PathBuf {
        self.data_dir.join("proofs")
    }

    pub fn transparency_log_path(&self) -> PathBuf {
        self.data_dir.join(TRANSPARENCY_LOG_FILE)
    }

    pub fn log_secret_path(&self) -> PathBuf {
        self.data_dir.join(LOG_SECRET_FILE)
    }

    /// Create the data directories if missing
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [self.data_dir.clone(), self.sessions_dir(), self.proofs_dir()] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}
