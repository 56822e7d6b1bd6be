use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{
  debug,
  info,
  warn
};

use crate::calendar::DisplayPolicy;
use crate::datetime::resolve_timezone;
use crate::store::DEFAULT_STORAGE_KEY;

const CONFIG_ENV_VAR: &str =
  "TASKFLOW_CONFIG";
const CONFIG_FILE_NAME: &str =
  "taskflow.toml";
const APP_DIR_NAME: &str = "taskflow";

fn default_storage_key() -> String {
  DEFAULT_STORAGE_KEY.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
  #[serde(
    default = "default_storage_key"
  )]
  pub key:      String,
  #[serde(default)]
  pub data_dir: Option<PathBuf>
}

impl Default for StorageConfig {
  fn default() -> Self {
    Self {
      key:      default_storage_key(),
      data_dir: None
    }
  }
}

#[derive(
  Debug, Clone, Default, Deserialize,
)]
pub struct Config {
  #[serde(default)]
  pub timezone:    Option<String>,
  #[serde(default)]
  pub log_level:   Option<String>,
  #[serde(default)]
  pub storage:     StorageConfig,
  #[serde(default)]
  pub calendar:    DisplayPolicy,
  #[serde(skip)]
  pub loaded_from: Option<PathBuf>
}

impl Config {
  /// Reads the config file, falling
  /// back to defaults when none exists.
  #[tracing::instrument(skip(
    path_override
  ))]
  pub fn load(
    path_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let Some(path) =
      resolve_config_path(path_override)
    else {
      warn!(
        "no config location; using \
         defaults"
      );
      return Ok(Self::default());
    };

    if !path.exists() {
      if path_override.is_some() {
        return Err(anyhow!(
          "config file not found: {}",
          path.display()
        ));
      }
      warn!(file = %path.display(), "no config file; using defaults");
      return Ok(Self::default());
    }

    let raw = fs::read_to_string(&path)
      .with_context(|| {
        format!(
          "failed to read {}",
          path.display()
        )
      })?;
    let mut cfg = Self::from_toml_str(
      &raw
    )
    .with_context(|| {
      format!(
        "failed to parse {}",
        path.display()
      )
    })?;
    cfg.loaded_from = Some(path.clone());

    info!(file = %path.display(), "loaded config");
    Ok(cfg)
  }

  pub fn from_toml_str(
    raw: &str
  ) -> anyhow::Result<Self> {
    let mut cfg =
      toml::from_str::<Self>(raw)?;
    cfg.sanitize();
    Ok(cfg)
  }

  fn sanitize(&mut self) {
    if self.storage.key.trim().is_empty()
    {
      debug!(
        "blank storage key; using \
         default"
      );
      self.storage.key =
        default_storage_key();
    }
    if self
      .timezone
      .as_deref()
      .is_some_and(|tz| {
        tz.trim().is_empty()
      })
    {
      self.timezone = None;
    }
    self.calendar.sanitize();
  }

  pub fn timezone(&self) -> Tz {
    resolve_timezone(
      self.timezone.as_deref()
    )
  }

  pub fn display_policy(
    &self
  ) -> DisplayPolicy {
    self.calendar
  }
}

fn resolve_config_path(
  path_override: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = path_override {
    return Some(expand_tilde(path));
  }

  if let Ok(raw) =
    std::env::var(CONFIG_ENV_VAR)
  {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(expand_tilde(
        Path::new(trimmed)
      ));
    }
  }

  dirs::config_dir().map(|dir| {
    dir
      .join(APP_DIR_NAME)
      .join(CONFIG_FILE_NAME)
  })
}

/// Directory for [`crate::storage::FileStorage`]; created when missing.
#[tracing::instrument(skip(cfg))]
pub fn resolve_data_dir(
  cfg: &Config
) -> anyhow::Result<PathBuf> {
  let dir = match cfg
    .storage
    .data_dir
    .as_deref()
  {
    | Some(path) => expand_tilde(path),
    | None => default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  dirs::data_dir()
    .map(|dir| dir.join(APP_DIR_NAME))
    .ok_or_else(|| {
      anyhow!(
        "cannot determine data \
         directory"
      )
    })
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}
