//! # Configuration Module
//!
//! Resolves where Moodify keeps its trained model and which API endpoint
//! and token it talks to.
//!
//! ## Data Storage
//!
//! The default model lives in the platform data directory:
//! - Linux: `~/.local/share/moodify/model/moodnet.json`
//! - macOS: `~/Library/Application Support/moodify/model/moodnet.json`
//! - Windows: `%APPDATA%\moodify\model\moodnet.json`
//!
//! The `.meta` file sits next to it.
//!
//! ## Environment
//!
//! - `MOODIFY_TOKEN`: bearer token for the music service
//! - `MOODIFY_API_BASE`: API root, defaults to the public Spotify endpoint
//! - `MOODIFY_MODEL`: model path override

use crate::spotify::DEFAULT_API_BASE;
use anyhow::{Context, Result};
use path_absolutize::Absolutize;
use log::debug;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable holding the bearer token.
pub const TOKEN_ENV: &str = "MOODIFY_TOKEN";
pub const API_BASE_ENV: &str = "MOODIFY_API_BASE";
pub const MODEL_ENV: &str = "MOODIFY_MODEL";

/// Returns the Moodify data directory, creating it if needed.
///
/// # Errors
///
/// If the platform has no data directory or it cannot be created.
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine system data directory. Pass --model to choose a model path."
        )
    })?;

    let moodify_dir = data_dir.join("moodify");
    fs::create_dir_all(&moodify_dir).with_context(|| {
        format!(
            "Failed to create Moodify data directory at {}. Please check file permissions.",
            moodify_dir.display()
        )
    })?;
    Ok(moodify_dir)
}

/// Default weights file: `<data dir>/moodify/model/moodnet.json`.
pub fn default_model_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("model").join("moodnet.json"))
}

/// Make a user-supplied path absolute against the working directory.
pub fn absolute(path: &Path) -> Result<PathBuf> {
    Ok(path
        .absolutize()
        .with_context(|| format!("Cannot resolve path {}", path.display()))?
        .into_owned())
}

/// Values resolved from flags, environment and defaults.
///
/// Serializes to the JSON logged at debug level; the token is left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeConfig {
    pub model_path: PathBuf,
    pub api_base: String,
    /// Never serialized.
    #[serde(skip)]
    pub token: Option<String>,
}

impl RuntimeConfig {
    /// Fill in anything not given explicitly.
    ///
    /// A relative `model` is made absolute against the working directory;
    /// without one the model lives under [`get_data_dir`]. A blank token
    /// counts as no token.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be determined or
    /// created, or if `model` cannot be made absolute.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use moodify::config::RuntimeConfig;
    /// use std::path::PathBuf;
    ///
    /// let config = RuntimeConfig::resolve(Some(PathBuf::from("models/net.json")), None, None)?;
    /// assert!(config.model_path.is_absolute());
    /// assert!(config.require_token().is_err());
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn resolve(
        model: Option<PathBuf>,
        api_base: Option<String>,
        token: Option<String>,
    ) -> Result<Self> {
        let model_path = match model {
            Some(path) => absolute(&path)?,
            None => default_model_path()?,
        };
        let config = Self {
            model_path,
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            token: token.filter(|t| !t.trim().is_empty()),
        };
        debug!("configuration: {}", config.describe());
        Ok(config)
    }

    /// JSON rendering without the token, for logs.
    #[must_use]
    pub fn describe(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("<unprintable: {e}>"))
    }

    /// The token, or an error telling the user how to supply one.
    pub fn require_token(&self) -> Result<&str> {
        self.token.as_deref().ok_or_else(|| {
            anyhow::anyhow!("This command talks to the music service: pass --token or set {TOKEN_ENV}")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model_path_structure() {
        let path = default_model_path().expect("Should get valid path");
        assert_eq!(path.file_name().unwrap(), "moodnet.json");
        let parent = path.parent().expect("Should have parent directory");
        assert_eq!(parent.file_name().unwrap(), "model");
        assert!(path.to_string_lossy().contains("moodify"));
        assert!(path.is_absolute(), "Model path should be absolute");
    }

    #[test]
    fn test_relative_model_path_is_absolutized() {
        let config = RuntimeConfig::resolve(Some(PathBuf::from("m/net.json")), None, None).unwrap();
        assert!(config.model_path.is_absolute());
        assert!(config.model_path.ends_with("m/net.json"));
        assert_eq!(config.api_base, DEFAULT_API_BASE);
    }

    #[test]
    fn test_blank_token_counts_as_missing() {
        let config = RuntimeConfig::resolve(Some(PathBuf::from("/tmp/x.json")), None, Some("  ".into())).unwrap();
        assert!(config.require_token().is_err());

        let config = RuntimeConfig::resolve(Some(PathBuf::from("/tmp/x.json")), None, Some("abc".into())).unwrap();
        assert_eq!(config.require_token().unwrap(), "abc");
    }

    #[test]
    fn test_token_is_not_serialized() {
        let config = RuntimeConfig {
            model_path: PathBuf::from("/tmp/x.json"),
            api_base: "http://localhost".into(),
            token: Some("secret".into()),
        };
        let json = config.describe();
        assert!(!json.contains("secret"));
        assert!(json.contains("http://localhost"));
        assert!(json.contains("x.json"));
    }
}
