//! TOML-backed rule configuration provider with hot reload
//!
//! The live config sits behind an [`ArcSwap`], so a reload swaps the
//! whole table atomically while in-flight analyses keep the
//! [`ThresholdProfile`] snapshot they resolved at start. A reload that
//! fails validation is rejected and the previous config stays active.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{info, warn};

use super::RuleConfigProvider;
use crate::config::{ConfigError, EngineConfig, ThresholdProfile};
use crate::types::WineColor;

pub struct TomlRuleProvider {
    config: ArcSwap<EngineConfig>,
    path: Option<PathBuf>,
}

impl TomlRuleProvider {
    pub fn new(config: EngineConfig) -> Self {
        Self { config: ArcSwap::from_pointee(config), path: None }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config = EngineConfig::load_from_file(path)?;
        Ok(Self {
            config: ArcSwap::from_pointee(config),
            path: Some(path.to_path_buf()),
        })
    }

    /// Re-read and validate the backing file, swapping atomically on
    /// success. Without a backing file this is a no-op.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        match EngineConfig::load_from_file(path) {
            Ok(config) => {
                self.config.store(Arc::new(config));
                info!(path = %path.display(), "Rule configuration reloaded");
                Ok(())
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Rule reload rejected, keeping previous config");
                Err(e)
            }
        }
    }

    pub fn current(&self) -> Arc<EngineConfig> {
        self.config.load_full()
    }
}

impl RuleConfigProvider for TomlRuleProvider {
    fn thresholds(&self, varietal: &str, color: WineColor) -> ThresholdProfile {
        ThresholdProfile::resolve(&self.config.load(), varietal, color)
    }
}
