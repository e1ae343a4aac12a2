use std::path::PathBuf;

use hs_reasoning::config::EngineConfig;

use crate::error::AppError;

/// Application configuration loaded explicitly from environment variables.
///
/// Every setting is optional. Without `HS_RULES_PATH` the rule document bundled with
/// the engine is used; without `HS_TAXONOMY_PATH` hierarchy options fall back to
/// candidate descriptions.
#[derive(Debug, Clone)]
pub struct Config {
    /// JSON elimination rule document replacing the bundled one.
    pub rules_path: Option<PathBuf>,
    /// JSON array of `{code, description}` records labelling hierarchy branches.
    pub taxonomy_path: Option<PathBuf>,
    pub engine: EngineConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional:
    /// - `HS_RULES_PATH`: rule document path (must exist when set)
    /// - `HS_TAXONOMY_PATH`: taxonomy seed path (must exist when set)
    /// - `HS_MAX_ROUNDS`, `HS_MAX_QUESTIONS`, `HS_MAX_HIERARCHY_QUESTIONS`,
    ///   `HS_MAX_FALLBACK_QUESTIONS`: positive integers bounding the dialogue
    pub fn from_env() -> Result<Self, AppError> {
        Ok(Self {
            rules_path: existing_path("HS_RULES_PATH")?,
            taxonomy_path: existing_path("HS_TAXONOMY_PATH")?,
            engine: EngineConfig::from_env()?,
        })
    }
}

fn existing_path(key: &str) -> Result<Option<PathBuf>, AppError> {
    let Some(raw) = std::env::var(key).ok().filter(|v| !v.trim().is_empty()) else {
        return Ok(None);
    };
    let path = PathBuf::from(raw.trim());
    if !path.exists() {
        return Err(AppError::Config(format!(
            "{key} points to {} which does not exist",
            path.display()
        )));
    }
    Ok(Some(path))
}
