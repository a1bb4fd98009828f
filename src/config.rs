//! Configuration for the research pipeline.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (RESEARCHER_PROVIDER, RESEARCHER_WORKERS, ...)
//! 2. Config file (.researcher/config.yaml)
//! 3. Defaults
//!
//! Config file discovery:
//! - Searches current directory and parents for .researcher/config.yaml
//! - Falls back to ~/.researcher/config.yaml

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global cached configuration (stores Result to handle init errors)
static SETTINGS: OnceLock<Result<Settings, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    /// Default LLM provider name
    #[serde(default)]
    pub provider: Option<String>,

    #[serde(default)]
    pub pipeline: Option<PipelineFileConfig>,

    #[serde(default)]
    pub models: Option<ModelsFileConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineFileConfig {
    pub workers: Option<usize>,
    pub max_sources: Option<usize>,
    pub min_verified_pct: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelsFileConfig {
    pub anthropic: Option<String>,
    pub openai: Option<String>,
    pub search: Option<String>,
}

/// Resolved pipeline tunables
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Concurrent hypothesis workers; 1 degenerates to sequential
    pub workers: usize,

    /// Evidence sources kept per search
    pub max_sources: usize,

    /// Minimum percentage of trusted-source-backed findings
    pub min_verified_pct: f64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            workers: 5,
            max_sources: 6,
            min_verified_pct: 25.0,
        }
    }
}

/// Model identifiers per capability
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub anthropic: String,
    pub openai: String,

    /// Model driving the web-search tool calls
    pub search: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            anthropic: "claude-sonnet-4-5".to_string(),
            openai: "gpt-4o-mini".to_string(),
            search: "gpt-4o-mini".to_string(),
        }
    }
}

/// Fully resolved configuration
#[derive(Debug, Clone)]
pub struct Settings {
    /// Default LLM provider name
    pub provider: String,

    pub pipeline: PipelineSettings,
    pub models: ModelSettings,

    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            pipeline: PipelineSettings::default(),
            models: ModelSettings::default(),
            config_file: None,
        }
    }
}

/// Find config file by searching current directory and parents, then the
/// home directory
fn find_config_file() -> Option<PathBuf> {
    if let Ok(mut current) = std::env::current_dir() {
        loop {
            let config_path = current.join(".researcher").join("config.yaml");
            if config_path.exists() {
                return Some(config_path);
            }

            if !current.pop() {
                break;
            }
        }
    }

    let home_config = dirs::home_dir()?.join(".researcher").join("config.yaml");
    home_config.exists().then_some(home_config)
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Load configuration from all sources
fn load_settings() -> Result<Settings> {
    let defaults = Settings::default();
    let config_file = find_config_file();

    let file = match &config_file {
        Some(path) => Some(load_config_file(path)?),
        None => None,
    };
    let file_pipeline = file
        .as_ref()
        .and_then(|f| f.pipeline.clone())
        .unwrap_or_default();
    let file_models = file
        .as_ref()
        .and_then(|f| f.models.clone())
        .unwrap_or_default();

    let provider = env_var("RESEARCHER_PROVIDER")
        .or_else(|| file.as_ref().and_then(|f| f.provider.clone()))
        .unwrap_or(defaults.provider);

    let workers = env_var("RESEARCHER_WORKERS")
        .and_then(|v| v.parse().ok())
        .or(file_pipeline.workers)
        .unwrap_or(defaults.pipeline.workers)
        .max(1);

    let max_sources = env_var("RESEARCHER_MAX_SOURCES")
        .and_then(|v| v.parse().ok())
        .or(file_pipeline.max_sources)
        .unwrap_or(defaults.pipeline.max_sources)
        .max(1);

    let min_verified_pct = env_var("RESEARCHER_MIN_VERIFIED_PCT")
        .and_then(|v| v.parse().ok())
        .or(file_pipeline.min_verified_pct)
        .unwrap_or(defaults.pipeline.min_verified_pct)
        .clamp(0.0, 100.0);

    let models = ModelSettings {
        anthropic: env_var("RESEARCHER_ANTHROPIC_MODEL")
            .or(file_models.anthropic)
            .unwrap_or(defaults.models.anthropic),
        openai: env_var("RESEARCHER_OPENAI_MODEL")
            .or(file_models.openai)
            .unwrap_or(defaults.models.openai),
        search: env_var("RESEARCHER_SEARCH_MODEL")
            .or(file_models.search)
            .unwrap_or(defaults.models.search),
    };

    Ok(Settings {
        provider,
        pipeline: PipelineSettings {
            workers,
            max_sources,
            min_verified_pct,
        },
        models,
        config_file,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn settings() -> Result<&'static Settings> {
    let result = SETTINGS.get_or_init(|| load_settings().map_err(|e| e.to_string()));

    match result {
        Ok(settings) => Ok(settings),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_settings() -> Result<Settings> {
    load_settings()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.provider, "openai");
        assert_eq!(settings.pipeline.workers, 5);
        assert_eq!(settings.pipeline.max_sources, 6);
        assert_eq!(settings.pipeline.min_verified_pct, 25.0);
        assert!(settings.config_file.is_none());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(".researcher");
        std::fs::create_dir_all(&dir).unwrap();

        let config_path = dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
provider: anthropic
pipeline:
  workers: 1
  min_verified_pct: 40.0
models:
  search: gpt-4o
"#
        )
        .unwrap();

        let config = load_config_file(&config_path).unwrap();
        assert_eq!(config.provider, Some("anthropic".to_string()));

        let pipeline = config.pipeline.unwrap();
        assert_eq!(pipeline.workers, Some(1));
        assert_eq!(pipeline.min_verified_pct, Some(40.0));
        assert_eq!(pipeline.max_sources, None);
        assert_eq!(config.models.unwrap().search, Some("gpt-4o".to_string()));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: ConfigFile = serde_yaml::from_str("provider: anthropic").unwrap();
        assert!(config.pipeline.is_none());
        assert!(config.models.is_none());
    }
}
