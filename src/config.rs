use crate::error::ConfigError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub evidence: EvidenceConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub pacer: PacerConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub filters: FilterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Hard limit on one search process, in seconds.
    pub timeout_secs: u64,
    pub case_insensitive: bool,
    /// Per-file match cap handed to the search tool.
    pub max_count_per_file: usize,
    /// Lines of tool output read per search before the tool is stopped.
    pub max_output_lines: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            case_insensitive: true,
            max_count_per_file: 50,
            max_output_lines: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceConfig {
    pub max_snippets: usize,
    pub max_line_chars: usize,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            max_snippets: 20,
            max_line_chars: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// OpenAI-compatible chat completions URL.
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the bearer credential.
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_case_file_chars: usize,
    pub temperature: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 60,
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            max_case_file_chars: 16_000,
            temperature: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacerConfig {
    pub delay_ms: u64,
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self { delay_ms: 1000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Report file name written into the target directory when no output path is given.
    pub file_name: String,
    /// Directory (relative to the target) holding the candidate lists.
    pub input_dir: String,
    /// Suffix stripped from candidate list file names; also excluded from searches.
    pub candidate_suffix: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            file_name: "llm_analysis_report.csv".to_string(),
            input_dir: "DEP".to_string(),
            candidate_suffix: ".potential".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Directories the project profiler never descends into.
    pub ignore_dirs: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            ignore_dirs: vec![
                ".git".into(),
                "node_modules".into(),
                "target".into(),
                "__pycache__".into(),
                ".venv".into(),
                "vendor".into(),
                "dist".into(),
            ],
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let path = get_config_path();
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let invalid = |message: String| ConfigError::Invalid {
            path: path.to_path_buf(),
            message,
        };
        let content = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        toml::from_str(&content).map_err(|e| invalid(e.to_string()))
    }

    pub fn save(&self) -> Result<()> {
        let path = get_config_path();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    pub fn create_default() -> Result<PathBuf> {
        let config = Config::default();
        config.save()?;
        Ok(get_config_path())
    }
}

pub fn get_config_path() -> PathBuf {
    let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    config_dir.join("deptriage").join("config.toml")
}

pub fn show_config() -> Result<()> {
    let path = get_config_path();
    println!("Config: {}", path.display());
    println!();

    if path.exists() {
        let config = Config::load()?;
        println!("{}", toml::to_string_pretty(&config)?);
    } else {
        println!("(default config, file not created)");
        println!();
        println!("{}", toml::to_string_pretty(&Config::default())?);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_bounds() {
        let cfg = Config::default();
        assert_eq!(cfg.classifier.max_attempts, 3);
        assert_eq!(cfg.evidence.max_snippets, 20);
        assert_eq!(cfg.evidence.max_line_chars, 300);
        assert_eq!(cfg.pacer.delay_ms, 1000);
        assert_eq!(cfg.report.file_name, "llm_analysis_report.csv");
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[classifier]\nmodel = \"gpt-4o-mini\"\n[pacer]\ndelay_ms = 0\n")
            .unwrap();

        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.classifier.model, "gpt-4o-mini");
        assert_eq!(cfg.classifier.max_attempts, 3);
        assert_eq!(cfg.pacer.delay_ms, 0);
        assert!(cfg.search.case_insensitive);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[classifier\nmodel = ").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.classifier.api_key_env, "OPENAI_API_KEY");
    }
}
