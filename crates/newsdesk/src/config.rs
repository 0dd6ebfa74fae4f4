use anyhow::{Context, Result};
use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const PLACEHOLDER_KEY: &str = "your_actual_gemini_api_key_here";

/// Runtime settings taken from the environment (and any `.env` file found)
#[derive(Debug, Clone)]
pub struct Config {
    pub root: PathBuf,
    pub utc_offset_hours: i32,
    pub news_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub publish: PublishConfig,
}

#[derive(Debug, Clone, Default)]
pub struct PublishConfig {
    pub slack_webhook_url: Option<String>,
    pub confluence_token: Option<String>,
    pub confluence_base: Option<String>,
    pub confluence_space: String,
    pub figma_token: Option<String>,
    pub figma_file_id: Option<String>,
    pub github_token: Option<String>,
    pub github_repo: String,
    pub github_branch: String,
    /// Overrides `https://api.github.com`
    pub github_api_url: Option<String>,
    pub google_sheets_id: Option<String>,
    pub google_sheets_token: Option<String>,
    pub sheets_api_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::try_load_dotenv();

        let utc_offset_hours = match env::var("NEWSDESK_UTC_OFFSET") {
            Ok(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("NEWSDESK_UTC_OFFSET must be whole hours, got {raw:?}"))?,
            Err(_) => 8,
        };

        Ok(Self {
            root: env::var("NEWSDESK_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".")),
            utc_offset_hours,
            news_api_key: non_empty_var("NEWS_API_KEY"),
            gemini_api_key: non_empty_var("GEMINI_API_KEY"),
            gemini_model: var_or("GEMINI_MODEL", "gemini-1.5-flash"),
            openai_api_key: non_empty_var("OPENAI_API_KEY"),
            openai_model: var_or("OPENAI_MODEL", "gpt-4o-mini"),
            publish: PublishConfig {
                slack_webhook_url: non_empty_var("SLACK_WEBHOOK_URL"),
                confluence_token: non_empty_var("CONFLUENCE_TOKEN"),
                confluence_base: non_empty_var("CONFLUENCE_BASE"),
                confluence_space: var_or("CONFLUENCE_SPACE", "AI"),
                figma_token: non_empty_var("FIGMA_TOKEN"),
                figma_file_id: non_empty_var("FIGMA_FILE_ID"),
                github_token: non_empty_var("GITHUB_TOKEN"),
                github_repo: var_or("GITHUB_REPO", "ai-news-database"),
                github_branch: var_or("GITHUB_BRANCH", "main"),
                github_api_url: non_empty_var("GITHUB_API_URL"),
                google_sheets_id: non_empty_var("GOOGLE_SHEETS_ID"),
                google_sheets_token: non_empty_var("GOOGLE_SHEETS_TOKEN"),
                sheets_api_url: non_empty_var("GOOGLE_SHEETS_API_URL"),
            },
        })
    }

    /// A config rooted at `root` with no API keys; everything runs on heuristics
    pub fn offline(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            utc_offset_hours: 8,
            news_api_key: None,
            gemini_api_key: None,
            gemini_model: "gemini-1.5-flash".to_string(),
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            publish: PublishConfig {
                confluence_space: "AI".to_string(),
                github_repo: "ai-news-database".to_string(),
                github_branch: "main".to_string(),
                ..PublishConfig::default()
            },
        }
    }

    /// Editorial timezone; out-of-range offsets fall back to UTC
    pub fn timezone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_hours * 3600)
            .unwrap_or_else(|| Utc.fix())
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn content_dir(&self) -> PathBuf {
        self.root.join("content")
    }

    pub fn load_sources(&self) -> Result<SourcesConfig> {
        load_yaml(&self.config_dir().join("sources.yaml"))
    }

    pub fn load_keywords(&self) -> Result<KeywordsConfig> {
        load_yaml(&self.config_dir().join("keywords.yaml"))
    }

    fn try_load_dotenv() {
        // 1. Current directory
        if dotenvy::dotenv().is_ok() {
            return;
        }

        // 2. ~/.config/newsdesk/.env
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("newsdesk").join(".env");
            if config_path.exists() && dotenvy::from_path(&config_path).is_ok() {
                return;
            }
        }

        // 3. ~/.env
        if let Some(home_dir) = dirs::home_dir() {
            let home_path = home_dir.join(".env");
            if home_path.exists() {
                let _ = dotenvy::from_path(&home_path);
            }
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && v != PLACEHOLDER_KEY)
}

fn var_or(name: &str, default: &str) -> String {
    non_empty_var(name).unwrap_or_else(|| default.to_string())
}

pub fn load_yaml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse YAML from {}", path.display()))
}

/// `config/sources.yaml`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub newsapi: NewsApiSettings,
    #[serde(default)]
    pub rss: RssSettings,
    #[serde(default)]
    pub fallback_hn_algolia: HnSettings,
}

impl SourcesConfig {
    /// Names of enabled sections, in collection order
    pub fn enabled_sources(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.newsapi.enabled {
            out.push("newsapi".to_string());
        }
        if self.rss.enabled {
            out.push("rss".to_string());
        }
        if self.fallback_hn_algolia.enabled {
            out.push("fallback_hn_algolia".to_string());
        }
        out
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewsApiSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_newsapi_query")]
    pub query: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for NewsApiSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            query: default_newsapi_query(),
            language: default_language(),
            page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RssSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub feeds: Vec<String>,
    /// Optional cap on entries taken from each feed
    #[serde(default)]
    pub per_feed_limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HnSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_hn_query")]
    pub query: String,
}

impl Default for HnSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            query: default_hn_query(),
        }
    }
}

fn default_newsapi_query() -> String {
    "artificial intelligence".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_page_size() -> u32 {
    50
}

fn default_hn_query() -> String {
    "ai".to_string()
}

/// `config/keywords.yaml`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeywordsConfig {
    #[serde(default)]
    pub weights: KeywordGroups,
    #[serde(default)]
    pub boost_publishers: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeywordGroups {
    #[serde(default)]
    pub technical_breakthrough: Vec<String>,
    #[serde(default)]
    pub industry_impact: Vec<String>,
    #[serde(default)]
    pub practical_value: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sources_defaults_when_sections_missing() {
        let cfg: SourcesConfig = serde_yaml::from_str("newsapi:\n  enabled: true\n").unwrap();
        assert!(cfg.newsapi.enabled);
        assert_eq!(cfg.newsapi.query, "artificial intelligence");
        assert_eq!(cfg.newsapi.page_size, 50);
        assert!(!cfg.rss.enabled);
        assert_eq!(cfg.fallback_hn_algolia.query, "ai");
        assert_eq!(cfg.enabled_sources(), vec!["newsapi".to_string()]);
    }

    #[test]
    fn test_keywords_parse() {
        let yaml = r#"
weights:
  technical_breakthrough: ["model", "benchmark"]
  industry_impact: ["funding"]
  practical_value: ["tool"]
boost_publishers: ["OpenAI"]
"#;
        let cfg: KeywordsConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.weights.technical_breakthrough.len(), 2);
        assert_eq!(cfg.boost_publishers, vec!["OpenAI".to_string()]);
    }

    #[test]
    fn test_load_yaml_reports_path() {
        let err = load_yaml::<SourcesConfig>(Path::new("/nonexistent/sources.yaml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/sources.yaml"));
    }
}
