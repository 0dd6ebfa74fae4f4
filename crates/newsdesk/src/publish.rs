//! Outbound integrations run after stage 2: Slack, Confluence, Figma,
//! a GitHub-backed archive and a Google Sheet feeding the design team.

use anyhow::{Context, Result};
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::PublishConfig;
use crate::formats::{parse_design_rows, Formats};

const GITHUB_API_URL: &str = "https://api.github.com";
const SHEETS_API_URL: &str = "https://sheets.googleapis.com";
const SHEET_NAME: &str = "AI_News_Format_C";

fn publish_client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(10))
        .user_agent("newsdesk-publisher")
        .build()
        .context("Failed to create HTTP client")
}

pub struct Publisher {
    client: Client,
    config: PublishConfig,
}

impl Publisher {
    pub fn new(config: PublishConfig) -> Result<Self> {
        Ok(Self {
            client: publish_client()?,
            config,
        })
    }

    /// `Ok(false)` when no webhook is configured or Slack rejects the message
    pub async fn notify_slack(&self, message: &str) -> Result<bool> {
        let Some(webhook) = &self.config.slack_webhook_url else {
            info!("Slack Webhook 未設定，跳過通知。");
            return Ok(false);
        };
        let response = self
            .client
            .post(webhook)
            .json(&json!({ "text": message }))
            .send()
            .await
            .context("Failed to post Slack notification")?;
        info!(status = %response.status(), "Slack 通知狀態");
        Ok(response.status().is_success())
    }

    /// Only checks configuration; no page is created
    pub fn publish_to_confluence(&self, title: &str) -> bool {
        match (&self.config.confluence_token, &self.config.confluence_base) {
            (Some(_), Some(_)) => {
                info!(
                    "[Confluence] would publish: {} to space {}",
                    title, self.config.confluence_space
                );
                true
            }
            _ => {
                info!("Confluence 未設定，跳過發布。");
                false
            }
        }
    }

    /// Only checks configuration; the file is not touched
    pub fn update_figma(&self, payload: &str) -> bool {
        match (&self.config.figma_token, &self.config.figma_file_id) {
            (Some(_), Some(file_id)) => {
                info!(
                    "[Figma] would update file: {} with payload length {}",
                    file_id,
                    payload.chars().count()
                );
                true
            }
            _ => {
                info!("Figma 未設定，跳過更新。");
                false
            }
        }
    }
}

#[derive(Deserialize)]
struct ContentsEntry {
    sha: String,
}

/// Files committed through the GitHub contents API
pub struct GitHubStore {
    client: Client,
    token: String,
    repo: String,
    branch: String,
    api_url: String,
}

impl GitHubStore {
    pub fn new(token: String, repo: String, branch: String) -> Result<Self> {
        Ok(Self {
            client: publish_client()?,
            token,
            repo,
            branch,
            api_url: GITHUB_API_URL.to_string(),
        })
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/contents/{}",
            self.api_url.trim_end_matches('/'),
            self.repo,
            path
        )
    }

    async fn existing_sha(&self, path: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(self.contents_url(path))
            .query(&[("ref", self.branch.as_str())])
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .context("Failed to query GitHub contents")?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let entry = response
                    .json::<ContentsEntry>()
                    .await
                    .context("Failed to parse GitHub contents response")?;
                Ok(Some(entry.sha))
            }
            status => anyhow::bail!("GitHub contents lookup failed: {}", status),
        }
    }

    /// Create `path`, or update it in place when it already exists
    pub async fn put_file(&self, path: &str, content: &str, message: &str) -> Result<()> {
        let sha = self.existing_sha(path).await?;
        let body = contents_body(content, message, &self.branch, sha.as_deref());

        let response = self
            .client
            .put(self.contents_url(path))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .json(&body)
            .send()
            .await
            .context("Failed to write GitHub contents")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unknown error"));
            anyhow::bail!("GitHub contents write failed: {} - {}", status, error_text);
        }
        Ok(())
    }

    pub async fn save_format_a(&self, format_a: &str, date: &str) -> Result<String> {
        let path = format!("content/{date}/format_a_social_tw.md");
        self.put_file(&path, format_a, &format!("Add AI news format A - {date}"))
            .await?;
        Ok(path)
    }

    pub async fn create_database_entry<T: Serialize>(&self, items: &[T], date: &str) -> Result<String> {
        let entry = json!({
            "date": date,
            "timestamp": date,
            "news_count": items.len(),
            "news_items": items,
            "format": "social_media",
            "language": "zh-TW",
        });
        let content = serde_json::to_string_pretty(&entry).context("Failed to serialize database entry")?;
        let path = format!("database/{date}/news_data.json");
        self.put_file(&path, &content, &format!("Add news database entry - {date}"))
            .await?;
        Ok(path)
    }
}

fn contents_body(content: &str, message: &str, branch: &str, sha: Option<&str>) -> Value {
    let mut body = json!({
        "message": message,
        "content": base64::engine::general_purpose::STANDARD.encode(content),
        "branch": branch,
    });
    if let Some(sha) = sha {
        body["sha"] = Value::from(sha);
    }
    body
}

/// The `AI_News_Format_C` sheet
pub struct SheetsStore {
    client: Client,
    spreadsheet_id: String,
    token: String,
    api_url: String,
}

impl SheetsStore {
    pub fn new(spreadsheet_id: String, token: String) -> Result<Self> {
        Ok(Self {
            client: publish_client()?,
            spreadsheet_id,
            token,
            api_url: SHEETS_API_URL.to_string(),
        })
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Replace the sheet with a header row and one row per Format C item
    pub async fn update_format_c(&self, format_c: &str, date: &str) -> Result<usize> {
        let base = format!(
            "{}/v4/spreadsheets/{}/values",
            self.api_url.trim_end_matches('/'),
            self.spreadsheet_id
        );

        self.client
            .post(format!("{base}/{SHEET_NAME}:clear"))
            .bearer_auth(&self.token)
            .json(&json!({}))
            .send()
            .await
            .context("Failed to clear sheet")?
            .error_for_status()
            .context("Sheets API rejected the clear request")?;

        let rows = sheet_rows(format_c, date);
        let count = rows.len() - 1;
        self.client
            .put(format!("{base}/{SHEET_NAME}!A1"))
            .query(&[("valueInputOption", "RAW")])
            .bearer_auth(&self.token)
            .json(&json!({ "values": rows }))
            .send()
            .await
            .context("Failed to write sheet rows")?
            .error_for_status()
            .context("Sheets API rejected the update")?;

        Ok(count)
    }
}

fn sheet_rows(format_c: &str, date: &str) -> Vec<Vec<String>> {
    let mut rows = vec![vec![
        "日期".to_string(),
        "類別".to_string(),
        "精煉重點".to_string(),
    ]];
    rows.extend(
        parse_design_rows(format_c)
            .into_iter()
            .map(|(category, point)| vec![date.to_string(), category, point]),
    );
    rows
}

/// Which integrations succeeded in one [`DatabaseManager::save_results`] call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SaveReport {
    pub github_format_a: bool,
    pub google_sheets: bool,
    pub github_database: bool,
}

pub struct DatabaseManager {
    github: Option<GitHubStore>,
    sheets: Option<SheetsStore>,
}

impl DatabaseManager {
    pub fn new(github: Option<GitHubStore>, sheets: Option<SheetsStore>) -> Self {
        Self { github, sheets }
    }

    pub fn from_config(config: &PublishConfig) -> Result<Self> {
        let github = match &config.github_token {
            Some(token) => {
                let store = GitHubStore::new(
                    token.clone(),
                    config.github_repo.clone(),
                    config.github_branch.clone(),
                )?;
                Some(match &config.github_api_url {
                    Some(url) => store.with_api_url(url.clone()),
                    None => store,
                })
            }
            None => {
                info!("GITHUB_TOKEN 未設定，跳過 GitHub 整合");
                None
            }
        };
        let sheets = match (&config.google_sheets_id, &config.google_sheets_token) {
            (Some(id), Some(token)) => {
                let store = SheetsStore::new(id.clone(), token.clone())?;
                Some(match &config.sheets_api_url {
                    Some(url) => store.with_api_url(url.clone()),
                    None => store,
                })
            }
            _ => {
                info!("GOOGLE_SHEETS_ID 未設定，跳過 Google Sheets 整合");
                None
            }
        };
        Ok(Self::new(github, sheets))
    }

    /// Run every configured integration; failures are logged, never fatal
    pub async fn save_results<T: Serialize>(
        &self,
        format_a: &str,
        format_c: &str,
        items: &[T],
        date: &str,
    ) -> SaveReport {
        let mut report = SaveReport::default();

        if let Some(github) = &self.github {
            if !format_a.is_empty() {
                match github.save_format_a(format_a, date).await {
                    Ok(path) => {
                        info!("✅ 格式 A 已儲存到 GitHub: {}", path);
                        report.github_format_a = true;
                    }
                    Err(e) => warn!("❌ 儲存到 GitHub 失敗: {:#}", e),
                }
            }
        }

        if let Some(sheets) = &self.sheets {
            if !format_c.is_empty() {
                match sheets.update_format_c(format_c, date).await {
                    Ok(rows) => {
                        info!("✅ 格式 C 已更新到 Google Sheets ({} 列)", rows);
                        report.google_sheets = true;
                    }
                    Err(e) => warn!("❌ 更新 Google Sheets 失敗: {:#}", e),
                }
            }
        }

        if let Some(github) = &self.github {
            if !items.is_empty() {
                match github.create_database_entry(items, date).await {
                    Ok(path) => {
                        info!("✅ 資料庫條目已建立: {}", path);
                        report.github_database = true;
                    }
                    Err(e) => warn!("❌ 建立資料庫條目失敗: {:#}", e),
                }
            }
        }

        report
    }
}

/// Everything `--publish` does after the formats are written
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PublishReport {
    pub slack: bool,
    pub confluence: bool,
    pub figma: bool,
    pub database: SaveReport,
}

pub async fn publish_all<T: Serialize>(
    config: &PublishConfig,
    formats: &Formats,
    items: &[T],
    date: &str,
) -> Result<PublishReport> {
    let publisher = Publisher::new(config.clone())?;
    let database = DatabaseManager::from_config(config)?;

    let slack = match publisher
        .notify_slack(&format!("📰 AI 新聞 {date} 已產出 {} 則", items.len()))
        .await
    {
        Ok(ok) => ok,
        Err(e) => {
            warn!("Slack 通知失敗：{:#}", e);
            false
        }
    };

    Ok(PublishReport {
        slack,
        confluence: publisher.publish_to_confluence(&format!("AI 新聞 {date}")),
        figma: publisher.update_figma(&formats.format_c),
        database: database
            .save_results(&formats.format_a, &formats.format_c, items, date)
            .await,
    })
}
