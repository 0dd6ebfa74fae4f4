use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use super::{http_client, Collector};
use crate::config::NewsApiSettings;
use crate::models::{normalize_article, Article};

const NEWSAPI_BASE_URL: &str = "https://newsapi.org";

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    #[serde(default)]
    articles: Vec<NewsApiArticle>,
}

#[derive(Debug, Deserialize)]
struct NewsApiArticle {
    source: Option<NewsApiSource>,
    title: Option<String>,
    url: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsApiSource {
    name: Option<String>,
}

pub struct NewsApiCollector {
    client: Client,
    api_key: String,
    settings: NewsApiSettings,
    base_url: String,
}

impl NewsApiCollector {
    pub fn new(api_key: String, settings: NewsApiSettings) -> Result<Self> {
        Ok(Self {
            client: http_client(30)?,
            api_key,
            settings,
            base_url: NEWSAPI_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Collector for NewsApiCollector {
    fn name(&self) -> &'static str {
        "newsapi"
    }

    async fn collect(&self) -> Result<Vec<Article>> {
        let url = format!(
            "{}/v2/everything?q={}&language={}&pageSize={}&sortBy=publishedAt",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(&self.settings.query),
            urlencoding::encode(&self.settings.language),
            self.settings.page_size
        );

        let response = self
            .client
            .get(&url)
            .header("X-Api-Key", &self.api_key)
            .send()
            .await
            .context("Failed to fetch articles from NewsAPI")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unknown error"));
            anyhow::bail!("NewsAPI returned error: {} - {}", status, error_text);
        }

        let body = response
            .json::<NewsApiResponse>()
            .await
            .context("Failed to parse NewsAPI response")?;

        let articles: Vec<Article> = body
            .articles
            .into_iter()
            .map(|a| {
                let source = a
                    .source
                    .and_then(|s| s.name)
                    .unwrap_or_else(|| "NewsAPI".to_string());
                normalize_article(
                    a.title.as_deref(),
                    a.url.as_deref(),
                    a.published_at.as_deref(),
                    &source,
                    a.description.as_deref(),
                )
            })
            .collect();

        info!("NewsAPI 取得 {} 則", articles.len());
        Ok(articles)
    }
}
