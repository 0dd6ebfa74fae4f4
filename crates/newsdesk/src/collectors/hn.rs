use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use super::{http_client, Collector};
use crate::models::{normalize_article, Article};

const HN_ALGOLIA_BASE_URL: &str = "https://hn.algolia.com";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    title: Option<String>,
    url: Option<String>,
    created_at: Option<String>,
    #[serde(rename = "objectID")]
    object_id: String,
}

/// Hacker News stories via the Algolia search API
pub struct HnAlgoliaCollector {
    client: Client,
    query: String,
    base_url: String,
}

impl HnAlgoliaCollector {
    pub fn new(query: String) -> Result<Self> {
        Ok(Self {
            client: http_client(20)?,
            query,
            base_url: HN_ALGOLIA_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Collector for HnAlgoliaCollector {
    fn name(&self) -> &'static str {
        "hn_algolia"
    }

    async fn collect(&self) -> Result<Vec<Article>> {
        let url = format!(
            "{}/api/v1/search_by_date?query={}&tags=story",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(&self.query)
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to query HN Algolia")?
            .error_for_status()
            .context("HN Algolia returned an error status")?;

        let body = response
            .json::<SearchResponse>()
            .await
            .context("Failed to parse HN Algolia response")?;

        let articles: Vec<Article> = body
            .hits
            .into_iter()
            .map(|hit| {
                let url = hit
                    .url
                    .filter(|u| !u.is_empty())
                    .unwrap_or_else(|| {
                        format!("https://news.ycombinator.com/item?id={}", hit.object_id)
                    });
                normalize_article(
                    hit.title.as_deref(),
                    Some(&url),
                    hit.created_at.as_deref(),
                    "HackerNews",
                    None,
                )
            })
            .collect();

        info!("HN Algolia 取得 {} 則", articles.len());
        Ok(articles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_missing_url_points_at_discussion() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v1/search_by_date")
                    .query_param("query", "llm agents")
                    .query_param("tags", "story");
                then.status(200).json_body(json!({
                    "hits": [
                        {"title": "Show HN: agent kit", "url": null, "created_at": "2026-02-01T08:00:00.000Z", "objectID": "4242"},
                        {"title": "Paper", "url": "https://arxiv.org/abs/1", "created_at": "2026-02-01T09:00:00.000Z", "objectID": "4243"}
                    ]
                }));
            })
            .await;

        let collector = HnAlgoliaCollector::new("llm agents".to_string())
            .unwrap()
            .with_base_url(server.base_url());
        let articles = collector.collect().await.unwrap();

        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].url, "https://news.ycombinator.com/item?id=4242");
        assert_eq!(articles[0].source, "HackerNews");
        assert_eq!(articles[1].url, "https://arxiv.org/abs/1");
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/search_by_date");
                then.status(503);
            })
            .await;

        let collector = HnAlgoliaCollector::new("ai".to_string())
            .unwrap()
            .with_base_url(server.base_url());
        assert!(collector.collect().await.is_err());
    }
}
