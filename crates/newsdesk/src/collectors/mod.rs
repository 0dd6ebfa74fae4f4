//! News collectors.
//!
//! Each source implements [`Collector`]; [`collect_all`] runs them in order
//! and treats a failing source as an empty one so a single outage never
//! sinks the daily run.

pub mod hn;
pub mod newsapi;
pub mod rss;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashSet;
use tracing::{info, warn};

use crate::config::SourcesConfig;
use crate::models::Article;

pub use hn::HnAlgoliaCollector;
pub use newsapi::NewsApiCollector;
pub use rss::RssCollector;

const TITLE_KEY_CHARS: usize = 120;

#[async_trait]
pub trait Collector: Send + Sync {
    fn name(&self) -> &'static str;
    async fn collect(&self) -> Result<Vec<Article>>;
}

pub(crate) fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .user_agent("Mozilla/5.0 (compatible; Newsdesk/1.0)")
        .build()
        .context("Failed to create HTTP client")
}

/// Collectors for every enabled section of `sources.yaml`.
///
/// NewsAPI is skipped when no key is configured.
pub fn build_collectors(
    sources: &SourcesConfig,
    news_api_key: Option<&str>,
) -> Result<Vec<Box<dyn Collector>>> {
    let mut collectors: Vec<Box<dyn Collector>> = Vec::new();

    if sources.newsapi.enabled {
        match news_api_key {
            Some(key) => collectors.push(Box::new(NewsApiCollector::new(
                key.to_string(),
                sources.newsapi.clone(),
            )?)),
            None => warn!("NEWS_API_KEY 未設定，跳過 NewsAPI"),
        }
    }

    if sources.rss.enabled {
        collectors.push(Box::new(RssCollector::new(
            sources.rss.feeds.clone(),
            sources.rss.per_feed_limit,
        )?));
    }

    if sources.fallback_hn_algolia.enabled {
        collectors.push(Box::new(HnAlgoliaCollector::new(
            sources.fallback_hn_algolia.query.clone(),
        )?));
    }

    Ok(collectors)
}

/// Collectors for an editor-requested keyword search.
///
/// Hacker News is searched once per keyword; NewsAPI, when a key is present,
/// gets a single OR query.
pub fn build_research_collectors(
    keywords: &[String],
    sources: &SourcesConfig,
    news_api_key: Option<&str>,
) -> Result<Vec<Box<dyn Collector>>> {
    let mut collectors: Vec<Box<dyn Collector>> = Vec::new();
    if keywords.is_empty() {
        return Ok(collectors);
    }

    if let Some(key) = news_api_key {
        let mut settings = sources.newsapi.clone();
        settings.query = keywords.join(" OR ");
        collectors.push(Box::new(NewsApiCollector::new(key.to_string(), settings)?));
    }

    for keyword in keywords {
        collectors.push(Box::new(HnAlgoliaCollector::new(keyword.clone())?));
    }

    Ok(collectors)
}

/// Run every collector in order, then drop duplicates
pub async fn collect_all(collectors: &[Box<dyn Collector>]) -> Vec<Article> {
    let mut all = Vec::new();
    for collector in collectors {
        match collector.collect().await {
            Ok(articles) => {
                info!(source = collector.name(), count = articles.len(), "collected");
                all.extend(articles);
            }
            Err(e) => {
                warn!(source = collector.name(), error = %e, "collector failed");
            }
        }
    }
    dedup(all)
}

/// Keep the first article for each (title prefix, url) pair
pub fn dedup(articles: Vec<Article>) -> Vec<Article> {
    let mut seen = HashSet::new();
    articles
        .into_iter()
        .filter(|a| {
            let title_key: String = a.title.chars().take(TITLE_KEY_CHARS).collect();
            seen.insert((title_key, a.url.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::normalize_article;

    fn article(title: &str, url: &str) -> Article {
        normalize_article(Some(title), Some(url), Some("2026-02-01"), "Test", None)
    }

    struct Fixed(Vec<Article>);

    #[async_trait]
    impl Collector for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }
        async fn collect(&self) -> Result<Vec<Article>> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    #[async_trait]
    impl Collector for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }
        async fn collect(&self) -> Result<Vec<Article>> {
            anyhow::bail!("source down")
        }
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let items = vec![
            article("A", "https://a.com"),
            article("B", "https://b.com"),
            article("A", "https://a.com"),
        ];
        let out = dedup(items);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].title, "A");
        assert_eq!(out[1].title, "B");
    }

    #[test]
    fn test_dedup_same_title_different_url_kept() {
        let items = vec![article("A", "https://a.com"), article("A", "https://a2.com")];
        assert_eq!(dedup(items).len(), 2);
    }

    #[test]
    fn test_dedup_compares_title_prefix_only() {
        let long = "x".repeat(130);
        let longer = format!("{}yyy", "x".repeat(130));
        let items = vec![article(&long, "https://a.com"), article(&longer, "https://a.com")];
        assert_eq!(dedup(items).len(), 1);
    }

    #[tokio::test]
    async fn test_collect_all_skips_failing_sources() {
        let collectors: Vec<Box<dyn Collector>> = vec![
            Box::new(Fixed(vec![article("A", "https://a.com")])),
            Box::new(Broken),
            Box::new(Fixed(vec![
                article("A", "https://a.com"),
                article("C", "https://c.com"),
            ])),
        ];
        let out = collect_all(&collectors).await;
        let titles: Vec<_> = out.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "C"]);
    }

    #[test]
    fn test_build_collectors_skips_newsapi_without_key() {
        let sources: SourcesConfig = serde_yaml::from_str(
            "newsapi:\n  enabled: true\nfallback_hn_algolia:\n  enabled: true\n",
        )
        .unwrap();
        let collectors = build_collectors(&sources, None).unwrap();
        let names: Vec<_> = collectors.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["hn_algolia"]);
    }

    #[test]
    fn test_research_collectors_one_hn_per_keyword() {
        let keywords = vec!["agents".to_string(), "robotics".to_string()];
        let collectors =
            build_research_collectors(&keywords, &SourcesConfig::default(), Some("key")).unwrap();
        let names: Vec<_> = collectors.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["newsapi", "hn_algolia", "hn_algolia"]);
    }
}
