use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, warn};

use super::{http_client, Collector};
use crate::models::{normalize_article, Article};

/// RSS and Atom feeds listed in `sources.yaml`
pub struct RssCollector {
    client: Client,
    feeds: Vec<String>,
    per_feed_limit: Option<usize>,
}

impl RssCollector {
    pub fn new(feeds: Vec<String>, per_feed_limit: Option<usize>) -> Result<Self> {
        Ok(Self {
            client: http_client(30)?,
            feeds,
            per_feed_limit,
        })
    }

    async fn fetch_feed(&self, url: &str) -> Result<Vec<Article>> {
        let bytes = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to fetch feed")?
            .error_for_status()
            .context("Feed returned an error status")?
            .bytes()
            .await
            .context("Failed to read feed body")?;

        let feed = feed_rs::parser::parse(&bytes[..]).context("Failed to parse feed")?;
        let feed_title = feed
            .title
            .as_ref()
            .map(|t| t.content.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "RSS".to_string());

        let limit = self.per_feed_limit.unwrap_or(usize::MAX);
        Ok(feed
            .entries
            .into_iter()
            .take(limit)
            .map(|entry| {
                let title = entry.title.as_ref().map(|t| t.content.as_str());
                let link = entry.links.first().map(|l| l.href.as_str());
                let published = entry.published.or(entry.updated).map(|d| d.to_rfc3339());
                let summary = entry.summary.as_ref().map(|s| s.content.as_str());
                normalize_article(title, link, published.as_deref(), &feed_title, summary)
            })
            .collect())
    }
}

#[async_trait]
impl Collector for RssCollector {
    fn name(&self) -> &'static str {
        "rss"
    }

    async fn collect(&self) -> Result<Vec<Article>> {
        let mut out = Vec::new();
        for url in &self.feeds {
            match self.fetch_feed(url).await {
                Ok(articles) => out.extend(articles),
                Err(e) => warn!(feed = %url, error = %e, "RSS 讀取錯誤"),
            }
        }
        info!("RSS 取得 {} 則", out.len());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    const RSS_BODY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>AI Weekly</title>
    <link>https://aiweekly.example</link>
    <description>news</description>
    <item>
      <title>Open weights model tops benchmark</title>
      <link>https://aiweekly.example/1</link>
      <pubDate>Sun, 01 Feb 2026 15:30:00 +0000</pubDate>
      <description>Benchmarks inside</description>
    </item>
    <item>
      <title>Second story</title>
      <link>https://aiweekly.example/2</link>
    </item>
  </channel>
</rss>"#;

    const ATOM_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Lab Blog</title>
  <id>urn:lab</id>
  <updated>2026-02-01T12:00:00Z</updated>
  <entry>
    <title>Research note</title>
    <id>urn:lab:1</id>
    <link href="https://lab.example/note"/>
    <updated>2026-02-01T12:00:00Z</updated>
    <summary>Findings</summary>
  </entry>
</feed>"#;

    #[tokio::test]
    async fn test_reads_rss_and_atom_and_skips_broken_feeds() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/rss.xml");
                then.status(200).body(RSS_BODY);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/atom.xml");
                then.status(200).body(ATOM_BODY);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/broken.xml");
                then.status(500);
            })
            .await;

        let collector = RssCollector::new(
            vec![
                server.url("/rss.xml"),
                server.url("/broken.xml"),
                server.url("/atom.xml"),
            ],
            None,
        )
        .unwrap();
        let articles = collector.collect().await.unwrap();

        assert_eq!(articles.len(), 3);
        assert_eq!(articles[0].source, "AI Weekly");
        assert_eq!(articles[0].url, "https://aiweekly.example/1");
        assert_eq!(articles[0].published_at, "2026-02-01T15:30:00+00:00");
        assert_eq!(articles[0].summary, "Benchmarks inside");
        assert_eq!(articles[2].source, "Lab Blog");
        assert_eq!(articles[2].url, "https://lab.example/note");
    }

    #[tokio::test]
    async fn test_per_feed_limit() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/rss.xml");
                then.status(200).body(RSS_BODY);
            })
            .await;

        let collector = RssCollector::new(vec![server.url("/rss.xml")], Some(1)).unwrap();
        let articles = collector.collect().await.unwrap();
        assert_eq!(articles.len(), 1);
    }
}
