use anyhow::{Context, Result};
use reqwest::Client;
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::warn;
use url::Url;

const MIN_PARAGRAPH_CHARS: usize = 40;

/// Pulls supporting text out of article pages for `#補證據`
pub struct EvidenceExtractor {
    client: Client,
    semaphore: Arc<Semaphore>,
    max_chars: usize,
    retry_delay: Duration,
}

impl EvidenceExtractor {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (compatible; Newsdesk/1.0)")
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            semaphore: Arc::new(Semaphore::new(10)),
            max_chars: 600,
            retry_delay: Duration::from_millis(500),
        })
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Evidence text for `url`, or `None` when the page is unreachable or empty
    pub async fn fetch_evidence(&self, url: &str) -> Result<Option<String>> {
        match Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => {
                warn!(url, "not an http(s) url, skipping evidence");
                return Ok(None);
            }
        }

        let _permit = self.semaphore.acquire().await?;

        for attempt in 0..3 {
            match self.try_fetch(url).await {
                Ok(evidence) => return Ok(evidence),
                Err(e) => {
                    if attempt == 2 {
                        warn!(url, error = %e, "failed to fetch evidence");
                        return Ok(None);
                    }
                    tokio::time::sleep(self.retry_delay * 2_u32.pow(attempt)).await;
                }
            }
        }

        Ok(None)
    }

    async fn try_fetch(&self, url: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send HTTP request")?;

        let status = response.status();
        if status == 401 || status == 403 || status == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            anyhow::bail!("HTTP error: {}", status);
        }

        let html = response.text().await.context("Failed to read response body")?;
        Ok(extract_evidence(&html, self.max_chars))
    }
}

/// Meta description followed by the first substantial paragraphs, capped at `max_chars`
pub fn extract_evidence(html: &str, max_chars: usize) -> Option<String> {
    let document = Html::parse_document(html);
    let mut pieces: Vec<String> = Vec::new();

    if let Ok(meta) = Selector::parse(r#"meta[name="description"], meta[property="og:description"]"#) {
        if let Some(content) = document
            .select(&meta)
            .filter_map(|m| m.value().attr("content"))
            .map(collapse_whitespace)
            .find(|c| !c.is_empty())
        {
            pieces.push(content);
        }
    }

    if let Ok(paragraphs) = Selector::parse("article p, main p, p") {
        for p in document.select(&paragraphs) {
            let text = collapse_whitespace(&p.text().collect::<String>());
            if text.chars().count() >= MIN_PARAGRAPH_CHARS && !pieces.contains(&text) {
                pieces.push(text);
            }
            if pieces.iter().map(|s| s.chars().count()).sum::<usize>() >= max_chars {
                break;
            }
        }
    }

    let joined = pieces.join(" ");
    if joined.trim().is_empty() {
        return None;
    }
    Some(truncate_chars(&joined, max_chars))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    const PAGE: &str = r#"<html><head>
<meta name="description" content="Lab releases an   open model.">
</head><body>
<nav><p>Home</p></nav>
<article>
<p>The model scores 87 percent on the reasoning benchmark, up from 71 percent last year.</p>
<p>short</p>
<p>Weights are available under an Apache 2.0 licence for commercial use starting today.</p>
</article>
</body></html>"#;

    #[test]
    fn test_extract_evidence_combines_meta_and_paragraphs() {
        let text = extract_evidence(PAGE, 1000).unwrap();
        assert!(text.starts_with("Lab releases an open model."));
        assert!(text.contains("87 percent"));
        assert!(text.contains("Apache 2.0"));
        assert!(!text.contains("short"));
        assert!(!text.contains("Home"));
    }

    #[test]
    fn test_extract_evidence_truncates() {
        let text = extract_evidence(PAGE, 20).unwrap();
        assert!(text.ends_with("..."));
        assert!(text.chars().count() <= 23);
    }

    #[test]
    fn test_extract_evidence_empty_page() {
        assert_eq!(extract_evidence("<html><body></body></html>", 100), None);
    }

    #[tokio::test]
    async fn test_fetch_evidence() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/story");
                then.status(200).body(PAGE);
            })
            .await;

        let extractor = EvidenceExtractor::new().unwrap();
        let text = extractor
            .fetch_evidence(&server.url("/story"))
            .await
            .unwrap()
            .unwrap();
        assert!(text.contains("benchmark"));
    }

    #[tokio::test]
    async fn test_fetch_evidence_skips_non_http_urls() {
        let extractor = EvidenceExtractor::new().unwrap();
        assert_eq!(extractor.fetch_evidence("").await.unwrap(), None);
        assert_eq!(
            extractor.fetch_evidence("ftp://example.com/a").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_fetch_evidence_not_found_is_none() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/gone");
                then.status(404);
            })
            .await;

        let extractor = EvidenceExtractor::new().unwrap();
        assert_eq!(extractor.fetch_evidence(&server.url("/gone")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fetch_evidence_server_error_gives_none() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/down");
                then.status(502);
            })
            .await;

        let extractor = EvidenceExtractor::new()
            .unwrap()
            .with_retry_delay(Duration::ZERO);
        assert_eq!(extractor.fetch_evidence(&server.url("/down")).await.unwrap(), None);
    }
}
