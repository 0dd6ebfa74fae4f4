use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A collected news item, normalized across sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub url: String,
    pub published_at: String,
    pub source: String,
    #[serde(default)]
    pub summary: String,
}

impl Article {
    pub fn published(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.published_at)
    }
}

/// A scored article waiting on the editor's decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: usize,
    pub article_id: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    pub source: String,
    pub url: String,
    pub published_at: String,
    pub category: String,
    pub key_point: String,
    pub key_data: String,
    pub tech_score: u8,
    pub impact_score: u8,
    pub practical_score: u8,
    pub timely_score: u8,
    pub total_score: f64,
    pub hours_ago: String,
    pub cluster_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merged_urls: Vec<String>,
}

/// Written next to raw_news.json after every collection run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionMetadata {
    pub collected_at: String,
    pub count: usize,
    pub sources: Vec<String>,
}

impl CollectionMetadata {
    pub fn new(count: usize, sources: Vec<String>) -> Self {
        Self {
            collected_at: Utc::now().to_rfc3339(),
            count,
            sources,
        }
    }
}

/// Build an [`Article`] from loosely-typed source fields.
///
/// The id is derived from the url, falling back to the title and then the
/// timestamp so that every article gets a stable key.
pub fn normalize_article(
    title: Option<&str>,
    url: Option<&str>,
    published_at: Option<&str>,
    source: &str,
    summary: Option<&str>,
) -> Article {
    let published_at = published_at
        .and_then(parse_timestamp)
        .unwrap_or_else(Utc::now)
        .to_rfc3339();

    let title = title.unwrap_or_default().trim().to_string();
    let url = url.unwrap_or_default().trim().to_string();

    let key = [url.as_str(), title.as_str(), published_at.as_str()]
        .into_iter()
        .find(|s| !s.is_empty())
        .unwrap_or_default();

    Article {
        id: hash_key(key),
        title,
        url,
        published_at,
        source: source.to_string(),
        summary: summary.unwrap_or_default().trim().to_string(),
    }
}

pub fn hash_key(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Parse the timestamp shapes the collectors run into
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// `YYYY-MM-DD` for display, or the first ten characters when unparsable
pub fn display_date(raw: &str) -> String {
    match parse_timestamp(raw) {
        Some(dt) => dt.date_naive().to_string(),
        None => raw.chars().take(10).collect(),
    }
}
