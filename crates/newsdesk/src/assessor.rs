//! Stage-1 scoring: turns collected articles into ranked candidates.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::KeywordsConfig;
use crate::llm::{extract_json, LlmClient};
use crate::models::{Article, Candidate};
use crate::scoring::{self, heuristic_criteria, Weights};

pub const DEFAULT_MAX_CANDIDATES: usize = 20;
const CLUSTER_THRESHOLD: f64 = 0.5;
const KEY_POINT_CHARS: usize = 30;

pub struct Assessor {
    llm: Option<Arc<dyn LlmClient>>,
    keywords: KeywordsConfig,
    today: String,
    max_candidates: usize,
}

impl Assessor {
    pub fn new(llm: Option<Arc<dyn LlmClient>>, keywords: KeywordsConfig, today: String) -> Self {
        Self {
            llm,
            keywords,
            today,
            max_candidates: DEFAULT_MAX_CANDIDATES,
        }
    }

    pub fn with_max_candidates(mut self, max_candidates: usize) -> Self {
        self.max_candidates = max_candidates;
        self
    }

    /// Score the leading articles and return them ranked under `weights`
    pub async fn assess(
        &self,
        articles: &[Article],
        weights: &Weights,
        now: DateTime<Utc>,
    ) -> Vec<Candidate> {
        let head = &articles[..articles.len().min(self.max_candidates)];

        let mut candidates = match &self.llm {
            Some(llm) => {
                let scored = self.llm_candidates(llm.as_ref(), head, now).await;
                if scored.is_empty() && !head.is_empty() {
                    warn!("LLM scoring produced no candidates, using keyword heuristics");
                    self.heuristic_candidates(head, now)
                } else {
                    scored
                }
            }
            None => self.heuristic_candidates(head, now),
        };

        scoring::rank(&mut candidates, weights);
        candidates
    }

    async fn llm_candidates(
        &self,
        llm: &dyn LlmClient,
        articles: &[Article],
        now: DateTime<Utc>,
    ) -> Vec<Candidate> {
        let futures: Vec<_> = articles
            .iter()
            .enumerate()
            .map(|(i, article)| async move {
                let prompt = assessment_prompt(article, &self.today);
                match llm.generate(&prompt, 0.2).await {
                    Ok(reply) => match parse_assessment(&reply, article, i, now) {
                        Ok(candidate) => {
                            info!("已評分第 {} 篇", i + 1);
                            Some(candidate)
                        }
                        Err(e) => {
                            warn!("處理新聞 {} 時出錯: {:#}", i + 1, e);
                            None
                        }
                    },
                    Err(e) => {
                        warn!("處理新聞 {} 時出錯: {:#}", i + 1, e);
                        None
                    }
                }
            })
            .collect();
        let results: Vec<Option<Candidate>> = stream::iter(futures).buffered(2).collect().await;

        results.into_iter().flatten().collect()
    }

    fn heuristic_candidates(&self, articles: &[Article], now: DateTime<Utc>) -> Vec<Candidate> {
        let clusters = cluster_ids(articles);
        articles
            .iter()
            .zip(clusters)
            .enumerate()
            .map(|(i, (article, cluster_id))| {
                let criteria = heuristic_criteria(article, &self.keywords, now);
                Candidate {
                    id: i + 1,
                    article_id: article.id.clone(),
                    title: article.title.clone(),
                    summary: article.summary.clone(),
                    source: article.source.clone(),
                    url: article.url.clone(),
                    published_at: article.published_at.clone(),
                    category: criteria.category,
                    key_point: article.title.chars().take(KEY_POINT_CHARS).collect(),
                    key_data: "—".to_string(),
                    tech_score: criteria.tech,
                    impact_score: criteria.impact,
                    practical_score: criteria.practical,
                    timely_score: criteria.timely,
                    total_score: 0.0,
                    hours_ago: hours_ago(&article.published_at, now),
                    cluster_id,
                    evidence: None,
                    merged_urls: Vec::new(),
                }
            })
            .collect()
    }
}

fn assessment_prompt(article: &Article, today: &str) -> String {
    format!(
        r#"你是一位專業的 AI 產業內容策展人與創新實踐者。

請以 繁體中文、時區 Asia/Taipei，依 [今天日期：{today}] 對以下新聞進行評分與分類：

標題：{title}
摘要：{summary}
來源：{source}
時間：{published}
URL：{url}

請輸出 JSON 格式：
{{
    "category": "模型發布/AI開發工具/企業應用/重大融資/研究突破",
    "key_point": "一句重點（≤30字）",
    "key_data": "關鍵數據（最多3個「指標:數值」；缺則寫「—」）",
    "tech_score": 0-5,
    "impact_score": 0-5,
    "practical_score": 0-5,
    "timely_score": 0-5,
    "total_score": "四項加權求和，保留1位小數",
    "hours_ago": "距今幾小時",
    "cluster_id": "同題相同ID（如果與其他新聞相同）"
}}"#,
        title = article.title,
        summary = article.summary,
        source = article.source,
        published = article.published_at,
        url = article.url,
    )
}

fn parse_assessment(
    reply: &str,
    article: &Article,
    index: usize,
    now: DateTime<Utc>,
) -> Result<Candidate> {
    let json = extract_json(reply).context("reply contains no JSON object")?;
    let data: Value = serde_json::from_str(json).context("reply JSON is malformed")?;

    let text = |key: &str| -> Option<String> {
        match data.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    };

    Ok(Candidate {
        id: index + 1,
        article_id: article.id.clone(),
        title: article.title.clone(),
        summary: article.summary.clone(),
        source: article.source.clone(),
        url: article.url.clone(),
        published_at: article.published_at.clone(),
        category: text("category").unwrap_or_else(|| "其他".to_string()),
        key_point: text("key_point").unwrap_or_default(),
        key_data: text("key_data").unwrap_or_else(|| "—".to_string()),
        tech_score: criterion(data.get("tech_score")),
        impact_score: criterion(data.get("impact_score")),
        practical_score: criterion(data.get("practical_score")),
        timely_score: criterion(data.get("timely_score")),
        total_score: 0.0,
        hours_ago: text("hours_ago").unwrap_or_else(|| hours_ago(&article.published_at, now)),
        cluster_id: text("cluster_id").unwrap_or_else(|| format!("cluster_{index}")),
        evidence: None,
        merged_urls: Vec::new(),
    })
}

/// A 0-5 score from a number or numeric string; anything else is 0
fn criterion(value: Option<&Value>) -> u8 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    };
    raw.round().clamp(0.0, 5.0) as u8
}

/// Whole hours between publication and `now`; empty when the timestamp is unparsable
pub fn hours_ago(published_at: &str, now: DateTime<Utc>) -> String {
    crate::models::parse_timestamp(published_at)
        .map(|p| (now - p).num_hours().max(0).to_string())
        .unwrap_or_default()
}

/// Cluster ids by title overlap: an article joins the first earlier cluster
/// whose member shares at least half of the combined title tokens.
pub fn cluster_ids(articles: &[Article]) -> Vec<String> {
    let token_sets: Vec<HashSet<String>> = articles.iter().map(|a| title_tokens(&a.title)).collect();
    let mut ids: Vec<String> = Vec::with_capacity(articles.len());

    for (i, tokens) in token_sets.iter().enumerate() {
        let existing = (0..i)
            .find(|&j| jaccard(tokens, &token_sets[j]) >= CLUSTER_THRESHOLD)
            .map(|j| ids[j].clone());
        ids.push(existing.unwrap_or_else(|| format!("cluster_{i}")));
    }

    ids
}

fn title_tokens(title: &str) -> HashSet<String> {
    title
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 3)
        .map(str::to_string)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    shared / union
}

fn refine_prompt(article: &Article) -> String {
    format!(
        "請針對下列 AI 新聞依規則給出 1~5 分四項評分（tech/impact/practical/timely）：\n標題：{}\n摘要：{}\n來源：{}\n時間：{}\n輸出 JSON：{{\"tech\":x,\"impact\":x,\"practical\":x,\"timely\":x}}",
        article.title, article.summary, article.source, article.published_at
    )
}

/// Sum of the four LLM criterion scores per article; `None` where the call or parse failed
pub async fn refine_scores(llm: &dyn LlmClient, articles: &[Article]) -> Vec<Option<i64>> {
    stream::iter(articles)
        .map(|article| async move {
            let reply = match llm.generate(&refine_prompt(article), 0.2).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(title = %article.title, "re-scoring failed: {:#}", e);
                    return None;
                }
            };
            let data: Value = serde_json::from_str(extract_json(&reply)?).ok()?;
            let mut sum = 0_i64;
            for key in ["tech", "impact", "practical", "timely"] {
                sum += match data.get(key) {
                    Some(Value::Number(n)) => n.as_i64()?,
                    Some(Value::String(s)) => s.trim().parse().ok()?,
                    None => 0,
                    _ => return None,
                };
            }
            Some(sum)
        })
        .buffered(2)
        .collect()
        .await
}
