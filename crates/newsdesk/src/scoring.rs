use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::config::KeywordsConfig;
use crate::error::WeightsError;
use crate::models::{Article, Candidate};

const TECH_POINTS: i64 = 10;
const IMPACT_POINTS: i64 = 8;
const PRACTICAL_POINTS: i64 = 7;
const BOOST_POINTS: i64 = 2;
const FRESHNESS_DAYS: i64 = 5;
const MAX_CRITERION: u8 = 5;

/// Percentages applied to the four criterion scores; must sum to 100
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weights {
    pub tech: u32,
    pub impact: u32,
    pub practical: u32,
    pub timely: u32,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            tech: 30,
            impact: 25,
            practical: 25,
            timely: 20,
        }
    }
}

impl Weights {
    pub fn total(&self) -> u32 {
        self.tech + self.impact + self.practical + self.timely
    }

    pub fn validate(&self) -> Result<(), WeightsError> {
        match self.total() {
            100 => Ok(()),
            other => Err(WeightsError::InvalidSum(other)),
        }
    }
}

/// Keyword-weighted heuristic score used by the automatic digest
pub fn rule_score(article: &Article, keywords: &KeywordsConfig, now: DateTime<Utc>) -> i64 {
    let hits = keyword_hits(article, keywords);
    let mut score = hits.tech as i64 * TECH_POINTS
        + hits.impact as i64 * IMPACT_POINTS
        + hits.practical as i64 * PRACTICAL_POINTS;

    score += match article.published() {
        Some(published) => freshness(published, now),
        None => 1,
    };

    let source = article.source.to_lowercase();
    if keywords
        .boost_publishers
        .iter()
        .any(|b| source.contains(&b.to_lowercase()))
    {
        score += BOOST_POINTS;
    }

    score
}

/// Combine a rule score with an LLM four-criterion sum
pub fn blend(rule: i64, refined: i64) -> i64 {
    (0.6 * rule as f64 + 0.8 * refined as f64).round() as i64
}

/// Score, optionally blend, and keep the best `n` articles.
///
/// `refined` lines up with `articles`; `None` keeps the rule score.
pub fn top_articles(
    articles: Vec<Article>,
    keywords: &KeywordsConfig,
    refined: &[Option<i64>],
    n: usize,
    now: DateTime<Utc>,
) -> Vec<(i64, Article)> {
    let mut scored: Vec<(i64, Article)> = articles
        .into_iter()
        .enumerate()
        .map(|(idx, article)| {
            let rule = rule_score(&article, keywords, now);
            let score = match refined.get(idx).copied().flatten() {
                Some(r) => blend(rule, r),
                None => rule,
            };
            (score, article)
        })
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.truncate(n);
    scored
}

/// Weighted sum of the four criteria, rounded to one decimal
///
/// Each term is `score * weight / 100` and the float sum is rounded as
/// written, so a sum that lands just below a half rounds down.
pub fn weighted_total(candidate: &Candidate, weights: &Weights) -> f64 {
    let term = |score: u8, weight: u32| score as f64 * weight as f64 / 100.0;
    let total = term(candidate.tech_score, weights.tech)
        + term(candidate.impact_score, weights.impact)
        + term(candidate.practical_score, weights.practical)
        + term(candidate.timely_score, weights.timely);
    format!("{total:.1}").parse().unwrap_or(total)
}

/// Recompute totals, sort best-first and renumber ids from 1.
///
/// The sort is stable, so equal totals keep their previous relative order.
pub fn rank(candidates: &mut [Candidate], weights: &Weights) {
    for candidate in candidates.iter_mut() {
        candidate.total_score = weighted_total(candidate, weights);
    }
    candidates.sort_by(|a, b| {
        b.total_score
            .partial_cmp(&a.total_score)
            .unwrap_or(Ordering::Equal)
    });
    for (idx, candidate) in candidates.iter_mut().enumerate() {
        candidate.id = idx + 1;
    }
}

/// Per-criterion scores derived without an LLM
#[derive(Debug, Clone, PartialEq)]
pub struct Criteria {
    pub tech: u8,
    pub impact: u8,
    pub practical: u8,
    pub timely: u8,
    pub category: String,
}

pub fn heuristic_criteria(
    article: &Article,
    keywords: &KeywordsConfig,
    now: DateTime<Utc>,
) -> Criteria {
    let hits = keyword_hits(article, keywords);
    let timely = article
        .published()
        .map(|p| freshness(p, now))
        .unwrap_or(1);

    let category = if hits.tech == 0 && hits.impact == 0 && hits.practical == 0 {
        "其他"
    } else if hits.tech >= hits.impact && hits.tech >= hits.practical {
        "研究突破"
    } else if hits.impact >= hits.practical {
        "企業應用"
    } else {
        "AI開發工具"
    };

    Criteria {
        tech: criterion(hits.tech),
        impact: criterion(hits.impact),
        practical: criterion(hits.practical),
        timely: timely.clamp(0, MAX_CRITERION as i64) as u8,
        category: category.to_string(),
    }
}

struct Hits {
    tech: usize,
    impact: usize,
    practical: usize,
}

fn keyword_hits(article: &Article, keywords: &KeywordsConfig) -> Hits {
    let text = format!("{} {}", article.title, article.summary).to_lowercase();
    let count = |group: &[String]| {
        group
            .iter()
            .filter(|k| !k.is_empty() && text.contains(&k.to_lowercase()))
            .count()
    };
    Hits {
        tech: count(&keywords.weights.technical_breakthrough),
        impact: count(&keywords.weights.industry_impact),
        practical: count(&keywords.weights.practical_value),
    }
}

fn criterion(hits: usize) -> u8 {
    (hits.saturating_mul(2)).min(MAX_CRITERION as usize) as u8
}

/// 5 points today, one less per day of age; future timestamps count as today
fn freshness(published: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let age_days = (now - published).num_days().max(0);
    (FRESHNESS_DAYS - age_days).max(0)
}
