//! Weekly trend analysis over the selected items of recent runs.

use anyhow::Result;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::config::Config;
use crate::io::{dated_dirs, read_json, write_json, SELECTED_FILE};
use crate::models::display_date;

const WINDOW_DAYS: i64 = 7;
const WEEKLY_TOPICS: usize = 50;
const API_TOPICS: usize = 20;
const LATEST_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
struct SelectedEntry {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    published_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestItem {
    pub title: String,
    pub url: String,
    pub source: String,
    pub date: String,
}

/// `analysis/weekly/<ISO week>.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyReport {
    pub generated_at: String,
    pub range: [String; 2],
    pub hot_topics: Vec<(String, usize)>,
    pub trend: Vec<TrendPoint>,
    pub latest: Vec<LatestItem>,
}

/// `docs/api.json`, read by the dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSnapshot {
    pub hot_topics: Vec<(String, usize)>,
    pub trend: Vec<TrendPoint>,
    pub latest: Vec<LatestItem>,
}

pub struct Analysis {
    pub weekly: WeeklyReport,
    pub api: ApiSnapshot,
    pub iso_week: String,
}

/// Aggregate the last seven days of `data/Y/M/D/selected.json`
pub fn analyze(config: &Config, now: DateTime<Utc>) -> Result<Analysis> {
    let tz: FixedOffset = config.timezone();
    let start = now - Duration::days(WINDOW_DAYS);
    let (first_day, last_day) = (
        start.with_timezone(&tz).date_naive(),
        now.with_timezone(&tz).date_naive(),
    );

    let mut trend = Vec::new();
    let mut latest = Vec::new();
    let mut topics = TopicCounter::default();

    for dir in dated_dirs(&config.data_dir())? {
        if dir.date < first_day || dir.date > last_day {
            continue;
        }
        let Some(items) = read_json::<Vec<SelectedEntry>>(&dir.path.join(SELECTED_FILE))? else {
            continue;
        };

        trend.push(TrendPoint {
            date: dir.date.to_string(),
            count: items.len(),
        });
        for item in items {
            topics.add_title(&item.title);
            latest.push(LatestItem {
                date: display_date(&item.published_at),
                title: item.title,
                url: item.url,
                source: item.source,
            });
        }
    }

    let hot_topics = topics.most_common();
    let weekly = WeeklyReport {
        generated_at: now.to_rfc3339(),
        range: [start.to_rfc3339(), now.to_rfc3339()],
        hot_topics: hot_topics.iter().take(WEEKLY_TOPICS).cloned().collect(),
        trend: trend.clone(),
        latest: latest[latest.len().saturating_sub(LATEST_LIMIT)..].to_vec(),
    };
    let api = ApiSnapshot {
        hot_topics: hot_topics.into_iter().take(API_TOPICS).collect(),
        trend,
        latest: latest.into_iter().rev().take(LATEST_LIMIT).collect(),
    };

    Ok(Analysis {
        weekly,
        api,
        iso_week: now.format("%G-%V").to_string(),
    })
}

/// Run [`analyze`] and write both reports; returns the paths written
pub fn write_reports(config: &Config, now: DateTime<Utc>) -> Result<(PathBuf, PathBuf)> {
    let analysis = analyze(config, now)?;
    let weekly_path = config
        .root
        .join("analysis")
        .join("weekly")
        .join(format!("{}.json", analysis.iso_week));
    let api_path = config.root.join("docs").join("api.json");

    write_json(&weekly_path, &analysis.weekly)?;
    write_json(&api_path, &analysis.api)?;
    Ok((weekly_path, api_path))
}

/// Token counts that remember first-seen order for ties
#[derive(Default)]
struct TopicCounter {
    order: Vec<String>,
    counts: HashMap<String, usize>,
}

impl TopicCounter {
    fn add_title(&mut self, title: &str) {
        let lowered = title.to_lowercase().replace('-', " ");
        for token in lowered.split_whitespace() {
            if token.chars().count() >= 3 && token.chars().all(char::is_alphabetic) {
                let count = self.counts.entry(token.to_string()).or_insert(0);
                if *count == 0 {
                    self.order.push(token.to_string());
                }
                *count += 1;
            }
        }
    }

    fn most_common(&self) -> Vec<(String, usize)> {
        let mut out: Vec<(String, usize)> = self
            .order
            .iter()
            .map(|t| (t.clone(), self.counts.get(t).copied().unwrap_or(0)))
            .collect();
        out.sort_by(|a, b| b.1.cmp(&a.1));
        out
    }
}
