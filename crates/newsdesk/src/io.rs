use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::formats::{FormatGenerator, Formats};

pub const RAW_NEWS_FILE: &str = "raw_news.json";
pub const METADATA_FILE: &str = "metadata.json";
pub const SELECTED_FILE: &str = "selected.json";
pub const CANDIDATES_FILE: &str = "candidates.json";
pub const BOARD_FILE: &str = "candidate_board.md";
pub const SELECTED_ITEMS_FILE: &str = "selected_items.json";
pub const FULL_RESULT_FILE: &str = "full_result.md";

pub const DIGEST_SOCIAL_FILE: &str = "format_a_social.md";
pub const DIGEST_APA_FILE: &str = "format_b_apa.md";
pub const DIGEST_DESIGN_FILE: &str = "format_c_design.txt";

pub const SOCIAL_FILE: &str = "format_a_social_tw.md";
pub const APA_FILE: &str = "format_b_apa_tw.md";
pub const DESIGN_FILE: &str = "format_c_design_tw.txt";

/// `YYYY/MM/DD` of `now` in the editorial timezone
pub fn date_path(now: DateTime<Utc>, tz: FixedOffset) -> String {
    now.with_timezone(&tz).format("%Y/%m/%d").to_string()
}

/// `YYYY-MM-DD` of `now` in the editorial timezone
pub fn editorial_date(now: DateTime<Utc>, tz: FixedOffset) -> String {
    now.with_timezone(&tz).format("%Y-%m-%d").to_string()
}

/// Where one day's files live
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub date: String,
    pub data_dir: PathBuf,
    pub content_dir: PathBuf,
}

impl RunPaths {
    pub fn for_now(config: &Config, now: DateTime<Utc>) -> Self {
        let tz = config.timezone();
        let rel = date_path(now, tz);
        Self {
            date: editorial_date(now, tz),
            data_dir: config.data_dir().join(&rel),
            content_dir: config.content_dir().join(&rel),
        }
    }

    pub fn data(&self, file: &str) -> PathBuf {
        self.data_dir.join(file)
    }

    pub fn content(&self, file: &str) -> PathBuf {
        self.content_dir.join(file)
    }
}

/// Pretty-printed JSON, creating parent directories as needed
pub fn write_json<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).context("Failed to serialize JSON")?;
    write_text(path, &json)
}

/// `Ok(None)` when the file does not exist
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let data = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse JSON from {}", path.display()))?;
    Ok(Some(data))
}

pub fn write_text(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

/// Write the automatic digest files into `dir`
pub fn save_digest(dir: &Path, formats: &Formats) -> Result<()> {
    write_text(&dir.join(DIGEST_SOCIAL_FILE), &formats.format_a)?;
    write_text(&dir.join(DIGEST_APA_FILE), &formats.format_b)?;
    write_text(&dir.join(DIGEST_DESIGN_FILE), &formats.format_c)
}

/// Write the curated formats plus `full_result.md` into `dir`
pub fn save_formats(dir: &Path, formats: &Formats, date: &str) -> Result<()> {
    write_text(&dir.join(SOCIAL_FILE), &formats.format_a)?;
    write_text(&dir.join(APA_FILE), &formats.format_b)?;
    write_text(&dir.join(DESIGN_FILE), &formats.format_c)?;
    write_text(
        &dir.join(FULL_RESULT_FILE),
        &FormatGenerator::full_result(formats, date),
    )
}

/// Load the curated formats written by [`save_formats`], if all three exist
pub fn load_formats(dir: &Path) -> Result<Option<Formats>> {
    let read = |file: &str| -> Result<Option<String>> {
        let path = dir.join(file);
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .with_context(|| format!("Failed to read {}", path.display()))
    };
    match (read(SOCIAL_FILE)?, read(APA_FILE)?, read(DESIGN_FILE)?) {
        (Some(format_a), Some(format_b), Some(format_c)) => Ok(Some(Formats {
            format_a,
            format_b,
            format_c,
        })),
        _ => Ok(None),
    }
}

/// A `YYYY/MM/DD` directory under a data or content root
#[derive(Debug, Clone, PartialEq)]
pub struct DatedDir {
    pub date: NaiveDate,
    pub path: PathBuf,
}

/// Every `Y/M/D` directory under `root`, oldest first; other entries are ignored
pub fn dated_dirs(root: &Path) -> Result<Vec<DatedDir>> {
    let mut out = Vec::new();
    if !root.exists() {
        return Ok(out);
    }

    for year in numeric_subdirs(root)? {
        for month in numeric_subdirs(&year.1)? {
            for day in numeric_subdirs(&month.1)? {
                if let Some(date) = NaiveDate::from_ymd_opt(year.0 as i32, month.0, day.0) {
                    out.push(DatedDir { date, path: day.1 });
                }
            }
        }
    }

    out.sort_by_key(|d| d.date);
    Ok(out)
}

/// Content runs, newest first
pub fn list_runs(content_root: &Path) -> Result<Vec<DatedDir>> {
    let mut runs = dated_dirs(content_root)?;
    runs.reverse();
    Ok(runs)
}

fn numeric_subdirs(dir: &Path) -> Result<Vec<(u32, PathBuf)>> {
    let mut out = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("Failed to read directory {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if let Some(n) = entry.file_name().to_str().and_then(|s| s.parse().ok()) {
            out.push((n, path));
        }
    }
    Ok(out)
}
