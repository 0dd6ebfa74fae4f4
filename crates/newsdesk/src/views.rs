//! Plain-text views over finished runs, printed by `report-news view`.

use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::io::{list_runs, read_json, DatedDir, DIGEST_APA_FILE, DIGEST_SOCIAL_FILE, METADATA_FILE};
use crate::models::CollectionMetadata;

const SOCIAL_PREVIEW_LINES: usize = 15;
const APA_PREVIEW_LINES: usize = 10;
const RECENT_RUNS: usize = 5;

fn run_label(run: &DatedDir) -> String {
    run.date.format("%Y/%m/%d").to_string()
}

/// Preview of the newest run's social and APA digests
pub fn latest(config: &Config) -> Result<String> {
    let mut out = String::new();
    let runs = list_runs(&config.content_dir())?;
    let Some(run) = runs.first() else {
        writeln!(out, "❌ No content found. Run the workflow first:")?;
        writeln!(out, "   collect-news --auto")?;
        return Ok(out);
    };

    writeln!(out, "📰 Latest AI News Results ({})", run_label(run))?;
    writeln!(out, "{}", "=".repeat(60))?;

    let social = run.path.join(DIGEST_SOCIAL_FILE);
    if social.exists() {
        writeln!(out, "\n🔥 SOCIAL MEDIA FORMAT:")?;
        writeln!(out, "{}", "-".repeat(30))?;
        let content = read_to_string(&social)?;
        let lines: Vec<&str> = content.split('\n').collect();
        for line in lines.iter().take(SOCIAL_PREVIEW_LINES) {
            if !line.trim().is_empty() {
                writeln!(out, "{line}")?;
            }
        }
        if lines.len() > SOCIAL_PREVIEW_LINES {
            writeln!(out, "... and {} more lines", lines.len() - SOCIAL_PREVIEW_LINES)?;
        }
    }

    let apa = run.path.join(DIGEST_APA_FILE);
    if apa.exists() {
        writeln!(out, "\n📚 APA CITATION FORMAT:")?;
        writeln!(out, "{}", "-".repeat(30))?;
        let content = read_to_string(&apa)?;
        for line in content.split('\n').take(APA_PREVIEW_LINES) {
            if !line.trim().is_empty() {
                writeln!(out, "{line}")?;
            }
        }
    }

    writeln!(out, "\n📁 Full files available at: {}/", run.path.display())?;
    Ok(out)
}

/// Every run with its files and their sizes
pub fn all(config: &Config) -> Result<String> {
    let mut out = String::new();
    let runs = list_runs(&config.content_dir())?;
    if runs.is_empty() {
        writeln!(out, "❌ No content found. Run the workflow first.")?;
        return Ok(out);
    }

    writeln!(out, "📁 All Available Results:")?;
    writeln!(out, "{}", "=".repeat(40))?;
    for (i, run) in runs.iter().enumerate() {
        let mut files = Vec::new();
        for entry in fs::read_dir(&run.path)
            .with_context(|| format!("Failed to read {}", run.path.display()))?
        {
            let entry = entry?;
            let meta = entry.metadata()?;
            if meta.is_file() {
                files.push((entry.file_name().to_string_lossy().into_owned(), meta.len()));
            }
        }
        files.sort();

        writeln!(out, "{}. {} ({} files)", i + 1, run_label(run), files.len())?;
        for (name, size) in files {
            writeln!(out, "   📄 {name} ({size} bytes)")?;
        }
    }
    Ok(out)
}

/// Latest run's collection metadata plus run counts
pub fn stats(config: &Config) -> Result<String> {
    let mut out = String::new();
    writeln!(out, "📊 AI News Automation Statistics")?;
    writeln!(out, "{}", "=".repeat(50))?;

    let runs = list_runs(&config.content_dir())?;
    if let Some(run) = runs.first() {
        let label = run_label(run);
        writeln!(out, "📅 Latest run: {label}")?;
        let metadata_path = config.data_dir().join(&label).join(METADATA_FILE);
        if let Some(metadata) = read_json::<CollectionMetadata>(&metadata_path)? {
            writeln!(out, "📰 Articles collected: {}", metadata.count)?;
            writeln!(out, "🔗 Sources: {}", metadata.sources.join(", "))?;
            writeln!(out, "⏰ Collected at: {}", metadata.collected_at)?;
        }
    }

    writeln!(out, "📁 Total runs: {}", runs.len())?;
    writeln!(out, "\n📋 Recent runs:")?;
    for (i, run) in runs.iter().take(RECENT_RUNS).enumerate() {
        writeln!(out, "  {}. {}", i + 1, run_label(run))?;
    }
    Ok(out)
}

fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{write_json, write_text};
    use tempfile::TempDir;

    fn seeded() -> (TempDir, Config) {
        let tmp = TempDir::new().unwrap();
        let config = Config::offline(tmp.path());
        let run = config.content_dir().join("2026/02/05");
        let social: Vec<String> = (1..=20).map(|i| format!("line {i}")).collect();
        write_text(&run.join(DIGEST_SOCIAL_FILE), &social.join("\n")).unwrap();
        write_text(&run.join(DIGEST_APA_FILE), "ref 1\nref 2").unwrap();
        write_text(&config.content_dir().join("2026/02/04/format_c_design.txt"), "abc").unwrap();
        write_json(
            &config.data_dir().join("2026/02/05").join(METADATA_FILE),
            &CollectionMetadata {
                collected_at: "2026-02-05T01:00:00+00:00".into(),
                count: 42,
                sources: vec!["newsapi".into(), "rss".into()],
            },
        )
        .unwrap();
        (tmp, config)
    }

    #[test]
    fn test_latest_previews_first_lines() {
        let (_tmp, config) = seeded();
        let text = latest(&config).unwrap();
        assert!(text.contains("Latest AI News Results (2026/02/05)"));
        assert!(text.contains("line 15\n"));
        assert!(!text.contains("line 16"));
        assert!(text.contains("... and 5 more lines"));
        assert!(text.contains("ref 2"));
    }

    #[test]
    fn test_latest_without_runs() {
        let tmp = TempDir::new().unwrap();
        let text = latest(&Config::offline(tmp.path())).unwrap();
        assert!(text.starts_with("❌ No content found"));
    }

    #[test]
    fn test_all_lists_files_with_sizes() {
        let (_tmp, config) = seeded();
        let text = all(&config).unwrap();
        assert!(text.contains("1. 2026/02/05 (2 files)"));
        assert!(text.contains("2. 2026/02/04 (1 files)"));
        assert!(text.contains("📄 format_c_design.txt (3 bytes)"));
    }

    #[test]
    fn test_stats_reads_metadata() {
        let (_tmp, config) = seeded();
        let text = stats(&config).unwrap();
        assert!(text.contains("📅 Latest run: 2026/02/05"));
        assert!(text.contains("📰 Articles collected: 42"));
        assert!(text.contains("🔗 Sources: newsapi, rss"));
        assert!(text.contains("📁 Total runs: 2"));
        assert!(text.contains("  2. 2026/02/04"));
    }
}
