//! The steps shared by the CLI and the web UI: collect, assess, persist,
//! resolve research/evidence requests, and generate the final formats.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::assessor::Assessor;
use crate::collectors::{build_collectors, build_research_collectors, collect_all};
use crate::config::Config;
use crate::extractor::EvidenceExtractor;
use crate::formats::{FormatGenerator, Formats};
use crate::io::{
    read_json, save_formats, write_json, write_text, RunPaths, BOARD_FILE, CANDIDATES_FILE,
    METADATA_FILE, RAW_NEWS_FILE, SELECTED_FILE, SELECTED_ITEMS_FILE,
};
use crate::llm::{gemini_from_config, LlmClient};
use crate::models::{Article, Candidate, CollectionMetadata};
use crate::scoring::Weights;
use crate::workflow::{Outcome, Workflow};

/// Collect from every enabled source and persist `raw_news.json` and `metadata.json`
pub async fn collect(config: &Config, paths: &RunPaths) -> Result<Vec<Article>> {
    let sources = config.load_sources()?;
    let collectors = build_collectors(&sources, config.news_api_key.as_deref())?;
    let articles = collect_all(&collectors).await;

    write_json(&paths.data(RAW_NEWS_FILE), &articles)?;
    write_json(
        &paths.data(METADATA_FILE),
        &CollectionMetadata::new(articles.len(), sources.enabled_sources()),
    )?;
    info!(count = articles.len(), dir = %paths.data_dir.display(), "raw news saved");
    Ok(articles)
}

/// Stage-1 assessor for this config; uses Gemini when allowed and a key is present
pub fn build_assessor(config: &Config, date: &str, use_llm: bool) -> Result<Assessor> {
    let keywords = config.load_keywords()?;
    let llm = if use_llm { gemini_from_config(config)? } else { None };
    if llm.is_none() {
        info!("GEMINI_API_KEY 未設定，使用關鍵字啟發式評分");
    }
    Ok(Assessor::new(llm, keywords, date.to_string()))
}

/// `candidates.json` and `candidate_board.md`, both in content
pub fn save_candidates(paths: &RunPaths, candidates: &[Candidate]) -> Result<()> {
    write_json(&paths.content(CANDIDATES_FILE), candidates)?;
    write_text(
        &paths.content(BOARD_FILE),
        &FormatGenerator::candidate_board(candidates, &paths.date),
    )
}

/// Candidates saved by the last stage-1 run for this date
pub fn load_candidates(paths: &RunPaths) -> Result<Option<Vec<Candidate>>> {
    read_json(&paths.content(CANDIDATES_FILE))
}

/// Assessed candidates for an editor's `#重搜` keywords
pub async fn research_candidates(
    config: &Config,
    assessor: &Assessor,
    keywords: &[String],
    weights: &Weights,
    now: DateTime<Utc>,
) -> Result<Vec<Candidate>> {
    let sources = config.load_sources()?;
    let collectors =
        build_research_collectors(keywords, &sources, config.news_api_key.as_deref())?;
    let articles = collect_all(&collectors).await;
    info!(count = articles.len(), keywords = %keywords.join(", "), "research results");
    Ok(assessor.assess(&articles, weights, now).await)
}

/// What an applied command still needed from the network, once fetched
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    Nothing(Outcome),
    Research { keywords: Vec<String>, found: Vec<Candidate> },
    Evidence { id: usize, url: String, evidence: Option<String> },
}

/// Fetch what `outcome` asks for without touching the workflow
pub async fn resolve(
    config: &Config,
    assessor: &Assessor,
    extractor: &EvidenceExtractor,
    outcome: Outcome,
    weights: &Weights,
    now: DateTime<Utc>,
) -> Result<Fetched> {
    Ok(match outcome {
        Outcome::ResearchRequested(keywords) => {
            let found = research_candidates(config, assessor, &keywords, weights, now).await?;
            Fetched::Research { keywords, found }
        }
        Outcome::EvidenceRequested { id, url } => {
            let evidence = extractor.fetch_evidence(&url).await?;
            Fetched::Evidence { id, url, evidence }
        }
        other => Fetched::Nothing(other),
    })
}

/// Fold fetched results into the workflow; returns a one-line report for the editor
pub fn apply_fetched(workflow: &mut Workflow, fetched: Fetched) -> Result<String> {
    match fetched {
        Fetched::Nothing(outcome) => Ok(outcome.to_string()),
        Fetched::Research { keywords, found } => {
            let added = workflow.add_candidates(found)?;
            Ok(format!("重新搜尋「{}」：新增 {} 則候選", keywords.join(", "), added))
        }
        Fetched::Evidence { id, url, evidence } => match evidence {
            Some(evidence) => {
                workflow.attach_evidence(id, evidence)?;
                Ok(format!("#{id} 已補上證據"))
            }
            None => Ok(format!("#{id} 無法取得證據：{url}")),
        },
    }
}

/// Apply one command line and fetch whatever it asks for
pub async fn apply_and_resolve(
    config: &Config,
    assessor: &Assessor,
    extractor: &EvidenceExtractor,
    workflow: &mut Workflow,
    line: &str,
    now: DateTime<Utc>,
) -> Result<String> {
    let outcome = workflow.apply_line(line)?;
    let fetched = resolve(config, assessor, extractor, outcome, &workflow.weights(), now).await?;
    apply_fetched(workflow, fetched)
}

/// Render the formats for `selected` and write every stage-2 output
pub async fn generate_outputs(
    llm: Option<&dyn LlmClient>,
    paths: &RunPaths,
    selected: &[Candidate],
) -> Result<Formats> {
    let formats = FormatGenerator::generate(llm, selected, &paths.date).await;

    save_formats(&paths.content_dir, &formats, &paths.date)
        .context("Failed to save formatted outputs")?;
    write_json(&paths.content(SELECTED_ITEMS_FILE), selected)?;
    write_json(&paths.data(SELECTED_FILE), selected)?;
    info!(count = selected.len(), dir = %paths.content_dir.display(), "formats saved");
    Ok(formats)
}
