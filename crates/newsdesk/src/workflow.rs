//! The two-stage editorial workflow and its human gate.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::commands::{Command, FilterCondition};
use crate::error::WorkflowError;
use crate::models::Candidate;
use crate::scoring::{self, Weights};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Collecting,
    AwaitingSelection,
    Generating,
    Completed,
    Failed,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Collecting => "collecting",
            Stage::AwaitingSelection => "awaiting_selection",
            Stage::Generating => "generating",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        }
    }

    pub fn is_running(self) -> bool {
        matches!(self, Stage::Collecting | Stage::Generating)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a command did, or what the caller still has to fetch
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Selected(usize),
    Filtered { removed: usize, remaining: usize },
    Merged { into: usize, merged: usize },
    Recategorized { id: usize, category: String },
    ResearchRequested(Vec<String>),
    EvidenceRequested { id: usize, url: String },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Selected(n) => write!(f, "已選擇 {n} 則新聞"),
            Outcome::Filtered { removed, remaining } => {
                write!(f, "已過濾 {removed} 則，剩餘 {remaining} 則")
            }
            Outcome::Merged { into, merged } => write!(f, "已將 {merged} 則合併至 #{into}"),
            Outcome::Recategorized { id, category } => write!(f, "#{id} 已改為 {category}"),
            Outcome::ResearchRequested(keywords) => {
                write!(f, "重新搜尋：{}", keywords.join(", "))
            }
            Outcome::EvidenceRequested { id, url } => write!(f, "補證據 #{id}：{url}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Workflow {
    stage: Stage,
    candidates: Vec<Candidate>,
    /// Selected article ids, so the selection survives re-ranking
    selected: HashSet<String>,
    weights: Weights,
    date: String,
    output_dir: PathBuf,
}

impl Workflow {
    pub fn new(date: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            stage: Stage::Idle,
            candidates: Vec::new(),
            selected: HashSet::new(),
            weights: Weights::default(),
            date: date.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Resume curation from candidates saved by an earlier stage-1 run
    pub fn resume(
        date: impl Into<String>,
        output_dir: impl Into<PathBuf>,
        candidates: Vec<Candidate>,
    ) -> Self {
        let mut workflow = Self::new(date, output_dir);
        workflow.candidates = candidates;
        workflow.stage = Stage::AwaitingSelection;
        workflow
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn candidate(&self, id: usize) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.id == id)
    }

    pub fn weights(&self) -> Weights {
        self.weights
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Selected candidates in current rank order
    pub fn selected(&self) -> Vec<Candidate> {
        self.candidates
            .iter()
            .filter(|c| self.selected.contains(&c.article_id))
            .cloned()
            .collect()
    }

    pub fn begin_collection(&mut self) -> Result<(), WorkflowError> {
        if self.stage.is_running() {
            return Err(WorkflowError::WrongStage(self.stage.as_str()));
        }
        self.stage = Stage::Collecting;
        Ok(())
    }

    /// Install freshly scored candidates and open the human gate
    pub fn finish_collection(&mut self, mut candidates: Vec<Candidate>) -> Result<(), WorkflowError> {
        self.expect_stage(&[Stage::Collecting])?;
        scoring::rank(&mut candidates, &self.weights);
        self.candidates = candidates;
        self.selected.clear();
        self.stage = Stage::AwaitingSelection;
        Ok(())
    }

    pub fn apply_line(&mut self, line: &str) -> Result<Outcome, WorkflowError> {
        let command = Command::parse(line)?;
        self.apply(&command)
    }

    pub fn apply(&mut self, command: &Command) -> Result<Outcome, WorkflowError> {
        self.expect_curating()?;

        match command {
            Command::Select(ids) => {
                let chosen: HashSet<String> = ids
                    .iter()
                    .filter_map(|id| self.candidate(*id))
                    .map(|c| c.article_id.clone())
                    .collect();
                self.selected = chosen;
                Ok(Outcome::Selected(self.selected.len()))
            }
            Command::Research(keywords) => Ok(Outcome::ResearchRequested(keywords.clone())),
            Command::Filter(conditions) => Ok(self.filter(conditions)),
            Command::Merge(ids) => self.merge(ids),
            Command::Evidence(id) => {
                let candidate = self
                    .candidate(*id)
                    .ok_or(WorkflowError::UnknownCandidate(*id))?;
                Ok(Outcome::EvidenceRequested {
                    id: *id,
                    url: candidate.url.clone(),
                })
            }
            Command::Recategorize { id, category } => {
                let candidate = self
                    .candidates
                    .iter_mut()
                    .find(|c| c.id == *id)
                    .ok_or(WorkflowError::UnknownCandidate(*id))?;
                candidate.category = category.clone();
                Ok(Outcome::Recategorized {
                    id: *id,
                    category: category.clone(),
                })
            }
        }
    }

    fn filter(&mut self, conditions: &[FilterCondition]) -> Outcome {
        let before = self.candidates.len();
        self.candidates
            .retain(|c| conditions.iter().all(|cond| cond.matches(c)));
        let kept: HashSet<&str> = self.candidates.iter().map(|c| c.article_id.as_str()).collect();
        self.selected.retain(|id| kept.contains(id.as_str()));
        Outcome::Filtered {
            removed: before - self.candidates.len(),
            remaining: self.candidates.len(),
        }
    }

    fn merge(&mut self, ids: &[usize]) -> Result<Outcome, WorkflowError> {
        let (&first, rest) = ids
            .split_first()
            .ok_or(WorkflowError::UnknownCandidate(0))?;
        if self.candidate(first).is_none() {
            return Err(WorkflowError::UnknownCandidate(first));
        }
        let rest: Vec<usize> = rest.iter().copied().filter(|id| *id != first).collect();
        if let Some(missing) = rest.iter().find(|id| self.candidate(**id).is_none()) {
            return Err(WorkflowError::UnknownCandidate(*missing));
        }

        let mut absorbed = Vec::new();
        self.candidates.retain(|c| {
            if rest.contains(&c.id) {
                absorbed.push(c.clone());
                false
            } else {
                true
            }
        });

        let mut survivor_selected = false;
        for other in &absorbed {
            if self.selected.remove(&other.article_id) {
                survivor_selected = true;
            }
        }

        let survivor = self
            .candidates
            .iter_mut()
            .find(|c| c.id == first)
            .ok_or(WorkflowError::UnknownCandidate(first))?;
        for other in &absorbed {
            for url in std::iter::once(&other.url).chain(other.merged_urls.iter()) {
                if *url != survivor.url && !survivor.merged_urls.contains(url) {
                    survivor.merged_urls.push(url.clone());
                }
            }
            if !survivor.source.split(" / ").any(|s| s == other.source) {
                survivor.source = format!("{} / {}", survivor.source, other.source);
            }
        }
        if survivor_selected {
            self.selected.insert(survivor.article_id.clone());
        }

        Ok(Outcome::Merged {
            into: first,
            merged: absorbed.len(),
        })
    }

    /// Append re-searched candidates not already on the board, then re-rank
    pub fn add_candidates(&mut self, new: Vec<Candidate>) -> Result<usize, WorkflowError> {
        self.expect_curating()?;
        let mut known: HashSet<String> =
            self.candidates.iter().map(|c| c.article_id.clone()).collect();
        let before = self.candidates.len();
        for candidate in new {
            if known.insert(candidate.article_id.clone()) {
                self.candidates.push(candidate);
            }
        }
        scoring::rank(&mut self.candidates, &self.weights);
        Ok(self.candidates.len() - before)
    }

    pub fn attach_evidence(&mut self, id: usize, evidence: String) -> Result<(), WorkflowError> {
        let candidate = self
            .candidates
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(WorkflowError::UnknownCandidate(id))?;
        candidate.evidence = Some(evidence);
        Ok(())
    }

    /// Validate and apply new weights; rejected weights change nothing
    pub fn update_weights(&mut self, weights: Weights) -> Result<(), WorkflowError> {
        if self.stage.is_running() {
            return Err(WorkflowError::WrongStage(self.stage.as_str()));
        }
        weights.validate()?;
        self.weights = weights;
        scoring::rank(&mut self.candidates, &self.weights);
        Ok(())
    }

    /// Enter stage 2 with the current selection
    pub fn begin_generation(&mut self) -> Result<Vec<Candidate>, WorkflowError> {
        self.expect_curating()?;
        let selected = self.selected();
        if selected.is_empty() {
            return Err(WorkflowError::NothingSelected);
        }
        self.stage = Stage::Generating;
        Ok(selected)
    }

    pub fn complete(&mut self) -> Result<(), WorkflowError> {
        self.expect_stage(&[Stage::Generating])?;
        self.stage = Stage::Completed;
        Ok(())
    }

    /// Mark the running stage as failed
    pub fn fail(&mut self) {
        if self.stage.is_running() {
            self.stage = Stage::Failed;
        }
    }

    /// Curation reopens after stage 2 completes, or after a failure that left candidates
    fn expect_curating(&mut self) -> Result<(), WorkflowError> {
        if !(self.stage == Stage::Failed && !self.candidates.is_empty()) {
            self.expect_stage(&[Stage::AwaitingSelection, Stage::Completed])?;
        }
        self.stage = Stage::AwaitingSelection;
        Ok(())
    }

    fn expect_stage(&self, allowed: &[Stage]) -> Result<(), WorkflowError> {
        if allowed.contains(&self.stage) {
            Ok(())
        } else {
            Err(WorkflowError::WrongStage(self.stage.as_str()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CommandError, WeightsError};

    fn candidate(n: usize, scores: [u8; 4], category: &str, source: &str) -> Candidate {
        Candidate {
            id: n,
            article_id: format!("art{n}"),
            title: format!("Story {n}"),
            summary: String::new(),
            source: source.into(),
            url: format!("https://example.com/{n}"),
            published_at: "2026-02-05T00:00:00+00:00".into(),
            category: category.into(),
            key_point: String::new(),
            key_data: "—".into(),
            tech_score: scores[0],
            impact_score: scores[1],
            practical_score: scores[2],
            timely_score: scores[3],
            total_score: 0.0,
            hours_ago: "1".into(),
            cluster_id: format!("cluster_{n}"),
            evidence: None,
            merged_urls: Vec::new(),
        }
    }

    fn board() -> Workflow {
        let mut wf = Workflow::new("2026-02-05", "/tmp/out");
        wf.begin_collection().unwrap();
        wf.finish_collection(vec![
            candidate(1, [5, 5, 5, 5], "研究突破", "Nature"),
            candidate(2, [4, 4, 4, 4], "企業應用", "路邊媒體"),
            candidate(3, [3, 3, 3, 3], "研究突破", "arXiv"),
            candidate(4, [2, 2, 2, 2], "模型發布", "OpenAI"),
        ])
        .unwrap();
        wf
    }

    fn ids(wf: &Workflow) -> Vec<&str> {
        wf.candidates().iter().map(|c| c.article_id.as_str()).collect()
    }

    #[test]
    fn test_stages_follow_the_pipeline() {
        let mut wf = board();
        assert_eq!(wf.stage(), Stage::AwaitingSelection);
        assert_eq!(wf.begin_generation().unwrap_err(), WorkflowError::NothingSelected);

        wf.apply_line("#選擇 1 3").unwrap();
        let selected = wf.begin_generation().unwrap();
        assert_eq!(selected.len(), 2);
        assert_eq!(wf.stage(), Stage::Generating);
        assert!(wf.begin_collection().is_err());

        wf.complete().unwrap();
        assert_eq!(wf.stage(), Stage::Completed);
    }

    #[test]
    fn test_commands_rejected_before_collection() {
        let mut wf = Workflow::new("2026-02-05", "/tmp/out");
        assert_eq!(
            wf.apply_line("#選擇 1").unwrap_err(),
            WorkflowError::WrongStage("idle")
        );
    }

    #[test]
    fn test_fail_marks_running_stage() {
        let mut wf = Workflow::new("d", "/tmp");
        wf.begin_collection().unwrap();
        wf.fail();
        assert_eq!(wf.stage(), Stage::Failed);
        wf.begin_collection().unwrap();
        assert_eq!(wf.stage(), Stage::Collecting);
    }

    #[test]
    fn test_failed_generation_reopens_curation() {
        let mut wf = board();
        wf.apply_line("#選擇 2").unwrap();
        wf.begin_generation().unwrap();
        wf.fail();
        assert_eq!(wf.stage(), Stage::Failed);

        assert_eq!(wf.apply_line("#選擇 1 2").unwrap(), Outcome::Selected(2));
        assert_eq!(wf.stage(), Stage::AwaitingSelection);
    }

    #[test]
    fn test_select_replaces_and_ignores_unknown_ids() {
        let mut wf = board();
        assert_eq!(wf.apply_line("#選擇 1 2 99").unwrap(), Outcome::Selected(2));
        assert_eq!(wf.apply_line("#選擇 4").unwrap(), Outcome::Selected(1));
        let selected: Vec<_> = wf.selected().into_iter().map(|c| c.id).collect();
        assert_eq!(selected, vec![4]);
    }

    #[test]
    fn test_bad_select_keeps_previous_selection() {
        let mut wf = board();
        wf.apply_line("#選擇 2").unwrap();
        assert!(matches!(
            wf.apply_line("#選擇 2 abc").unwrap_err(),
            WorkflowError::Command(CommandError::InvalidId { .. })
        ));
        assert_eq!(wf.selected().len(), 1);
    }

    #[test]
    fn test_bare_select_clears_selection() {
        let mut wf = board();
        wf.apply_line("#選擇 1 2").unwrap();
        assert_eq!(wf.apply_line("#選擇").unwrap(), Outcome::Selected(0));
        assert!(wf.selected().is_empty());
    }

    #[test]
    fn test_selection_survives_reweighting() {
        let mut wf = board();
        wf.apply_line("#選擇 4").unwrap();
        wf.update_weights(Weights {
            tech: 100,
            impact: 0,
            practical: 0,
            timely: 0,
        })
        .unwrap();
        let selected = wf.selected();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].article_id, "art4");
    }

    #[test]
    fn test_rejected_weights_change_nothing() {
        let mut wf = board();
        let before = ids(&wf).into_iter().map(String::from).collect::<Vec<_>>();
        let err = wf
            .update_weights(Weights {
                tech: 90,
                impact: 10,
                practical: 10,
                timely: 10,
            })
            .unwrap_err();
        assert_eq!(err, WorkflowError::Weights(WeightsError::InvalidSum(120)));
        assert_eq!(wf.weights(), Weights::default());
        assert_eq!(ids(&wf), before);
    }

    #[test]
    fn test_reweighting_reorders_and_renumbers() {
        let mut wf = Workflow::new("d", "/tmp");
        wf.begin_collection().unwrap();
        wf.finish_collection(vec![
            candidate(1, [5, 0, 0, 0], "x", "a"),
            candidate(2, [0, 0, 0, 5], "x", "b"),
        ])
        .unwrap();
        assert_eq!(ids(&wf), vec!["art1", "art2"]);

        wf.update_weights(Weights {
            tech: 10,
            impact: 10,
            practical: 10,
            timely: 70,
        })
        .unwrap();
        assert_eq!(ids(&wf), vec!["art2", "art1"]);
        assert_eq!(wf.candidates()[0].id, 1);
    }

    #[test]
    fn test_filter_keeps_matching_and_prunes_selection() {
        let mut wf = board();
        wf.apply_line("#選擇 1 2").unwrap();
        let outcome = wf.apply_line("#過濾 類別=研究突破, 來源≠路邊媒體").unwrap();
        assert_eq!(
            outcome,
            Outcome::Filtered {
                removed: 2,
                remaining: 2
            }
        );
        let numbers: Vec<_> = wf.candidates().iter().map(|c| c.id).collect();
        assert_eq!(numbers, vec![1, 3]);
        let selected: Vec<_> = wf.selected().into_iter().map(|c| c.id).collect();
        assert_eq!(selected, vec![1]);
    }

    #[test]
    fn test_merge_folds_later_items_into_first() {
        let mut wf = board();
        wf.apply_line("#選擇 4").unwrap();
        let outcome = wf.apply_line("#合併 2 4").unwrap();
        assert_eq!(outcome, Outcome::Merged { into: 2, merged: 1 });

        assert!(wf.candidate(4).is_none());
        let survivor = wf.candidate(2).unwrap();
        assert_eq!(survivor.merged_urls, vec!["https://example.com/4".to_string()]);
        assert_eq!(survivor.source, "路邊媒體 / OpenAI");
        assert_eq!(survivor.cluster_id, "cluster_2");

        let selected: Vec<_> = wf.selected().into_iter().map(|c| c.id).collect();
        assert_eq!(selected, vec![2]);
    }

    #[test]
    fn test_merge_unknown_id_changes_nothing() {
        let mut wf = board();
        assert_eq!(
            wf.apply_line("#合併 1 42").unwrap_err(),
            WorkflowError::UnknownCandidate(42)
        );
        assert_eq!(wf.candidates().len(), 4);
    }

    #[test]
    fn test_recategorize_and_evidence() {
        let mut wf = board();
        assert_eq!(
            wf.apply_line("#改分類 3=企業應用").unwrap(),
            Outcome::Recategorized {
                id: 3,
                category: "企業應用".into()
            }
        );
        assert_eq!(wf.candidate(3).unwrap().category, "企業應用");

        assert_eq!(
            wf.apply_line("#補證據 2").unwrap(),
            Outcome::EvidenceRequested {
                id: 2,
                url: "https://example.com/2".into()
            }
        );
        wf.attach_evidence(2, "87% accuracy".into()).unwrap();
        assert_eq!(wf.candidate(2).unwrap().evidence.as_deref(), Some("87% accuracy"));
        assert_eq!(
            wf.apply_line("#補證據 9").unwrap_err(),
            WorkflowError::UnknownCandidate(9)
        );
    }

    #[test]
    fn test_research_request_and_add_candidates() {
        let mut wf = board();
        wf.apply_line("#選擇 1").unwrap();
        assert_eq!(
            wf.apply_line("#重搜 agents").unwrap(),
            Outcome::ResearchRequested(vec!["agents".into()])
        );

        let added = wf
            .add_candidates(vec![
                candidate(1, [5, 5, 5, 5], "研究突破", "Nature"),
                candidate(9, [4, 5, 5, 5], "AI開發工具", "GitHub"),
            ])
            .unwrap();
        assert_eq!(added, 1);
        assert_eq!(ids(&wf), vec!["art1", "art9", "art2", "art3", "art4"]);
        assert_eq!(wf.candidate(2).unwrap().article_id, "art9");
        assert_eq!(wf.selected()[0].article_id, "art1");
    }

    #[test]
    fn test_commands_allowed_again_after_completion() {
        let mut wf = board();
        wf.apply_line("#選擇 1").unwrap();
        wf.begin_generation().unwrap();
        wf.complete().unwrap();
        wf.apply_line("#選擇 2").unwrap();
        assert_eq!(wf.stage(), Stage::AwaitingSelection);
    }
}
