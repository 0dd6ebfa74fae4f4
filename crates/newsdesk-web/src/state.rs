use chrono::{Local, Utc};
use newsdesk::{pipeline, Config, Formats, RunPaths, Stage, Weights, Workflow};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

const MAX_LOGS: usize = 50;

/// What `/api/status` reports
#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub stage: Stage,
    pub running: bool,
    pub current_step: String,
    pub progress: u8,
    pub logs: VecDeque<String>,
    pub results: Option<Formats>,
    pub weights: Weights,
}

impl Status {
    fn new(stage: Stage, weights: Weights) -> Self {
        Self {
            stage,
            running: false,
            current_step: String::new(),
            progress: 0,
            logs: VecDeque::new(),
            results: None,
            weights,
        }
    }

    pub fn log(&mut self, message: impl AsRef<str>) {
        let line = format!("[{}] {}", Local::now().format("%H:%M:%S"), message.as_ref());
        self.logs.push_back(line);
        while self.logs.len() > MAX_LOGS {
            self.logs.pop_front();
        }
    }

    pub fn step(&mut self, step: &str, progress: u8) {
        self.current_step = step.to_string();
        self.progress = progress;
        self.log(step);
    }
}

/// One editorial day: the workflow plus where its files go
pub struct Session {
    pub workflow: Workflow,
    pub paths: RunPaths,
}

impl Session {
    /// Today's session, resumed from saved candidates when stage 1 already ran
    pub fn today(config: &Config) -> Self {
        let paths = RunPaths::for_now(config, Utc::now());
        let workflow = match pipeline::load_candidates(&paths) {
            Ok(Some(candidates)) => {
                Workflow::resume(&paths.date, &paths.content_dir, candidates)
            }
            Ok(None) => Workflow::new(&paths.date, &paths.content_dir),
            Err(e) => {
                warn!("could not load saved candidates: {:#}", e);
                Workflow::new(&paths.date, &paths.content_dir)
            }
        };
        Self { workflow, paths }
    }

    /// A new, idle session dated now, carrying over `weights`
    pub fn fresh(config: &Config, weights: Weights) -> Self {
        let paths = RunPaths::for_now(config, Utc::now());
        let mut workflow = Workflow::new(&paths.date, &paths.content_dir);
        if let Err(e) = workflow.update_weights(weights) {
            warn!("keeping default weights: {}", e);
        }
        Self { workflow, paths }
    }
}

/// Shared between handlers and background stage tasks.
///
/// When both locks are needed, take `session` before `status`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub use_llm: bool,
    pub session: Arc<Mutex<Session>>,
    pub status: Arc<Mutex<Status>>,
}

impl AppState {
    pub fn new(config: Config, use_llm: bool) -> Self {
        let session = Session::today(&config);
        let status = Status::new(session.workflow.stage(), session.workflow.weights());
        Self {
            config: Arc::new(config),
            use_llm,
            session: Arc::new(Mutex::new(session)),
            status: Arc::new(Mutex::new(status)),
        }
    }

    pub async fn log(&self, message: impl AsRef<str>) {
        self.status.lock().await.log(message);
    }

    pub async fn step(&self, step: &str, progress: u8) {
        self.status.lock().await.step(step, progress);
    }

    /// Mirror the workflow stage into the status
    pub async fn sync_stage(&self, stage: Stage) {
        let mut status = self.status.lock().await;
        status.stage = stage;
        status.running = stage.is_running();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logs_are_capped() {
        let mut status = Status::new(Stage::Idle, Weights::default());
        for i in 0..60 {
            status.log(format!("line {i}"));
        }
        assert_eq!(status.logs.len(), MAX_LOGS);
        assert!(status.logs[0].ends_with("line 10"));
        assert!(status.logs[MAX_LOGS - 1].ends_with("line 59"));
    }

    #[test]
    fn test_step_sets_progress_and_logs() {
        let mut status = Status::new(Stage::Idle, Weights::default());
        status.step("收集新聞", 10);
        assert_eq!(status.current_step, "收集新聞");
        assert_eq!(status.progress, 10);
        assert_eq!(status.logs.len(), 1);
    }
}
