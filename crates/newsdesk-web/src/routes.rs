use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use newsdesk::io::{load_formats, APA_FILE, DESIGN_FILE, FULL_RESULT_FILE, SOCIAL_FILE};
use newsdesk::llm::gemini_from_config;
use newsdesk::{
    pipeline, Candidate, DatabaseManager, EvidenceExtractor, FormatGenerator, Formats, Weights,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::page::INDEX_HTML;
use crate::state::{AppState, Session};

/// An error response with a JSON `{"error": ...}` body
#[derive(Debug)]
pub struct ApiError(pub StatusCode, pub String);

impl ApiError {
    fn conflict() -> Self {
        Self(StatusCode::CONFLICT, "已有流程正在執行中".to_string())
    }

    fn bad_request(message: impl ToString) -> Self {
        Self(StatusCode::BAD_REQUEST, message.to_string())
    }

    fn internal(err: anyhow::Error) -> Self {
        Self(StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

type ApiResult<T = Value> = Result<Json<T>, ApiError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/start_stage1", post(start_stage1))
        .route("/api/process_commands", post(process_commands))
        .route("/api/update_weights", post(update_weights))
        .route("/api/start_stage2", post(start_stage2))
        .route("/api/status", get(status))
        .route("/api/candidates", get(candidates))
        .route("/api/selected", get(selected))
        .route("/api/results", get(results))
        .route("/api/weights", get(weights))
        .route("/api/download/{format}", get(download))
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn start_stage1(State(state): State<AppState>) -> ApiResult {
    let mut session = state.session.lock().await;
    let mut status = state.status.lock().await;
    if status.running {
        return Err(ApiError::conflict());
    }

    *session = Session::fresh(&state.config, status.weights);
    session
        .workflow
        .begin_collection()
        .map_err(ApiError::bad_request)?;
    status.stage = session.workflow.stage();
    status.running = true;
    status.results = None;
    status.step("開始第一階段：收集與評分", 0);
    drop(status);
    drop(session);

    tokio::spawn(run_stage1(state.clone()));
    Ok(Json(json!({ "status": "started" })))
}

pub(crate) async fn run_stage1(state: AppState) {
    match stage1(&state).await {
        Ok(count) => {
            state
                .step(&format!("第一階段完成：{count} 則候選新聞"), 100)
                .await;
        }
        Err(e) => {
            error!("stage 1 failed: {:#}", e);
            let stage = {
                let mut session = state.session.lock().await;
                session.workflow.fail();
                session.workflow.stage()
            };
            state.sync_stage(stage).await;
            state.log(format!("❌ 第一階段失敗：{e:#}")).await;
        }
    }
}

async fn stage1(state: &AppState) -> anyhow::Result<usize> {
    let now = Utc::now();
    let paths = state.session.lock().await.paths.clone();

    state.step("收集新聞", 10).await;
    let articles = pipeline::collect(&state.config, &paths).await?;
    state.log(format!("收集到 {} 則新聞", articles.len())).await;

    state.step("評分候選新聞", 50).await;
    let assessor = pipeline::build_assessor(&state.config, &paths.date, state.use_llm)?;
    let weights = state.status.lock().await.weights;
    let scored = assessor.assess(&articles, &weights, now).await;

    let mut session = state.session.lock().await;
    session.workflow.finish_collection(scored)?;
    pipeline::save_candidates(&paths, session.workflow.candidates())?;
    let stage = session.workflow.stage();
    let count = session.workflow.candidates().len();
    drop(session);

    state.sync_stage(stage).await;
    Ok(count)
}

#[derive(Debug, Deserialize)]
pub struct CommandsRequest {
    #[serde(default)]
    pub commands: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub message: String,
}

pub async fn process_commands(
    State(state): State<AppState>,
    Json(request): Json<CommandsRequest>,
) -> ApiResult {
    let date = {
        let session = state.session.lock().await;
        let mut status = state.status.lock().await;
        if status.running {
            return Err(ApiError::conflict());
        }
        status.running = true;
        session.paths.date.clone()
    };

    let result = run_commands(&state, &date, &request.commands).await;

    let (stage, total, selected) = {
        let session = state.session.lock().await;
        if let Err(e) = pipeline::save_candidates(&session.paths, session.workflow.candidates()) {
            error!("failed to save candidates: {:#}", e);
        }
        (
            session.workflow.stage(),
            session.workflow.candidates().len(),
            session.workflow.selected().len(),
        )
    };
    state.sync_stage(stage).await;

    let reports = result.map_err(ApiError::internal)?;
    Ok(Json(json!({
        "results": reports,
        "total": total,
        "selected": selected,
    })))
}

/// Apply each line under the session lock; network fetches run with the lock released
async fn run_commands(
    state: &AppState,
    date: &str,
    commands: &[String],
) -> anyhow::Result<Vec<CommandReport>> {
    let assessor = pipeline::build_assessor(&state.config, date, state.use_llm)?;
    let extractor = EvidenceExtractor::new()?;

    let mut reports = Vec::new();
    for line in commands.iter().map(|c| c.trim()).filter(|c| !c.is_empty()) {
        let applied = {
            let mut session = state.session.lock().await;
            let weights = session.workflow.weights();
            session
                .workflow
                .apply_line(line)
                .map(|outcome| (outcome, weights))
        };

        let result = match applied {
            Ok((outcome, weights)) => {
                match pipeline::resolve(
                    &state.config,
                    &assessor,
                    &extractor,
                    outcome,
                    &weights,
                    Utc::now(),
                )
                .await
                {
                    Ok(fetched) => {
                        let mut session = state.session.lock().await;
                        pipeline::apply_fetched(&mut session.workflow, fetched)
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e.into()),
        };

        let report = match result {
            Ok(message) => CommandReport {
                command: line.to_string(),
                ok: true,
                message,
            },
            Err(e) => CommandReport {
                command: line.to_string(),
                ok: false,
                message: format!("{e:#}"),
            },
        };
        state
            .log(format!("{} → {}", report.command, report.message))
            .await;
        reports.push(report);
    }
    Ok(reports)
}

#[derive(Debug, Deserialize)]
pub struct WeightsRequest {
    pub weights: Weights,
}

pub async fn update_weights(
    State(state): State<AppState>,
    Json(request): Json<WeightsRequest>,
) -> ApiResult {
    let mut session = state.session.lock().await;
    let mut status = state.status.lock().await;
    if status.running {
        return Err(ApiError::conflict());
    }

    session
        .workflow
        .update_weights(request.weights)
        .map_err(ApiError::bad_request)?;
    status.weights = request.weights;
    status.log(format!(
        "權重已更新：技術 {} / 影響 {} / 實戰 {} / 時效 {}",
        request.weights.tech,
        request.weights.impact,
        request.weights.practical,
        request.weights.timely
    ));

    if !session.workflow.candidates().is_empty() {
        if let Err(e) = pipeline::save_candidates(&session.paths, session.workflow.candidates()) {
            error!("failed to save re-ranked candidates: {:#}", e);
        }
    }

    Ok(Json(json!({ "status": "ok", "weights": request.weights })))
}

pub async fn start_stage2(State(state): State<AppState>) -> ApiResult {
    let mut session = state.session.lock().await;
    let mut status = state.status.lock().await;
    if status.running {
        return Err(ApiError::conflict());
    }

    let chosen = session
        .workflow
        .begin_generation()
        .map_err(ApiError::bad_request)?;
    status.stage = session.workflow.stage();
    status.running = true;
    status.step(&format!("開始第二階段：{} 則已選新聞", chosen.len()), 0);
    drop(status);
    drop(session);

    tokio::spawn(run_stage2(state.clone(), chosen));
    Ok(Json(json!({ "status": "started" })))
}

pub(crate) async fn run_stage2(state: AppState, chosen: Vec<Candidate>) {
    match stage2(&state, &chosen).await {
        Ok(formats) => {
            let mut status = state.status.lock().await;
            status.results = Some(formats);
            status.step("第二階段完成：格式已產生", 100);
        }
        Err(e) => {
            error!("stage 2 failed: {:#}", e);
            let stage = {
                let mut session = state.session.lock().await;
                session.workflow.fail();
                session.workflow.stage()
            };
            state.sync_stage(stage).await;
            state.log(format!("❌ 第二階段失敗：{e:#}")).await;
        }
    }
}

async fn stage2(state: &AppState, chosen: &[Candidate]) -> anyhow::Result<Formats> {
    let paths = state.session.lock().await.paths.clone();
    state.step("產生三種格式", 30).await;

    let llm = if state.use_llm {
        gemini_from_config(&state.config)?
    } else {
        None
    };
    let formats = pipeline::generate_outputs(llm.as_deref(), &paths, chosen).await?;
    info!(dir = %paths.content_dir.display(), "stage 2 outputs written");

    state.step("🗄️ 儲存到資料庫", 95).await;
    let saved = DatabaseManager::from_config(&state.config.publish)?
        .save_results(&formats.format_a, &formats.format_c, chosen, &paths.date)
        .await;
    state
        .log(format!(
            "資料庫：GitHub 格式 A {} / Google Sheets {} / GitHub 資料庫 {}",
            mark(saved.github_format_a),
            mark(saved.google_sheets),
            mark(saved.github_database)
        ))
        .await;

    let stage = {
        let mut session = state.session.lock().await;
        session.workflow.complete()?;
        session.workflow.stage()
    };
    state.sync_stage(stage).await;
    Ok(formats)
}

fn mark(ok: bool) -> &'static str {
    if ok {
        "✓"
    } else {
        "✗"
    }
}

pub async fn status(State(state): State<AppState>) -> Json<crate::state::Status> {
    Json(state.status.lock().await.clone())
}

pub async fn candidates(State(state): State<AppState>) -> Json<Vec<Candidate>> {
    Json(state.session.lock().await.workflow.candidates().to_vec())
}

pub async fn selected(State(state): State<AppState>) -> Json<Vec<Candidate>> {
    Json(state.session.lock().await.workflow.selected())
}

pub async fn weights(State(state): State<AppState>) -> Json<Weights> {
    Json(state.status.lock().await.weights)
}

/// Formats from this server's last stage 2, or the files already on disk
async fn current_formats(state: &AppState) -> Result<(Formats, String), ApiError> {
    let (content_dir, date) = {
        let session = state.session.lock().await;
        (session.paths.content_dir.clone(), session.paths.date.clone())
    };
    if let Some(formats) = state.status.lock().await.results.clone() {
        return Ok((formats, date));
    }
    match load_formats(&content_dir).map_err(ApiError::internal)? {
        Some(formats) => Ok((formats, date)),
        None => Err(ApiError(StatusCode::NOT_FOUND, "尚無產出結果".to_string())),
    }
}

pub async fn results(State(state): State<AppState>) -> ApiResult<Formats> {
    current_formats(&state).await.map(|(formats, _)| Json(formats))
}

pub async fn download(
    State(state): State<AppState>,
    Path(format): Path<String>,
) -> Result<Response, ApiError> {
    let (formats, date) = current_formats(&state).await?;
    let (filename, body) = match format.as_str() {
        "format_a" => (SOCIAL_FILE, formats.format_a),
        "format_b" => (APA_FILE, formats.format_b),
        "format_c" => (DESIGN_FILE, formats.format_c),
        "full" => (FULL_RESULT_FILE, FormatGenerator::full_result(&formats, &date)),
        other => {
            return Err(ApiError(
                StatusCode::NOT_FOUND,
                format!("unknown format: {other}"),
            ))
        }
    };

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response())
}
