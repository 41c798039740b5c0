/// Recommendation Read API
///
/// Serves the latest completed recommendation set and pipeline health. The
/// pipeline itself never runs on this path; reads only touch the serving
/// table, which is swapped transactionally per (user, kind).
use actix_web::{get, web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{PipelineStateStore, RecommendationStore};
use crate::error::{AppError, Result};
use crate::models::{CandidateKind, StageStatus};

const MAX_LIMIT: usize = 100;

pub struct ApiState {
    pub recommendations: Arc<dyn RecommendationStore>,
    pub pipeline_state: Arc<dyn PipelineStateStore>,
}

#[derive(Debug, Deserialize)]
pub struct RecommendationQuery {
    #[serde(default = "default_kind")]
    pub kind: String,

    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_kind() -> String {
    "mentor".to_string()
}

fn default_limit() -> usize {
    20
}

#[derive(Debug, Serialize)]
pub struct RecommendationItem {
    pub candidate_id: Uuid,
    pub rank: i32,
    pub final_score: f64,
    pub collaborative_score: f64,
    pub content_score: f64,
    pub cold_start: bool,
}

#[derive(Debug, Serialize)]
pub struct RecommendationsResponse {
    pub user_id: Uuid,
    pub kind: CandidateKind,
    pub generated_at: Option<DateTime<Utc>>,
    pub items: Vec<RecommendationItem>,
}

#[get("/api/v1/recommendations/{user_id}")]
pub async fn get_recommendations(
    path: web::Path<Uuid>,
    query: web::Query<RecommendationQuery>,
    state: web::Data<ApiState>,
) -> Result<HttpResponse> {
    let user_id = path.into_inner();
    let kind = CandidateKind::parse(&query.kind)
        .ok_or_else(|| AppError::BadRequest(format!("unknown candidate kind: {}", query.kind)))?;
    let limit = query.limit.clamp(1, MAX_LIMIT) as i64;

    let records = state
        .recommendations
        .fetch_for_user(user_id, kind, limit)
        .await?;

    let response = RecommendationsResponse {
        user_id,
        kind,
        generated_at: records.first().map(|r| r.generated_at),
        items: records
            .into_iter()
            .map(|r| RecommendationItem {
                candidate_id: r.candidate_id,
                rank: r.rank,
                final_score: r.final_score,
                collaborative_score: r.collaborative_score,
                content_score: r.content_score,
                cold_start: r.cold_start,
            })
            .collect(),
    };

    Ok(HttpResponse::Ok().json(response))
}

#[derive(Debug, Serialize)]
pub struct PipelineStatusResponse {
    pub stages: Vec<StageStatus>,
}

#[get("/api/v1/pipeline/status")]
pub async fn get_pipeline_status(state: web::Data<ApiState>) -> Result<HttpResponse> {
    let stages = state.pipeline_state.stage_statuses().await?;
    Ok(HttpResponse::Ok().json(PipelineStatusResponse { stages }))
}

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"status": "ok"}))
}
