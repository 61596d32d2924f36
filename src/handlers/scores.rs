//! Dashboard data endpoints consumed through the gate.
//!
//! These handlers are the downstream side of the forwarding contract:
//! they trust the `AuthContext` the gate attached instead of re-deriving
//! identity, and use it for minimum-tier guards.

use crate::{db::DbPool, error::AppError, middleware::gate::AuthContext, models::plan::Plan};
use axum::{Extension, Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One published model score.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Score {
    pub id: uuid::Uuid,
    pub model_name: String,
    pub score: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Aggregate row of the pro report.
#[derive(Debug, sqlx::FromRow, Serialize)]
pub struct ModelSummary {
    pub model_name: String,
    pub samples: i64,
    pub average_score: f64,
}

/// Pro report response.
#[derive(Debug, Serialize)]
pub struct ReportSummary {
    pub models: Vec<ModelSummary>,
    pub generated_at: DateTime<Utc>,
}

/// List recent model scores.
///
/// # Endpoint
///
/// `GET /api/v1/scores`
///
/// Available on every tier, including anonymous callers (who consume the
/// IP-keyed free budget the gate already charged).
pub async fn list_scores(State(pool): State<DbPool>) -> Result<Json<Vec<Score>>, AppError> {
    let scores = sqlx::query_as::<_, Score>(
        r#"
        SELECT id, model_name, score, recorded_at
        FROM scores
        ORDER BY recorded_at DESC
        LIMIT 100
        "#,
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(scores))
}

/// Aggregated score report, pro tier and above.
///
/// # Endpoint
///
/// `GET /api/v1/reports/summary`
///
/// The tier check reads the gateway-attached context only; nothing from
/// the wire can satisfy it.
///
/// # Response
///
/// - **Success (200 OK)**: per-model sample counts and averages
/// - **Error (403)**: caller's plan is below pro
pub async fn report_summary(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<ReportSummary>, AppError> {
    auth.require_plan(Plan::Pro)?;

    let models = sqlx::query_as::<_, ModelSummary>(
        r#"
        SELECT model_name, COUNT(*) AS samples, AVG(score) AS average_score
        FROM scores
        GROUP BY model_name
        ORDER BY model_name
        "#,
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(ReportSummary {
        models,
        generated_at: Utc::now(),
    }))
}
