use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use metrics::{counter, histogram};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::types::{
    AppState, CaseVerdict, ExecutionRequest, JudgeError, JudgeOutcome, Language, TestCase,
};

/// Wire shape of both judge endpoints. Language arrives as a raw string and
/// is parsed case-sensitively here so an unknown identifier is a clean 422.
#[derive(Deserialize)]
pub struct JudgeRequest {
    pub language: String,
    pub source: String,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

type ErrorResponse = (StatusCode, Json<Value>);

fn parse_request(payload: JudgeRequest) -> Result<ExecutionRequest, JudgeError> {
    let language = Language::parse(&payload.language)?;
    Ok(ExecutionRequest {
        language,
        source: payload.source,
        test_cases: payload.test_cases,
    })
}

fn error_response(err: JudgeError) -> ErrorResponse {
    let status = match &err {
        JudgeError::LanguageNotSupported(_) | JudgeError::EmptySource => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() })))
}

fn record_case_timings(verdicts: &[CaseVerdict]) {
    for verdict in verdicts {
        histogram!("case_wall_time_ms").record(verdict.wall_time_ms as f64);
    }
}

/// Interactive "Run": judges the visible cases and returns full detail.
pub async fn run_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<JudgeRequest>,
) -> Result<Json<Vec<CaseVerdict>>, ErrorResponse> {
    counter!("requests_total", "endpoint" => "run").increment(1);
    let request = parse_request(payload).map_err(error_response)?;

    match state.judge.preview(&request).await {
        Ok(verdicts) => {
            record_case_timings(&verdicts);
            counter!("judge_requests_total", "endpoint" => "run", "outcome" => "ok").increment(1);
            Ok(Json(verdicts))
        }
        Err(err) => {
            tracing::error!("run request failed: {err}");
            counter!("judge_requests_total", "endpoint" => "run", "outcome" => "error")
                .increment(1);
            Err(error_response(err))
        }
    }
}

/// Graded "Submit": judges every case, hands the full outcome to the
/// persistence collaborator, and answers with the redacted view.
pub async fn submit_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<JudgeRequest>,
) -> Result<Json<JudgeOutcome>, ErrorResponse> {
    counter!("requests_total", "endpoint" => "submit").increment(1);
    let request = parse_request(payload).map_err(error_response)?;

    match state.judge.grade(&request).await {
        Ok(outcome) => {
            record_case_timings(&outcome.verdicts);
            counter!("submissions_total", "overall" => outcome.aggregate.overall.as_str())
                .increment(1);
            tracing::info!(
                language = %request.language,
                passed = outcome.aggregate.passed,
                total = outcome.aggregate.total,
                overall = outcome.aggregate.overall.as_str(),
                "graded submission"
            );
            Ok(Json(outcome.redacted()))
        }
        Err(err) => {
            tracing::error!("submit request failed: {err}");
            counter!("judge_requests_total", "endpoint" => "submit", "outcome" => "error")
                .increment(1);
            Err(error_response(err))
        }
    }
}
