// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! HTTP surface.
//!
//! | Route | Purpose |
//! |---|---|
//! | `POST /patient-data` | anchor and store `{patientId, data}` |
//! | `GET /patient-data/:patientId` | stored document |
//! | `GET /patient-data/:patientId/verify` | section-wise verification |
//! | `POST /assessment` | fold a flat assessment form, then anchor and store it |
//! | `GET /caregiver-advice/:patientId` | advice for a stored patient |
//! | `GET /frequency-analysis/:patientId` | symptom event counts |
//! | `GET /visualization/:patientId` | metric subsets for charts |
//! | `GET /health` | backend reachability |
//!
//! Errors are `{"error": message}`. Write failures carry a generic message;
//! the cause is logged, not returned.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{MatchedPath, Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::error;

use crate::advice::{is_truthy, CaregiverAdvice};
use crate::assessment::{FrequencyAnalysis, Visualization};
use crate::error::IntegrityError;
use crate::metrics;
use crate::record::{PatientId, Section};
use crate::service::{HealthCheck, IntegrityService};
use crate::verifier::Verification;

type SharedService = Arc<IntegrityService>;
type ApiResult<T> = std::result::Result<T, ApiError>;

const STORE_FAILED: &str = "failed to store patient data";
const LOAD_FAILED: &str = "failed to load patient data";
const NOT_FOUND: &str = "Patient data not found";

/// Build the router. `/metrics` is mounted by the binary, not here.
pub fn router(service: SharedService) -> Router {
    Router::new()
        .route("/patient-data", post(submit_patient_data))
        .route("/patient-data/:patient_id", get(get_patient_data))
        .route("/patient-data/:patient_id/verify", get(verify_patient_data))
        .route("/assessment", post(submit_assessment))
        .route("/caregiver-advice/:patient_id", get(get_caregiver_advice))
        .route("/frequency-analysis/:patient_id", get(get_frequency_analysis))
        .route("/visualization/:patient_id", get(get_visualization))
        .route("/health", get(health))
        .route_layer(middleware::from_fn(record_request))
        .with_state(service)
}

async fn record_request(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let response = next.run(request).await;
    metrics::record_http_request(&route, response.status().as_u16());
    response
}

/// Patient ids arrive as JSON numbers or numeric strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PatientIdInput {
    Number(u64),
    Text(String),
}

impl PatientIdInput {
    fn resolve(self) -> ApiResult<PatientId> {
        match self {
            Self::Number(id) => Ok(id),
            Self::Text(text) => parse_patient_id(&text),
        }
    }
}

fn parse_patient_id(text: &str) -> ApiResult<PatientId> {
    text.trim()
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid patient ID"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest {
    patient_id: PatientIdInput,
    data: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    success: bool,
    tx_hash: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssessmentResponse {
    status: &'static str,
    tx_hash: String,
    data: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponse {
    patient_id: PatientId,
    status: &'static str,
    verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    mismatched_sections: Option<Vec<Section>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl VerifyResponse {
    fn new(patient_id: PatientId, verification: Verification) -> Self {
        let status = verification.status();
        let verified = verification.is_verified();
        let (mismatched_sections, reason) = match verification {
            Verification::Verified => (None, None),
            Verification::Mismatched { sections } => (Some(sections), None),
            Verification::Indeterminate(cause) => (None, Some(cause.to_string())),
        };
        Self {
            patient_id,
            status,
            verified,
            mismatched_sections,
            reason,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    state: String,
    ledger_reachable: bool,
    documents_reachable: bool,
}

impl From<HealthCheck> for HealthResponse {
    fn from(check: HealthCheck) -> Self {
        Self {
            status: if check.healthy { "healthy" } else { "degraded" },
            state: check.state,
            ledger_reachable: check.ledger_reachable,
            documents_reachable: check.documents_reachable,
        }
    }
}

async fn submit_patient_data(
    State(service): State<SharedService>,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> ApiResult<Json<SubmitResponse>> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(&e.body_text()))?;
    let patient_id = request.patient_id.resolve()?;

    let receipt = service
        .submit(patient_id, request.data)
        .await
        .map_err(|e| ApiError::from_integrity(e, STORE_FAILED))?;

    Ok(Json(SubmitResponse {
        success: true,
        tx_hash: receipt.tx_hash,
    }))
}

/// The form carries its patient id as `userId`, next to the form fields.
fn assessment_patient_id(form: &Value) -> ApiResult<PatientId> {
    let raw = form
        .get("userId")
        .filter(|v| is_truthy(v))
        .ok_or_else(|| ApiError::bad_request("User ID is required"))?;
    serde_json::from_value::<PatientIdInput>(raw.clone())
        .map_err(|_| ApiError::bad_request("Invalid patient ID"))?
        .resolve()
}

async fn submit_assessment(
    State(service): State<SharedService>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<AssessmentResponse>> {
    let Json(form) = body.map_err(|e| ApiError::bad_request(&e.body_text()))?;
    if !form.is_object() {
        return Err(ApiError::bad_request("No data provided"));
    }
    let patient_id = assessment_patient_id(&form)?;

    let (receipt, document) = service
        .submit_assessment(patient_id, &form)
        .await
        .map_err(|e| ApiError::from_integrity(e, STORE_FAILED))?;

    Ok(Json(AssessmentResponse {
        status: "success",
        tx_hash: receipt.tx_hash,
        data: document,
    }))
}

async fn get_patient_data(
    State(service): State<SharedService>,
    Path(patient_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let patient_id = parse_patient_id(&patient_id)?;

    service
        .document(patient_id)
        .await
        .map_err(|e| ApiError::from_integrity(e, LOAD_FAILED))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))
}

async fn verify_patient_data(
    State(service): State<SharedService>,
    Path(patient_id): Path<String>,
) -> ApiResult<Json<VerifyResponse>> {
    let patient_id = parse_patient_id(&patient_id)?;

    let verification = service
        .verify(patient_id, None)
        .await
        .map_err(|e| ApiError::from_integrity(e, LOAD_FAILED))?;

    Ok(Json(VerifyResponse::new(patient_id, verification)))
}

async fn get_caregiver_advice(
    State(service): State<SharedService>,
    Path(patient_id): Path<String>,
) -> ApiResult<Json<CaregiverAdvice>> {
    let patient_id = parse_patient_id(&patient_id)?;

    service
        .advice(patient_id)
        .await
        .map_err(|e| ApiError::from_integrity(e, LOAD_FAILED))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))
}

async fn get_frequency_analysis(
    State(service): State<SharedService>,
    Path(patient_id): Path<String>,
) -> ApiResult<Json<FrequencyAnalysis>> {
    let patient_id = parse_patient_id(&patient_id)?;

    service
        .frequency_analysis(patient_id)
        .await
        .map_err(|e| ApiError::from_integrity(e, LOAD_FAILED))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))
}

async fn get_visualization(
    State(service): State<SharedService>,
    Path(patient_id): Path<String>,
) -> ApiResult<Json<Visualization>> {
    let patient_id = parse_patient_id(&patient_id)?;

    service
        .visualization(patient_id)
        .await
        .map_err(|e| ApiError::from_integrity(e, LOAD_FAILED))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))
}

async fn health(State(service): State<SharedService>) -> Response {
    let response = HealthResponse::from(service.health().await);
    let status = if response.status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response)).into_response()
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.to_string(),
        }
    }

    fn not_found(message: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.to_string(),
        }
    }

    /// Map a service error. Invalid input is echoed; everything else is
    /// logged and answered with `generic`.
    fn from_integrity(err: IntegrityError, generic: &str) -> Self {
        match err {
            IntegrityError::InvalidRecord(reason) => Self::bad_request(&reason),
            IntegrityError::NotReady(_) => Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                message: "service not ready".to_string(),
            },
            other => {
                error!(error = %other, retryable = other.is_retryable(), "{}", generic);
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: generic.to_string(),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message
        }));
        (self.status, body).into_response()
    }
}
