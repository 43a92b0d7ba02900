use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tax_core::records::{AssessmentRequest, ValidationErrors, WriteMode};
use tax_core::{Assessment, AssessmentFigures, AssessmentFilter};

use crate::error::ApiError;
use crate::startup::AppState;

/// `?payerId=&year=`; blank values mean "any".
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentQuery {
    pub payer_id: Option<String>,
    pub year: Option<String>,
}

impl AssessmentQuery {
    fn into_filter(self) -> Result<AssessmentFilter, ApiError> {
        let payer_id = self
            .payer_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        let year = match self.year.as_deref().map(str::trim).filter(|y| !y.is_empty()) {
            Some(text) => Some(text.parse::<i32>().map_err(|_| {
                ApiError::Validation(ValidationErrors::single("year", "must be a whole number"))
            })?),
            None => None,
        };
        Ok(AssessmentFilter { payer_id, year })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentSaved {
    pub message: &'static str,
    pub assessment_id: String,
    pub assessment: Assessment,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentDeleted {
    pub message: &'static str,
    pub assessment_id: String,
}

pub async fn list_assessments(
    State(state): State<AppState>,
    query: Result<Query<AssessmentQuery>, QueryRejection>,
) -> Result<Json<Vec<Assessment>>, ApiError> {
    let Query(query) = query?;
    let filter = query.into_filter()?;
    Ok(Json(state.records.list_assessments(&filter).await?))
}

pub async fn get_assessment(
    State(state): State<AppState>,
    Path(assessment_id): Path<String>,
) -> Result<Json<Assessment>, ApiError> {
    Ok(Json(state.records.get_assessment(&assessment_id).await?))
}

pub async fn create_assessment(
    State(state): State<AppState>,
    payload: Result<Json<AssessmentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AssessmentSaved>), ApiError> {
    let Json(request) = payload?;
    let assessment = state
        .records
        .save_assessment(WriteMode::Create, request)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AssessmentSaved {
            message: "Assessment created",
            assessment_id: assessment.assessment_id.clone(),
            assessment,
        }),
    ))
}

/// Figures the calculator would store for this input. Nothing is saved.
pub async fn preview_assessment(
    State(state): State<AppState>,
    payload: Result<Json<AssessmentRequest>, JsonRejection>,
) -> Result<Json<AssessmentFigures>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(state.records.preview_assessment(&request)))
}

pub async fn update_assessment(
    State(state): State<AppState>,
    Path(assessment_id): Path<String>,
    payload: Result<Json<AssessmentRequest>, JsonRejection>,
) -> Result<Json<AssessmentSaved>, ApiError> {
    let Json(request) = payload?;
    let assessment = state
        .records
        .save_assessment(WriteMode::Update(assessment_id), request)
        .await?;

    Ok(Json(AssessmentSaved {
        message: "Assessment updated",
        assessment_id: assessment.assessment_id.clone(),
        assessment,
    }))
}

pub async fn delete_assessment(
    State(state): State<AppState>,
    Path(assessment_id): Path<String>,
) -> Result<Json<AssessmentDeleted>, ApiError> {
    state.records.delete_assessment(&assessment_id).await?;
    Ok(Json(AssessmentDeleted {
        message: "Assessment deleted",
        assessment_id,
    }))
}
