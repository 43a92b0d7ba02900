use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::Serialize;
use tax_core::Taxpayer;
use tax_core::records::{TaxpayerRequest, WriteMode};

use crate::error::ApiError;
use crate::startup::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxpayerSaved {
    pub message: &'static str,
    pub payer_id: String,
    pub taxpayer: Taxpayer,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxpayerDeleted {
    pub message: &'static str,
    pub payer_id: String,
}

pub async fn list_taxpayers(State(state): State<AppState>) -> Result<Json<Vec<Taxpayer>>, ApiError> {
    Ok(Json(state.records.list_taxpayers().await?))
}

pub async fn get_taxpayer(
    State(state): State<AppState>,
    Path(payer_id): Path<String>,
) -> Result<Json<Taxpayer>, ApiError> {
    Ok(Json(state.records.get_taxpayer(&payer_id).await?))
}

pub async fn create_taxpayer(
    State(state): State<AppState>,
    payload: Result<Json<TaxpayerRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TaxpayerSaved>), ApiError> {
    let Json(request) = payload?;
    let taxpayer = state
        .records
        .save_taxpayer(WriteMode::Create, request)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(TaxpayerSaved {
            message: "Taxpayer created",
            payer_id: taxpayer.payer_id.clone(),
            taxpayer,
        }),
    ))
}

pub async fn update_taxpayer(
    State(state): State<AppState>,
    Path(payer_id): Path<String>,
    payload: Result<Json<TaxpayerRequest>, JsonRejection>,
) -> Result<Json<TaxpayerSaved>, ApiError> {
    let Json(request) = payload?;
    let taxpayer = state
        .records
        .save_taxpayer(WriteMode::Update(payer_id), request)
        .await?;

    Ok(Json(TaxpayerSaved {
        message: "Taxpayer updated",
        payer_id: taxpayer.payer_id.clone(),
        taxpayer,
    }))
}

pub async fn delete_taxpayer(
    State(state): State<AppState>,
    Path(payer_id): Path<String>,
) -> Result<Json<TaxpayerDeleted>, ApiError> {
    state.records.delete_taxpayer(&payer_id).await?;
    Ok(Json(TaxpayerDeleted {
        message: "Taxpayer deleted",
        payer_id,
    }))
}
