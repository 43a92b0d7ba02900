use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::startup::AppState;

pub async fn health_check(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state.records.health_check().await?;
    Ok(Json(json!({
        "status": "OK",
        "message": "Tax API running",
        "version": env!("CARGO_PKG_VERSION"),
    })))
}
