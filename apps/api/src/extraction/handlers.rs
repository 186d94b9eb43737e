use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::extraction::extract_fields;
use crate::merge::merge_extraction;
use crate::schema::FieldValue;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub applied_fields: Vec<String>,
    pub overall_confidence: f64,
    pub explanation: Option<String>,
    pub suggestions: Vec<String>,
    pub validation_errors: Vec<String>,
    pub values: BTreeMap<String, FieldValue>,
}

/// POST /api/v1/sessions/:id/chat
///
/// Forwards the chat text to the LLM, then merges the extraction into the
/// session. The LLM call happens outside the session lock; the merge itself
/// runs synchronously to completion under it.
pub async fn handle_chat(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if req.message.trim().is_empty() {
        return Err(AppError::Validation("Nachricht ist leer".to_string()));
    }

    let data = extract_fields(&req.message, &state.registry, &state.llm).await?;

    let registry = state.registry.clone();
    let merged = state
        .sessions
        .with_session(id, move |session| {
            let outcome = merge_extraction(session, &data, &registry);
            (outcome, session.values().clone(), data)
        })
        .await
        .ok_or_else(|| AppError::NotFound(format!("Sitzung {id} nicht gefunden")))?;

    let (outcome, values, data) = merged;
    Ok(Json(ChatResponse {
        applied_fields: outcome.applied,
        overall_confidence: data.overall_confidence,
        explanation: data.explanation,
        suggestions: data.suggestions,
        validation_errors: data.validation_errors,
        values,
    }))
}
