use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::backends::SubmitReceipt;
use crate::errors::AppError;
use crate::schema::{FieldType, FieldValue};
use crate::session::provenance::Provenance;
use crate::session::FormSession;
use crate::state::AppState;
use crate::xml::serialize_antrag;

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    /// Contract number for product-tree hydration from the legacy system.
    pub vertragsnummer: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: Uuid,
    pub values: BTreeMap<String, FieldValue>,
    pub provenance: BTreeMap<String, Provenance>,
}

impl SessionResponse {
    fn from_session(session: &FormSession) -> Self {
        SessionResponse {
            id: session.id,
            values: session.values().clone(),
            provenance: session.provenance_map().clone(),
        }
    }
}

/// POST /api/v1/sessions
pub async fn handle_create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let mut session = FormSession::new(&state.registry);

    if let Some(vertragsnummer) = &req.vertragsnummer {
        let tree = state.contracts.load_product_tree(vertragsnummer).await?;
        // Structural hydration bypasses the marking path on purpose; row
        // eligibility later falls back to the populated-column heuristic.
        session.set_value("sparten", FieldValue::Table(tree.sparten));
        session.set_value("bausteine", FieldValue::Table(tree.bausteine));
    }

    let response = SessionResponse::from_session(&session);
    state.sessions.insert(session).await;
    Ok(Json(response))
}

/// GET /api/v1/sessions/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Sitzung {id} nicht gefunden")))?;
    Ok(Json(SessionResponse::from_session(&session)))
}

#[derive(Debug, Deserialize)]
pub struct SetFieldRequest {
    pub value: Value,
    /// For table fields: the row to update. The value is then an object of
    /// column values merged onto that row.
    pub row_id: Option<String>,
}

/// PATCH /api/v1/sessions/:id/fields/:key
pub async fn handle_set_field(
    State(state): State<AppState>,
    Path((id, key)): Path<(Uuid, String)>,
    Json(req): Json<SetFieldRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let def = state
        .registry
        .field_by_key(&key)
        .ok_or_else(|| AppError::NotFound(format!("Feld '{key}' ist nicht definiert")))?
        .clone();

    let result = state
        .sessions
        .with_session(id, move |session| -> Result<SessionResponse, AppError> {
            match &req.row_id {
                Some(row_id) => {
                    if def.field_type != FieldType::Table {
                        return Err(AppError::Validation(format!(
                            "Feld '{}' ist keine Tabelle",
                            def.key
                        )));
                    }
                    let columns = req.value.as_object().cloned().ok_or_else(|| {
                        AppError::Validation("Zeilenwert muss ein Objekt sein".to_string())
                    })?;
                    let rows = session.rows_mut(def.key).ok_or_else(|| {
                        AppError::NotFound(format!("Tabelle '{}' fehlt", def.key))
                    })?;
                    let row = rows.iter_mut().find(|r| r.id == *row_id).ok_or_else(|| {
                        AppError::NotFound(format!("Zeile '{row_id}' nicht gefunden"))
                    })?;
                    for (col, value) in columns {
                        row.set_column(col, value);
                    }
                    row.is_real_input = true;
                }
                None => {
                    let value = parse_scalar(&req.value, &def)?;
                    session.mark_real_input(def.key, value);
                }
            }
            Ok(SessionResponse::from_session(session))
        })
        .await
        .ok_or_else(|| AppError::NotFound(format!("Sitzung {id} nicht gefunden")))?;

    result.map(Json)
}

/// Validates a UI-supplied scalar against the field definition. Unlike the
/// merge path, the UI gets hard validation errors instead of silent coercion.
fn parse_scalar(value: &Value, def: &crate::schema::FieldDefinition) -> Result<FieldValue, AppError> {
    let mismatch = || {
        AppError::Validation(format!(
            "Wert passt nicht zum Feldtyp von '{}'",
            def.key
        ))
    };
    match def.field_type {
        FieldType::Date => {
            let s = value.as_str().ok_or_else(mismatch)?;
            if s != crate::schema::DATE_SENTINEL
                && chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_err()
            {
                return Err(AppError::Validation(format!(
                    "'{s}' ist kein gültiges Datum für '{}'",
                    def.key
                )));
            }
            Ok(FieldValue::Text(s.to_string()))
        }
        FieldType::Text => {
            let s = value.as_str().ok_or_else(mismatch)?;
            Ok(FieldValue::Text(s.to_string()))
        }
        FieldType::Tristate => {
            let s = value.as_str().ok_or_else(mismatch)?;
            if !matches!(s, "J" | "N" | " ") {
                return Err(AppError::Validation(format!(
                    "'{s}' ist kein gültiger Wert für '{}'",
                    def.key
                )));
            }
            Ok(FieldValue::Text(s.to_string()))
        }
        FieldType::Number => {
            let n = value.as_f64().ok_or_else(mismatch)?;
            if def.min.map(|min| n < min).unwrap_or(false)
                || def.max.map(|max| n > max).unwrap_or(false)
            {
                return Err(AppError::Validation(format!(
                    "Wert {n} liegt außerhalb des gültigen Bereichs für '{}'",
                    def.key
                )));
            }
            Ok(FieldValue::Number(n))
        }
        FieldType::Boolean => Ok(FieldValue::Bool(value.as_bool().ok_or_else(mismatch)?)),
        FieldType::Table => Err(AppError::Validation(format!(
            "Tabelle '{}' wird zeilenweise geändert",
            def.key
        ))),
    }
}

#[derive(Debug, Serialize)]
pub struct EinreichenResponse {
    #[serde(flatten)]
    pub receipt: SubmitReceipt,
    pub dokument: String,
}

/// POST /api/v1/sessions/:id/einreichen
/// Serializes the session and hands the document to the persistence backend.
pub async fn handle_einreichen(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<EinreichenResponse>, AppError> {
    let session = state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Sitzung {id} nicht gefunden")))?;

    let dokument = serialize_antrag(&session, &state.registry);
    let receipt = state.persistence.submit(&dokument).await?;
    Ok(Json(EinreichenResponse { receipt, dokument }))
}
