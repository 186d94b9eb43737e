#![allow(dead_code)]

//! Extraction — wire types for the LLM response and the call that produces it.
//!
//! The response is untrusted, partially structured input: values stay as raw
//! `serde_json::Value` until the merge engine coerces them at its boundary.
//! Everything here is ephemeral, produced per chat turn and consumed
//! immediately by the merge.

pub mod handlers;
pub mod prompts;

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::errors::AppError;
use crate::llm_client::LlmClient;
use crate::schema::FieldRegistry;

#[derive(Debug, Deserialize)]
pub struct ExtractionResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Option<ExtractionData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionData {
    #[serde(default)]
    pub extracted_data: BTreeMap<String, ExtractedField>,
    /// Side channel for the product-line mini-model, keyed by line code or a
    /// semantic id the model invented. Resolved by the dedicated matcher, not
    /// the generic row reconciliation.
    #[serde(default)]
    pub sparten_actions: BTreeMap<String, SparteAction>,
    #[serde(default)]
    pub baustein_actions: Vec<BausteinAction>,
    #[serde(default)]
    pub overall_confidence: f64,
    #[serde(default)]
    pub validation_errors: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedField {
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SparteAction {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub betrag: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BausteinAction {
    #[serde(default)]
    pub sparte: Option<String>,
    #[serde(default)]
    pub knoten_id: Option<String>,
    #[serde(default)]
    pub beschreibung: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub betrag: Option<f64>,
    #[serde(default)]
    pub reason: String,
}

/// Sends the user's chat text to the LLM and returns the structured
/// extraction. The one place where an upstream failure propagates as a hard
/// error; retry with a stricter prompt is the UI's business.
pub async fn extract_fields(
    text: &str,
    registry: &FieldRegistry,
    llm: &LlmClient,
) -> Result<ExtractionData, AppError> {
    let prompt = prompts::build_extraction_prompt(registry, text);
    let response: ExtractionResponse = llm
        .call_json(&prompt, prompts::EXTRACTION_SYSTEM)
        .await
        .map_err(|e| AppError::Llm(format!("Extraktion fehlgeschlagen: {e}")))?;

    if !response.success {
        return Err(AppError::Llm(
            "Extraktion vom Modell als nicht erfolgreich markiert".to_string(),
        ));
    }

    response
        .data
        .ok_or_else(|| AppError::Llm("Extraktionsantwort ohne Daten".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_wire_shape_deserializes() {
        let json = r#"{
            "success": true,
            "data": {
                "extractedData": {
                    "fahrzeugmarke": {"value": "BMW", "confidence": 0.9, "source": "mein BMW"},
                    "jahreskilometer": {"value": 12000, "confidence": 0.3, "source": "ca. 12tkm"}
                },
                "spartenActions": {
                    "KK": {"active": true, "reason": "Vollkasko erkannt"}
                },
                "bausteinActions": [
                    {"sparte": "KK", "knotenId": null, "beschreibung": "Selbstbeteiligung",
                     "active": true, "betrag": 500, "reason": "SB 500 genannt"}
                ],
                "overallConfidence": 0.8,
                "suggestions": ["Erstzulassung fehlt noch"],
                "explanation": "Marke und Deckung erkannt"
            }
        }"#;

        let response: ExtractionResponse = serde_json::from_str(json).unwrap();
        assert!(response.success);
        let data = response.data.unwrap();
        assert_eq!(data.extracted_data["fahrzeugmarke"].value, json!("BMW"));
        assert_eq!(data.extracted_data["jahreskilometer"].confidence, 0.3);
        assert!(data.sparten_actions["KK"].active);
        assert_eq!(data.baustein_actions[0].betrag, Some(500.0));
        assert_eq!(data.suggestions.len(), 1);
    }

    #[test]
    fn test_missing_optional_sections_default_empty() {
        let json = r#"{"success": true, "data": {"extractedData": {}, "overallConfidence": 0.1}}"#;
        let response: ExtractionResponse = serde_json::from_str(json).unwrap();
        let data = response.data.unwrap();
        assert!(data.sparten_actions.is_empty());
        assert!(data.baustein_actions.is_empty());
        assert!(data.validation_errors.is_empty());
        assert!(data.explanation.is_none());
    }
}
