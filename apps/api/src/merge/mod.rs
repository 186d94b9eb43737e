//! Extraction Merge Engine — reconciles the loosely typed LLM extraction
//! against the current form session.
//!
//! All tolerance rules live here: the fixed confidence cutoff, unknown-key
//! tolerance (the prompt and the registry may drift), and per-type coercion
//! with safe fallbacks. Nothing in this module performs I/O or throws past
//! its boundary; a field that cannot be handled is skipped, not fatal.

pub mod rows;
pub mod sparten;

use serde_json::Value;
use tracing::{debug, warn};

use crate::domain;
use crate::extraction::ExtractionData;
use crate::schema::{FieldDefinition, FieldRegistry, FieldType, FieldValue};
use crate::session::FormSession;

/// Hard cutoff, not a weighted blend. Values at or below this are discarded
/// entirely. Fixed for compatibility with the extraction prompt tuning.
pub const CONFIDENCE_THRESHOLD: f64 = 0.5;

#[derive(Debug, Default)]
pub struct MergeOutcome {
    /// Field keys (scalars) and `table:rowId` entries (tables) that changed.
    pub applied: Vec<String>,
}

/// Merges one extraction result into the session. Applied in the iteration
/// order of the result's keys; cross-field side effects (Vollkasko/Teilkasko
/// exclusivity) fire only while processing the action that triggers them.
pub fn merge_extraction(
    session: &mut FormSession,
    data: &ExtractionData,
    registry: &FieldRegistry,
) -> MergeOutcome {
    let mut applied = Vec::new();

    for (key, entry) in &data.extracted_data {
        if is_empty_value(&entry.value) {
            continue;
        }
        if entry.confidence <= CONFIDENCE_THRESHOLD {
            debug!(
                "Feld '{key}' verworfen: confidence {} unter Schwelle",
                entry.confidence
            );
            continue;
        }
        let Some(def) = registry.field_by_key(key) else {
            warn!("Extraktion lieferte unbekanntes Feld '{key}', ignoriert");
            continue;
        };

        match def.field_type {
            FieldType::Table => {
                // The model cannot be trusted with structural rows; product
                // tables only change through the dedicated action matcher
                // with its guard and exclusivity rules.
                if sparten::is_product_table(key) {
                    warn!(
                        "Extraktion lieferte Tabellenwerte für Produkttabelle '{key}', \
                         nur Aktionen sind erlaubt, ignoriert"
                    );
                    continue;
                }
                let incoming = rows::parse_incoming_rows(&entry.value);
                if incoming.is_empty() {
                    continue;
                }
                if let Some(existing) = session.rows_mut(key) {
                    rows::reconcile_rows(existing, incoming);
                    applied.push(key.clone());
                }
            }
            _ => {
                let coerced = coerce_scalar(&entry.value, def);
                if session.value(key) != Some(&coerced) {
                    session.mark_real_input(key, coerced);
                    applied.push(key.clone());
                }
            }
        }
    }

    sparten::apply_sparten_actions(session, &data.sparten_actions, &mut applied);
    sparten::apply_baustein_actions(session, &data.baustein_actions, &mut applied);

    MergeOutcome { applied }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Fixed coercion rules per declared type. Failures fall back to the type's
/// safe default instead of aborting the merge.
fn coerce_scalar(value: &Value, def: &FieldDefinition) -> FieldValue {
    match def.field_type {
        FieldType::Date => FieldValue::Text(value.as_str().unwrap_or_default().to_string()),
        FieldType::Text => {
            let raw = match value {
                Value::String(s) => s.trim().to_string(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => String::new(),
            };
            match def.domain {
                Some(domain_id) => FieldValue::Text(domain::resolve_option(domain_id, &raw)),
                None => FieldValue::Text(raw),
            }
        }
        FieldType::Number => FieldValue::Number(coerce_number(value)),
        FieldType::Boolean => FieldValue::Bool(is_truthy(value)),
        FieldType::Tristate => {
            let s = value.as_str().unwrap_or(" ");
            let valid = matches!(s, "J" | "N" | " ");
            FieldValue::Text(if valid { s.to_string() } else { " ".to_string() })
        }
        // Tables never reach scalar coercion.
        FieldType::Table => FieldValue::Table(Vec::new()),
    }
}

fn coerce_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().replace(',', ".").parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().unwrap_or(0.0) != 0.0,
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::ExtractedField;
    use crate::session::provenance::Provenance;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn data_with(fields: &[(&str, Value, f64)]) -> ExtractionData {
        let mut extracted = BTreeMap::new();
        for (key, value, confidence) in fields {
            extracted.insert(
                key.to_string(),
                ExtractedField {
                    value: value.clone(),
                    confidence: *confidence,
                    source: String::new(),
                },
            );
        }
        ExtractionData {
            extracted_data: extracted,
            ..Default::default()
        }
    }

    fn fresh() -> (FieldRegistry, FormSession) {
        let registry = FieldRegistry::kraftfahrt();
        let session = FormSession::new(&registry);
        (registry, session)
    }

    #[test]
    fn test_high_confidence_scalar_applies_with_provenance() {
        let (registry, mut session) = fresh();
        let data = data_with(&[("fahrzeugmarke", json!("BMW"), 0.9)]);
        let outcome = merge_extraction(&mut session, &data, &registry);

        assert_eq!(outcome.applied, vec!["fahrzeugmarke".to_string()]);
        assert_eq!(
            session.value("fahrzeugmarke"),
            Some(&FieldValue::Text("BMW".to_string()))
        );
        assert!(session.is_real_input("fahrzeugmarke", &registry));
    }

    #[test]
    fn test_confidence_at_or_below_threshold_is_discarded() {
        let (registry, mut session) = fresh();
        let data = data_with(&[
            ("jahreskilometer", json!(12000), 0.3),
            ("fahrzeugtyp", json!("320d"), 0.5),
        ]);
        let outcome = merge_extraction(&mut session, &data, &registry);

        assert!(outcome.applied.is_empty());
        assert_eq!(session.value("jahreskilometer"), Some(&FieldValue::Number(0.0)));
        assert_eq!(session.provenance("jahreskilometer"), Provenance::Untouched);
        assert_eq!(session.provenance("fahrzeugtyp"), Provenance::Untouched);
    }

    #[test]
    fn test_unknown_key_is_tolerated() {
        let (registry, mut session) = fresh();
        let data = data_with(&[
            ("unbekanntes_feld", json!("x"), 0.9),
            ("fahrzeugmarke", json!("Audi"), 0.9),
        ]);
        let outcome = merge_extraction(&mut session, &data, &registry);
        // The unknown key neither fails nor disturbs the other merge.
        assert_eq!(outcome.applied, vec!["fahrzeugmarke".to_string()]);
    }

    #[test]
    fn test_empty_and_null_values_are_skipped() {
        let (registry, mut session) = fresh();
        let data = data_with(&[
            ("fahrzeugmarke", json!(""), 0.9),
            ("fahrzeugtyp", Value::Null, 0.9),
        ]);
        let outcome = merge_extraction(&mut session, &data, &registry);
        assert!(outcome.applied.is_empty());
    }

    #[test]
    fn test_scalar_merge_is_idempotent() {
        let (registry, mut session) = fresh();
        let data = data_with(&[("fahrzeugmarke", json!("BMW"), 0.9)]);

        let first = merge_extraction(&mut session, &data, &registry);
        let second = merge_extraction(&mut session, &data, &registry);

        assert_eq!(first.applied, vec!["fahrzeugmarke".to_string()]);
        // Unchanged value: nothing re-applied on the second pass.
        assert!(second.applied.is_empty());
        assert_eq!(
            session.value("fahrzeugmarke"),
            Some(&FieldValue::Text("BMW".to_string()))
        );
    }

    #[test]
    fn test_table_remerge_updates_in_place_no_duplicates() {
        let (registry, mut session) = fresh();
        let data = data_with(&[(
            "kilometerstaende",
            json!([{"id": "1", "art": "aktuell", "kmstand": 42000}]),
            0.9,
        )]);

        merge_extraction(&mut session, &data, &registry);
        merge_extraction(&mut session, &data, &registry);

        let rows = session.rows("kilometerstaende").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].column("kmstand"), Some(&json!(42000)));
    }

    #[test]
    fn test_number_coercion_falls_back_to_zero() {
        let (registry, mut session) = fresh();
        let data = data_with(&[("jahreskilometer", json!("zwölftausend"), 0.9)]);
        merge_extraction(&mut session, &data, &registry);
        assert_eq!(session.value("jahreskilometer"), Some(&FieldValue::Number(0.0)));
    }

    #[test]
    fn test_number_coercion_parses_string_with_comma() {
        let (registry, mut session) = fresh();
        let data = data_with(&[("neuwert", json!("45000,50"), 0.9)]);
        merge_extraction(&mut session, &data, &registry);
        assert_eq!(session.value("neuwert"), Some(&FieldValue::Number(45000.5)));
    }

    #[test]
    fn test_boolean_and_tristate_coercion() {
        let (registry, mut session) = fresh();
        let data = data_with(&[
            ("garage", json!("ja"), 0.9),
            ("saisonkennzeichen", json!("J"), 0.9),
            ("wechselkennzeichen", json!("vielleicht"), 0.9),
        ]);
        merge_extraction(&mut session, &data, &registry);

        assert_eq!(session.value("garage"), Some(&FieldValue::Bool(true)));
        assert_eq!(
            session.value("saisonkennzeichen"),
            Some(&FieldValue::Text("J".to_string()))
        );
        // Outside the whitelist: falls back to unset.
        assert_eq!(
            session.value("wechselkennzeichen"),
            Some(&FieldValue::Text(" ".to_string()))
        );
        // Coerced to the default tristate, so nothing actually changed.
        assert_eq!(
            session.provenance("wechselkennzeichen"),
            Provenance::Untouched
        );
    }

    #[test]
    fn test_dropdown_field_resolves_through_domain() {
        let (registry, mut session) = fresh();
        let data = data_with(&[("zahlweise", json!("monatlich"), 0.9)]);
        merge_extraction(&mut session, &data, &registry);
        assert_eq!(
            session.value("zahlweise"),
            Some(&FieldValue::Text("12".to_string()))
        );
    }

    #[test]
    fn test_table_value_that_is_not_an_array_is_skipped() {
        let (registry, mut session) = fresh();
        let data = data_with(&[("zubehoer", json!("Anhängerkupplung"), 0.9)]);
        let outcome = merge_extraction(&mut session, &data, &registry);
        assert!(outcome.applied.is_empty());
        assert_eq!(session.rows("zubehoer").unwrap().len(), 0);
    }

    #[test]
    fn test_extracted_table_payload_cannot_touch_product_tables() {
        let (registry, mut session) = fresh();
        let mut kk = crate::schema::TableRow::new("KK");
        kk.set_column("beschreibung", json!("Vollkasko"));
        kk.set_column("check", json!(false));
        let mut ek = crate::schema::TableRow::new("EK");
        ek.set_column("beschreibung", json!("Teilkasko"));
        ek.set_column("check", json!(true));
        session.set_value("sparten", FieldValue::Table(vec![kk, ek]));

        // Row payloads on the product tables bypass the action matcher's
        // exclusivity and not-mentioned rules, so they must be dropped.
        let data = data_with(&[(
            "sparten",
            json!([{"id": "KK", "check": true}, {"id": "EK", "check": false}]),
            0.95,
        )]);
        let outcome = merge_extraction(&mut session, &data, &registry);

        assert!(outcome.applied.is_empty());
        let rows = session.rows("sparten").unwrap();
        assert_eq!(rows[0].column("check"), Some(&json!(false)));
        assert_eq!(rows[1].column("check"), Some(&json!(true)));
        assert!(!rows[0].is_real_input);
    }

    #[test]
    fn test_date_passthrough() {
        let (registry, mut session) = fresh();
        let data = data_with(&[("erstzulassung", json!("2021-03-15"), 0.8)]);
        merge_extraction(&mut session, &data, &registry);
        assert_eq!(
            session.value("erstzulassung"),
            Some(&FieldValue::Text("2021-03-15".to_string()))
        );
    }
}
