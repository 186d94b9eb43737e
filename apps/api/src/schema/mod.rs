#![allow(dead_code)]

//! Field Schema Registry — the static table of form field definitions.
//!
//! The registry is immutable after construction and shared read-only by all
//! form sessions. Synonyms are consumed only by the extraction prompt builder;
//! the merge engine matches on keys alone.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sentinel for "no date entered". Suppressed entirely on serialization.
pub const DATE_SENTINEL: &str = "0001-01-01";

/// The declared type of a form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Date,
    Text,
    Number,
    Boolean,
    Tristate,
    Table,
}

/// The current value of a form field. Scalar variants cover date/text/tristate
/// (all carried as strings on the wire), numbers and booleans; table fields
/// hold an ordered list of rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Table(Vec<TableRow>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_rows(&self) -> Option<&[TableRow]> {
        match self {
            FieldValue::Table(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn as_rows_mut(&mut self) -> Option<&mut Vec<TableRow>> {
        match self {
            FieldValue::Table(rows) => Some(rows),
            _ => None,
        }
    }
}

/// A single row of a table field. `id` is stable across merges; columns stay
/// loosely typed because incoming rows are shallow-merged field by field.
/// `knoten_id` and `synonyme` are only populated on product-tree rows
/// (sparten/bausteine) hydrated from the contract system.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    pub id: String,
    #[serde(default)]
    pub is_real_input: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knoten_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonyme: Vec<String>,
    #[serde(flatten)]
    pub columns: BTreeMap<String, Value>,
}

impl TableRow {
    pub fn new(id: impl Into<String>) -> Self {
        TableRow {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn column(&self, key: &str) -> Option<&Value> {
        self.columns.get(key)
    }

    pub fn set_column(&mut self, key: impl Into<String>, value: Value) {
        self.columns.insert(key.into(), value);
    }

    /// True if any column besides the id carries actual content.
    /// Used as the eligibility fallback for rows that were hydrated from an
    /// external structural load and never passed the explicit marking path.
    pub fn has_real_content(&self) -> bool {
        self.columns.values().any(column_is_populated)
    }
}

/// Non-empty, non-zero, non-false, non-null.
fn column_is_populated(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().unwrap_or(0.0) != 0.0,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Column schema for a table field.
#[derive(Debug, Clone, Copy)]
pub struct ColumnDefinition {
    pub key: &'static str,
    pub field_type: FieldType,
}

/// A static field definition. Never mutated at runtime; derived state lives in
/// the session's value/provenance store, not here.
#[derive(Debug, Clone)]
pub struct FieldDefinition {
    pub key: &'static str,
    pub label: &'static str,
    pub field_type: FieldType,
    pub synonyms: &'static [&'static str],
    /// Domain id for dropdown-backed text fields, resolved on coercion.
    pub domain: Option<&'static str>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub columns: &'static [ColumnDefinition],
}

impl FieldDefinition {
    pub fn default_value(&self) -> FieldValue {
        match self.field_type {
            FieldType::Date => FieldValue::Text(DATE_SENTINEL.to_string()),
            FieldType::Text => FieldValue::Text(String::new()),
            FieldType::Number => FieldValue::Number(0.0),
            FieldType::Boolean => FieldValue::Bool(false),
            FieldType::Tristate => FieldValue::Text(" ".to_string()),
            FieldType::Table => FieldValue::Table(Vec::new()),
        }
    }
}

const fn col(key: &'static str, field_type: FieldType) -> ColumnDefinition {
    ColumnDefinition { key, field_type }
}

const KILOMETERSTAND_COLUMNS: &[ColumnDefinition] = &[
    col("art", FieldType::Text),
    col("datum", FieldType::Date),
    col("kmstand", FieldType::Number),
];

const ZUBEHOER_COLUMNS: &[ColumnDefinition] = &[
    col("beschreibung", FieldType::Text),
    col("betrag", FieldType::Number),
];

const SPARTEN_COLUMNS: &[ColumnDefinition] = &[
    col("beschreibung", FieldType::Text),
    col("check", FieldType::Boolean),
];

const BAUSTEIN_COLUMNS: &[ColumnDefinition] = &[
    col("sparte", FieldType::Text),
    col("beschreibung", FieldType::Text),
    col("check", FieldType::Boolean),
    col("betrag", FieldType::Number),
    col("betragLabel", FieldType::Text),
];

/// The registry of all Kraftfahrt form fields, in declaration (serialization)
/// order.
#[derive(Debug, Clone)]
pub struct FieldRegistry {
    fields: Vec<FieldDefinition>,
}

impl FieldRegistry {
    /// Builds the Kraftfahrt (motor insurance) field schema.
    pub fn kraftfahrt() -> Self {
        let f = |key, label, field_type, synonyms| FieldDefinition {
            key,
            label,
            field_type,
            synonyms,
            domain: None,
            min: None,
            max: None,
            columns: &[],
        };

        let fields = vec![
            f(
                "fahrzeugmarke",
                "Fahrzeugmarke",
                FieldType::Text,
                &["Marke", "Hersteller", "Automarke"],
            ),
            f(
                "fahrzeugtyp",
                "Fahrzeugtyp",
                FieldType::Text,
                &["Typ", "Modell", "Fahrzeugmodell"],
            ),
            f(
                "kennzeichen",
                "Amtliches Kennzeichen",
                FieldType::Text,
                &["Kennzeichen", "Nummernschild", "amtl. Kennzeichen"],
            ),
            f(
                "erstzulassung",
                "Erstzulassung",
                FieldType::Date,
                &["EZ", "erste Zulassung", "Zulassungsdatum"],
            ),
            f(
                "vertragsbeginn",
                "Vertragsbeginn",
                FieldType::Date,
                &["Beginn", "Versicherungsbeginn", "ab wann"],
            ),
            FieldDefinition {
                key: "jahreskilometer",
                label: "Jährliche Fahrleistung",
                field_type: FieldType::Number,
                synonyms: &["Kilometer pro Jahr", "Fahrleistung", "km/Jahr"],
                domain: None,
                min: Some(0.0),
                max: Some(200_000.0),
                columns: &[],
            },
            FieldDefinition {
                key: "neuwert",
                label: "Neuwert",
                field_type: FieldType::Number,
                synonyms: &["Neupreis", "Listenpreis", "Kaufpreis"],
                domain: None,
                min: Some(0.0),
                max: None,
                columns: &[],
            },
            FieldDefinition {
                key: "zahlweise",
                label: "Zahlweise",
                field_type: FieldType::Text,
                synonyms: &["Zahlungsweise", "Zahlungsrhythmus"],
                domain: Some("zahlweise"),
                min: None,
                max: None,
                columns: &[],
            },
            FieldDefinition {
                key: "fahrerkreis",
                label: "Fahrerkreis",
                field_type: FieldType::Text,
                synonyms: &["wer fährt", "Fahrer", "Nutzerkreis"],
                domain: Some("fahrerkreis"),
                min: None,
                max: None,
                columns: &[],
            },
            f(
                "garage",
                "Garage vorhanden",
                FieldType::Boolean,
                &["Garagenstellplatz", "Stellplatz"],
            ),
            f(
                "saisonkennzeichen",
                "Saisonkennzeichen",
                FieldType::Tristate,
                &["Saison", "Saisonzulassung"],
            ),
            f(
                "wechselkennzeichen",
                "Wechselkennzeichen",
                FieldType::Tristate,
                &["Wechselschild"],
            ),
            FieldDefinition {
                key: "kilometerstaende",
                label: "Kilometerstände",
                field_type: FieldType::Table,
                synonyms: &["Kilometerstand", "Tachostand", "km-Stand"],
                domain: None,
                min: None,
                max: None,
                columns: KILOMETERSTAND_COLUMNS,
            },
            FieldDefinition {
                key: "zubehoer",
                label: "Sonderausstattung und Zubehör",
                field_type: FieldType::Table,
                synonyms: &["Zubehör", "Sonderausstattung", "Extras"],
                domain: None,
                min: None,
                max: None,
                columns: ZUBEHOER_COLUMNS,
            },
            FieldDefinition {
                key: "sparten",
                label: "Sparten",
                field_type: FieldType::Table,
                synonyms: &["Deckung", "Versicherungsart"],
                domain: None,
                min: None,
                max: None,
                columns: SPARTEN_COLUMNS,
            },
            FieldDefinition {
                key: "bausteine",
                label: "Bausteine",
                field_type: FieldType::Table,
                synonyms: &["Baustein", "Zusatzdeckung"],
                domain: None,
                min: None,
                max: None,
                columns: BAUSTEIN_COLUMNS,
            },
        ];

        FieldRegistry { fields }
    }

    /// Lookup by key. Unknown keys (schema drift from the extraction prompt)
    /// return `None`, never an error.
    pub fn field_by_key(&self, key: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// All fields of the given type, in declaration order.
    pub fn fields_by_type(&self, field_type: FieldType) -> Vec<&FieldDefinition> {
        self.fields
            .iter()
            .filter(|f| f.field_type == field_type)
            .collect()
    }

    /// All fields in declaration order.
    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    /// Initial value map for a fresh form session.
    pub fn default_values(&self) -> BTreeMap<String, FieldValue> {
        self.fields
            .iter()
            .map(|f| (f.key.to_string(), f.default_value()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_by_key_known() {
        let registry = FieldRegistry::kraftfahrt();
        let field = registry.field_by_key("fahrzeugmarke").unwrap();
        assert_eq!(field.field_type, FieldType::Text);
    }

    #[test]
    fn test_field_by_key_unknown_is_none() {
        let registry = FieldRegistry::kraftfahrt();
        assert!(registry.field_by_key("nicht_vorhanden").is_none());
    }

    #[test]
    fn test_default_values_cover_all_fields() {
        let registry = FieldRegistry::kraftfahrt();
        let defaults = registry.default_values();
        assert_eq!(defaults.len(), registry.fields().len());
        assert_eq!(
            defaults.get("erstzulassung"),
            Some(&FieldValue::Text(DATE_SENTINEL.to_string()))
        );
        assert_eq!(defaults.get("garage"), Some(&FieldValue::Bool(false)));
        assert_eq!(
            defaults.get("saisonkennzeichen"),
            Some(&FieldValue::Text(" ".to_string()))
        );
        assert_eq!(
            defaults.get("kilometerstaende"),
            Some(&FieldValue::Table(vec![]))
        );
    }

    #[test]
    fn test_fields_by_type_preserves_order() {
        let registry = FieldRegistry::kraftfahrt();
        let tables = registry.fields_by_type(FieldType::Table);
        let keys: Vec<&str> = tables.iter().map(|f| f.key).collect();
        assert_eq!(keys, vec!["kilometerstaende", "zubehoer", "sparten", "bausteine"]);
    }

    #[test]
    fn test_row_has_real_content() {
        let mut row = TableRow::new("1");
        assert!(!row.has_real_content());

        row.set_column("kmstand", json!(0));
        assert!(!row.has_real_content());

        row.set_column("kmstand", json!(12000));
        assert!(row.has_real_content());
    }

    #[test]
    fn test_row_blank_strings_do_not_count_as_content() {
        let mut row = TableRow::new("1");
        row.set_column("beschreibung", json!("   "));
        row.set_column("check", json!(false));
        assert!(!row.has_real_content());
    }

    #[test]
    fn test_table_row_wire_format_is_camel_case() {
        let row: TableRow = serde_json::from_value(json!({
            "id": "KK",
            "isRealInput": true,
            "knotenId": "KBV00002",
            "check": true
        }))
        .unwrap();
        assert!(row.is_real_input);
        assert_eq!(row.knoten_id.as_deref(), Some("KBV00002"));
        assert_eq!(row.column("check"), Some(&json!(true)));
    }
}
