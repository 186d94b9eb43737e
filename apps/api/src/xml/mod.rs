//! Serialization Engine — renders a form session into the flat ANTRAG XML
//! document expected by the persistence backend (ServiceABSEinarbeiter).
//!
//! Only fields and rows that count as real input are emitted. Serialization
//! never fails: a value that cannot be formatted is omitted, because a partial
//! submission beats blocking the whole document on one bad field.

use serde_json::Value;
use tracing::warn;

use crate::merge::sparten::is_product_table;
use crate::schema::{FieldRegistry, FieldType, FieldValue, TableRow, DATE_SENTINEL};
use crate::session::provenance::row_is_real_input;
use crate::session::FormSession;

/// Structural line-of-business codes allowed in the output.
const STRUCTURAL_SPARTEN_CODES: &[&str] = &["KH", "KK", "EK"];

/// Serializes the session to the fixed external schema. No XML declaration,
/// no namespaces; field tags carry the `_e` suffix, table rows a `<zeile>`
/// wrapper.
pub fn serialize_antrag(session: &FormSession, registry: &FieldRegistry) -> String {
    let mut out = String::new();
    out.push_str("<ANTRAG><PERSONEN/><VERTRAG><KRAFTBL>");

    for def in registry.fields() {
        if !session.is_real_input(def.key, registry) {
            continue;
        }
        match def.field_type {
            FieldType::Table => write_table(&mut out, session, registry, def.key),
            _ => {
                let Some(value) = session.value(def.key) else {
                    continue;
                };
                match format_scalar(value, def.field_type) {
                    Some(text) => {
                        out.push_str(&format!(
                            "<{key}_e>{}</{key}_e>",
                            xml_escape(&text),
                            key = def.key
                        ));
                    }
                    None => {
                        warn!("Feld '{}' nicht formatierbar, ausgelassen", def.key);
                    }
                }
            }
        }
    }

    out.push_str("</KRAFTBL></VERTRAG></ANTRAG>");
    out
}

fn write_table(out: &mut String, session: &FormSession, registry: &FieldRegistry, key: &str) {
    let Some(def) = registry.field_by_key(key) else {
        return;
    };
    let Some(rows) = session.rows(key) else {
        return;
    };
    let product_table = is_product_table(key);
    let eligible: Vec<&TableRow> = rows
        .iter()
        .filter(|r| row_is_real_input(r))
        .filter(|r| !product_table || is_structural_row(r))
        .collect();
    if eligible.is_empty() {
        return;
    }

    out.push_str(&format!("<{key}_e>"));
    for row in eligible {
        out.push_str("<zeile>");
        if product_table {
            if let Some(knoten_id) = row.knoten_id.as_deref().filter(|k| !k.trim().is_empty()) {
                out.push_str(&format!("<knotenId>{}</knotenId>", xml_escape(knoten_id)));
            }
        }
        for col in def.columns {
            if let Some(text) = format_column(row.column(col.key), col.field_type) {
                out.push_str(&format!(
                    "<{col}>{}</{col}>",
                    xml_escape(&text),
                    col = col.key
                ));
            }
        }
        out.push_str("</zeile>");
    }
    out.push_str(&format!("</{key}_e>"));
}

/// Product-tree rows must reference a real structural node; pure UI
/// placeholders (blank knoten id, unknown code) never leave the process.
fn is_structural_row(row: &TableRow) -> bool {
    if STRUCTURAL_SPARTEN_CODES.contains(&row.id.as_str()) {
        return true;
    }
    row.knoten_id
        .as_deref()
        .map(|k| !k.trim().is_empty())
        .unwrap_or(false)
}

/// Per-type scalar formatting. `None` means the value is omitted entirely.
fn format_scalar(value: &FieldValue, field_type: FieldType) -> Option<String> {
    match (field_type, value) {
        (FieldType::Date, FieldValue::Text(s)) => {
            // The sentinel is suppressed, not emitted as an empty tag.
            if s == DATE_SENTINEL || s.trim().is_empty() {
                None
            } else {
                Some(s.clone())
            }
        }
        (FieldType::Text, FieldValue::Text(s)) => Some(s.clone()),
        (FieldType::Tristate, FieldValue::Text(s)) => Some(s.clone()),
        (FieldType::Number, FieldValue::Number(n)) => Some(format_number(*n)),
        (FieldType::Boolean, FieldValue::Bool(b)) => Some(if *b { "J" } else { "N" }.to_string()),
        _ => None,
    }
}

fn format_column(value: Option<&Value>, field_type: FieldType) -> Option<String> {
    let value = value?;
    match (field_type, value) {
        (_, Value::Null) => None,
        (FieldType::Date, Value::String(s)) => {
            if s == DATE_SENTINEL || s.trim().is_empty() {
                None
            } else {
                Some(s.clone())
            }
        }
        (FieldType::Boolean, Value::Bool(b)) => Some(if *b { "J" } else { "N" }.to_string()),
        (FieldType::Number, Value::Number(n)) => Some(format_number(n.as_f64().unwrap_or(0.0))),
        (_, Value::String(s)) => {
            if s.trim().is_empty() {
                None
            } else {
                Some(s.clone())
            }
        }
        (_, Value::Number(n)) => Some(format_number(n.as_f64().unwrap_or(0.0))),
        (_, Value::Bool(b)) => Some(if *b { "J" } else { "N" }.to_string()),
        _ => None,
    }
}

/// Literal decimal string; whole numbers without a fraction part.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
