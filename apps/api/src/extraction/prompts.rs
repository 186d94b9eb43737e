// Extraction prompt templates. The field list is generated from the registry
// so prompt and schema cannot drift apart silently; the synonyms live only
// here, never in the merge path.

use crate::merge::sparten::is_product_table;
use crate::schema::{FieldRegistry, FieldType};

pub const EXTRACTION_SYSTEM: &str = "\
Du bist ein präziser Datenextraktor für Kfz-Versicherungsanträge. \
Du extrahierst Feldwerte aus natürlichsprachlichem deutschem Text. \
Antworte AUSSCHLIESSLICH mit gültigem JSON — keine Markdown-Zäune, keine Erklärungen außerhalb des JSON. \
Gib für jedes erkannte Feld eine confidence zwischen 0.0 und 1.0 an. \
Erfinde keine Werte: was der Text nicht nennt, lässt du weg. \
Setze niemals eine Sparte auf inaktiv, nur weil sie nicht erwähnt wurde.";

/// Builds the user prompt: field schema (keys, types, synonyms, table
/// columns), the expected output shape, and the raw chat text.
pub fn build_extraction_prompt(registry: &FieldRegistry, text: &str) -> String {
    let mut fields = String::new();
    for def in registry.fields() {
        // Product-tree tables are not extractable as rows; the model reaches
        // them only through spartenActions/bausteinActions.
        if is_product_table(def.key) {
            continue;
        }
        let type_hint = match def.field_type {
            FieldType::Date => "Datum, Format JJJJ-MM-TT",
            FieldType::Text => "Text",
            FieldType::Number => "Zahl",
            FieldType::Boolean => "boolesch (true/false)",
            FieldType::Tristate => "'J', 'N' oder ' '",
            FieldType::Table => "Tabelle (Array von Zeilenobjekten)",
        };
        fields.push_str(&format!("- {} ({}): {}", def.key, type_hint, def.label));
        if !def.synonyms.is_empty() {
            fields.push_str(&format!(" — Synonyme: {}", def.synonyms.join(", ")));
        }
        if def.field_type == FieldType::Table {
            let cols: Vec<&str> = def.columns.iter().map(|c| c.key).collect();
            fields.push_str(&format!(" — Spalten: {}", cols.join(", ")));
        }
        fields.push('\n');
    }

    format!(
        r#"Extrahiere Feldwerte aus dem folgenden Text eines Versicherungsgesprächs.

FELDER:
{fields}
AUSGABEFORMAT (exakt diese Struktur):
{{
  "success": true,
  "data": {{
    "extractedData": {{
      "<feldKey>": {{"value": <wert>, "confidence": <0.0-1.0>, "source": "<Textstelle>"}}
    }},
    "spartenActions": {{
      "<spartenCode oder semantische Id>": {{"active": true|false, "reason": "<Begründung>"}}
    }},
    "bausteinActions": [
      {{"sparte": "<KH|KK|EK>" | null, "knotenId": null, "beschreibung": "<Baustein>",
        "active": true|false, "betrag": <Zahl> | null, "reason": "<Begründung>"}}
    ],
    "overallConfidence": <0.0-1.0>,
    "validationErrors": ["<Fehler>"],
    "suggestions": ["<noch fehlendes Feld>"],
    "explanation": "<kurze Zusammenfassung für den Nutzer>"
  }}
}}

HINWEISE:
- spartenActions nur für Deckungsarten (Haftpflicht=KH, Vollkasko=KK, Teilkasko=EK).
- bausteinActions für Zusatzbausteine wie Selbstbeteiligung oder Schutzbrief.
- Tabellenzeilen ohne bekannte Zeilen-Id gibst du ohne "id"-Feld aus.

TEXT:
{text}"#
    )
}
