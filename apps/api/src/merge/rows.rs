//! Row reconciliation for generic table fields (Kilometerstände, Zubehör).
//!
//! Incoming rows are matched by id: a known id gets a field-level union merge
//! onto the existing row, an unknown or missing id appends. Existing row order
//! is never disturbed; appends follow arrival order.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::schema::TableRow;

/// A loosely typed row as it arrives from the extraction result.
#[derive(Debug, Clone)]
pub struct IncomingRow {
    pub id: Option<String>,
    pub columns: BTreeMap<String, Value>,
}

/// Array coercion for table values: each object element becomes an incoming
/// row, everything else (including a non-array value) is dropped.
pub fn parse_incoming_rows(value: &Value) -> Vec<IncomingRow> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| item.as_object())
        .map(|obj| {
            let mut id = None;
            let mut columns = BTreeMap::new();
            for (key, val) in obj {
                match key.as_str() {
                    "id" => {
                        id = match val {
                            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
                            Value::Number(n) => Some(n.to_string()),
                            _ => None,
                        };
                    }
                    // Provenance is decided here, not by the model.
                    "isRealInput" => {}
                    _ => {
                        columns.insert(key.clone(), val.clone());
                    }
                }
            }
            IncomingRow { id, columns }
        })
        .collect()
}

/// Merges incoming rows into the existing table. Every touched or appended
/// row is flagged as real input.
pub fn reconcile_rows(existing: &mut Vec<TableRow>, incoming: Vec<IncomingRow>) {
    for inc in incoming {
        let matched = inc
            .id
            .as_deref()
            .and_then(|id| existing.iter_mut().find(|r| r.id == id));

        match matched {
            Some(row) => {
                merge_into_row(row, inc.columns);
                row.is_real_input = true;
            }
            None => {
                let id = inc.id.unwrap_or_else(|| next_row_id(existing));
                let mut row = TableRow::new(id);
                row.columns = inc.columns;
                row.is_real_input = true;
                existing.push(row);
            }
        }
    }
}

/// Field-level union: incoming columns overwrite, absent columns survive.
/// A previously set betrag survives an incoming row that does not carry one
/// (absent, null or zero all count as "not specified").
fn merge_into_row(row: &mut TableRow, columns: BTreeMap<String, Value>) {
    for (key, value) in columns {
        if key == "betrag" && is_unset_amount(&value) && has_set_amount(row) {
            continue;
        }
        row.columns.insert(key, value);
    }
}

fn is_unset_amount(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Number(n) => n.as_f64().unwrap_or(0.0) == 0.0,
        _ => false,
    }
}

fn has_set_amount(row: &TableRow) -> bool {
    row.column("betrag")
        .and_then(Value::as_f64)
        .map(|b| b != 0.0)
        .unwrap_or(false)
}

/// Next free sequential id: one past the highest numeric id in the table.
fn next_row_id(rows: &[TableRow]) -> String {
    let max = rows
        .iter()
        .filter_map(|r| r.id.parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    (max + 1).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(id: &str, cols: &[(&str, Value)]) -> TableRow {
        let mut row = TableRow::new(id);
        for (k, v) in cols {
            row.set_column(*k, v.clone());
        }
        row
    }

    fn incoming(id: Option<&str>, cols: &[(&str, Value)]) -> IncomingRow {
        IncomingRow {
            id: id.map(str::to_string),
            columns: cols.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        }
    }

    #[test]
    fn test_union_merge_preserves_unspecified_columns() {
        let mut existing = vec![row("1", &[("art", json!("bar")), ("kmstand", json!(500))])];
        reconcile_rows(&mut existing, vec![incoming(Some("1"), &[("art", json!("foo"))])]);

        assert_eq!(existing.len(), 1);
        assert_eq!(existing[0].column("art"), Some(&json!("foo")));
        assert_eq!(existing[0].column("kmstand"), Some(&json!(500)));
        assert!(existing[0].is_real_input);
    }

    #[test]
    fn test_betrag_preserved_when_incoming_omits_it() {
        let mut existing = vec![row(
            "1",
            &[("beschreibung", json!("Felgen")), ("betrag", json!(1200))],
        )];
        reconcile_rows(
            &mut existing,
            vec![incoming(Some("1"), &[("beschreibung", json!("Alufelgen")), ("betrag", json!(0))])],
        );
        assert_eq!(existing[0].column("betrag"), Some(&json!(1200)));

        // An actual new amount does overwrite.
        reconcile_rows(
            &mut existing,
            vec![incoming(Some("1"), &[("betrag", json!(1500))])],
        );
        assert_eq!(existing[0].column("betrag"), Some(&json!(1500)));
    }

    #[test]
    fn test_row_without_id_appends_with_sequential_id() {
        let mut existing = vec![row("2", &[("kmstand", json!(500))])];
        reconcile_rows(&mut existing, vec![incoming(None, &[("kmstand", json!(12000))])]);

        assert_eq!(existing.len(), 2);
        assert_eq!(existing[1].id, "3");
        assert!(existing[1].is_real_input);
    }

    #[test]
    fn test_unmatched_id_appends_as_is() {
        let mut existing = vec![row("1", &[])];
        reconcile_rows(&mut existing, vec![incoming(Some("7"), &[("art", json!("x"))])]);

        assert_eq!(existing.len(), 2);
        assert_eq!(existing[1].id, "7");
    }

    #[test]
    fn test_order_existing_preserved_appends_in_arrival_order() {
        let mut existing = vec![row("1", &[]), row("2", &[])];
        reconcile_rows(
            &mut existing,
            vec![
                incoming(Some("2"), &[("art", json!("update"))]),
                incoming(None, &[("art", json!("a"))]),
                incoming(None, &[("art", json!("b"))]),
            ],
        );
        let ids: Vec<&str> = existing.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4"]);
        assert_eq!(existing[2].column("art"), Some(&json!("a")));
        assert_eq!(existing[3].column("art"), Some(&json!("b")));
    }

    #[test]
    fn test_parse_incoming_rows_non_array_is_empty() {
        assert!(parse_incoming_rows(&json!("kein array")).is_empty());
        assert!(parse_incoming_rows(&json!({"id": "1"})).is_empty());
    }

    #[test]
    fn test_parse_incoming_rows_strips_provenance_and_numeric_id() {
        let rows = parse_incoming_rows(&json!([
            {"id": 3, "kmstand": 9000, "isRealInput": true},
            {"kmstand": 100}
        ]));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id.as_deref(), Some("3"));
        assert!(!rows[0].columns.contains_key("isRealInput"));
        assert!(rows[1].id.is_none());
    }
}
