//! Domain options — mock dropdown datasets standing in for the real
//! domain-data service. Consumed by the merge engine to resolve extracted
//! values for dropdown-backed fields, and exposed over HTTP for the form UI.

use axum::{extract::Path, Json};
use serde::Serialize;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct DomainOption {
    pub value: &'static str,
    pub label: &'static str,
}

const fn opt(value: &'static str, label: &'static str) -> DomainOption {
    DomainOption { value, label }
}

const ZAHLWEISE: &[DomainOption] = &[
    opt("1", "jährlich"),
    opt("2", "halbjährlich"),
    opt("4", "vierteljährlich"),
    opt("12", "monatlich"),
];

const FAHRERKREIS: &[DomainOption] = &[
    opt("E", "Einzelfahrer"),
    opt("P", "Partnertarif"),
    opt("F", "Familie"),
    opt("B", "beliebige Fahrer"),
];

const NUTZUNG: &[DomainOption] = &[
    opt("P", "privat"),
    opt("G", "gewerblich"),
    opt("PG", "privat und Arbeitsweg"),
];

/// Lookup a domain dataset. Unknown ids return `None`; the caller decides
/// whether that is a 404 (HTTP) or a passthrough (coercion).
pub fn fetch_domain_data(domain_id: &str) -> Option<&'static [DomainOption]> {
    match domain_id {
        "zahlweise" => Some(ZAHLWEISE),
        "fahrerkreis" => Some(FAHRERKREIS),
        "nutzung" => Some(NUTZUNG),
        _ => None,
    }
}

/// Resolves a raw extracted string against a domain: exact value match first,
/// then case-insensitive label or value match. No match keeps the raw string
/// so the form can surface it instead of dropping the extraction.
pub fn resolve_option(domain_id: &str, raw: &str) -> String {
    let Some(options) = fetch_domain_data(domain_id) else {
        return raw.to_string();
    };
    if options.iter().any(|o| o.value == raw) {
        return raw.to_string();
    }
    let lowered = raw.trim().to_lowercase();
    options
        .iter()
        .find(|o| o.label.to_lowercase() == lowered || o.value.to_lowercase() == lowered)
        .map(|o| o.value.to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// GET /api/v1/domain/:domain_id
pub async fn handle_domain_data(
    Path(domain_id): Path<String>,
) -> Result<Json<Vec<DomainOption>>, AppError> {
    fetch_domain_data(&domain_id)
        .map(|options| Json(options.to_vec()))
        .ok_or_else(|| AppError::NotFound(format!("Domäne '{domain_id}' ist nicht bekannt")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_known_domain() {
        let options = fetch_domain_data("zahlweise").unwrap();
        assert_eq!(options.len(), 4);
    }

    #[test]
    fn test_fetch_unknown_domain_is_none() {
        assert!(fetch_domain_data("farben").is_none());
    }

    #[test]
    fn test_resolve_exact_value_passthrough() {
        assert_eq!(resolve_option("zahlweise", "12"), "12");
    }

    #[test]
    fn test_resolve_label_case_insensitive() {
        assert_eq!(resolve_option("zahlweise", "Monatlich"), "12");
        assert_eq!(resolve_option("fahrerkreis", "FAMILIE"), "F");
    }

    #[test]
    fn test_resolve_no_match_keeps_raw() {
        assert_eq!(resolve_option("zahlweise", "wöchentlich"), "wöchentlich");
    }
}
