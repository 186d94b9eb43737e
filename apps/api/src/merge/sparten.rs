//! Sparten/Baustein matcher — resolves the semantic ids the model emits
//! (e.g. "vollkasko_sb") to real structural rows of the product tree
//! (e.g. knoten "KBV00002").
//!
//! Matching is an explicit ordered list of strategies, tried in sequence:
//! exact id, row synonym list, fixed keyword rules, fuzzy token overlap.
//! The winning tier is logged; no tier matching is a first-class outcome and
//! drops the action with a warning, because the model regularly proposes
//! line items that do not exist in the current product catalog.

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::extraction::{BausteinAction, SparteAction};
use crate::schema::TableRow;
use crate::session::FormSession;

pub const SPARTEN_TABLE: &str = "sparten";
pub const BAUSTEINE_TABLE: &str = "bausteine";

/// The two product-tree tables. Structural rows in them may only be touched
/// through the action matcher, never through generic row reconciliation.
pub fn is_product_table(key: &str) -> bool {
    key == SPARTEN_TABLE || key == BAUSTEINE_TABLE
}

/// Vollkasko and Teilkasko exclude each other. Activating one deactivates the
/// other, only ever as a side effect of an explicit activation.
const VOLLKASKO: &str = "KK";
const TEILKASKO: &str = "EK";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    ExactId,
    Synonym,
    KeywordRule,
    Fuzzy,
}

impl MatchTier {
    fn as_str(self) -> &'static str {
        match self {
            MatchTier::ExactId => "exact_id",
            MatchTier::Synonym => "synonym",
            MatchTier::KeywordRule => "keyword_rule",
            MatchTier::Fuzzy => "fuzzy",
        }
    }
}

/// A fixed keyword-to-description matching rule. Applies when one of the
/// `id_hints` occurs in the semantic id or description; the candidate row must
/// then carry all `description_keywords`, the amount label if given, and
/// belong to the given Sparte if restricted.
struct KeywordRule {
    id_hints: &'static [&'static str],
    description_keywords: &'static [&'static str],
    amount_label: Option<&'static str>,
    sparte: Option<&'static str>,
}

const KEYWORD_RULES: &[KeywordRule] = &[
    KeywordRule {
        id_hints: &["vollkasko_sb", "vk_sb", "sb_vollkasko"],
        description_keywords: &["selbstbeteiligung"],
        amount_label: Some("SB"),
        sparte: Some(VOLLKASKO),
    },
    KeywordRule {
        id_hints: &["teilkasko_sb", "tk_sb", "sb_teilkasko"],
        description_keywords: &["selbstbeteiligung"],
        amount_label: Some("SB"),
        sparte: Some(TEILKASKO),
    },
    KeywordRule {
        id_hints: &["schutzbrief", "pannenhilfe"],
        description_keywords: &["schutzbrief"],
        amount_label: None,
        sparte: None,
    },
    KeywordRule {
        id_hints: &["rabattschutz"],
        description_keywords: &["rabattschutz"],
        amount_label: None,
        sparte: None,
    },
    KeywordRule {
        id_hints: &["vollkasko"],
        description_keywords: &["vollkasko"],
        amount_label: None,
        sparte: None,
    },
    KeywordRule {
        id_hints: &["teilkasko"],
        description_keywords: &["teilkasko"],
        amount_label: None,
        sparte: None,
    },
    KeywordRule {
        id_hints: &["haftpflicht"],
        description_keywords: &["haftpflicht"],
        amount_label: None,
        sparte: None,
    },
];

/// Minimum cumulative token-overlap score for the fuzzy tier.
const MIN_RELEVANCE: usize = 5;

/// Resolves a semantic id (plus optional description and Sparte restriction)
/// to a row index, reporting which tier matched.
pub fn resolve_row(
    rows: &[TableRow],
    semantic_id: &str,
    beschreibung: &str,
    sparte: Option<&str>,
) -> Option<(usize, MatchTier)> {
    // (a) exact structural id
    if let Some(idx) = rows.iter().position(|r| {
        r.id == semantic_id || r.knoten_id.as_deref() == Some(semantic_id)
    }) {
        return Some((idx, MatchTier::ExactId));
    }

    // (b) explicit synonym list on the row
    let semantic_lower = semantic_id.to_lowercase();
    if let Some(idx) = rows.iter().position(|r| {
        r.synonyme
            .iter()
            .any(|s| s.to_lowercase() == semantic_lower)
    }) {
        return Some((idx, MatchTier::Synonym));
    }

    // (c) fixed keyword rules
    let haystack = format!("{semantic_lower} {}", beschreibung.to_lowercase());
    for rule in KEYWORD_RULES {
        if !rule.id_hints.iter().any(|h| haystack.contains(h)) {
            continue;
        }
        let effective_sparte = sparte.or(rule.sparte);
        if let Some(idx) = rows
            .iter()
            .position(|r| rule_matches_row(rule, r, effective_sparte))
        {
            return Some((idx, MatchTier::KeywordRule));
        }
    }

    // (d) fuzzy token-overlap scoring
    let tokens = tokenize(&haystack);
    let mut best: Option<(usize, usize)> = None;
    for (idx, row) in rows.iter().enumerate() {
        if let Some(restriction) = sparte {
            if !row_belongs_to_sparte(row, restriction) {
                continue;
            }
        }
        let target = row_match_text(row);
        let score: usize = tokens
            .iter()
            .filter(|t| target.contains(*t))
            .map(|t| t.len())
            .sum();
        if score >= MIN_RELEVANCE && best.map(|(_, s)| score > s).unwrap_or(true) {
            best = Some((idx, score));
        }
    }
    best.map(|(idx, _)| (idx, MatchTier::Fuzzy))
}

fn rule_matches_row(rule: &KeywordRule, row: &TableRow, sparte: Option<&str>) -> bool {
    let text = row_match_text(row);
    if !rule.description_keywords.iter().all(|k| text.contains(k)) {
        return false;
    }
    if let Some(label) = rule.amount_label {
        let row_label = row
            .column("betragLabel")
            .and_then(Value::as_str)
            .unwrap_or("");
        if !row_label.eq_ignore_ascii_case(label) {
            return false;
        }
    }
    match sparte {
        Some(s) => row_belongs_to_sparte(row, s),
        None => true,
    }
}

fn row_belongs_to_sparte(row: &TableRow, sparte: &str) -> bool {
    row.id == sparte
        || row
            .column("sparte")
            .and_then(Value::as_str)
            .map(|s| s == sparte)
            .unwrap_or(false)
}

fn row_match_text(row: &TableRow) -> String {
    let beschreibung = row
        .column("beschreibung")
        .and_then(Value::as_str)
        .unwrap_or("");
    let label = row
        .column("betragLabel")
        .and_then(Value::as_str)
        .unwrap_or("");
    format!("{} {}", beschreibung.to_lowercase(), label.to_lowercase())
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 3)
        .map(str::to_lowercase)
        .collect()
}

/// Guard against the model asserting negative intent for lines it simply
/// never discussed.
fn is_not_mentioned_reason(reason: &str) -> bool {
    let lowered = reason.to_lowercase();
    lowered.contains("nicht explizit erwähnt") || lowered.contains("not explicitly mentioned")
}

/// Applies Sparten actions (line-of-business activation/deactivation) to the
/// sparten table. Unresolvable actions are dropped with a warning.
///
/// Known limitation: conflicting actions in one batch apply in arrival order;
/// the later activation wins the exclusivity side effect.
pub fn apply_sparten_actions(
    session: &mut FormSession,
    actions: &std::collections::BTreeMap<String, SparteAction>,
    applied: &mut Vec<String>,
) {
    for (code, action) in actions {
        if !action.active && is_not_mentioned_reason(&action.reason) {
            debug!("Sparten-Aktion '{code}' ignoriert (nicht explizit erwähnt)");
            continue;
        }
        let Some(rows) = session.rows_mut(SPARTEN_TABLE) else {
            return;
        };
        let Some((idx, tier)) = resolve_row(rows, code, "", None) else {
            warn!("Sparten-Aktion '{code}' konnte keiner Zeile zugeordnet werden, verworfen");
            continue;
        };
        debug!("Sparten-Aktion '{code}' aufgelöst über Tier {}", tier.as_str());

        rows[idx].set_column("check", json!(action.active));
        rows[idx].is_real_input = true;
        if let Some(betrag) = action.betrag {
            rows[idx].set_column("betrag", json!(betrag));
        }
        let resolved_id = rows[idx].id.clone();
        applied.push(format!("{SPARTEN_TABLE}:{resolved_id}"));

        if action.active {
            if let Some(counterpart) = exclusive_counterpart(&resolved_id) {
                if let Some(other) = rows.iter_mut().find(|r| r.id == counterpart) {
                    let was_active = other
                        .column("check")
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                    if was_active {
                        other.set_column("check", json!(false));
                        other.is_real_input = true;
                        applied.push(format!("{SPARTEN_TABLE}:{counterpart}"));
                        debug!(
                            "Sparte '{counterpart}' deaktiviert (schließt sich mit '{resolved_id}' aus)"
                        );
                    }
                }
            }
        }
    }
}

fn exclusive_counterpart(sparte_id: &str) -> Option<&'static str> {
    match sparte_id {
        VOLLKASKO => Some(TEILKASKO),
        TEILKASKO => Some(VOLLKASKO),
        _ => None,
    }
}

/// Applies Baustein actions (coverage sub-components) to the bausteine table.
pub fn apply_baustein_actions(
    session: &mut FormSession,
    actions: &[BausteinAction],
    applied: &mut Vec<String>,
) {
    for action in actions {
        if !action.active && is_not_mentioned_reason(&action.reason) {
            debug!(
                "Baustein-Aktion '{}' ignoriert (nicht explizit erwähnt)",
                action.beschreibung
            );
            continue;
        }
        let Some(rows) = session.rows_mut(BAUSTEINE_TABLE) else {
            return;
        };
        let semantic_id = action
            .knoten_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or(&action.beschreibung);

        let resolved = resolve_row(rows, semantic_id, &action.beschreibung, action.sparte.as_deref());
        let Some((idx, tier)) = resolved else {
            warn!(
                "Baustein-Aktion '{}' konnte keiner Zeile zugeordnet werden, verworfen",
                action.beschreibung
            );
            continue;
        };
        debug!(
            "Baustein-Aktion '{}' aufgelöst über Tier {}",
            action.beschreibung,
            tier.as_str()
        );

        rows[idx].set_column("check", json!(action.active));
        if let Some(betrag) = action.betrag {
            rows[idx].set_column("betrag", json!(betrag));
        }
        rows[idx].is_real_input = true;
        applied.push(format!("{BAUSTEINE_TABLE}:{}", rows[idx].id));
    }
}
