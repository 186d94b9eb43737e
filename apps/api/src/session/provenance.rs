//! Provenance — "echte Eingabe" tracking per field.
//!
//! Provenance is an explicit tri-state rather than a boolean: some UI write
//! paths historically bypassed the tracker and mutated values directly, so the
//! read side must still recover "entered" status by comparing against the
//! field default. The tri-state keeps that fallback observable instead of
//! overloading a single flag.

use serde::{Deserialize, Serialize};

use crate::schema::TableRow;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Never touched since session start.
    #[default]
    Untouched,
    /// Set through the marking path (user keystroke, dropdown pick, or an
    /// accepted extraction). Counts as entered even if the value equals the
    /// field default.
    Explicit,
    /// Value was mutated without passing the marking path. Entered status
    /// falls back to the inequality-from-default heuristic.
    Inferred,
}

/// Serialization eligibility for a table row: the explicit flag, or the
/// fallback for rows that arrived already populated from a structural load
/// (contract-system hydration) without ever being marked.
pub fn row_is_real_input(row: &TableRow) -> bool {
    row.is_real_input || row.has_real_content()
}
