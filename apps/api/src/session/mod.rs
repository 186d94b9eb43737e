//! Form sessions — per-session value map plus provenance tracking.
//!
//! A session owns its values exclusively; there is no cross-session sharing.
//! The registry stays immutable and is passed in wherever default comparison
//! is needed.

pub mod handlers;
pub mod provenance;

use std::collections::{BTreeMap, HashMap};

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::schema::{FieldRegistry, FieldValue, TableRow};
use provenance::Provenance;

#[derive(Debug, Clone)]
pub struct FormSession {
    pub id: Uuid,
    values: BTreeMap<String, FieldValue>,
    provenance: BTreeMap<String, Provenance>,
}

impl FormSession {
    /// Fresh session with every field at its registry default.
    pub fn new(registry: &FieldRegistry) -> Self {
        FormSession {
            id: Uuid::new_v4(),
            values: registry.default_values(),
            provenance: BTreeMap::new(),
        }
    }

    pub fn value(&self, key: &str) -> Option<&FieldValue> {
        self.values.get(key)
    }

    pub fn values(&self) -> &BTreeMap<String, FieldValue> {
        &self.values
    }

    pub fn provenance(&self, key: &str) -> Provenance {
        self.provenance.get(key).copied().unwrap_or_default()
    }

    pub fn provenance_map(&self) -> &BTreeMap<String, Provenance> {
        &self.provenance
    }

    /// Sets the field value and flips provenance to `Explicit` unconditionally.
    /// Deliberately also when the new value equals the default: a user setting
    /// a field back to its default still counts as entered.
    pub fn mark_real_input(&mut self, key: &str, value: FieldValue) {
        self.values.insert(key.to_string(), value);
        self.provenance.insert(key.to_string(), Provenance::Explicit);
    }

    /// Direct value write that bypasses the marking path (structural
    /// hydration, programmatic writes). Records `Inferred` so the read side
    /// knows to fall back to the default-inequality heuristic.
    pub fn set_value(&mut self, key: &str, value: FieldValue) {
        self.values.insert(key.to_string(), value);
        let entry = self
            .provenance
            .entry(key.to_string())
            .or_insert(Provenance::Untouched);
        if *entry == Provenance::Untouched {
            *entry = Provenance::Inferred;
        }
    }

    /// The display/serialization check. Explicit marks always count; values
    /// that arrived through a bypass path count only while they differ from
    /// the registry default.
    pub fn is_real_input(&self, key: &str, registry: &FieldRegistry) -> bool {
        match self.provenance(key) {
            Provenance::Explicit => true,
            Provenance::Inferred | Provenance::Untouched => {
                match (self.values.get(key), registry.field_by_key(key)) {
                    (Some(value), Some(def)) => *value != def.default_value(),
                    _ => false,
                }
            }
        }
    }

    pub fn rows(&self, table_key: &str) -> Option<&[TableRow]> {
        self.values.get(table_key).and_then(FieldValue::as_rows)
    }

    pub fn rows_mut(&mut self, table_key: &str) -> Option<&mut Vec<TableRow>> {
        self.values.get_mut(table_key).and_then(FieldValue::as_rows_mut)
    }

    /// Flags a single table row as real input. Returns false if the table or
    /// row does not exist.
    pub fn mark_row_real_input(&mut self, table_key: &str, row_id: &str) -> bool {
        let Some(rows) = self.rows_mut(table_key) else {
            return false;
        };
        match rows.iter_mut().find(|r| r.id == row_id) {
            Some(row) => {
                row.is_real_input = true;
                true
            }
            None => false,
        }
    }
}

/// In-process session store. Sessions live for the lifetime of the form
/// interaction; merge operations run synchronously under the write lock.
#[derive(Default)]
pub struct SessionStore {
    inner: RwLock<HashMap<Uuid, FormSession>>,
}

impl SessionStore {
    pub async fn insert(&self, session: FormSession) {
        self.inner.write().await.insert(session.id, session);
    }

    pub async fn get(&self, id: Uuid) -> Option<FormSession> {
        self.inner.read().await.get(&id).cloned()
    }

    /// Runs a closure against the session under the write lock. The closure is
    /// synchronous by design: the merge engine performs no I/O.
    pub async fn with_session<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut FormSession) -> R,
    ) -> Option<R> {
        let mut sessions = self.inner.write().await;
        sessions.get_mut(&id).map(f)
    }
}
