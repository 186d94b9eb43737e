//! External collaborators behind trait seams.
//!
//! The real systems (ServiceABSEinarbeiter for SOAP/XML persistence, Tardis
//! for legacy contract data) are not reachable from this repository; the mock
//! implementations simulate their contracts. `AppState` holds the traits as
//! `Arc<dyn …>` so the real clients can be swapped in at startup.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::schema::TableRow;

#[derive(Debug, Clone, Serialize)]
pub struct SubmitReceipt {
    pub vorgangs_id: String,
    pub status: String,
}

/// The persistence collaborator accepting the serialized ANTRAG document.
#[async_trait]
pub trait AntragPersistence: Send + Sync {
    async fn submit(&self, xml: &str) -> Result<SubmitReceipt, AppError>;
}

/// Mock stand-in for ServiceABSEinarbeiter: accepts the document, logs it,
/// returns a synthetic Vorgangs-Id.
pub struct MockServiceAbsEinarbeiter;

#[async_trait]
impl AntragPersistence for MockServiceAbsEinarbeiter {
    async fn submit(&self, xml: &str) -> Result<SubmitReceipt, AppError> {
        debug!("ServiceABSEinarbeiter (Mock) erhält Dokument: {xml}");
        let receipt = SubmitReceipt {
            vorgangs_id: format!("GV-{}", Uuid::new_v4().simple()),
            status: "angenommen".to_string(),
        };
        info!(
            "Antrag eingereicht (Mock), Vorgangs-Id {} ({} Bytes)",
            receipt.vorgangs_id,
            xml.len()
        );
        Ok(receipt)
    }
}

/// The structural product tree delivered by the contract system.
#[derive(Debug, Clone, Default)]
pub struct ProductTree {
    pub sparten: Vec<TableRow>,
    pub bausteine: Vec<TableRow>,
}

/// The legacy contract system collaborator.
#[async_trait]
pub trait ContractSource: Send + Sync {
    async fn load_product_tree(&self, vertragsnummer: &str) -> Result<ProductTree, AppError>;
}

/// Mock stand-in for Tardis. Rows arrive populated but unflagged — they never
/// pass the explicit marking path, which is exactly the case the provenance
/// fallback heuristic exists for.
pub struct MockTardis;

#[async_trait]
impl ContractSource for MockTardis {
    async fn load_product_tree(&self, vertragsnummer: &str) -> Result<ProductTree, AppError> {
        // The real system answers a lookup without a contract number with a
        // SOAP fault; the mock mirrors that as a backend failure.
        if vertragsnummer.trim().is_empty() {
            return Err(AppError::Backend(
                "Tardis: Vertragsnummer fehlt".to_string(),
            ));
        }
        debug!("Tardis (Mock) liefert Produktbaum für Vertrag {vertragsnummer}");

        let sparte = |id: &str, beschreibung: &str, check: bool, synonyme: &[&str]| {
            let mut row = TableRow::new(id);
            row.synonyme = synonyme.iter().map(|s| s.to_string()).collect();
            row.set_column("beschreibung", json!(beschreibung));
            row.set_column("check", json!(check));
            row
        };

        let baustein = |knoten_id: &str,
                        sparte: &str,
                        beschreibung: &str,
                        betrag: Option<f64>,
                        betrag_label: &str| {
            let mut row = TableRow::new(knoten_id);
            row.knoten_id = Some(knoten_id.to_string());
            row.set_column("sparte", json!(sparte));
            row.set_column("beschreibung", json!(beschreibung));
            row.set_column("check", json!(false));
            if let Some(b) = betrag {
                row.set_column("betrag", json!(b));
            }
            if !betrag_label.is_empty() {
                row.set_column("betragLabel", json!(betrag_label));
            }
            row
        };

        // Structural placeholder row: blank knoten id, not user-toggleable,
        // filtered out on serialization.
        let mut placeholder = TableRow::new("");
        placeholder.knoten_id = Some(String::new());
        placeholder.set_column("beschreibung", json!(""));

        Ok(ProductTree {
            sparten: vec![
                sparte("KH", "Kfz-Haftpflicht", true, &["haftpflicht"]),
                sparte("KK", "Vollkasko", false, &["vollkasko"]),
                sparte("EK", "Teilkasko", false, &["teilkasko"]),
            ],
            bausteine: vec![
                baustein(
                    "KBV00002",
                    "KK",
                    "Selbstbeteiligung Vollkasko",
                    Some(300.0),
                    "SB",
                ),
                baustein(
                    "KBV00004",
                    "EK",
                    "Selbstbeteiligung Teilkasko",
                    Some(150.0),
                    "SB",
                ),
                baustein("KBV00007", "KH", "Schutzbrief", None, ""),
                baustein("KBV00011", "KK", "Rabattschutz", None, ""),
                placeholder,
            ],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_persistence_returns_receipt() {
        let receipt = MockServiceAbsEinarbeiter
            .submit("<ANTRAG></ANTRAG>")
            .await
            .unwrap();
        assert!(receipt.vorgangs_id.starts_with("GV-"));
        assert_eq!(receipt.status, "angenommen");
    }

    #[tokio::test]
    async fn test_mock_tardis_tree_shape() {
        let tree = MockTardis.load_product_tree("4711").await.unwrap();
        assert_eq!(tree.sparten.len(), 3);
        assert!(tree.sparten.iter().all(|r| !r.is_real_input));
        // Haftpflicht is structurally active on hydration.
        assert_eq!(
            tree.sparten[0].column("check"),
            Some(&serde_json::json!(true))
        );
        assert!(tree.bausteine.iter().any(|r| r.id == "KBV00002"));
        // Placeholder row with blank knoten id is part of the tree.
        assert!(tree
            .bausteine
            .iter()
            .any(|r| r.knoten_id.as_deref() == Some("")));
    }

    #[tokio::test]
    async fn test_mock_tardis_blank_contract_is_backend_error() {
        let err = MockTardis.load_product_tree("  ").await.unwrap_err();
        assert!(matches!(err, AppError::Backend(_)));
    }
}
