use crate::dto::{ExportKind, GeneRank, GeneSetsResponse, SearchGeneSet};
use crate::errors::ApiError;
use crate::NetworkApi;
use async_trait::async_trait;
use enrichmap_core::{NetworkDocument, PersistedPosition};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct Store {
    networks: HashMap<String, NetworkDocument>,
    gene_sets: HashMap<String, Vec<SearchGeneSet>>,
    exports: HashMap<(String, ExportKind), String>,
    failing_exports: Vec<ExportKind>,
}

/// Serves networks from memory. Used for offline runs and as a test double.
#[derive(Clone, Default)]
pub struct InMemoryNetworkApi {
    store: Arc<Mutex<Store>>,
}

impl InMemoryNetworkApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_network(&self, doc: NetworkDocument) {
        self.store
            .lock()
            .networks
            .insert(doc.network_id.clone(), doc);
    }

    pub fn insert_gene_sets(&self, net_id: &str, sets: Vec<SearchGeneSet>) {
        self.store.lock().gene_sets.insert(net_id.to_string(), sets);
    }

    pub fn insert_export(&self, net_id: &str, kind: ExportKind, body: impl Into<String>) {
        self.store
            .lock()
            .exports
            .insert((net_id.to_string(), kind), body.into());
    }

    /// Makes every request for `kind` answer with a server error.
    pub fn fail_export(&self, kind: ExportKind) {
        self.store.lock().failing_exports.push(kind);
    }

    /// Layout currently stored for `net_id`.
    pub fn positions(&self, net_id: &str) -> Option<Vec<PersistedPosition>> {
        self.store
            .lock()
            .networks
            .get(net_id)
            .and_then(|doc| doc.positions.clone())
    }
}

#[async_trait]
impl NetworkApi for InMemoryNetworkApi {
    async fn get_network(&self, net_id: &str) -> Result<NetworkDocument, ApiError> {
        self.store
            .lock()
            .networks
            .get(net_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(net_id.to_string()))
    }

    async fn save_positions(
        &self,
        net_id: &str,
        positions: &[PersistedPosition],
    ) -> Result<(), ApiError> {
        let mut store = self.store.lock();
        let doc = store
            .networks
            .get_mut(net_id)
            .ok_or_else(|| ApiError::NotFound(net_id.to_string()))?;
        doc.positions = Some(positions.to_vec());
        Ok(())
    }

    async fn delete_positions(&self, net_id: &str) -> Result<(), ApiError> {
        let mut store = self.store.lock();
        let doc = store
            .networks
            .get_mut(net_id)
            .ok_or_else(|| ApiError::NotFound(net_id.to_string()))?;
        doc.positions = None;
        Ok(())
    }

    async fn gene_sets(
        &self,
        net_id: &str,
        names: &[String],
        intersection: bool,
    ) -> Result<GeneSetsResponse, ApiError> {
        let store = self.store.lock();
        let sets = store
            .gene_sets
            .get(net_id)
            .ok_or_else(|| ApiError::NotFound(net_id.to_string()))?;
        let selected: Vec<&SearchGeneSet> = sets
            .iter()
            .filter(|set| names.contains(&set.name))
            .collect();

        let mut genes: Vec<GeneRank> = Vec::new();
        for set in &selected {
            for gene in &set.genes {
                if genes.iter().any(|g| g.gene == gene.gene) {
                    continue;
                }
                let in_all = selected
                    .iter()
                    .all(|other| other.genes.iter().any(|g| g.gene == gene.gene));
                if !intersection || in_all {
                    genes.push(gene.clone());
                }
            }
        }
        Ok(GeneSetsResponse::from_genes(genes))
    }

    async fn genes_for_search(&self, net_id: &str) -> Result<Vec<SearchGeneSet>, ApiError> {
        self.store
            .lock()
            .gene_sets
            .get(net_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(net_id.to_string()))
    }

    async fn export_text(&self, kind: ExportKind, net_id: &str) -> Result<String, ApiError> {
        let store = self.store.lock();
        if store.failing_exports.contains(&kind) {
            return Err(ApiError::Status {
                status: 500,
                message: format!("{kind} export failed"),
            });
        }
        store
            .exports
            .get(&(net_id.to_string(), kind))
            .cloned()
            .ok_or_else(|| ApiError::NotFound(net_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enrichmap_core::NodeId;

    fn rank(gene: &str, rank: f64) -> GeneRank {
        GeneRank {
            gene: gene.into(),
            rank,
        }
    }

    fn api() -> InMemoryNetworkApi {
        let api = InMemoryNetworkApi::new();
        api.insert_network(NetworkDocument {
            network_id: "n1".into(),
            ..NetworkDocument::default()
        });
        api.insert_gene_sets(
            "n1",
            vec![
                SearchGeneSet {
                    name: "S1".into(),
                    genes: vec![rank("TP53", 2.0), rank("BRCA1", -1.0)],
                },
                SearchGeneSet {
                    name: "S2".into(),
                    genes: vec![rank("TP53", 2.0), rank("EGFR", 5.0)],
                },
            ],
        );
        api
    }

    #[tokio::test]
    async fn test_positions_round_trip() {
        let api = api();
        let records = vec![PersistedPosition {
            id: NodeId::new("a"),
            x: 1.0,
            y: 2.0,
            collapsed: false,
        }];
        api.save_positions("n1", &records).await.unwrap();
        assert_eq!(
            api.get_network("n1").await.unwrap().positions,
            Some(records)
        );
        api.delete_positions("n1").await.unwrap();
        assert!(!api.get_network("n1").await.unwrap().has_persisted_layout());
    }

    #[tokio::test]
    async fn test_gene_sets_union_and_intersection() {
        let api = api();
        let names = vec!["S1".to_string(), "S2".to_string()];

        let union = api.gene_sets("n1", &names, false).await.unwrap();
        let genes: Vec<&str> = union.genes.iter().map(|g| g.gene.as_str()).collect();
        assert_eq!(genes, vec!["TP53", "BRCA1", "EGFR"]);
        assert_eq!((union.min_rank, union.max_rank), (-1.0, 5.0));

        let both = api.gene_sets("n1", &names, true).await.unwrap();
        assert_eq!(both.genes, vec![rank("TP53", 2.0)]);
    }

    #[tokio::test]
    async fn test_missing_network_and_failing_export() {
        let api = api();
        assert!(matches!(
            api.get_network("nope").await,
            Err(ApiError::NotFound(_))
        ));
        api.insert_export("n1", ExportKind::Ranks, "gene\trank\n");
        api.fail_export(ExportKind::Ranks);
        let err = api.export_text(ExportKind::Ranks, "n1").await.unwrap_err();
        assert_eq!(err.status(), Some(500));
    }
}
