use enrichmap_core::PersistedPosition;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Body of `POST /api/{netId}/positions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionsRequest {
    pub positions: Vec<PersistedPosition>,
}

/// Body of `POST /api/{netId}/genesets`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneSetsRequest {
    pub gene_sets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneRank {
    pub gene: String,
    pub rank: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneSetsResponse {
    pub genes: Vec<GeneRank>,
    pub min_rank: f64,
    pub max_rank: f64,
}

impl GeneSetsResponse {
    /// Builds a response with the rank range derived from `genes`.
    pub fn from_genes(genes: Vec<GeneRank>) -> Self {
        let (min_rank, max_rank) = genes
            .iter()
            .map(|g| g.rank)
            .fold(None, |acc: Option<(f64, f64)>, rank| match acc {
                Some((lo, hi)) => Some((lo.min(rank), hi.max(rank))),
                None => Some((rank, rank)),
            })
            .unwrap_or((0.0, 0.0));
        Self {
            genes,
            min_rank,
            max_rank,
        }
    }
}

/// One entry of `GET /api/{netId}/genesforsearch`: a gene set and its ranked genes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchGeneSet {
    pub name: String,
    #[serde(default)]
    pub genes: Vec<GeneRank>,
}

/// Plaintext tables served under `/api/export/{kind}/{netId}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    Enrichment,
    Ranks,
    Gmt,
}

impl ExportKind {
    pub const ALL: [ExportKind; 3] = [ExportKind::Enrichment, ExportKind::Ranks, ExportKind::Gmt];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportKind::Enrichment => "enrichment",
            ExportKind::Ranks => "ranks",
            ExportKind::Gmt => "gmt",
        }
    }

    /// Path of the table inside an export archive.
    pub fn archive_path(&self) -> &'static str {
        match self {
            ExportKind::Enrichment => "data/enrichment_results.txt",
            ExportKind::Ranks => "data/ranks.txt",
            ExportKind::Gmt => "data/gene_sets.gmt",
        }
    }
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enrichmap_core::NodeId;
    use serde_json::json;

    #[test]
    fn test_positions_request_shape() {
        let body = PositionsRequest {
            positions: vec![PersistedPosition {
                id: NodeId::new("c1"),
                x: 1.5,
                y: -2.0,
                collapsed: true,
            }],
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({ "positions": [{ "id": "c1", "x": 1.5, "y": -2.0, "collapsed": true }] })
        );
    }

    #[test]
    fn test_gene_sets_wire_names() {
        let request = GeneSetsRequest {
            gene_sets: vec!["HALLMARK_APOPTOSIS".into()],
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "geneSets": ["HALLMARK_APOPTOSIS"] })
        );

        let response: GeneSetsResponse = serde_json::from_value(json!({
            "genes": [{ "gene": "TP53", "rank": 2.5 }],
            "minRank": -3.0,
            "maxRank": 4.0
        }))
        .unwrap();
        assert_eq!(response.genes[0].gene, "TP53");
        assert_eq!(response.min_rank, -3.0);
    }

    #[test]
    fn test_rank_range_from_genes() {
        let response = GeneSetsResponse::from_genes(vec![
            GeneRank {
                gene: "A".into(),
                rank: 1.0,
            },
            GeneRank {
                gene: "B".into(),
                rank: -4.0,
            },
        ]);
        assert_eq!((response.min_rank, response.max_rank), (-4.0, 1.0));
        assert_eq!(GeneSetsResponse::from_genes(Vec::new()).max_rank, 0.0);
    }

    #[test]
    fn test_export_kind_paths() {
        assert_eq!(ExportKind::Gmt.to_string(), "gmt");
        assert_eq!(ExportKind::Ranks.archive_path(), "data/ranks.txt");
    }
}
