//! Wire format of `GET /api/{netId}` and the persisted layout records.

use crate::{EdgeId, ModelError, NodeId, PathwayNode, Position, SimilarityEdge};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDocument {
    #[serde(rename = "networkIDStr", default)]
    pub network_id: String,
    #[serde(default)]
    pub network_name: String,
    /// Filter parameters the network was built with; echoed into the export README.
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub elements: NetworkElements,
    #[serde(default)]
    pub clusters: Vec<ClusterDefinition>,
    #[serde(default)]
    pub positions: Option<Vec<PersistedPosition>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkElements {
    #[serde(default)]
    pub nodes: Vec<NodeElement>,
    #[serde(default)]
    pub edges: Vec<EdgeElement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeElement {
    pub data: NodeData,
    #[serde(default)]
    pub position: Option<Position>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeData {
    pub id: NodeId,
    pub name: Vec<String>,
    #[serde(rename = "NES")]
    pub nes: f64,
    pub padj: f64,
    pub gs_size: u32,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeElement {
    pub data: EdgeData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeData {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub similarity_coefficient: f64,
    #[serde(default)]
    pub overlap_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterDefinition {
    pub id: NodeId,
    pub label: String,
    pub members: Vec<NodeId>,
}

/// One entry of `POST /api/{netId}/positions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedPosition {
    pub id: NodeId,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub collapsed: bool,
}

impl NetworkDocument {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Checks the invariants the graph engine relies on.
    pub fn validate(&self) -> Result<(), ModelError> {
        let mut seen = HashSet::new();
        for node in &self.elements.nodes {
            if node.data.name.is_empty() {
                return Err(ModelError::MissingGeneSet(node.data.id.clone()));
            }
            if !seen.insert(node.data.id.0.as_str()) {
                return Err(ModelError::DuplicateId(node.data.id.0.clone()));
            }
        }
        for cluster in &self.clusters {
            if !seen.insert(cluster.id.0.as_str()) {
                return Err(ModelError::DuplicateId(cluster.id.0.clone()));
            }
        }
        for edge in &self.elements.edges {
            let value = edge.data.similarity_coefficient;
            if !value.is_finite() || value <= 0.0 || value > 1.0 {
                return Err(ModelError::InvalidSimilarity {
                    edge: edge.data.id.clone(),
                    value,
                });
            }
            if !seen.insert(edge.data.id.0.as_str()) {
                return Err(ModelError::DuplicateId(edge.data.id.0.clone()));
            }
        }
        Ok(())
    }

    pub fn has_persisted_layout(&self) -> bool {
        self.positions.as_ref().is_some_and(|p| !p.is_empty())
    }
}

impl NodeElement {
    pub fn to_pathway(&self) -> PathwayNode {
        PathwayNode {
            id: self.data.id.clone(),
            gene_sets: self.data.name.clone(),
            nes: self.data.nes,
            padj: self.data.padj,
            gene_set_size: self.data.gs_size,
            label: self.data.label.clone(),
            position: self.position.unwrap_or_default(),
            parent: None,
        }
    }
}

impl EdgeElement {
    pub fn to_similarity(&self) -> SimilarityEdge {
        SimilarityEdge {
            id: self.data.id.clone(),
            source: self.data.source.clone(),
            target: self.data.target.clone(),
            similarity: self.data.similarity_coefficient,
            overlap_size: self.data.overlap_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "networkIDStr": "abc123",
        "networkName": "My Network",
        "parameters": { "pvalue": 1.0, "qvalue": 0.1, "similarityMetric": "JACCARD" },
        "elements": {
            "nodes": [
                { "data": { "id": "n1", "name": ["GS_A"], "NES": 1.5, "padj": 0.01, "gs_size": 40 } },
                { "data": { "id": "n2", "name": ["GS_B", "GS_C"], "NES": -2.0, "padj": 0.02, "gs_size": 12, "label": "B" },
                  "position": { "x": 10.0, "y": 20.0 } }
            ],
            "edges": [
                { "data": { "id": "e1", "source": "n1", "target": "n2", "similarity_coefficient": 0.4, "overlap_size": 5 } }
            ]
        },
        "clusters": [ { "id": "c1", "label": "Cluster", "members": ["n1", "n2"] } ]
    }"#;

    #[test]
    fn test_parse_network_document() {
        let doc = NetworkDocument::from_json(SAMPLE).unwrap();
        assert_eq!(doc.network_id, "abc123");
        assert_eq!(doc.elements.nodes.len(), 2);
        assert_eq!(doc.elements.nodes[1].data.label.as_deref(), Some("B"));
        assert_eq!(doc.elements.edges[0].data.overlap_size, 5);
        assert_eq!(doc.clusters[0].members.len(), 2);
        assert!(!doc.has_persisted_layout());
        doc.validate().unwrap();

        let node = doc.elements.nodes[1].to_pathway();
        assert_eq!(node.position, Position::new(10.0, 20.0));
        assert_eq!(node.gene_sets, vec!["GS_B", "GS_C"]);
    }

    #[test]
    fn test_validate_rejects_zero_similarity() {
        let mut doc = NetworkDocument::from_json(SAMPLE).unwrap();
        doc.elements.edges[0].data.similarity_coefficient = 0.0;
        assert!(matches!(
            doc.validate(),
            Err(ModelError::InvalidSimilarity { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let mut doc = NetworkDocument::from_json(SAMPLE).unwrap();
        doc.clusters[0].id = NodeId::new("n1");
        assert_eq!(
            doc.validate(),
            Err(ModelError::DuplicateId("n1".to_string()))
        );
    }
}
