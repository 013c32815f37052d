use serde::{Deserialize, Serialize};
use std::fmt;

pub mod error;
pub mod network;

pub use error::ModelError;
pub use network::{
    ClusterDefinition, EdgeData, EdgeElement, NetworkDocument, NetworkElements, NodeData,
    NodeElement, PersistedPosition,
};

/// Number of decimals kept for a cluster's average NES.
pub const NES_DECIMALS: i32 = 4;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub String);

impl EdgeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EdgeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identity of any graph element, node or edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ElementId {
    Node(NodeId),
    Edge(EdgeId),
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(id) => write!(f, "node:{id}"),
            Self::Edge(id) => write!(f, "edge:{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn approx_eq(&self, other: Position, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance && (self.y - other.y).abs() <= tolerance
    }

    pub fn lerp(&self, other: Position, t: f64) -> Position {
        Position::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }
}

/// Axis-aligned bounding box in model coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn around(center: Position, width: f64, height: f64) -> Self {
        Self {
            x1: center.x - width / 2.0,
            y1: center.y - height / 2.0,
            x2: center.x + width / 2.0,
            y2: center.y + height / 2.0,
        }
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }

    pub fn expand(&self, padding: f64) -> BoundingBox {
        BoundingBox {
            x1: self.x1 - padding,
            y1: self.y1 - padding,
            x2: self.x2 + padding,
            y2: self.y2 + padding,
        }
    }
}

/// Leaf element: one enrichment result (possibly several merged gene sets).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathwayNode {
    pub id: NodeId,
    pub gene_sets: Vec<String>,
    pub nes: f64,
    pub padj: f64,
    pub gene_set_size: u32,
    pub label: Option<String>,
    pub position: Position,
    pub parent: Option<NodeId>,
}

impl PathwayNode {
    /// User label when assigned, otherwise the first gene-set name.
    pub fn display_label(&self) -> &str {
        self.label
            .as_deref()
            .or_else(|| self.gene_sets.first().map(String::as_str))
            .unwrap_or(self.id.as_str())
    }
}

/// Compound element grouping correlated pathways.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterNode {
    pub id: NodeId,
    pub label: String,
    pub average_nes: f64,
    pub collapsed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityEdge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub similarity: f64,
    pub overlap_size: u32,
}

impl SimilarityEdge {
    pub fn connects(&self, node: &NodeId) -> bool {
        &self.source == node || &self.target == node
    }
}

/// Snapshot of a removed element, sufficient to re-add it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Element {
    Pathway(PathwayNode),
    Cluster {
        node: ClusterNode,
        members: Vec<NodeId>,
    },
    Edge(SimilarityEdge),
}

impl Element {
    pub fn id(&self) -> ElementId {
        match self {
            Element::Pathway(node) => ElementId::Node(node.id.clone()),
            Element::Cluster { node, .. } => ElementId::Node(node.id.clone()),
            Element::Edge(edge) => ElementId::Edge(edge.id.clone()),
        }
    }

    pub fn is_edge(&self) -> bool {
        matches!(self, Element::Edge(_))
    }
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Mean of the given NES values rounded to [`NES_DECIMALS`]; `None` for an empty input.
pub fn average_nes<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(round_to(sum / count as f64, NES_DECIMALS))
    }
}
