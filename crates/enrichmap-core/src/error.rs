use crate::{EdgeId, NodeId};
use thiserror::Error;

/// Malformed network documents.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Pathway node {0} has no gene set names")]
    MissingGeneSet(NodeId),
    #[error("Edge {edge} has invalid similarity coefficient {value}")]
    InvalidSimilarity { edge: EdgeId, value: f64 },
    #[error("Duplicate element id: {0}")]
    DuplicateId(String),
}
