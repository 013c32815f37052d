mod client;
mod dto;
mod errors;
mod memory;

pub use client::HttpNetworkApi;
pub use dto::{
    ExportKind, GeneRank, GeneSetsRequest, GeneSetsResponse, PositionsRequest, SearchGeneSet,
};
pub use errors::ApiError;
pub use memory::InMemoryNetworkApi;

use async_trait::async_trait;
use enrichmap_core::{NetworkDocument, PersistedPosition};

/// The HTTP services the editor consumes.
#[async_trait]
pub trait NetworkApi: Send + Sync {
    /// `GET /api/{netId}`
    async fn get_network(&self, net_id: &str) -> Result<NetworkDocument, ApiError>;

    /// `POST /api/{netId}/positions`
    async fn save_positions(
        &self,
        net_id: &str,
        positions: &[PersistedPosition],
    ) -> Result<(), ApiError>;

    /// `DELETE /api/{netId}/positions`; the next load runs a fresh layout.
    async fn delete_positions(&self, net_id: &str) -> Result<(), ApiError>;

    /// `POST /api/{netId}/genesets?intersection=...`
    async fn gene_sets(
        &self,
        net_id: &str,
        names: &[String],
        intersection: bool,
    ) -> Result<GeneSetsResponse, ApiError>;

    /// `GET /api/{netId}/genesforsearch`
    async fn genes_for_search(&self, net_id: &str) -> Result<Vec<SearchGeneSet>, ApiError>;

    /// `GET /api/export/{kind}/{netId}`, returned verbatim.
    async fn export_text(&self, kind: ExportKind, net_id: &str) -> Result<String, ApiError>;
}
