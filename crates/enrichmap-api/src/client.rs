//! reqwest-backed client for the network service.

use crate::dto::{ExportKind, GeneSetsRequest, GeneSetsResponse, PositionsRequest, SearchGeneSet};
use crate::errors::ApiError;
use crate::NetworkApi;
use async_trait::async_trait;
use enrichmap_core::{NetworkDocument, PersistedPosition};
use enrichmap_events::telemetry::{OP_SAVE_POSITIONS, OperationSpan};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct HttpNetworkApi {
    http: Client,
    base_url: String,
}

impl HttpNetworkApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn network_url(&self, net_id: &str) -> String {
        format!("{}/api/{}", self.base_url, net_id)
    }

    fn positions_url(&self, net_id: &str) -> String {
        format!("{}/positions", self.network_url(net_id))
    }

    fn gene_sets_url(&self, net_id: &str) -> String {
        format!("{}/genesets", self.network_url(net_id))
    }

    fn search_url(&self, net_id: &str) -> String {
        format!("{}/genesforsearch", self.network_url(net_id))
    }

    fn export_url(&self, kind: ExportKind, net_id: &str) -> String {
        format!("{}/api/export/{}/{}", self.base_url, kind, net_id)
    }
}

/// Maps non-2xx responses to [`ApiError::Status`], keeping the body as message.
async fn check(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "(no body)".into());
    Err(ApiError::Status {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let response = check(response).await?;
    response
        .json()
        .await
        .map_err(|e| ApiError::Decode(format!("failed to parse response: {e}")))
}

#[async_trait]
impl NetworkApi for HttpNetworkApi {
    async fn get_network(&self, net_id: &str) -> Result<NetworkDocument, ApiError> {
        let url = self.network_url(net_id);
        debug!("GET {}", url);
        let response = self.http.get(&url).send().await?;
        decode(response).await
    }

    async fn save_positions(
        &self,
        net_id: &str,
        positions: &[PersistedPosition],
    ) -> Result<(), ApiError> {
        let span = OperationSpan::start(OP_SAVE_POSITIONS);
        span.context(&format!("{} records for {}", positions.len(), net_id));
        let body = PositionsRequest {
            positions: positions.to_vec(),
        };
        let result = async {
            let response = self
                .http
                .post(self.positions_url(net_id))
                .json(&body)
                .send()
                .await?;
            check(response).await.map(|_| ())
        }
        .await;
        span.finish(result)
    }

    async fn delete_positions(&self, net_id: &str) -> Result<(), ApiError> {
        let response = self.http.delete(self.positions_url(net_id)).send().await?;
        check(response).await.map(|_| ())
    }

    async fn gene_sets(
        &self,
        net_id: &str,
        names: &[String],
        intersection: bool,
    ) -> Result<GeneSetsResponse, ApiError> {
        let body = GeneSetsRequest {
            gene_sets: names.to_vec(),
        };
        let response = self
            .http
            .post(self.gene_sets_url(net_id))
            .query(&[("intersection", intersection)])
            .json(&body)
            .send()
            .await?;
        decode(response).await
    }

    async fn genes_for_search(&self, net_id: &str) -> Result<Vec<SearchGeneSet>, ApiError> {
        let response = self.http.get(self.search_url(net_id)).send().await?;
        decode(response).await
    }

    async fn export_text(&self, kind: ExportKind, net_id: &str) -> Result<String, ApiError> {
        let url = self.export_url(kind, net_id);
        debug!("GET {}", url);
        let response = check(self.http.get(&url).send().await?).await?;
        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let api = HttpNetworkApi::new("http://localhost:3000/");
        assert_eq!(api.base_url(), "http://localhost:3000");
        assert_eq!(api.network_url("n1"), "http://localhost:3000/api/n1");
        assert_eq!(
            api.positions_url("n1"),
            "http://localhost:3000/api/n1/positions"
        );
        assert_eq!(
            api.gene_sets_url("n1"),
            "http://localhost:3000/api/n1/genesets"
        );
        assert_eq!(
            api.search_url("n1"),
            "http://localhost:3000/api/n1/genesforsearch"
        );
        assert_eq!(
            api.export_url(ExportKind::Enrichment, "n1"),
            "http://localhost:3000/api/export/enrichment/n1"
        );
    }

    #[test]
    fn test_error_display() {
        let err = ApiError::Status {
            status: 500,
            message: "boom".into(),
        };
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("boom"));
        assert_eq!(err.status(), Some(500));
        assert_eq!(ApiError::Decode("bad".into()).status(), None);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        // Bind then release a port so nothing is listening on it.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let api = HttpNetworkApi::new(format!("http://127.0.0.1:{port}"));
        let err = api.get_network("missing").await.unwrap_err();
        assert!(matches!(err, ApiError::Http(_)));
    }
}
