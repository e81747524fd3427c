//! ChromaDB Cloud client used for vector search over the mission corpus.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode, header::HeaderValue};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use thiserror::Error;

/// Header carrying the ChromaDB Cloud API token.
const TOKEN_HEADER: &str = "X-Chroma-Token";
const HEARTBEAT_PATH: &str = "/api/v2/heartbeat";

/// Convenient result alias returning [`ChromaError`] failures.
pub type ChromaResult<T> = Result<T, ChromaError>;

/// Failures that can occur while talking to ChromaDB Cloud.
#[derive(Debug, Error)]
pub enum ChromaError {
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build ChromaDB client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// The API key is not a valid header value.
    #[error("ChromaDB API key contains characters that cannot be sent in a header")]
    InvalidApiKey,
    /// A request could not be sent.
    #[error("failed to send ChromaDB request to `{path}`")]
    RequestSend {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// The API key or tenant/database pair was rejected.
    #[error("ChromaDB rejected the configured credentials")]
    Unauthorized,
    /// No collection with the requested name exists in the database.
    #[error("ChromaDB collection `{name}` not found")]
    CollectionNotFound { name: String },
    /// Any other non-success status.
    #[error("unexpected ChromaDB response status {status} for `{path}`")]
    RequestStatus { path: String, status: StatusCode },
    /// Response payload could not be parsed.
    #[error("failed to decode ChromaDB response for `{path}`")]
    DecodeResponse {
        path: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Collection descriptor returned by the collections endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionInfo {
    /// Server-assigned collection id, used in query paths.
    pub id: String,
    /// Human-chosen collection name.
    pub name: String,
}

/// Result of a vector query. Inner vectors are parallel and hold one entry
/// per returned chunk; the outer level has one entry per query embedding.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryResult {
    pub ids: Vec<Vec<String>>,
    #[serde(default)]
    pub documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    pub metadatas: Option<Vec<Vec<Option<Value>>>>,
    #[serde(default)]
    pub distances: Option<Vec<Vec<f32>>>,
}

/// HTTP client for one ChromaDB Cloud tenant/database pair.
#[derive(Clone)]
pub struct ChromaClient {
    client: Client,
    base_url: Arc<str>,
    tenant: Arc<str>,
    database: Arc<str>,
    api_key: HeaderValue,
}

impl ChromaClient {
    /// Build a client against `base_url` (usually `https://api.trychroma.com:8000`).
    pub fn new(base_url: &str, api_key: &str, tenant: &str, database: &str) -> ChromaResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|source| ChromaError::ClientBuilder { source })?;

        let mut api_key = HeaderValue::from_str(api_key).map_err(|_| ChromaError::InvalidApiKey)?;
        api_key.set_sensitive(true);

        Ok(Self {
            client,
            base_url: Arc::<str>::from(base_url.trim_end_matches('/')),
            tenant: Arc::<str>::from(tenant),
            database: Arc::<str>::from(database),
            api_key,
        })
    }

    fn collections_path(&self) -> String {
        format!(
            "/api/v2/tenants/{}/databases/{}/collections",
            self.tenant, self.database
        )
    }

    /// Liveness probe; returns the server's nanosecond heartbeat.
    pub async fn heartbeat(&self) -> ChromaResult<i64> {
        let body: Value = self.get_json(HEARTBEAT_PATH.to_string()).await?;
        Ok(body["nanosecond heartbeat"].as_i64().unwrap_or_default())
    }

    /// Look a collection up by name.
    ///
    /// The cloud API addresses collections by server-assigned id, so callers
    /// resolve the configured name once and reuse the id.
    pub async fn resolve_collection(&self, name: &str) -> ChromaResult<CollectionInfo> {
        let collections: Vec<CollectionInfo> = self.get_json(self.collections_path()).await?;
        collections
            .into_iter()
            .find(|collection| collection.name == name)
            .ok_or_else(|| ChromaError::CollectionNotFound {
                name: name.to_string(),
            })
    }

    /// Run a nearest-neighbor query with a single embedding.
    pub async fn query(
        &self,
        collection_id: &str,
        embedding: &[f32],
        n_results: u32,
    ) -> ChromaResult<QueryResult> {
        let path = format!("{}/{}/query", self.collections_path(), collection_id);
        let body = json!({
            "query_embeddings": [embedding],
            "n_results": n_results,
            "include": ["documents", "metadatas", "distances"],
        });

        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header(TOKEN_HEADER, self.api_key.clone())
            .json(&body)
            .send()
            .await
            .map_err(|source| ChromaError::RequestSend {
                path: path.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ChromaError::Unauthorized),
            status if status.is_success() => {
                response
                    .json::<QueryResult>()
                    .await
                    .map_err(|source| ChromaError::DecodeResponse { path, source })
            }
            status => Err(ChromaError::RequestStatus { path, status }),
        }
    }

    async fn get_json<T>(&self, path: String) -> ChromaResult<T>
    where
        T: DeserializeOwned,
    {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header(TOKEN_HEADER, self.api_key.clone())
            .send()
            .await
            .map_err(|source| ChromaError::RequestSend {
                path: path.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ChromaError::Unauthorized),
            status if status.is_success() => {
                response
                    .json::<T>()
                    .await
                    .map_err(|source| ChromaError::DecodeResponse { path, source })
            }
            status => Err(ChromaError::RequestStatus { path, status }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_result_decodes_parallel_arrays() {
        let result: QueryResult = serde_json::from_value(json!({
            "ids": [["chunk-1", "chunk-2"]],
            "documents": [["Voyager 1 left the heliosphere.", null]],
            "metadatas": [[{"title": "Voyager"}, null]],
            "distances": [[0.21, 0.58]]
        }))
        .unwrap();
        assert_eq!(result.ids[0].len(), 2);
        assert_eq!(
            result.documents.unwrap()[0][0].as_deref(),
            Some("Voyager 1 left the heliosphere.")
        );
        assert!(result.metadatas.unwrap()[0][1].is_none());
        assert_eq!(result.distances.unwrap()[0], vec![0.21, 0.58]);
    }

    #[test]
    fn query_result_tolerates_missing_includes() {
        let result: QueryResult = serde_json::from_value(json!({
            "ids": [[]]
        }))
        .unwrap();
        assert!(result.documents.is_none());
        assert!(result.distances.is_none());
    }

    #[test]
    fn collection_list_decodes_ids_and_names() {
        let collections: Vec<CollectionInfo> = serde_json::from_value(json!([
            {"id": "0c7ad8f2-41f5-4a7e-9dd1-6c2f8f0a2b11", "name": "space_missions", "metadata": null, "dimension": 1536},
            {"id": "9d2b6c1e-8f4a-4b0c-a1d2-3e4f5a6b7c8d", "name": "other"}
        ]))
        .unwrap();
        let hit = collections
            .iter()
            .find(|collection| collection.name == "space_missions")
            .unwrap();
        assert_eq!(hit.id, "0c7ad8f2-41f5-4a7e-9dd1-6c2f8f0a2b11");
    }

    #[test]
    fn rejects_api_keys_with_control_characters() {
        let err = ChromaClient::new("https://api.trychroma.com:8000", "bad\nkey", "t", "d")
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, ChromaError::InvalidApiKey));
    }
}
