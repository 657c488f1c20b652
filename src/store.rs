use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info};

/// The store's native error shape (PostgREST sends `code` + `message`),
/// passed through to callers unmodified. Transport and decode failures are
/// mapped into the same shape at the boundary so nothing above this module
/// depends on reqwest's error type.
#[derive(Debug, Clone, Deserialize, Error, PartialEq)]
#[error("{code}: {message}")]
pub struct StoreError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl StoreError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self { code: "transport".into(), message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self { code: "not_found".into(), message: message.into() }
    }
}

/// Plain-data select builder. Callers refine a query with a
/// `Fn(SelectQuery) -> SelectQuery` closure; nothing here is tied to one
/// provider's builder shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectQuery {
    pub columns: Option<String>,
    pub filters: Vec<(String, String)>,
    pub order: Option<(String, bool)>,
    pub limit: Option<usize>,
}

impl SelectQuery {
    pub fn select(mut self, columns: &str) -> Self {
        self.columns = Some(columns.to_string());
        self
    }

    pub fn eq(mut self, column: &str, value: &str) -> Self {
        self.filters.push((column.to_string(), format!("eq.{value}")));
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some((column.to_string(), ascending));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Query-string pairs in PostgREST syntax.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        params.push(("select".to_string(), self.columns.clone().unwrap_or_else(|| "*".to_string())));
        for (column, expr) in &self.filters {
            params.push((column.clone(), expr.clone()));
        }
        if let Some((column, ascending)) = &self.order {
            let dir = if *ascending { "asc" } else { "desc" };
            params.push(("order".to_string(), format!("{column}.{dir}")));
        }
        if let Some(n) = self.limit {
            params.push(("limit".to_string(), n.to_string()));
        }
        params
    }
}

/// Capability seam over the remote tabular store. Hooks are generic over
/// this so their semantics are testable without a live store.
#[async_trait]
pub trait TabularStore: Send + Sync {
    async fn select(&self, table: &str, query: SelectQuery) -> Result<Vec<Value>, StoreError>;
    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, StoreError>;
    async fn update(&self, table: &str, id: &str, patch: Value) -> Result<Vec<Value>, StoreError>;
    /// Returns the number of rows removed.
    async fn delete(&self, table: &str, id: &str) -> Result<usize, StoreError>;
}

pub struct StoreClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl StoreClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self { client: Client::new(), base_url, api_key }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url.trim_end_matches('/'), table)
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.api_key).bearer_auth(&self.api_key)
    }

    /// Sends a prepared request and decodes the representation array,
    /// passing a non-2xx body through as the store's own error.
    async fn run(&self, req: reqwest::RequestBuilder, table: &str) -> Result<Vec<Value>, StoreError> {
        let response = self
            .authed(req)
            .send()
            .await
            .map_err(|e| StoreError::transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StoreError::transport(e.to_string()))?;

        if !status.is_success() {
            let err = serde_json::from_str::<StoreError>(&body).unwrap_or_else(|_| StoreError {
                code: status.as_u16().to_string(),
                message: body.clone(),
            });
            error!("store error on '{}': {}", table, err);
            return Err(err);
        }

        serde_json::from_str(&body).map_err(|e| StoreError {
            code: "decode".into(),
            message: format!("invalid store response: {e}"),
        })
    }
}

#[async_trait]
impl TabularStore for StoreClient {
    async fn select(&self, table: &str, query: SelectQuery) -> Result<Vec<Value>, StoreError> {
        info!("selecting from '{}'", table);
        let req = self.client.get(self.table_url(table)).query(&query.to_params());
        self.run(req, table).await
    }

    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, StoreError> {
        info!("inserting {} row(s) into '{}'", rows.len(), table);
        let req = self
            .client
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(&rows);
        self.run(req, table).await
    }

    async fn update(&self, table: &str, id: &str, patch: Value) -> Result<Vec<Value>, StoreError> {
        info!("updating '{}' id={}", table, id);
        let req = self
            .client
            .patch(self.table_url(table))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(&patch);
        self.run(req, table).await
    }

    async fn delete(&self, table: &str, id: &str) -> Result<usize, StoreError> {
        info!("deleting from '{}' id={}", table, id);
        // return=representation so a miss is visible as an empty array
        let req = self
            .client
            .delete(self.table_url(table))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation");
        let removed = self.run(req, table).await?;
        Ok(removed.len())
    }
}
