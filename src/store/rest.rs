//! PostgREST-style remote table client

use super::{Filter, Order, PersistenceStore, StoreError, Table};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::time::Duration;

/// Table client for a remote REST store (`{url}/rest/v1/{table}`)
pub struct RestStore {
    client: Client,
    base_url: String,
    key: SecretString,
}

impl RestStore {
    pub fn new(url: &str, key: SecretString, timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: format!("{}/rest/v1", url.trim_end_matches('/')),
            key,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, table: Table) -> RequestBuilder {
        let key = self.key.expose_secret();
        self.client
            .request(method, format!("{}/{}", self.base_url, table))
            .header("apikey", key)
            .bearer_auth(key)
    }

    async fn rows(table: Table, response: Response) -> Result<Vec<Value>, StoreError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(%table, status = status.as_u16(), "Store request rejected");
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<Vec<Value>>().await?)
    }
}

/// Query-string pairs for filters and ordering
pub(crate) fn query_params(filters: &[Filter], order: Option<&Order>) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = filters
        .iter()
        .map(|f| (f.column.clone(), format!("eq.{}", f.value)))
        .collect();

    if let Some(order) = order {
        params.push(("order".to_string(), format!("{}.asc", order.column)));
    }

    params
}

#[async_trait]
impl PersistenceStore for RestStore {
    async fn insert(&self, table: Table, record: Value) -> Result<Value, StoreError> {
        let response = self
            .request(Method::POST, table)
            .header("Prefer", "return=representation")
            .json(&record)
            .send()
            .await?;

        Self::rows(table, response)
            .await?
            .into_iter()
            .next()
            .ok_or(StoreError::EmptyInsert(table.as_str()))
    }

    async fn select(
        &self,
        table: Table,
        filters: &[Filter],
        order: Option<&Order>,
    ) -> Result<Vec<Value>, StoreError> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(query_params(filters, order));

        let response = self.request(Method::GET, table).query(&params).send().await?;
        Self::rows(table, response).await
    }

    async fn update(
        &self,
        table: Table,
        filters: &[Filter],
        patch: Value,
    ) -> Result<Vec<Value>, StoreError> {
        let response = self
            .request(Method::PATCH, table)
            .header("Prefer", "return=representation")
            .query(&query_params(filters, None))
            .json(&patch)
            .send()
            .await?;
        Self::rows(table, response).await
    }
}
