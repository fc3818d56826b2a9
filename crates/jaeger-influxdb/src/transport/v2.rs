//! InfluxDB 2.x HTTP API: Flux queries with annotated CSV results and
//! `/api/v2/write`.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::{annotated_csv, base_url, check_status, QueryTransport, WriteTransport};
use crate::codec::ResultTable;
use crate::config::StoreConfig;
use crate::error::TransportError;

/// Client for one organization and bucket, addressed by id.
#[derive(Debug, Clone)]
pub struct V2Transport {
    client: Client,
    base_url: Url,
    token: String,
    org_id: String,
    bucket_id: String,
}

#[derive(Debug, Deserialize)]
struct Orgs {
    #[serde(default)]
    orgs: Vec<Named>,
}

#[derive(Debug, Deserialize)]
struct Buckets {
    #[serde(default)]
    buckets: Vec<Named>,
}

#[derive(Debug, Deserialize)]
struct Named {
    id: String,
    name: String,
}

impl V2Transport {
    /// Connect and resolve the configured organization and bucket names.
    pub async fn connect(config: &StoreConfig) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        let mut transport = Self {
            client,
            base_url: base_url(&config.host)?,
            token: config.v2.token.clone(),
            org_id: String::new(),
            bucket_id: String::new(),
        };

        transport.org_id = transport.resolve_org(&config.v2.organization).await?;
        transport.bucket_id = transport
            .resolve_bucket(&transport.org_id, &config.v2.bucket)
            .await?;
        tracing::info!(
            org_id = %transport.org_id,
            bucket_id = %transport.bucket_id,
            "Resolved InfluxDB organization and bucket"
        );
        Ok(transport)
    }

    pub fn org_id(&self) -> &str {
        &self.org_id
    }

    pub fn bucket_id(&self) -> &str {
        &self.bucket_id
    }

    fn get(&self, path: &str) -> Result<reqwest::RequestBuilder, TransportError> {
        Ok(self
            .client
            .get(self.base_url.join(path)?)
            .header(AUTHORIZATION, format!("Token {}", self.token)))
    }

    fn post(&self, path: &str) -> Result<reqwest::RequestBuilder, TransportError> {
        Ok(self
            .client
            .post(self.base_url.join(path)?)
            .header(AUTHORIZATION, format!("Token {}", self.token)))
    }

    async fn resolve_org(&self, name: &str) -> Result<String, TransportError> {
        let response = self.get("api/v2/orgs")?.query(&[("org", name)]).send().await?;
        let orgs: Orgs = check_status(response).await?.json().await?;
        find_id(orgs.orgs, name)
            .ok_or_else(|| TransportError::Response(format!("organization {name:?} not found")))
    }

    async fn resolve_bucket(&self, org_id: &str, name: &str) -> Result<String, TransportError> {
        let response = self
            .get("api/v2/buckets")?
            .query(&[("orgID", org_id), ("name", name)])
            .send()
            .await?;
        let buckets: Buckets = check_status(response).await?.json().await?;
        find_id(buckets.buckets, name)
            .ok_or_else(|| TransportError::Response(format!("bucket {name:?} not found")))
    }
}

fn find_id(items: Vec<Named>, name: &str) -> Option<String> {
    items.into_iter().find(|item| item.name == name).map(|item| item.id)
}

#[async_trait]
impl QueryTransport for V2Transport {
    async fn query(&self, query: &str) -> Result<Vec<ResultTable>, TransportError> {
        tracing::debug!(query, "Running Flux query");
        let body = serde_json::json!({
            "query": query,
            "type": "flux",
            "dialect": {
                "header": true,
                "annotations": ["datatype", "group", "default"],
                "delimiter": ",",
            },
        });
        let response = self
            .post("api/v2/query")?
            .query(&[("orgID", self.org_id.as_str())])
            .header(ACCEPT, "application/csv")
            .json(&body)
            .send()
            .await?;
        let text = check_status(response).await?.text().await?;
        annotated_csv::parse(&text)
    }
}

#[async_trait]
impl WriteTransport for V2Transport {
    async fn write(&self, lines: &str) -> Result<(), TransportError> {
        let response = self
            .post("api/v2/write")?
            .query(&[
                ("orgID", self.org_id.as_str()),
                ("bucket", self.bucket_id.as_str()),
                ("precision", "ns"),
            ])
            .body(lines.to_string())
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}
