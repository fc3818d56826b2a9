//! InfluxDB 1.x HTTP API: `/query` with JSON results and `/write`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::{base_url, check_status, QueryTransport, WriteTransport};
use crate::codec::{Datum, ResultTable};
use crate::config::StoreConfig;
use crate::error::TransportError;
use crate::schema;

/// Client for one database and retention policy.
#[derive(Debug, Clone)]
pub struct V1Transport {
    client: Client,
    base_url: Url,
    database: String,
    retention_policy: String,
    credentials: Option<(String, String)>,
}

impl V1Transport {
    pub fn new(config: &StoreConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .danger_accept_invalid_certs(config.v1.unsafe_ssl)
            .build()?;
        let base_url = base_url(&config.host)?;
        let credentials = (!config.v1.username.is_empty())
            .then(|| (config.v1.username.clone(), config.v1.password.clone()));

        Ok(Self {
            client,
            base_url,
            database: config.v1.database.clone(),
            retention_policy: config.v1.retention_policy.clone(),
            credentials,
        })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Some((user, password)) => builder.basic_auth(user, Some(password)),
            None => builder,
        }
    }
}

#[async_trait]
impl QueryTransport for V1Transport {
    async fn query(&self, query: &str) -> Result<Vec<ResultTable>, TransportError> {
        tracing::debug!(query, "Running InfluxQL query");
        let url = self.base_url.join("query")?;
        let response = self
            .request(self.client.get(url).query(&[
                ("db", self.database.as_str()),
                ("rp", self.retention_policy.as_str()),
                ("epoch", "ns"),
                ("q", query),
            ]))
            .send()
            .await?;
        let body = check_status(response).await?.text().await?;
        parse_response(&body)
    }
}

#[async_trait]
impl WriteTransport for V1Transport {
    async fn write(&self, lines: &str) -> Result<(), TransportError> {
        let url = self.base_url.join("write")?;
        let response = self
            .request(self.client.post(url).query(&[
                ("db", self.database.as_str()),
                ("rp", self.retention_policy.as_str()),
                ("precision", "ns"),
            ]))
            .body(lines.to_string())
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    results: Vec<StatementResult>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    series: Vec<Series>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Series {
    name: Option<String>,
    #[serde(default)]
    tags: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

/// Decode a `/query` JSON body, one table per series.
///
/// Series tags become the table's group key. The series name is recorded
/// under `_measurement` unless a tag already uses that name.
pub fn parse_response(body: &str) -> Result<Vec<ResultTable>, TransportError> {
    let response: Response =
        serde_json::from_str(body).map_err(|e| TransportError::Response(e.to_string()))?;
    if let Some(error) = response.error {
        return Err(TransportError::Query(error));
    }

    let mut tables = Vec::new();
    for result in response.results {
        if let Some(error) = result.error {
            return Err(TransportError::Query(error));
        }
        for series in result.series {
            let mut table = ResultTable::new(series.columns);
            table.group_key = series.tags;
            if let Some(name) = series.name {
                table.group_key.entry(schema::MEASUREMENT.to_string()).or_insert(name);
            }
            for values in series.values {
                let row = table
                    .columns
                    .iter()
                    .zip(values)
                    .map(|(column, value)| datum(column, value))
                    .collect::<Result<Vec<_>, _>>()?;
                table.push_row(row);
            }
            tables.push(table);
        }
    }
    Ok(tables)
}

fn datum(column: &str, value: serde_json::Value) -> Result<Datum, TransportError> {
    use serde_json::Value;

    Ok(match value {
        Value::Null => Datum::Null,
        Value::Bool(b) => Datum::Bool(b),
        Value::String(s) => Datum::String(s),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                if column == schema::TIME_V1 {
                    Datum::Time(i)
                } else {
                    Datum::Int(i)
                }
            } else if let Some(u) = n.as_u64() {
                Datum::UInt(u)
            } else {
                Datum::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        other => {
            return Err(TransportError::Response(format!(
                "unexpected value {other} in column {column:?}"
            )))
        }
    })
}
