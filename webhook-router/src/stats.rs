//! Delivery statistics pulled from the relay log index in Elasticsearch.
//!
//! The router logs every relay attempt with `uuid` and `success` fields and
//! those records are shipped into one index. Counting successes and failures
//! per route is a `query_string` query against that index.

use anyhow::{anyhow, bail, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::Config;

/// Number of failure records returned by [`StatisticsQuerier::route_logs`].
pub const RECENT_FAILURES: usize = 10;

/// Success and failure counts for one route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStats {
    pub successes: u64,
    pub failures: u64,
}

/// Counts for one route in a batch, tagged with its uuid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRouteStats {
    pub uuid: String,
    pub successes: u64,
    pub failures: u64,
}

/// Elasticsearch client for relay logs.
#[derive(Debug, Clone)]
pub struct StatisticsQuerier {
    client: Client,
    base_url: String,
    index: String,
    credentials: Option<(String, Option<String>)>,
}

impl StatisticsQuerier {
    pub fn new(client: Client, base_url: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            index: index.into(),
            credentials: None,
        }
    }

    pub fn from_config(config: &Config, client: Client) -> Self {
        let mut querier = Self::new(
            client,
            config.elasticsearch_url.clone(),
            config.elasticsearch_index.clone(),
        );
        if let Some(user) = &config.elasticsearch_user {
            querier.credentials = Some((user.clone(), config.elasticsearch_password.clone()));
        }
        querier
    }

    fn uuid_query(uuid: &str, success: bool) -> Value {
        json!({
            "query": {
                "query_string": {
                    "query": format!("uuid:\"{}\" AND success:{}", uuid, success)
                }
            }
        })
    }

    fn request(&self, method: reqwest::Method, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.index, endpoint);
        let builder = self.client.request(method, url);
        match &self.credentials {
            Some((user, password)) => builder.basic_auth(user, password.as_ref()),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder, what: &str) -> Result<Value> {
        let response = builder
            .send()
            .await
            .with_context(|| format!("Elasticsearch {} request failed", what))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Elasticsearch {} returned {}: {}", what, status, body);
        }

        response
            .json()
            .await
            .with_context(|| format!("Elasticsearch {} returned malformed JSON", what))
    }

    async fn count(&self, uuid: &str, success: bool) -> Result<u64> {
        let body = self
            .send(
                self.request(reqwest::Method::POST, "_count")
                    .json(&Self::uuid_query(uuid, success)),
                "count",
            )
            .await?;

        body["count"]
            .as_u64()
            .ok_or_else(|| anyhow!("count response has no count"))
    }

    /// Success and failure counts for one route.
    pub async fn route_stats(&self, uuid: &str) -> Result<RouteStats> {
        let (successes, failures) = tokio::try_join!(self.count(uuid, true), self.count(uuid, false))?;

        info!(uuid = %uuid, successes, failures, "route_stats_queried");

        Ok(RouteStats { successes, failures })
    }

    /// The most recent failure records for one route, newest first.
    pub async fn route_logs(&self, uuid: &str) -> Result<Vec<Value>> {
        let mut query = Self::uuid_query(uuid, false);
        query["sort"] = json!([{"@timestamp": {"order": "desc"}}]);
        query["size"] = json!(RECENT_FAILURES);

        let body = self
            .send(
                self.request(reqwest::Method::POST, "_search").json(&query),
                "search",
            )
            .await?;

        let hits = body["hits"]["hits"]
            .as_array()
            .ok_or_else(|| anyhow!("search response has no hits"))?;

        Ok(hits.iter().map(|hit| hit["_source"].clone()).collect())
    }

    /// Counts for many routes in one `_msearch` round trip, in input order.
    pub async fn many_routes_stats(&self, uuids: &[String]) -> Result<Vec<BatchRouteStats>> {
        if uuids.is_empty() {
            return Ok(Vec::new());
        }

        let mut body = String::new();
        for uuid in uuids {
            for success in [true, false] {
                let mut query = Self::uuid_query(uuid, success);
                query["size"] = json!(0);
                // Empty header keeps the index from the URL
                body.push_str("{}\n");
                body.push_str(&query.to_string());
                body.push('\n');
            }
        }

        let response = self
            .send(
                self.request(reqwest::Method::POST, "_msearch")
                    .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
                    .body(body),
                "msearch",
            )
            .await?;

        let responses = response["responses"]
            .as_array()
            .ok_or_else(|| anyhow!("msearch response has no responses"))?;

        if responses.len() != uuids.len() * 2 {
            bail!(
                "msearch returned {} responses for {} queries",
                responses.len(),
                uuids.len() * 2
            );
        }

        let counts = responses
            .iter()
            .map(total_hits)
            .collect::<Result<Vec<u64>>>()?;

        info!(routes = uuids.len(), "many_routes_stats_queried");

        Ok(uuids
            .iter()
            .zip(counts.chunks_exact(2))
            .map(|(uuid, pair)| BatchRouteStats {
                uuid: uuid.clone(),
                successes: pair[0],
                failures: pair[1],
            })
            .collect())
    }
}

/// `hits.total` is a bare number on old clusters and `{"value": n}` on new ones.
fn total_hits(response: &Value) -> Result<u64> {
    if let Some(error) = response.get("error") {
        bail!("msearch item failed: {}", error);
    }

    let total = &response["hits"]["total"];
    total
        .as_u64()
        .or_else(|| total["value"].as_u64())
        .ok_or_else(|| anyhow!("msearch item has no hits.total"))
}
