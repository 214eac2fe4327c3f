//! EarthMC adapter: town and nation listings plus leader lookups (API v3).

use async_trait::async_trait;
use relay_core::{
    config::MonitorConfig,
    domain::Population,
    errors::Error,
    monitor::{EntitySnapshot, EntitySource},
    Result,
};
use serde_json::{json, Value};
use tracing::debug;

/// Stateless apart from the connection pool: base URL and timeout come from the
/// monitor settings of the cycle making the call.
#[derive(Clone, Debug)]
pub struct EarthMcClient {
    http: reqwest::Client,
}

impl EarthMcClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("earthmc http client: {e}")))?;
        Ok(Self { http })
    }
}

pub fn collection_url(api_base: &str, population: Population) -> String {
    format!("{}/{}", api_base.trim_end_matches('/'), collection(population))
}

fn collection(population: Population) -> &'static str {
    match population {
        Population::Town => "towns",
        Population::Nation => "nations",
    }
}

fn leader_key(population: Population) -> &'static str {
    match population {
        Population::Town => "mayor",
        Population::Nation => "king",
    }
}

#[async_trait]
impl EntitySource for EarthMcClient {
    async fn fetch_snapshot(
        &self,
        settings: &MonitorConfig,
        population: Population,
    ) -> Result<EntitySnapshot> {
        let resp = self
            .http
            .get(collection_url(&settings.api_base, population))
            .timeout(settings.fetch_timeout())
            .send()
            .await
            .map_err(|e| Error::Remote(format!("{population} listing: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Remote(format!(
                "{population} listing returned status {status}"
            )));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| Error::Remote(format!("{population} listing: invalid body: {e}")))?;
        parse_listing(population, &body)
    }

    async fn fetch_leader(
        &self,
        settings: &MonitorConfig,
        population: Population,
        id: &str,
    ) -> Result<Option<String>> {
        let resp = self
            .http
            .post(collection_url(&settings.api_base, population))
            .timeout(settings.fetch_timeout())
            .json(&json!({ "query": [id] }))
            .send()
            .await
            .map_err(|e| Error::Remote(format!("{population} details: {e}")))?;

        if !resp.status().is_success() {
            debug!(%population, id, status = %resp.status(), "detail lookup returned no data");
            return Ok(None);
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| Error::Remote(format!("{population} details: invalid body: {e}")))?;
        Ok(parse_leader(population, &body))
    }
}

/// Accepts a bare list, or an object wrapping it under the collection name or `data`.
pub fn parse_listing(population: Population, body: &Value) -> Result<EntitySnapshot> {
    let malformed = |why: &str| Error::Remote(format!("malformed {population} listing: {why}"));

    let items = match body {
        Value::Array(items) => items,
        Value::Object(obj) => obj
            .get(collection(population))
            .or_else(|| obj.get("data"))
            .and_then(Value::as_array)
            .ok_or_else(|| malformed("no list in object"))?,
        _ => return Err(malformed("expected a list")),
    };

    let mut snapshot = EntitySnapshot::new();
    for item in items {
        let uuid = item
            .get("uuid")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("entry without uuid"))?;
        let name = item
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("entry without name"))?;
        snapshot.insert(uuid.to_string(), name.to_string());
    }
    Ok(snapshot)
}

/// Leader name from a detail query response (a list with one entry).
pub fn parse_leader(population: Population, body: &Value) -> Option<String> {
    let details = match body {
        Value::Array(items) => items.first()?,
        other => other,
    };
    details
        .get(leader_key(population))?
        .get("name")?
        .as_str()
        .filter(|n| !n.trim().is_empty())
        .map(str::to_string)
}
