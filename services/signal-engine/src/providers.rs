//! Score providers - sources of raw factor values per dimension

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::types::{Dimension, FactorSet, Instrument};

/// Source of factor values for one analysis dimension
#[async_trait]
pub trait ScoreProvider: Send + Sync {
    /// Dimension this provider serves
    fn dimension(&self) -> Dimension;

    /// Provider name for logs and errors
    fn name(&self) -> &str;

    /// Fetch the factor set for one instrument
    async fn get_factors(&self, instrument: &Instrument) -> Result<FactorSet>;
}

#[derive(Debug, Deserialize)]
struct FactorsResponse {
    factors: BTreeMap<String, f64>,
}

/// HTTP-backed provider: `GET {base_url}/factors/{dimension}/{symbol}`
pub struct HttpScoreProvider {
    client: Client,
    dimension: Dimension,
    base_url: Url,
    name: String,
    request_timeout: Duration,
}

impl HttpScoreProvider {
    pub fn new(dimension: Dimension, base_url: &str, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| EngineError::InvalidConfig(format!("HTTP client: {}", e)))?;

        let base_url = Url::parse(base_url).map_err(|e| {
            EngineError::InvalidConfig(format!("{} provider URL '{}': {}", dimension, base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(EngineError::InvalidConfig(format!(
                "{} provider URL '{}' cannot carry a path",
                dimension, base_url
            )));
        }

        Ok(Self {
            client,
            dimension,
            base_url,
            name: format!("http-{}", dimension),
            request_timeout,
        })
    }

    /// `{base}/factors/{dimension}/{symbol}`, symbol percent-encoded as one segment
    fn url_for(&self, symbol: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["factors", self.dimension.as_str(), symbol]);
        }
        url
    }
}

#[async_trait]
impl ScoreProvider for HttpScoreProvider {
    fn dimension(&self) -> Dimension {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn get_factors(&self, instrument: &Instrument) -> Result<FactorSet> {
        let url = self.url_for(&instrument.symbol);
        let started = Instant::now();

        let request = self.client.get(url.clone()).send();
        let response = match tokio::time::timeout(self.request_timeout, request).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => return Err(EngineError::provider(&self.name, e.to_string())),
            Err(_) => {
                return Err(EngineError::provider(
                    &self.name,
                    format!("request to {} timed out after {:?}", url, self.request_timeout),
                ))
            }
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EngineError::provider(
                &self.name,
                format!("{} returned {}: {}", url, status, text),
            ));
        }

        let body: FactorsResponse = response
            .json()
            .await
            .map_err(|e| EngineError::provider(&self.name, format!("invalid body: {}", e)))?;

        debug!(
            provider = %self.name,
            symbol = %instrument.symbol,
            factors = body.factors.len(),
            latency_ms = started.elapsed().as_millis() as u64,
            "Fetched factors"
        );

        Ok(FactorSet {
            dimension: self.dimension,
            factors: body.factors,
        })
    }
}
