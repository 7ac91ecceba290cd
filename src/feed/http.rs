use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::TradeSource;
use crate::shared::errors::FeedError;

/// Trade feed served as a JSON array over HTTP GET.
pub struct HttpTradeSource {
    client: Client,
    url: String,
}

impl HttpTradeSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::Unavailable(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TradeSource for HttpTradeSource {
    async fn fetch(&self) -> Result<Vec<Value>, FeedError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FeedError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Unavailable(format!("HTTP {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FeedError::Unavailable(format!("read body: {}", e)))?;
        let records = parse_body(&body)?;
        debug!(url = %self.url, records = records.len(), "Feed fetched");
        Ok(records)
    }
}

/// The body must be a JSON array; anything else means the feed is unusable.
pub fn parse_body(body: &str) -> Result<Vec<Value>, FeedError> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Array(records)) => Ok(records),
        Ok(other) => Err(FeedError::Unavailable(format!(
            "expected a JSON array, got {}",
            kind(&other)
        ))),
        Err(e) => Err(FeedError::Unavailable(format!("invalid JSON: {}", e))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
