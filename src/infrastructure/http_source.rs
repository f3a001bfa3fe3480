// reqwest-backed sample source for the machine backend endpoints
use crate::application::sample_source::{RealtimeBatch, SampleSource, SourceError};
use crate::domain::sample::RawRecord;
use crate::infrastructure::config::WireVariant;
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

#[derive(Debug, Clone)]
pub struct HttpSampleSource {
    client: reqwest::Client,
    endpoint: String,
    variant: WireVariant,
}

/// `{status, hasNewData, data, message}` answer of the query-style endpoints
#[derive(Debug, Deserialize)]
struct StatusEnvelope {
    status: String,
    #[serde(default, rename = "hasNewData")]
    has_new_data: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

/// `{success, data, error}` answer of the post-style endpoints
#[derive(Debug, Deserialize)]
struct SuccessEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

impl StatusEnvelope {
    fn into_data(self) -> Result<(bool, Option<Value>), SourceError> {
        if self.status != "success" {
            return Err(SourceError::Backend(
                self.message.unwrap_or_else(|| format!("status {:?}", self.status)),
            ));
        }
        Ok((self.has_new_data, self.data))
    }
}

impl SuccessEnvelope {
    fn into_records(self) -> Result<Vec<RawRecord>, SourceError> {
        if !self.success {
            return Err(SourceError::Backend(
                self.error.unwrap_or_else(|| "request unsuccessful".to_string()),
            ));
        }
        Ok(self.data.map(records_of).unwrap_or_default())
    }
}

impl HttpSampleSource {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, variant: WireVariant) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim().to_string(),
            variant,
        }
    }

    fn build_url(&self, action: &str, params: &[(&str, String)]) -> String {
        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        let mut url = format!(
            "{}{}action={}",
            self.endpoint,
            separator,
            urlencoding::encode(action)
        );
        for (key, value) in params {
            url.push_str(&format!("&{}={}", key, urlencoding::encode(value)));
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, SourceError> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        Self::decode(response).await
    }

    async fn post_json<T: DeserializeOwned>(&self, body: &Value) -> Result<T, SourceError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, SourceError> {
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        serde_json::from_slice(&body).map_err(|e| SourceError::Decode(e.to_string()))
    }

    async fn realtime_by_query(&self, cursor: i64) -> Result<RealtimeBatch, SourceError> {
        let url = self.build_url(
            "realtime",
            &[("lastId", cursor.to_string()), ("t", cache_buster())],
        );
        let (has_new_data, data) = self.get_json::<StatusEnvelope>(&url).await?.into_data()?;

        let batch = match (has_new_data, data) {
            (true, Some(data)) => RealtimeBatch::NewData(records_of(data)),
            (true, None) => RealtimeBatch::NewData(Vec::new()),
            (false, data) => RealtimeBatch::Unchanged(data.and_then(newest_record)),
        };
        Ok(batch)
    }

    async fn realtime_by_post(&self, cursor: i64) -> Result<RealtimeBatch, SourceError> {
        let body = json!({ "action": "realtime", "last_id": cursor });
        let mut records = self.post_json::<SuccessEnvelope>(&body).await?.into_records()?;

        if records.is_empty() {
            return Ok(RealtimeBatch::Unchanged(None));
        }
        // This variant lists records oldest first
        records.reverse();
        Ok(RealtimeBatch::NewData(records))
    }
}

#[async_trait]
impl SampleSource for HttpSampleSource {
    async fn fetch_realtime(&self, cursor: i64) -> Result<RealtimeBatch, SourceError> {
        match self.variant {
            WireVariant::Query => self.realtime_by_query(cursor).await,
            WireVariant::Post => self.realtime_by_post(cursor).await,
        }
    }

    async fn fetch_latest(&self) -> Result<Option<RawRecord>, SourceError> {
        match self.variant {
            WireVariant::Query => {
                let url = self.build_url("latest", &[]);
                let (_, data) = self.get_json::<StatusEnvelope>(&url).await?.into_data()?;
                Ok(data.and_then(newest_record))
            }
            WireVariant::Post => Ok(self.fetch_history(1).await?.into_iter().next()),
        }
    }

    async fn fetch_history(&self, limit: usize) -> Result<Vec<RawRecord>, SourceError> {
        let url = self.build_url("latest", &[("limit", limit.to_string())]);
        match self.variant {
            WireVariant::Query => {
                let (_, data) = self.get_json::<StatusEnvelope>(&url).await?.into_data()?;
                Ok(data.map(records_of).unwrap_or_default())
            }
            WireVariant::Post => self.get_json::<SuccessEnvelope>(&url).await?.into_records(),
        }
    }
}

/// Records carried by a `data` member, which may be one object or an array
fn records_of(data: Value) -> Vec<RawRecord> {
    match data {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(record) => Some(record),
                _ => None,
            })
            .collect(),
        Value::Object(record) => vec![record],
        _ => Vec::new(),
    }
}

/// Newest record of a newest-first payload
fn newest_record(data: Value) -> Option<RawRecord> {
    records_of(data).into_iter().next()
}

fn cache_buster() -> String {
    chrono::Utc::now().timestamp_millis().to_string()
}
