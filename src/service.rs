use crate::config::AppConfig;
use crate::controller::{SubscriptionProvider, UsageRequest};
use crate::error::{AppError, FetchFailure};
use crate::models::{AggregateMetric, DailyUsage, SubscriptionSnapshot};
use crate::storage::Storage;
use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use reqwest::Client;
use serde_json::Value;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use url::Url;

pub struct PlatformClient {
    client: Client,
    api_url: String,
    token: String,
}

impl PlatformClient {
    pub fn new(api_url: &str, token: String) -> Result<Self, AppError> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self, AppError> {
        Self::new(&cfg.api_url, crate::config::get_token()?)
    }

    fn project_url(&self, project_ref: &str, tail: &str) -> Result<Url, AppError> {
        Ok(Url::parse(&format!(
            "{}/platform/projects/{}/{}",
            self.api_url, project_ref, tail
        ))?)
    }

    async fn get_json(&self, url: Url) -> Result<Value, AppError> {
        tracing::debug!(%url, "platform request");
        let body = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body)
    }

    pub async fn subscription(&self, project_ref: &str) -> Result<SubscriptionSnapshot, AppError> {
        let body = self
            .get_json(self.project_url(project_ref, "subscription")?)
            .await?;
        parse_subscription(&body)
    }

    pub async fn aggregate_usage(&self, project_ref: &str) -> Result<Vec<AggregateMetric>, AppError> {
        let body = self.get_json(self.project_url(project_ref, "usage")?).await?;
        Ok(parse_aggregate_usage(&body))
    }

    pub async fn daily_usage(&self, request: &UsageRequest) -> Result<Vec<DailyUsage>, AppError> {
        let mut url = self.project_url(&request.project_ref, "daily-stats")?;
        url.query_pairs_mut()
            .append_pair("start", &request.start.to_string())
            .append_pair("end", &request.end.to_string());
        let body = self.get_json(url).await?;
        Ok(parse_daily_usage(&body))
    }
}

#[async_trait]
impl SubscriptionProvider for PlatformClient {
    async fn fetch_subscription(
        &self,
        project_ref: &str,
        cancel: &CancellationToken,
    ) -> Result<SubscriptionSnapshot, FetchFailure> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchFailure::new("request cancelled")),
            result = self.subscription(project_ref) => result.map_err(|e| FetchFailure::from(&e)),
        }
    }
}

pub struct JsonFileProvider {
    path: PathBuf,
}

impl JsonFileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<SubscriptionSnapshot, AppError> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let body: Value = serde_json::from_str(&raw)?;
        parse_subscription(&body)
    }
}

#[async_trait]
impl SubscriptionProvider for JsonFileProvider {
    async fn fetch_subscription(
        &self,
        _project_ref: &str,
        cancel: &CancellationToken,
    ) -> Result<SubscriptionSnapshot, FetchFailure> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchFailure::new("request cancelled")),
            result = self.load() => result.map_err(|e| FetchFailure::from(&e)),
        }
    }
}

pub fn parse_subscription(body: &Value) -> Result<SubscriptionSnapshot, AppError> {
    let tier = body
        .pointer("/tier/prod_id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| FetchFailure::new("subscription payload is missing tier.prod_id"))?;
    let start_secs = body
        .pointer("/billing/current_period_start")
        .and_then(Value::as_i64)
        .ok_or_else(|| {
            FetchFailure::new("subscription payload is missing billing.current_period_start")
        })?;
    let start = Utc
        .timestamp_opt(start_secs, 0)
        .single()
        .ok_or_else(|| FetchFailure::new("billing.current_period_start is out of range"))?;
    Ok(SubscriptionSnapshot::new(tier, start))
}

pub fn parse_aggregate_usage(body: &Value) -> Vec<AggregateMetric> {
    let Some(map) = body.as_object() else {
        return vec![];
    };
    let mut out: Vec<AggregateMetric> = map
        .iter()
        .filter_map(|(metric, item)| {
            let usage = item.get("usage").and_then(Value::as_f64)?;
            Some(AggregateMetric {
                metric: metric.clone(),
                usage,
                limit: item.get("limit").and_then(Value::as_f64),
            })
        })
        .collect();
    out.sort_by(|a, b| a.metric.cmp(&b.metric));
    out
}

pub fn parse_daily_usage(body: &Value) -> Vec<DailyUsage> {
    body.get("data")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let date = item
                        .get("date")
                        .and_then(Value::as_str)
                        .and_then(|raw| NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d").ok())?;
                    Some(DailyUsage {
                        date,
                        metric: item
                            .get("metric")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown")
                            .to_string(),
                        usage: item.get("usage").and_then(Value::as_f64).unwrap_or(0.0),
                        cost: item.get("cost").and_then(Value::as_f64).unwrap_or(0.0),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

pub struct UsageService<'a> {
    client: &'a PlatformClient,
}

impl<'a> UsageService<'a> {
    pub fn new(client: &'a PlatformClient) -> Self {
        Self { client }
    }

    pub async fn load_window(
        &self,
        request: &UsageRequest,
        storage: &mut Storage,
    ) -> Result<Vec<DailyUsage>, AppError> {
        let rows = self.client.daily_usage(request).await?;
        storage.replace_window(&request.project_ref, request.start, request.end, &rows)?;
        tracing::debug!(
            project = %request.project_ref,
            rows = rows.len(),
            "usage detail cached"
        );
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_subscription_reads_tier_and_period() {
        let snap = parse_subscription(&json!({
            "tier": { "prod_id": "prod_payg", "name": "Pay as you go" },
            "billing": { "current_period_start": 1_704_067_200 }
        }))
        .expect("snapshot");
        assert_eq!(snap.tier_product_id(), "prod_payg");
        assert_eq!(snap.billing_period_start().timestamp(), 1_704_067_200);
    }

    #[test]
    fn parse_subscription_rejects_partial_payload() {
        let err = parse_subscription(&json!({ "tier": { "prod_id": "prod_pro" } }))
            .expect_err("missing billing");
        assert!(err.to_string().contains("current_period_start"));
        assert!(parse_subscription(&json!({ "billing": { "current_period_start": 1 } })).is_err());
    }

    #[test]
    fn parse_aggregate_usage_sorts_and_skips_invalid() {
        let rows = parse_aggregate_usage(&json!({
            "storage_size": { "usage": 2.5, "limit": 8.0 },
            "db_egress": { "usage": 1.0 },
            "broken": { "limit": 3 }
        }));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].metric, "db_egress");
        assert_eq!(rows[0].limit, None);
        assert_eq!(rows[1].limit, Some(8.0));
    }

    #[test]
    fn parse_daily_usage_accepts_timestamps_and_skips_bad_dates() {
        let rows = parse_daily_usage(&json!({
            "data": [
                { "date": "2024-01-02T00:00:00Z", "metric": "egress", "usage": 3, "cost": 0.5 },
                { "date": "2024-01-03", "usage": 1 },
                { "date": "bad" }
            ]
        }));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(rows[0].cost, 0.5);
        assert_eq!(rows[1].metric, "unknown");
    }

    #[test]
    fn project_urls_include_window_query() {
        let client = PlatformClient::new("https://api.example.com/", "t".into()).unwrap();
        let mut url = client.project_url("abcd", "daily-stats").unwrap();
        url.query_pairs_mut().append_pair("start", "2024-01-01");
        assert_eq!(
            url.as_str(),
            "https://api.example.com/platform/projects/abcd/daily-stats?start=2024-01-01"
        );
    }

    #[tokio::test]
    async fn json_file_provider_reads_saved_payload() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join("subscription.json");
        std::fs::write(
            &path,
            r#"{"tier":{"prod_id":"prod_pro"},"billing":{"current_period_start":1704067200}}"#,
        )
        .expect("write payload");
        let snap = JsonFileProvider::new(&path)
            .fetch_subscription("abcd", &CancellationToken::new())
            .await
            .expect("snapshot");
        assert_eq!(snap.tier_product_id(), "prod_pro");
    }

    #[tokio::test]
    async fn json_file_provider_reports_missing_file() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let err = JsonFileProvider::new(dir.path().join("missing.json"))
            .fetch_subscription("abcd", &CancellationToken::new())
            .await
            .expect_err("missing file");
        assert!(!err.message.is_empty());
    }

    #[tokio::test]
    async fn cancelled_fetch_reports_cancellation() {
        let client = PlatformClient::new("http://127.0.0.1:9", "t".into()).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let err = client
            .fetch_subscription("abcd", &token)
            .await
            .expect_err("cancelled");
        assert_eq!(err.message, "request cancelled");
    }
}
