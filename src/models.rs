use crate::error::FetchFailure;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const PAYG_TIER_ID: &str = "prod_payg";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionSnapshot {
    tier_product_id: String,
    billing_period_start: DateTime<Utc>,
}

impl SubscriptionSnapshot {
    pub fn new(tier_product_id: impl Into<String>, billing_period_start: DateTime<Utc>) -> Self {
        Self {
            tier_product_id: tier_product_id.into(),
            billing_period_start,
        }
    }

    pub fn tier_product_id(&self) -> &str {
        &self.tier_product_id
    }

    pub fn billing_period_start(&self) -> DateTime<Utc> {
        self.billing_period_start
    }

    pub fn is_tier(&self, tier_id: &str) -> bool {
        self.tier_product_id == tier_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SubscriptionState {
    #[default]
    Unloaded,
    Loading,
    Loaded(SubscriptionSnapshot),
    Failed(FetchFailure),
}

impl SubscriptionState {
    pub fn snapshot(&self) -> Option<&SubscriptionSnapshot> {
        match self {
            SubscriptionState::Loaded(snap) => Some(snap),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetric {
    pub metric: String,
    pub usage: f64,
    pub limit: Option<f64>,
}

impl AggregateMetric {
    pub fn ratio(&self) -> f64 {
        match self.limit {
            Some(limit) if limit > 0.0 => (self.usage / limit).clamp(0.0, 1.0),
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub metric: String,
    pub usage: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationCategory {
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub category: NotificationCategory,
    pub message: String,
}

impl Notification {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            category: NotificationCategory::Error,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn snapshot_only_exposed_when_loaded() {
        let snap = SubscriptionSnapshot::new(
            PAYG_TIER_ID,
            Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap(),
        );
        assert!(SubscriptionState::Unloaded.snapshot().is_none());
        assert!(SubscriptionState::Loading.snapshot().is_none());
        assert!(SubscriptionState::Failed(FetchFailure::new("x"))
            .snapshot()
            .is_none());
        assert_eq!(
            SubscriptionState::Loaded(snap.clone()).snapshot(),
            Some(&snap)
        );
        assert!(snap.is_tier(PAYG_TIER_ID));
    }

    #[test]
    fn aggregate_ratio_is_clamped() {
        let over = AggregateMetric {
            metric: "db_size".into(),
            usage: 12.0,
            limit: Some(8.0),
        };
        let unlimited = AggregateMetric {
            metric: "egress".into(),
            usage: 3.0,
            limit: None,
        };
        assert_eq!(over.ratio(), 1.0);
        assert_eq!(unlimited.ratio(), 0.0);
    }
}
