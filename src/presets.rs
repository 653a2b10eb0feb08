use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresetKind {
    CurrentBillingCycle,
    PreviousBillingCycle,
    LastDays(u32),
    StartOfMonth,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    pub key: String,
    pub label: String,
    pub kind: PresetKind,
}

impl Preset {
    fn new(key: &str, label: &str, kind: PresetKind) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            kind,
        }
    }

    pub fn range(&self, anchor: DateTime<Utc>, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        let anchor = anchor.date_naive();
        match self.kind {
            PresetKind::CurrentBillingCycle => Some((anchor, today.max(anchor))),
            PresetKind::PreviousBillingCycle => {
                let start = anchor.checked_sub_months(Months::new(1))?;
                let end = anchor - Duration::days(1);
                Some((start, end))
            }
            PresetKind::LastDays(days) => Some((today - Duration::days(i64::from(days)), today)),
            PresetKind::StartOfMonth => Some((today.with_day(1)?, today)),
            PresetKind::Custom => None,
        }
    }

    pub fn is_custom(&self) -> bool {
        self.kind == PresetKind::Custom
    }
}

pub fn billing_presets() -> Vec<Preset> {
    vec![
        Preset::new(
            "currentBillingCycle",
            "Current billing cycle",
            PresetKind::CurrentBillingCycle,
        ),
        Preset::new(
            "previousBillingCycle",
            "Previous billing cycle",
            PresetKind::PreviousBillingCycle,
        ),
    ]
}

pub fn report_presets() -> Vec<Preset> {
    vec![
        Preset::new("7d", "Last 7 days", PresetKind::LastDays(7)),
        Preset::new("30d", "Last 30 days", PresetKind::LastDays(30)),
        Preset::new("startMonth", "This month", PresetKind::StartOfMonth),
        Preset::new("custom", "Custom range", PresetKind::Custom),
    ]
}

pub fn default_presets() -> Vec<Preset> {
    let mut presets = billing_presets();
    presets.extend(report_presets());
    presets
}

pub fn find_preset<'a>(presets: &'a [Preset], key: &str) -> Option<&'a Preset> {
    presets.iter().find(|p| p.key.eq_ignore_ascii_case(key.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn anchor() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 8, 30, 0).unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn billing_presets_come_first() {
        let presets = default_presets();
        assert_eq!(presets[0].key, "currentBillingCycle");
        assert_eq!(presets[1].key, "previousBillingCycle");
        assert_eq!(presets[2].key, "7d");
        assert_eq!(presets.len(), 6);
    }

    #[test]
    fn current_cycle_runs_from_anchor_to_today() {
        let p = &default_presets()[0];
        assert_eq!(
            p.range(anchor(), day(2024, 3, 20)),
            Some((day(2024, 3, 15), day(2024, 3, 20)))
        );
    }

    #[test]
    fn current_cycle_never_ends_before_anchor() {
        let p = &default_presets()[0];
        assert_eq!(
            p.range(anchor(), day(2024, 3, 1)),
            Some((day(2024, 3, 15), day(2024, 3, 15)))
        );
    }

    #[test]
    fn previous_cycle_ends_the_day_before_anchor() {
        let p = &default_presets()[1];
        assert_eq!(
            p.range(anchor(), day(2024, 3, 20)),
            Some((day(2024, 2, 15), day(2024, 3, 14)))
        );
    }

    #[test]
    fn report_presets_are_relative_to_today() {
        let presets = report_presets();
        let today = day(2024, 3, 20);
        assert_eq!(
            presets[0].range(anchor(), today),
            Some((day(2024, 3, 13), today))
        );
        assert_eq!(
            presets[2].range(anchor(), today),
            Some((day(2024, 3, 1), today))
        );
        assert_eq!(presets[3].range(anchor(), today), None);
    }

    #[test]
    fn find_preset_ignores_case() {
        let presets = default_presets();
        assert_eq!(
            find_preset(&presets, "STARTMONTH").map(|p| p.kind),
            Some(PresetKind::StartOfMonth)
        );
        assert!(find_preset(&presets, "90d").is_none());
    }
}
