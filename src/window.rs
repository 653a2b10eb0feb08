use crate::error::WindowError;
use crate::presets::Preset;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowSource {
    Default,
    UserSelected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickerSelection {
    pub preset_key: Option<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl PickerSelection {
    pub fn custom(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            preset_key: None,
            start,
            end,
        }
    }

    pub fn from_preset(
        preset: &Preset,
        anchor: DateTime<Utc>,
        today: NaiveDate,
    ) -> Result<Self, WindowError> {
        let (start, end) = preset
            .range(anchor, today)
            .ok_or_else(|| WindowError::CustomNeedsDates(preset.key.clone()))?;
        Ok(Self {
            preset_key: Some(preset.key.clone()),
            start,
            end,
        })
    }
}

// Built only through `new`, so `start <= end` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportingWindow {
    start: NaiveDate,
    end: NaiveDate,
    source: WindowSource,
}

impl ReportingWindow {
    fn new(start: NaiveDate, end: NaiveDate, source: WindowSource) -> Result<Self, WindowError> {
        if start > end {
            return Err(WindowError::InvalidRange { start, end });
        }
        Ok(Self { start, end, source })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn source(&self) -> WindowSource {
        self.source
    }

    pub fn same_range(&self, other: &ReportingWindow) -> bool {
        self.start == other.start && self.end == other.end
    }

    pub fn label(&self) -> String {
        format!(
            "{} → {}",
            self.start.format("%b %-d, %Y"),
            self.end.format("%b %-d, %Y")
        )
    }
}

pub fn resolve_window(
    selection: Option<&PickerSelection>,
    billing_period_start: DateTime<Utc>,
    presets: &[Preset],
    today: NaiveDate,
) -> Result<ReportingWindow, WindowError> {
    match selection {
        Some(sel) => ReportingWindow::new(sel.start, sel.end, WindowSource::UserSelected),
        None => {
            let first = presets.first().ok_or(WindowError::NoDefaultPreset)?;
            let (start, end) = first
                .range(billing_period_start, today)
                .ok_or(WindowError::NoDefaultPreset)?;
            ReportingWindow::new(start, end, WindowSource::Default)
        }
    }
}
