use crate::models::SubscriptionState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    LegacyAggregate,
    Payg,
    NextGen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Pending,
    Mode(ViewMode),
}

impl Resolution {
    pub fn mode(self) -> Option<ViewMode> {
        match self {
            Resolution::Pending => None,
            Resolution::Mode(mode) => Some(mode),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ResolverInput<'a> {
    pub flag_enabled: bool,
    pub user_prefers_new_ui: bool,
    pub subscription: &'a SubscriptionState,
}

pub fn resolve(input: &ResolverInput<'_>, payg_tier_id: &str) -> Resolution {
    let Some(snapshot) = input.subscription.snapshot() else {
        return Resolution::Pending;
    };
    if input.flag_enabled && input.user_prefers_new_ui {
        return Resolution::Mode(ViewMode::NextGen);
    }
    if snapshot.is_tier(payg_tier_id) {
        Resolution::Mode(ViewMode::Payg)
    } else {
        Resolution::Mode(ViewMode::LegacyAggregate)
    }
}
