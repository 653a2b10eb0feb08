use crate::error::{FetchFailure, WindowError};
use crate::models::{Notification, SubscriptionSnapshot, SubscriptionState, PAYG_TIER_ID};
use crate::presets::{default_presets, Preset};
use crate::resolver::{resolve, Resolution, ResolverInput, ViewMode};
use crate::window::{resolve_window, PickerSelection, ReportingWindow};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

pub const USAGE_V2_FLAG: &str = "usagev2";

#[async_trait]
pub trait SubscriptionProvider: Send + Sync {
    async fn fetch_subscription(
        &self,
        project_ref: &str,
        cancel: &CancellationToken,
    ) -> Result<SubscriptionSnapshot, FetchFailure>;
}

#[async_trait]
impl<T: SubscriptionProvider + ?Sized> SubscriptionProvider for Arc<T> {
    async fn fetch_subscription(
        &self,
        project_ref: &str,
        cancel: &CancellationToken,
    ) -> Result<SubscriptionSnapshot, FetchFailure> {
        (**self).fetch_subscription(project_ref, cancel).await
    }
}

pub trait Notifier {
    fn notify(&self, notification: Notification);
}

impl Notifier for mpsc::UnboundedSender<Notification> {
    fn notify(&self, notification: Notification) {
        if self.send(notification).is_err() {
            tracing::debug!("notification receiver dropped");
        }
    }
}

pub trait FlagSource {
    fn is_enabled(&self, flag: &str) -> bool;
}

impl<F: Fn(&str) -> bool> FlagSource for F {
    fn is_enabled(&self, flag: &str) -> bool {
        self(flag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "window", rename_all = "snake_case")]
pub enum RenderDecision {
    ShowLoading,
    ShowLegacyAggregate,
    ShowPaygDetail(ReportingWindow),
    ShowNextGen,
}

#[derive(Debug, Clone)]
pub struct FetchTicket {
    pub request_id: u64,
    pub token: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied,
    Failed,
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageRequest {
    pub project_ref: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub payg_tier_id: String,
    pub presets: Vec<Preset>,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            payg_tier_id: PAYG_TIER_ID.into(),
            presets: default_presets(),
        }
    }
}

pub struct UsageViewController<P, N> {
    project_ref: String,
    provider: P,
    notifier: N,
    payg_tier_id: String,
    presets: Vec<Preset>,
    flag_enabled: bool,
    user_prefers_new_ui: bool,
    subscription: SubscriptionState,
    resolution: Resolution,
    window: Option<ReportingWindow>,
    last_requested: Option<ReportingWindow>,
    current_request: Option<u64>,
    next_request_id: u64,
    cancel: Option<CancellationToken>,
    decision_tx: watch::Sender<RenderDecision>,
}

impl<P: SubscriptionProvider, N: Notifier> UsageViewController<P, N> {
    pub fn new(
        project_ref: impl Into<String>,
        provider: P,
        notifier: N,
        flags: &dyn FlagSource,
        options: ControllerOptions,
    ) -> Self {
        // Read once; flag changes during a session are not tracked.
        let flag_enabled = flags.is_enabled(USAGE_V2_FLAG);
        let (decision_tx, _) = watch::channel(RenderDecision::ShowLoading);
        Self {
            project_ref: project_ref.into(),
            provider,
            notifier,
            payg_tier_id: options.payg_tier_id,
            presets: options.presets,
            flag_enabled,
            user_prefers_new_ui: flag_enabled,
            subscription: SubscriptionState::Unloaded,
            resolution: Resolution::Pending,
            window: None,
            last_requested: None,
            current_request: None,
            next_request_id: 0,
            cancel: None,
            decision_tx,
        }
    }

    pub fn project_ref(&self) -> &str {
        &self.project_ref
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn presets(&self) -> &[Preset] {
        &self.presets
    }

    pub fn flag_enabled(&self) -> bool {
        self.flag_enabled
    }

    pub fn user_prefers_new_ui(&self) -> bool {
        self.user_prefers_new_ui
    }

    pub fn subscription(&self) -> &SubscriptionState {
        &self.subscription
    }

    pub fn mode(&self) -> Option<ViewMode> {
        self.resolution.mode()
    }

    pub fn window(&self) -> Option<&ReportingWindow> {
        self.window.as_ref()
    }

    pub fn decision(&self) -> RenderDecision {
        self.decision_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RenderDecision> {
        self.decision_tx.subscribe()
    }

    pub fn is_fetching(&self) -> bool {
        self.current_request.is_some()
    }

    pub fn toggle_new_ui(&mut self) {
        self.set_user_prefers_new_ui(!self.user_prefers_new_ui);
    }

    pub fn set_user_prefers_new_ui(&mut self, prefers: bool) {
        self.user_prefers_new_ui = prefers;
        self.recompute();
    }

    pub fn begin_fetch(&mut self) -> FetchTicket {
        if let Some(previous) = self.cancel.take() {
            previous.cancel();
        }
        self.next_request_id += 1;
        let request_id = self.next_request_id;
        let token = CancellationToken::new();
        self.cancel = Some(token.clone());
        self.current_request = Some(request_id);
        self.subscription = SubscriptionState::Loading;
        tracing::debug!(project = %self.project_ref, request_id, "subscription fetch started");
        self.recompute();
        FetchTicket { request_id, token }
    }

    /// Applies a fetch result if it belongs to the outstanding request.
    pub fn complete_fetch(
        &mut self,
        request_id: u64,
        result: Result<SubscriptionSnapshot, FetchFailure>,
    ) -> FetchOutcome {
        let cancelled = self.cancel.as_ref().map_or(true, |t| t.is_cancelled());
        if self.current_request != Some(request_id) || cancelled {
            tracing::debug!(project = %self.project_ref, request_id, "dropping stale subscription result");
            return FetchOutcome::Stale;
        }
        self.current_request = None;
        self.cancel = None;

        match result {
            Ok(snapshot) => {
                tracing::debug!(
                    project = %self.project_ref,
                    tier = snapshot.tier_product_id(),
                    "subscription loaded"
                );
                self.subscription = SubscriptionState::Loaded(snapshot);
                self.recompute();
                FetchOutcome::Applied
            }
            Err(failure) => {
                tracing::warn!(project = %self.project_ref, error = %failure, "subscription fetch failed");
                self.notifier
                    .notify(Notification::error(failure.display_message()));
                self.subscription = SubscriptionState::Failed(failure);
                self.recompute();
                FetchOutcome::Failed
            }
        }
    }

    pub async fn refetch(&mut self) -> FetchOutcome {
        let ticket = self.begin_fetch();
        let result = self
            .provider
            .fetch_subscription(&self.project_ref, &ticket.token)
            .await;
        self.complete_fetch(ticket.request_id, result)
    }

    pub fn apply_default_window(
        &mut self,
        today: NaiveDate,
    ) -> Result<Option<UsageRequest>, WindowError> {
        if self.resolution != Resolution::Mode(ViewMode::Payg) || self.window.is_some() {
            return Ok(None);
        }
        let snapshot = self
            .subscription
            .snapshot()
            .ok_or(WindowError::SubscriptionNotLoaded)?;
        let window = resolve_window(
            None,
            snapshot.billing_period_start(),
            &self.presets,
            today,
        )?;
        Ok(self.install_window(window))
    }

    /// Applies a picker change. Rejected ranges leave the current window and
    /// decision as they were.
    pub fn select_window(
        &mut self,
        selection: &PickerSelection,
        today: NaiveDate,
    ) -> Result<Option<UsageRequest>, WindowError> {
        let snapshot = self
            .subscription
            .snapshot()
            .ok_or(WindowError::SubscriptionNotLoaded)?;
        let window = resolve_window(
            Some(selection),
            snapshot.billing_period_start(),
            &self.presets,
            today,
        )
        .inspect_err(|err| {
            tracing::warn!(project = %self.project_ref, error = %err, "window rejected");
        })?;
        tracing::debug!(
            project = %self.project_ref,
            preset = ?selection.preset_key,
            start = %window.start(),
            end = %window.end(),
            "window selected"
        );
        Ok(self.install_window(window))
    }

    pub fn teardown(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        self.current_request = None;
        self.subscription = SubscriptionState::Unloaded;
        self.window = None;
        self.last_requested = None;
        self.recompute();
    }

    fn install_window(&mut self, window: ReportingWindow) -> Option<UsageRequest> {
        let unchanged = self
            .last_requested
            .as_ref()
            .is_some_and(|prev| prev.same_range(&window));
        self.window = Some(window.clone());
        self.recompute();
        if unchanged {
            return None;
        }
        let request = UsageRequest {
            project_ref: self.project_ref.clone(),
            start: window.start(),
            end: window.end(),
        };
        self.last_requested = Some(window);
        Some(request)
    }

    fn recompute(&mut self) {
        self.resolution = resolve(
            &ResolverInput {
                flag_enabled: self.flag_enabled,
                user_prefers_new_ui: self.user_prefers_new_ui,
                subscription: &self.subscription,
            },
            &self.payg_tier_id,
        );
        let decision = match self.resolution {
            Resolution::Pending => RenderDecision::ShowLoading,
            Resolution::Mode(ViewMode::LegacyAggregate) => RenderDecision::ShowLegacyAggregate,
            Resolution::Mode(ViewMode::NextGen) => RenderDecision::ShowNextGen,
            Resolution::Mode(ViewMode::Payg) => match &self.window {
                Some(window) => RenderDecision::ShowPaygDetail(window.clone()),
                None => RenderDecision::ShowLoading,
            },
        };
        self.decision_tx.send_if_modified(|current| {
            if *current == decision {
                false
            } else {
                *current = decision;
                true
            }
        });
    }
}
